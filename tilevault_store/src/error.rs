//! Typed errors for fatal store preconditions.
//!
//! Everything here terminates an operation before it mutates anything.
//! Per-tile failures (vanished transform output, nonzero filter exit) are
//! counted outcomes, not errors, and never appear in this enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
	/// A store that must pre-exist is missing or unreachable.
	#[error("cannot connect to store '{0}': {1}")]
	Connection(String, String),

	/// The operation requires the other schema mode.
	#[error("{0}")]
	Schema(String),

	/// Two stores declare differing non-null tile formats.
	#[error("the stores use different tile formats ('{0}' vs '{1}')")]
	FormatMismatch(String, String),

	/// A structural pre-check found gaps in the tile pyramid.
	#[error("structural check failed: {0} missing tiles")]
	IntegrityFailure(usize),

	/// A `pg:` locator references an alias the configuration does not know.
	#[error("unknown connection alias '{0}'")]
	UnknownAlias(String),

	/// The connection string matches neither backend shape.
	#[error("cannot determine backend type from '{0}'")]
	UnknownLocator(String),
}
