//! Durability and connection knobs, selected by the caller.
//!
//! These are trade-offs, not safety guarantees: exactly one writer per store
//! is assumed at a time, and no concurrent-writer protocol exists.

use anyhow::{bail, Result};
use std::fmt;
use std::str::FromStr;

/// SQLite journal mode. PostgreSQL ignores it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JournalMode {
	#[default]
	Wal,
	Delete,
	Truncate,
	Persist,
	Memory,
	Off,
}

impl JournalMode {
	#[must_use]
	pub fn as_str(&self) -> &'static str {
		match self {
			JournalMode::Wal => "wal",
			JournalMode::Delete => "delete",
			JournalMode::Truncate => "truncate",
			JournalMode::Persist => "persist",
			JournalMode::Memory => "memory",
			JournalMode::Off => "off",
		}
	}
}

impl FromStr for JournalMode {
	type Err = anyhow::Error;

	fn from_str(value: &str) -> Result<JournalMode> {
		Ok(match value.to_ascii_lowercase().as_str() {
			"wal" => JournalMode::Wal,
			"delete" => JournalMode::Delete,
			"truncate" => JournalMode::Truncate,
			"persist" => JournalMode::Persist,
			"memory" => JournalMode::Memory,
			"off" => JournalMode::Off,
			_ => bail!("unknown journal mode '{value}'"),
		})
	}
}

impl fmt::Display for JournalMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Options applied when opening a store.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
	/// Commit per statement instead of wrapping batches in transactions.
	pub auto_commit: bool,
	pub journal_mode: JournalMode,
	/// `PRAGMA synchronous = OFF` instead of `NORMAL`.
	pub synchronous_off: bool,
	/// `PRAGMA locking_mode = EXCLUSIVE`.
	pub exclusive_lock: bool,
	/// Fail if the store (SQLite file, Postgres `map` table) does not exist.
	pub must_exist: bool,
}

impl OpenOptions {
	/// Options for a store that must already exist.
	#[must_use]
	pub fn existing() -> OpenOptions {
		OpenOptions {
			must_exist: true,
			..OpenOptions::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn journal_mode_round_trip() {
		for mode in ["wal", "delete", "truncate", "persist", "memory", "off"] {
			assert_eq!(mode.parse::<JournalMode>().unwrap().as_str(), mode);
		}
		assert!("journal".parse::<JournalMode>().is_err());
	}
}
