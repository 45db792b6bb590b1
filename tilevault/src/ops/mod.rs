//! The operation engines behind each CLI subcommand.

pub mod chain;
pub mod check;
pub mod convert;
pub mod disk;
pub mod expire;
pub mod fill;
pub mod merge;
pub mod process;
pub mod tile_test;
pub mod tilelist;
pub mod update;

use anyhow::Result;
use tilevault_store::{TileRef, TileStore};

/// Map rows buffered per transaction by the bulk engines.
pub(crate) const REF_BATCH_SIZE: usize = 250;

/// Distinct payloads dispatched to the worker pool per batch.
pub(crate) const TRANSFORM_BATCH_SIZE: usize = 1000;

/// Flush a buffered batch of map rows into a store.
pub(crate) fn flush_refs(store: &dyn TileStore, refs: &mut Vec<TileRef>) -> Result<()> {
	if !refs.is_empty() {
		store.insert_refs(refs)?;
		refs.clear();
	}
	Ok(())
}
