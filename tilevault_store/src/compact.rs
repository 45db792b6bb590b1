//! Legacy → compacted schema conversion.
//!
//! Streams the flat `tiles` table in storage order, content-hashes every
//! payload, and rebuilds the store as `images` + `map`. The legacy rows are
//! only read, never destroyed, until finalization: an interrupted run
//! leaves a consistent store and re-running starts over safely, since all
//! inserts are idempotent at the content-address layer.

use crate::content::{content_id, unix_now};
use crate::store::{SchemaMode, TileRef, TileStore};
use anyhow::Result;
use itertools::Itertools;
use std::collections::HashSet;
use tilevault_core::{ProgressBar, TimeRange, ZoomRange};

/// Rows converted per transaction.
const COMPACT_BATCH_SIZE: usize = 100;

/// Result of a compaction run.
#[derive(Debug, PartialEq, Eq)]
pub enum CompactOutcome {
	/// The store already had the normalized layout; nothing was touched.
	AlreadyCompacted,
	/// The store was converted.
	Compacted { total: u64, unique: u64, duplicates: u64 },
}

/// Convert a legacy store to the compacted layout.
pub fn compact_store(store: &dyn TileStore, show_progress: bool) -> Result<CompactOutcome> {
	if store.schema_mode() == SchemaMode::Compacted {
		log::info!("{} is already compacted", store.locator());
		return Ok(CompactOutcome::AlreadyCompacted);
	}

	let zooms = ZoomRange::new(0, 30)?;
	let total = store.tiles_count(&zooms, &TimeRange::default())?;
	log::info!("compacting {} ({total} tiles)", store.locator());

	let progress = if show_progress {
		ProgressBar::new("tiles compacted", total)
	} else {
		ProgressBar::hidden()
	};

	store.prepare_compaction()?;

	let mut seen: HashSet<String> = HashSet::new();
	let mut converted = 0u64;
	let mut unique = 0u64;

	let rows = store.iter_tiles(&zooms, &TimeRange::default())?;
	for batch in &rows.chunks(COMPACT_BATCH_SIZE) {
		let mut images: Vec<(String, Vec<u8>)> = Vec::new();
		let mut refs: Vec<TileRef> = Vec::new();

		for row in batch {
			let row = row?;
			let id = content_id(&row.payload);
			if seen.insert(id.clone()) {
				images.push((id.clone(), row.payload));
			}
			refs.push(TileRef {
				zoom: row.zoom,
				column: row.column,
				row: row.row,
				content_id: id,
				updated_at: unix_now(),
			});
			converted += 1;
		}

		// A re-run may find images from an interrupted attempt, so the
		// actual insert count is authoritative, not the run-local set.
		unique += store.insert_images(&images)?;
		store.insert_refs(&refs)?;
		progress.inc(refs.len() as u64);
	}

	store.finalize_compaction()?;
	progress.finish();

	let duplicates = converted - unique;
	log::info!("{converted} tiles finished, {unique} unique, {duplicates} duplicates");

	Ok(CompactOutcome::Compacted {
		total: converted,
		unique,
		duplicates,
	})
}
