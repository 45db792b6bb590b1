//! Apply an external filter chain to every distinct payload of a store,
//! then reconcile the content addressing in place.

use crate::ops::chain::{FilterChain, TileStatus, TransformJob, WorkerPool};
use crate::ops::TRANSFORM_BATCH_SIZE;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use tilevault_core::{ProgressBar, TimeRange, ZoomRange};
use tilevault_store::{content_id, SchemaMode, StoreError, TileStore};

#[derive(Clone, Debug, Default)]
pub struct ProcessOptions {
	pub zooms: ZoomRange,
	/// Commands run on every distinct payload, `%s` is the file path.
	pub commands: Vec<String>,
	/// Worker pool size; 0 selects the host parallelism.
	pub pool_size: usize,
	pub tmp_dir: Option<PathBuf>,
	/// Delete refs whose transform output vanished instead of warning.
	pub delete_vanished: bool,
	pub progress: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProcessSummary {
	/// Tile rows visited.
	pub total: u64,
	/// Distinct payloads transformed and reconciled.
	pub processed: u64,
	/// Rows sharing an already-handled content id.
	pub duplicates: u64,
	pub vanished: u64,
	pub failed: u64,
}

/// Run the transform pipeline over a compacted store.
pub async fn process(store: &dyn TileStore, options: &ProcessOptions) -> Result<ProcessSummary> {
	let Some(chain) = FilterChain::new(&options.commands) else {
		log::info!("no commands given, nothing to do");
		return Ok(ProcessSummary::default());
	};
	if store.schema_mode() != SchemaMode::Compacted {
		return Err(StoreError::Schema("processing tiles requires a compacted store".to_string()).into());
	}

	log::info!("executing commands on {} ({})", store.locator(), options.zooms);

	// The dedup-aware join repoints map rows by content id; give it an
	// index for the duration of the run and drop it no matter how the run
	// ends.
	store.create_ref_index()?;
	let result = process_inner(store, options, chain).await;
	if let Err(err) = store.drop_ref_index() {
		log::warn!("could not drop the temporary ref index: {err}");
	}
	result
}

async fn process_inner(store: &dyn TileStore, options: &ProcessOptions, chain: FilterChain) -> Result<ProcessSummary> {
	let pool = WorkerPool::new(chain, options.pool_size);
	let format = store
		.metadata()?
		.and_then(|m| m.get("format").cloned())
		.unwrap_or_else(|| "png".to_string());

	let total = store.tiles_count(&options.zooms, &TimeRange::default())?;
	let progress = if options.progress {
		ProgressBar::new("tiles processed", total)
	} else {
		ProgressBar::hidden()
	};

	let mut summary = ProcessSummary::default();
	let mut seen: HashSet<String> = HashSet::new();
	let mut jobs: Vec<TransformJob> = Vec::new();

	for row in store.iter_tiles_with_id(&options.zooms, &TimeRange::default())? {
		let row = row?;
		let old_id = row.content_id.context("dedup-aware iterator returned no content id")?;
		summary.total += 1;

		if !seen.insert(old_id.clone()) {
			summary.duplicates += 1;
			progress.inc(1);
			continue;
		}

		jobs.push(TransformJob::new(
			old_id,
			row.zoom,
			row.column,
			row.row,
			&row.payload,
			&format,
			options.tmp_dir.as_deref(),
		)?);

		if jobs.len() >= TRANSFORM_BATCH_SIZE {
			let batch = std::mem::take(&mut jobs);
			settle_batch(store, &pool, batch, &mut seen, &mut summary, &progress, options).await?;
		}
	}

	if !jobs.is_empty() {
		settle_batch(store, &pool, jobs, &mut seen, &mut summary, &progress, options).await?;
	}

	progress.finish();
	log::info!(
		"{} tiles finished, {} duplicates ignored, {} vanished, {} failed",
		summary.total,
		summary.duplicates,
		summary.vanished,
		summary.failed
	);
	Ok(summary)
}

/// Batch barrier: all workers finish before any write is issued.
async fn settle_batch(
	store: &dyn TileStore,
	pool: &WorkerPool,
	jobs: Vec<TransformJob>,
	seen: &mut HashSet<String>,
	summary: &mut ProcessSummary,
	progress: &ProgressBar,
	options: &ProcessOptions,
) -> Result<()> {
	for outcome in pool.run_batch(jobs).await {
		match outcome.status {
			TileStatus::Transformed(bytes) => {
				let new_id = content_id(&bytes);
				// Repointed rows surface again in later pages under their
				// new id; marking it here keeps them counted as duplicates.
				seen.insert(new_id.clone());
				store.update_image(&outcome.content_id, &new_id, &bytes)?;
				summary.processed += 1;
			}
			TileStatus::Vanished => {
				summary.vanished += 1;
				if options.delete_vanished {
					log::debug!(
						"deleting vanished tile {}/{}/{}",
						outcome.zoom,
						outcome.column,
						outcome.row
					);
					store.delete_ref(outcome.zoom, outcome.column, outcome.row)?;
				} else {
					log::warn!("tile {}/{}/{} vanished", outcome.zoom, outcome.column, outcome.row);
				}
			}
			TileStatus::Failed => {
				summary.failed += 1;
			}
		}
		progress.inc(1);
	}
	Ok(())
}
