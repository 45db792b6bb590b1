//! Run a check-style command over every tile and report the failures.
//!
//! Unlike [`process`](crate::ops::process), nothing is written back; the
//! command's exit code is the verdict.

use crate::ops::chain::{FilterChain, TileStatus, TransformJob, WorkerPool};
use crate::ops::TRANSFORM_BATCH_SIZE;
use anyhow::{ensure, Result};
use std::path::PathBuf;
use tilevault_core::{ProgressBar, TimeRange, ZoomRange};
use tilevault_store::{SchemaMode, StoreError, TileStore};

#[derive(Clone, Debug, Default)]
pub struct TestOptions {
	pub zooms: ZoomRange,
	/// The check command; `%s` is the tile's file path, exit 0 passes.
	pub commands: Vec<String>,
	/// Invert the expectation: exit 0 marks the tile as failing.
	pub revert: bool,
	pub pool_size: usize,
	pub tmp_dir: Option<PathBuf>,
	pub progress: bool,
}

#[derive(Debug, Default)]
pub struct TestReport {
	pub tested: u64,
	/// Tiles whose command outcome did not match the expectation.
	pub failing: Vec<(u8, u32, u32)>,
}

/// Run the first configured command against every tile in range, in the
/// worker pool. Every tile row is tested, shared payloads included.
pub async fn test_tiles(store: &dyn TileStore, options: &TestOptions) -> Result<TestReport> {
	ensure!(!options.commands.is_empty(), "a check command must be given");
	if store.schema_mode() != SchemaMode::Compacted {
		return Err(StoreError::Schema("testing tiles requires a compacted store".to_string()).into());
	}

	let chain = FilterChain::new(&options.commands[..1]).expect("one command");
	let pool = WorkerPool::new(chain, options.pool_size);
	let format = store
		.metadata()?
		.and_then(|m| m.get("format").cloned())
		.unwrap_or_else(|| "png".to_string());

	let total = store.tiles_count(&options.zooms, &TimeRange::default())?;
	log::info!("testing {} ({}, {total} tiles)", store.locator(), options.zooms);
	let progress = if options.progress {
		ProgressBar::new("tiles tested", total)
	} else {
		ProgressBar::hidden()
	};

	let mut report = TestReport::default();
	let mut jobs: Vec<TransformJob> = Vec::new();

	for row in store.iter_tiles_with_id(&options.zooms, &TimeRange::default())? {
		let row = row?;
		let id = row.content_id.unwrap_or_default();
		jobs.push(TransformJob::new(
			id,
			row.zoom,
			row.column,
			row.row,
			&row.payload,
			&format,
			options.tmp_dir.as_deref(),
		)?);

		if jobs.len() >= TRANSFORM_BATCH_SIZE {
			let batch = std::mem::take(&mut jobs);
			settle(&pool, batch, options.revert, &mut report, &progress).await;
		}
	}
	if !jobs.is_empty() {
		settle(&pool, jobs, options.revert, &mut report, &progress).await;
	}

	progress.finish();
	log::info!("{} tiles tested, {} failing", report.tested, report.failing.len());
	Ok(report)
}

async fn settle(pool: &WorkerPool, jobs: Vec<TransformJob>, revert: bool, report: &mut TestReport, progress: &ProgressBar) {
	for outcome in pool.run_batch(jobs).await {
		let passed = matches!(outcome.status, TileStatus::Transformed(_) | TileStatus::Vanished);
		if passed == revert {
			report.failing.push((outcome.zoom, outcome.column, outcome.row));
		}
		report.tested += 1;
		progress.inc(1);
	}
}
