//! Merge one tile store into another.
//!
//! The receiver must be compacted. Tiles stream from the source in bounded
//! batches; content ids are recomputed at the destination, so identical
//! payloads collapse onto one image row no matter where they came from. No
//! single transaction spans the whole run, so an interrupted merge leaves the
//! committed batches in place and re-running is safe.

use crate::ops::chain::{FilterChain, TileStatus, TransformJob, WorkerPool};
use crate::ops::check::{check, CheckOptions};
use crate::ops::{flush_refs, REF_BATCH_SIZE, TRANSFORM_BATCH_SIZE};
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tilevault_core::{flip_row, ProgressBar, TimeRange, ZoomRange};
use tilevault_store::{content_id, unix_now, SchemaMode, StoreError, TileRef, TileStore};

#[derive(Clone, Debug)]
pub struct MergeOptions {
	pub zooms: ZoomRange,
	/// Half-open `updated_at` window; requires a compacted source.
	pub times: TimeRange,
	/// Flip the destination row between XYZ and TMS before inserting.
	pub flip_y: bool,
	/// Never touch coordinates that already exist in the destination.
	pub no_overwrite: bool,
	/// External filter chain applied to every distinct payload.
	pub commands: Vec<String>,
	/// Delete the transferred tiles from the source on success.
	pub delete_after: bool,
	/// Run a structural check on the source first; abort on gaps.
	pub check_before: bool,
	/// Delete the destination tile when a transform output vanishes,
	/// instead of only warning.
	pub delete_vanished: bool,
	/// Worker pool size; 0 selects the host parallelism.
	pub pool_size: usize,
	pub tmp_dir: Option<PathBuf>,
	pub skip_analyze: bool,
	pub skip_vacuum: bool,
	pub progress: bool,
}

impl Default for MergeOptions {
	fn default() -> Self {
		MergeOptions {
			zooms: ZoomRange::default(),
			times: TimeRange::default(),
			flip_y: false,
			no_overwrite: false,
			commands: Vec::new(),
			delete_after: false,
			check_before: false,
			delete_vanished: false,
			pool_size: 0,
			tmp_dir: None,
			skip_analyze: false,
			skip_vacuum: false,
			progress: false,
		}
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeSummary {
	/// Tiles matching the filter in the source.
	pub total: u64,
	/// Tiles upserted into the destination.
	pub transferred: u64,
	/// Tiles skipped by the no-overwrite pre-scan.
	pub skipped: u64,
	/// Transform outputs that went missing.
	pub vanished: u64,
	/// Filter chains that exited nonzero.
	pub failed: u64,
}

/// Occupied destination coordinates, zoom → row → columns.
type CoordinateSet = HashMap<u8, HashMap<u32, HashSet<u32>>>;

pub async fn merge(destination: &dyn TileStore, source: &dyn TileStore, options: &MergeOptions) -> Result<MergeSummary> {
	destination.setup_schema()?;

	if destination.schema_mode() != SchemaMode::Compacted {
		return Err(
			StoreError::Schema("to merge two stores, the receiver must already be compacted".to_string()).into(),
		);
	}
	if !options.times.is_unbounded() && source.schema_mode() == SchemaMode::Legacy {
		return Err(StoreError::Schema("timestamp windows can only be used with a compacted source".to_string()).into());
	}

	if options.check_before {
		let report = check(
			source,
			&CheckOptions {
				zooms: options.zooms,
				flip_y: false,
			},
		)?;
		if !report.passed() {
			return Err(StoreError::IntegrityFailure(report.missing.len()).into());
		}
	}

	reconcile_format(destination, source)?;

	let total = source.tiles_count(&options.zooms, &options.times)?;
	if total == 0 {
		log::info!("no tiles to transfer");
		return Ok(MergeSummary::default());
	}

	log::info!(
		"merging {} --> {} ({}, {total} tiles)",
		source.locator(),
		destination.locator(),
		options.zooms
	);

	let existing = if options.no_overwrite {
		Some(scan_coordinates(destination, &options.zooms)?)
	} else {
		None
	};

	let progress = if options.progress {
		ProgressBar::new("tiles merged", total)
	} else {
		ProgressBar::hidden()
	};

	let mut summary = MergeSummary {
		total,
		..MergeSummary::default()
	};

	let chain = FilterChain::new(&options.commands);
	match (source.schema_mode(), chain) {
		(SchemaMode::Compacted, Some(chain)) => {
			merge_compacted_transformed(destination, source, options, chain, existing, &progress, &mut summary).await?
		}
		(SchemaMode::Compacted, None) => {
			merge_compacted(destination, source, options, existing, &progress, &mut summary)?
		}
		(SchemaMode::Legacy, chain) => {
			merge_legacy(destination, source, options, chain, existing, &progress, &mut summary).await?
		}
	}

	progress.finish();
	log::info!("{} of {total} tiles merged", summary.transferred);

	if options.delete_after {
		log::warn!("removing transferred tiles from {}", source.locator());
		source.delete_tiles(&options.zooms, &options.times)?;
		source.optimize(options.skip_analyze, options.skip_vacuum)?;
	}

	Ok(summary)
}

/// Both stores must agree on the tile format; the destination inherits the
/// source's format when it has none. An absent source format is assumed to
/// be png.
fn reconcile_format(destination: &dyn TileStore, source: &dyn TileStore) -> Result<String> {
	let destination_format = destination.metadata()?.and_then(|m| m.get("format").cloned());
	let format = match source.metadata()?.and_then(|m| m.get("format").cloned()) {
		Some(format) => format,
		None => {
			log::info!("no tile format found in the source, assuming 'png'");
			"png".to_string()
		}
	};

	match destination_format {
		Some(existing) if existing != format => Err(StoreError::FormatMismatch(existing, format).into()),
		Some(existing) => Ok(existing),
		None => {
			destination.update_metadata("format", &format)?;
			Ok(format)
		}
	}
}

/// Materialize the destination's occupied coordinates for the zoom range.
/// Held fully in memory; a known scalability limit for very large stores.
fn scan_coordinates(store: &dyn TileStore, zooms: &ZoomRange) -> Result<CoordinateSet> {
	let mut set: CoordinateSet = HashMap::new();
	for zoom in zooms.iter() {
		let rows = set.entry(zoom).or_default();
		for (column, row) in store.coordinates(zoom)? {
			rows.entry(row).or_default().insert(column);
		}
	}
	Ok(set)
}

fn is_occupied(existing: &Option<CoordinateSet>, zoom: u8, column: u32, row: u32) -> bool {
	existing
		.as_ref()
		.and_then(|set| set.get(&zoom))
		.and_then(|rows| rows.get(&row))
		.is_some_and(|columns| columns.contains(&column))
}

/// Compacted source, no filter chain: rehash on first occurrence of each
/// source content id, then reuse the mapping.
fn merge_compacted(
	destination: &dyn TileStore,
	source: &dyn TileStore,
	options: &MergeOptions,
	existing: Option<CoordinateSet>,
	progress: &ProgressBar,
	summary: &mut MergeSummary,
) -> Result<()> {
	let mut known: HashMap<String, String> = HashMap::new();
	let mut images: Vec<(String, Vec<u8>)> = Vec::new();
	let mut refs: Vec<TileRef> = Vec::new();

	for row in source.iter_tiles_with_id(&options.zooms, &options.times)? {
		let row = row?;
		let old_id = row.content_id.context("dedup-aware iterator returned no content id")?;
		let target_row = if options.flip_y { flip_row(row.zoom, row.row) } else { row.row };

		if is_occupied(&existing, row.zoom, row.column, target_row) {
			summary.skipped += 1;
			progress.inc(1);
			continue;
		}

		let new_id = match known.get(&old_id) {
			Some(new_id) => new_id.clone(),
			None => {
				let new_id = content_id(&row.payload);
				images.push((new_id.clone(), row.payload));
				known.insert(old_id, new_id.clone());
				new_id
			}
		};

		refs.push(TileRef {
			zoom: row.zoom,
			column: row.column,
			row: target_row,
			content_id: new_id,
			updated_at: unix_now(),
		});
		summary.transferred += 1;
		progress.inc(1);

		if images.len() >= REF_BATCH_SIZE {
			destination.insert_images(&images)?;
			images.clear();
		}
		if refs.len() >= REF_BATCH_SIZE {
			flush_refs(destination, &mut refs)?;
		}
	}

	if !images.is_empty() {
		destination.insert_images(&images)?;
	}
	flush_refs(destination, &mut refs)
}

/// Compacted source with a filter chain: every distinct source content id
/// goes through the worker pool exactly once; repeats reuse the old → new
/// mapping without re-invoking the commands.
async fn merge_compacted_transformed(
	destination: &dyn TileStore,
	source: &dyn TileStore,
	options: &MergeOptions,
	chain: FilterChain,
	existing: Option<CoordinateSet>,
	progress: &ProgressBar,
	summary: &mut MergeSummary,
) -> Result<()> {
	let format = destination
		.metadata()?
		.and_then(|m| m.get("format").cloned())
		.unwrap_or_else(|| "png".to_string());
	let pool = WorkerPool::new(chain, options.pool_size);

	let mut known: HashMap<String, String> = HashMap::new();
	let mut jobs: Vec<TransformJob> = Vec::new();
	// Coordinates waiting for a transform of the same source id, so each
	// distinct payload is dispatched once even within a batch.
	let mut waiting: HashMap<String, Vec<(u8, u32, u32)>> = HashMap::new();
	let mut refs: Vec<TileRef> = Vec::new();

	for row in source.iter_tiles_with_id(&options.zooms, &options.times)? {
		let row = row?;
		let old_id = row.content_id.context("dedup-aware iterator returned no content id")?;
		let target_row = if options.flip_y { flip_row(row.zoom, row.row) } else { row.row };

		if is_occupied(&existing, row.zoom, row.column, target_row) {
			summary.skipped += 1;
			progress.inc(1);
			continue;
		}

		if let Some(new_id) = known.get(&old_id) {
			refs.push(TileRef {
				zoom: row.zoom,
				column: row.column,
				row: target_row,
				content_id: new_id.clone(),
				updated_at: unix_now(),
			});
			summary.transferred += 1;
			progress.inc(1);
			if refs.len() >= REF_BATCH_SIZE {
				flush_refs(destination, &mut refs)?;
			}
			continue;
		}

		if let Some(coords) = waiting.get_mut(&old_id) {
			coords.push((row.zoom, row.column, target_row));
			continue;
		}

		waiting.insert(old_id.clone(), vec![(row.zoom, row.column, target_row)]);
		jobs.push(TransformJob::new(
			old_id,
			row.zoom,
			row.column,
			target_row,
			&row.payload,
			&format,
			options.tmp_dir.as_deref(),
		)?);

		if jobs.len() >= TRANSFORM_BATCH_SIZE {
			let batch = std::mem::take(&mut jobs);
			settle_transform_batch(
				destination,
				&pool,
				batch,
				&mut waiting,
				&mut known,
				&mut refs,
				options,
				progress,
				summary,
			)
			.await?;
		}
	}

	if !jobs.is_empty() {
		settle_transform_batch(
			destination,
			&pool,
			jobs,
			&mut waiting,
			&mut known,
			&mut refs,
			options,
			progress,
			summary,
		)
		.await?;
	}
	flush_refs(destination, &mut refs)
}

/// Wait for a whole batch of workers (synchronous barrier), then do all
/// database writes on this task.
#[allow(clippy::too_many_arguments)]
async fn settle_transform_batch(
	destination: &dyn TileStore,
	pool: &WorkerPool,
	jobs: Vec<TransformJob>,
	waiting: &mut HashMap<String, Vec<(u8, u32, u32)>>,
	known: &mut HashMap<String, String>,
	refs: &mut Vec<TileRef>,
	options: &MergeOptions,
	progress: &ProgressBar,
	summary: &mut MergeSummary,
) -> Result<()> {
	for outcome in pool.run_batch(jobs).await {
		let coords = waiting.remove(&outcome.content_id).unwrap_or_default();
		match outcome.status {
			TileStatus::Transformed(bytes) => {
				let new_id = content_id(&bytes);
				destination.insert_image(&new_id, &bytes)?;
				known.insert(outcome.content_id, new_id.clone());
				for (zoom, column, row) in coords {
					refs.push(TileRef {
						zoom,
						column,
						row,
						content_id: new_id.clone(),
						updated_at: unix_now(),
					});
					summary.transferred += 1;
					progress.inc(1);
				}
			}
			TileStatus::Vanished => {
				for (zoom, column, row) in coords {
					summary.vanished += 1;
					if options.delete_vanished {
						log::debug!("deleting vanished tile {zoom}/{column}/{row}");
						destination.delete_ref(zoom, column, row)?;
					} else {
						log::warn!("tile {zoom}/{column}/{row} vanished");
					}
					progress.inc(1);
				}
			}
			TileStatus::Failed => {
				summary.failed += coords.len() as u64;
				progress.inc(coords.len() as u64);
			}
		}
		if refs.len() >= REF_BATCH_SIZE {
			flush_refs(destination, refs)?;
		}
	}
	Ok(())
}

/// Legacy source: no content ids to reuse, every row is hashed; identical
/// transformed payloads still collapse at the destination.
async fn merge_legacy(
	destination: &dyn TileStore,
	source: &dyn TileStore,
	options: &MergeOptions,
	chain: Option<FilterChain>,
	existing: Option<CoordinateSet>,
	progress: &ProgressBar,
	summary: &mut MergeSummary,
) -> Result<()> {
	let format = destination
		.metadata()?
		.and_then(|m| m.get("format").cloned())
		.unwrap_or_else(|| "png".to_string());

	let mut known: HashSet<String> = HashSet::new();
	let mut refs: Vec<TileRef> = Vec::new();

	for row in source.iter_tiles(&options.zooms, &TimeRange::default())? {
		let row = row?;
		let target_row = if options.flip_y { flip_row(row.zoom, row.row) } else { row.row };

		if is_occupied(&existing, row.zoom, row.column, target_row) {
			summary.skipped += 1;
			progress.inc(1);
			continue;
		}

		let payload = match &chain {
			Some(chain) => match chain.apply(&row.payload, &format, options.tmp_dir.as_deref()).await? {
				Some(bytes) => bytes,
				None => {
					summary.vanished += 1;
					log::warn!("tile {}/{}/{} vanished", row.zoom, row.column, target_row);
					progress.inc(1);
					continue;
				}
			},
			None => row.payload,
		};

		let id = content_id(&payload);
		if known.insert(id.clone()) {
			destination.insert_image(&id, &payload)?;
		}
		refs.push(TileRef {
			zoom: row.zoom,
			column: row.column,
			row: target_row,
			content_id: id,
			updated_at: unix_now(),
		});
		summary.transferred += 1;
		progress.inc(1);

		if refs.len() >= REF_BATCH_SIZE {
			flush_refs(destination, &mut refs)?;
		}
	}

	flush_refs(destination, &mut refs)
}
