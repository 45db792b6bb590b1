//! Directory-tree interchange: `metadata.json` plus
//! `tiles/<zoom>/<column>/<row>.<ext>`.

use crate::ops::chain::FilterChain;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tilevault_core::{flip_row, ProgressBar, TimeRange, ZoomRange};
use tilevault_store::{content_id, SchemaMode, StoreError, TileStore};

#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
	pub zooms: ZoomRange,
	pub flip_y: bool,
	pub commands: Vec<String>,
	pub tmp_dir: Option<PathBuf>,
	pub skip_analyze: bool,
	pub skip_vacuum: bool,
	pub progress: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
	pub zooms: ZoomRange,
	pub times: TimeRange,
	pub flip_y: bool,
	pub commands: Vec<String>,
	pub delete_after: bool,
	pub tmp_dir: Option<PathBuf>,
	pub skip_analyze: bool,
	pub skip_vacuum: bool,
	pub progress: bool,
}

/// Import a directory tree into a compacted store.
///
/// Re-importing the same tree is idempotent: payloads collapse by content
/// id and refs are upserted per coordinate.
pub async fn import_directory(store: &dyn TileStore, directory: &Path, options: &ImportOptions) -> Result<u64> {
	store.setup_schema()?;
	if store.schema_mode() != SchemaMode::Compacted {
		return Err(StoreError::Schema("importing requires a compacted store".to_string()).into());
	}

	log::info!("importing '{}' --> {} ({})", directory.display(), store.locator(), options.zooms);

	let format = restore_metadata(store, directory)?;
	let chain = FilterChain::new(&options.commands);

	let mut count = 0u64;
	let mut known: HashSet<String> = HashSet::new();

	for (zoom, column, row, path) in walk_tiles(&directory.join("tiles"), &options.zooms)? {
		let payload = fs::read(&path).with_context(|| format!("reading tile {path:?}"))?;
		let payload = match &chain {
			Some(chain) => match chain.apply(&payload, &format, options.tmp_dir.as_deref()).await? {
				Some(bytes) => bytes,
				None => {
					log::warn!("tile {zoom}/{column}/{row} vanished");
					continue;
				}
			},
			None => payload,
		};

		let target_row = if options.flip_y { flip_row(zoom, row) } else { row };
		let id = content_id(&payload);
		if known.insert(id.clone()) {
			store.insert_image(&id, &payload)?;
		}
		store.insert_ref(zoom, column, target_row, &id, true)?;

		count += 1;
		if count % 100 == 0 {
			log::debug!("{count} tiles imported");
		}
	}

	log::info!("{count} tiles imported");
	store.optimize(options.skip_analyze, options.skip_vacuum)?;
	Ok(count)
}

/// Export a store into a directory tree.
pub async fn export_directory(store: &dyn TileStore, directory: &Path, options: &ExportOptions) -> Result<u64> {
	if !options.times.is_unbounded() && store.schema_mode() == SchemaMode::Legacy {
		return Err(StoreError::Schema("timestamp windows can only be used with a compacted source".to_string()).into());
	}

	log::info!("exporting {} --> '{}' ({})", store.locator(), directory.display(), options.zooms);

	fs::create_dir_all(directory.join("tiles"))?;

	let metadata = store.metadata()?.unwrap_or_default();
	let file = fs::File::create(directory.join("metadata.json"))?;
	serde_json::to_writer_pretty(file, &metadata)?;

	let format = metadata.get("format").cloned().unwrap_or_else(|| "png".to_string());
	let chain = FilterChain::new(&options.commands);

	let total = store.tiles_count(&options.zooms, &options.times)?;
	let progress = if options.progress {
		ProgressBar::new("tiles exported", total)
	} else {
		ProgressBar::hidden()
	};

	let mut count = 0u64;
	for row in store.iter_tiles(&options.zooms, &options.times)? {
		let row = row?;
		let payload = match &chain {
			Some(chain) => match chain.apply(&row.payload, &format, options.tmp_dir.as_deref()).await? {
				Some(bytes) => bytes,
				None => {
					log::warn!("tile {}/{}/{} vanished", row.zoom, row.column, row.row);
					progress.inc(1);
					continue;
				}
			},
			None => row.payload,
		};

		let target_row = if options.flip_y { flip_row(row.zoom, row.row) } else { row.row };
		let tile_dir = directory.join("tiles").join(row.zoom.to_string()).join(row.column.to_string());
		fs::create_dir_all(&tile_dir)?;
		fs::write(tile_dir.join(format!("{target_row}.{format}")), &payload)?;

		count += 1;
		progress.inc(1);
	}

	progress.finish();
	log::info!("{count} of {total} tiles exported");

	if options.delete_after {
		log::warn!("removing exported tiles from {}", store.locator());
		store.delete_tiles(&options.zooms, &options.times)?;
		store.optimize(options.skip_analyze, options.skip_vacuum)?;
	}

	Ok(count)
}

/// Read `metadata.json`, enforce format consistency, and restore the
/// entries when the store has none yet. Returns the effective tile format.
fn restore_metadata(store: &dyn TileStore, directory: &Path) -> Result<String> {
	let path = directory.join("metadata.json");
	if !path.is_file() {
		log::warn!("metadata.json not found");
		return Ok("png".to_string());
	}

	let text = fs::read_to_string(&path)?;
	let imported: BTreeMap<String, String> =
		serde_json::from_str(&text).with_context(|| format!("parsing {path:?}"))?;
	let format = imported.get("format").cloned().unwrap_or_else(|| "png".to_string());

	let existing = store.metadata()?.unwrap_or_default();
	if existing.is_empty() {
		for (name, value) in &imported {
			store.update_metadata(name, value)?;
		}
		log::info!("metadata from metadata.json restored");
	} else if let Some(current) = existing.get("format") {
		if *current != format {
			return Err(StoreError::FormatMismatch(current.clone(), format).into());
		}
	}

	Ok(format)
}

/// Collect `(zoom, column, row, path)` for every tile file in range.
fn walk_tiles(tiles_dir: &Path, zooms: &ZoomRange) -> Result<Vec<(u8, u32, u32, PathBuf)>> {
	let mut found = Vec::new();
	if !tiles_dir.is_dir() {
		return Ok(found);
	}

	for zoom_entry in fs::read_dir(tiles_dir)? {
		let zoom_entry = zoom_entry?;
		let Some(zoom) = parse_name::<u8>(&zoom_entry.file_name()) else {
			continue;
		};
		if !zooms.contains(zoom) || !zoom_entry.path().is_dir() {
			continue;
		}
		for column_entry in fs::read_dir(zoom_entry.path())? {
			let column_entry = column_entry?;
			let Some(column) = parse_name::<u32>(&column_entry.file_name()) else {
				continue;
			};
			if !column_entry.path().is_dir() {
				continue;
			}
			for tile_entry in fs::read_dir(column_entry.path())? {
				let tile_entry = tile_entry?;
				let path = tile_entry.path();
				let Some(row) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse::<u32>().ok()) else {
					continue;
				};
				if path.is_file() {
					found.push((zoom, column, row, path));
				}
			}
		}
	}
	Ok(found)
}

fn parse_name<T: std::str::FromStr>(name: &std::ffi::OsStr) -> Option<T> {
	name.to_str().and_then(|s| s.parse::<T>().ok())
}
