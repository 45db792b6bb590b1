//! Fill a coordinate range with a single image.
//!
//! The payload is inserted once; every coordinate in the box gets a ref
//! unless one already exists, so filling never overwrites.

use anyhow::{ensure, Context, Result};
use std::fs;
use std::path::Path;
use tilevault_core::{flip_row, GeoBBox, ProgressBar, TileBBox, ZoomRange};
use tilevault_store::{content_id, SchemaMode, StoreError, TileStore};

#[derive(Clone, Debug, Default)]
pub struct FillOptions {
	pub zooms: ZoomRange,
	pub flip_y: bool,
	/// Geographic bounding box, projected per zoom level.
	pub bbox: Option<GeoBBox>,
	/// Tile bounding box `min_col,min_row,max_col,max_row`; single zoom only.
	pub tile_bbox: Option<String>,
	pub progress: bool,
}

/// Insert one image file across a tile range.
pub fn fill(store: &dyn TileStore, image_path: &Path, options: &FillOptions) -> Result<u64> {
	store.setup_schema()?;
	if store.schema_mode() != SchemaMode::Compacted {
		return Err(StoreError::Schema("filling tiles requires a compacted store".to_string()).into());
	}
	ensure!(
		options.bbox.is_some() || options.tile_bbox.is_some(),
		"either a tile bbox or a geographic bbox must be given"
	);
	ensure!(
		options.tile_bbox.is_none() || options.zooms.min == options.zooms.max,
		"a tile bbox can only be used with a single zoom level"
	);

	let payload = fs::read(image_path).with_context(|| format!("reading fill image {image_path:?}"))?;
	let id = content_id(&payload);
	store.insert_image(&id, &payload)?;

	log::info!("filling {} ({})", store.locator(), options.zooms);

	let total: u64 = options
		.zooms
		.iter()
		.map(|zoom| bbox_for_zoom(options, zoom).map(|b| b.count()))
		.sum::<Result<u64>>()?;
	let progress = if options.progress {
		ProgressBar::new("tiles inserted", total)
	} else {
		ProgressBar::hidden()
	};

	let mut inserted = 0u64;
	for zoom in options.zooms.iter() {
		let bbox = bbox_for_zoom(options, zoom)?;
		for (column, row) in bbox.iter() {
			let target_row = if options.flip_y { flip_row(zoom, row) } else { row };
			store.insert_ref(zoom, column, target_row, &id, false)?;
			inserted += 1;
			progress.inc(1);
		}
	}

	progress.finish();
	log::info!("{inserted} tiles inserted");
	Ok(inserted)
}

fn bbox_for_zoom(options: &FillOptions, zoom: u8) -> Result<TileBBox> {
	match (&options.tile_bbox, &options.bbox) {
		(Some(tile_bbox), _) => TileBBox::parse(tile_bbox, zoom),
		(None, Some(geo)) => TileBBox::from_geo(geo, zoom),
		(None, None) => unreachable!("validated above"),
	}
}
