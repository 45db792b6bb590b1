//! List every tile coordinate of a store.

use anyhow::Result;
use std::io::Write;
use tilevault_core::{flip_row, TileBBox, ZoomRange};
use tilevault_store::TileStore;

#[derive(Clone, Debug, Default)]
pub struct TileListOptions {
	pub zooms: ZoomRange,
	pub flip_y: bool,
	/// Print geographic bounding boxes instead of `z/x/y` lines.
	pub as_bboxes: bool,
}

/// Write one line per tile ref in the zoom range.
pub fn tile_list(store: &dyn TileStore, options: &TileListOptions, out: &mut dyn Write) -> Result<u64> {
	let mut count = 0u64;
	for zoom in options.zooms.iter() {
		for (column, row) in store.coordinates(zoom)? {
			let row = if options.flip_y { flip_row(zoom, row) } else { row };
			if options.as_bboxes {
				writeln!(out, "{}", TileBBox::tile_bounds(zoom, column, row))?;
			} else {
				writeln!(out, "{zoom}/{column}/{row}")?;
			}
			count += 1;
		}
	}
	Ok(count)
}
