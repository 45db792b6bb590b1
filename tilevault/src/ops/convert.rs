//! Convert between tile addresses and geographic bounding boxes.

use anyhow::{bail, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::io::Write;
use tilevault_core::{flip_row, GeoBBox, TileBBox, TileCoord, ZoomRange};

lazy_static! {
	static ref TILE: Regex = Regex::new(r"^(\d+)/(\d+)/(\d+)$").unwrap();
}

/// Convert a `z/x/y` tile address to its `west,south,east,north` bounds, or
/// a geographic bbox to the tile list covering it over the zoom range.
pub fn convert_value(input: &str, zooms: &ZoomRange, flip_y: bool, out: &mut dyn Write) -> Result<()> {
	let input = input.trim();

	if let Some(captures) = TILE.captures(input) {
		let zoom: u8 = captures[1].parse()?;
		let column: u32 = captures[2].parse()?;
		let mut row: u32 = captures[3].parse()?;
		TileCoord::new(zoom, column, row)?;
		if flip_y {
			row = flip_row(zoom, row);
		}
		writeln!(out, "{}", TileBBox::tile_bounds(zoom, column, row))?;
		return Ok(());
	}

	if let Ok(bbox) = GeoBBox::parse(input) {
		for zoom in zooms.iter() {
			let tiles = TileBBox::from_geo(&bbox, zoom)?;
			for (column, row) in tiles.iter() {
				let row = if flip_y { flip_row(zoom, row) } else { row };
				writeln!(out, "{zoom}/{column}/{row}")?;
			}
		}
		return Ok(());
	}

	bail!("'{input}' is neither a z/x/y tile nor a west,south,east,north bbox");
}
