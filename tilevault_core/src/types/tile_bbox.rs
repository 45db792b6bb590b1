use crate::types::{lon_lat_to_tile, tile_to_lon_lat, GeoBBox};
use anyhow::{ensure, Context, Result};
use std::fmt;

/// A rectangular, inclusive range of tiles at one zoom level.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TileBBox {
	pub zoom: u8,
	pub min_column: u32,
	pub min_row: u32,
	pub max_column: u32,
	pub max_row: u32,
}

impl TileBBox {
	/// Create a new `TileBBox`, validating bounds against the zoom level.
	///
	/// # Errors
	/// Returns an error if a corner is out of range or the box is inverted.
	pub fn new(zoom: u8, min_column: u32, min_row: u32, max_column: u32, max_row: u32) -> Result<TileBBox> {
		ensure!(zoom <= 30, "zoom ({zoom}) must be <= 30");
		let max = 1u32 << zoom;
		ensure!(max_column < max, "max_column ({max_column}) out of bounds for zoom {zoom}");
		ensure!(max_row < max, "max_row ({max_row}) out of bounds for zoom {zoom}");
		ensure!(min_column <= max_column, "min_column ({min_column}) must be <= max_column ({max_column})");
		ensure!(min_row <= max_row, "min_row ({min_row}) must be <= max_row ({max_row})");
		Ok(TileBBox {
			zoom,
			min_column,
			min_row,
			max_column,
			max_row,
		})
	}

	/// Parse a `min_column,min_row,max_column,max_row` string at a zoom level.
	pub fn parse(value: &str, zoom: u8) -> Result<TileBBox> {
		let parts: Vec<u32> = value
			.split(',')
			.map(|s| {
				s.trim()
					.parse::<u32>()
					.with_context(|| format!("invalid tile index {:?} in tile bbox {value:?}", s.trim()))
			})
			.collect::<Result<_>>()?;
		ensure!(
			parts.len() == 4,
			"tile bbox {value:?} must have 4 values, got {}",
			parts.len()
		);
		TileBBox::new(zoom, parts[0], parts[1], parts[2], parts[3])
	}

	/// The tile range covering a geographic bounding box at a zoom level.
	///
	/// Projects both corners and reorders rows, since latitude grows north
	/// while XYZ rows grow south.
	pub fn from_geo(bbox: &GeoBBox, zoom: u8) -> Result<TileBBox> {
		let (min_column, row_a) = lon_lat_to_tile(bbox.west, bbox.south, zoom);
		let (max_column, row_b) = lon_lat_to_tile(bbox.east, bbox.north, zoom);
		let (min_row, max_row) = if row_a <= row_b { (row_a, row_b) } else { (row_b, row_a) };
		TileBBox::new(zoom, min_column, min_row, max_column, max_row)
	}

	/// The geographic bounds of a single tile, built from its edges.
	#[must_use]
	pub fn tile_bounds(zoom: u8, column: u32, row: u32) -> GeoBBox {
		let (west, south) = tile_to_lon_lat(f64::from(column) - 0.5, f64::from(row) + 0.5, zoom);
		let (east, north) = tile_to_lon_lat(f64::from(column) + 0.5, f64::from(row) - 0.5, zoom);
		GeoBBox {
			west,
			south,
			east,
			north,
		}
	}

	/// Number of tiles in the box.
	#[must_use]
	pub fn count(&self) -> u64 {
		u64::from(self.max_column - self.min_column + 1) * u64::from(self.max_row - self.min_row + 1)
	}

	/// Iterate over all `(column, row)` pairs in the box, column-major.
	pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
		(self.min_column..=self.max_column)
			.flat_map(move |column| (self.min_row..=self.max_row).map(move |row| (column, row)))
	}
}

impl fmt::Debug for TileBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"{}: [{},{},{},{}]",
			self.zoom, self.min_column, self.min_row, self.max_column, self.max_row
		)
	}
}
