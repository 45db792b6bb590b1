//! Tile coordinates in a Web Mercator pyramid.
//!
//! A [`TileCoord`] addresses one tile by `(zoom, column, row)`. Rows follow
//! whatever convention the surrounding store uses; [`flip_row`] converts
//! between the north-origin (XYZ) and south-origin (TMS) numbering.

use anyhow::{ensure, Result};
use std::f64::consts::PI;
use std::fmt;

/// Latitude bound of the Web Mercator projection in degrees.
const LATITUDE_LIMIT: f64 = 85.0511;

/// A single tile address `(zoom, column, row)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
	/// The zoom level of the tile.
	pub zoom: u8,
	/// The x index of the tile.
	pub column: u32,
	/// The y index of the tile.
	pub row: u32,
}

impl TileCoord {
	/// Create a new `TileCoord`, validating that both indices fit the level.
	///
	/// # Errors
	/// Returns an error if `zoom` > 30 or an index is out of bounds.
	pub fn new(zoom: u8, column: u32, row: u32) -> Result<TileCoord> {
		ensure!(zoom <= 30, "zoom ({zoom}) must be <= 30");
		let max = 1u32 << zoom;
		ensure!(column < max, "column ({column}) out of bounds for zoom {zoom}");
		ensure!(row < max, "row ({row}) out of bounds for zoom {zoom}");
		Ok(TileCoord { zoom, column, row })
	}

	/// The tile containing the given longitude/latitude at this zoom level.
	pub fn from_lon_lat(lon: f64, lat: f64, zoom: u8) -> Result<TileCoord> {
		ensure!(zoom <= 30, "zoom ({zoom}) must be <= 30");
		let (column, row) = lon_lat_to_tile(lon, lat, zoom);
		TileCoord::new(zoom, column, row)
	}

	/// The longitude/latitude of the center of this tile.
	#[must_use]
	pub fn center_lon_lat(&self) -> (f64, f64) {
		tile_to_lon_lat(f64::from(self.column), f64::from(self.row), self.zoom)
	}

	/// Flip the row between XYZ and TMS numbering in place.
	pub fn flip_row(&mut self) {
		self.row = flip_row(self.zoom, self.row);
	}
}

impl fmt::Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
	}
}

/// Convert a longitude/latitude to tile indices at the given zoom level.
///
/// The latitude is clamped to the Web Mercator limit (±85.0511°) before
/// projection, and the resulting indices are clamped to the valid tile range
/// so that the antimeridian and the poles land on the outermost tiles.
pub fn lon_lat_to_tile(lon: f64, lat: f64, zoom: u8) -> (u32, u32) {
	let n = 2f64.powi(i32::from(zoom));
	let lat_rad = lat.clamp(-LATITUDE_LIMIT, LATITUDE_LIMIT).to_radians();

	let x = ((lon + 180.0) / 360.0 * n).floor();
	let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

	let max = n - 1.0;
	(x.clamp(0.0, max) as u32, y.clamp(0.0, max) as u32)
}

/// Convert (fractional) tile indices to the longitude/latitude of the tile
/// center. Passing `column - 0.5` / `column + 0.5` yields the tile edges.
pub fn tile_to_lon_lat(column: f64, row: f64, zoom: u8) -> (f64, f64) {
	let n = 2f64.powi(i32::from(zoom));
	let lon = (column + 0.5) / n * 360.0 - 180.0;
	let lat = (PI * (1.0 - 2.0 * (row + 0.5) / n)).sinh().atan().to_degrees();
	(lon, lat)
}

/// Flip a row index between the XYZ and TMS conventions: `(2^zoom - 1) - row`.
#[must_use]
pub fn flip_row(zoom: u8, row: u32) -> u32 {
	((1u32 << zoom) - 1) - row
}
