use anyhow::{ensure, Context, Result};
use std::fmt;

/// A geographic bounding box as `west, south, east, north` in degrees.
#[derive(Clone, Copy, PartialEq)]
pub struct GeoBBox {
	pub west: f64,
	pub south: f64,
	pub east: f64,
	pub north: f64,
}

impl GeoBBox {
	/// Create a new `GeoBBox`, validating the coordinate ranges.
	///
	/// # Errors
	/// Returns an error if a bound is outside its valid range or the box is
	/// inverted.
	pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<GeoBBox> {
		ensure!(west >= -180.0 && west <= 180.0, "west ({west}) out of range");
		ensure!(east >= -180.0 && east <= 180.0, "east ({east}) out of range");
		ensure!(south >= -90.0 && south <= 90.0, "south ({south}) out of range");
		ensure!(north >= -90.0 && north <= 90.0, "north ({north}) out of range");
		ensure!(west <= east, "west ({west}) must be <= east ({east})");
		ensure!(south <= north, "south ({south}) must be <= north ({north})");
		Ok(GeoBBox {
			west,
			south,
			east,
			north,
		})
	}

	/// Parse a `west,south,east,north` string.
	pub fn parse(value: &str) -> Result<GeoBBox> {
		let parts: Vec<f64> = value
			.split(',')
			.map(|s| {
				s.trim()
					.parse::<f64>()
					.with_context(|| format!("invalid coordinate {:?} in bbox {value:?}", s.trim()))
			})
			.collect::<Result<_>>()?;
		ensure!(parts.len() == 4, "bbox {value:?} must have 4 values, got {}", parts.len());
		GeoBBox::new(parts[0], parts[1], parts[2], parts[3])
	}
}

impl fmt::Display for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
	}
}

impl fmt::Debug for GeoBBox {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parse_valid() {
		let bbox = GeoBBox::parse("13.08,52.33,13.76,52.68").unwrap();
		assert_eq!(bbox.west, 13.08);
		assert_eq!(bbox.north, 52.68);
	}

	#[test]
	fn parse_rejects_garbage() {
		assert!(GeoBBox::parse("1,2,3").is_err());
		assert!(GeoBBox::parse("a,b,c,d").is_err());
		assert!(GeoBBox::parse("10,20,5,30").is_err());
	}
}
