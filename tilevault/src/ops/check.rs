//! Structural integrity check: flag holes inside the occupied bounding box
//! of every zoom level.

use anyhow::Result;
use tilevault_core::{flip_row, ZoomRange};
use tilevault_store::TileStore;

#[derive(Clone, Debug, Default)]
pub struct CheckOptions {
	pub zooms: ZoomRange,
	/// Report missing rows in XYZ instead of the stored convention.
	pub flip_y: bool,
}

#[derive(Debug, Default)]
pub struct CheckReport {
	/// Every `(zoom, column, row)` absent from its level's bounding box.
	pub missing: Vec<(u8, u32, u32)>,
}

impl CheckReport {
	#[must_use]
	pub fn passed(&self) -> bool {
		self.missing.is_empty()
	}
}

/// Scan each zoom level present and in range: compute the occupied bounding
/// box, then flag every column absent from each row's occupied set.
pub fn check(store: &dyn TileStore, options: &CheckOptions) -> Result<CheckReport> {
	log::info!("checking {} ({})", store.locator(), options.zooms);

	let mut report = CheckReport::default();

	for zoom in store.zoom_levels()? {
		if !options.zooms.contains(zoom) {
			continue;
		}
		let Some((min_column, max_column, min_row, max_row)) = store.bounding_box(zoom)? else {
			continue;
		};
		log::debug!("checking zoom level {zoom}, columns {min_column}-{max_column}, rows {min_row}-{max_row}");

		for row in min_row..=max_row {
			let columns = store.columns_for_row(zoom, row)?;
			for column in min_column..=max_column {
				if !columns.contains(&column) {
					let reported = if options.flip_y { flip_row(zoom, row) } else { row };
					report.missing.push((zoom, column, reported));
				}
			}
		}
	}

	if !report.passed() {
		log::error!("{} missing tiles (zoom/column/row):", report.missing.len());
		for (zoom, column, row) in &report.missing {
			log::error!("  {zoom}/{column}/{row}");
		}
	}

	Ok(report)
}
