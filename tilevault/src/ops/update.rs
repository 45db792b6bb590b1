//! Incremental update: a degenerate merge bounded by the destination's
//! high-water mark.

use crate::ops::merge::{merge, MergeOptions, MergeSummary};
use anyhow::Result;
use tilevault_core::{TimeRange, ZoomRange};
use tilevault_store::{unix_now, SchemaMode, StoreError, TileStore};

#[derive(Clone, Debug, Default)]
pub struct UpdateOptions {
	pub zooms: ZoomRange,
	pub flip_y: bool,
	pub progress: bool,
}

/// Pull every tile the source received after the destination's last
/// absorbed `updated_at`. Both stores must already be compacted.
pub async fn update(destination: &dyn TileStore, source: &dyn TileStore, options: &UpdateOptions) -> Result<MergeSummary> {
	destination.setup_schema()?;

	if destination.schema_mode() != SchemaMode::Compacted || source.schema_mode() != SchemaMode::Compacted {
		return Err(StoreError::Schema("to update, both stores must already be compacted".to_string()).into());
	}

	let high_water = destination.max_updated_at()?;
	let times = TimeRange::new(high_water, unix_now());
	log::info!(
		"updating {} --> {} ({}, window {:?})",
		source.locator(),
		destination.locator(),
		options.zooms,
		times
	);

	merge(
		destination,
		source,
		&MergeOptions {
			zooms: options.zooms,
			times,
			flip_y: options.flip_y,
			progress: options.progress,
			..MergeOptions::default()
		},
	)
	.await
}
