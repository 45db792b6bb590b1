//! Age-based tile expiry.

use anyhow::Result;
use tilevault_core::ZoomRange;
use tilevault_store::{unix_now, TileStore};

#[derive(Clone, Debug, Default)]
pub struct ExpireOptions {
	pub zooms: ZoomRange,
	/// Delete refs older than this many days; 0 disables the run.
	pub days: u64,
	pub skip_analyze: bool,
	pub skip_vacuum: bool,
}

/// Delete refs whose `updated_at` predates the age threshold, then run the
/// optimize housekeeping.
pub fn expire(store: &dyn TileStore, options: &ExpireOptions) -> Result<u64> {
	if options.days == 0 {
		return Ok(0);
	}

	let cutoff = unix_now() - (options.days as i64) * 86400;
	log::info!(
		"expiring tiles from {} older than {} days ({})",
		store.locator(),
		options.days,
		options.zooms
	);

	let removed = store.expire(&options.zooms, cutoff)?;
	log::info!("{removed} tiles expired");

	store.optimize(options.skip_analyze, options.skip_vacuum)?;
	Ok(removed)
}
