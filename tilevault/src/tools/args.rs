//! Argument groups shared across subcommands.

use anyhow::Result;
use std::path::PathBuf;
use tilevault_core::ZoomRange;
use tilevault_store::{open_store, AliasConfig, OpenOptions, StoreLocator, TileStore};

#[derive(clap::Args, Debug)]
pub struct ZoomArgs {
	/// use only this zoom level (sets min and max zoom)
	#[arg(long, short = 'z', value_name = "int", display_order = 1)]
	pub zoom: Option<u8>,

	/// minimum zoom level
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 1)]
	pub min_zoom: u8,

	/// maximum zoom level
	#[arg(long, value_name = "int", default_value_t = 18, display_order = 1)]
	pub max_zoom: u8,
}

impl ZoomArgs {
	pub fn range(&self) -> Result<ZoomRange> {
		ZoomRange::from_options(self.zoom, self.min_zoom, self.max_zoom)
	}
}

#[derive(clap::Args, Debug)]
pub struct ConnectionArgs {
	/// commit per statement instead of batched transactions
	#[arg(long, display_order = 4)]
	pub auto_commit: bool,

	/// sqlite journal mode: wal, delete, truncate, persist, memory or off
	#[arg(long, value_name = "MODE", default_value = "wal", display_order = 4)]
	pub journal_mode: String,

	/// set 'PRAGMA synchronous = OFF' on sqlite stores
	#[arg(long, display_order = 4)]
	pub synchronous_off: bool,
}

impl ConnectionArgs {
	pub fn options(&self, must_exist: bool) -> Result<OpenOptions> {
		Ok(OpenOptions {
			auto_commit: self.auto_commit,
			journal_mode: self.journal_mode.parse()?,
			synchronous_off: self.synchronous_off,
			exclusive_lock: false,
			must_exist,
		})
	}
}

#[derive(clap::Args, Debug)]
pub struct HousekeepingArgs {
	/// skip the statistics (ANALYZE) step
	#[arg(long, display_order = 5)]
	pub skip_analyze: bool,

	/// skip the storage reclamation (VACUUM) step
	#[arg(long, display_order = 5)]
	pub skip_vacuum: bool,
}

#[derive(clap::Args, Debug)]
pub struct PoolArgs {
	/// shell command run per tile, '%s' is the file path (repeatable)
	#[arg(long = "execute", short = 'e', value_name = "COMMAND", display_order = 3)]
	pub execute: Vec<String>,

	/// worker pool size, defaults to the number of cpus
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 3)]
	pub poolsize: usize,

	/// directory for temporary tile files
	#[arg(long, value_name = "DIR", display_order = 3)]
	pub tmp_dir: Option<PathBuf>,
}

/// Parse a locator and open the matching backend.
pub fn open(input: &str, options: OpenOptions, config: &AliasConfig) -> Result<Box<dyn TileStore>> {
	let locator = StoreLocator::parse(input, config)?;
	open_store(&locator, &options)
}
