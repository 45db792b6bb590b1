use crate::tools::args::{open, ConnectionArgs, HousekeepingArgs, PoolArgs, ZoomArgs};
use anyhow::{ensure, Result};
use tilevault::ops::merge::{merge, MergeOptions};
use tilevault_core::TimeRange;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// receiving store: *.mbtiles, 'dbname=...' or pg:<alias>
	#[arg()]
	destination: String,

	/// sending store (must exist)
	#[arg()]
	source: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// transfer only tiles updated after this unix timestamp (exclusive)
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 2)]
	min_timestamp: i64,

	/// transfer only tiles updated before this unix timestamp (exclusive)
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 2)]
	max_timestamp: i64,

	/// never replace tiles that already exist in the destination
	#[arg(long, display_order = 2)]
	no_overwrite: bool,

	/// flip the tile row between XYZ and TMS before inserting
	#[arg(long, display_order = 2)]
	flip_y: bool,

	/// run a structural check on the source first and abort on gaps
	#[arg(long, display_order = 2)]
	check_before_merge: bool,

	/// delete the transferred tiles from the source on success
	#[arg(long, display_order = 2)]
	delete_after_export: bool,

	/// delete destination tiles whose transform output vanished
	#[arg(long, display_order = 3)]
	delete_vanished_tiles: bool,

	#[command(flatten)]
	pool: PoolArgs,

	#[command(flatten)]
	connection: ConnectionArgs,

	#[command(flatten)]
	housekeeping: HousekeepingArgs,

	/// show a progress bar
	#[arg(long, display_order = 6)]
	progress: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let destination = open(&arguments.destination, arguments.connection.options(false)?, config)?;
	let source = open(&arguments.source, arguments.connection.options(true)?, config)?;

	let summary = merge(
		destination.as_ref(),
		source.as_ref(),
		&MergeOptions {
			zooms: arguments.zoom.range()?,
			times: TimeRange::new(arguments.min_timestamp, arguments.max_timestamp),
			flip_y: arguments.flip_y,
			no_overwrite: arguments.no_overwrite,
			commands: arguments.pool.execute.clone(),
			delete_after: arguments.delete_after_export,
			check_before: arguments.check_before_merge,
			delete_vanished: arguments.delete_vanished_tiles,
			pool_size: arguments.pool.poolsize,
			tmp_dir: arguments.pool.tmp_dir.clone(),
			skip_analyze: arguments.housekeeping.skip_analyze,
			skip_vacuum: arguments.housekeeping.skip_vacuum,
			progress: arguments.progress,
		},
	)
	.await?;

	ensure!(summary.total > 0, "no tiles to merge, exiting...");
	Ok(())
}
