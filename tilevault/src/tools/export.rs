use crate::tools::args::{open, ConnectionArgs, HousekeepingArgs, PoolArgs, ZoomArgs};
use anyhow::Result;
use std::path::PathBuf;
use tilevault::ops::disk::{export_directory, ExportOptions};
use tilevault_core::TimeRange;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// sending store: *.mbtiles, 'dbname=...' or pg:<alias> (must exist)
	#[arg()]
	store: String,

	/// target directory
	#[arg()]
	directory: PathBuf,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// export only tiles updated after this unix timestamp (exclusive)
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 2)]
	min_timestamp: i64,

	/// export only tiles updated before this unix timestamp (exclusive)
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 2)]
	max_timestamp: i64,

	/// flip the tile row between TMS and XYZ before writing
	#[arg(long, display_order = 2)]
	flip_y: bool,

	/// delete the exported tiles from the store afterwards
	#[arg(long, display_order = 2)]
	delete_after_export: bool,

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
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	export_directory(
		store.as_ref(),
		&arguments.directory,
		&ExportOptions {
			zooms: arguments.zoom.range()?,
			times: TimeRange::new(arguments.min_timestamp, arguments.max_timestamp),
			flip_y: arguments.flip_y,
			commands: arguments.pool.execute.clone(),
			delete_after: arguments.delete_after_export,
			tmp_dir: arguments.pool.tmp_dir.clone(),
			skip_analyze: arguments.housekeeping.skip_analyze,
			skip_vacuum: arguments.housekeeping.skip_vacuum,
			progress: arguments.progress,
		},
	)
	.await?;
	Ok(())
}
