use crate::tools::args::{open, ConnectionArgs, HousekeepingArgs, PoolArgs, ZoomArgs};
use anyhow::Result;
use std::path::PathBuf;
use tilevault::ops::disk::{import_directory, ImportOptions};
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// directory holding metadata.json and tiles/<z>/<x>/<y>.<ext>
	#[arg()]
	directory: PathBuf,

	/// receiving store: *.mbtiles, 'dbname=...' or pg:<alias>
	#[arg()]
	store: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// flip the tile row between XYZ and TMS before inserting
	#[arg(long, display_order = 2)]
	flip_y: bool,

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
	let store = open(&arguments.store, arguments.connection.options(false)?, config)?;
	import_directory(
		store.as_ref(),
		&arguments.directory,
		&ImportOptions {
			zooms: arguments.zoom.range()?,
			flip_y: arguments.flip_y,
			commands: arguments.pool.execute.clone(),
			tmp_dir: arguments.pool.tmp_dir.clone(),
			skip_analyze: arguments.housekeeping.skip_analyze,
			skip_vacuum: arguments.housekeeping.skip_vacuum,
			progress: arguments.progress,
		},
	)
	.await?;
	Ok(())
}
