use crate::tools::args::{open, ConnectionArgs, ZoomArgs};
use anyhow::{ensure, Result};
use tilevault::ops::update::{update, UpdateOptions};
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

	/// flip the tile row between XYZ and TMS before inserting
	#[arg(long, display_order = 2)]
	flip_y: bool,

	#[command(flatten)]
	connection: ConnectionArgs,

	/// show a progress bar
	#[arg(long, display_order = 6)]
	progress: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let destination = open(&arguments.destination, arguments.connection.options(false)?, config)?;
	let source = open(&arguments.source, arguments.connection.options(true)?, config)?;

	let summary = update(
		destination.as_ref(),
		source.as_ref(),
		&UpdateOptions {
			zooms: arguments.zoom.range()?,
			flip_y: arguments.flip_y,
			progress: arguments.progress,
		},
	)
	.await?;

	ensure!(summary.total > 0, "no tiles to update, exiting...");
	Ok(())
}
