use crate::tools::args::{open, ConnectionArgs, PoolArgs, ZoomArgs};
use anyhow::Result;
use tilevault::ops::process::{process, ProcessOptions};
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to process in place (must exist)
	#[arg()]
	store: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	#[command(flatten)]
	pool: PoolArgs,

	/// delete tiles whose transform output vanished
	#[arg(long, display_order = 3)]
	delete_vanished_tiles: bool,

	#[command(flatten)]
	connection: ConnectionArgs,

	/// show a progress bar
	#[arg(long, display_order = 6)]
	progress: bool,
}

#[tokio::main]
pub async fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	process(
		store.as_ref(),
		&ProcessOptions {
			zooms: arguments.zoom.range()?,
			commands: arguments.pool.execute.clone(),
			pool_size: arguments.pool.poolsize,
			tmp_dir: arguments.pool.tmp_dir.clone(),
			delete_vanished: arguments.delete_vanished_tiles,
			progress: arguments.progress,
		},
	)
	.await?;
	Ok(())
}
