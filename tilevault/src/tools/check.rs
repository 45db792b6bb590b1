use crate::tools::args::{open, ConnectionArgs, ZoomArgs};
use anyhow::{ensure, Result};
use tilevault::ops::check::{check, CheckOptions};
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to check (must exist)
	#[arg()]
	store: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// report rows in XYZ instead of the stored convention
	#[arg(long, display_order = 2)]
	flip_y: bool,

	#[command(flatten)]
	connection: ConnectionArgs,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	let report = check(
		store.as_ref(),
		&CheckOptions {
			zooms: arguments.zoom.range()?,
			flip_y: arguments.flip_y,
		},
	)?;
	ensure!(report.passed(), "the check failed, {} tiles are missing", report.missing.len());
	Ok(())
}
