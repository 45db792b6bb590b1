use crate::tools::args::{open, ConnectionArgs, HousekeepingArgs};
use anyhow::Result;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to optimize (must exist)
	#[arg()]
	store: String,

	#[command(flatten)]
	connection: ConnectionArgs,

	#[command(flatten)]
	housekeeping: HousekeepingArgs,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	store.optimize(arguments.housekeeping.skip_analyze, arguments.housekeeping.skip_vacuum)?;
	Ok(())
}
