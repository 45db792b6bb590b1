use crate::tools::args::{open, ConnectionArgs, HousekeepingArgs, ZoomArgs};
use anyhow::Result;
use tilevault::ops::expire::{expire, ExpireOptions};
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to expire tiles from (must exist)
	#[arg()]
	store: String,

	/// delete tiles older than this many days
	#[arg(long, value_name = "int", default_value_t = 0, display_order = 2)]
	expire: u64,

	#[command(flatten)]
	zoom: ZoomArgs,

	#[command(flatten)]
	connection: ConnectionArgs,

	#[command(flatten)]
	housekeeping: HousekeepingArgs,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	expire(
		store.as_ref(),
		&ExpireOptions {
			zooms: arguments.zoom.range()?,
			days: arguments.expire,
			skip_analyze: arguments.housekeeping.skip_analyze,
			skip_vacuum: arguments.housekeeping.skip_vacuum,
		},
	)?;
	Ok(())
}
