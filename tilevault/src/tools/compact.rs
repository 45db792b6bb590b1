use crate::tools::args::{open, ConnectionArgs};
use anyhow::Result;
use tilevault_store::{compact_store, AliasConfig};

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// legacy store to convert (must exist)
	#[arg()]
	store: String,

	#[command(flatten)]
	connection: ConnectionArgs,

	/// show a progress bar
	#[arg(long, display_order = 6)]
	progress: bool,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	compact_store(store.as_ref(), arguments.progress)?;
	Ok(())
}
