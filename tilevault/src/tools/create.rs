use crate::tools::args::{open, ConnectionArgs};
use anyhow::Result;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to create: *.mbtiles, 'dbname=...' or pg:<alias>
	#[arg()]
	store: String,

	#[command(flatten)]
	connection: ConnectionArgs,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(false)?, config)?;
	store.setup_schema()?;
	log::info!("created {}", store.locator());
	Ok(())
}
