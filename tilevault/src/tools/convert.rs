use crate::tools::args::ZoomArgs;
use anyhow::Result;
use std::io::{self, Write};
use tilevault::ops::convert::convert_value;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// a z/x/y tile address or a west,south,east,north bbox
	#[arg(allow_hyphen_values = true)]
	value: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// flip the tile row between XYZ and TMS
	#[arg(long, display_order = 2)]
	flip_y: bool,
}

pub fn run(arguments: &Subcommand, _config: &AliasConfig) -> Result<()> {
	let stdout = io::stdout();
	let mut out = stdout.lock();
	convert_value(&arguments.value, &arguments.zoom.range()?, arguments.flip_y, &mut out)?;
	out.flush()?;
	Ok(())
}
