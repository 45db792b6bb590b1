use crate::tools::args::{open, ConnectionArgs, ZoomArgs};
use anyhow::Result;
use std::io::{self, Write};
use tilevault::ops::tilelist::{tile_list, TileListOptions};
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to list (must exist)
	#[arg()]
	store: String,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// flip the tile row between TMS and XYZ before printing
	#[arg(long, display_order = 2)]
	flip_y: bool,

	/// print geographic bounding boxes instead of z/x/y lines
	#[arg(long, display_order = 2)]
	as_bboxes: bool,

	#[command(flatten)]
	connection: ConnectionArgs,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(true)?, config)?;
	let stdout = io::stdout();
	let mut out = stdout.lock();
	tile_list(
		store.as_ref(),
		&TileListOptions {
			zooms: arguments.zoom.range()?,
			flip_y: arguments.flip_y,
			as_bboxes: arguments.as_bboxes,
		},
		&mut out,
	)?;
	out.flush()?;
	Ok(())
}
