use crate::tools::args::{open, ConnectionArgs, ZoomArgs};
use anyhow::Result;
use std::path::PathBuf;
use tilevault::ops::fill::{fill, FillOptions};
use tilevault_core::GeoBBox;
use tilevault_store::AliasConfig;

#[derive(clap::Args, Debug)]
#[command(arg_required_else_help = true, disable_version_flag = true)]
pub struct Subcommand {
	/// store to fill: *.mbtiles, 'dbname=...' or pg:<alias>
	#[arg()]
	store: String,

	/// image file inserted at every coordinate
	#[arg()]
	image: PathBuf,

	#[command(flatten)]
	zoom: ZoomArgs,

	/// geographic bounding box west,south,east,north
	#[arg(long, value_name = "w,s,e,n", allow_hyphen_values = true, display_order = 2)]
	bbox: Option<String>,

	/// tile bounding box min_col,min_row,max_col,max_row (single zoom only)
	#[arg(long, value_name = "c0,r0,c1,r1", display_order = 2)]
	tile_bbox: Option<String>,

	/// flip the tile row between XYZ and TMS before inserting
	#[arg(long, display_order = 2)]
	flip_y: bool,

	#[command(flatten)]
	connection: ConnectionArgs,

	/// show a progress bar
	#[arg(long, display_order = 6)]
	progress: bool,
}

pub fn run(arguments: &Subcommand, config: &AliasConfig) -> Result<()> {
	let store = open(&arguments.store, arguments.connection.options(false)?, config)?;
	let bbox = arguments.bbox.as_deref().map(GeoBBox::parse).transpose()?;
	fill(
		store.as_ref(),
		&arguments.image,
		&FillOptions {
			zooms: arguments.zoom.range()?,
			flip_y: arguments.flip_y,
			bbox,
			tile_bbox: arguments.tile_bbox.clone(),
			progress: arguments.progress,
		},
	)?;
	Ok(())
}
