mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::PathBuf;
use tilevault_store::AliasConfig;

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<WarnLevel>,

	/// connection alias configuration file (default: /etc/tilevault.conf)
	#[arg(long, global = true, value_name = "FILE")]
	config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Create an empty compacted store
	Create(tools::create::Subcommand),

	/// Import a directory tree of tiles into a store
	Import(tools::import::Subcommand),

	/// Export a store into a directory tree
	Export(tools::export::Subcommand),

	/// Merge one store into another
	Merge(tools::merge::Subcommand),

	/// Pull tiles newer than the destination's high-water mark
	Update(tools::update::Subcommand),

	/// Convert a legacy store to the deduplicated layout
	Compact(tools::compact::Subcommand),

	/// Run external commands on every distinct tile payload
	Process(tools::process::Subcommand),

	/// Delete tiles older than an age threshold
	Expire(tools::expire::Subcommand),

	/// Report holes in the tile pyramid
	Check(tools::check::Subcommand),

	/// Run a check command on every tile and list the failures
	Test(tools::test::Subcommand),

	/// Insert one image across a coordinate range
	Fill(tools::fill::Subcommand),

	/// List all tile coordinates of a store
	Tilelist(tools::tilelist::Subcommand),

	/// Convert between tile addresses and geographic bboxes
	Convert(tools::convert::Subcommand),

	/// Run the analyze/vacuum housekeeping
	Optimize(tools::optimize::Subcommand),
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	env_logger::Builder::new()
		.filter_level(cli.verbose.log_level_filter())
		.format_timestamp(None)
		.init();

	run(cli)
}

fn run(cli: Cli) -> Result<()> {
	let config = match &cli.config {
		Some(path) => AliasConfig::from_path(path)?,
		None => AliasConfig::load_default()?,
	};

	match &cli.command {
		Commands::Create(arguments) => tools::create::run(arguments, &config),
		Commands::Import(arguments) => tools::import::run(arguments, &config),
		Commands::Export(arguments) => tools::export::run(arguments, &config),
		Commands::Merge(arguments) => tools::merge::run(arguments, &config),
		Commands::Update(arguments) => tools::update::run(arguments, &config),
		Commands::Compact(arguments) => tools::compact::run(arguments, &config),
		Commands::Process(arguments) => tools::process::run(arguments, &config),
		Commands::Expire(arguments) => tools::expire::run(arguments, &config),
		Commands::Check(arguments) => tools::check::run(arguments, &config),
		Commands::Test(arguments) => tools::test::run(arguments, &config),
		Commands::Fill(arguments) => tools::fill::run(arguments, &config),
		Commands::Tilelist(arguments) => tools::tilelist::run(arguments, &config),
		Commands::Convert(arguments) => tools::convert::run(arguments, &config),
		Commands::Optimize(arguments) => tools::optimize::run(arguments, &config),
	}
}

#[cfg(test)]
mod tests {
	use super::{run, Cli};
	use anyhow::Result;
	use clap::Parser;

	pub fn run_command(arg_vec: Vec<&str>) -> Result<String> {
		let cli = Cli::try_parse_from(arg_vec)?;
		let msg = format!("{cli:?}");
		run(cli)?;
		Ok(msg)
	}

	#[test]
	fn help() {
		let err = run_command(vec!["tilevault"]).unwrap_err().to_string();
		assert!(err.contains("Usage: tilevault"));
	}

	#[test]
	fn version() {
		let err = run_command(vec!["tilevault", "-V"]).unwrap_err().to_string();
		assert!(err.starts_with("tilevault "));
	}

	#[test]
	fn merge_requires_arguments() {
		let err = run_command(vec!["tilevault", "merge"]).unwrap_err().to_string();
		assert!(err.starts_with("Merge one store into another"));
	}

	#[test]
	fn unknown_subcommand_is_rejected() {
		assert!(run_command(vec!["tilevault", "frobnicate"]).is_err());
	}

	#[test]
	fn convert_prints_tile_bounds() {
		run_command(vec!["tilevault", "convert", "1/0/0"]).unwrap();
	}

	#[test]
	fn missing_store_fails() {
		let err = run_command(vec!["tilevault", "check", "/nonexistent/missing.mbtiles"]).unwrap_err();
		assert!(err.to_string().contains("missing.mbtiles"));
	}
}
