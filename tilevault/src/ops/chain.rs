//! External filter chains and the bounded worker pool.
//!
//! A chain is an ordered list of shell commands, each carrying a single
//! `%s` placeholder for the tile's temporary file path. Commands mutate the
//! file in place, each consuming the previous command's output. Workers only
//! ever touch the filesystem; every database write stays on the coordinating
//! task, after a whole batch has finished (synchronous barrier).

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tokio::process::Command;

/// An ordered list of external filter commands.
#[derive(Clone, Debug)]
pub struct FilterChain {
	commands: Arc<Vec<String>>,
}

/// What happened to one tile in the worker pool.
#[derive(Debug)]
pub enum TileStatus {
	/// All commands exited 0; holds the transformed file contents.
	Transformed(Vec<u8>),
	/// The expected output file is missing: a vanished tile.
	Vanished,
	/// A command exited nonzero; the tile is left as it was.
	Failed,
}

/// One unit of work for the pool: a payload parked in a temp file, plus the
/// tile that triggered it.
pub struct TransformJob {
	pub content_id: String,
	pub zoom: u8,
	pub column: u32,
	pub row: u32,
	file: NamedTempFile,
}

/// A job's result, reported back to the coordinator.
pub struct TransformOutcome {
	pub content_id: String,
	pub zoom: u8,
	pub column: u32,
	pub row: u32,
	pub status: TileStatus,
}

impl FilterChain {
	/// Build a chain; `None` when no commands are given.
	pub fn new(commands: &[String]) -> Option<FilterChain> {
		if commands.is_empty() {
			None
		} else {
			Some(FilterChain {
				commands: Arc::new(commands.to_vec()),
			})
		}
	}

	/// Run every command of the chain against the file, in order.
	/// Returns `false` as soon as one command exits nonzero.
	pub async fn run_on_path(&self, path: &Path) -> Result<bool> {
		for command in self.commands.iter() {
			let command = command.replace("%s", &path.display().to_string());
			log::trace!("executing: {command}");
			let status = Command::new("sh")
				.arg("-c")
				.arg(&command)
				.status()
				.await
				.with_context(|| format!("spawning '{command}'"))?;
			if !status.success() {
				log::debug!("command exited with {status}: {command}");
				return Ok(false);
			}
		}
		Ok(true)
	}

	/// Apply the chain to a payload through a temporary file, sequentially.
	///
	/// Used by the inline paths (directory import/export, legacy-source
	/// merge). `Ok(None)` means the chain failed or the output vanished.
	pub async fn apply(&self, payload: &[u8], format: &str, tmp_dir: Option<&Path>) -> Result<Option<Vec<u8>>> {
		let file = create_tile_file(payload, format, tmp_dir)?;
		if !self.run_on_path(file.path()).await? {
			return Ok(None);
		}
		match tokio::fs::read(file.path()).await {
			Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
			_ => Ok(None),
		}
	}
}

impl TransformJob {
	/// Park a payload in a scoped temporary file.
	pub fn new(
		content_id: String,
		zoom: u8,
		column: u32,
		row: u32,
		payload: &[u8],
		format: &str,
		tmp_dir: Option<&Path>,
	) -> Result<TransformJob> {
		Ok(TransformJob {
			content_id,
			zoom,
			column,
			row,
			file: create_tile_file(payload, format, tmp_dir)?,
		})
	}
}

fn create_tile_file(payload: &[u8], format: &str, tmp_dir: Option<&Path>) -> Result<NamedTempFile> {
	let dir: PathBuf = match tmp_dir {
		Some(dir) => {
			if !dir.is_dir() {
				std::fs::create_dir_all(dir).with_context(|| format!("creating temp directory {dir:?}"))?;
			}
			dir.to_path_buf()
		}
		None => std::env::temp_dir(),
	};
	let mut file = tempfile::Builder::new()
		.prefix("tile_")
		.suffix(&format!(".{format}"))
		.tempfile_in(dir)
		.context("creating tile temp file")?;
	file.write_all(payload)?;
	file.flush()?;
	Ok(file)
}

/// A bounded pool of isolated worker processes.
///
/// Workers exchange only a file path and a status with the coordinator and
/// share no mutable state, so no locking is needed between them. A hanging
/// or crashing filter affects exactly one tile.
pub struct WorkerPool {
	chain: FilterChain,
	size: usize,
}

impl WorkerPool {
	/// Create a pool; `size` 0 selects the host parallelism.
	pub fn new(chain: FilterChain, size: usize) -> WorkerPool {
		let size = if size == 0 { num_cpus::get() } else { size };
		log::debug!("using worker pool size {size}");
		WorkerPool { chain, size }
	}

	/// Run one batch to completion and return every tile's outcome.
	pub async fn run_batch(&self, jobs: Vec<TransformJob>) -> Vec<TransformOutcome> {
		stream::iter(jobs.into_iter().map(|job| self.run_job(job)))
			.buffer_unordered(self.size)
			.collect()
			.await
	}

	async fn run_job(&self, job: TransformJob) -> TransformOutcome {
		let status = match self.chain.run_on_path(job.file.path()).await {
			Ok(true) => match tokio::fs::read(job.file.path()).await {
				Ok(bytes) if !bytes.is_empty() => TileStatus::Transformed(bytes),
				_ => TileStatus::Vanished,
			},
			Ok(false) => TileStatus::Failed,
			Err(err) => {
				log::warn!("filter chain failed for {}: {err}", job.content_id);
				TileStatus::Failed
			}
		};
		TransformOutcome {
			content_id: job.content_id,
			zoom: job.zoom,
			column: job.column,
			row: job.row,
			status,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn identity_chain_returns_payload() {
		let chain = FilterChain::new(&["true".to_string()]).unwrap();
		let result = chain.apply(b"payload", "png", None).await.unwrap();
		assert_eq!(result.as_deref(), Some(b"payload".as_slice()));
	}

	#[tokio::test]
	async fn failing_command_yields_none() {
		let chain = FilterChain::new(&["false".to_string()]).unwrap();
		assert!(chain.apply(b"payload", "png", None).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn deleting_command_vanishes_the_tile() {
		let chain = FilterChain::new(&["rm -f %s".to_string()]).unwrap();
		assert!(chain.apply(b"payload", "png", None).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn commands_chain_in_order() {
		let chain = FilterChain::new(&["printf first > %s".to_string(), "printf second >> %s".to_string()]).unwrap();
		let result = chain.apply(b"seed", "png", None).await.unwrap();
		assert_eq!(result.as_deref(), Some(b"firstsecond".as_slice()));
	}

	#[tokio::test]
	async fn pool_reports_mixed_outcomes() {
		let chain = FilterChain::new(&["test -s %s".to_string()]).unwrap();
		let pool = WorkerPool::new(chain, 2);
		let jobs = vec![
			TransformJob::new("full".to_string(), 1, 0, 0, b"data", "png", None).unwrap(),
			TransformJob::new("empty".to_string(), 1, 1, 0, b"", "png", None).unwrap(),
		];
		let outcomes = pool.run_batch(jobs).await;
		assert_eq!(outcomes.len(), 2);
		for outcome in outcomes {
			match outcome.content_id.as_str() {
				"full" => assert!(matches!(outcome.status, TileStatus::Transformed(_))),
				"empty" => assert!(matches!(outcome.status, TileStatus::Failed)),
				_ => unreachable!(),
			}
		}
	}
}
