//! Lightweight terminal progress reporting without external dependencies.
//!
//! Renders `message pos/len (percent) rate` to stderr with carriage-return
//! updates. A hidden bar swallows all updates, so operations can thread one
//! through unconditionally and let the caller decide about output.

use std::fmt::Write as _;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

struct Inner {
	message: String,
	len: u64,
	pos: u64,
	start: Instant,
	visible: bool,
	finished: bool,
}

impl Inner {
	fn redraw(&self) {
		if !self.visible {
			return;
		}
		let len = self.len.max(1);
		let pos = self.pos.min(len);
		let percent = pos as f64 * 100.0 / len as f64;
		let elapsed = self.start.elapsed().as_secs_f64();
		let rate = if elapsed > 0.0 { pos as f64 / elapsed } else { 0.0 };

		let mut line = String::new();
		let _ = write!(
			&mut line,
			"{} {}/{} ({:.1}% @ {:.1}/sec)",
			self.message, pos, len, percent, rate
		);

		let mut stderr = io::stderr();
		let _ = write!(stderr, "\r\x1b[2K{line}");
		let _ = stderr.flush();
	}
}

/// A cloneable, thread-safe progress bar handle.
#[derive(Clone)]
pub struct ProgressBar {
	inner: Arc<Mutex<Inner>>,
}

impl ProgressBar {
	/// Create a visible bar with a message and a maximum value.
	#[must_use]
	pub fn new(message: &str, len: u64) -> ProgressBar {
		let bar = ProgressBar {
			inner: Arc::new(Mutex::new(Inner {
				message: message.to_string(),
				len,
				pos: 0,
				start: Instant::now(),
				visible: true,
				finished: false,
			})),
		};
		bar.inner.lock().unwrap().redraw();
		bar
	}

	/// Create a bar that swallows all updates.
	#[must_use]
	pub fn hidden() -> ProgressBar {
		ProgressBar {
			inner: Arc::new(Mutex::new(Inner {
				message: String::new(),
				len: 0,
				pos: 0,
				start: Instant::now(),
				visible: false,
				finished: false,
			})),
		}
	}

	/// Set the absolute position.
	pub fn set_position(&self, value: u64) {
		let mut inner = self.inner.lock().unwrap();
		inner.pos = value.min(inner.len);
		inner.redraw();
	}

	/// Advance the position.
	pub fn inc(&self, delta: u64) {
		let mut inner = self.inner.lock().unwrap();
		inner.pos = (inner.pos + delta).min(inner.len);
		inner.redraw();
	}

	/// Complete the bar and emit the final newline.
	pub fn finish(&self) {
		let mut inner = self.inner.lock().unwrap();
		if inner.finished {
			return;
		}
		inner.finished = true;
		inner.pos = inner.len;
		inner.redraw();
		if inner.visible {
			let _ = writeln!(io::stderr());
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hidden_bar_accepts_all_updates() {
		let bar = ProgressBar::hidden();
		bar.set_position(10);
		bar.inc(5);
		bar.finish();
		bar.finish();
	}

	#[test]
	fn position_is_clamped_to_len() {
		let bar = ProgressBar::hidden();
		bar.set_position(100);
		bar.inc(u64::MAX);
		bar.finish();
	}
}
