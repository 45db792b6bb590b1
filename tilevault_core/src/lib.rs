//! Core types for tile stores: coordinates, bounding boxes, zoom and
//! timestamp ranges, and a terminal progress bar.
//!
//! Everything in here is independent of any storage backend. The coordinate
//! math follows the Web Mercator tile pyramid as used by slippy maps, with
//! the usual XYZ/TMS row-flip helper.

pub mod progress;
pub mod types;

pub use progress::ProgressBar;
pub use types::*;
