//! The `TileStore` trait and the locator-shape factory.

mod postgres;
mod sqlite;

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

use crate::locator::StoreLocator;
use crate::options::OpenOptions;
use anyhow::Result;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tilevault_core::{TimeRange, ZoomRange};

/// Rows fetched per page by the streaming iterators.
pub const STREAM_BATCH_SIZE: usize = 1000;

/// The schema layout of a store, fixed once at open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaMode {
	/// Flat `tiles` table with embedded payloads, no deduplication.
	Legacy,
	/// Normalized `images`/`map` tables joined by a `tiles` view.
	Compacted,
}

impl fmt::Display for SchemaMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SchemaMode::Legacy => "legacy",
			SchemaMode::Compacted => "compacted",
		})
	}
}

/// One tile as produced by the streaming iterators.
#[derive(Clone, Debug)]
pub struct TileRow {
	pub zoom: u8,
	pub column: u32,
	pub row: u32,
	pub payload: Vec<u8>,
	/// Set by the dedup-aware iterator on compacted stores.
	pub content_id: Option<String>,
}

/// A coordinate → content id mapping, as written to the `map` table.
#[derive(Clone, Debug)]
pub struct TileRef {
	pub zoom: u8,
	pub column: u32,
	pub row: u32,
	pub content_id: String,
	pub updated_at: i64,
}

/// A lazy, restartable tile sequence. Implementations fetch fixed-size
/// batches by keyset pagination, checking out a fresh pooled connection per
/// page, so the sequence survives interleaved writes to the same store.
pub type TileIter = Box<dyn Iterator<Item = Result<TileRow>> + Send>;

/// Uniform interface over both storage backends.
///
/// All mutation is single-writer and sequential; methods take `&self`
/// because connections come from an internal pool. Timestamp filters follow
/// the half-open window semantics of [`TimeRange`] and must only be passed
/// for compacted stores (the engines check this before calling).
pub trait TileStore: Send {
	/// The locator this store was opened from, for log messages.
	fn locator(&self) -> &StoreLocator;

	/// The schema mode, probed once when the store was opened.
	fn schema_mode(&self) -> SchemaMode;

	/// Idempotently create the compacted-mode relations, indices and the
	/// `tiles` view. A no-op on stores already carrying a legacy layout.
	fn setup_schema(&self) -> Result<()>;

	/// All metadata entries, or `None` if the metadata relation is missing.
	fn metadata(&self) -> Result<Option<BTreeMap<String, String>>>;

	/// Upsert one metadata entry.
	fn update_metadata(&self, name: &str, value: &str) -> Result<()>;

	/// Distinct zoom levels present, ascending.
	fn zoom_levels(&self) -> Result<Vec<u8>>;

	/// Occupied bounding box `(min_column, max_column, min_row, max_row)` of
	/// a zoom level, or `None` when the level is empty.
	fn bounding_box(&self, zoom: u8) -> Result<Option<(u32, u32, u32, u32)>>;

	/// Occupied columns of one row.
	fn columns_for_row(&self, zoom: u8, row: u32) -> Result<HashSet<u32>>;

	/// All occupied `(column, row)` pairs of a zoom level.
	fn coordinates(&self, zoom: u8) -> Result<Vec<(u32, u32)>>;

	/// The high-water mark: the maximum `updated_at` present, 0 when none.
	fn max_updated_at(&self) -> Result<i64>;

	/// Number of tiles matching the filters.
	fn tiles_count(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<u64>;

	/// Stream `(zoom, column, row, payload)` for the filters.
	fn iter_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter>;

	/// Stream tiles including their content id. Compacted stores only.
	fn iter_tiles_with_id(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter>;

	/// Insert an image unless the content id already exists. Returns whether
	/// a row was actually inserted.
	fn insert_image(&self, content_id: &str, payload: &[u8]) -> Result<bool>;

	/// Batch-insert images in one transaction, ignoring existing ids.
	/// Returns the number of rows actually inserted.
	fn insert_images(&self, images: &[(String, Vec<u8>)]) -> Result<u64>;

	/// Upsert (or insert-if-absent, per `replace`) one map row with the
	/// current timestamp.
	fn insert_ref(&self, zoom: u8, column: u32, row: u32, content_id: &str, replace: bool) -> Result<()>;

	/// Batch-upsert map rows in one transaction (last write wins).
	fn insert_refs(&self, refs: &[TileRef]) -> Result<()>;

	/// Reconcile a content-address change: insert the new image, repoint
	/// every map row from `old_id` to `new_id`, and delete the old image
	/// when the ids differ.
	fn update_image(&self, old_id: &str, new_id: &str, payload: &[u8]) -> Result<()>;

	/// Delete every map row pointing at the id, and the image itself.
	fn delete_image(&self, content_id: &str) -> Result<()>;

	/// Delete the map row at one coordinate plus the image(s) it referenced
	/// within that coordinate's scope.
	fn delete_ref(&self, zoom: u8, column: u32, row: u32) -> Result<()>;

	/// Delete all tiles matching the filters. In compacted mode this removes
	/// the images referenced within the same filtered scope; it is not a
	/// full-store orphan scan.
	fn delete_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<()>;

	/// Delete refs older than `cutoff` within the zoom range, plus their
	/// in-scope images. Returns the number of refs removed.
	fn expire(&self, zooms: &ZoomRange, cutoff: i64) -> Result<u64>;

	/// Create the temporary index on `map.content_id` used by the transform
	/// pipeline's dedup-aware join.
	fn create_ref_index(&self) -> Result<()>;

	/// Drop that index again.
	fn drop_ref_index(&self) -> Result<()>;

	/// Statistics and space housekeeping; both steps are independently
	/// skippable.
	fn optimize(&self, skip_analyze: bool, skip_vacuum: bool) -> Result<()>;

	/// Create the compacted relations next to a legacy layout, without
	/// touching the legacy table. First half of compaction.
	fn prepare_compaction(&self) -> Result<()>;

	/// Drop the legacy table, then materialize the view and uniqueness
	/// constraints. Second half of compaction.
	fn finalize_compaction(&self) -> Result<()>;
}

/// Open the backend selected by the locator shape.
pub fn open_store(locator: &StoreLocator, options: &OpenOptions) -> Result<Box<dyn TileStore>> {
	match locator {
		StoreLocator::Sqlite(path) => Ok(Box::new(SqliteStore::open(path, options)?)),
		StoreLocator::Postgres(conn) => Ok(Box::new(PostgresStore::open(conn, options)?)),
	}
}

/// Build the SQL filter clause shared by both dialects.
///
/// `prefix` qualifies the column names (e.g. `"map."`); timestamp bounds of
/// 0 are unbounded.
pub(crate) fn filter_clause(prefix: &str, zooms: &ZoomRange, times: &TimeRange) -> String {
	let mut clause = format!(
		"{prefix}zoom_level >= {} AND {prefix}zoom_level <= {}",
		zooms.min, zooms.max
	);
	if times.min > 0 {
		clause.push_str(&format!(" AND {prefix}updated_at > {}", times.min));
	}
	if times.max > 0 {
		clause.push_str(&format!(" AND {prefix}updated_at < {}", times.max));
	}
	clause
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn filter_clause_skips_unbounded_times() {
		let clause = filter_clause("map.", &ZoomRange::new(2, 5).unwrap(), &TimeRange::default());
		assert_eq!(clause, "map.zoom_level >= 2 AND map.zoom_level <= 5");
	}

	#[test]
	fn filter_clause_includes_bounds() {
		let clause = filter_clause("", &ZoomRange::single(3), &TimeRange::new(10, 20));
		assert_eq!(
			clause,
			"zoom_level >= 3 AND zoom_level <= 3 AND updated_at > 10 AND updated_at < 20"
		);
	}
}
