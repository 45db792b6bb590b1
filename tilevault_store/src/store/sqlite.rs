//! Embedded SQLite backend (`*.mbtiles` files).
//!
//! Uses a small r2d2 connection pool; every streaming page checks out its
//! own connection, so open iterators survive write bursts on the same store.

use crate::content::unix_now;
use crate::error::StoreError;
use crate::locator::StoreLocator;
use crate::options::OpenOptions;
use crate::store::{filter_clause, SchemaMode, TileIter, TileRef, TileRow, TileStore, STREAM_BATCH_SIZE};
use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, Connection};
use r2d2_sqlite::SqliteConnectionManager;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tilevault_core::{TimeRange, ZoomRange};

const CREATE_TILES_VIEW: &str = "
	CREATE VIEW tiles AS
	SELECT map.zoom_level AS zoom_level,
	map.tile_column AS tile_column,
	map.tile_row AS tile_row,
	images.tile_data AS tile_data,
	map.updated_at AS updated_at
	FROM map
	JOIN images
	ON map.tile_id IS NOT NULL AND images.tile_id = map.tile_id";

/// Tile store backed by a single SQLite file.
pub struct SqliteStore {
	locator: StoreLocator,
	pool: Pool<SqliteConnectionManager>,
	mode: SchemaMode,
	auto_commit: bool,
}

/// Run a PRAGMA, draining any value row it may return.
fn pragma(conn: &Connection, sql: &str) -> r2d2_sqlite::rusqlite::Result<()> {
	let mut stmt = conn.prepare(sql)?;
	let mut rows = stmt.query([])?;
	while rows.next()?.is_some() {}
	Ok(())
}

impl SqliteStore {
	/// Open (and, unless `must_exist`, create) an MBTiles file.
	pub fn open(path: &Path, options: &OpenOptions) -> Result<SqliteStore> {
		log::debug!("open sqlite store {path:?}");

		if options.must_exist && !path.is_file() {
			return Err(StoreError::Connection(path.display().to_string(), "file does not exist".to_string()).into());
		}

		let opts = options.clone();
		let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
			pragma(conn, "PRAGMA cache_size = 100000")?;
			pragma(conn, "PRAGMA temp_store = memory")?;
			pragma(
				conn,
				if opts.synchronous_off {
					"PRAGMA synchronous = OFF"
				} else {
					"PRAGMA synchronous = NORMAL"
				},
			)?;
			let journal = format!("PRAGMA journal_mode = {}", opts.journal_mode.as_str());
			if let Err(err) = pragma(conn, &journal) {
				log::warn!("could not set journal_mode = {}: {err}", opts.journal_mode);
			}
			if opts.exclusive_lock {
				pragma(conn, "PRAGMA locking_mode = EXCLUSIVE")?;
			}
			Ok(())
		});

		let pool = Pool::builder()
			.max_size(10)
			.build(manager)
			.map_err(|err| StoreError::Connection(path.display().to_string(), err.to_string()))?;

		let mode = Self::probe_mode(&*pool.get()?)?;
		log::debug!("store {path:?} opened in {mode} mode");

		Ok(SqliteStore {
			locator: StoreLocator::Sqlite(path.to_path_buf()),
			pool,
			mode,
			auto_commit: options.auto_commit,
		})
	}

	/// Legacy iff there is a flat `tiles` table and no `images`/`map` split.
	/// A fresh file counts as compacted, ready for `setup_schema`.
	fn probe_mode(conn: &Connection) -> Result<SchemaMode> {
		let split: i64 = conn.query_row(
			"SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name IN ('images', 'map')",
			[],
			|row| row.get(0),
		)?;
		if split == 2 {
			return Ok(SchemaMode::Compacted);
		}
		let flat: i64 = conn.query_row(
			"SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name = 'tiles'",
			[],
			|row| row.get(0),
		)?;
		Ok(if flat > 0 { SchemaMode::Legacy } else { SchemaMode::Compacted })
	}

	fn has_table(&self, name: &str) -> Result<bool> {
		let count: i64 = self.pool.get()?.query_row(
			"SELECT count(name) FROM sqlite_master WHERE type = 'table' AND name = ?1",
			params![name],
			|row| row.get(0),
		)?;
		Ok(count > 0)
	}

	fn ensure_compacted(&self, what: &str) -> Result<()> {
		if self.mode != SchemaMode::Compacted {
			return Err(StoreError::Schema(format!("{what} requires a compacted store, but {} is legacy", self.locator)).into());
		}
		Ok(())
	}

	fn ensure_no_time_filter(&self, times: &TimeRange) -> Result<()> {
		if !times.is_unbounded() {
			return Err(StoreError::Schema(format!(
				"timestamp filters require a compacted store, but {} is legacy",
				self.locator
			))
			.into());
		}
		Ok(())
	}
}

impl TileStore for SqliteStore {
	fn locator(&self) -> &StoreLocator {
		&self.locator
	}

	fn schema_mode(&self) -> SchemaMode {
		self.mode
	}

	fn setup_schema(&self) -> Result<()> {
		if self.mode == SchemaMode::Legacy {
			log::debug!("skipping schema setup on legacy store {}", self.locator);
			return Ok(());
		}

		let conn = self.pool.get()?;
		pragma(&conn, "PRAGMA page_size = 4096")?;
		conn.execute_batch(
			"CREATE TABLE IF NOT EXISTS images (tile_id TEXT, tile_data BLOB);
			CREATE TABLE IF NOT EXISTS map (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_id TEXT, updated_at INTEGER);
			CREATE TABLE IF NOT EXISTS metadata (name TEXT, value TEXT);
			CREATE UNIQUE INDEX IF NOT EXISTS metadata_name ON metadata (name);
			CREATE UNIQUE INDEX IF NOT EXISTS map_index ON map (zoom_level, tile_column, tile_row);
			CREATE UNIQUE INDEX IF NOT EXISTS images_id ON images (tile_id);",
		)?;

		// updated_at arrived after the first schema revision; older files
		// need the column added.
		if let Err(err) = conn.execute("ALTER TABLE map ADD COLUMN updated_at INTEGER", []) {
			log::trace!("updated_at column already present: {err}");
		}

		conn.execute_batch(&format!("DROP VIEW IF EXISTS tiles; {CREATE_TILES_VIEW};"))?;
		Ok(())
	}

	fn metadata(&self) -> Result<Option<BTreeMap<String, String>>> {
		if !self.has_table("metadata")? {
			return Ok(None);
		}
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT name, value FROM metadata")?;
		let entries = stmt
			.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
			.collect::<r2d2_sqlite::rusqlite::Result<BTreeMap<_, _>>>()?;
		Ok(Some(entries))
	}

	fn update_metadata(&self, name: &str, value: &str) -> Result<()> {
		self.pool.get()?.execute(
			"REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
			params![name, value],
		)?;
		Ok(())
	}

	fn zoom_levels(&self) -> Result<Vec<u8>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT DISTINCT zoom_level FROM tiles ORDER BY zoom_level")?;
		let levels = stmt
			.query_map([], |row| row.get::<_, i64>(0))?
			.collect::<r2d2_sqlite::rusqlite::Result<Vec<_>>>()?;
		Ok(levels.into_iter().map(|z| z as u8).collect())
	}

	fn bounding_box(&self, zoom: u8) -> Result<Option<(u32, u32, u32, u32)>> {
		let conn = self.pool.get()?;
		let bounds: (Option<i64>, Option<i64>, Option<i64>, Option<i64>) = conn.query_row(
			"SELECT min(tile_column), max(tile_column), min(tile_row), max(tile_row) FROM tiles WHERE zoom_level = ?1",
			params![zoom],
			|row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
		)?;
		Ok(match bounds {
			(Some(min_c), Some(max_c), Some(min_r), Some(max_r)) => {
				Some((min_c as u32, max_c as u32, min_r as u32, max_r as u32))
			}
			_ => None,
		})
	}

	fn columns_for_row(&self, zoom: u8, row: u32) -> Result<HashSet<u32>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare("SELECT tile_column FROM tiles WHERE zoom_level = ?1 AND tile_row = ?2")?;
		let columns = stmt
			.query_map(params![zoom, row], |r| r.get::<_, i64>(0))?
			.collect::<r2d2_sqlite::rusqlite::Result<Vec<_>>>()?;
		Ok(columns.into_iter().map(|c| c as u32).collect())
	}

	fn coordinates(&self, zoom: u8) -> Result<Vec<(u32, u32)>> {
		let table = match self.mode {
			SchemaMode::Compacted => "map",
			SchemaMode::Legacy => "tiles",
		};
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare(&format!("SELECT tile_column, tile_row FROM {table} WHERE zoom_level = ?1"))?;
		let coords = stmt
			.query_map(params![zoom], |r| Ok((r.get::<_, i64>(0)? as u32, r.get::<_, i64>(1)? as u32)))?
			.collect::<r2d2_sqlite::rusqlite::Result<Vec<_>>>()?;
		Ok(coords)
	}

	fn max_updated_at(&self) -> Result<i64> {
		if self.mode == SchemaMode::Legacy {
			return Ok(0);
		}
		let max: Option<i64> = self
			.pool
			.get()?
			.query_row("SELECT max(updated_at) FROM map", [], |row| row.get(0))?;
		Ok(max.unwrap_or(0))
	}

	fn tiles_count(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<u64> {
		let sql = match self.mode {
			SchemaMode::Compacted => format!(
				"SELECT count(zoom_level) FROM map WHERE {} AND tile_id IS NOT NULL",
				filter_clause("", zooms, times)
			),
			SchemaMode::Legacy => {
				self.ensure_no_time_filter(times)?;
				format!(
					"SELECT count(zoom_level) FROM tiles WHERE {}",
					filter_clause("", zooms, &TimeRange::default())
				)
			}
		};
		let count: i64 = self.pool.get()?.query_row(&sql, [], |row| row.get(0))?;
		Ok(count as u64)
	}

	fn iter_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter> {
		let sql = match self.mode {
			SchemaMode::Compacted => compacted_page_sql(zooms, times),
			SchemaMode::Legacy => {
				self.ensure_no_time_filter(times)?;
				format!(
					"SELECT rowid, zoom_level, tile_column, tile_row, tile_data, NULL \
					FROM tiles WHERE rowid > ?1 AND {} ORDER BY rowid LIMIT {STREAM_BATCH_SIZE}",
					filter_clause("", zooms, &TimeRange::default())
				)
			}
		};
		Ok(Box::new(SqlitePages::new(self.pool.clone(), sql)))
	}

	fn iter_tiles_with_id(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter> {
		self.ensure_compacted("the dedup-aware iterator")?;
		let sql = compacted_page_sql(zooms, times);
		Ok(Box::new(SqlitePages::new(self.pool.clone(), sql)))
	}

	fn insert_image(&self, content_id: &str, payload: &[u8]) -> Result<bool> {
		let changed = self.pool.get()?.execute(
			"INSERT OR IGNORE INTO images (tile_id, tile_data) VALUES (?1, ?2)",
			params![content_id, payload],
		)?;
		Ok(changed > 0)
	}

	fn insert_images(&self, images: &[(String, Vec<u8>)]) -> Result<u64> {
		let mut conn = self.pool.get()?;
		let mut inserted = 0u64;
		if self.auto_commit {
			for (content_id, payload) in images {
				inserted += conn.execute(
					"INSERT OR IGNORE INTO images (tile_id, tile_data) VALUES (?1, ?2)",
					params![content_id, payload],
				)? as u64;
			}
		} else {
			let tx = conn.transaction()?;
			for (content_id, payload) in images {
				inserted += tx.execute(
					"INSERT OR IGNORE INTO images (tile_id, tile_data) VALUES (?1, ?2)",
					params![content_id, payload],
				)? as u64;
			}
			tx.commit()?;
		}
		Ok(inserted)
	}

	fn insert_ref(&self, zoom: u8, column: u32, row: u32, content_id: &str, replace: bool) -> Result<()> {
		let sql = if replace {
			"REPLACE INTO map (zoom_level, tile_column, tile_row, tile_id, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)"
		} else {
			"INSERT OR IGNORE INTO map (zoom_level, tile_column, tile_row, tile_id, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)"
		};
		self
			.pool
			.get()?
			.execute(sql, params![zoom, column, row, content_id, unix_now()])?;
		Ok(())
	}

	fn insert_refs(&self, refs: &[TileRef]) -> Result<()> {
		const SQL: &str = "REPLACE INTO map (zoom_level, tile_column, tile_row, tile_id, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)";
		let mut conn = self.pool.get()?;
		if self.auto_commit {
			for r in refs {
				conn.execute(SQL, params![r.zoom, r.column, r.row, r.content_id, r.updated_at])?;
			}
		} else {
			let tx = conn.transaction()?;
			for r in refs {
				tx.execute(SQL, params![r.zoom, r.column, r.row, r.content_id, r.updated_at])?;
			}
			tx.commit()?;
		}
		Ok(())
	}

	fn update_image(&self, old_id: &str, new_id: &str, payload: &[u8]) -> Result<()> {
		let mut conn = self.pool.get()?;
		let tx = conn.transaction()?;
		tx.execute(
			"INSERT OR IGNORE INTO images (tile_id, tile_data) VALUES (?1, ?2)",
			params![new_id, payload],
		)?;
		tx.execute(
			"UPDATE map SET tile_id = ?1, updated_at = ?2 WHERE tile_id = ?3",
			params![new_id, unix_now(), old_id],
		)?;
		if old_id != new_id {
			tx.execute("DELETE FROM images WHERE tile_id = ?1", params![old_id])?;
		}
		tx.commit()?;
		Ok(())
	}

	fn delete_image(&self, content_id: &str) -> Result<()> {
		let conn = self.pool.get()?;
		conn.execute("DELETE FROM map WHERE tile_id = ?1", params![content_id])?;
		conn.execute("DELETE FROM images WHERE tile_id = ?1", params![content_id])?;
		Ok(())
	}

	fn delete_ref(&self, zoom: u8, column: u32, row: u32) -> Result<()> {
		let conn = self.pool.get()?;
		match self.mode {
			SchemaMode::Compacted => {
				conn.execute(
					"DELETE FROM images WHERE tile_id IN \
					(SELECT tile_id FROM map WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3)",
					params![zoom, column, row],
				)?;
				conn.execute(
					"DELETE FROM map WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
					params![zoom, column, row],
				)?;
			}
			SchemaMode::Legacy => {
				conn.execute(
					"DELETE FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
					params![zoom, column, row],
				)?;
			}
		}
		Ok(())
	}

	fn delete_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<()> {
		let conn = self.pool.get()?;
		match self.mode {
			SchemaMode::Compacted => {
				let filter = filter_clause("", zooms, times);
				conn.execute(
					&format!("DELETE FROM images WHERE tile_id IN (SELECT tile_id FROM map WHERE {filter})"),
					[],
				)?;
				conn.execute(&format!("DELETE FROM map WHERE {filter}"), [])?;
			}
			SchemaMode::Legacy => {
				self.ensure_no_time_filter(times)?;
				let filter = filter_clause("", zooms, &TimeRange::default());
				conn.execute(&format!("DELETE FROM tiles WHERE {filter}"), [])?;
			}
		}
		Ok(())
	}

	fn expire(&self, zooms: &ZoomRange, cutoff: i64) -> Result<u64> {
		self.ensure_compacted("expire")?;
		let filter = format!(
			"zoom_level >= {} AND zoom_level <= {} AND updated_at < {cutoff}",
			zooms.min, zooms.max
		);
		let conn = self.pool.get()?;
		conn.execute(
			&format!("DELETE FROM images WHERE tile_id IN (SELECT tile_id FROM map WHERE {filter})"),
			[],
		)?;
		let removed = conn.execute(&format!("DELETE FROM map WHERE {filter}"), [])?;
		Ok(removed as u64)
	}

	fn create_ref_index(&self) -> Result<()> {
		self
			.pool
			.get()?
			.execute("CREATE INDEX IF NOT EXISTS map_tile_id_index ON map (tile_id)", [])?;
		Ok(())
	}

	fn drop_ref_index(&self) -> Result<()> {
		self.pool.get()?.execute("DROP INDEX IF EXISTS map_tile_id_index", [])?;
		Ok(())
	}

	fn optimize(&self, skip_analyze: bool, skip_vacuum: bool) -> Result<()> {
		let conn = self.pool.get()?;
		if !skip_analyze {
			log::info!("analyzing {}", self.locator);
			conn.execute_batch("ANALYZE")?;
		}
		if !skip_vacuum {
			log::info!("vacuuming {}", self.locator);
			conn.execute_batch("VACUUM")?;
		}
		Ok(())
	}

	fn prepare_compaction(&self) -> Result<()> {
		// Unique indices exist from the start so that re-running an
		// interrupted compaction stays idempotent.
		self.pool.get()?.execute_batch(
			"CREATE TABLE IF NOT EXISTS images (tile_id TEXT, tile_data BLOB);
			CREATE TABLE IF NOT EXISTS map (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_id TEXT, updated_at INTEGER);
			CREATE UNIQUE INDEX IF NOT EXISTS map_index ON map (zoom_level, tile_column, tile_row);
			CREATE UNIQUE INDEX IF NOT EXISTS images_id ON images (tile_id);",
		)?;
		Ok(())
	}

	fn finalize_compaction(&self) -> Result<()> {
		let conn = self.pool.get()?;
		conn.execute_batch(&format!("DROP TABLE IF EXISTS tiles; {CREATE_TILES_VIEW};"))?;
		conn.execute_batch("ANALYZE; VACUUM;")?;
		Ok(())
	}
}

fn compacted_page_sql(zooms: &ZoomRange, times: &TimeRange) -> String {
	format!(
		"SELECT map.rowid, map.zoom_level, map.tile_column, map.tile_row, images.tile_data, images.tile_id \
		FROM map JOIN images ON images.tile_id = map.tile_id \
		WHERE map.rowid > ?1 AND map.tile_id IS NOT NULL AND {} \
		ORDER BY map.rowid LIMIT {STREAM_BATCH_SIZE}",
		filter_clause("map.", zooms, times)
	)
}

/// Keyset-paginated iterator over tile rows. Each page re-queries with the
/// last seen rowid, on a freshly pooled connection.
struct SqlitePages {
	pool: Pool<SqliteConnectionManager>,
	sql: String,
	last_rowid: i64,
	buffer: std::vec::IntoIter<TileRow>,
	done: bool,
}

impl SqlitePages {
	fn new(pool: Pool<SqliteConnectionManager>, sql: String) -> SqlitePages {
		SqlitePages {
			pool,
			sql,
			last_rowid: 0,
			buffer: Vec::new().into_iter(),
			done: false,
		}
	}

	fn fetch_page(&mut self) -> Result<Vec<TileRow>> {
		let conn = self.pool.get()?;
		let mut stmt = conn.prepare(&self.sql).context("preparing tile page query")?;
		let mut rows = stmt.query(params![self.last_rowid])?;
		let mut page = Vec::with_capacity(STREAM_BATCH_SIZE);
		while let Some(row) = rows.next()? {
			self.last_rowid = row.get(0)?;
			page.push(TileRow {
				zoom: row.get::<_, i64>(1)? as u8,
				column: row.get::<_, i64>(2)? as u32,
				row: row.get::<_, i64>(3)? as u32,
				payload: row.get(4)?,
				content_id: row.get::<_, Option<String>>(5)?,
			});
		}
		Ok(page)
	}
}

impl Iterator for SqlitePages {
	type Item = Result<TileRow>;

	fn next(&mut self) -> Option<Self::Item> {
		if let Some(row) = self.buffer.next() {
			return Some(Ok(row));
		}
		if self.done {
			return None;
		}
		match self.fetch_page() {
			Ok(page) => {
				if page.len() < STREAM_BATCH_SIZE {
					self.done = true;
				}
				self.buffer = page.into_iter();
				self.buffer.next().map(Ok)
			}
			Err(err) => {
				self.done = true;
				Some(Err(err))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::content::content_id;
	use assert_fs::TempDir;

	fn fresh_store(dir: &TempDir, name: &str) -> SqliteStore {
		let store = SqliteStore::open(&dir.path().join(name), &OpenOptions::default()).unwrap();
		store.setup_schema().unwrap();
		store
	}

	#[test]
	fn missing_file_with_must_exist_fails() {
		let dir = TempDir::new().unwrap();
		let result = SqliteStore::open(&dir.path().join("absent.mbtiles"), &OpenOptions::existing());
		assert!(result.is_err());
	}

	#[test]
	fn fresh_store_is_compacted_and_setup_is_idempotent() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		assert_eq!(store.schema_mode(), SchemaMode::Compacted);
		store.setup_schema().unwrap();
		store.setup_schema().unwrap();
	}

	#[test]
	fn metadata_round_trip() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		store.update_metadata("format", "png").unwrap();
		store.update_metadata("format", "jpg").unwrap();
		store.update_metadata("name", "test").unwrap();
		let metadata = store.metadata().unwrap().unwrap();
		assert_eq!(metadata.get("format").map(String::as_str), Some("jpg"));
		assert_eq!(metadata.len(), 2);
	}

	#[test]
	fn metadata_is_absent_without_schema() {
		let dir = TempDir::new().unwrap();
		let store = SqliteStore::open(&dir.path().join("bare.mbtiles"), &OpenOptions::default()).unwrap();
		assert!(store.metadata().unwrap().is_none());
	}

	#[test]
	fn image_inserts_are_idempotent() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		let id = content_id(b"payload");
		assert!(store.insert_image(&id, b"payload").unwrap());
		assert!(!store.insert_image(&id, b"payload").unwrap());
	}

	#[test]
	fn ref_upsert_is_last_write_wins() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		store.insert_image("one", b"1").unwrap();
		store.insert_image("two", b"2").unwrap();
		store.insert_ref(3, 1, 2, "one", true).unwrap();
		store.insert_ref(3, 1, 2, "two", true).unwrap();
		store.insert_ref(3, 1, 2, "one", false).unwrap();

		let rows: Vec<_> = store
			.iter_tiles(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
			.collect::<Result<_>>()
			.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].content_id.as_deref(), Some("two"));
		assert_eq!(rows[0].payload, b"2");
	}

	#[test]
	fn iteration_pages_return_every_row_once() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		let id = content_id(b"x");
		store.insert_image(&id, b"x").unwrap();

		let refs: Vec<TileRef> = (0..2500u32)
			.map(|i| TileRef {
				zoom: 12,
				column: i % 64,
				row: i / 64,
				content_id: id.clone(),
				updated_at: 1000,
			})
			.collect();
		store.insert_refs(&refs).unwrap();

		let mut seen = HashSet::new();
		for row in store
			.iter_tiles_with_id(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
		{
			let row = row.unwrap();
			assert!(seen.insert((row.column, row.row)), "row returned twice");
			assert_eq!(row.content_id.as_deref(), Some(id.as_str()));
		}
		assert_eq!(seen.len(), 2500);
		assert_eq!(
			store.tiles_count(&ZoomRange::default(), &TimeRange::default()).unwrap(),
			2500
		);
	}

	#[test]
	fn time_filters_are_half_open() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		store.insert_image("i", b"x").unwrap();
		for (row, ts) in [(0u32, 100i64), (1, 200), (2, 300)] {
			store
				.insert_refs(&[TileRef {
					zoom: 1,
					column: 0,
					row,
					content_id: "i".to_string(),
					updated_at: ts,
				}])
				.unwrap();
		}
		let zooms = ZoomRange::default();
		assert_eq!(store.tiles_count(&zooms, &TimeRange::new(100, 300)).unwrap(), 1);
		assert_eq!(store.tiles_count(&zooms, &TimeRange::new(0, 300)).unwrap(), 2);
		assert_eq!(store.tiles_count(&zooms, &TimeRange::new(100, 0)).unwrap(), 2);
		assert_eq!(store.max_updated_at().unwrap(), 300);
	}

	#[test]
	fn delete_tiles_removes_images_in_scope_only() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		store.insert_image("low", b"low").unwrap();
		store.insert_image("high", b"high").unwrap();
		store.insert_ref(2, 0, 0, "low", true).unwrap();
		store.insert_ref(5, 0, 0, "high", true).unwrap();

		store
			.delete_tiles(&ZoomRange::new(0, 3).unwrap(), &TimeRange::default())
			.unwrap();

		let rows: Vec<_> = store
			.iter_tiles(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
			.collect::<Result<_>>()
			.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].zoom, 5);
		assert!(!store.insert_image("high", b"high").unwrap(), "image must survive");
		assert!(store.insert_image("low", b"low").unwrap(), "image must be gone");
	}

	#[test]
	fn expire_honors_cutoff() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		let now = unix_now();
		store.insert_image("old", b"old").unwrap();
		store.insert_image("new", b"new").unwrap();
		store
			.insert_refs(&[
				TileRef {
					zoom: 1,
					column: 0,
					row: 0,
					content_id: "old".to_string(),
					updated_at: now - 10 * 86400,
				},
				TileRef {
					zoom: 1,
					column: 1,
					row: 0,
					content_id: "new".to_string(),
					updated_at: now - 86400,
				},
			])
			.unwrap();

		let removed = store.expire(&ZoomRange::default(), now - 5 * 86400).unwrap();
		assert_eq!(removed, 1);

		let rows: Vec<_> = store
			.iter_tiles(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
			.collect::<Result<_>>()
			.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!((rows[0].column, rows[0].row), (1, 0));
	}

	#[test]
	fn update_image_repoints_refs() {
		let dir = TempDir::new().unwrap();
		let store = fresh_store(&dir, "a.mbtiles");
		store.insert_image("old", b"old").unwrap();
		store.insert_ref(4, 1, 1, "old", true).unwrap();
		store.insert_ref(4, 2, 2, "old", true).unwrap();

		store.update_image("old", "new", b"new").unwrap();

		let rows: Vec<_> = store
			.iter_tiles_with_id(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
			.collect::<Result<_>>()
			.unwrap();
		assert_eq!(rows.len(), 2);
		for row in rows {
			assert_eq!(row.content_id.as_deref(), Some("new"));
			assert_eq!(row.payload, b"new");
		}
		assert!(store.insert_image("old", b"old").unwrap(), "old image must be gone");
	}

	#[test]
	fn legacy_layout_is_detected() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("legacy.mbtiles");
		{
			let conn = Connection::open(&path).unwrap();
			conn
				.execute_batch(
					"CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
					CREATE TABLE metadata (name TEXT, value TEXT);",
				)
				.unwrap();
			conn
				.execute(
					"INSERT INTO tiles VALUES (1, 0, 0, x'01'), (1, 1, 0, x'01'), (2, 0, 0, x'02')",
					[],
				)
				.unwrap();
		}
		let store = SqliteStore::open(&path, &OpenOptions::existing()).unwrap();
		assert_eq!(store.schema_mode(), SchemaMode::Legacy);
		assert_eq!(
			store.tiles_count(&ZoomRange::default(), &TimeRange::default()).unwrap(),
			3
		);
		assert_eq!(store.max_updated_at().unwrap(), 0);
		assert!(store
			.iter_tiles_with_id(&ZoomRange::default(), &TimeRange::default())
			.is_err());
		assert!(store
			.tiles_count(&ZoomRange::default(), &TimeRange::new(1, 0))
			.is_err());

		let rows: Vec<_> = store
			.iter_tiles(&ZoomRange::default(), &TimeRange::default())
			.unwrap()
			.collect::<Result<_>>()
			.unwrap();
		assert_eq!(rows.len(), 3);
		assert!(rows.iter().all(|r| r.content_id.is_none()));
	}
}
