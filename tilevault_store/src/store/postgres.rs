//! Client/server PostgreSQL backend.
//!
//! Postgres stores are always compacted; the legacy flat layout only exists
//! in SQLite files. Upserts use `ON CONFLICT` instead of SQLite's `REPLACE`,
//! and the connection always runs in autocommit. The SQLite-only durability
//! knobs of [`OpenOptions`] are ignored here.

use crate::content::unix_now;
use crate::error::StoreError;
use crate::locator::StoreLocator;
use crate::options::OpenOptions;
use crate::store::{filter_clause, SchemaMode, TileIter, TileRef, TileRow, TileStore, STREAM_BATCH_SIZE};
use anyhow::{Context, Result};
use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::collections::{BTreeMap, HashSet};
use tilevault_core::{TimeRange, ZoomRange};

const INSERT_IMAGE: &str = "INSERT INTO images (tile_id, tile_data) VALUES ($1, $2) ON CONFLICT (tile_id) DO NOTHING";
const REPLACE_REF: &str = "INSERT INTO map (zoom_level, tile_column, tile_row, tile_id, updated_at) \
	VALUES ($1, $2, $3, $4, $5) \
	ON CONFLICT (zoom_level, tile_column, tile_row) \
	DO UPDATE SET tile_id = EXCLUDED.tile_id, updated_at = EXCLUDED.updated_at";
const IGNORE_REF: &str = "INSERT INTO map (zoom_level, tile_column, tile_row, tile_id, updated_at) \
	VALUES ($1, $2, $3, $4, $5) \
	ON CONFLICT (zoom_level, tile_column, tile_row) DO NOTHING";

/// Tile store backed by a PostgreSQL database.
pub struct PostgresStore {
	locator: StoreLocator,
	pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
	/// Connect to a PostgreSQL database described by a `key=value`
	/// connection string.
	pub fn open(conn_str: &str, options: &OpenOptions) -> Result<PostgresStore> {
		let locator = StoreLocator::Postgres(conn_str.to_string());
		log::debug!("open postgres store {locator}");

		let config = conn_str
			.parse::<postgres::Config>()
			.map_err(|err| StoreError::Connection(locator.to_string(), err.to_string()))?;
		let manager = PostgresConnectionManager::new(config, NoTls);
		let pool = Pool::builder()
			.max_size(10)
			.build(manager)
			.map_err(|err| StoreError::Connection(locator.to_string(), err.to_string()))?;

		let store = PostgresStore { locator, pool };

		if options.must_exist && !store.has_table("map")? {
			return Err(StoreError::Connection(
				store.locator.to_string(),
				"the map table does not exist".to_string(),
			)
			.into());
		}

		Ok(store)
	}

	fn has_table(&self, name: &str) -> Result<bool> {
		let mut client = self.pool.get()?;
		let row = client.query_one("SELECT count(*) FROM pg_tables WHERE tablename = $1", &[&name])?;
		Ok(row.get::<_, i64>(0) > 0)
	}
}

impl TileStore for PostgresStore {
	fn locator(&self) -> &StoreLocator {
		&self.locator
	}

	/// The flat legacy layout only exists in SQLite files.
	fn schema_mode(&self) -> SchemaMode {
		SchemaMode::Compacted
	}

	fn setup_schema(&self) -> Result<()> {
		self.pool.get()?.batch_execute(
			"CREATE TABLE IF NOT EXISTS images (tile_id VARCHAR(256), tile_data BYTEA);
			CREATE TABLE IF NOT EXISTS map (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_id VARCHAR(256), updated_at BIGINT);
			CREATE TABLE IF NOT EXISTS metadata (name VARCHAR(256), value TEXT);
			CREATE UNIQUE INDEX IF NOT EXISTS metadata_name_index ON metadata (name);
			CREATE UNIQUE INDEX IF NOT EXISTS map_coordinate_index ON map (zoom_level, tile_column, tile_row);
			CREATE UNIQUE INDEX IF NOT EXISTS images_id_index ON images (tile_id);
			CREATE OR REPLACE VIEW tiles AS
			SELECT map.zoom_level AS zoom_level,
			map.tile_column AS tile_column,
			map.tile_row AS tile_row,
			images.tile_data AS tile_data,
			map.updated_at AS updated_at
			FROM map
			JOIN images
			ON map.tile_id IS NOT NULL AND images.tile_id = map.tile_id;",
		)?;
		Ok(())
	}

	fn metadata(&self) -> Result<Option<BTreeMap<String, String>>> {
		if !self.has_table("metadata")? {
			return Ok(None);
		}
		let mut client = self.pool.get()?;
		let rows = client.query("SELECT name, value FROM metadata", &[])?;
		Ok(Some(
			rows
				.into_iter()
				.map(|row| (row.get::<_, String>(0), row.get::<_, String>(1)))
				.collect(),
		))
	}

	fn update_metadata(&self, name: &str, value: &str) -> Result<()> {
		self.pool.get()?.execute(
			"INSERT INTO metadata (name, value) VALUES ($1, $2) ON CONFLICT (name) DO UPDATE SET value = EXCLUDED.value",
			&[&name, &value],
		)?;
		Ok(())
	}

	fn zoom_levels(&self) -> Result<Vec<u8>> {
		let mut client = self.pool.get()?;
		let rows = client.query("SELECT DISTINCT zoom_level FROM tiles ORDER BY zoom_level", &[])?;
		Ok(rows.into_iter().map(|row| row.get::<_, i32>(0) as u8).collect())
	}

	fn bounding_box(&self, zoom: u8) -> Result<Option<(u32, u32, u32, u32)>> {
		let mut client = self.pool.get()?;
		let row = client.query_one(
			"SELECT min(tile_column), max(tile_column), min(tile_row), max(tile_row) FROM tiles WHERE zoom_level = $1",
			&[&i32::from(zoom)],
		)?;
		let bounds: (Option<i32>, Option<i32>, Option<i32>, Option<i32>) =
			(row.get(0), row.get(1), row.get(2), row.get(3));
		Ok(match bounds {
			(Some(min_c), Some(max_c), Some(min_r), Some(max_r)) => {
				Some((min_c as u32, max_c as u32, min_r as u32, max_r as u32))
			}
			_ => None,
		})
	}

	fn columns_for_row(&self, zoom: u8, row: u32) -> Result<HashSet<u32>> {
		let mut client = self.pool.get()?;
		let rows = client.query(
			"SELECT tile_column FROM tiles WHERE zoom_level = $1 AND tile_row = $2",
			&[&i32::from(zoom), &(row as i32)],
		)?;
		Ok(rows.into_iter().map(|r| r.get::<_, i32>(0) as u32).collect())
	}

	fn coordinates(&self, zoom: u8) -> Result<Vec<(u32, u32)>> {
		let mut client = self.pool.get()?;
		let rows = client.query(
			"SELECT tile_column, tile_row FROM map WHERE zoom_level = $1",
			&[&i32::from(zoom)],
		)?;
		Ok(
			rows
				.into_iter()
				.map(|r| (r.get::<_, i32>(0) as u32, r.get::<_, i32>(1) as u32))
				.collect(),
		)
	}

	fn max_updated_at(&self) -> Result<i64> {
		let mut client = self.pool.get()?;
		let row = client.query_one("SELECT max(updated_at) FROM map", &[])?;
		Ok(row.get::<_, Option<i64>>(0).unwrap_or(0))
	}

	fn tiles_count(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<u64> {
		let sql = format!(
			"SELECT count(zoom_level) FROM map WHERE {} AND tile_id IS NOT NULL",
			filter_clause("", zooms, times)
		);
		let mut client = self.pool.get()?;
		let row = client.query_one(sql.as_str(), &[])?;
		Ok(row.get::<_, i64>(0) as u64)
	}

	fn iter_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter> {
		self.iter_tiles_with_id(zooms, times)
	}

	fn iter_tiles_with_id(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<TileIter> {
		let sql = format!(
			"SELECT map.zoom_level, map.tile_column, map.tile_row, images.tile_data, images.tile_id \
			FROM map JOIN images ON images.tile_id = map.tile_id \
			WHERE (map.zoom_level, map.tile_column, map.tile_row) > ($1, $2, $3) \
			AND map.tile_id IS NOT NULL AND {} \
			ORDER BY map.zoom_level, map.tile_column, map.tile_row LIMIT {STREAM_BATCH_SIZE}",
			filter_clause("map.", zooms, times)
		);
		Ok(Box::new(PostgresPages::new(self.pool.clone(), sql)))
	}

	fn insert_image(&self, content_id: &str, payload: &[u8]) -> Result<bool> {
		let inserted = self.pool.get()?.execute(INSERT_IMAGE, &[&content_id, &payload])?;
		Ok(inserted > 0)
	}

	fn insert_images(&self, images: &[(String, Vec<u8>)]) -> Result<u64> {
		let mut client = self.pool.get()?;
		let mut tx = client.transaction()?;
		let mut inserted = 0u64;
		for (content_id, payload) in images {
			inserted += tx.execute(INSERT_IMAGE, &[content_id, payload])?;
		}
		tx.commit()?;
		Ok(inserted)
	}

	fn insert_ref(&self, zoom: u8, column: u32, row: u32, content_id: &str, replace: bool) -> Result<()> {
		let sql = if replace { REPLACE_REF } else { IGNORE_REF };
		self.pool.get()?.execute(
			sql,
			&[
				&i32::from(zoom),
				&(column as i32),
				&(row as i32),
				&content_id,
				&unix_now(),
			],
		)?;
		Ok(())
	}

	fn insert_refs(&self, refs: &[TileRef]) -> Result<()> {
		let mut client = self.pool.get()?;
		let mut tx = client.transaction()?;
		for r in refs {
			tx.execute(
				REPLACE_REF,
				&[
					&i32::from(r.zoom),
					&(r.column as i32),
					&(r.row as i32),
					&r.content_id,
					&r.updated_at,
				],
			)?;
		}
		tx.commit()?;
		Ok(())
	}

	fn update_image(&self, old_id: &str, new_id: &str, payload: &[u8]) -> Result<()> {
		let mut client = self.pool.get()?;
		let mut tx = client.transaction()?;
		tx.execute(INSERT_IMAGE, &[&new_id, &payload])?;
		tx.execute(
			"UPDATE map SET tile_id = $1, updated_at = $2 WHERE tile_id = $3",
			&[&new_id, &unix_now(), &old_id],
		)?;
		if old_id != new_id {
			tx.execute("DELETE FROM images WHERE tile_id = $1", &[&old_id])?;
		}
		tx.commit()?;
		Ok(())
	}

	fn delete_image(&self, content_id: &str) -> Result<()> {
		let mut client = self.pool.get()?;
		client.execute("DELETE FROM map WHERE tile_id = $1", &[&content_id])?;
		client.execute("DELETE FROM images WHERE tile_id = $1", &[&content_id])?;
		Ok(())
	}

	fn delete_ref(&self, zoom: u8, column: u32, row: u32) -> Result<()> {
		let coord: [&(dyn postgres::types::ToSql + Sync); 3] = [&i32::from(zoom), &(column as i32), &(row as i32)];
		let mut client = self.pool.get()?;
		client.execute(
			"DELETE FROM images WHERE tile_id IN \
			(SELECT tile_id FROM map WHERE zoom_level = $1 AND tile_column = $2 AND tile_row = $3)",
			&coord,
		)?;
		client.execute(
			"DELETE FROM map WHERE zoom_level = $1 AND tile_column = $2 AND tile_row = $3",
			&coord,
		)?;
		Ok(())
	}

	fn delete_tiles(&self, zooms: &ZoomRange, times: &TimeRange) -> Result<()> {
		let filter = filter_clause("", zooms, times);
		let mut client = self.pool.get()?;
		client.execute(
			format!("DELETE FROM images WHERE tile_id IN (SELECT tile_id FROM map WHERE {filter})").as_str(),
			&[],
		)?;
		client.execute(format!("DELETE FROM map WHERE {filter}").as_str(), &[])?;
		Ok(())
	}

	fn expire(&self, zooms: &ZoomRange, cutoff: i64) -> Result<u64> {
		let filter = format!(
			"zoom_level >= {} AND zoom_level <= {} AND updated_at < {cutoff}",
			zooms.min, zooms.max
		);
		let mut client = self.pool.get()?;
		client.execute(
			format!("DELETE FROM images WHERE tile_id IN (SELECT tile_id FROM map WHERE {filter})").as_str(),
			&[],
		)?;
		let removed = client.execute(format!("DELETE FROM map WHERE {filter}").as_str(), &[])?;
		Ok(removed)
	}

	fn create_ref_index(&self) -> Result<()> {
		self
			.pool
			.get()?
			.batch_execute("CREATE INDEX IF NOT EXISTS map_tile_id_index ON map (tile_id)")?;
		Ok(())
	}

	fn drop_ref_index(&self) -> Result<()> {
		self.pool.get()?.batch_execute("DROP INDEX IF EXISTS map_tile_id_index")?;
		Ok(())
	}

	fn optimize(&self, skip_analyze: bool, skip_vacuum: bool) -> Result<()> {
		let mut client = self.pool.get()?;
		if !skip_analyze {
			log::info!("analyzing {}", self.locator);
			client.batch_execute("ANALYZE")?;
		}
		if !skip_vacuum {
			log::info!("vacuuming {}", self.locator);
			client.batch_execute("VACUUM")?;
		}
		Ok(())
	}

	fn prepare_compaction(&self) -> Result<()> {
		Err(
			StoreError::Schema(format!(
				"{} is already compacted, the legacy layout only exists in SQLite files",
				self.locator
			))
			.into(),
		)
	}

	fn finalize_compaction(&self) -> Result<()> {
		Err(
			StoreError::Schema(format!(
				"{} is already compacted, the legacy layout only exists in SQLite files",
				self.locator
			))
			.into(),
		)
	}
}

/// Keyset-paginated iterator ordered by `(zoom_level, tile_column,
/// tile_row)`; each page binds the last seen triple on a fresh connection.
struct PostgresPages {
	pool: Pool<PostgresConnectionManager<NoTls>>,
	sql: String,
	cursor: (i32, i32, i32),
	buffer: std::vec::IntoIter<TileRow>,
	done: bool,
}

impl PostgresPages {
	fn new(pool: Pool<PostgresConnectionManager<NoTls>>, sql: String) -> PostgresPages {
		PostgresPages {
			pool,
			sql,
			cursor: (-1, -1, -1),
			buffer: Vec::new().into_iter(),
			done: false,
		}
	}

	fn fetch_page(&mut self) -> Result<Vec<TileRow>> {
		let mut client = self.pool.get()?;
		let rows = client
			.query(self.sql.as_str(), &[&self.cursor.0, &self.cursor.1, &self.cursor.2])
			.context("fetching tile page")?;
		let mut page = Vec::with_capacity(STREAM_BATCH_SIZE);
		for row in rows {
			let (zoom, column, tile_row): (i32, i32, i32) = (row.get(0), row.get(1), row.get(2));
			self.cursor = (zoom, column, tile_row);
			page.push(TileRow {
				zoom: zoom as u8,
				column: column as u32,
				row: tile_row as u32,
				payload: row.get(3),
				content_id: Some(row.get(4)),
			});
		}
		Ok(page)
	}
}

impl Iterator for PostgresPages {
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
