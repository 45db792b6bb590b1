//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use std::collections::HashSet;
use std::path::Path;
use tilevault_core::{TimeRange, ZoomRange};
use tilevault_store::{content_id, unix_now, OpenOptions, SqliteStore, TileRef, TileStore};

/// Open (creating if needed) a compacted SQLite store with its schema set up.
pub fn compacted_store(path: &Path) -> SqliteStore {
	let store = SqliteStore::open(path, &OpenOptions::default()).unwrap();
	store.setup_schema().unwrap();
	store
}

/// Insert tiles with the current timestamp; payloads collapse by content id.
pub fn seed_tiles(store: &dyn TileStore, tiles: &[(u8, u32, u32, &[u8])]) {
	seed_tiles_at(store, tiles, unix_now());
}

/// Insert tiles with an explicit `updated_at`.
pub fn seed_tiles_at(store: &dyn TileStore, tiles: &[(u8, u32, u32, &[u8])], updated_at: i64) {
	let mut refs = Vec::new();
	for (zoom, column, row, payload) in tiles {
		let id = content_id(payload);
		store.insert_image(&id, payload).unwrap();
		refs.push(TileRef {
			zoom: *zoom,
			column: *column,
			row: *row,
			content_id: id,
			updated_at,
		});
	}
	store.insert_refs(&refs).unwrap();
}

/// Every tile of the store as `(zoom, column, row, payload, content_id)`.
pub fn all_tiles(store: &dyn TileStore) -> Result<Vec<(u8, u32, u32, Vec<u8>, Option<String>)>> {
	let mut tiles = Vec::new();
	for row in store.iter_tiles(&ZoomRange::new(0, 30)?, &TimeRange::default())? {
		let row = row?;
		tiles.push((row.zoom, row.column, row.row, row.payload, row.content_id));
	}
	tiles.sort();
	Ok(tiles)
}

/// Number of distinct images referenced by the store.
pub fn distinct_images(store: &dyn TileStore) -> usize {
	let mut ids = HashSet::new();
	for row in store
		.iter_tiles_with_id(&ZoomRange::new(0, 30).unwrap(), &TimeRange::default())
		.unwrap()
	{
		ids.insert(row.unwrap().content_id.unwrap());
	}
	ids.len()
}

/// Create a legacy (flat `tiles` table) store on disk.
pub fn legacy_store(path: &Path, tiles: &[(u8, u32, u32, &[u8])]) {
	let conn = r2d2_sqlite::rusqlite::Connection::open(path).unwrap();
	conn
		.execute_batch(
			"CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
			CREATE TABLE metadata (name TEXT, value TEXT);
			INSERT INTO metadata VALUES ('format', 'png');",
		)
		.unwrap();
	for (zoom, column, row, payload) in tiles {
		conn
			.execute(
				"INSERT INTO tiles VALUES (?1, ?2, ?3, ?4)",
				r2d2_sqlite::rusqlite::params![zoom, column, row, payload],
			)
			.unwrap();
	}
}
