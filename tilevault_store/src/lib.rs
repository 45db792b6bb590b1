//! Storage layer for MBTiles-style tile archives.
//!
//! A [`TileStore`] is a uniform CRUD/streaming interface over two backend
//! types: an embedded SQLite file (`*.mbtiles`) and a PostgreSQL database.
//! Both hide their SQL dialect and their schema mode behind the same trait.
//!
//! Stores come in two schema modes:
//! - **Legacy**: one flat `tiles` table with the payload embedded per
//!   coordinate, no deduplication.
//! - **Compacted**: normalized `images` (content-addressed payloads) and
//!   `map` (coordinate → content id) tables joined by a `tiles` view.
//!
//! [`compact::compact_store`] converts the former into the latter.

pub mod compact;
pub mod config;
pub mod content;
pub mod error;
pub mod locator;
pub mod options;
pub mod store;

pub use compact::{compact_store, CompactOutcome};
pub use config::AliasConfig;
pub use content::{content_id, unix_now};
pub use error::StoreError;
pub use locator::StoreLocator;
pub use options::{JournalMode, OpenOptions};
pub use store::{open_store, PostgresStore, SchemaMode, SqliteStore, TileIter, TileRef, TileRow, TileStore};
