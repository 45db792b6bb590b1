//! Backend selection by connection-string shape.

use crate::config::AliasConfig;
use crate::error::StoreError;
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;

lazy_static! {
	static ref DBNAME: Regex = Regex::new(r"dbname\s*=\s*([^\s]+)").unwrap();
}

/// Where a tile store lives: an embedded SQLite file or a PostgreSQL
/// database. Parsed once from the connection string; all dialect logic stays
/// inside the matching backend.
#[derive(Clone, PartialEq, Eq)]
pub enum StoreLocator {
	/// A `*.mbtiles` SQLite file.
	Sqlite(PathBuf),
	/// A PostgreSQL connection string (`dbname=... host=...`).
	Postgres(String),
}

impl StoreLocator {
	/// Parse a connection string by shape:
	/// - `*.mbtiles` → SQLite
	/// - `pg:<alias>` → PostgreSQL via the alias configuration
	/// - anything containing `dbname` → PostgreSQL, used verbatim
	pub fn parse(input: &str, config: &AliasConfig) -> Result<StoreLocator> {
		if input.ends_with(".mbtiles") {
			Ok(StoreLocator::Sqlite(PathBuf::from(input)))
		} else if let Some(alias) = input.strip_prefix("pg:") {
			Ok(StoreLocator::Postgres(config.resolve(alias)?.to_string()))
		} else if input.contains("dbname") {
			Ok(StoreLocator::Postgres(input.to_string()))
		} else {
			Err(StoreError::UnknownLocator(input.to_string()).into())
		}
	}
}

impl fmt::Display for StoreLocator {
	/// A log-friendly description that never leaks credentials.
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StoreLocator::Sqlite(path) => write!(f, "file '{}'", path.display()),
			StoreLocator::Postgres(conn) => match DBNAME.captures(conn) {
				Some(captures) => write!(f, "database '{}'", &captures[1]),
				None => write!(f, "database"),
			},
		}
	}
}

impl fmt::Debug for StoreLocator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn mbtiles_suffix_selects_sqlite() {
		let locator = StoreLocator::parse("/data/world.mbtiles", &AliasConfig::empty()).unwrap();
		assert_eq!(locator, StoreLocator::Sqlite(PathBuf::from("/data/world.mbtiles")));
	}

	#[test]
	fn dbname_selects_postgres() {
		let locator = StoreLocator::parse("dbname=tiles host=db1 password=s3cret", &AliasConfig::empty()).unwrap();
		assert_eq!(locator.to_string(), "database 'tiles'");
	}

	#[test]
	fn pg_prefix_resolves_aliases() {
		let config = AliasConfig::parse("world: dbname=world_tiles");
		let locator = StoreLocator::parse("pg:world", &config).unwrap();
		assert_eq!(locator, StoreLocator::Postgres("dbname=world_tiles".to_string()));
		assert!(StoreLocator::parse("pg:missing", &config).is_err());
	}

	#[test]
	fn unknown_shape_is_rejected() {
		assert!(StoreLocator::parse("something.tar", &AliasConfig::empty()).is_err());
	}
}
