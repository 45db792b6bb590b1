//! Connection alias configuration.
//!
//! Locators of the form `pg:<alias>` are resolved against a flat
//! `alias: connection string` file. The file is read once at startup into an
//! explicit [`AliasConfig`] object that is threaded through all store opens;
//! nothing looks at the filesystem afterwards.

use crate::error::StoreError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Default location of the alias file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/tilevault.conf";

#[derive(Clone, Debug, Default)]
pub struct AliasConfig {
	aliases: BTreeMap<String, String>,
}

impl AliasConfig {
	/// An empty configuration that resolves no aliases.
	#[must_use]
	pub fn empty() -> AliasConfig {
		AliasConfig::default()
	}

	/// Load from an explicit file path.
	///
	/// # Errors
	/// Returns an error if the file cannot be read.
	pub fn from_path(path: &Path) -> Result<AliasConfig> {
		let text = fs::read_to_string(path).with_context(|| format!("reading alias configuration {path:?}"))?;
		Ok(AliasConfig::parse(&text))
	}

	/// Load the default configuration file, or an empty configuration if it
	/// does not exist.
	pub fn load_default() -> Result<AliasConfig> {
		let path = Path::new(DEFAULT_CONFIG_PATH);
		if path.is_file() {
			AliasConfig::from_path(path)
		} else {
			Ok(AliasConfig::empty())
		}
	}

	/// Parse `alias: connection string` lines; anything else is ignored.
	#[must_use]
	pub fn parse(text: &str) -> AliasConfig {
		let mut aliases = BTreeMap::new();
		for line in text.lines() {
			let line = line.trim();
			if line.is_empty() || line.starts_with('#') {
				continue;
			}
			if let Some((key, value)) = line.split_once(':') {
				let (key, value) = (key.trim(), value.trim());
				if !key.is_empty() && !value.is_empty() {
					aliases.insert(key.to_string(), value.to_string());
				}
			}
		}
		AliasConfig { aliases }
	}

	/// Resolve an alias to its connection string.
	///
	/// # Errors
	/// Returns [`StoreError::UnknownAlias`] if the alias is not configured.
	pub fn resolve(&self, alias: &str) -> Result<&str> {
		self
			.aliases
			.get(alias)
			.map(String::as_str)
			.ok_or_else(|| StoreError::UnknownAlias(alias.to_string()).into())
	}
}
