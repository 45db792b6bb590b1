//! Content addressing for tile payloads.

use std::time::{SystemTime, UNIX_EPOCH};

/// Derive the content id of a payload: the lowercase hex BLAKE3 digest.
///
/// Within a store the id is a pure function of the payload bytes, so
/// identical tiles collapse onto one image row no matter which operation
/// inserted them.
#[must_use]
pub fn content_id(payload: &[u8]) -> String {
	blake3::hash(payload).to_hex().to_string()
}

/// Current unix timestamp in seconds, as stored in `map.updated_at`.
#[must_use]
pub fn unix_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}
