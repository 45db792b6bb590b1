mod common;

use assert_fs::TempDir;
use common::{all_tiles, compacted_store, distinct_images, legacy_store, seed_tiles, seed_tiles_at};
use pretty_assertions::assert_eq;
use tilevault::ops::merge::{merge, MergeOptions};
use tilevault::ops::update::{update, UpdateOptions};
use tilevault_core::{TimeRange, ZoomRange};
use tilevault_store::{unix_now, OpenOptions, SqliteStore, TileStore};

#[tokio::test]
async fn merge_deduplicates_identical_payloads() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	source.update_metadata("format", "png").unwrap();

	seed_tiles(
		&source,
		&[(3, 0, 0, b"same"), (3, 1, 0, b"same"), (3, 2, 0, b"other")],
	);

	let summary = merge(&destination, &source, &MergeOptions::default()).await.unwrap();
	assert_eq!(summary.total, 3);
	assert_eq!(summary.transferred, 3);

	assert_eq!(all_tiles(&destination).unwrap().len(), 3);
	assert_eq!(distinct_images(&destination), 2);
	assert_eq!(
		destination.metadata().unwrap().unwrap().get("format").map(String::as_str),
		Some("png")
	);
}

#[tokio::test]
async fn merging_identical_content_creates_no_new_images() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));

	let tiles: &[(u8, u32, u32, &[u8])] = &[(2, 0, 0, b"aa"), (2, 1, 0, b"bb"), (2, 1, 1, b"aa")];
	seed_tiles(&destination, tiles);
	seed_tiles(&source, tiles);
	let before = all_tiles(&destination).unwrap();

	merge(&destination, &source, &MergeOptions::default()).await.unwrap();

	assert_eq!(distinct_images(&destination), 2);
	let after = all_tiles(&destination).unwrap();
	assert_eq!(before, after);
}

#[tokio::test]
async fn no_overwrite_preserves_existing_coordinates() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));

	seed_tiles_at(&destination, &[(1, 0, 0, b"old")], 12345);
	seed_tiles(&source, &[(1, 0, 0, b"new"), (1, 1, 0, b"fresh")]);

	let summary = merge(
		&destination,
		&source,
		&MergeOptions {
			no_overwrite: true,
			..MergeOptions::default()
		},
	)
	.await
	.unwrap();

	assert_eq!(summary.skipped, 1);
	assert_eq!(summary.transferred, 1);

	let tiles = all_tiles(&destination).unwrap();
	assert_eq!(tiles.len(), 2);
	assert_eq!(tiles[0].3, b"old".to_vec(), "existing payload must survive");
	// The skipped coordinate keeps its original timestamp; only the new
	// tile carries a current one.
	let reopened = SqliteStore::open(&dir.path().join("dst.mbtiles"), &OpenOptions::existing()).unwrap();
	assert!(reopened.max_updated_at().unwrap() > 12345);
	assert_eq!(
		reopened
			.tiles_count(&ZoomRange::default(), &TimeRange::new(0, 12346))
			.unwrap(),
		1,
		"the old timestamp must be untouched"
	);
}

#[tokio::test]
async fn format_mismatch_aborts_without_mutation() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));

	destination.update_metadata("format", "png").unwrap();
	seed_tiles(&destination, &[(1, 0, 0, b"keep")]);
	source.update_metadata("format", "jpg").unwrap();
	seed_tiles(&source, &[(1, 1, 0, b"invader")]);

	let before = all_tiles(&destination).unwrap();
	let result = merge(&destination, &source, &MergeOptions::default()).await;

	assert!(result.is_err());
	assert!(result.unwrap_err().to_string().contains("different tile formats"));
	assert_eq!(all_tiles(&destination).unwrap(), before);
}

#[tokio::test]
async fn destination_inherits_source_format() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	source.update_metadata("format", "jpg").unwrap();
	seed_tiles(&source, &[(0, 0, 0, b"x")]);

	merge(&destination, &source, &MergeOptions::default()).await.unwrap();
	assert_eq!(
		destination.metadata().unwrap().unwrap().get("format").map(String::as_str),
		Some("jpg")
	);
}

#[tokio::test]
async fn empty_source_is_reported_as_no_op() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));

	let summary = merge(&destination, &source, &MergeOptions::default()).await.unwrap();
	assert_eq!(summary.total, 0);
	assert_eq!(summary.transferred, 0);
}

#[tokio::test]
async fn timestamp_window_requires_compacted_source() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let legacy_path = dir.path().join("legacy.mbtiles");
	legacy_store(&legacy_path, &[(1, 0, 0, b"x")]);
	let source = SqliteStore::open(&legacy_path, &OpenOptions::existing()).unwrap();

	let result = merge(
		&destination,
		&source,
		&MergeOptions {
			times: TimeRange::new(1, 0),
			..MergeOptions::default()
		},
	)
	.await;
	assert!(result.is_err());
}

#[tokio::test]
async fn legacy_source_is_hashed_per_row() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let legacy_path = dir.path().join("legacy.mbtiles");
	legacy_store(
		&legacy_path,
		&[(1, 0, 0, b"dup"), (1, 1, 0, b"dup"), (1, 0, 1, b"solo")],
	);
	let source = SqliteStore::open(&legacy_path, &OpenOptions::existing()).unwrap();

	let summary = merge(&destination, &source, &MergeOptions::default()).await.unwrap();
	assert_eq!(summary.transferred, 3);
	assert_eq!(all_tiles(&destination).unwrap().len(), 3);
	assert_eq!(distinct_images(&destination), 2);
}

#[tokio::test]
async fn flip_y_lands_on_the_flipped_row() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	seed_tiles(&source, &[(3, 1, 2, b"x")]);

	merge(
		&destination,
		&source,
		&MergeOptions {
			flip_y: true,
			..MergeOptions::default()
		},
	)
	.await
	.unwrap();

	let tiles = all_tiles(&destination).unwrap();
	assert_eq!((tiles[0].0, tiles[0].1, tiles[0].2), (3, 1, 5));
}

#[tokio::test]
async fn transform_chain_runs_once_per_distinct_payload() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	seed_tiles(
		&source,
		&[(2, 0, 0, b"one"), (2, 1, 0, b"one"), (2, 2, 0, b"two")],
	);

	let summary = merge(
		&destination,
		&source,
		&MergeOptions {
			commands: vec!["printf flat > %s".to_string()],
			..MergeOptions::default()
		},
	)
	.await
	.unwrap();

	assert_eq!(summary.transferred, 3);
	let tiles = all_tiles(&destination).unwrap();
	assert_eq!(tiles.len(), 3);
	assert!(tiles.iter().all(|t| t.3 == b"flat".to_vec()));
	assert_eq!(distinct_images(&destination), 1);
}

#[tokio::test]
async fn vanished_transform_outputs_are_counted_not_fatal() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	seed_tiles(&source, &[(1, 0, 0, b"a"), (1, 1, 0, b"b")]);

	let summary = merge(
		&destination,
		&source,
		&MergeOptions {
			commands: vec!["rm -f %s".to_string()],
			..MergeOptions::default()
		},
	)
	.await
	.unwrap();

	assert_eq!(summary.vanished, 2);
	assert_eq!(summary.transferred, 0);
	assert!(all_tiles(&destination).unwrap().is_empty());
}

#[tokio::test]
async fn delete_after_export_moves_the_tiles() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	seed_tiles(&source, &[(1, 0, 0, b"x"), (4, 0, 0, b"y")]);

	merge(
		&destination,
		&source,
		&MergeOptions {
			zooms: ZoomRange::single(1),
			delete_after: true,
			skip_vacuum: true,
			..MergeOptions::default()
		},
	)
	.await
	.unwrap();

	assert_eq!(all_tiles(&destination).unwrap().len(), 1);
	let left: Vec<_> = all_tiles(&source).unwrap();
	assert_eq!(left.len(), 1);
	assert_eq!(left[0].0, 4, "only the out-of-range tile remains");
}

#[tokio::test]
async fn uncompacted_destination_is_fatal() {
	let dir = TempDir::new().unwrap();
	let legacy_path = dir.path().join("legacy.mbtiles");
	legacy_store(&legacy_path, &[(1, 0, 0, b"x")]);
	let destination = SqliteStore::open(&legacy_path, &OpenOptions::existing()).unwrap();
	let source = compacted_store(&dir.path().join("src.mbtiles"));
	seed_tiles(&source, &[(1, 0, 0, b"x")]);

	assert!(merge(&destination, &source, &MergeOptions::default()).await.is_err());
}

#[tokio::test]
async fn update_pulls_only_tiles_past_the_high_water_mark() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let source = compacted_store(&dir.path().join("src.mbtiles"));

	seed_tiles_at(&destination, &[(1, 0, 0, b"stale")], 1000);
	seed_tiles_at(&source, &[(1, 0, 0, b"ancient")], 900);
	seed_tiles_at(&source, &[(1, 1, 0, b"recent")], unix_now() - 5);

	let summary = update(&destination, &source, &UpdateOptions::default()).await.unwrap();
	assert_eq!(summary.total, 1);
	assert_eq!(summary.transferred, 1);

	let tiles = all_tiles(&destination).unwrap();
	assert_eq!(tiles.len(), 2);
	assert_eq!(tiles[0].3, b"stale".to_vec(), "older source tile must not clobber");
	assert_eq!(tiles[1].3, b"recent".to_vec());
}

#[tokio::test]
async fn update_requires_both_stores_compacted() {
	let dir = TempDir::new().unwrap();
	let destination = compacted_store(&dir.path().join("dst.mbtiles"));
	let legacy_path = dir.path().join("legacy.mbtiles");
	legacy_store(&legacy_path, &[(1, 0, 0, b"x")]);
	let source = SqliteStore::open(&legacy_path, &OpenOptions::existing()).unwrap();

	assert!(update(&destination, &source, &UpdateOptions::default()).await.is_err());
}
