mod geo_bbox;
mod tile_bbox;
mod tile_coord;
mod time_range;
mod zoom_range;

pub use geo_bbox::GeoBBox;
pub use tile_bbox::TileBBox;
pub use tile_coord::{flip_row, lon_lat_to_tile, tile_to_lon_lat, TileCoord};
pub use time_range::TimeRange;
pub use zoom_range::ZoomRange;
