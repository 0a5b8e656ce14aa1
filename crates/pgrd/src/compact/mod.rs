//! Compact grid: runs of formation ids on a fixed longitude step.
//!
//! File layout (big-endian):
//!   00  : f64     min_lat
//!   08  : f64     min_lon
//!   10  : f64     max_lat
//!   18  : f64     max_lon
//!   20  : f64     latitude_interval
//!   28  : f64     longitude_interval
//!   30  : i32     line_count
//!   34  : i32     segment identifier kind (id width of the source grid)
//!   38  : u32[line_count]  absolute line offsets
//!
//! Line:
//!   u32 length, u32 part_count, u32 overflow_count,
//!   overflow_count x (u32 run index, u16 multiplier),
//!   u32[part_count] part offsets relative to the line start,
//!   then per part: f32 start longitude, u32 total points,
//!   runs as (u16 formation id, u16 point count mod 32767).
//!
//! A run's true point count is `32767 * multiplier + stored`, where the
//! multiplier is zero for runs absent from the overflow table.

mod format;
mod model;
mod reader;
mod writer;

pub use format::{decode_line, encode_line, CompactHeader, COMPACT_HEADER_FIXED};
pub use model::{
    compact_line, join_count, split_count, CompactLine, OverflowEntry, Part, QuantizedRun,
    RawSegment, RUN_LIMIT,
};
pub use reader::CompactGrid;
pub use writer::{
    collect_segments, compress_grid, compress_grid_file, CompactWriter, CompressOptions,
    CompressSummary, LineSegments,
};
