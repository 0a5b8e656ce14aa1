//! Full-precision grid codec.
//!
//! File layout (big-endian):
//!   00  : f64     min_lat
//!   08  : f64     min_lon
//!   10  : f64     max_lat
//!   18  : f64     max_lon
//!   20  : f64     latitude_interval
//!   28  : i32     line_count
//!   2C  : i32     formation id width (2 or 4)
//!   30  : u64[line_count]  absolute line offsets
//!
//! Line:
//!   u32 length (whole line), u32 formation_count,
//!   u32[formation_count] formation offsets relative to the line start,
//!   then per formation: u32 pair_count, id (u16 or u32),
//!   f32[2 * pair_count] alternating west/east bounds.

mod decoder;
mod encoder;
mod format;

pub use decoder::GridFile;
pub use encoder::{
    assemble_line, build_grid, build_grid_file, encode_formation, GridBuildSummary, GridWriter,
    LineOutcome,
};
pub use format::{
    line_count_for, FormationIdWidth, GridBuildOptions, GridHeader, LineFormation, SegmentBounds,
    GRID_HEADER_FIXED,
};
