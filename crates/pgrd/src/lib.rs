//! PGRD: latitude-indexed polygon coverage grids.
//!
//! A polygon dataset (usually an ESRI shapefile) is sampled along horizontal
//! latitude lines. Each line records, per enclosing polygon ("formation"),
//! the longitude intervals that lie inside it. That full-precision grid can
//! then be re-quantized onto a fixed longitude step and run-length encoded.
//!
//! Pipeline:
//!   [`GeometrySource`] -> [`scan::ScanEngine`] -> [`grid::build_grid`]
//!     -> [`grid::GridFile`] -> [`compact::compress_grid`] -> [`compact::CompactGrid`]
//!
//! Both file formats are big-endian and seekable: a fixed header, an
//! absolute offset per line, and per-line offset tables relative to the line
//! start. See [`grid`] and [`compact`] for the byte layouts.
//!
//! Failures on a single ring, record, formation or segment are sent to an
//! [`AuditSink`] and skipped; only file-level failures abort a build.

pub mod audit;
pub mod bytes;
pub mod compact;
pub mod cursor;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod mapped;
pub mod progress;
pub mod scan;
pub mod shapefile;

pub use audit::{AuditLog, AuditSink};
pub use compact::{compress_grid, compress_grid_file, CompactGrid, CompressOptions, CompressSummary};
pub use error::{PgrdError, Result};
pub use geometry::{Extent, GeoPoint, GeometrySource, Polygon, PolygonSet};
pub use grid::{
    build_grid, build_grid_file, FormationIdWidth, GridBuildOptions, GridBuildSummary, GridFile,
};
pub use progress::{BuildObserver, LogProgress, NoopObserver, ProgressFn};
pub use shapefile::ShapeFile;
