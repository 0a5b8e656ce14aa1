//! ESRI shapefile polygon reader (`.shp` + `.shx`).
//!
//! Main file layout (`.shp`):
//!   00  : i32 BE  file code = 9994
//!   18  : i32 BE  file length (16-bit words)
//!   1C  : i32 LE  version
//!   20  : i32 LE  shape type
//!   24  : f64 LE  xmin, ymin, xmax, ymax
//!   64  : records
//!
//! Index file (`.shx`): same 100-byte header, then per record
//!   i32 BE offset (16-bit words), i32 BE content length (16-bit words).
//!
//! Polygon record, relative to its offset:
//!   00  : i32 BE  record number, i32 BE content length
//!   08  : i32 LE  shape type
//!   0C  : f64 LE  xmin, ymin, xmax, ymax
//!   2C  : i32 LE  part count
//!   30  : i32 LE  point count
//!   34  : i32 LE  part start indices [part count]
//!   ..  : f64 LE  x, y pairs [point count]
//!
//! Longitude is x, latitude is y. The `.dbf` attribute table is not needed
//! for geometry and is never opened.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::debug;

use crate::bytes::{BeView, LeView};
use crate::error::{PgrdError, Result};
use crate::geometry::{Extent, GeoPoint, GeometrySource};
use crate::mapped::MappedBytes;

pub const ESRI_FILE_CODE: i32 = 9994;

pub const SHAPE_NULL: i32 = 0;
pub const SHAPE_POLYGON: i32 = 5;
pub const SHAPE_POLYGON_Z: i32 = 15;
pub const SHAPE_POLYGON_M: i32 = 25;

const FILE_HEADER_LEN: usize = 100;
const INDEX_ENTRY_LEN: usize = 8;
const POINT_LEN: usize = 16;

#[inline]
fn is_polygon_type(shape_type: i32) -> bool {
    matches!(shape_type, SHAPE_POLYGON | SHAPE_POLYGON_Z | SHAPE_POLYGON_M)
}

/// A polygon shapefile opened for random access.
#[derive(Debug)]
pub struct ShapeFile {
    shp: MappedBytes,
    shx: MappedBytes,
    version: i32,
    shape_type: i32,
    extent: Extent,
}

/// Byte offsets of one polygon record's variable-length sections.
#[derive(Debug, Clone, Copy)]
struct RecordLayout {
    start: usize,
    parts: usize,
    points: usize,
}

impl RecordLayout {
    #[inline]
    fn part_table(&self) -> usize {
        self.start + 52
    }

    #[inline]
    fn point_table(&self) -> usize {
        self.part_table() + 4 * self.parts
    }
}

/// Splits `name.shp` (or bare `name`) into the `.shp` and `.shx` paths.
pub fn component_paths<P: AsRef<Path>>(path: P) -> (PathBuf, PathBuf) {
    let path = path.as_ref();
    let has_shp_ext = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("shp"))
        .unwrap_or(false);

    let base: OsString = if has_shp_ext {
        path.with_extension("").into_os_string()
    } else {
        path.as_os_str().to_owned()
    };

    let with = |ext: &str| {
        let mut name = base.clone();
        name.push(ext);
        PathBuf::from(name)
    };

    (with(".shp"), with(".shx"))
}

impl ShapeFile {
    /// Opens `path` (with or without the `.shp` extension) and its `.shx`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (shp_path, shx_path) = component_paths(path);
        debug!("Opening shapefile {} / {}", shp_path.display(), shx_path.display());

        let shp = MappedBytes::open(&shp_path)?;
        let shx = MappedBytes::open(&shx_path)?;
        Self::from_backing(shp, shx)
    }

    /// Builds a reader over in-memory `.shp` and `.shx` contents.
    pub fn from_bytes(shp: Vec<u8>, shx: Vec<u8>) -> Result<Self> {
        Self::from_backing(MappedBytes::from_vec(shp), MappedBytes::from_vec(shx))
    }

    fn from_backing(shp: MappedBytes, shx: MappedBytes) -> Result<Self> {
        check_file_code(&shp, "main file")?;
        check_file_code(&shx, "index file")?;

        let le = LeView::new(&shp);
        let version = le.i32_at(28)?;
        let shape_type = le.i32_at(32)?;
        if !is_polygon_type(shape_type) {
            return Err(PgrdError::InvalidFormat(format!(
                "shape type {shape_type} is not a polygon type"
            )));
        }

        let extent = Extent {
            min_lon: le.f64_at(36)?,
            min_lat: le.f64_at(44)?,
            max_lon: le.f64_at(52)?,
            max_lat: le.f64_at(60)?,
        };

        Ok(Self {
            shp,
            shx,
            version,
            shape_type,
            extent,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn shape_type(&self) -> i32 {
        self.shape_type
    }

    #[inline]
    fn le(&self) -> LeView<'_> {
        LeView::new(&self.shp)
    }

    /// Byte offset of a record header in the main file.
    pub fn record_offset(&self, record: usize) -> Result<usize> {
        let count = self.record_count();
        if record >= count {
            return Err(PgrdError::bounds("record", record, count));
        }

        let words = BeView::new(&self.shx).i32_at(FILE_HEADER_LEN + INDEX_ENTRY_LEN * record)?;
        usize::try_from(words)
            .map(|w| w * 2)
            .map_err(|_| truncated(record, None, format!("negative record offset {words}")))
    }

    /// Shape type stored in a record's content (0 for null records).
    pub fn record_shape_type(&self, record: usize) -> Result<i32> {
        let start = self.record_offset(record)?;
        self.le()
            .i32_at(start + 8)
            .map_err(|e| read_error(e, record, None))
    }

    fn layout(&self, record: usize) -> Result<Option<RecordLayout>> {
        let start = self.record_offset(record)?;
        let le = self.le();
        let read = |offset: usize| le.i32_at(start + offset).map_err(|e| read_error(e, record, None));

        let shape_type = read(8)?;
        if shape_type == SHAPE_NULL {
            return Ok(None);
        }
        if !is_polygon_type(shape_type) {
            return Err(truncated(record, None, format!("unexpected shape type {shape_type}")));
        }

        let parts = read(44)?;
        let points = read(48)?;
        if parts < 0 || points < 0 {
            return Err(truncated(record, None, format!("negative counts ({parts} parts, {points} points)")));
        }

        Ok(Some(RecordLayout {
            start,
            parts: parts as usize,
            points: points as usize,
        }))
    }

    /// Point index range `[first, end)` of one ring.
    fn part_range(&self, layout: &RecordLayout, record: usize, part: usize) -> Result<(usize, usize)> {
        if part >= layout.parts {
            return Err(PgrdError::bounds("part", part, layout.parts));
        }

        let le = self.le();
        let index_at = |i: usize| {
            le.i32_at(layout.part_table() + 4 * i)
                .map_err(|e| read_error(e, record, Some(part)))
        };

        let first = index_at(part)?;
        let end = if part + 1 == layout.parts {
            layout.points as i32
        } else {
            index_at(part + 1)?
        };

        if first < 0 || end < first || end as usize > layout.points {
            return Err(truncated(
                record,
                Some(part),
                format!("corrupt part index [{first}, {end}) of {} points", layout.points),
            ));
        }

        Ok((first as usize, end as usize))
    }

    fn point_at(&self, layout: &RecordLayout, record: usize, part: usize, index: usize) -> Result<GeoPoint> {
        let offset = layout.point_table() + POINT_LEN * index;
        let le = self.le();
        let lon = le.f64_at(offset).map_err(|e| read_error(e, record, Some(part)))?;
        let lat = le.f64_at(offset + 8).map_err(|e| read_error(e, record, Some(part)))?;
        Ok(GeoPoint { lat, lon })
    }
}

impl GeometrySource for ShapeFile {
    fn record_count(&self) -> usize {
        self.shx.len().saturating_sub(FILE_HEADER_LEN) / INDEX_ENTRY_LEN
    }

    fn bounding_box(&self, record: usize) -> Result<Extent> {
        let layout = self
            .layout(record)?
            .ok_or_else(|| truncated(record, None, "null shape has no bounding box".into()))?;

        let le = self.le();
        let read = |offset: usize| le.f64_at(layout.start + offset).map_err(|e| read_error(e, record, None));
        Ok(Extent {
            min_lon: read(12)?,
            min_lat: read(20)?,
            max_lon: read(28)?,
            max_lat: read(36)?,
        })
    }

    fn part_count(&self, record: usize) -> Result<usize> {
        Ok(self.layout(record)?.map_or(0, |l| l.parts))
    }

    fn part_point_count(&self, record: usize, part: usize) -> Result<usize> {
        let layout = self.layout(record)?.ok_or_else(|| PgrdError::bounds("part", part, 0))?;
        let (first, end) = self.part_range(&layout, record, part)?;
        Ok(end - first)
    }

    fn point(&self, record: usize, part: usize, index: usize) -> Result<GeoPoint> {
        let layout = self.layout(record)?.ok_or_else(|| PgrdError::bounds("part", part, 0))?;
        let (first, end) = self.part_range(&layout, record, part)?;
        if index >= end - first {
            return Err(PgrdError::bounds("point", index, end - first));
        }
        self.point_at(&layout, record, part, first + index)
    }

    fn extent(&self) -> Result<Extent> {
        Ok(self.extent)
    }

    fn ring(&self, record: usize, part: usize) -> Result<Vec<GeoPoint>> {
        let layout = self.layout(record)?.ok_or_else(|| PgrdError::bounds("part", part, 0))?;
        let (first, end) = self.part_range(&layout, record, part)?;
        (first..end)
            .map(|i| self.point_at(&layout, record, part, i))
            .collect()
    }
}

fn check_file_code(bytes: &[u8], which: &str) -> Result<()> {
    if bytes.len() < FILE_HEADER_LEN {
        return Err(PgrdError::InvalidFormat(format!(
            "shapefile {which} shorter than its {FILE_HEADER_LEN}-byte header"
        )));
    }

    let code = BeView::new(bytes).i32_at(0)?;
    if code != ESRI_FILE_CODE {
        return Err(PgrdError::InvalidFormat(format!(
            "no ESRI file code ({ESRI_FILE_CODE}) in shapefile {which}, found {code}"
        )));
    }

    Ok(())
}

fn truncated(record: usize, part: Option<usize>, detail: String) -> PgrdError {
    PgrdError::GeometryRead { record, part, detail }
}

/// Byte-level overruns inside a record mean the record data is damaged.
fn read_error(err: PgrdError, record: usize, part: Option<usize>) -> PgrdError {
    match err {
        PgrdError::Bounds { index, len, .. } => truncated(
            record,
            part,
            format!("record data truncated at byte {index} of {len}"),
        ),
        other => other,
    }
}
