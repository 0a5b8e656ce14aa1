//! Full-precision grid layout shared by the encoder and decoder.

use std::io;

use byteorder::{BigEndian as BE, WriteBytesExt};
use serde::Serialize;

use crate::bytes::BeView;
use crate::error::{PgrdError, Result};
use crate::geometry::Extent;

/// Five doubles, line count, formation id width.
pub const GRID_HEADER_FIXED: usize = 48;
/// Line length and formation count.
pub const LINE_HEADER_FIXED: usize = 8;
/// Pair count preceding the formation id.
pub const FORMATION_HEADER_FIXED: usize = 4;

/// Width of the formation id field in each formation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormationIdWidth {
    #[default]
    Short,
    Int,
}

impl FormationIdWidth {
    #[inline]
    pub const fn bytes(self) -> usize {
        match self {
            FormationIdWidth::Short => 2,
            FormationIdWidth::Int => 4,
        }
    }

    pub fn from_bytes(width: i32) -> Result<Self> {
        match width {
            2 => Ok(FormationIdWidth::Short),
            4 => Ok(FormationIdWidth::Int),
            other => Err(PgrdError::InvalidFormat(format!(
                "formation id width {other} (expected 2 or 4)"
            ))),
        }
    }

    /// Largest record index representable in this width.
    pub const fn max_id(self) -> u64 {
        match self {
            FormationIdWidth::Short => u16::MAX as u64,
            FormationIdWidth::Int => u32::MAX as u64,
        }
    }
}

/// Options for building a full-precision grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridBuildOptions {
    pub latitude_interval: f64,
    pub id_width: FormationIdWidth,
}

impl GridBuildOptions {
    pub fn new(latitude_interval: f64) -> Result<Self> {
        let options = Self {
            latitude_interval,
            id_width: FormationIdWidth::default(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_id_width(mut self, id_width: FormationIdWidth) -> Self {
        self.id_width = id_width;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.latitude_interval.is_finite() && self.latitude_interval > 0.0) {
            return Err(PgrdError::InvalidParameter(format!(
                "latitude interval must be positive and finite, got {}",
                self.latitude_interval
            )));
        }
        Ok(())
    }
}

/// Decoded (or to-be-written) full-precision file header.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridHeader {
    pub extent: Extent,
    pub latitude_interval: f64,
    pub line_count: usize,
    pub id_width: FormationIdWidth,
}

impl GridHeader {
    /// Header covering `extent`, with one line every `latitude_interval`
    /// degrees starting at its minimum latitude.
    pub fn for_extent(extent: Extent, options: &GridBuildOptions) -> Result<Self> {
        options.validate()?;
        if extent.is_empty() {
            return Err(PgrdError::InvalidParameter(
                "geometry source has no readable bounding boxes".into(),
            ));
        }

        let line_count = line_count_for(&extent, options.latitude_interval);
        if line_count == 0 {
            return Err(PgrdError::InvalidParameter(format!(
                "latitude interval {} yields no lines over [{}, {}]",
                options.latitude_interval, extent.min_lat, extent.max_lat
            )));
        }
        if line_count > i32::MAX as usize {
            return Err(PgrdError::InvalidParameter(format!(
                "{line_count} lines do not fit the header"
            )));
        }

        Ok(Self {
            extent,
            latitude_interval: options.latitude_interval,
            line_count,
            id_width: options.id_width,
        })
    }

    #[inline]
    pub fn line_latitude(&self, line: usize) -> f64 {
        self.extent.min_lat + line as f64 * self.latitude_interval
    }

    /// Header length including the line offset table.
    #[inline]
    pub fn encoded_len(&self) -> usize {
        GRID_HEADER_FIXED + 8 * self.line_count
    }

    /// Position of the offset table slot for `line`.
    #[inline]
    pub fn line_slot(line: usize) -> u64 {
        (GRID_HEADER_FIXED + 8 * line) as u64
    }

    /// Header bytes with every line offset zeroed.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.write_f64::<BE>(self.extent.min_lat)?;
        buf.write_f64::<BE>(self.extent.min_lon)?;
        buf.write_f64::<BE>(self.extent.max_lat)?;
        buf.write_f64::<BE>(self.extent.max_lon)?;
        buf.write_f64::<BE>(self.latitude_interval)?;
        buf.write_i32::<BE>(self.line_count as i32)?;
        buf.write_i32::<BE>(self.id_width.bytes() as i32)?;
        buf.resize(self.encoded_len(), 0);
        Ok(buf)
    }

    pub fn decode(view: BeView<'_>) -> Result<Self> {
        if view.len() < GRID_HEADER_FIXED {
            return Err(PgrdError::InvalidFormat(format!(
                "grid file is {} bytes, shorter than its {GRID_HEADER_FIXED}-byte header",
                view.len()
            )));
        }

        let extent = Extent {
            min_lat: view.f64_at(0)?,
            min_lon: view.f64_at(8)?,
            max_lat: view.f64_at(16)?,
            max_lon: view.f64_at(24)?,
        };
        let latitude_interval = view.f64_at(32)?;
        let line_count = view.i32_at(40)?;
        let id_width = FormationIdWidth::from_bytes(view.i32_at(44)?)?;

        let line_count = usize::try_from(line_count)
            .map_err(|_| PgrdError::InvalidFormat(format!("negative line count {line_count}")))?;

        let header = Self {
            extent,
            latitude_interval,
            line_count,
            id_width,
        };
        if view.len() < header.encoded_len() {
            return Err(PgrdError::InvalidFormat(format!(
                "line offset table for {line_count} lines runs past end of file ({} bytes)",
                view.len()
            )));
        }
        Ok(header)
    }
}

/// `floor((max_lat - min_lat) / interval)`.
pub fn line_count_for(extent: &Extent, latitude_interval: f64) -> usize {
    let lines = ((extent.max_lat - extent.min_lat) / latitude_interval).floor();
    if lines.is_finite() && lines > 0.0 {
        lines as usize
    } else {
        0
    }
}

/// West/east bounds of one segment, as stored (single precision).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SegmentBounds {
    pub west: f32,
    pub east: f32,
}

/// One formation's segments on one line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineFormation {
    pub id: usize,
    pub segments: Vec<SegmentBounds>,
}
