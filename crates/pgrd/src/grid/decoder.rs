//! Random-access reader over a full-precision grid file.
//!
//! Nothing is parsed up front beyond the header: every accessor computes its
//! byte offset from the line offset table and the per-line formation table.

use std::path::Path;

use super::format::{
    FormationIdWidth, GridHeader, LineFormation, SegmentBounds, FORMATION_HEADER_FIXED,
    LINE_HEADER_FIXED,
};
use crate::bytes::BeView;
use crate::error::{PgrdError, Result};
use crate::mapped::MappedBytes;

#[derive(Debug)]
pub struct GridFile {
    bytes: MappedBytes,
    header: GridHeader,
}

impl GridFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_mapped(MappedBytes::open(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_mapped(MappedBytes::from_vec(bytes))
    }

    fn from_mapped(bytes: MappedBytes) -> Result<Self> {
        let header = GridHeader::decode(BeView::new(&bytes))?;
        Ok(Self { bytes, header })
    }

    #[inline]
    fn view(&self) -> BeView<'_> {
        BeView::new(&self.bytes)
    }

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn line_count(&self) -> usize {
        self.header.line_count
    }

    /// Absolute offset of `line`; fails for a line that was never written.
    pub fn line_offset(&self, line: usize) -> Result<usize> {
        if line >= self.header.line_count {
            return Err(PgrdError::bounds("line", line, self.header.line_count));
        }
        let offset = self.view().u64_at(GridHeader::line_slot(line) as usize)?;
        if offset < self.header.encoded_len() as u64 || offset >= self.bytes.len() as u64 {
            return Err(PgrdError::InvalidFormat(format!(
                "line {line} offset {offset} outside the line area"
            )));
        }
        Ok(offset as usize)
    }

    /// The line's bytes, bounded by its stored length.
    fn line_view(&self, line: usize) -> Result<BeView<'_>> {
        let start = self.line_offset(line)?;
        let len = self.view().u32_at(start)? as usize;
        self.view().slice(start, len).map_err(|_| {
            PgrdError::InvalidFormat(format!("line {line} length {len} runs past end of file"))
        })
    }

    pub fn formation_count(&self, line: usize) -> Result<usize> {
        Ok(self.line_view(line)?.u32_at(4)? as usize)
    }

    fn formation_view(&self, line: usize, formation: usize) -> Result<BeView<'_>> {
        let view = self.line_view(line)?;
        let count = view.u32_at(4)? as usize;
        if formation >= count {
            return Err(PgrdError::bounds("formation", formation, count));
        }
        let start = view.u32_at(LINE_HEADER_FIXED + 4 * formation)? as usize;
        if start >= view.len() {
            return Err(PgrdError::InvalidFormat(format!(
                "line {line}: formation {formation} offset {start} past line end"
            )));
        }
        view.slice(start, view.len() - start)
    }

    pub fn segment_count(&self, line: usize, formation: usize) -> Result<usize> {
        Ok(self.formation_view(line, formation)?.u32_at(0)? as usize)
    }

    pub fn formation_id(&self, line: usize, formation: usize) -> Result<u32> {
        let view = self.formation_view(line, formation)?;
        match self.header.id_width {
            FormationIdWidth::Short => Ok(view.u16_at(FORMATION_HEADER_FIXED)? as u32),
            FormationIdWidth::Int => view.u32_at(FORMATION_HEADER_FIXED),
        }
    }

    pub fn segment_bounds(
        &self,
        line: usize,
        formation: usize,
        segment: usize,
    ) -> Result<SegmentBounds> {
        let view = self.formation_view(line, formation)?;
        let count = view.u32_at(0)? as usize;
        if segment >= count {
            return Err(PgrdError::bounds("segment", segment, count));
        }
        let at = FORMATION_HEADER_FIXED + self.header.id_width.bytes() + 8 * segment;
        Ok(SegmentBounds {
            west: view.f32_at(at)?,
            east: view.f32_at(at + 4)?,
        })
    }

    /// Decodes one whole formation record.
    pub fn formation(&self, line: usize, formation: usize) -> Result<LineFormation> {
        let count = self.segment_count(line, formation)?;
        let segments = (0..count)
            .map(|s| self.segment_bounds(line, formation, s))
            .collect::<Result<Vec<_>>>()?;
        Ok(LineFormation {
            id: self.formation_id(line, formation)? as usize,
            segments,
        })
    }

    /// Decodes every formation on `line`.
    pub fn line(&self, line: usize) -> Result<Vec<LineFormation>> {
        (0..self.formation_count(line)?)
            .map(|f| self.formation(line, f))
            .collect()
    }
}
