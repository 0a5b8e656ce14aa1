//! Random access over a compact grid file.

use std::path::Path;

use super::format::{decode_line, CompactHeader};
use super::model::CompactLine;
use crate::bytes::BeView;
use crate::error::{PgrdError, Result};
use crate::mapped::MappedBytes;

/// Read-only view of a compact grid file.
#[derive(Debug)]
pub struct CompactGrid {
    bytes: MappedBytes,
    header: CompactHeader,
}

impl CompactGrid {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_mapped(MappedBytes::open(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_mapped(MappedBytes::from_vec(bytes))
    }

    fn from_mapped(bytes: MappedBytes) -> Result<Self> {
        let header = CompactHeader::decode(BeView::new(&bytes))?;
        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &CompactHeader {
        &self.header
    }

    pub fn line_count(&self) -> usize {
        self.header.line_count
    }

    pub fn line_offset(&self, line: usize) -> Result<usize> {
        if line >= self.header.line_count {
            return Err(PgrdError::bounds("line", line, self.header.line_count));
        }
        let view = BeView::new(&self.bytes);
        let offset = view.u32_at(CompactHeader::line_slot(line) as usize)? as usize;
        if offset < self.header.encoded_len() || offset >= view.len() {
            return Err(PgrdError::InvalidFormat(format!(
                "line {line} offset {offset} outside the line area"
            )));
        }
        Ok(offset)
    }

    /// Decodes `line` with true (overflow-corrected) run counts.
    pub fn line(&self, line: usize) -> Result<CompactLine> {
        let offset = self.line_offset(line)?;
        let view = BeView::new(&self.bytes);
        decode_line(view.slice(offset, view.len() - offset)?)
    }

    /// Formation covering longitude `lon` on `line`, if any.
    ///
    /// A part anchored at `a` covers `[a + s*k, a + s*(k + n))` with its run
    /// of `n` points, where `k` counts the points of the runs before it.
    pub fn formation_at(&self, line: usize, lon: f64) -> Result<Option<u32>> {
        let step = self.header.longitude_interval;
        let decoded = self.line(line)?;

        for part in &decoded.parts {
            let anchor = part.start_lon as f64;
            let mut k = 0u64;
            for run in &part.runs {
                let lo = anchor + step * k as f64;
                k += run.count as u64;
                let hi = anchor + step * k as f64;
                if lon >= lo && lon < hi {
                    return Ok(Some(run.formation));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::model::{Part, QuantizedRun, RUN_LIMIT};
    use crate::compact::writer::CompactWriter;
    use crate::geometry::Extent;
    use std::io::Cursor;

    fn grid(lines: &[CompactLine], step: f64) -> CompactGrid {
        let header = CompactHeader {
            extent: Extent {
                min_lat: 10.0,
                min_lon: -5.0,
                max_lat: 10.0 + lines.len() as f64,
                max_lon: 5.0,
            },
            latitude_interval: 1.0,
            longitude_interval: step,
            line_count: lines.len(),
            segment_kind: 2,
        };
        let mut writer = CompactWriter::new(Cursor::new(Vec::new()), header).unwrap();
        for line in lines {
            writer.write_line(line).unwrap();
        }
        CompactGrid::from_bytes(writer.finish().unwrap().into_inner()).unwrap()
    }

    fn run(formation: u32, count: u32) -> QuantizedRun {
        QuantizedRun { formation, count }
    }

    #[test]
    fn lines_decode_with_overflow_counts() {
        let lines = vec![
            CompactLine {
                parts: vec![Part {
                    start_lon: -4.0,
                    runs: vec![run(1, 2 * RUN_LIMIT + 5), run(2, RUN_LIMIT)],
                }],
            },
            CompactLine::default(),
        ];
        let grid = grid(&lines, 1e-4);

        assert_eq!(grid.line_count(), 2);
        assert_eq!(grid.line(0).unwrap(), lines[0]);
        assert_eq!(grid.line(1).unwrap(), lines[1]);
        assert!(matches!(
            grid.line(2),
            Err(PgrdError::Bounds { what: "line", .. })
        ));
    }

    #[test]
    fn point_queries_walk_runs_from_the_anchor() {
        let lines = vec![CompactLine {
            parts: vec![
                Part {
                    start_lon: -2.0,
                    runs: vec![run(4, 4), run(7, 2)],
                },
                Part {
                    start_lon: 3.0,
                    runs: vec![run(9, 1)],
                },
            ],
        }];
        let grid = grid(&lines, 0.5);

        assert_eq!(grid.formation_at(0, -2.0).unwrap(), Some(4));
        assert_eq!(grid.formation_at(0, -0.25).unwrap(), Some(4));
        assert_eq!(grid.formation_at(0, 0.0).unwrap(), Some(7));
        assert_eq!(grid.formation_at(0, 0.75).unwrap(), Some(7));
        assert_eq!(grid.formation_at(0, 1.0).unwrap(), None);
        assert_eq!(grid.formation_at(0, 3.25).unwrap(), Some(9));
        assert_eq!(grid.formation_at(0, -3.0).unwrap(), None);
    }
}
