//! Compact grid build from a full-precision grid.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use log::{debug, error, info};
use serde::Serialize;

use super::format::{encode_line, CompactHeader};
use super::model::{compact_line, CompactLine, RawSegment};
use crate::audit::AuditSink;
use crate::cursor::FileCursor;
use crate::error::{PgrdError, Result};
use crate::grid::GridFile;
use crate::progress::BuildObserver;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    pub longitude_interval: f64,
}

impl CompressOptions {
    pub fn new(longitude_interval: f64) -> Result<Self> {
        let options = Self { longitude_interval };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.longitude_interval.is_finite() && self.longitude_interval > 0.0) {
            return Err(PgrdError::InvalidParameter(format!(
                "longitude interval must be positive and finite, got {}",
                self.longitude_interval
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompressSummary {
    pub line_count: usize,
    pub unreadable_lines: usize,
    pub segments_read: usize,
    pub segments_skipped: usize,
    pub parts: usize,
    pub runs: usize,
    pub overflows: usize,
    pub bytes_written: u64,
}

/// Writes a compact grid line by line; any write failure is fatal.
#[derive(Debug)]
pub struct CompactWriter<W: Write + Seek> {
    cursor: FileCursor<W>,
    header: CompactHeader,
    next_line: usize,
}

impl<W: Write + Seek> CompactWriter<W> {
    /// Writes the header with a zeroed line offset table.
    pub fn new(out: W, header: CompactHeader) -> Result<Self> {
        let bytes = header
            .encode()
            .map_err(|e| PgrdError::file_build("header", e))?;
        let mut cursor = FileCursor::new(out).map_err(|e| PgrdError::file_build("header", e))?;
        cursor
            .append(&bytes)
            .map_err(|e| PgrdError::file_build("header", e))?;
        Ok(Self {
            cursor,
            header,
            next_line: 0,
        })
    }

    pub fn header(&self) -> &CompactHeader {
        &self.header
    }

    pub fn bytes_written(&self) -> u64 {
        self.cursor.end()
    }

    /// Appends the next line and patches its slot in the offset table.
    pub fn write_line(&mut self, line: &CompactLine) -> Result<()> {
        let index = self.next_line;
        if index >= self.header.line_count {
            return Err(PgrdError::bounds("line", index, self.header.line_count));
        }
        let bytes = encode_line(line)?;

        let stage = || format!("line {index}");
        let start = self
            .cursor
            .append(&bytes)
            .map_err(|e| PgrdError::file_build(stage(), e))?;
        let start = u32::try_from(start).map_err(|_| {
            PgrdError::InvalidParameter(format!(
                "line {index} starts at byte {start}, past the 32-bit offset table"
            ))
        })?;
        self.cursor
            .patch(CompactHeader::line_slot(index), &start.to_be_bytes())
            .map_err(|e| PgrdError::file_build(stage(), e))?;

        self.next_line += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<W> {
        self.cursor
            .into_inner()
            .map_err(|e| PgrdError::file_build("final flush", e))
    }
}

/// Segments read back from one grid line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineSegments {
    pub segments: Vec<RawSegment>,
    pub skipped: usize,
    /// False when the line's formation count could not be decoded.
    pub readable: bool,
}

/// Every readable segment on `line`, tagged with its formation id.
///
/// Unreadable formations and segments are audited and skipped; a line whose
/// formation count is unreadable yields no segments.
pub fn collect_segments(grid: &GridFile, line: usize, audit: &mut dyn AuditSink) -> LineSegments {
    let mut out = LineSegments::default();

    let formations = match grid.formation_count(line) {
        Ok(n) => n,
        Err(err) => {
            audit.record(&format!("line {line}: unreadable, written empty: {err}"));
            return out;
        }
    };
    out.readable = true;

    for f in 0..formations {
        let header = grid
            .formation_id(line, f)
            .and_then(|id| Ok((id, grid.segment_count(line, f)?)));
        let (formation, count) = match header {
            Ok(h) => h,
            Err(err) => {
                out.skipped += 1;
                audit.record(&format!("line {line}: formation {f} skipped: {err}"));
                continue;
            }
        };

        for s in 0..count {
            match grid.segment_bounds(line, f, s) {
                Ok(b) => out.segments.push(RawSegment {
                    west: b.west,
                    east: b.east,
                    formation,
                }),
                Err(err) => {
                    out.skipped += 1;
                    audit.record(&format!(
                        "line {line}: formation {f}, segment {s} skipped: {err}"
                    ));
                }
            }
        }
    }
    out
}

/// Re-quantizes every line of `grid` and writes the compact file to `out`.
///
/// Any line that fails to compact or serialize aborts the build.
pub fn compress_grid<W: Write + Seek>(
    grid: &GridFile,
    out: W,
    options: &CompressOptions,
    audit: &mut dyn AuditSink,
    observer: &mut dyn BuildObserver,
) -> Result<CompressSummary> {
    options.validate()?;
    let source = grid.header();
    let header = CompactHeader {
        extent: source.extent,
        latitude_interval: source.latitude_interval,
        longitude_interval: options.longitude_interval,
        line_count: source.line_count,
        segment_kind: source.id_width.bytes() as i32,
    };
    let mut writer = CompactWriter::new(out, header)?;

    let total = header.line_count;
    info!(
        "compressing {} lines at {} deg longitude",
        total, options.longitude_interval
    );
    observer.on_start(total);

    let mut summary = CompressSummary {
        line_count: total,
        ..Default::default()
    };

    for line in 0..total {
        let LineSegments {
            segments,
            skipped,
            readable,
        } = collect_segments(grid, line, audit);
        if !readable {
            summary.unreadable_lines += 1;
        }
        summary.segments_read += segments.len();
        summary.segments_skipped += skipped;

        let compacted = compact_line(&segments, options.longitude_interval)
            .and_then(|model| writer.write_line(&model).map(|()| model));
        let model = match compacted {
            Ok(model) => model,
            Err(err) => {
                error!("compression aborted at line {line}: {err}");
                return Err(err);
            }
        };

        debug!(
            "line {line}: {} segments -> {} parts, {} runs",
            segments.len(),
            model.parts.len(),
            model.run_count()
        );
        summary.parts += model.parts.len();
        summary.runs += model.run_count();
        summary.overflows += model.overflows().len();

        observer.on_line_complete(line + 1, total);
    }

    summary.bytes_written = writer.bytes_written();
    writer.finish()?;
    observer.on_finish();

    info!(
        "compression complete: {} parts, {} runs, {} overflows, {} bytes",
        summary.parts, summary.runs, summary.overflows, summary.bytes_written
    );
    Ok(summary)
}

/// [`compress_grid`] into a newly created file at `path`.
pub fn compress_grid_file<P: AsRef<Path>>(
    grid: &GridFile,
    path: P,
    options: &CompressOptions,
    audit: &mut dyn AuditSink,
    observer: &mut dyn BuildObserver,
) -> Result<CompressSummary> {
    let file = File::create(path.as_ref())?;
    compress_grid(grid, BufWriter::new(file), options, audit, observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::model::{Part, QuantizedRun};
    use crate::bytes::BeView;
    use crate::geometry::Extent;
    use std::io::Cursor;

    fn header(line_count: usize) -> CompactHeader {
        CompactHeader {
            extent: Extent {
                min_lat: 0.0,
                min_lon: 0.0,
                max_lat: 2.0,
                max_lon: 2.0,
            },
            latitude_interval: 1.0,
            longitude_interval: 0.5,
            line_count,
            segment_kind: 2,
        }
    }

    #[test]
    fn each_slot_points_at_its_line() {
        let mut writer = CompactWriter::new(Cursor::new(Vec::new()), header(2)).unwrap();
        writer.write_line(&CompactLine::default()).unwrap();
        writer
            .write_line(&CompactLine {
                parts: vec![Part {
                    start_lon: 1.0,
                    runs: vec![QuantizedRun { formation: 0, count: 2 }],
                }],
            })
            .unwrap();
        assert!(writer.write_line(&CompactLine::default()).is_err());

        let bytes = writer.finish().unwrap().into_inner();
        let view = BeView::new(&bytes);
        assert_eq!(view.u32_at(56).unwrap(), 64);
        assert_eq!(view.u32_at(60).unwrap(), 64 + 12);
        assert_eq!(bytes.len(), 64 + 12 + 28);
    }

    #[test]
    fn line_failures_are_fatal() {
        let mut writer = CompactWriter::new(Cursor::new(Vec::new()), header(1)).unwrap();
        let wide = CompactLine {
            parts: vec![Part {
                start_lon: 0.0,
                runs: vec![QuantizedRun { formation: 1 << 17, count: 1 }],
            }],
        };
        assert!(writer.write_line(&wide).is_err());
    }

    #[test]
    fn options_reject_bad_steps() {
        assert!(CompressOptions::new(0.25).is_ok());
        assert!(CompressOptions::new(-1.0).is_err());
        assert!(CompressOptions::new(f64::INFINITY).is_err());
    }
}
