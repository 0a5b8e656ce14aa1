//! Full-precision grid build: scan every latitude line and write it out.

use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;

use byteorder::{BigEndian as BE, WriteBytesExt};
use log::{debug, error, info};
use serde::Serialize;

use super::format::{
    FormationIdWidth, GridBuildOptions, GridHeader, LineFormation, SegmentBounds,
    FORMATION_HEADER_FIXED, LINE_HEADER_FIXED,
};
use crate::audit::AuditSink;
use crate::cursor::FileCursor;
use crate::error::{PgrdError, Result};
use crate::geometry::GeometrySource;
use crate::progress::BuildObserver;
use crate::scan::{Interval, ScanEngine};

/// Counts reported after a grid build.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GridBuildSummary {
    pub line_count: usize,
    pub lines_failed: usize,
    pub formations_written: usize,
    pub formations_skipped: usize,
    pub segments_written: usize,
    pub bytes_written: u64,
}

/// What happened to one line passed to [`GridWriter::write_line`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineOutcome {
    pub written: bool,
    pub formations: usize,
    pub skipped: usize,
    pub segments: usize,
}

impl LineFormation {
    /// Narrows scan intervals to the stored single precision.
    pub fn from_intervals(id: usize, intervals: &[Interval]) -> Self {
        Self {
            id,
            segments: intervals
                .iter()
                .map(|iv| SegmentBounds {
                    west: iv.west as f32,
                    east: iv.east as f32,
                })
                .collect(),
        }
    }
}

/// Encodes one formation record: pair count, id, alternating bounds.
pub fn encode_formation(formation: &LineFormation, width: FormationIdWidth) -> Result<Vec<u8>> {
    if formation.id as u64 > width.max_id() {
        return Err(PgrdError::InvalidParameter(format!(
            "formation id {} does not fit in {} bytes",
            formation.id,
            width.bytes()
        )));
    }
    let pairs = u32::try_from(formation.segments.len()).map_err(|_| {
        PgrdError::InvalidParameter(format!("{} segments in one formation", formation.segments.len()))
    })?;

    let mut buf = Vec::with_capacity(
        FORMATION_HEADER_FIXED + width.bytes() + 8 * formation.segments.len(),
    );
    buf.write_u32::<BE>(pairs)?;
    match width {
        FormationIdWidth::Short => buf.write_u16::<BE>(formation.id as u16)?,
        FormationIdWidth::Int => buf.write_u32::<BE>(formation.id as u32)?,
    }
    for seg in &formation.segments {
        buf.write_f32::<BE>(seg.west)?;
        buf.write_f32::<BE>(seg.east)?;
    }
    Ok(buf)
}

/// Joins encoded formation records into a line: length, count, offset
/// table (relative to the line start), bodies.
pub fn assemble_line(bodies: &[Vec<u8>]) -> io::Result<Vec<u8>> {
    let table_end = LINE_HEADER_FIXED + 4 * bodies.len();
    let total = table_end + bodies.iter().map(Vec::len).sum::<usize>();
    let too_long = || io::Error::new(io::ErrorKind::InvalidInput, format!("line of {total} bytes"));
    let total_u32 = u32::try_from(total).map_err(|_| too_long())?;

    let mut buf = Vec::with_capacity(total);
    buf.write_u32::<BE>(total_u32)?;
    buf.write_u32::<BE>(bodies.len() as u32)?;

    let mut offset = table_end;
    for body in bodies {
        buf.write_u32::<BE>(offset as u32)?;
        offset += body.len();
    }
    for body in bodies {
        buf.extend_from_slice(body);
    }
    Ok(buf)
}

/// Writes a full-precision grid line by line.
///
/// The header (with a zeroed offset table) goes out in [`GridWriter::new`];
/// each line's slot is patched once its bytes are placed.
#[derive(Debug)]
pub struct GridWriter<W: Write + Seek> {
    cursor: FileCursor<W>,
    header: GridHeader,
    next_line: usize,
}

impl<W: Write + Seek> GridWriter<W> {
    pub fn new(out: W, header: GridHeader) -> Result<Self> {
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

    pub fn header(&self) -> &GridHeader {
        &self.header
    }

    pub fn bytes_written(&self) -> u64 {
        self.cursor.end()
    }

    /// Writes the next line.
    ///
    /// Formations that cannot be encoded are reported to `audit` and left
    /// out. A line that cannot be written is reported and left with a zero
    /// offset slot; only running past the header's line count is an error.
    pub fn write_line(
        &mut self,
        formations: &[LineFormation],
        audit: &mut dyn AuditSink,
    ) -> Result<LineOutcome> {
        let line = self.next_line;
        if line >= self.header.line_count {
            return Err(PgrdError::bounds("line", line, self.header.line_count));
        }
        self.next_line += 1;

        let mut outcome = LineOutcome::default();
        let mut bodies = Vec::with_capacity(formations.len());
        for formation in formations {
            match encode_formation(formation, self.header.id_width) {
                Ok(body) => {
                    outcome.segments += formation.segments.len();
                    bodies.push(body);
                }
                Err(err) => {
                    outcome.skipped += 1;
                    audit.record(&format!(
                        "line {line}: formation {} skipped: {err}",
                        formation.id
                    ));
                }
            }
        }

        let placed = assemble_line(&bodies).and_then(|bytes| {
            let start = self.cursor.append(&bytes)?;
            self.cursor
                .patch(GridHeader::line_slot(line), &start.to_be_bytes())
        });
        match placed {
            Ok(()) => {
                outcome.written = true;
                outcome.formations = bodies.len();
            }
            Err(err) => {
                audit.record(&format!("line {line}: not written: {err}"));
                outcome.skipped += bodies.len();
                outcome.segments = 0;
            }
        }
        Ok(outcome)
    }

    /// Flushes and returns the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.cursor
            .into_inner()
            .map_err(|e| PgrdError::file_build("final flush", e))
    }
}

/// Scans `source` line by line and writes the full-precision grid to `out`.
///
/// Fails when the options are rejected, the header cannot be written, the
/// final flush fails, or a record fails with a non-recoverable error.
/// Everything finer grained is audited and skipped.
pub fn build_grid<S, W>(
    source: &S,
    out: W,
    options: &GridBuildOptions,
    audit: &mut dyn AuditSink,
    observer: &mut dyn BuildObserver,
) -> Result<GridBuildSummary>
where
    S: GeometrySource + ?Sized,
    W: Write + Seek,
{
    let header = GridHeader::for_extent(source.extent()?, options)?;
    let engine = ScanEngine::new(source, audit);
    let mut writer = GridWriter::new(out, header)?;

    let total = header.line_count;
    info!(
        "grid build: {} records, {} lines every {} deg from {}",
        source.record_count(),
        total,
        header.latitude_interval,
        header.extent.min_lat
    );
    observer.on_start(total);

    let mut summary = GridBuildSummary {
        line_count: total,
        ..Default::default()
    };

    for line in 0..total {
        let lat = header.line_latitude(line);
        let mut formations = Vec::new();

        for record in engine.enclosing(lat) {
            match engine.interior_intervals(record, lat, audit) {
                Ok(intervals) if intervals.is_empty() => {}
                Ok(intervals) => formations.push(LineFormation::from_intervals(record, &intervals)),
                Err(err) if err.is_recoverable() => {
                    summary.formations_skipped += 1;
                    audit.record(&format!("line {line}: record {record} skipped: {err}"));
                }
                Err(err) => {
                    error!("grid build aborted at line {line}, record {record}: {err}");
                    return Err(err);
                }
            }
        }

        let outcome = writer.write_line(&formations, audit)?;
        debug!(
            "line {line} at {lat}: {} formations, {} segments",
            outcome.formations, outcome.segments
        );
        if !outcome.written {
            summary.lines_failed += 1;
        }
        summary.formations_written += outcome.formations;
        summary.formations_skipped += outcome.skipped;
        summary.segments_written += outcome.segments;

        observer.on_line_complete(line + 1, total);
    }

    summary.bytes_written = writer.bytes_written();
    writer.finish()?;
    observer.on_finish();

    info!(
        "grid build complete: {} formations, {} segments, {} skipped, {} bytes",
        summary.formations_written,
        summary.segments_written,
        summary.formations_skipped,
        summary.bytes_written
    );
    Ok(summary)
}

/// [`build_grid`] into a newly created file at `path`.
pub fn build_grid_file<S, P>(
    source: &S,
    path: P,
    options: &GridBuildOptions,
    audit: &mut dyn AuditSink,
    observer: &mut dyn BuildObserver,
) -> Result<GridBuildSummary>
where
    S: GeometrySource + ?Sized,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    build_grid(source, BufWriter::new(file), options, audit, observer)
}
