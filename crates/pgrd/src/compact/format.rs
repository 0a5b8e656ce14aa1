//! Compact grid header and line encoding.

use std::collections::HashMap;
use std::io;

use byteorder::{BigEndian as BE, WriteBytesExt};
use serde::Serialize;

use super::model::{join_count, split_count, CompactLine, Part, QuantizedRun};
use crate::bytes::BeView;
use crate::error::{PgrdError, Result};
use crate::geometry::Extent;

/// Six doubles, line count, segment identifier kind.
pub const COMPACT_HEADER_FIXED: usize = 56;
/// Line length, part count, overflow count.
pub const COMPACT_LINE_FIXED: usize = 12;
const OVERFLOW_ENTRY_LEN: usize = 6;
/// Start longitude and total point count.
const PART_HEADER_LEN: usize = 8;
const RUN_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompactHeader {
    pub extent: Extent,
    pub latitude_interval: f64,
    pub longitude_interval: f64,
    pub line_count: usize,
    /// Formation id width of the grid this file was compressed from.
    pub segment_kind: i32,
}

impl CompactHeader {
    #[inline]
    pub fn encoded_len(&self) -> usize {
        COMPACT_HEADER_FIXED + 4 * self.line_count
    }

    #[inline]
    pub fn line_slot(line: usize) -> u64 {
        (COMPACT_HEADER_FIXED + 4 * line) as u64
    }

    #[inline]
    pub fn line_latitude(&self, line: usize) -> f64 {
        self.extent.min_lat + line as f64 * self.latitude_interval
    }

    /// Header bytes with every line offset zeroed.
    pub fn encode(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        for v in [
            self.extent.min_lat,
            self.extent.min_lon,
            self.extent.max_lat,
            self.extent.max_lon,
            self.latitude_interval,
            self.longitude_interval,
        ] {
            buf.write_f64::<BE>(v)?;
        }
        buf.write_i32::<BE>(self.line_count as i32)?;
        buf.write_i32::<BE>(self.segment_kind)?;
        buf.resize(self.encoded_len(), 0);
        Ok(buf)
    }

    pub fn decode(view: BeView<'_>) -> Result<Self> {
        if view.len() < COMPACT_HEADER_FIXED {
            return Err(PgrdError::InvalidFormat(format!(
                "compact file is {} bytes, shorter than its {COMPACT_HEADER_FIXED}-byte header",
                view.len()
            )));
        }
        let line_count = view.i32_at(48)?;
        let line_count = usize::try_from(line_count)
            .map_err(|_| PgrdError::InvalidFormat(format!("negative line count {line_count}")))?;

        let header = Self {
            extent: Extent {
                min_lat: view.f64_at(0)?,
                min_lon: view.f64_at(8)?,
                max_lat: view.f64_at(16)?,
                max_lon: view.f64_at(24)?,
            },
            latitude_interval: view.f64_at(32)?,
            longitude_interval: view.f64_at(40)?,
            line_count,
            segment_kind: view.i32_at(52)?,
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

/// Serializes one line: header, overflow table, part offsets, parts.
///
/// Fails when a formation id exceeds 16 bits, an overflow multiplier exceeds
/// 16 bits, or a part's total does not fit 32 bits.
pub fn encode_line(line: &CompactLine) -> Result<Vec<u8>> {
    let overflows = line.overflows();
    let len = line.encoded_len();
    let len_u32 = u32::try_from(len)
        .map_err(|_| PgrdError::InvalidParameter(format!("compact line of {len} bytes")))?;

    let mut buf = Vec::with_capacity(len);
    buf.write_u32::<BE>(len_u32)?;
    buf.write_u32::<BE>(line.parts.len() as u32)?;
    buf.write_u32::<BE>(overflows.len() as u32)?;

    for entry in &overflows {
        let multiplier = u16::try_from(entry.multiplier).map_err(|_| {
            PgrdError::InvalidParameter(format!(
                "run {} overflow multiplier {} exceeds 16 bits",
                entry.run_index, entry.multiplier
            ))
        })?;
        buf.write_u32::<BE>(entry.run_index)?;
        buf.write_u16::<BE>(multiplier)?;
    }

    let mut offset = COMPACT_LINE_FIXED
        + OVERFLOW_ENTRY_LEN * overflows.len()
        + 4 * line.parts.len();
    for part in &line.parts {
        buf.write_u32::<BE>(offset as u32)?;
        offset += PART_HEADER_LEN + RUN_LEN * part.runs.len();
    }

    for part in &line.parts {
        let total = u32::try_from(part.total_points()).map_err(|_| {
            PgrdError::InvalidParameter(format!(
                "part at {} holds {} points",
                part.start_lon,
                part.total_points()
            ))
        })?;
        buf.write_f32::<BE>(part.start_lon)?;
        buf.write_u32::<BE>(total)?;

        for run in &part.runs {
            let id = u16::try_from(run.formation).map_err(|_| {
                PgrdError::InvalidParameter(format!(
                    "formation id {} exceeds 16 bits",
                    run.formation
                ))
            })?;
            buf.write_u16::<BE>(id)?;
            buf.write_u16::<BE>(split_count(run.count).1)?;
        }
    }

    debug_assert_eq!(buf.len(), len);
    Ok(buf)
}

/// Decodes the line starting at the beginning of `view`.
///
/// Run counts are rebuilt from the overflow table; each part's run count
/// follows from where the next part (or the line) starts.
pub fn decode_line(view: BeView<'_>) -> Result<CompactLine> {
    let len = view.u32_at(0)? as usize;
    let view = view
        .slice(0, len)
        .map_err(|_| PgrdError::InvalidFormat(format!("compact line length {len} past end of file")))?;
    let part_count = view.u32_at(4)? as usize;
    let overflow_count = view.u32_at(8)? as usize;

    let mut multipliers = HashMap::with_capacity(overflow_count);
    for i in 0..overflow_count {
        let at = COMPACT_LINE_FIXED + OVERFLOW_ENTRY_LEN * i;
        multipliers.insert(view.u32_at(at)?, view.u16_at(at + 4)? as u32);
    }

    let table = COMPACT_LINE_FIXED + OVERFLOW_ENTRY_LEN * overflow_count;
    let mut parts = Vec::with_capacity(part_count);
    let mut run_index = 0u32;

    for j in 0..part_count {
        let start = view.u32_at(table + 4 * j)? as usize;
        let end = if j + 1 < part_count {
            view.u32_at(table + 4 * (j + 1))? as usize
        } else {
            len
        };
        if end < start + PART_HEADER_LEN || (end - start - PART_HEADER_LEN) % RUN_LEN != 0 {
            return Err(PgrdError::InvalidFormat(format!(
                "part {j} spans [{start}, {end}), not a whole number of runs"
            )));
        }

        let start_lon = view.f32_at(start)?;
        let total = view.u32_at(start + 4)? as u64;
        let run_count = (end - start - PART_HEADER_LEN) / RUN_LEN;

        let mut runs = Vec::with_capacity(run_count);
        for r in 0..run_count {
            let at = start + PART_HEADER_LEN + RUN_LEN * r;
            let multiplier = multipliers.get(&run_index).copied().unwrap_or(0);
            runs.push(QuantizedRun {
                formation: view.u16_at(at)? as u32,
                count: join_count(multiplier, view.u16_at(at + 2)?),
            });
            run_index += 1;
        }

        let part = Part { start_lon, runs };
        if part.total_points() != total {
            return Err(PgrdError::InvalidFormat(format!(
                "part {j} records {total} points but its runs hold {}",
                part.total_points()
            )));
        }
        parts.push(part);
    }

    Ok(CompactLine { parts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compact::model::RUN_LIMIT;

    fn run(formation: u32, count: u32) -> QuantizedRun {
        QuantizedRun { formation, count }
    }

    #[test]
    fn line_layout_matches_the_length_formula() {
        let line = CompactLine {
            parts: vec![
                Part {
                    start_lon: -3.5,
                    runs: vec![run(1, 4), run(2, 40_000)],
                },
                Part {
                    start_lon: 7.25,
                    runs: vec![run(3, 2)],
                },
            ],
        };
        let bytes = encode_line(&line).unwrap();
        let view = BeView::new(&bytes);

        assert_eq!(bytes.len(), 12 + 12 * 2 + 4 * 3 + 6);
        assert_eq!(view.u32_at(0).unwrap() as usize, bytes.len());
        assert_eq!(view.u32_at(4).unwrap(), 2);
        assert_eq!(view.u32_at(8).unwrap(), 1);
        // Overflow entry: run 1, multiplier 1.
        assert_eq!(view.u32_at(12).unwrap(), 1);
        assert_eq!(view.u16_at(16).unwrap(), 1);
        // Part offsets follow the overflow table.
        assert_eq!(view.u32_at(18).unwrap(), 26);
        assert_eq!(view.u32_at(22).unwrap(), 26 + 8 + 8);
        assert_eq!(view.f32_at(26).unwrap(), -3.5);
        assert_eq!(view.u32_at(30).unwrap(), 40_004);
        assert_eq!(view.u16_at(38).unwrap(), 2);
        assert_eq!(view.u16_at(40).unwrap() as u32, 40_000 % RUN_LIMIT);

        assert_eq!(decode_line(view).unwrap(), line);
    }

    #[test]
    fn wide_formation_ids_fail_the_line() {
        let line = CompactLine {
            parts: vec![Part {
                start_lon: 0.0,
                runs: vec![run(70_000, 1)],
            }],
        };
        assert!(matches!(
            encode_line(&line),
            Err(PgrdError::InvalidParameter(_))
        ));
    }

    #[test]
    fn header_round_trips() {
        let header = CompactHeader {
            extent: Extent {
                min_lat: -45.0,
                min_lon: 100.0,
                max_lat: -40.0,
                max_lon: 110.0,
            },
            latitude_interval: 0.5,
            longitude_interval: 0.25,
            line_count: 10,
            segment_kind: 2,
        };
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len(), 56 + 40);
        assert_eq!(CompactHeader::decode(BeView::new(&bytes)).unwrap(), header);
        assert!(CompactHeader::decode(BeView::new(&bytes[..80])).is_err());
    }

    #[test]
    fn inconsistent_part_totals_are_rejected() {
        let line = CompactLine {
            parts: vec![Part {
                start_lon: 0.0,
                runs: vec![run(1, 3)],
            }],
        };
        let mut bytes = encode_line(&line).unwrap();
        // Total point count of the only part lives at 12 + 4 + 4.
        bytes[23] = 9;
        assert!(matches!(
            decode_line(BeView::new(&bytes)),
            Err(PgrdError::InvalidFormat(_))
        ));
    }
}
