//! Per-line compaction: part splitting, quantization, overflow bookkeeping.

use serde::Serialize;

use crate::error::{PgrdError, Result};

/// Largest point count a run record holds directly.
pub const RUN_LIMIT: u32 = 32_767;

/// One full-precision segment read back from a grid line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSegment {
    pub west: f32,
    pub east: f32,
    pub formation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuantizedRun {
    pub formation: u32,
    pub count: u32,
}

/// Runs sharing one anchor longitude, contiguous on the quantized grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Part {
    pub start_lon: f32,
    pub runs: Vec<QuantizedRun>,
}

impl Part {
    pub fn total_points(&self) -> u64 {
        self.runs.iter().map(|r| r.count as u64).sum()
    }
}

/// A run whose count needs the side table: `count = RUN_LIMIT * multiplier + stored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverflowEntry {
    pub run_index: u32,
    pub multiplier: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompactLine {
    pub parts: Vec<Part>,
}

impl CompactLine {
    pub fn run_count(&self) -> usize {
        self.parts.iter().map(|p| p.runs.len()).sum()
    }

    pub fn runs(&self) -> impl Iterator<Item = &QuantizedRun> + '_ {
        self.parts.iter().flat_map(|p| p.runs.iter())
    }

    /// Overflow table, run indices counted across the whole line.
    pub fn overflows(&self) -> Vec<OverflowEntry> {
        self.runs()
            .enumerate()
            .filter(|(_, run)| run.count >= RUN_LIMIT)
            .map(|(i, run)| OverflowEntry {
                run_index: i as u32,
                multiplier: run.count / RUN_LIMIT,
            })
            .collect()
    }

    /// `12 + 12 * parts + 4 * runs + 6 * overflows`.
    pub fn encoded_len(&self) -> usize {
        12 + 12 * self.parts.len() + 4 * self.run_count() + 6 * self.overflows().len()
    }
}

/// `(multiplier, stored)` with `count == RUN_LIMIT * multiplier + stored`.
#[inline]
pub fn split_count(count: u32) -> (u32, u16) {
    (count / RUN_LIMIT, (count % RUN_LIMIT) as u16)
}

#[inline]
pub fn join_count(multiplier: u32, stored: u16) -> u32 {
    RUN_LIMIT * multiplier + stored as u32
}

/// Builds the compact model of one line.
///
/// Segments are ordered by east bound; a new part starts wherever the gap to
/// the previous segment exceeds `step`. Within a part the running west bound
/// starts at the first segment's west bound and advances by whole steps.
pub fn compact_line(segments: &[RawSegment], step: f64) -> Result<CompactLine> {
    let mut sorted = segments.to_vec();
    sorted.sort_by(|a, b| a.east.total_cmp(&b.east));

    let mut parts = Vec::new();
    let mut start = 0;
    for i in 0..sorted.len() {
        let last = i + 1 == sorted.len();
        if last || sorted[i + 1].west as f64 - sorted[i].east as f64 > step {
            parts.push(quantize_part(&sorted[start..=i], step)?);
            start = i + 1;
        }
    }
    Ok(CompactLine { parts })
}

fn quantize_part(segments: &[RawSegment], step: f64) -> Result<Part> {
    let start_lon = segments.first().map_or(0.0, |s| s.west);
    let mut running = start_lon as f64;
    let mut runs = Vec::with_capacity(segments.len());

    for seg in segments {
        let count = snap_count(seg.east, running, step)?;
        running += count as f64 * step;
        runs.push(QuantizedRun {
            formation: seg.formation,
            count,
        });
    }
    Ok(Part { start_lon, runs })
}

/// Whole steps from `running` to `east`, clamped at zero.
///
/// `east` is a rounded `f32`: a grid point within half an ulp above it
/// counts as reached. The part anchor is the stored `f32` itself and is
/// exact.
fn snap_count(east: f32, running: f64, step: f64) -> Result<u32> {
    let slack = 0.5 * f32_ulp(east);
    let steps = ((east as f64 - running + slack) / step).floor();
    if steps <= 0.0 {
        return Ok(0);
    }
    if steps > u32::MAX as f64 {
        return Err(PgrdError::InvalidParameter(format!(
            "run of {steps} points at step {step} does not fit a part"
        )));
    }
    Ok(steps as u32)
}

/// Spacing of `f32` values at the magnitude of `x`.
fn f32_ulp(x: f32) -> f64 {
    let biased = ((x.to_bits() >> 23) & 0xff) as i32;
    // Subnormals share the smallest exponent.
    2f64.powi(biased.max(1) - 127 - 23)
}
