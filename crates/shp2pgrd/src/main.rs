mod config;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use serde::Serialize;

use pgrd::compact::CompactHeader;
use pgrd::grid::GridHeader;
use pgrd::{
    build_grid_file, compress_grid_file, AuditLog, CompactGrid, CompressOptions, CompressSummary,
    GridBuildOptions, GridBuildSummary, GridFile, LogProgress, ShapeFile,
};

use config::{with_suffix, AuditArgs, Cli, Command, CompressArgs, ConvertArgs, InspectArgs, RunArgs};

#[derive(Serialize)]
struct RunSummary {
    grid: GridBuildSummary,
    compact: CompressSummary,
    audit_entries: usize,
}

#[derive(Serialize)]
struct GridReport<'a> {
    header: &'a GridHeader,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    lines: Vec<GridLineReport>,
}

#[derive(Serialize)]
struct GridLineReport {
    line: usize,
    latitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    formations: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    segments: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct CompactReport<'a> {
    header: &'a CompactHeader,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    lines: Vec<CompactLineReport>,
}

#[derive(Serialize, Default)]
struct CompactLineReport {
    line: usize,
    latitude: f64,
    parts: usize,
    runs: usize,
    overflows: usize,
    points: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn open_audit(args: &AuditArgs) -> Result<AuditLog> {
    AuditLog::open(&args.error_log)
        .with_context(|| format!("opening error log {}", args.error_log.display()))
}

fn convert(
    shapefile: &Path,
    output: &Path,
    options: &GridBuildOptions,
    audit: &mut AuditLog,
    progress_every: usize,
) -> Result<GridBuildSummary> {
    let shapes = ShapeFile::open(shapefile)
        .with_context(|| format!("opening shapefile {}", shapefile.display()))?;
    info!(
        "Converting {} -> {} (latitude interval {})",
        shapefile.display(),
        output.display(),
        options.latitude_interval
    );

    let mut progress = LogProgress::new("convert", progress_every);
    let summary = build_grid_file(&shapes, output, options, audit, &mut progress)
        .with_context(|| format!("building grid {}", output.display()))?;

    info!(
        "Wrote {} lines, {} formations, {} segments ({} bytes)",
        summary.line_count, summary.formations_written, summary.segments_written, summary.bytes_written
    );
    if summary.lines_failed > 0 {
        warn!("{} lines could not be written", summary.lines_failed);
    }
    Ok(summary)
}

fn compress(
    input: &Path,
    output: &Path,
    options: &CompressOptions,
    audit: &mut AuditLog,
    progress_every: usize,
) -> Result<CompressSummary> {
    let grid = GridFile::open(input).with_context(|| format!("opening grid {}", input.display()))?;
    info!(
        "Compressing {} -> {} (longitude interval {})",
        input.display(),
        output.display(),
        options.longitude_interval
    );

    let mut progress = LogProgress::new("compress", progress_every);
    let summary = compress_grid_file(&grid, output, options, audit, &mut progress)
        .with_context(|| format!("compressing into {}", output.display()))?;

    info!(
        "Wrote {} lines, {} parts, {} runs, {} overflows ({} bytes)",
        summary.line_count, summary.parts, summary.runs, summary.overflows, summary.bytes_written
    );
    if summary.unreadable_lines > 0 {
        warn!("{} source lines were unreadable", summary.unreadable_lines);
    }
    Ok(summary)
}

fn report_skipped(audit: &AuditLog) {
    if audit.entries() > 0 {
        if let Some(path) = audit.path() {
            warn!("{} units skipped, see {}", audit.entries(), path.display());
        }
    }
}

fn run_convert(args: &ConvertArgs) -> Result<GridBuildSummary> {
    let options =
        GridBuildOptions::new(args.latitude_interval)?.with_id_width(args.id_width.into());
    let mut audit = open_audit(&args.audit)?;
    let summary = convert(
        &args.shapefile,
        &args.output,
        &options,
        &mut audit,
        args.audit.progress_every,
    )?;
    report_skipped(&audit);
    Ok(summary)
}

fn run_compress(args: &CompressArgs) -> Result<CompressSummary> {
    let options = CompressOptions::new(args.longitude_interval)?;
    let mut audit = open_audit(&args.audit)?;
    let summary = compress(
        &args.input,
        &args.output,
        &options,
        &mut audit,
        args.audit.progress_every,
    )?;
    report_skipped(&audit);
    Ok(summary)
}

fn run_pipeline(args: &RunArgs) -> Result<RunSummary> {
    // Validate both intervals before any file is touched.
    let grid_options =
        GridBuildOptions::new(args.latitude_interval)?.with_id_width(args.id_width.into());
    let compress_options = CompressOptions::new(args.longitude_interval)?;

    let grid_path = with_suffix(&args.name, ".pgrd");
    let compact_path = with_suffix(&args.name, ".min.pgrd");
    let mut audit = open_audit(&args.audit)?;

    let grid = convert(
        &args.shapefile,
        &grid_path,
        &grid_options,
        &mut audit,
        args.audit.progress_every,
    )?;
    let compact = compress(
        &grid_path,
        &compact_path,
        &compress_options,
        &mut audit,
        args.audit.progress_every,
    )?;

    if !args.keep_intermediate {
        if let Err(e) = fs::remove_file(&grid_path) {
            warn!("could not remove {}: {e}", grid_path.display());
        }
    }
    report_skipped(&audit);

    Ok(RunSummary {
        grid,
        compact,
        audit_entries: audit.entries(),
    })
}

fn inspect_grid(path: &Path, header_only: bool) -> Result<String> {
    let grid = GridFile::open(path).with_context(|| format!("opening grid {}", path.display()))?;
    let header = grid.header();

    let mut lines = Vec::new();
    if !header_only {
        for line in 0..grid.line_count() {
            let latitude = header.line_latitude(line);
            let counts = grid.formation_count(line).and_then(|formations| {
                let mut segments = 0;
                for f in 0..formations {
                    segments += grid.segment_count(line, f)?;
                }
                Ok((formations, segments))
            });
            lines.push(match counts {
                Ok((formations, segments)) => GridLineReport {
                    line,
                    latitude,
                    formations: Some(formations),
                    segments: Some(segments),
                    error: None,
                },
                Err(e) => GridLineReport {
                    line,
                    latitude,
                    formations: None,
                    segments: None,
                    error: Some(e.to_string()),
                },
            });
        }
    }

    Ok(serde_json::to_string_pretty(&GridReport { header, lines })?)
}

fn inspect_compact(path: &Path, header_only: bool) -> Result<String> {
    let grid =
        CompactGrid::open(path).with_context(|| format!("opening compact grid {}", path.display()))?;
    let header = grid.header();

    let mut lines = Vec::new();
    if !header_only {
        for line in 0..grid.line_count() {
            let latitude = header.line_latitude(line);
            lines.push(match grid.line(line) {
                Ok(compact) => CompactLineReport {
                    line,
                    latitude,
                    parts: compact.parts.len(),
                    runs: compact.run_count(),
                    overflows: compact.overflows().len(),
                    points: compact.parts.iter().map(|p| p.total_points()).sum(),
                    error: None,
                },
                Err(e) => CompactLineReport {
                    line,
                    latitude,
                    error: Some(e.to_string()),
                    ..Default::default()
                },
            });
        }
    }

    Ok(serde_json::to_string_pretty(&CompactReport { header, lines })?)
}

fn run_inspect(args: &InspectArgs) -> Result<()> {
    let json = if args.compact {
        inspect_compact(&args.file, args.header_only)?
    } else {
        inspect_grid(&args.file, args.header_only)?
    };
    println!("{json}");
    Ok(())
}

fn print_summary<T: Serialize>(enabled: bool, summary: &T) -> Result<()> {
    if enabled {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Convert(args) => print_summary(cli.summary_json, &run_convert(args)?),
        Command::Compress(args) => print_summary(cli.summary_json, &run_compress(args)?),
        Command::Run(args) => print_summary(cli.summary_json, &run_pipeline(args)?),
        Command::Inspect(args) => run_inspect(args),
    }
}
