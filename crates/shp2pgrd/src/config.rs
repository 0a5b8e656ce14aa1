use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use pgrd::FormationIdWidth;

/// `shp2pgrd` - turn a polygon shapefile into latitude-line coverage grids.
///
/// `convert` samples the shapefile into a full-precision `.pgrd` grid,
/// `compress` snaps such a grid onto a longitude step, and `run` does both.
#[derive(Parser, Debug)]
#[command(name = "shp2pgrd", version, about, long_about = None)]
pub struct Cli {
    /// Print the build summary as JSON on stdout.
    #[arg(long, global = true)]
    pub summary_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a full-precision grid from a shapefile.
    Convert(ConvertArgs),
    /// Compress a full-precision grid into a compact grid.
    Compress(CompressArgs),
    /// Convert and compress in one go.
    Run(RunArgs),
    /// Dump a grid header and per-line counts as JSON.
    Inspect(InspectArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AuditArgs {
    /// File that receives one line per skipped ring, record, formation or segment.
    #[arg(long, env = "PGRD_ERROR_LOG", default_value = "error_log.txt")]
    pub error_log: PathBuf,

    /// Log progress every N lines.
    #[arg(long, default_value_t = 50)]
    pub progress_every: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ConvertArgs {
    /// Shapefile path; the `.shp` extension may be omitted.
    pub shapefile: PathBuf,

    /// Output grid path.
    pub output: PathBuf,

    /// Spacing between latitude lines, in degrees.
    #[arg(long, env = "PGRD_LATITUDE_INTERVAL")]
    pub latitude_interval: f64,

    /// Width of formation ids on disk.
    #[arg(long, value_enum, default_value_t = IdWidth::Short)]
    pub id_width: IdWidth,

    #[command(flatten)]
    pub audit: AuditArgs,
}

#[derive(Args, Debug, Clone)]
pub struct CompressArgs {
    /// Full-precision grid to read.
    pub input: PathBuf,

    /// Output compact grid path.
    pub output: PathBuf,

    /// Longitude step of the compact grid, in degrees.
    #[arg(long, env = "PGRD_LONGITUDE_INTERVAL")]
    pub longitude_interval: f64,

    #[command(flatten)]
    pub audit: AuditArgs,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Shapefile path; the `.shp` extension may be omitted.
    pub shapefile: PathBuf,

    /// Output name; writes `NAME.pgrd` and `NAME.min.pgrd`.
    pub name: PathBuf,

    #[arg(long, env = "PGRD_LATITUDE_INTERVAL")]
    pub latitude_interval: f64,

    #[arg(long, env = "PGRD_LONGITUDE_INTERVAL")]
    pub longitude_interval: f64,

    #[arg(long, value_enum, default_value_t = IdWidth::Short)]
    pub id_width: IdWidth,

    /// Keep `NAME.pgrd` after compression.
    #[arg(long)]
    pub keep_intermediate: bool,

    #[command(flatten)]
    pub audit: AuditArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    pub file: PathBuf,

    /// Read the file as a compact grid.
    #[arg(long)]
    pub compact: bool,

    /// Only print the header.
    #[arg(long)]
    pub header_only: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdWidth {
    /// 16-bit ids.
    Short,
    /// 32-bit ids.
    Int,
}

impl From<IdWidth> for FormationIdWidth {
    fn from(width: IdWidth) -> Self {
        match width {
            IdWidth::Short => FormationIdWidth::Short,
            IdWidth::Int => FormationIdWidth::Int,
        }
    }
}

/// `name` with `suffix` appended verbatim, so dots already in the name survive.
pub fn with_suffix(name: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(name.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}
