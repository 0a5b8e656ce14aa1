//! Append-only audit trail of skipped units.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{error, warn};

use crate::error::Result;

/// Receives one free-text entry per skipped record, formation, segment or
/// failed write.
pub trait AuditSink {
    fn record(&mut self, entry: &str);
}

impl AuditSink for Vec<String> {
    fn record(&mut self, entry: &str) {
        self.push(entry.to_owned());
    }
}

/// Text-file audit log: one entry per line, flushed after every entry.
///
/// Entries are mirrored to `log::warn!`. Failing to write the log itself is
/// reported through `log::error!` and never aborts a build.
#[derive(Debug)]
pub struct AuditLog {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
    entries: usize,
}

impl AuditLog {
    /// Opens (or creates) `path` for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path: Some(path.to_path_buf()),
            entries: 0,
        })
    }

    /// An audit log that only mirrors entries to the logger.
    pub fn disabled() -> Self {
        Self {
            writer: None,
            path: None,
            entries: 0,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of entries recorded since opening.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl AuditSink for AuditLog {
    fn record(&mut self, entry: &str) {
        self.entries += 1;
        warn!("{entry}");

        if let Some(writer) = self.writer.as_mut() {
            let written = writeln!(writer, "{entry}").and_then(|_| writer.flush());
            if let Err(err) = written {
                error!("could not append to audit log: {err}");
            }
        }
    }
}
