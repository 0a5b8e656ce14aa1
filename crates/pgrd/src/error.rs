use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PgrdError>;

#[derive(Debug, Error)]
pub enum PgrdError {
    /// An index (record, part, point, line, formation, segment, byte offset)
    /// fell outside the valid range.
    #[error("{what} index {index} out of bounds (len {len})")]
    Bounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    /// The vector source could not produce a ring's points.
    #[error("failed to read geometry of record {record}{}: {detail}", .part.map(|p| format!(", part {p}")).unwrap_or_default())]
    GeometryRead {
        record: usize,
        part: Option<usize>,
        detail: String,
    },

    /// A required structural element of an output file could not be written.
    #[error("failed to write {stage}")]
    FileBuild {
        stage: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PgrdError {
    #[inline]
    pub(crate) fn bounds(what: &'static str, index: usize, len: usize) -> Self {
        PgrdError::Bounds { what, index, len }
    }

    #[inline]
    pub(crate) fn file_build(stage: impl Into<String>, source: io::Error) -> Self {
        PgrdError::FileBuild {
            stage: stage.into(),
            source,
        }
    }

    /// True for failures the build loops skip over (logged, unit dropped)
    /// rather than abort on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PgrdError::Bounds { .. } | PgrdError::GeometryRead { .. }
        )
    }
}
