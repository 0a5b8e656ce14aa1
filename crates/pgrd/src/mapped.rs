//! Read-only backing store for whole files.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;

use crate::error::Result;

enum Backing {
    #[cfg(feature = "mmap")]
    Mapped(memmap2::Mmap),
    Owned(Vec<u8>),
}

/// The full contents of a file, memory-mapped when the `mmap` feature is on.
pub struct MappedBytes {
    backing: Backing,
}

impl MappedBytes {
    /// Fast path: prefer mmap; empty files fall back to an empty buffer.
    #[cfg(feature = "mmap")]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::from_vec(Vec::new()));
        }

        // Safety: the build never writes to a file it is reading from.
        let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
        Ok(Self {
            backing: Backing::Mapped(map),
        })
    }

    #[cfg(not(feature = "mmap"))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        use std::io::Read;

        let mut file = File::open(path)?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Self::from_vec(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            backing: Backing::Owned(bytes),
        }
    }
}

impl Deref for MappedBytes {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match &self.backing {
            #[cfg(feature = "mmap")]
            Backing::Mapped(map) => &map[..],
            Backing::Owned(bytes) => &bytes[..],
        }
    }
}

impl std::fmt::Debug for MappedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.backing {
            #[cfg(feature = "mmap")]
            Backing::Mapped(_) => "mapped",
            Backing::Owned(_) => "owned",
        };
        f.debug_struct("MappedBytes")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_exposes_file_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PGRD").unwrap();
        file.flush().unwrap();

        let bytes = MappedBytes::open(file.path()).unwrap();
        assert_eq!(&bytes[..], b"PGRD");
    }

    #[test]
    fn empty_file_maps_to_empty_slice() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let bytes = MappedBytes::open(file.path()).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = MappedBytes::open(dir.path().join("absent.pgrd")).unwrap_err();
        assert!(matches!(err, crate::PgrdError::Io(_)));
    }
}
