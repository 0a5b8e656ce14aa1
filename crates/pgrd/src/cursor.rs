//! Seek-and-write cursor owned by a single file builder.

use std::io::{self, Seek, SeekFrom, Write};

/// Append-only write cursor with back-patching.
///
/// `end` only ever grows; `patch` rewrites bytes that were already appended
/// (offset tables) and leaves the next `append` landing at `end`.
#[derive(Debug)]
pub struct FileCursor<W> {
    inner: W,
    end: u64,
    pos: u64,
}

impl<W: Write + Seek> FileCursor<W> {
    /// Starts a cursor at the beginning of `inner`, which must be empty.
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self {
            inner,
            end: 0,
            pos: 0,
        })
    }

    /// Byte offset the next `append` writes to.
    #[inline]
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Writes `bytes` at the end of the file and returns where they start.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let start = self.end;
        self.write_at(start, bytes)?;
        self.end = start + bytes.len() as u64;
        Ok(start)
    }

    /// Overwrites already-appended bytes at `offset`.
    pub fn patch(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        let stop = offset + bytes.len() as u64;
        if stop > self.end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("patch [{offset}, {stop}) past end of written data ({})", self.end),
            ));
        }
        self.write_at(offset, bytes)
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> io::Result<()> {
        if self.pos != offset {
            self.inner.seek(SeekFrom::Start(offset))?;
            self.pos = offset;
        }

        // A failed write leaves the OS position unknown; force a seek next time.
        if let Err(err) = self.inner.write_all(bytes) {
            self.pos = u64::MAX;
            return Err(err);
        }
        self.pos = offset + bytes.len() as u64;
        Ok(())
    }

    /// Flushes and hands back the underlying writer.
    pub fn into_inner(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
