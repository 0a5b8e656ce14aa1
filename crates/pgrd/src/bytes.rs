//! Fixed-endianness typed reads at explicit byte offsets.
//!
//! Grid files are big-endian throughout; shapefile record contents are
//! little-endian (with big-endian file codes and index offsets). The byte
//! order is a type parameter, so a `BeView` can never be read as an `LeView`
//! by accident.

use std::marker::PhantomData;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{PgrdError, Result};

#[derive(Debug, Clone, Copy)]
pub struct ByteView<'a, O> {
    buf: &'a [u8],
    _order: PhantomData<O>,
}

pub type BeView<'a> = ByteView<'a, BigEndian>;
pub type LeView<'a> = ByteView<'a, LittleEndian>;

impl<'a, O: ByteOrder> ByteView<'a, O> {
    #[inline]
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            _order: PhantomData,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline(always)]
    fn take(&self, offset: usize, n: usize) -> Result<&'a [u8]> {
        match offset.checked_add(n) {
            Some(end) if end <= self.buf.len() => Ok(&self.buf[offset..end]),
            _ => Err(PgrdError::bounds("byte offset", offset, self.buf.len())),
        }
    }

    /// Sub-view of `len` bytes starting at `offset`, sharing the byte order.
    #[inline]
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        Ok(Self::new(self.take(offset, len)?))
    }

    #[inline]
    pub fn u16_at(&self, offset: usize) -> Result<u16> {
        Ok(O::read_u16(self.take(offset, 2)?))
    }

    #[inline]
    pub fn i32_at(&self, offset: usize) -> Result<i32> {
        Ok(O::read_i32(self.take(offset, 4)?))
    }

    #[inline]
    pub fn u32_at(&self, offset: usize) -> Result<u32> {
        Ok(O::read_u32(self.take(offset, 4)?))
    }

    #[inline]
    pub fn u64_at(&self, offset: usize) -> Result<u64> {
        Ok(O::read_u64(self.take(offset, 8)?))
    }

    #[inline]
    pub fn f32_at(&self, offset: usize) -> Result<f32> {
        Ok(O::read_f32(self.take(offset, 4)?))
    }

    #[inline]
    pub fn f64_at(&self, offset: usize) -> Result<f64> {
        Ok(O::read_f64(self.take(offset, 8)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_respect_byte_order() {
        let bytes = [0x00, 0x00, 0x27, 0x0A, 0xFF];
        assert_eq!(BeView::new(&bytes).i32_at(0).unwrap(), 9994);
        assert_eq!(LeView::new(&bytes).i32_at(0).unwrap(), 0x0A27_0000);
        assert_eq!(BeView::new(&bytes).u16_at(3).unwrap(), 0x0AFF);
    }

    #[test]
    fn floats_decode_at_offsets() {
        let mut bytes = vec![0u8; 3];
        bytes.extend_from_slice(&12.5f64.to_be_bytes());
        bytes.extend_from_slice(&(-0.25f32).to_be_bytes());

        let view = BeView::new(&bytes);
        assert_eq!(view.f64_at(3).unwrap(), 12.5);
        assert_eq!(view.f32_at(11).unwrap(), -0.25);
    }

    #[test]
    fn reading_past_the_end_is_a_bounds_error() {
        let bytes = [1u8, 2, 3];
        let view = LeView::new(&bytes);
        assert!(matches!(
            view.u32_at(0),
            Err(PgrdError::Bounds { index: 0, len: 3, .. })
        ));
        assert!(view.u16_at(usize::MAX).is_err());
    }

    #[test]
    fn slices_are_rebased() {
        let bytes = [9u8, 0, 0, 0, 5];
        let view = BeView::new(&bytes);
        let sub = view.slice(1, 4).unwrap();
        assert_eq!(sub.len(), 4);
        assert_eq!(sub.u32_at(0).unwrap(), 5);
        assert!(view.slice(2, 4).is_err());
    }
}
