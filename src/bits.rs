//! Bit buffers.
//!
//! OSNMA messages are packed bit fields that rarely fall on byte boundaries.
//! [`Bits`] is a read-only view used to extract fields, and [`BitBuilder`] is
//! used to compose new messages (MAC inputs, signed messages, padding
//! inputs) field by field. Buffers are never modified in place.

use crate::types::BitSlice;
use bitvec::prelude::*;

/// Read-only view over a packed bit buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Bits<'a> {
    bits: &'a BitSlice,
}

impl<'a> Bits<'a> {
    /// Creates a view covering all the bits of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Bits<'a> {
        Bits {
            bits: BitSlice::from_slice(bytes),
        }
    }

    /// Creates a view from an existing bit slice.
    pub fn from_bitslice(bits: &'a BitSlice) -> Bits<'a> {
        Bits { bits }
    }

    /// Length of the view in bits.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Returns `true` if the view has no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Reads `len` bits at `offset` as a big-endian unsigned integer.
    ///
    /// # Panics
    ///
    /// Panics if `len > 64` or the range is out of bounds.
    pub fn uint(&self, offset: usize, len: usize) -> u64 {
        assert!(len <= 64);
        if len == 0 {
            return 0;
        }
        self.bits[offset..offset + len].load_be::<u64>()
    }

    /// Copies `len` bits at `offset` into a byte vector.
    ///
    /// The bits are left-aligned; the unused bits of the last byte are zero.
    pub fn bytes(&self, offset: usize, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len.div_ceil(8)];
        BitSlice::from_slice_mut(&mut out)[..len]
            .copy_from_bitslice(&self.bits[offset..offset + len]);
        out
    }

    /// Returns a sub-view of `len` bits at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Bits<'a> {
        Bits {
            bits: &self.bits[offset..offset + len],
        }
    }

    /// Returns the underlying bit slice.
    pub fn as_bitslice(&self) -> &'a BitSlice {
        self.bits
    }
}

/// Builder of packed bit buffers.
///
/// # Examples
///
/// ```
/// use osnma_receiver::bits::BitBuilder;
///
/// let mut builder = BitBuilder::new();
/// builder.push_uint(0b101, 3).push_uint(0x1f, 5).push_bytes(&[0xaa]);
/// assert_eq!(builder.bit_len(), 16);
/// assert_eq!(builder.into_bytes(), vec![0xbf, 0xaa]);
/// ```
#[derive(Debug, Clone, Default, Eq, PartialEq, Hash)]
pub struct BitBuilder {
    bits: BitVec<u8, Msb0>,
}

impl BitBuilder {
    /// Creates an empty builder.
    pub fn new() -> BitBuilder {
        BitBuilder::default()
    }

    /// Appends the `len` least significant bits of `value`, MSB first.
    pub fn push_uint(&mut self, value: u64, len: usize) -> &mut Self {
        assert!(len <= 64);
        for j in (0..len).rev() {
            self.bits.push((value >> j) & 1 == 1);
        }
        self
    }

    /// Appends all the bits of `bits`.
    pub fn push_bits(&mut self, bits: &BitSlice) -> &mut Self {
        self.bits.extend_from_bitslice(bits);
        self
    }

    /// Appends all the bits of `bytes`.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.push_bits(BitSlice::from_slice(bytes))
    }

    /// Number of bits appended so far.
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Returns the bits appended so far.
    pub fn as_bitslice(&self) -> &BitSlice {
        &self.bits
    }

    /// Finishes the buffer, padding the last byte with zeros.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut bits = self.bits;
        bits.set_uninitialized(false);
        bits.into_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn fields() {
        let data = hex!("52 25 01 9d");
        let bits = Bits::new(&data);
        assert_eq!(bits.uint(0, 2), 1);
        assert_eq!(bits.uint(2, 2), 1);
        assert_eq!(bits.uint(4, 3), 1);
        assert_eq!(bits.uint(8, 4), 2);
        assert_eq!(bits.uint(12, 4), 5);
        assert_eq!(bits.bytes(4, 12), vec![0x22, 0x50]);
        assert_eq!(bits.slice(8, 8).uint(0, 8), 0x25);
    }

    #[test]
    fn builder_unaligned() {
        let mut builder = BitBuilder::new();
        builder.push_uint(1, 1).push_bytes(&[0xff]);
        assert_eq!(builder.bit_len(), 9);
        assert_eq!(builder.into_bytes(), vec![0xff, 0x80]);
    }
}
