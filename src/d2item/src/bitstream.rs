//! Bit-addressable storage for item records.
//!
//! Item records are packed LSB-first: bit 0 of the stream is the least
//! significant bit of byte 0, bit 8 is the least significant bit of byte 1,
//! and a multi-bit value is assembled with its first stream bit as the
//! value's least significant bit.
//!
//! Three types share the same addressing rules:
//! - [`BitStore`] owns a growable buffer with random-access get/set
//! - [`BitReader`] walks a borrowed slice with a cursor (used while parsing)
//! - [`BitWriter`] appends to a [`BitStore`] with a cursor (used while encoding)

use thiserror::Error;

/// Widest value a single access can transfer.
pub const MAX_BITS: usize = 64;

/// Widest value the narrow (`u32`) API can transfer.
pub const MAX_NARROW_BITS: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BitError {
    #[error("Cannot transfer {count} bits in a single access (max {max})")]
    TooWide { count: usize, max: usize },

    #[error("Read past end of buffer: bit {offset} + {count} exceeds {capacity} bits")]
    OutOfBounds {
        offset: usize,
        count: usize,
        capacity: usize,
    },
}

/// Number of bytes needed to hold `bits` bits.
#[inline]
pub fn bytes_for_bits(bits: usize) -> usize {
    bits.div_ceil(8)
}

/// Read `count` bits starting at bit `offset` of `bytes`.
pub(crate) fn read_bits(bytes: &[u8], offset: usize, count: usize) -> Result<u64, BitError> {
    if count > MAX_BITS {
        return Err(BitError::TooWide {
            count,
            max: MAX_BITS,
        });
    }
    let capacity = bytes.len() * 8;
    if offset + count > capacity {
        return Err(BitError::OutOfBounds {
            offset,
            count,
            capacity,
        });
    }

    let mut result = 0u64;
    let mut done = 0;
    while done < count {
        let pos = offset + done;
        let bit = pos % 8;
        let take = (8 - bit).min(count - done);
        let chunk = (u64::from(bytes[pos / 8]) >> bit) & ((1u64 << take) - 1);
        result |= chunk << done;
        done += take;
    }
    Ok(result)
}

/// Write the low `count` bits of `value` at bit `offset`. The slice must be
/// large enough; callers grow it first.
fn write_bits_unchecked(bytes: &mut [u8], offset: usize, count: usize, value: u64) {
    let mut done = 0;
    while done < count {
        let pos = offset + done;
        let bit = pos % 8;
        let take = (8 - bit).min(count - done);
        let mask = ((1u16 << take) - 1) as u8;
        let chunk = ((value >> done) as u8) & mask;
        let byte = &mut bytes[pos / 8];
        *byte = (*byte & !(mask << bit)) | (chunk << bit);
        done += take;
    }
}

/// Growable byte buffer addressed in bits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BitStore {
    bytes: Vec<u8>,
}

impl BitStore {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Zero-filled store large enough for `bits` bits.
    pub fn with_bit_len(bits: usize) -> Self {
        Self {
            bytes: vec![0; bytes_for_bits(bits)],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Capacity in bits (always a multiple of 8).
    pub fn bit_capacity(&self) -> usize {
        self.bytes.len() * 8
    }

    /// Read up to 64 bits at `offset` without side effects.
    pub fn read(&self, offset: usize, count: usize) -> Result<u64, BitError> {
        read_bits(&self.bytes, offset, count)
    }

    /// Narrow read of up to 32 bits.
    pub fn read_u32(&self, offset: usize, count: usize) -> Result<u32, BitError> {
        if count > MAX_NARROW_BITS {
            return Err(BitError::TooWide {
                count,
                max: MAX_NARROW_BITS,
            });
        }
        self.read(offset, count).map(|v| v as u32)
    }

    /// Read and advance the caller's cursor by `count`.
    pub fn read_advance(&self, cursor: &mut usize, count: usize) -> Result<u64, BitError> {
        let value = self.read(*cursor, count)?;
        *cursor += count;
        Ok(value)
    }

    /// Write up to 64 bits at `offset`, growing the buffer with zero bytes
    /// when `offset + count` exceeds the current capacity. Fails without
    /// touching the buffer when `count` is too wide.
    pub fn write(&mut self, offset: usize, count: usize, value: u64) -> Result<(), BitError> {
        if count > MAX_BITS {
            return Err(BitError::TooWide {
                count,
                max: MAX_BITS,
            });
        }
        let needed = bytes_for_bits(offset + count);
        if needed > self.bytes.len() {
            self.bytes.resize(needed, 0);
        }
        write_bits_unchecked(&mut self.bytes, offset, count, value);
        Ok(())
    }

    /// Narrow write of up to 32 bits.
    pub fn write_u32(&mut self, offset: usize, count: usize, value: u32) -> Result<(), BitError> {
        if count > MAX_NARROW_BITS {
            return Err(BitError::TooWide {
                count,
                max: MAX_NARROW_BITS,
            });
        }
        self.write(offset, count, u64::from(value))
    }

    /// Write and advance the caller's cursor by `count`.
    pub fn write_advance(
        &mut self,
        cursor: &mut usize,
        count: usize,
        value: u64,
    ) -> Result<(), BitError> {
        self.write(*cursor, count, value)?;
        *cursor += count;
        Ok(())
    }

    pub fn read_bit(&self, offset: usize) -> Result<bool, BitError> {
        self.read(offset, 1).map(|b| b != 0)
    }

    pub fn write_bit(&mut self, offset: usize, value: bool) -> Result<(), BitError> {
        self.write(offset, 1, u64::from(value))
    }

    /// Resize to exactly hold `bits` bits (rounded up to a byte). New bytes are zero.
    pub fn resize_bits(&mut self, bits: usize) {
        self.bytes.resize(bytes_for_bits(bits), 0);
    }

    /// Zero every bit from `offset` to the end of its byte, and drop any
    /// bytes after that one.
    pub fn zero_tail(&mut self, offset: usize) {
        let keep = bytes_for_bits(offset);
        self.bytes.truncate(keep);
        let bit = offset % 8;
        if bit != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= (1u8 << bit) - 1;
            }
        }
    }

    /// Copy `count` bits from `src` starting at `src_offset` into `self` at
    /// `dst_offset`, growing `self` as required.
    pub fn copy_from(
        &mut self,
        dst_offset: usize,
        src: &BitStore,
        src_offset: usize,
        count: usize,
    ) -> Result<(), BitError> {
        let mut done = 0;
        while done < count {
            let take = (count - done).min(MAX_BITS);
            let value = src.read(src_offset + done, take)?;
            self.write(dst_offset + done, take, value)?;
            done += take;
        }
        Ok(())
    }

    /// Extract `count` bits starting at `offset` into a new store.
    pub fn slice_bits(&self, offset: usize, count: usize) -> Result<BitStore, BitError> {
        let mut out = BitStore::with_bit_len(count);
        out.copy_from(0, self, offset, count)?;
        Ok(out)
    }
}

impl From<Vec<u8>> for BitStore {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl AsRef<[u8]> for BitStore {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Cursor over a borrowed byte slice.
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Start reading at bit `pos`.
    pub fn at(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    pub fn read(&mut self, count: usize) -> Result<u64, BitError> {
        let value = read_bits(self.bytes, self.pos, count)?;
        self.pos += count;
        Ok(value)
    }

    pub fn read_u32(&mut self, count: usize) -> Result<u32, BitError> {
        if count > MAX_NARROW_BITS {
            return Err(BitError::TooWide {
                count,
                max: MAX_NARROW_BITS,
            });
        }
        self.read(count).map(|v| v as u32)
    }

    pub fn read_bool(&mut self) -> Result<bool, BitError> {
        self.read(1).map(|v| v != 0)
    }

    pub fn peek(&self, count: usize) -> Result<u64, BitError> {
        read_bits(self.bytes, self.pos, count)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BitError> {
        let capacity = self.bytes.len() * 8;
        if self.pos + count > capacity {
            return Err(BitError::OutOfBounds {
                offset: self.pos,
                count,
                capacity,
            });
        }
        self.pos += count;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn remaining_bits(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.pos)
    }

    /// Advance to the next byte boundary.
    pub fn align(&mut self) {
        self.pos = bytes_for_bits(self.pos) * 8;
    }
}

/// Sequential writer building a [`BitStore`].
#[derive(Debug, Default)]
pub struct BitWriter {
    store: BitStore,
    pos: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, count: usize, value: u64) -> Result<(), BitError> {
        self.store.write_advance(&mut self.pos, count, value)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), BitError> {
        self.write(1, u64::from(value))
    }

    /// Append every bit of `other` up to `count`.
    pub fn append(&mut self, other: &BitStore, count: usize) -> Result<(), BitError> {
        self.store.copy_from(self.pos, other, 0, count)?;
        self.pos += count;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Finish at the current position: the store is sized to the cursor,
    /// rounded up to a byte.
    pub fn finish(mut self) -> (BitStore, usize) {
        self.store.resize_bits(self.pos);
        (self.store, self.pos)
    }
}
