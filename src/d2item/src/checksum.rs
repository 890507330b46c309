//! Save file checksum.
//!
//! Each byte is folded in as `sum = (sum << 1) + byte + carry`, where the carry is the
//! sign bit of the running sum before the shift. The field in a character file holding
//! the stored checksum must read as zero while summing (see [`checksum_excluding`]).

/// Running checksum accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_byte(&mut self, byte: u8) {
        let carry = self.sum >> 31;
        self.sum = (self.sum << 1)
            .wrapping_add(u32::from(byte))
            .wrapping_add(carry);
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.update_byte(byte);
        }
    }

    pub fn value(&self) -> u32 {
        self.sum
    }

    /// The sum as the signed value the game stores
    pub fn signed(&self) -> i32 {
        self.sum as i32
    }
}

pub fn checksum(bytes: &[u8]) -> u32 {
    let mut sum = Checksum::new();
    sum.update(bytes);
    sum.value()
}

/// Checksum of `bytes` with the four bytes at `field` read as zero.
///
/// A `field` past the end of `bytes` excludes nothing.
pub fn checksum_excluding(bytes: &[u8], field: usize) -> u32 {
    let mut sum = Checksum::new();
    for (index, &byte) in bytes.iter().enumerate() {
        let masked = (field..field.saturating_add(4)).contains(&index);
        sum.update_byte(if masked { 0 } else { byte });
    }
    sum.value()
}

/// Recompute and store the checksum in the little-endian field at `field`.
///
/// Returns the new checksum, or `None` when the field does not fit in `bytes`.
pub fn store_checksum(bytes: &mut [u8], field: usize) -> Option<u32> {
    let end = field.checked_add(4)?;
    if end > bytes.len() {
        return None;
    }
    let sum = checksum_excluding(bytes, field);
    bytes[field..end].copy_from_slice(&sum.to_le_bytes());
    tracing::debug!(field, checksum = sum, "stored checksum");
    Some(sum)
}
