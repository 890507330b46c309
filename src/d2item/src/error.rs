//! Error types for item decoding, encoding and editing.

use crate::bitstream::BitError;
use crate::tree::TreeError;
use thiserror::Error;

/// Errors raised by the item codec.
///
/// Variants fall into three groups:
/// - malformed input: the bytes do not describe a valid item record
/// - precondition violations: the requested edit is not allowed for this item
/// - rollbacks: a multi-step edit failed part-way and the item was restored
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    // Malformed input
    #[error("Bit access failed: {0}")]
    Bits(#[from] BitError),

    #[error("Bad item marker: expected {expected:02X?}, found {found:02X?}")]
    BadMarker { expected: [u8; 2], found: [u8; 2] },

    #[error("Item record truncated at bit {0}")]
    Truncated(usize),

    #[error("Invalid quality value {0}")]
    InvalidQuality(u8),

    #[error("Invalid location value {0}")]
    InvalidLocation(u8),

    #[error("Unknown item code '{0}'")]
    UnknownItemCode(String),

    #[error("Invalid item code encoding at bit {0}")]
    InvalidHuffmanCode(usize),

    #[error("Unknown stat id {0}")]
    UnknownStat(u16),

    #[error("Stat {id} metadata disagrees with its encoding: {detail}")]
    StatEncodingMismatch { id: u16, detail: String },

    #[error("Property list starting at bit {0} is not terminated before end of data")]
    UnterminatedPropertyList(usize),

    #[error("Invalid container marker: expected {expected:02X?}, found {found:02X?}")]
    BadListMarker { expected: [u8; 2], found: [u8; 2] },

    #[error("Name at bit {0} is not terminated within 15 characters")]
    UnterminatedName(usize),

    #[error("Item tree: {0}")]
    Tree(#[from] TreeError),

    // Precondition violations
    #[error("Operation not allowed: {0}")]
    Precondition(String),

    #[error("Item '{0}' cannot be placed in a socket")]
    NotSocketable(String),

    #[error("No free socket available")]
    NoFreeSocket,

    #[error("Cannot reduce sockets to {requested}: {occupied} sockets are filled")]
    SocketsOccupied { requested: u8, occupied: u8 },

    #[error("No runeword matches the socketed runes")]
    RunewordMismatch,

    #[error("{0} is not supported by item format {1}")]
    UnsupportedInVersion(String, &'static str),

    #[error("Value {value} out of range for {field} (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },

    // Mid-mutation failure
    #[error("Edit rolled back: {0}")]
    Rollback(Box<ItemError>),
}

impl ItemError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        ItemError::Precondition(msg.into())
    }

    /// True for errors caused by malformed input bytes.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            ItemError::Bits(_)
                | ItemError::BadMarker { .. }
                | ItemError::Truncated(_)
                | ItemError::InvalidQuality(_)
                | ItemError::InvalidLocation(_)
                | ItemError::UnknownItemCode(_)
                | ItemError::InvalidHuffmanCode(_)
                | ItemError::UnknownStat(_)
                | ItemError::StatEncodingMismatch { .. }
                | ItemError::UnterminatedPropertyList(_)
                | ItemError::BadListMarker { .. }
                | ItemError::UnterminatedName(_)
                | ItemError::Tree(_)
        )
    }
}

pub type Result<T, E = ItemError> = std::result::Result<T, E>;
