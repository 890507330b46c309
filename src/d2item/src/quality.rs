//! Item quality and the quality-dependent block that follows it.
//!
//! | Quality | Block |
//! |---|---|
//! | inferior | 3-bit kind |
//! | normal | empty |
//! | superior | 3-bit kind |
//! | magic | 11-bit prefix, 11-bit suffix |
//! | set, unique | 12-bit id |
//! | rare, crafted, tempered | two 8-bit name ids, then six optional 11-bit affixes |

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{ItemError, Result};
use crate::registry::Registry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of the quality field
pub const QUALITY_BITS: usize = 4;

const KIND_BITS: usize = 3;
const AFFIX_BITS: usize = 11;
const SET_UNIQUE_BITS: usize = 12;
const RARE_NAME_BITS: usize = 8;

/// Affix slots of a rare-like item, per side
pub const RARE_AFFIX_SLOTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Inferior = 1,
    Normal = 2,
    Superior = 3,
    Magic = 4,
    Set = 5,
    Rare = 6,
    Unique = 7,
    Crafted = 8,
    Tempered = 9,
}

impl Quality {
    pub fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            1 => Quality::Inferior,
            2 => Quality::Normal,
            3 => Quality::Superior,
            4 => Quality::Magic,
            5 => Quality::Set,
            6 => Quality::Rare,
            7 => Quality::Unique,
            8 => Quality::Crafted,
            9 => Quality::Tempered,
            other => return Err(ItemError::InvalidQuality(other)),
        })
    }

    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Rare, crafted and tempered share one block layout
    pub fn is_rare_like(self) -> bool {
        matches!(self, Quality::Rare | Quality::Crafted | Quality::Tempered)
    }

    /// Normal, inferior and superior items carry no affixes
    pub fn is_plain(self) -> bool {
        matches!(self, Quality::Inferior | Quality::Normal | Quality::Superior)
    }

    pub fn name(self) -> &'static str {
        match self {
            Quality::Inferior => "inferior",
            Quality::Normal => "normal",
            Quality::Superior => "superior",
            Quality::Magic => "magic",
            Quality::Set => "set",
            Quality::Rare => "rare",
            Quality::Unique => "unique",
            Quality::Crafted => "crafted",
            Quality::Tempered => "tempered",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        (1..=9)
            .filter_map(|raw| Quality::from_raw(raw).ok())
            .find(|q| q.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown quality '{}'", s))
    }
}

/// Inferior item kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InferiorKind {
    Crude,
    Cracked,
    Damaged,
    LowQuality,
}

impl InferiorKind {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(InferiorKind::Crude),
            1 => Some(InferiorKind::Cracked),
            2 => Some(InferiorKind::Damaged),
            3 => Some(InferiorKind::LowQuality),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InferiorKind::Crude => "Crude",
            InferiorKind::Cracked => "Cracked",
            InferiorKind::Damaged => "Damaged",
            InferiorKind::LowQuality => "Low Quality",
        }
    }
}

/// Name and affixes of a rare, crafted or tempered item
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RareAffixes {
    pub name1: u8,
    pub name2: u8,
    pub prefixes: [Option<u16>; RARE_AFFIX_SLOTS],
    pub suffixes: [Option<u16>; RARE_AFFIX_SLOTS],
}

impl RareAffixes {
    pub fn new(name1: u8, name2: u8) -> Self {
        Self {
            name1,
            name2,
            ..Self::default()
        }
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut affixes = RareAffixes {
            name1: reader.read(RARE_NAME_BITS)? as u8,
            name2: reader.read(RARE_NAME_BITS)? as u8,
            ..Self::default()
        };
        // Prefix and suffix slots alternate on the wire
        for i in 0..RARE_AFFIX_SLOTS {
            affixes.prefixes[i] = read_optional_affix(reader)?;
            affixes.suffixes[i] = read_optional_affix(reader)?;
        }
        Ok(affixes)
    }

    fn write(&self, writer: &mut BitWriter) -> Result<()> {
        writer.write(RARE_NAME_BITS, u64::from(self.name1))?;
        writer.write(RARE_NAME_BITS, u64::from(self.name2))?;
        for i in 0..RARE_AFFIX_SLOTS {
            write_optional_affix(writer, self.prefixes[i])?;
            write_optional_affix(writer, self.suffixes[i])?;
        }
        Ok(())
    }

    fn bit_len(&self) -> usize {
        let present = self
            .prefixes
            .iter()
            .chain(&self.suffixes)
            .filter(|a| a.is_some())
            .count();
        2 * RARE_NAME_BITS + 2 * RARE_AFFIX_SLOTS + present * AFFIX_BITS
    }

    /// "Beast Fang" style name
    pub fn name(&self, registry: &Registry) -> String {
        let first = registry.rare_prefix(u16::from(self.name1)).unwrap_or("?");
        let second = registry.rare_suffix(u16::from(self.name2)).unwrap_or("?");
        format!("{} {}", first, second)
    }
}

fn read_optional_affix(reader: &mut BitReader<'_>) -> Result<Option<u16>> {
    if reader.read_bool()? {
        Ok(Some(reader.read(AFFIX_BITS)? as u16))
    } else {
        Ok(None)
    }
}

fn write_optional_affix(writer: &mut BitWriter, affix: Option<u16>) -> Result<()> {
    writer.write_bool(affix.is_some())?;
    if let Some(id) = affix {
        write_checked(writer, AFFIX_BITS, u64::from(id), "rare affix")?;
    }
    Ok(())
}

fn write_checked(writer: &mut BitWriter, bits: usize, value: u64, field: &'static str) -> Result<()> {
    let max = (1u64 << bits) - 1;
    if value > max {
        return Err(ItemError::OutOfRange { field, value, max });
    }
    writer.write(bits, value)?;
    Ok(())
}

/// Quality-dependent block; the variant determines the item's quality
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBlock {
    Inferior(u8),
    Normal,
    Superior(u8),
    Magic { prefix: u16, suffix: u16 },
    Set(u16),
    Rare(RareAffixes),
    Unique(u16),
    Crafted(RareAffixes),
    Tempered(RareAffixes),
}

impl Default for QualityBlock {
    fn default() -> Self {
        QualityBlock::Normal
    }
}

impl QualityBlock {
    pub fn quality(&self) -> Quality {
        match self {
            QualityBlock::Inferior(_) => Quality::Inferior,
            QualityBlock::Normal => Quality::Normal,
            QualityBlock::Superior(_) => Quality::Superior,
            QualityBlock::Magic { .. } => Quality::Magic,
            QualityBlock::Set(_) => Quality::Set,
            QualityBlock::Rare(_) => Quality::Rare,
            QualityBlock::Unique(_) => Quality::Unique,
            QualityBlock::Crafted(_) => Quality::Crafted,
            QualityBlock::Tempered(_) => Quality::Tempered,
        }
    }

    /// Affixes of a rare-like block
    pub fn rare_affixes(&self) -> Option<&RareAffixes> {
        match self {
            QualityBlock::Rare(a) | QualityBlock::Crafted(a) | QualityBlock::Tempered(a) => Some(a),
            _ => None,
        }
    }

    /// Decode the block for `quality`
    pub fn read(reader: &mut BitReader<'_>, quality: Quality) -> Result<Self> {
        Ok(match quality {
            Quality::Inferior => QualityBlock::Inferior(reader.read(KIND_BITS)? as u8),
            Quality::Normal => QualityBlock::Normal,
            Quality::Superior => QualityBlock::Superior(reader.read(KIND_BITS)? as u8),
            Quality::Magic => QualityBlock::Magic {
                prefix: reader.read(AFFIX_BITS)? as u16,
                suffix: reader.read(AFFIX_BITS)? as u16,
            },
            Quality::Set => QualityBlock::Set(reader.read(SET_UNIQUE_BITS)? as u16),
            Quality::Unique => QualityBlock::Unique(reader.read(SET_UNIQUE_BITS)? as u16),
            Quality::Rare => QualityBlock::Rare(RareAffixes::read(reader)?),
            Quality::Crafted => QualityBlock::Crafted(RareAffixes::read(reader)?),
            Quality::Tempered => QualityBlock::Tempered(RareAffixes::read(reader)?),
        })
    }

    /// Encode the block (not the quality field itself)
    pub fn write(&self, writer: &mut BitWriter) -> Result<()> {
        match self {
            QualityBlock::Inferior(kind) | QualityBlock::Superior(kind) => {
                write_checked(writer, KIND_BITS, u64::from(*kind), "quality kind")
            }
            QualityBlock::Normal => Ok(()),
            QualityBlock::Magic { prefix, suffix } => {
                write_checked(writer, AFFIX_BITS, u64::from(*prefix), "magic prefix")?;
                write_checked(writer, AFFIX_BITS, u64::from(*suffix), "magic suffix")
            }
            QualityBlock::Set(id) => write_checked(writer, SET_UNIQUE_BITS, u64::from(*id), "set id"),
            QualityBlock::Unique(id) => {
                write_checked(writer, SET_UNIQUE_BITS, u64::from(*id), "unique id")
            }
            QualityBlock::Rare(a) | QualityBlock::Crafted(a) | QualityBlock::Tempered(a) => {
                a.write(writer)
            }
        }
    }

    pub fn bit_len(&self) -> usize {
        match self {
            QualityBlock::Inferior(_) | QualityBlock::Superior(_) => KIND_BITS,
            QualityBlock::Normal => 0,
            QualityBlock::Magic { .. } => 2 * AFFIX_BITS,
            QualityBlock::Set(_) | QualityBlock::Unique(_) => SET_UNIQUE_BITS,
            QualityBlock::Rare(a) | QualityBlock::Crafted(a) | QualityBlock::Tempered(a) => {
                a.bit_len()
            }
        }
    }
}
