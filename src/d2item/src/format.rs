//! Item format versions and the per-version field rules.
//!
//! Each historical revision of the item record differs in marker bytes, header
//! fields, item code encoding, and a handful of field widths. Those differences live
//! behind the [`ItemFormat`] trait; an item selects its implementation once, via
//! [`ItemVersion::format`], and holds it for its lifetime.

pub mod huffman;

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{ItemError, Result};
use crate::registry::{Registry, StatDef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bias added to the stored defense rating
pub const DEFENSE_BIAS: i32 = 10;

/// Flag bit that reads as 1 in every v1.07+ record.
///
/// It carries no known meaning and is preserved as a literal.
pub const ALWAYS_ONE_FLAG: u32 = 1 << 23;

/// Item format revisions, oldest first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ItemVersion {
    /// v1.00 - v1.03: numeric item codes
    V100,
    /// v1.04 - v1.06: 10-bit character codes
    V104,
    /// v1.07: first expansion-capable format
    V107,
    /// v1.08
    V108,
    /// v1.09
    V109,
    /// v1.10 - v1.14d
    V110,
    /// Resurrected v1.0 - v1.1
    V100R,
    /// Resurrected v1.2 - v1.3: 8-bit name characters, quest difficulty
    V120,
    /// Resurrected v1.4 - v2.3
    V140,
    /// Resurrected v2.4+
    #[default]
    V160,
}

impl ItemVersion {
    pub const ALL: [ItemVersion; 10] = [
        ItemVersion::V100,
        ItemVersion::V104,
        ItemVersion::V107,
        ItemVersion::V108,
        ItemVersion::V109,
        ItemVersion::V110,
        ItemVersion::V100R,
        ItemVersion::V120,
        ItemVersion::V140,
        ItemVersion::V160,
    ];

    /// Latest format
    pub const LATEST: ItemVersion = ItemVersion::V160;

    pub fn name(self) -> &'static str {
        match self {
            ItemVersion::V100 => "v100",
            ItemVersion::V104 => "v104",
            ItemVersion::V107 => "v107",
            ItemVersion::V108 => "v108",
            ItemVersion::V109 => "v109",
            ItemVersion::V110 => "v110",
            ItemVersion::V100R => "v100r",
            ItemVersion::V120 => "v120",
            ItemVersion::V140 => "v140",
            ItemVersion::V160 => "v160",
        }
    }

    /// Version number written in the enclosing save file header
    pub fn file_version(self) -> u32 {
        match self {
            ItemVersion::V100 | ItemVersion::V104 => 71,
            ItemVersion::V107 => 87,
            ItemVersion::V108 => 89,
            ItemVersion::V109 => 92,
            ItemVersion::V110 => 96,
            ItemVersion::V100R => 97,
            ItemVersion::V120 => 98,
            ItemVersion::V140 => 99,
            ItemVersion::V160 => 105,
        }
    }

    /// Map a save file version number to the item format it implies.
    ///
    /// 71 covers both pre-v1.07 formats; the later (character code) one is returned.
    pub fn from_file_version(value: u32) -> Option<Self> {
        Some(match value {
            71 => ItemVersion::V104,
            87 => ItemVersion::V107,
            89 => ItemVersion::V108,
            92 => ItemVersion::V109,
            96 => ItemVersion::V110,
            97 => ItemVersion::V100R,
            98 => ItemVersion::V120,
            99 => ItemVersion::V140,
            105 => ItemVersion::V160,
            _ => return None,
        })
    }

    pub fn is_resurrected(self) -> bool {
        self >= ItemVersion::V100R
    }

    pub fn supports_expansion(self) -> bool {
        self >= ItemVersion::V107
    }

    /// The field rules for this version
    pub fn format(self) -> &'static dyn ItemFormat {
        match self {
            ItemVersion::V100 => &LEGACY_V100,
            ItemVersion::V104 => &LEGACY_V104,
            ItemVersion::V107 => &JM_V107,
            ItemVersion::V108 => &JM_V108,
            ItemVersion::V109 => &JM_V109,
            ItemVersion::V110 => &JM_V110,
            ItemVersion::V100R => &RESURRECTED_V100R,
            ItemVersion::V120 => &RESURRECTED_V120,
            ItemVersion::V140 => &RESURRECTED_V140,
            ItemVersion::V160 => &RESURRECTED_V160,
        }
    }
}

impl fmt::Display for ItemVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ItemVersion {
    type Err = String;

    /// Accepts `v110`, `110`, `1.10` and `V110`; Resurrected v1.0 is `v100r`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .trim_start_matches(['v', 'V'])
            .chars()
            .filter(|c| *c != '.')
            .collect::<String>()
            .to_ascii_lowercase();

        ItemVersion::ALL
            .iter()
            .copied()
            .find(|v| v.name()[1..] == normalized)
            .ok_or_else(|| format!("unknown item version '{}'", s))
    }
}

/// Classic (Diablo II) or expansion (Lord of Destruction) character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    #[default]
    Expansion,
}

impl GameMode {
    pub fn is_expansion(self) -> bool {
        self == GameMode::Expansion
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GameMode::Classic => "classic",
            GameMode::Expansion => "expansion",
        })
    }
}

impl FromStr for GameMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "classic" | "d2" => Ok(GameMode::Classic),
            "expansion" | "lod" | "xpac" => Ok(GameMode::Expansion),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// Field rules of one format revision.
///
/// Widths are in bits. Presence decisions that depend on the item type or quality are
/// made by the layout walker; this trait answers only what depends on the version.
pub trait ItemFormat: fmt::Debug + Send + Sync {
    fn version(&self) -> ItemVersion;

    /// Records start with the two-byte "JM" marker
    fn has_marker(&self) -> bool;

    /// Width of the header version field (0 when absent)
    fn header_version_bits(&self) -> usize;

    /// Header version value written for a fresh item
    fn header_version_value(&self, mode: GameMode) -> u16;

    /// Game mode implied by a stored header version, if it encodes one
    fn game_mode_from_header(&self, _raw: u16) -> Option<GameMode> {
        None
    }

    /// Bits per character in ear and personalized names
    fn char_bits(&self) -> usize;

    fn socket_fill_bits(&self, compact: bool) -> usize;

    fn has_quest_difficulty(&self) -> bool;

    fn has_realm_data(&self) -> bool;

    fn defense_bits(&self) -> usize;

    fn current_durability_bits(&self) -> usize;

    fn supports_expansion(&self) -> bool {
        self.version().supports_expansion()
    }

    /// Flag bits every fresh record carries
    fn default_flags(&self) -> u32;

    /// Save width and bias of a stat under this format
    fn stat_encoding(&self, stat: &StatDef) -> (usize, i64) {
        (usize::from(stat.bits), i64::from(stat.add))
    }

    /// Time-based stats are stored as three fields rather than one 22-bit value
    fn splits_time_based(&self) -> bool {
        false
    }

    fn read_code(&self, reader: &mut BitReader<'_>, registry: &Registry) -> Result<String>;

    fn write_code(&self, writer: &mut BitWriter, code: &str, registry: &Registry) -> Result<()>;

    /// Width of the encoded item code
    fn code_bits(&self, code: &str, registry: &Registry) -> Result<usize>;
}

// ============================================================================
// v1.00 - v1.06
// ============================================================================

/// Pre-expansion records: "JM" marker, no header version, no realm data
#[derive(Debug)]
pub struct LegacyFormat {
    version: ItemVersion,
}

static LEGACY_V100: LegacyFormat = LegacyFormat {
    version: ItemVersion::V100,
};
static LEGACY_V104: LegacyFormat = LegacyFormat {
    version: ItemVersion::V104,
};

const LEGACY_CHAR_BITS: usize = 10;
const LEGACY_CODE_CHARS: usize = 3;
const NUMERIC_CODE_BITS: usize = 10;

impl ItemFormat for LegacyFormat {
    fn version(&self) -> ItemVersion {
        self.version
    }

    fn has_marker(&self) -> bool {
        true
    }

    fn header_version_bits(&self) -> usize {
        0
    }

    fn header_version_value(&self, _mode: GameMode) -> u16 {
        0
    }

    fn char_bits(&self) -> usize {
        7
    }

    fn socket_fill_bits(&self, _compact: bool) -> usize {
        3
    }

    fn has_quest_difficulty(&self) -> bool {
        false
    }

    fn has_realm_data(&self) -> bool {
        false
    }

    fn defense_bits(&self) -> usize {
        10
    }

    fn current_durability_bits(&self) -> usize {
        8
    }

    fn default_flags(&self) -> u32 {
        0
    }

    fn stat_encoding(&self, stat: &StatDef) -> (usize, i64) {
        legacy_stat_encoding(stat)
    }

    fn read_code(&self, reader: &mut BitReader<'_>, registry: &Registry) -> Result<String> {
        if self.version == ItemVersion::V100 {
            let id = reader.read(NUMERIC_CODE_BITS)? as u16;
            return registry
                .item_type_by_id(id)
                .map(|t| t.code.clone())
                .ok_or_else(|| ItemError::UnknownItemCode(format!("#{}", id)));
        }

        let mut code = String::with_capacity(LEGACY_CODE_CHARS);
        for _ in 0..LEGACY_CODE_CHARS {
            let c = reader.read(LEGACY_CHAR_BITS)? as u8;
            code.push(char::from(c));
        }
        Ok(code.trim_end().to_string())
    }

    fn write_code(&self, writer: &mut BitWriter, code: &str, registry: &Registry) -> Result<()> {
        if self.version == ItemVersion::V100 {
            let item_type = registry
                .item_type(code)
                .ok_or_else(|| ItemError::UnknownItemCode(code.to_string()))?;
            writer.write(NUMERIC_CODE_BITS, u64::from(item_type.id))?;
            return Ok(());
        }

        for c in padded_code(code, LEGACY_CODE_CHARS)? {
            writer.write(LEGACY_CHAR_BITS, u64::from(c))?;
        }
        Ok(())
    }

    fn code_bits(&self, _code: &str, _registry: &Registry) -> Result<usize> {
        Ok(if self.version == ItemVersion::V100 {
            NUMERIC_CODE_BITS
        } else {
            LEGACY_CHAR_BITS * LEGACY_CODE_CHARS
        })
    }
}

// ============================================================================
// v1.07 - v1.14
// ============================================================================

/// "JM" records with a 10-bit header version and 32-bit character codes
#[derive(Debug)]
pub struct JmFormat {
    version: ItemVersion,
}

static JM_V107: JmFormat = JmFormat {
    version: ItemVersion::V107,
};
static JM_V108: JmFormat = JmFormat {
    version: ItemVersion::V108,
};
static JM_V109: JmFormat = JmFormat {
    version: ItemVersion::V109,
};
static JM_V110: JmFormat = JmFormat {
    version: ItemVersion::V110,
};

const JM_CODE_CHARS: usize = 4;

impl ItemFormat for JmFormat {
    fn version(&self) -> ItemVersion {
        self.version
    }

    fn has_marker(&self) -> bool {
        true
    }

    fn header_version_bits(&self) -> usize {
        10
    }

    fn header_version_value(&self, mode: GameMode) -> u16 {
        match (self.version, mode) {
            (ItemVersion::V107, _) => 0,
            (ItemVersion::V108 | ItemVersion::V109, GameMode::Classic) => 1,
            (ItemVersion::V108 | ItemVersion::V109, GameMode::Expansion) => 100,
            (_, GameMode::Classic) => 2,
            (_, GameMode::Expansion) => 101,
        }
    }

    fn game_mode_from_header(&self, raw: u16) -> Option<GameMode> {
        match raw {
            1 | 2 => Some(GameMode::Classic),
            100 | 101 => Some(GameMode::Expansion),
            _ => None,
        }
    }

    fn char_bits(&self) -> usize {
        7
    }

    fn socket_fill_bits(&self, _compact: bool) -> usize {
        3
    }

    fn has_quest_difficulty(&self) -> bool {
        false
    }

    fn has_realm_data(&self) -> bool {
        true
    }

    fn defense_bits(&self) -> usize {
        if self.version >= ItemVersion::V110 {
            11
        } else {
            10
        }
    }

    fn current_durability_bits(&self) -> usize {
        if self.version >= ItemVersion::V110 {
            9
        } else {
            8
        }
    }

    fn default_flags(&self) -> u32 {
        ALWAYS_ONE_FLAG
    }

    fn stat_encoding(&self, stat: &StatDef) -> (usize, i64) {
        if self.version >= ItemVersion::V110 {
            (usize::from(stat.bits), i64::from(stat.add))
        } else {
            legacy_stat_encoding(stat)
        }
    }

    fn read_code(&self, reader: &mut BitReader<'_>, _registry: &Registry) -> Result<String> {
        let mut code = String::with_capacity(JM_CODE_CHARS);
        for _ in 0..JM_CODE_CHARS {
            code.push(char::from(reader.read(8)? as u8));
        }
        Ok(code.trim_end().to_string())
    }

    fn write_code(&self, writer: &mut BitWriter, code: &str, _registry: &Registry) -> Result<()> {
        for c in padded_code(code, JM_CODE_CHARS)? {
            writer.write(8, u64::from(c))?;
        }
        Ok(())
    }

    fn code_bits(&self, _code: &str, _registry: &Registry) -> Result<usize> {
        Ok(8 * JM_CODE_CHARS)
    }
}

// ============================================================================
// Resurrected
// ============================================================================

/// Marker-less records with a 3-bit header version and Huffman item codes
#[derive(Debug)]
pub struct ResurrectedFormat {
    version: ItemVersion,
}

static RESURRECTED_V100R: ResurrectedFormat = ResurrectedFormat {
    version: ItemVersion::V100R,
};
static RESURRECTED_V120: ResurrectedFormat = ResurrectedFormat {
    version: ItemVersion::V120,
};
static RESURRECTED_V140: ResurrectedFormat = ResurrectedFormat {
    version: ItemVersion::V140,
};
static RESURRECTED_V160: ResurrectedFormat = ResurrectedFormat {
    version: ItemVersion::V160,
};

impl ItemFormat for ResurrectedFormat {
    fn version(&self) -> ItemVersion {
        self.version
    }

    fn has_marker(&self) -> bool {
        false
    }

    fn header_version_bits(&self) -> usize {
        3
    }

    fn header_version_value(&self, _mode: GameMode) -> u16 {
        5
    }

    fn char_bits(&self) -> usize {
        if self.version >= ItemVersion::V120 {
            8
        } else {
            7
        }
    }

    fn socket_fill_bits(&self, compact: bool) -> usize {
        if compact {
            1
        } else {
            3
        }
    }

    fn has_quest_difficulty(&self) -> bool {
        self.version >= ItemVersion::V120
    }

    fn has_realm_data(&self) -> bool {
        true
    }

    fn defense_bits(&self) -> usize {
        11
    }

    fn current_durability_bits(&self) -> usize {
        9
    }

    fn default_flags(&self) -> u32 {
        ALWAYS_ONE_FLAG
    }

    fn splits_time_based(&self) -> bool {
        true
    }

    fn read_code(&self, reader: &mut BitReader<'_>, _registry: &Registry) -> Result<String> {
        huffman::read_code(reader)
    }

    fn write_code(&self, writer: &mut BitWriter, code: &str, _registry: &Registry) -> Result<()> {
        huffman::write_code(writer, code)
    }

    fn code_bits(&self, code: &str, _registry: &Registry) -> Result<usize> {
        huffman::code_bits(code)
    }
}

fn legacy_stat_encoding(stat: &StatDef) -> (usize, i64) {
    match stat.legacy {
        Some((bits, add)) => (usize::from(bits), i64::from(add)),
        None => (usize::from(stat.bits), i64::from(stat.add)),
    }
}

/// Code characters padded with spaces to `width`
fn padded_code(code: &str, width: usize) -> Result<Vec<u8>> {
    let trimmed = code.trim_end();
    if trimmed.len() > width || !trimmed.is_ascii() {
        return Err(ItemError::UnknownItemCode(code.to_string()));
    }
    let mut bytes = trimmed.as_bytes().to_vec();
    bytes.resize(width, b' ');
    Ok(bytes)
}
