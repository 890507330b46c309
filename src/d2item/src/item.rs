//! A single item record and everything it owns.
//!
//! An [`Item`] keeps its encoded bytes as the source of truth. Reads go through the
//! per-item [`OffsetTable`]; edits rewrite the bits in place and shift the table
//! (see [`item::mutate`](self::mutate)). Socketed items are owned children and are
//! written immediately after their host.
//!
//! ```
//! use d2item::{Item, ItemVersion, GameMode, Registry};
//!
//! # fn main() -> Result<(), d2item::ItemError> {
//! let registry = Registry::builtin();
//! let mut item = Item::builder("lsd", registry)
//!     .version(ItemVersion::V110)
//!     .build()?;
//! item.set_socket_count(2)?;
//!
//! let bytes = item.to_bytes();
//! let decoded = Item::from_bytes(&bytes, ItemVersion::V110, GameMode::Expansion, registry)?;
//! assert_eq!(decoded.total_sockets(), 2);
//! # Ok(())
//! # }
//! ```

mod builder;
mod derived;
pub(crate) mod layout;
mod mutate;
mod sockets;
mod upgrade;

pub use builder::ItemBuilder;
pub use layout::{ITEM_MARKER, MAX_NAME_LEN};
pub use upgrade::{INDESTRUCTIBLE_STAT, MAX_DURABILITY};

use crate::bitstream::{BitReader, BitStore};
use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemFormat, ItemVersion, DEFENSE_BIAS};
use crate::location::{EquipSlot, Location, Storage};
use crate::offsets::{Field, OffsetTable};
use crate::properties::{self, read_list, MagicalAttribute};
use crate::quality::{Quality, QualityBlock, QUALITY_BITS};
use crate::registry::{CharClass, ItemType, Registry, RunewordDef};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bit masks of the 32-bit flag field
pub mod flag {
    pub const IDENTIFIED: u32 = 1 << 4;
    pub const DISABLED: u32 = 1 << 8;
    pub const SOCKETED: u32 = 1 << 11;
    pub const NEW: u32 = 1 << 13;
    pub const BAD_EQUIPPED: u32 = 1 << 14;
    pub const EAR: u32 = 1 << 16;
    pub const STARTER: u32 = 1 << 17;
    pub const COMPACT: u32 = 1 << 21;
    pub const ETHEREAL: u32 = 1 << 22;
    pub const ALWAYS_ONE: u32 = crate::format::ALWAYS_ONE_FLAG;
    pub const PERSONALIZED: u32 = 1 << 24;
    pub const RUNEWORD: u32 = 1 << 26;

    /// Bits that follow from which optional parts a record carries
    pub const STRUCTURAL: u32 = EAR | COMPACT | SOCKETED | PERSONALIZED | RUNEWORD;
}

// ============================================================================
// Semantic fields
// ============================================================================

/// Class, level and name of the character an ear was taken from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarAttributes {
    /// Raw 3-bit class id
    pub class: u8,
    pub level: u8,
    pub name: String,
}

impl EarAttributes {
    pub fn char_class(&self) -> Option<CharClass> {
        CharClass::from_id(self.class)
    }
}

/// Runeword id block: 12-bit id and a 4-bit constant (always 5 in known records)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunewordRef {
    pub id: u16,
    pub constant: u8,
}

impl RunewordRef {
    pub const CONSTANT: u8 = 5;

    pub fn new(id: u16) -> Self {
        Self {
            id,
            constant: Self::CONSTANT,
        }
    }
}

/// Every field of one record, independent of format version.
///
/// This is the form items take when they cross versions: decode into fields, then
/// encode the fields under another format. Optional parts are `Some` exactly when
/// the record carries them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    /// Item type code; empty for ears
    pub code: String,
    /// Raw flag field. Structural bits are recomputed from the optional parts on encode.
    pub flags: u32,
    pub header_version: u16,
    pub location: Location,
    pub equip_slot: EquipSlot,
    pub x: u8,
    pub y: u8,
    pub storage: Storage,
    pub ear: Option<EarAttributes>,
    pub quest_difficulty: Option<u8>,
    /// Number of socketed children following the record
    pub socketed_count: u8,
    /// Absent for compact items
    pub extended: Option<ExtendedFields>,
}

/// Fields of a non-compact record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedFields {
    pub id: u32,
    pub level: u8,
    pub quality: QualityBlock,
    pub graphic: Option<u8>,
    pub auto_affix: Option<u16>,
    pub runeword: Option<RunewordRef>,
    pub personalized_name: Option<String>,
    pub tome: Option<u8>,
    pub realm_data: Option<[u32; 3]>,
    /// Displayed defense (stored value minus the bias)
    pub defense: Option<i32>,
    pub max_durability: Option<u8>,
    pub durability: Option<u16>,
    pub quantity: Option<u16>,
    pub total_sockets: Option<u8>,
    pub set_bonus_mask: Option<u8>,
    pub magic_attributes: Vec<MagicalAttribute>,
    pub set_attributes: Vec<Vec<MagicalAttribute>>,
    pub runeword_attributes: Vec<MagicalAttribute>,
}

// ============================================================================
// Item
// ============================================================================

/// One item record with its socketed children
#[derive(Clone)]
pub struct Item<'r> {
    registry: &'r Registry,
    format: &'static dyn ItemFormat,
    mode: GameMode,
    code: String,
    data: BitStore,
    offsets: OffsetTable,
    socket_fill_bits: usize,
    socketed: Vec<Item<'r>>,
    combined: OnceCell<Vec<MagicalAttribute>>,
}

impl fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("code", &self.code)
            .field("version", &self.format.version())
            .field("mode", &self.mode)
            .field("bits", &self.offsets.end())
            .field("socketed", &self.socketed)
            .finish()
    }
}

impl<'r> Item<'r> {
    /// Start building a fresh item of type `code`
    pub fn builder(code: &str, registry: &'r Registry) -> ItemBuilder<'r> {
        ItemBuilder::new(code, registry)
    }

    /// Decode one record and its socketed children from the reader's position.
    ///
    /// The reader must be byte aligned and is left aligned after the last child.
    /// `mode` is used when the record's header does not say which game it is from.
    pub fn read(
        reader: &mut BitReader<'_>,
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        reader.align();
        let start = reader.position();
        let format = version.format();
        let decoded = layout::read_layout(reader, format, registry)?;
        reader.align();

        let bytes = reader.bytes();
        let data = BitStore::from_bytes(bytes[start / 8..reader.position() / 8].to_vec());
        let mode = if format.supports_expansion() {
            format
                .game_mode_from_header(decoded.fields.header_version)
                .unwrap_or(mode)
        } else {
            GameMode::Classic
        };

        let mut item = Item {
            registry,
            format,
            mode,
            code: decoded.fields.code,
            data,
            offsets: decoded.offsets,
            socket_fill_bits: decoded.socket_fill_bits,
            socketed: Vec::new(),
            combined: OnceCell::new(),
        };

        for _ in 0..decoded.fields.socketed_count {
            let child = Item::read(reader, version, mode, registry)?;
            item.socketed.push(child);
        }
        Ok(item)
    }

    /// Decode an item from the start of `bytes`
    pub fn from_bytes(
        bytes: &[u8],
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        let mut reader = BitReader::new(bytes);
        Item::read(&mut reader, version, mode, registry)
    }

    /// Encode `fields` as a fresh record with no children
    pub fn from_fields(
        fields: &ItemFields,
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        Item::from_parts(fields, Vec::new(), version, mode, registry)
    }

    /// Encode `fields` with `children` as its socketed items
    pub fn from_parts(
        fields: &ItemFields,
        children: Vec<Item<'r>>,
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        let format = version.format();
        let mode = if format.supports_expansion() {
            mode
        } else {
            GameMode::Classic
        };
        if mode == GameMode::Classic {
            if let Some(item_type) = registry.item_type(&fields.code) {
                if item_type.expansion {
                    return Err(ItemError::UnsupportedInVersion(
                        format!("expansion item '{}' in a classic game", item_type.code),
                        version.name(),
                    ));
                }
            }
        }
        if children
            .iter()
            .any(|c| c.version() != version || c.game_mode() != mode)
        {
            return Err(ItemError::precondition(
                "socketed items must share their host's version and game mode",
            ));
        }

        let mut fields = fields.clone();
        fields.socketed_count = u8::try_from(children.len()).map_err(|_| ItemError::OutOfRange {
            field: "socketed item count",
            value: children.len() as u64,
            max: u64::from(u8::MAX),
        })?;
        let encoded = layout::write_layout(&fields, format, registry)?;

        Ok(Item {
            registry,
            format,
            mode,
            code: fields.code,
            data: encoded.data,
            offsets: encoded.offsets,
            socket_fill_bits: encoded.socket_fill_bits,
            socketed: children,
            combined: OnceCell::new(),
        })
    }

    /// Decode this record's bits back into fields
    pub fn fields(&self) -> Result<ItemFields> {
        let mut reader = BitReader::new(self.data.as_bytes());
        Ok(layout::read_layout(&mut reader, self.format, self.registry)?.fields)
    }

    /// Re-encode under another format version and game mode.
    ///
    /// The item goes through its labeled-tree form, so every field is mapped by
    /// meaning rather than by bit position. Fails without producing an item when
    /// the target cannot represent it, for example expansion content in a classic
    /// target.
    pub fn convert(&self, version: ItemVersion, mode: GameMode) -> Result<Item<'r>> {
        let style = crate::tree::TreeStyle::default();
        let result = self
            .to_tree(style)
            .and_then(|tree| Item::from_tree_migrating(&tree, style, version, mode, self.registry));
        if let Err(e) = &result {
            tracing::warn!(
                code = %self.code,
                from = %self.version(),
                to = %version,
                error = %e,
                "migration failed"
            );
        }
        result
    }

    /// Encoded bytes of this record followed by every socketed child's bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.data.as_bytes().to_vec();
        for child in &self.socketed {
            bytes.extend(child.to_bytes());
        }
        bytes
    }

    /// Bytes of this record alone
    pub fn record_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// Logical length of this record in bits, before padding
    pub fn bit_len(&self) -> usize {
        self.offsets.end()
    }

    /// Read-only view of the field offsets
    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn format(&self) -> &'static dyn ItemFormat {
        self.format
    }

    pub fn version(&self) -> ItemVersion {
        self.format.version()
    }

    pub fn game_mode(&self) -> GameMode {
        self.mode
    }

    // ------------------------------------------------------------------------
    // Raw field access
    // ------------------------------------------------------------------------

    pub(crate) fn flags_offset(&self) -> usize {
        if self.format.has_marker() {
            layout::MARKER_BITS
        } else {
            0
        }
    }

    fn read_field(&self, field: Field, bits: usize) -> Option<u64> {
        let offset = self.offsets.get(field)?;
        self.data.read(offset, bits).ok()
    }

    fn read_list_at(&self, field: Field) -> Result<Vec<MagicalAttribute>> {
        match self.offsets.get(field) {
            Some(offset) => {
                let mut reader = BitReader::at(self.data.as_bytes(), offset);
                read_list(&mut reader, self.format, self.registry)
            }
            None => Ok(Vec::new()),
        }
    }

    fn list_or_warn(&self, field: Field) -> Vec<MagicalAttribute> {
        self.read_list_at(field).unwrap_or_else(|e| {
            tracing::warn!(code = %self.code, field = field.name(), error = %e, "unreadable property list");
            Vec::new()
        })
    }

    // ------------------------------------------------------------------------
    // Header
    // ------------------------------------------------------------------------

    pub fn flags(&self) -> u32 {
        self.data
            .read(self.flags_offset(), layout::FLAGS_BITS)
            .map(|v| v as u32)
            .unwrap_or(0)
    }

    pub fn has_flag(&self, mask: u32) -> bool {
        self.flags() & mask != 0
    }

    pub fn is_identified(&self) -> bool {
        self.has_flag(flag::IDENTIFIED)
    }

    pub fn is_disabled(&self) -> bool {
        self.has_flag(flag::DISABLED)
    }

    pub fn is_socketed(&self) -> bool {
        self.has_flag(flag::SOCKETED)
    }

    pub fn is_new(&self) -> bool {
        self.has_flag(flag::NEW)
    }

    pub fn is_ear(&self) -> bool {
        self.has_flag(flag::EAR)
    }

    pub fn is_starter(&self) -> bool {
        self.has_flag(flag::STARTER)
    }

    pub fn is_compact(&self) -> bool {
        self.offsets.get(Field::ItemId).is_none()
    }

    pub fn is_ethereal(&self) -> bool {
        self.has_flag(flag::ETHEREAL)
    }

    pub fn is_personalized(&self) -> bool {
        self.has_flag(flag::PERSONALIZED)
    }

    pub fn is_runeword(&self) -> bool {
        self.has_flag(flag::RUNEWORD)
    }

    /// Raw header version, when the format has one
    pub fn header_version(&self) -> Option<u16> {
        self.read_field(Field::Version, self.format.header_version_bits())
            .map(|v| v as u16)
    }

    pub fn location(&self) -> Location {
        self.read_field(Field::Location, 3)
            .and_then(|raw| Location::from_raw(raw as u8).ok())
            .unwrap_or_default()
    }

    pub fn equip_slot(&self) -> EquipSlot {
        self.read_field(Field::EquipId, 4)
            .and_then(|raw| EquipSlot::from_raw(raw as u8).ok())
            .unwrap_or_default()
    }

    /// Column and row
    pub fn position(&self) -> (u8, u8) {
        let x = self.read_field(Field::PositionX, 4).unwrap_or(0) as u8;
        let y = self.read_field(Field::PositionY, 4).unwrap_or(0) as u8;
        (x, y)
    }

    pub fn storage(&self) -> Storage {
        self.read_field(Field::AltPosition, 3)
            .and_then(|raw| Storage::from_raw(raw as u8).ok())
            .unwrap_or_default()
    }

    pub fn ear(&self) -> Option<EarAttributes> {
        self.fields().ok().and_then(|f| f.ear)
    }

    /// Item type code; empty for ears
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn item_type(&self) -> Option<&'r ItemType> {
        self.registry.item_type(&self.code)
    }

    /// Type name, or the ear description
    pub fn name(&self) -> String {
        match self.item_type() {
            Some(t) => t.name.clone(),
            None => match self.ear() {
                Some(ear) => format!("{}'s Ear", ear.name),
                None => self.code.clone(),
            },
        }
    }

    pub fn quest_difficulty(&self) -> Option<u8> {
        self.read_field(Field::QuestDifficulty, 2).map(|v| v as u8)
    }

    // ------------------------------------------------------------------------
    // Extended fields
    // ------------------------------------------------------------------------

    pub fn id(&self) -> Option<u32> {
        self.read_field(Field::ItemId, layout::ID_BITS).map(|v| v as u32)
    }

    pub fn level(&self) -> Option<u8> {
        self.read_field(Field::Level, layout::LEVEL_BITS)
            .map(|v| v as u8)
    }

    /// Quality; compact items report normal
    pub fn quality(&self) -> Quality {
        self.read_field(Field::Quality, QUALITY_BITS)
            .and_then(|raw| Quality::from_raw(raw as u8).ok())
            .unwrap_or(Quality::Normal)
    }

    pub fn quality_block(&self) -> Option<QualityBlock> {
        let offset = self.offsets.get(Field::QualityAttributes)?;
        let mut reader = BitReader::at(self.data.as_bytes(), offset);
        QualityBlock::read(&mut reader, self.quality()).ok()
    }

    pub fn graphic(&self) -> Option<u8> {
        match self.read_field(Field::MultiGraphics, 4)? {
            v if v & 1 == 1 => Some((v >> 1) as u8),
            _ => None,
        }
    }

    pub fn auto_affix(&self) -> Option<u16> {
        match self.read_field(Field::AutoAffix, 12)? {
            v if v & 1 == 1 => Some((v >> 1) as u16),
            _ => None,
        }
    }

    pub fn runeword_id(&self) -> Option<u16> {
        self.read_field(Field::Runeword, layout::RUNEWORD_ID_BITS)
            .map(|v| v as u16)
    }

    pub fn runeword(&self) -> Option<&'r RunewordDef> {
        self.registry.runeword(self.runeword_id()?)
    }

    pub fn runeword_name(&self) -> Option<&'r str> {
        self.runeword().map(|r| r.name.as_str())
    }

    pub fn personalized_name(&self) -> Option<String> {
        self.offsets.get(Field::Personalization)?;
        self.fields().ok()?.extended?.personalized_name
    }

    pub fn tome(&self) -> Option<u8> {
        self.read_field(Field::Tome, 5).map(|v| v as u8)
    }

    pub fn realm_data(&self) -> Option<[u32; 3]> {
        let offset = self.offsets.get(Field::RealmData)?;
        if !self.data.read_bit(offset).ok()? {
            return None;
        }
        let mut words = [0u32; 3];
        for (i, word) in words.iter_mut().enumerate() {
            *word = self.data.read(offset + 1 + 32 * i, 32).ok()? as u32;
        }
        Some(words)
    }

    /// Stored defense rating with the bias removed
    pub fn defense(&self) -> Option<i32> {
        self.read_field(Field::Defense, self.format.defense_bits())
            .map(|v| v as i32 - DEFENSE_BIAS)
    }

    /// Max durability; 0 means indestructible
    pub fn max_durability_value(&self) -> Option<u8> {
        self.read_field(Field::Durability, layout::MAX_DURABILITY_BITS)
            .map(|v| v as u8)
    }

    pub fn durability(&self) -> Option<u16> {
        self.read_field(
            Field::CurrentDurability,
            self.format.current_durability_bits(),
        )
        .map(|v| v as u16)
    }

    pub fn quantity(&self) -> Option<u16> {
        self.read_field(Field::Stackable, layout::QUANTITY_BITS)
            .map(|v| v as u16)
    }

    /// Number of sockets, 0 when the item has none
    pub fn total_sockets(&self) -> u8 {
        self.read_field(Field::SocketCount, layout::SOCKET_COUNT_BITS)
            .unwrap_or(0) as u8
    }

    /// The stored socketed-item count field
    pub fn socket_count_field(&self) -> u8 {
        self.read_field(Field::SocketFillCount, self.socket_fill_bits)
            .unwrap_or(0) as u8
    }

    /// Number of occupied sockets
    pub fn filled_sockets(&self) -> usize {
        self.socketed.len()
    }

    pub fn set_bonus_mask(&self) -> Option<u8> {
        self.read_field(Field::BonusBits, layout::SET_MASK_BITS)
            .map(|v| v as u8)
    }

    pub fn magic_attributes(&self) -> Vec<MagicalAttribute> {
        if self.is_compact() {
            return Vec::new();
        }
        self.list_or_warn(Field::MagicProperties)
    }

    /// One list per set bonus mask bit
    pub fn set_attributes(&self) -> Vec<Vec<MagicalAttribute>> {
        let (Some(offset), Some(mask)) = (
            self.offsets.get(Field::SetBonusProperties),
            self.set_bonus_mask(),
        ) else {
            return Vec::new();
        };
        let mut reader = BitReader::at(self.data.as_bytes(), offset);
        let mut lists = Vec::new();
        for _ in 0..mask.count_ones() {
            match read_list(&mut reader, self.format, self.registry) {
                Ok(list) => lists.push(list),
                Err(e) => {
                    tracing::warn!(code = %self.code, error = %e, "unreadable set bonus list");
                    break;
                }
            }
        }
        lists
    }

    pub fn runeword_attributes(&self) -> Vec<MagicalAttribute> {
        self.list_or_warn(Field::RunewordProperties)
    }

    /// Magic and runeword attributes plus whatever the socketed items contribute
    pub fn combined_attributes(&self) -> &[MagicalAttribute] {
        self.combined.get_or_init(|| {
            let mut lists = vec![self.magic_attributes(), self.runeword_attributes()];
            if let Some(host) = self.item_type() {
                for child in &self.socketed {
                    if let Some(bonus) = self.registry.socket_bonus(child.code()) {
                        lists.push(bonus.for_host(host).to_vec());
                    }
                    lists.push(child.magic_attributes());
                }
            }
            properties::combine(lists.iter().map(Vec::as_slice), self.registry)
        })
    }

    pub fn socketed_items(&self) -> &[Item<'r>] {
        &self.socketed
    }

    /// Drop cached derived values after a structural change
    pub(crate) fn invalidate(&mut self) {
        self.combined = OnceCell::new();
    }
}
