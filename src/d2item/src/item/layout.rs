//! Field-by-field walk of an item record.
//!
//! [`read_layout`] decodes a record into [`ItemFields`] while recording every
//! field's offset; [`write_layout`] is its inverse and produces the same offsets.
//! Both follow one presence rule set, so a record written from the fields it was
//! read into is bit-identical to the original.

use super::{flag, EarAttributes, ExtendedFields, ItemFields, RunewordRef};
use crate::bitstream::{BitReader, BitStore, BitWriter};
use crate::error::{ItemError, Result};
use crate::format::{ItemFormat, DEFENSE_BIAS};
use crate::location::{EquipSlot, Location, Storage};
use crate::offsets::{Field, OffsetTable};
use crate::properties::{read_list, write_list};
use crate::quality::{Quality, QualityBlock, QUALITY_BITS};
use crate::registry::{ItemType, Registry};

/// Bytes of the "JM" record marker, in stream order
pub const ITEM_MARKER: [u8; 2] = *b"JM";

pub(crate) const MARKER_BITS: usize = 16;
pub(crate) const FLAGS_BITS: usize = 32;
const LOCATION_BITS: usize = 3;
const EQUIP_SLOT_BITS: usize = 4;
const POSITION_BITS: usize = 4;
const STORAGE_BITS: usize = 3;
const EAR_CLASS_BITS: usize = 3;
const EAR_LEVEL_BITS: usize = 7;
const QUEST_DIFFICULTY_BITS: usize = 2;
pub(crate) const ID_BITS: usize = 32;
pub(crate) const LEVEL_BITS: usize = 7;
const GRAPHIC_BITS: usize = 3;
const AUTO_AFFIX_BITS: usize = 11;
pub(crate) const RUNEWORD_ID_BITS: usize = 12;
pub(crate) const RUNEWORD_CONSTANT_BITS: usize = 4;
pub(crate) const RUNEWORD_BITS: usize = RUNEWORD_ID_BITS + RUNEWORD_CONSTANT_BITS;
const TOME_BITS: usize = 5;
const REALM_WORDS: usize = 3;
pub(crate) const MAX_DURABILITY_BITS: usize = 8;
pub(crate) const QUANTITY_BITS: usize = 9;
pub(crate) const SOCKET_COUNT_BITS: usize = 4;
pub(crate) const SET_MASK_BITS: usize = 5;

/// Longest ear or personalized name
pub const MAX_NAME_LEN: usize = 15;

/// Result of walking one record (children excluded)
#[derive(Debug, Clone)]
pub(crate) struct Decoded {
    pub fields: ItemFields,
    pub offsets: OffsetTable,
    pub socket_fill_bits: usize,
}

// ============================================================================
// Decoding
// ============================================================================

struct Walker<'a, 'b> {
    reader: &'b mut BitReader<'a>,
    start: usize,
    offsets: OffsetTable,
}

impl Walker<'_, '_> {
    fn pos(&self) -> usize {
        self.reader.position() - self.start
    }

    fn mark(&mut self, field: Field) {
        let pos = self.pos();
        tracing::trace!(field = field.name(), offset = pos, "field");
        self.offsets.set(field, pos);
    }

    fn read(&mut self, bits: usize) -> Result<u64> {
        let pos = self.reader.position();
        self.reader
            .read(bits)
            .map_err(|_| ItemError::Truncated(pos - self.start))
    }

    fn read_name(&mut self, char_bits: usize) -> Result<String> {
        let start = self.pos();
        let mut name = String::new();
        for _ in 0..=MAX_NAME_LEN {
            let c = self.read(char_bits)? as u8;
            if c == 0 {
                return Ok(name);
            }
            name.push(char::from(c));
        }
        Err(ItemError::UnterminatedName(start))
    }
}

/// Decode one record starting at the reader's position.
///
/// The reader is left at the record's logical end (not byte aligned). Offsets are
/// relative to the first bit of the record.
pub(crate) fn read_layout(
    reader: &mut BitReader<'_>,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<Decoded> {
    let start = reader.position();
    let mut w = Walker {
        reader,
        start,
        offsets: OffsetTable::new(),
    };

    if format.has_marker() {
        let raw = w.read(MARKER_BITS)? as u16;
        let found = raw.to_le_bytes();
        if found != ITEM_MARKER {
            return Err(ItemError::BadMarker {
                expected: ITEM_MARKER,
                found,
            });
        }
        w.mark(Field::Flags);
    }
    let flags = w.read(FLAGS_BITS)? as u32;

    let mut header_version = 0;
    if format.header_version_bits() > 0 {
        w.mark(Field::Version);
        header_version = w.read(format.header_version_bits())? as u16;
    }

    w.mark(Field::Location);
    let location = Location::from_raw(w.read(LOCATION_BITS)? as u8)?;
    w.mark(Field::EquipId);
    let equip_slot = EquipSlot::from_raw(w.read(EQUIP_SLOT_BITS)? as u8)?;
    w.mark(Field::PositionX);
    let x = w.read(POSITION_BITS)? as u8;
    w.mark(Field::PositionY);
    let y = w.read(POSITION_BITS)? as u8;
    w.mark(Field::AltPosition);
    let storage = Storage::from_raw(w.read(STORAGE_BITS)? as u8)?;

    let mut fields = ItemFields {
        code: String::new(),
        flags,
        header_version,
        location,
        equip_slot,
        x,
        y,
        storage,
        ear: None,
        quest_difficulty: None,
        socketed_count: 0,
        extended: None,
    };

    let mut socket_fill_bits = 0;
    if flags & flag::EAR != 0 {
        w.mark(Field::Ear);
        let class = w.read(EAR_CLASS_BITS)? as u8;
        let level = w.read(EAR_LEVEL_BITS)? as u8;
        let name = w.read_name(format.char_bits())?;
        fields.ear = Some(EarAttributes { class, level, name });
    } else {
        w.mark(Field::TypeCode);
        let code_pos = w.pos();
        let code = format
            .read_code(w.reader, registry)
            .map_err(|e| match e {
                ItemError::Bits(_) => ItemError::Truncated(code_pos),
                other => other,
            })?;
        let item_type = registry
            .item_type(&code)
            .ok_or_else(|| ItemError::UnknownItemCode(code.clone()))?;
        fields.code = code;

        if format.has_quest_difficulty() && item_type.is_quest() {
            w.mark(Field::QuestDifficulty);
            fields.quest_difficulty = Some(w.read(QUEST_DIFFICULTY_BITS)? as u8);
        }

        let compact = flags & flag::COMPACT != 0;
        socket_fill_bits = format.socket_fill_bits(compact);
        w.mark(Field::SocketFillCount);
        fields.socketed_count = w.read(socket_fill_bits)? as u8;

        if !compact {
            fields.extended = Some(read_extended(&mut w, flags, item_type, format, registry)?);
        }
    }

    w.mark(Field::EndOfItem);
    tracing::debug!(
        code = %fields.code,
        version = %format.version(),
        bits = w.pos(),
        "decoded item record"
    );

    Ok(Decoded {
        fields,
        offsets: w.offsets,
        socket_fill_bits,
    })
}

fn read_extended(
    w: &mut Walker<'_, '_>,
    flags: u32,
    item_type: &ItemType,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<ExtendedFields> {
    w.mark(Field::ItemId);
    let id = w.read(ID_BITS)? as u32;
    w.mark(Field::Level);
    let level = w.read(LEVEL_BITS)? as u8;
    w.mark(Field::Quality);
    let quality = Quality::from_raw(w.read(QUALITY_BITS)? as u8)?;

    w.mark(Field::MultiGraphics);
    let graphic = match w.read(1)? {
        0 => None,
        _ => Some(w.read(GRAPHIC_BITS)? as u8),
    };
    w.mark(Field::AutoAffix);
    let auto_affix = match w.read(1)? {
        0 => None,
        _ => Some(w.read(AUTO_AFFIX_BITS)? as u16),
    };

    w.mark(Field::QualityAttributes);
    let block_pos = w.pos();
    let quality_block = QualityBlock::read(w.reader, quality)
        .map_err(|_| ItemError::Truncated(block_pos))?;

    w.mark(Field::RunewordMarker);
    let runeword = if flags & flag::RUNEWORD != 0 {
        w.mark(Field::Runeword);
        Some(RunewordRef {
            id: w.read(RUNEWORD_ID_BITS)? as u16,
            constant: w.read(RUNEWORD_CONSTANT_BITS)? as u8,
        })
    } else {
        None
    };

    w.mark(Field::PersonalizationMarker);
    let personalized_name = if flags & flag::PERSONALIZED != 0 {
        w.mark(Field::Personalization);
        Some(w.read_name(format.char_bits())?)
    } else {
        None
    };

    let tome = if item_type.is_tome() {
        w.mark(Field::Tome);
        Some(w.read(TOME_BITS)? as u8)
    } else {
        None
    };

    let realm_data = if format.has_realm_data() {
        w.mark(Field::RealmData);
        match w.read(1)? {
            0 => None,
            _ => {
                let mut words = [0u32; REALM_WORDS];
                for word in words.iter_mut() {
                    *word = w.read(32)? as u32;
                }
                Some(words)
            }
        }
    } else {
        None
    };

    let defense = if item_type.is_armor() {
        w.mark(Field::Defense);
        Some(w.read(format.defense_bits())? as i32 - DEFENSE_BIAS)
    } else {
        None
    };

    let (mut max_durability, mut durability) = (None, None);
    if item_type.has_durability() {
        w.mark(Field::Durability);
        let max = w.read(MAX_DURABILITY_BITS)? as u8;
        max_durability = Some(max);
        if max > 0 {
            w.mark(Field::CurrentDurability);
            durability = Some(w.read(format.current_durability_bits())? as u16);
        }
    }

    let quantity = if item_type.is_stackable() {
        w.mark(Field::Stackable);
        Some(w.read(QUANTITY_BITS)? as u16)
    } else {
        None
    };

    w.mark(Field::SocketCountMarker);
    let total_sockets = if flags & flag::SOCKETED != 0 {
        w.mark(Field::SocketCount);
        Some(w.read(SOCKET_COUNT_BITS)? as u8)
    } else {
        None
    };

    let set_bonus_mask = if quality == Quality::Set {
        w.mark(Field::BonusBits);
        Some(w.read(SET_MASK_BITS)? as u8)
    } else {
        None
    };

    w.mark(Field::MagicProperties);
    let magic_attributes = read_list(w.reader, format, registry)?;

    let mut set_attributes = Vec::new();
    if let Some(mask) = set_bonus_mask {
        w.mark(Field::SetBonusProperties);
        for _ in 0..mask.count_ones() {
            set_attributes.push(read_list(w.reader, format, registry)?);
        }
    }

    let mut runeword_attributes = Vec::new();
    if runeword.is_some() {
        w.mark(Field::RunewordProperties);
        runeword_attributes = read_list(w.reader, format, registry)?;
    }

    Ok(ExtendedFields {
        id,
        level,
        quality: quality_block,
        graphic,
        auto_affix,
        runeword,
        personalized_name,
        tome,
        realm_data,
        defense,
        max_durability,
        durability,
        quantity,
        total_sockets,
        set_bonus_mask,
        magic_attributes,
        set_attributes,
        runeword_attributes,
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Encoded record (children excluded) with its offsets
#[derive(Debug, Clone)]
pub(crate) struct Encoded {
    pub data: BitStore,
    pub offsets: OffsetTable,
    pub socket_fill_bits: usize,
}

struct Emitter {
    writer: BitWriter,
    offsets: OffsetTable,
}

impl Emitter {
    fn mark(&mut self, field: Field) {
        self.offsets.set(field, self.writer.position());
    }

    fn put(&mut self, bits: usize, value: u64, field: &'static str) -> Result<()> {
        put(&mut self.writer, bits, value, field)
    }
}

/// Write `value` in `bits` bits, rejecting values that do not fit
pub(crate) fn put(writer: &mut BitWriter, bits: usize, value: u64, field: &'static str) -> Result<()> {
    let max = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
    if value > max {
        return Err(ItemError::OutOfRange { field, value, max });
    }
    writer.write(bits, value)?;
    Ok(())
}

/// Encode a NUL-terminated name
pub(crate) fn write_name(writer: &mut BitWriter, name: &str, char_bits: usize) -> Result<()> {
    check_name(name, char_bits)?;
    for c in name.bytes() {
        writer.write(char_bits, u64::from(c))?;
    }
    writer.write(char_bits, 0)?;
    Ok(())
}

/// Names are 1 to 15 characters, each representable in `char_bits`
pub(crate) fn check_name(name: &str, char_bits: usize) -> Result<()> {
    let len = name.chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(ItemError::OutOfRange {
            field: "name length",
            value: len as u64,
            max: MAX_NAME_LEN as u64,
        });
    }
    let max = (1u32 << char_bits) - 1;
    if let Some(c) = name.chars().find(|&c| c == '\0' || u32::from(c) > max) {
        return Err(ItemError::precondition(format!(
            "character {:?} cannot be stored in a {}-bit name",
            c, char_bits
        )));
    }
    Ok(())
}

/// Flag bits implied by which optional parts the fields carry
pub(crate) fn structural_flags(fields: &ItemFields) -> u32 {
    let mut flags = fields.flags & !flag::STRUCTURAL;
    if fields.ear.is_some() {
        flags |= flag::EAR;
    }
    match &fields.extended {
        None => flags |= flag::COMPACT,
        Some(ext) => {
            if ext.total_sockets.is_some() {
                flags |= flag::SOCKETED;
            }
            if ext.personalized_name.is_some() {
                flags |= flag::PERSONALIZED;
            }
            if ext.runeword.is_some() {
                flags |= flag::RUNEWORD;
            }
        }
    }
    flags
}

/// Encode one record (children excluded), padded to a byte boundary
pub(crate) fn write_layout(
    fields: &ItemFields,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<Encoded> {
    let mut e = Emitter {
        writer: BitWriter::new(),
        offsets: OffsetTable::new(),
    };
    let flags = structural_flags(fields);

    if format.has_marker() {
        e.writer
            .write(MARKER_BITS, u64::from(u16::from_le_bytes(ITEM_MARKER)))?;
        e.mark(Field::Flags);
    }
    e.put(FLAGS_BITS, u64::from(flags), "flags")?;

    if format.header_version_bits() > 0 {
        e.mark(Field::Version);
        e.put(
            format.header_version_bits(),
            u64::from(fields.header_version),
            "header version",
        )?;
    }

    e.mark(Field::Location);
    e.put(LOCATION_BITS, u64::from(fields.location.raw()), "location")?;
    e.mark(Field::EquipId);
    e.put(EQUIP_SLOT_BITS, u64::from(fields.equip_slot.raw()), "equip slot")?;
    e.mark(Field::PositionX);
    e.put(POSITION_BITS, u64::from(fields.x), "x")?;
    e.mark(Field::PositionY);
    e.put(POSITION_BITS, u64::from(fields.y), "y")?;
    e.mark(Field::AltPosition);
    e.put(STORAGE_BITS, u64::from(fields.storage.raw()), "storage")?;

    let mut socket_fill_bits = 0;
    if let Some(ear) = &fields.ear {
        e.mark(Field::Ear);
        e.put(EAR_CLASS_BITS, u64::from(ear.class), "ear class")?;
        e.put(EAR_LEVEL_BITS, u64::from(ear.level), "ear level")?;
        write_name(&mut e.writer, &ear.name, format.char_bits())?;
    } else {
        let item_type = registry
            .item_type(&fields.code)
            .ok_or_else(|| ItemError::UnknownItemCode(fields.code.clone()))?;
        if item_type.expansion && !format.supports_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                format!("expansion item '{}'", item_type.code),
                format.version().name(),
            ));
        }

        e.mark(Field::TypeCode);
        format.write_code(&mut e.writer, &fields.code, registry)?;

        if format.has_quest_difficulty() && item_type.is_quest() {
            e.mark(Field::QuestDifficulty);
            e.put(
                QUEST_DIFFICULTY_BITS,
                u64::from(fields.quest_difficulty.unwrap_or(0)),
                "quest difficulty",
            )?;
        }

        socket_fill_bits = format.socket_fill_bits(fields.extended.is_none());
        e.mark(Field::SocketFillCount);
        e.put(
            socket_fill_bits,
            u64::from(fields.socketed_count),
            "socketed item count",
        )?;

        if let Some(ext) = &fields.extended {
            write_extended(&mut e, ext, item_type, format, registry)?;
        }
    }

    e.mark(Field::EndOfItem);
    let (data, bits) = e.writer.finish();
    tracing::debug!(code = %fields.code, version = %format.version(), bits, "encoded item record");

    Ok(Encoded {
        data,
        offsets: e.offsets,
        socket_fill_bits,
    })
}

fn write_extended(
    e: &mut Emitter,
    ext: &ExtendedFields,
    item_type: &ItemType,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<()> {
    let quality = ext.quality.quality();

    e.mark(Field::ItemId);
    e.put(ID_BITS, u64::from(ext.id), "id")?;
    e.mark(Field::Level);
    e.put(LEVEL_BITS, u64::from(ext.level), "level")?;
    e.mark(Field::Quality);
    e.put(QUALITY_BITS, u64::from(quality.raw()), "quality")?;

    e.mark(Field::MultiGraphics);
    e.writer.write_bool(ext.graphic.is_some())?;
    if let Some(graphic) = ext.graphic {
        e.put(GRAPHIC_BITS, u64::from(graphic), "graphic")?;
    }
    e.mark(Field::AutoAffix);
    e.writer.write_bool(ext.auto_affix.is_some())?;
    if let Some(affix) = ext.auto_affix {
        e.put(AUTO_AFFIX_BITS, u64::from(affix), "auto affix")?;
    }

    e.mark(Field::QualityAttributes);
    ext.quality.write(&mut e.writer)?;

    e.mark(Field::RunewordMarker);
    if let Some(runeword) = ext.runeword {
        e.mark(Field::Runeword);
        e.put(RUNEWORD_ID_BITS, u64::from(runeword.id), "runeword id")?;
        e.put(
            RUNEWORD_CONSTANT_BITS,
            u64::from(runeword.constant),
            "runeword constant",
        )?;
    }

    e.mark(Field::PersonalizationMarker);
    if let Some(name) = &ext.personalized_name {
        e.mark(Field::Personalization);
        write_name(&mut e.writer, name, format.char_bits())?;
    }

    if item_type.is_tome() {
        e.mark(Field::Tome);
        e.put(TOME_BITS, u64::from(ext.tome.unwrap_or(0)), "tome")?;
    }

    if format.has_realm_data() {
        e.mark(Field::RealmData);
        e.writer.write_bool(ext.realm_data.is_some())?;
        if let Some(words) = ext.realm_data {
            for word in words {
                e.writer.write(32, u64::from(word))?;
            }
        }
    }

    if item_type.is_armor() {
        e.mark(Field::Defense);
        let defense = ext.defense.unwrap_or_else(|| default_defense(item_type));
        let bits = format.defense_bits();
        e.put(bits, biased(defense, bits, "defense")?, "defense")?;
    }

    if item_type.has_durability() {
        e.mark(Field::Durability);
        let max = ext
            .max_durability
            .unwrap_or_else(|| item_type.durability.unwrap_or(0));
        e.put(MAX_DURABILITY_BITS, u64::from(max), "max durability")?;
        if max > 0 {
            e.mark(Field::CurrentDurability);
            e.put(
                format.current_durability_bits(),
                u64::from(ext.durability.unwrap_or(u16::from(max))),
                "durability",
            )?;
        }
    }

    if item_type.is_stackable() {
        e.mark(Field::Stackable);
        e.put(QUANTITY_BITS, u64::from(ext.quantity.unwrap_or(1)), "quantity")?;
    }

    e.mark(Field::SocketCountMarker);
    if let Some(sockets) = ext.total_sockets {
        e.mark(Field::SocketCount);
        e.put(SOCKET_COUNT_BITS, u64::from(sockets), "socket count")?;
    }

    let mut set_lists = 0;
    if quality == Quality::Set {
        let mask = ext.set_bonus_mask.unwrap_or(0);
        set_lists = mask.count_ones() as usize;
        if set_lists != ext.set_attributes.len() {
            return Err(ItemError::precondition(format!(
                "set bonus mask {:05b} needs {} lists, {} given",
                mask,
                set_lists,
                ext.set_attributes.len()
            )));
        }
        e.mark(Field::BonusBits);
        e.put(SET_MASK_BITS, u64::from(mask), "set bonus mask")?;
    }

    e.mark(Field::MagicProperties);
    write_list(&mut e.writer, &ext.magic_attributes, format, registry)?;

    if quality == Quality::Set {
        e.mark(Field::SetBonusProperties);
        for list in ext.set_attributes.iter().take(set_lists) {
            write_list(&mut e.writer, list, format, registry)?;
        }
    }

    if ext.runeword.is_some() {
        e.mark(Field::RunewordProperties);
        write_list(&mut e.writer, &ext.runeword_attributes, format, registry)?;
    }

    Ok(())
}

/// Highest base defense of the type
pub(crate) fn default_defense(item_type: &ItemType) -> i32 {
    item_type.defense.map(|d| i32::from(d.max)).unwrap_or(0)
}

/// Stored form of a displayed defense value in a `bits`-wide field
pub(crate) fn biased(defense: i32, bits: usize, field: &'static str) -> Result<u64> {
    let max_raw = (1u64 << bits) - 1;
    match defense.checked_add(DEFENSE_BIAS).map(u64::try_from) {
        Some(Ok(raw)) if raw <= max_raw => Ok(raw),
        Some(Err(_)) => Err(ItemError::precondition(format!(
            "{} {} is below the minimum of {}",
            field, defense, -DEFENSE_BIAS
        ))),
        _ => Err(ItemError::OutOfRange {
            field,
            value: u64::from(defense.unsigned_abs()),
            max: max_raw - u64::from(DEFENSE_BIAS.unsigned_abs()),
        }),
    }
}
