//! Per-item table of live field offsets.
//!
//! Every structural field of an item record has an entry holding its current bit
//! offset from the start of the record, or 0 when the field is absent. Offsets move
//! whenever variable-length content is inserted or removed; the two shift primitives
//! here keep the whole table consistent after such an edit.
//!
//! A few entries are *markers*: they always hold the position where an optional
//! block would be inserted, whether or not the block currently exists, so an edit
//! can find its insertion point without re-walking the record.

use std::fmt;

/// Structural fields in layout order.
///
/// The declaration order is the order the fields appear in a record, which the
/// marker-aware cascade relies on to break ties between entries sharing an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Flags,
    Version,
    Location,
    EquipId,
    PositionX,
    PositionY,
    AltPosition,
    Ear,
    TypeCode,
    QuestDifficulty,
    SocketFillCount,
    ItemId,
    Level,
    Quality,
    MultiGraphics,
    AutoAffix,
    QualityAttributes,
    RunewordMarker,
    Runeword,
    PersonalizationMarker,
    Personalization,
    Tome,
    RealmData,
    Defense,
    Durability,
    CurrentDurability,
    Stackable,
    SocketCountMarker,
    SocketCount,
    BonusBits,
    MagicProperties,
    SetBonusProperties,
    RunewordProperties,
    EndOfItem,
}

impl Field {
    pub const COUNT: usize = Field::EndOfItem as usize + 1;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Flags,
        Field::Version,
        Field::Location,
        Field::EquipId,
        Field::PositionX,
        Field::PositionY,
        Field::AltPosition,
        Field::Ear,
        Field::TypeCode,
        Field::QuestDifficulty,
        Field::SocketFillCount,
        Field::ItemId,
        Field::Level,
        Field::Quality,
        Field::MultiGraphics,
        Field::AutoAffix,
        Field::QualityAttributes,
        Field::RunewordMarker,
        Field::Runeword,
        Field::PersonalizationMarker,
        Field::Personalization,
        Field::Tome,
        Field::RealmData,
        Field::Defense,
        Field::Durability,
        Field::CurrentDurability,
        Field::Stackable,
        Field::SocketCountMarker,
        Field::SocketCount,
        Field::BonusBits,
        Field::MagicProperties,
        Field::SetBonusProperties,
        Field::RunewordProperties,
        Field::EndOfItem,
    ];

    /// Marker entries record insertion points rather than materialized fields
    pub fn is_marker(self) -> bool {
        matches!(
            self,
            Field::RunewordMarker | Field::PersonalizationMarker | Field::SocketCountMarker
        )
    }

    /// The optional field a marker stands in for
    pub fn marked_field(self) -> Option<Field> {
        match self {
            Field::RunewordMarker => Some(Field::Runeword),
            Field::PersonalizationMarker => Some(Field::Personalization),
            Field::SocketCountMarker => Some(Field::SocketCount),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Flags => "flags",
            Field::Version => "version",
            Field::Location => "location",
            Field::EquipId => "equip_id",
            Field::PositionX => "position_x",
            Field::PositionY => "position_y",
            Field::AltPosition => "alt_position",
            Field::Ear => "ear",
            Field::TypeCode => "type_code",
            Field::QuestDifficulty => "quest_difficulty",
            Field::SocketFillCount => "socket_fill_count",
            Field::ItemId => "item_id",
            Field::Level => "level",
            Field::Quality => "quality",
            Field::MultiGraphics => "multi_graphics",
            Field::AutoAffix => "auto_affix",
            Field::QualityAttributes => "quality_attributes",
            Field::RunewordMarker => "runeword_marker",
            Field::Runeword => "runeword",
            Field::PersonalizationMarker => "personalization_marker",
            Field::Personalization => "personalization",
            Field::Tome => "tome",
            Field::RealmData => "realm_data",
            Field::Defense => "defense",
            Field::Durability => "durability",
            Field::CurrentDurability => "current_durability",
            Field::Stackable => "stackable",
            Field::SocketCountMarker => "socket_count_marker",
            Field::SocketCount => "socket_count",
            Field::BonusBits => "bonus_bits",
            Field::MagicProperties => "magic_properties",
            Field::SetBonusProperties => "set_bonus_properties",
            Field::RunewordProperties => "runeword_properties",
            Field::EndOfItem => "end_of_item",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bit offset of every structural field of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetTable {
    offsets: [usize; Field::COUNT],
}

impl Default for OffsetTable {
    fn default() -> Self {
        Self {
            offsets: [0; Field::COUNT],
        }
    }
}

impl OffsetTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of `field`, or None when absent.
    ///
    /// Marker-less formats put [`Field::Flags`] at bit 0; locate it through the
    /// item's format rather than this table.
    pub fn get(&self, field: Field) -> Option<usize> {
        match self.offsets[field as usize] {
            0 => None,
            offset => Some(offset),
        }
    }

    /// Raw entry; 0 means absent
    pub fn raw(&self, field: Field) -> usize {
        self.offsets[field as usize]
    }

    pub fn is_present(&self, field: Field) -> bool {
        self.offsets[field as usize] != 0
    }

    pub fn set(&mut self, field: Field, offset: usize) {
        self.offsets[field as usize] = offset;
    }

    pub fn clear(&mut self, field: Field) {
        self.offsets[field as usize] = 0;
    }

    /// End of the record in bits
    pub fn end(&self) -> usize {
        self.raw(Field::EndOfItem)
    }

    /// Present entries in layout order
    pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
        Field::ALL
            .iter()
            .filter_map(move |&field| self.get(field).map(|offset| (field, offset)))
    }

    /// Add `delta` to every present offset at or after `at`.
    ///
    /// Offsets strictly before `at` are left unchanged.
    pub fn shift(&mut self, at: usize, delta: isize) {
        for offset in self.offsets.iter_mut() {
            if *offset != 0 && *offset >= at {
                *offset = apply_delta(*offset, delta);
            }
        }
    }

    /// Shift offsets after `old_len` bits at `at` (owned by `field`) were replaced by
    /// `new_len` bits.
    ///
    /// Entries past the replaced range move by `new_len - old_len`. For a pure
    /// insertion (`old_len == 0`) an entry sitting exactly at `at` moves only if it
    /// comes after `field` in layout order, so markers and empty blocks ahead of the
    /// insertion keep their position. Entries inside the replaced range are the
    /// caller's responsibility.
    pub fn cascade(&mut self, field: Field, at: usize, old_len: usize, new_len: usize) {
        let delta = new_len as isize - old_len as isize;
        if delta == 0 {
            return;
        }
        let old_end = at + old_len;

        for other in Field::ALL {
            if other == field {
                continue;
            }
            let offset = self.offsets[other as usize];
            if offset == 0 || offset < at {
                continue;
            }
            let moves = if old_len == 0 && offset == at {
                other > field
            } else {
                offset >= old_end
            };
            if moves {
                self.offsets[other as usize] = apply_delta(offset, delta);
            }
        }
    }

    /// Cascade for inserting `len` bits of `field` at `at`; the field's entry is set.
    pub fn insert(&mut self, field: Field, at: usize, len: usize) {
        self.cascade(field, at, 0, len);
        self.set(field, at);
    }

    /// Cascade for removing `len` bits of `field` at `at`; the field's entry is cleared.
    pub fn remove(&mut self, field: Field, at: usize, len: usize) {
        self.cascade(field, at, len, 0);
        self.clear(field);
    }
}

fn apply_delta(offset: usize, delta: isize) -> usize {
    if delta >= 0 {
        offset + delta as usize
    } else {
        offset.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> OffsetTable {
        let mut table = OffsetTable::new();
        table.set(Field::Flags, 16);
        table.set(Field::Quality, 150);
        table.set(Field::QualityAttributes, 154);
        table.set(Field::RunewordMarker, 176);
        table.set(Field::PersonalizationMarker, 176);
        table.set(Field::RealmData, 176);
        table.set(Field::SocketCountMarker, 220);
        table.set(Field::MagicProperties, 220);
        table.set(Field::EndOfItem, 240);
        table
    }

    #[test]
    fn test_field_order() {
        assert_eq!(Field::ALL.len(), Field::COUNT);
        for pair in Field::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        assert_eq!(Field::ALL[Field::EndOfItem as usize], Field::EndOfItem);
    }

    #[test]
    fn test_absent_is_zero() {
        let table = sample();
        assert_eq!(table.get(Field::Runeword), None);
        assert_eq!(table.raw(Field::Runeword), 0);
        assert_eq!(table.get(Field::Quality), Some(150));
        assert_eq!(table.end(), 240);
    }

    #[test]
    fn test_shift_inserts() {
        let mut table = sample();
        table.shift(176, 16);
        assert_eq!(table.raw(Field::QualityAttributes), 154);
        assert_eq!(table.raw(Field::RunewordMarker), 192);
        assert_eq!(table.raw(Field::RealmData), 192);
        assert_eq!(table.raw(Field::EndOfItem), 256);
        assert_eq!(table.raw(Field::Runeword), 0);
    }

    #[test]
    fn test_shift_removes() {
        let mut table = sample();
        table.shift(176, -16);
        assert_eq!(table.raw(Field::Quality), 150);
        assert_eq!(table.raw(Field::MagicProperties), 204);
        assert_eq!(table.end(), 224);
    }

    #[test]
    fn test_cascade_insert_respects_layout_order() {
        let mut table = sample();
        table.insert(Field::Runeword, 176, 16);

        assert_eq!(table.raw(Field::RunewordMarker), 176);
        assert_eq!(table.raw(Field::Runeword), 176);
        assert_eq!(table.raw(Field::PersonalizationMarker), 192);
        assert_eq!(table.raw(Field::RealmData), 192);
        assert_eq!(table.raw(Field::MagicProperties), 236);
        assert_eq!(table.end(), 256);
    }

    #[test]
    fn test_cascade_remove_restores() {
        let original = sample();
        let mut table = original.clone();
        table.insert(Field::Runeword, 176, 16);
        table.remove(Field::Runeword, 176, 16);
        assert_eq!(table, original);
    }

    #[test]
    fn test_cascade_replace_block() {
        let mut table = sample();
        // 22-bit magic block becomes an 88-bit rare block
        table.cascade(Field::QualityAttributes, 154, 22, 88);
        assert_eq!(table.raw(Field::QualityAttributes), 154);
        assert_eq!(table.raw(Field::RunewordMarker), 242);
        assert_eq!(table.end(), 306);
    }

    #[test]
    fn test_cascade_zero_delta_is_noop() {
        let mut table = sample();
        table.cascade(Field::MagicProperties, 220, 9, 9);
        assert_eq!(table, sample());
    }

    #[test]
    fn test_iter_skips_absent() {
        let table = sample();
        let fields: Vec<Field> = table.iter().map(|(f, _)| f).collect();
        assert_eq!(fields.first(), Some(&Field::Flags));
        assert!(!fields.contains(&Field::Runeword));
        assert_eq!(fields.last(), Some(&Field::EndOfItem));
    }

    #[test]
    fn test_markers() {
        assert!(Field::RunewordMarker.is_marker());
        assert_eq!(Field::SocketCountMarker.marked_field(), Some(Field::SocketCount));
        assert!(!Field::Runeword.is_marker());
    }
}
