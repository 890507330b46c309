//! In-place edits of an item record.
//!
//! Every edit that changes the record's length goes through [`Item::splice`]:
//!
//! 1. note the current end of the record
//! 2. compute the new end
//! 3. size the buffer for both
//! 4. write the new content at the edit point and copy the old tail after it
//! 5. zero the padding past the new end and cascade the offset table
//!
//! Multi-step edits run inside [`Item::atomically`], which restores the whole item
//! when any step fails. Preconditions are checked before that, so a rejected edit
//! never touches the item.

use super::layout::{self, check_name, write_name};
use super::{flag, Item};
use crate::bitstream::{BitStore, BitWriter};
use crate::error::{ItemError, Result};
use crate::location::{EquipSlot, Location, Storage};
use crate::offsets::Field;
use crate::properties::{self, encode_list, MagicalAttribute};
use crate::quality::{Quality, QualityBlock, RareAffixes};
use crate::registry::Registry;

const POSITION_LIMIT: u8 = 15;

impl<'r> Item<'r> {
    // ========================================================================
    // Primitives
    // ========================================================================

    /// Replace `old_len` bits at `at` with the first `new_len` bits of `content`.
    ///
    /// `field` owns the replaced range; its own offset is left to the caller.
    pub(crate) fn splice(
        &mut self,
        field: Field,
        at: usize,
        old_len: usize,
        content: &BitStore,
        new_len: usize,
    ) -> Result<()> {
        let old_end = self.offsets.end();
        if at + old_len > old_end {
            return Err(ItemError::precondition(format!(
                "edit of {} at bit {} runs past the end of the record",
                field, at
            )));
        }
        let new_end = old_end - old_len + new_len;

        let snapshot = self.data.clone();
        self.data.resize_bits(old_end.max(new_end));
        let copied = self
            .data
            .copy_from(at, content, 0, new_len)
            .and_then(|_| {
                self.data
                    .copy_from(at + new_len, &snapshot, at + old_len, old_end - at - old_len)
            });
        if let Err(e) = copied {
            self.data = snapshot;
            return Err(e.into());
        }
        self.data.zero_tail(new_end);
        self.offsets.cascade(field, at, old_len, new_len);
        self.invalidate();

        tracing::trace!(
            field = field.name(),
            at,
            old_len,
            new_len,
            end = new_end,
            "spliced record"
        );
        Ok(())
    }

    /// Insert `field` with `len` bits of `content` at `at`
    pub(crate) fn insert_field(
        &mut self,
        field: Field,
        at: usize,
        content: &BitStore,
        len: usize,
    ) -> Result<()> {
        self.splice(field, at, 0, content, len)?;
        self.offsets.set(field, at);
        Ok(())
    }

    /// Remove `len` bits of `field`
    pub(crate) fn remove_field(&mut self, field: Field, len: usize) -> Result<()> {
        let at = self.require(field)?;
        self.splice(field, at, len, &BitStore::new(), 0)?;
        self.offsets.clear(field);
        Ok(())
    }

    /// Offset of `field`, or a precondition error naming it
    pub(crate) fn require(&self, field: Field) -> Result<usize> {
        self.offsets.get(field).ok_or_else(|| {
            ItemError::precondition(format!("'{}' has no {} field", self.code, field))
        })
    }

    /// Overwrite a fixed-width field in place
    pub(crate) fn write_fixed(&mut self, field: Field, bits: usize, value: u64) -> Result<()> {
        let at = self.require(field)?;
        let max = (1u64 << bits) - 1;
        if value > max {
            return Err(ItemError::OutOfRange {
                field: field.name(),
                value,
                max,
            });
        }
        self.data.write(at, bits, value)?;
        self.invalidate();
        Ok(())
    }

    pub(crate) fn set_flag(&mut self, mask: u32, on: bool) -> Result<()> {
        let flags = if on {
            self.flags() | mask
        } else {
            self.flags() & !mask
        };
        self.data
            .write(self.flags_offset(), layout::FLAGS_BITS, u64::from(flags))?;
        Ok(())
    }

    /// Bits from `field` to the first present field among `until`
    pub(crate) fn span(&self, field: Field, until: &[Field]) -> Result<(usize, usize)> {
        let start = self.require(field)?;
        let end = until
            .iter()
            .find_map(|&f| self.offsets.get(f))
            .unwrap_or_else(|| self.offsets.end());
        Ok((start, end.saturating_sub(start)))
    }

    /// Run a multi-step edit, restoring the item if any step fails.
    ///
    /// The returned error is [`ItemError::Rollback`] wrapping the failing step's error.
    pub(crate) fn atomically<T>(
        &mut self,
        operation: &'static str,
        edit: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let snapshot = self.clone();
        match edit(self) {
            Ok(value) => {
                self.invalidate();
                Ok(value)
            }
            Err(e) => {
                *self = snapshot;
                tracing::warn!(operation, code = %self.code, error = %e, "edit failed, item restored");
                Err(match e {
                    ItemError::Rollback(_) => e,
                    other => ItemError::Rollback(Box::new(other)),
                })
            }
        }
    }

    fn require_extended(&self, operation: &str) -> Result<()> {
        if self.is_compact() {
            return Err(ItemError::precondition(format!(
                "cannot {} compact item '{}'",
                operation, self.code
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Fixed-width setters
    // ========================================================================

    pub fn set_identified(&mut self, identified: bool) -> Result<()> {
        self.set_flag(flag::IDENTIFIED, identified)
    }

    pub fn set_ethereal(&mut self, ethereal: bool) -> Result<()> {
        self.require_extended("make ethereal")?;
        self.set_flag(flag::ETHEREAL, ethereal)
    }

    pub fn set_level(&mut self, level: u8) -> Result<()> {
        self.write_fixed(Field::Level, layout::LEVEL_BITS, u64::from(level))
    }

    pub fn set_id(&mut self, id: u32) -> Result<()> {
        self.write_fixed(Field::ItemId, layout::ID_BITS, u64::from(id))
    }

    pub(crate) fn randomize_id(&mut self) -> Result<()> {
        self.set_id(rand::random())
    }

    /// Set the stack size, clamped to the type's limit. Returns the stored value.
    pub fn set_quantity(&mut self, quantity: u16) -> Result<u16> {
        let limit = self.item_type().map(|t| t.stack_max).unwrap_or(0);
        let quantity = quantity.min(limit);
        self.write_fixed(Field::Stackable, layout::QUANTITY_BITS, u64::from(quantity))?;
        Ok(quantity)
    }

    /// Set the displayed defense rating
    pub fn set_defense(&mut self, defense: i32) -> Result<()> {
        let bits = self.format.defense_bits();
        let raw = layout::biased(defense, bits, "defense")?;
        self.write_fixed(Field::Defense, bits, raw)
    }

    pub fn set_durability(&mut self, durability: u16) -> Result<()> {
        self.write_fixed(
            Field::CurrentDurability,
            self.format.current_durability_bits(),
            u64::from(durability),
        )
    }

    /// Set max durability; 0 makes the item indestructible and drops the current
    /// durability field, which comes back when max durability is raised again.
    pub fn set_max_durability(&mut self, max: u8) -> Result<()> {
        self.require(Field::Durability)?;
        self.atomically("set max durability", |item| item.write_max_durability(max))
    }

    pub(crate) fn write_max_durability(&mut self, max: u8) -> Result<()> {
        let old = self.max_durability_value().unwrap_or(0);
        let at = self.require(Field::Durability)?;
        let current_bits = self.format.current_durability_bits();

        match (old, max) {
            (0, 0) => {}
            (0, _) => {
                let mut writer = BitWriter::new();
                writer.write(current_bits, u64::from(max))?;
                let (content, len) = writer.finish();
                self.insert_field(
                    Field::CurrentDurability,
                    at + layout::MAX_DURABILITY_BITS,
                    &content,
                    len,
                )?;
            }
            (_, 0) => self.remove_field(Field::CurrentDurability, current_bits)?,
            _ => {
                let current = self.durability().unwrap_or(0).min(u16::from(max));
                self.set_durability(current)?;
            }
        }
        self.write_fixed(Field::Durability, layout::MAX_DURABILITY_BITS, u64::from(max))
    }

    /// Move the item: location, equip slot, column, row and storage page
    pub fn set_location(
        &mut self,
        location: Location,
        slot: EquipSlot,
        x: u8,
        y: u8,
        storage: Storage,
    ) -> Result<()> {
        for (name, value) in [("x", x), ("y", y)] {
            if value > POSITION_LIMIT {
                return Err(ItemError::OutOfRange {
                    field: name,
                    value: u64::from(value),
                    max: u64::from(POSITION_LIMIT),
                });
            }
        }
        if slot.is_expansion() && !self.mode.is_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                format!("equip slot {}", slot),
                self.version().name(),
            ));
        }
        self.write_fixed(Field::Location, 3, u64::from(location.raw()))?;
        self.write_fixed(Field::EquipId, 4, u64::from(slot.raw()))?;
        self.write_fixed(Field::PositionX, 4, u64::from(x))?;
        self.write_fixed(Field::PositionY, 4, u64::from(y))?;
        self.write_fixed(Field::AltPosition, 3, u64::from(storage.raw()))
    }

    // ========================================================================
    // Property lists
    // ========================================================================

    /// Replace the magic attribute list
    pub fn set_magical_attributes(&mut self, attributes: &[MagicalAttribute]) -> Result<()> {
        self.require_extended("set attributes on")?;
        self.atomically("set magical attributes", |item| {
            item.replace_magic_list(attributes)
        })
    }

    pub(crate) fn replace_magic_list(&mut self, attributes: &[MagicalAttribute]) -> Result<()> {
        let (at, old_len) = self.span(
            Field::MagicProperties,
            &[Field::SetBonusProperties, Field::RunewordProperties],
        )?;
        let (content, new_len) = encode_list(attributes, self.format, self.registry)?;
        self.splice(Field::MagicProperties, at, old_len, &content, new_len)
    }

    /// Add one attribute to the magic list unless a record with that id exists
    pub(crate) fn ensure_magic_attribute(&mut self, attribute: MagicalAttribute) -> Result<()> {
        let mut list = self.magic_attributes();
        if list.iter().any(|a| a.id == attribute.id) {
            return Ok(());
        }
        list.push(attribute);
        self.replace_magic_list(&list)
    }

    // ========================================================================
    // Quality
    // ========================================================================

    fn replace_quality_block(&mut self, block: &QualityBlock) -> Result<()> {
        let at = self.require(Field::QualityAttributes)?;
        let old_len = self
            .quality_block()
            .map(|b| b.bit_len())
            .ok_or_else(|| ItemError::precondition("unreadable quality block"))?;

        let mut writer = BitWriter::new();
        block.write(&mut writer)?;
        let (content, new_len) = writer.finish();

        self.splice(Field::QualityAttributes, at, old_len, &content, new_len)?;
        self.write_fixed(
            Field::Quality,
            crate::quality::QUALITY_BITS,
            u64::from(block.quality().raw()),
        )
    }

    /// Drop the set bonus mask and its lists
    fn strip_set_bonuses(&mut self) -> Result<()> {
        if !self.offsets.is_present(Field::BonusBits) {
            return Ok(());
        }
        if self.offsets.is_present(Field::SetBonusProperties) {
            let (at, len) = self.span(
                Field::SetBonusProperties,
                &[Field::RunewordProperties],
            )?;
            self.splice(Field::SetBonusProperties, at, len, &BitStore::new(), 0)?;
            self.offsets.clear(Field::SetBonusProperties);
        }
        self.remove_field(Field::BonusBits, layout::SET_MASK_BITS)
    }

    /// Add an empty set bonus mask and its (empty) list position
    fn install_set_bonuses(&mut self) -> Result<()> {
        if self.offsets.is_present(Field::BonusBits) {
            return Ok(());
        }
        let at = self.require(Field::MagicProperties)?;
        let mut writer = BitWriter::new();
        writer.write(layout::SET_MASK_BITS, 0)?;
        let (content, len) = writer.finish();
        self.insert_field(Field::BonusBits, at, &content, len)?;

        let (_, magic_len) = self.span(Field::MagicProperties, &[Field::RunewordProperties])?;
        let lists_at = self.require(Field::MagicProperties)? + magic_len;
        self.offsets.set(Field::SetBonusProperties, lists_at);
        Ok(())
    }

    /// Restore defense and durability from the item type
    fn reset_base_stats(&mut self) -> Result<()> {
        let Some(item_type) = self.item_type() else {
            return Ok(());
        };
        if self.offsets.is_present(Field::Defense) {
            self.set_defense(layout::default_defense(item_type))?;
        }
        if self.offsets.is_present(Field::Durability) {
            let max = item_type.durability.unwrap_or(0);
            self.write_max_durability(max)?;
            if max > 0 {
                self.set_durability(u16::from(max))?;
            }
        }
        Ok(())
    }

    fn check_can_take_affixes(&self) -> Result<()> {
        self.require_extended("add affixes to")?;
        if self.is_runeword() {
            return Err(ItemError::precondition(
                "a runeword item cannot take magic affixes",
            ));
        }
        let allowed = self
            .item_type()
            .map(|t| t.category.can_be_magic())
            .unwrap_or(false);
        if !allowed {
            return Err(ItemError::precondition(format!(
                "'{}' cannot carry affixes",
                self.code
            )));
        }
        Ok(())
    }

    /// Become a normal item: affixes and set bonuses go, base stats come back
    pub fn to_normal(&mut self) -> Result<()> {
        self.require_extended("change the quality of")?;
        if self.quality() == Quality::Normal {
            return Ok(());
        }
        let clear_affixes = !self.quality().is_plain();
        self.atomically("to normal", |item| {
            item.strip_set_bonuses()?;
            if clear_affixes {
                item.replace_magic_list(&[])?;
            }
            item.replace_quality_block(&QualityBlock::Normal)?;
            item.reset_base_stats()
        })
    }

    /// Become superior with the given 3-bit kind
    pub fn to_superior(&mut self, kind: u8) -> Result<()> {
        self.require_extended("change the quality of")?;
        let is_equipment = self
            .item_type()
            .map(|t| t.has_durability())
            .unwrap_or(false);
        if !is_equipment {
            return Err(ItemError::precondition(format!(
                "'{}' cannot be superior",
                self.code
            )));
        }
        let clear_affixes = !self.quality().is_plain();
        self.atomically("to superior", |item| {
            item.strip_set_bonuses()?;
            if clear_affixes {
                item.replace_magic_list(&[])?;
            }
            item.replace_quality_block(&QualityBlock::Superior(kind))
        })
    }

    /// Become magic with one prefix and one suffix (0 for none)
    pub fn to_magic(&mut self, prefix: u16, suffix: u16) -> Result<()> {
        self.check_can_take_affixes()?;
        let attributes = magic_affix_attributes(self.registry, &[prefix], &[suffix])?;
        self.atomically("to magic", |item| {
            item.strip_set_bonuses()?;
            item.replace_quality_block(&QualityBlock::Magic { prefix, suffix })?;
            item.replace_magic_list(&attributes)
        })
    }

    pub fn to_rare(&mut self, affixes: RareAffixes) -> Result<()> {
        self.to_rare_like(QualityBlock::Rare(affixes), "to rare")
    }

    pub fn to_crafted(&mut self, affixes: RareAffixes) -> Result<()> {
        self.to_rare_like(QualityBlock::Crafted(affixes), "to crafted")
    }

    fn to_rare_like(&mut self, block: QualityBlock, operation: &'static str) -> Result<()> {
        self.check_can_take_affixes()?;
        let Some(affixes) = block.rare_affixes() else {
            return Err(ItemError::precondition("not a rare-like quality block"));
        };
        if self.registry.rare_prefix(u16::from(affixes.name1)).is_none()
            || self.registry.rare_suffix(u16::from(affixes.name2)).is_none()
        {
            return Err(ItemError::precondition(format!(
                "unknown rare name {}/{}",
                affixes.name1, affixes.name2
            )));
        }
        let prefixes: Vec<u16> = affixes.prefixes.iter().flatten().copied().collect();
        let suffixes: Vec<u16> = affixes.suffixes.iter().flatten().copied().collect();
        let attributes = magic_affix_attributes(self.registry, &prefixes, &suffixes)?;

        self.atomically(operation, |item| {
            item.strip_set_bonuses()?;
            item.replace_quality_block(&block)?;
            item.replace_magic_list(&attributes)
        })
    }

    /// Become the unique item `id`, taking its attributes
    pub fn to_unique(&mut self, id: u16) -> Result<()> {
        self.require_extended("change the quality of")?;
        if self.is_runeword() {
            return Err(ItemError::precondition("a runeword item cannot become unique"));
        }
        let unique = self
            .registry
            .unique(id)
            .ok_or_else(|| ItemError::precondition(format!("unknown unique item {}", id)))?;
        let attributes = unique.properties.clone();
        self.atomically("to unique", |item| {
            item.strip_set_bonuses()?;
            item.replace_quality_block(&QualityBlock::Unique(id))?;
            item.replace_magic_list(&attributes)
        })
    }

    /// Become the set item `id` with no active set bonuses
    pub fn to_set(&mut self, id: u16) -> Result<()> {
        self.require_extended("change the quality of")?;
        if self.is_runeword() {
            return Err(ItemError::precondition("a runeword item cannot become a set item"));
        }
        let set_item = self
            .registry
            .set_item(id)
            .ok_or_else(|| ItemError::precondition(format!("unknown set item {}", id)))?;
        let attributes = set_item.properties.clone();
        self.atomically("to set", |item| {
            item.replace_quality_block(&QualityBlock::Set(id))?;
            item.replace_magic_list(&attributes)?;
            item.install_set_bonuses()
        })
    }

    // ========================================================================
    // Personalization
    // ========================================================================

    /// Inscribe `name` (1 to 15 characters), replacing any existing inscription
    pub fn personalize(&mut self, name: &str) -> Result<()> {
        self.require_extended("personalize")?;
        check_name(name, self.format.char_bits())?;
        self.atomically("personalize", |item| {
            if item.is_personalized() {
                item.remove_personalization()?;
            }
            let at = item.require(Field::PersonalizationMarker)?;
            let mut writer = BitWriter::new();
            write_name(&mut writer, name, item.format.char_bits())?;
            let (content, len) = writer.finish();
            item.insert_field(Field::Personalization, at, &content, len)?;
            item.set_flag(flag::PERSONALIZED, true)
        })
    }

    pub fn unpersonalize(&mut self) -> Result<()> {
        if !self.is_personalized() {
            return Err(ItemError::precondition(format!(
                "'{}' is not personalized",
                self.code
            )));
        }
        self.atomically("unpersonalize", |item| item.remove_personalization())
    }

    fn remove_personalization(&mut self) -> Result<()> {
        let name = self
            .personalized_name()
            .ok_or_else(|| ItemError::precondition("unreadable personalized name"))?;
        let len = (name.chars().count() + 1) * self.format.char_bits();
        self.remove_field(Field::Personalization, len)?;
        self.set_flag(flag::PERSONALIZED, false)
    }
}

/// Attributes granted by magic affixes; id 0 stands for no affix
pub(crate) fn magic_affix_attributes(
    registry: &Registry,
    prefixes: &[u16],
    suffixes: &[u16],
) -> Result<Vec<MagicalAttribute>> {
    let mut lists = Vec::new();
    for &id in prefixes.iter().filter(|&&id| id != 0) {
        let affix = registry
            .magic_prefix(id)
            .ok_or_else(|| ItemError::precondition(format!("unknown magic prefix {}", id)))?;
        lists.push(affix.properties.as_slice());
    }
    for &id in suffixes.iter().filter(|&&id| id != 0) {
        let affix = registry
            .magic_suffix(id)
            .ok_or_else(|| ItemError::precondition(format!("unknown magic suffix {}", id)))?;
        lists.push(affix.properties.as_slice());
    }
    Ok(properties::combine(lists, registry))
}
