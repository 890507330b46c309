//! Type changes (gem/potion grades, base tiers) and durability and stack helpers.

use super::layout;
use super::Item;
use crate::bitstream::BitWriter;
use crate::error::{ItemError, Result};
use crate::offsets::Field;
use crate::properties::MagicalAttribute;
use crate::registry::{ItemCategory, ItemType};

/// Stat that marks an item as indestructible
pub const INDESTRUCTIBLE_STAT: u16 = 152;

/// Durability written by [`Item::max_durability`]
pub const MAX_DURABILITY: u8 = u8::MAX;

/// Two types can share a record when they carry the same optional fields
fn same_shape(a: &ItemType, b: &ItemType) -> bool {
    a.is_armor() == b.is_armor()
        && a.has_durability() == b.has_durability()
        && a.is_stackable() == b.is_stackable()
        && a.is_tome() == b.is_tome()
        && a.is_quest() == b.is_quest()
        && a.compact == b.compact
}

impl<'r> Item<'r> {
    /// Rewrite the item code, keeping every other field.
    ///
    /// The new type must have the same record shape as the old one.
    pub fn change_code(&mut self, code: &str) -> Result<()> {
        let current = self
            .item_type()
            .ok_or_else(|| ItemError::UnknownItemCode(self.code.clone()))?;
        let target = self
            .registry
            .item_type(code)
            .ok_or_else(|| ItemError::UnknownItemCode(code.to_string()))?;
        if !same_shape(current, target) {
            return Err(ItemError::precondition(format!(
                "'{}' and '{}' have different record layouts",
                current.code, target.code
            )));
        }
        if target.expansion && !self.mode.is_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                format!("expansion item '{}' in a classic game", target.code),
                self.version().name(),
            ));
        }
        self.atomically("change code", |item| item.write_code(&target.code))
    }

    fn write_code(&mut self, code: &str) -> Result<()> {
        let at = self.require(Field::TypeCode)?;
        let old_len = self.format.code_bits(&self.code, self.registry)?;
        let mut writer = BitWriter::new();
        self.format.write_code(&mut writer, code, self.registry)?;
        let (content, new_len) = writer.finish();
        self.splice(Field::TypeCode, at, old_len, &content, new_len)?;

        tracing::debug!(from = %self.code, to = code, "changed item code");
        self.code = code.to_string();
        Ok(())
    }

    /// Follow the type's upgrade links to the last grade. Returns whether the code changed.
    fn upgrade_chain(&mut self, accepts: impl Fn(ItemCategory) -> bool) -> Result<bool> {
        let Some(item_type) = self.item_type() else {
            return Ok(false);
        };
        if !accepts(item_type.category) {
            return Err(ItemError::precondition(format!(
                "'{}' cannot be upgraded this way",
                self.code
            )));
        }
        let mut top = item_type;
        while let Some(next) = top.upgrade.as_deref().and_then(|c| self.registry.item_type(c)) {
            top = next;
        }
        if top.code == item_type.code {
            return Ok(false);
        }
        self.change_code(&top.code)?;
        Ok(true)
    }

    /// Turn a gem into the perfect gem of its color
    pub fn upgrade_gem(&mut self) -> Result<bool> {
        self.upgrade_chain(|c| c == ItemCategory::Gem)
    }

    /// Turn a healing or mana potion into the super potion of its kind
    pub fn upgrade_potion(&mut self) -> Result<bool> {
        self.upgrade_chain(|c| matches!(c, ItemCategory::HealingPotion | ItemCategory::ManaPotion))
    }

    pub fn upgrade_rejuvenation(&mut self) -> Result<bool> {
        self.upgrade_chain(|c| c == ItemCategory::RejuvPotion)
    }

    pub fn is_upgradable_gem(&self) -> bool {
        self.upgrade_target(|c| c == ItemCategory::Gem)
    }

    pub fn is_upgradable_potion(&self) -> bool {
        self.upgrade_target(|c| matches!(c, ItemCategory::HealingPotion | ItemCategory::ManaPotion))
    }

    pub fn is_upgradable_rejuvenation(&self) -> bool {
        self.upgrade_target(|c| c == ItemCategory::RejuvPotion)
    }

    fn upgrade_target(&self, accepts: impl Fn(ItemCategory) -> bool) -> bool {
        self.item_type()
            .map(|t| accepts(t.category) && t.upgrade.is_some())
            .unwrap_or(false)
    }

    /// Move the base to the next tier (normal to exceptional to elite).
    ///
    /// Defense and durability are re-derived from the new base. Returns the new code.
    pub fn upgrade_tier(&mut self) -> Result<String> {
        let item_type = self
            .item_type()
            .ok_or_else(|| ItemError::UnknownItemCode(self.code.clone()))?;
        let next = item_type
            .tier()
            .and_then(|tier| tier.next())
            .and_then(|tier| item_type.tier_code(tier))
            .ok_or_else(|| {
                ItemError::precondition(format!("'{}' has no higher tier", self.code))
            })?
            .to_string();
        let target = self
            .registry
            .item_type(&next)
            .ok_or_else(|| ItemError::UnknownItemCode(next.clone()))?;
        if target.expansion && !self.mode.is_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                format!("expansion item '{}' in a classic game", target.code),
                self.version().name(),
            ));
        }

        self.atomically("upgrade tier", |item| {
            item.write_code(&target.code)?;
            if item.offsets.is_present(Field::Defense) {
                item.set_defense(layout::default_defense(target))?;
            }
            if item.offsets.is_present(Field::Durability) && item.max_durability_value() != Some(0) {
                let max = target.durability.unwrap_or(0);
                item.write_max_durability(max)?;
                if max > 0 {
                    item.set_durability(u16::from(max))?;
                }
            }
            Ok(())
        })?;
        Ok(next)
    }

    pub fn can_upgrade_tier(&self) -> bool {
        self.item_type()
            .and_then(|t| t.tier()?.next().and_then(|tier| t.tier_code(tier)))
            .and_then(|code| self.registry.item_type(code))
            .map(|t| !t.expansion || self.mode.is_expansion())
            .unwrap_or(false)
    }

    // ========================================================================
    // Durability and stacks
    // ========================================================================

    /// Has a max durability field with a non-zero value
    pub fn has_durability(&self) -> bool {
        self.max_durability_value().map(|max| max > 0).unwrap_or(false)
    }

    pub fn is_indestructible(&self) -> bool {
        self.max_durability_value() == Some(0)
    }

    /// Restore current durability to the maximum
    pub fn repair(&mut self) -> Result<()> {
        let max = self.max_durability_value().unwrap_or(0);
        if max == 0 {
            return Err(ItemError::precondition(format!(
                "'{}' has no durability to repair",
                self.code
            )));
        }
        self.set_durability(u16::from(max))
    }

    /// Raise max and current durability to the highest storable value
    pub fn max_durability(&mut self) -> Result<()> {
        if !self.has_durability() {
            return Err(ItemError::precondition(format!(
                "'{}' has no durability",
                self.code
            )));
        }
        self.atomically("max durability", |item| {
            item.write_max_durability(MAX_DURABILITY)?;
            item.set_durability(u16::from(MAX_DURABILITY))
        })
    }

    /// Drop durability and add the indestructible stat
    pub fn make_indestructible(&mut self) -> Result<()> {
        self.require(Field::Durability)?;
        if self.is_compact() {
            return Err(ItemError::precondition("compact items have no properties"));
        }
        self.atomically("make indestructible", |item| {
            item.write_max_durability(0)?;
            item.ensure_magic_attribute(MagicalAttribute::new(INDESTRUCTIBLE_STAT, [1]))
        })
    }

    /// Whether the item has a stack below its limit
    pub fn can_fill_stack(&self) -> bool {
        match (self.quantity(), self.item_type()) {
            (Some(quantity), Some(t)) => quantity < t.stack_max,
            _ => false,
        }
    }

    /// Set the stack to the type's limit. Returns the new quantity.
    pub fn fill_stack(&mut self) -> Result<u16> {
        let limit = self
            .item_type()
            .filter(|t| t.is_stackable())
            .map(|t| t.stack_max)
            .ok_or_else(|| ItemError::precondition(format!("'{}' is not stackable", self.code)))?;
        self.set_quantity(limit)
    }
}
