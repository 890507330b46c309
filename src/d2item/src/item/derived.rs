//! Display-level values computed from the stored fields.
//!
//! These are thin helpers for viewers. They follow the common in-game arithmetic
//! but make no attempt at reproducing every combat formula.

use super::Item;
use crate::properties::MagicalAttribute;
use crate::quality::{InferiorKind, QualityBlock};
use crate::registry::Range;
use std::fmt::Write;

const STAT_ENHANCED_DEFENSE: u16 = 16;
const STAT_ENHANCED_DAMAGE: u16 = 17;
const STAT_MIN_DAMAGE: u16 = 21;
const STAT_MAX_DAMAGE: u16 = 22;
const STAT_DEFENSE: u16 = 31;

const HEX_ROW_BYTES: usize = 16;

fn stat_total(attributes: &[MagicalAttribute], id: u16, index: usize) -> i64 {
    attributes
        .iter()
        .filter(|a| a.id == id)
        .filter_map(|a| a.value(index))
        .sum()
}

fn percent(value: i64, pct: i64) -> i64 {
    value * (100 + pct) / 100
}

impl Item<'_> {
    /// Character level needed to use the item
    pub fn required_level(&self) -> u8 {
        let Some(item_type) = self.item_type() else {
            return 0;
        };
        let mut level = item_type.required_level;

        match self.quality_block() {
            Some(QualityBlock::Magic { prefix, suffix }) => {
                for affix in [
                    self.registry.magic_prefix(prefix),
                    self.registry.magic_suffix(suffix),
                ]
                .into_iter()
                .flatten()
                {
                    level = level.max(affix.level);
                }
            }
            Some(QualityBlock::Rare(affixes))
            | Some(QualityBlock::Crafted(affixes))
            | Some(QualityBlock::Tempered(affixes)) => {
                for &id in affixes.prefixes.iter().flatten() {
                    if let Some(affix) = self.registry.magic_prefix(id) {
                        level = level.max(affix.level);
                    }
                }
                for &id in affixes.suffixes.iter().flatten() {
                    if let Some(affix) = self.registry.magic_suffix(id) {
                        level = level.max(affix.level);
                    }
                }
            }
            Some(QualityBlock::Unique(id)) => {
                if let Some(unique) = self.registry.unique(id) {
                    level = level.max(unique.level);
                }
            }
            Some(QualityBlock::Set(id)) => {
                if let Some(set_item) = self.registry.set_item(id) {
                    level = level.max(set_item.level);
                }
            }
            _ => {}
        }

        self.socketed
            .iter()
            .map(|child| child.required_level())
            .fold(level, u8::max)
    }

    /// Defense after ethereal and defense bonuses
    pub fn displayed_defense(&self) -> Option<i32> {
        let mut defense = i64::from(self.defense()?);
        if self.is_ethereal() {
            defense = defense * 3 / 2;
        }
        let attributes = self.combined_attributes();
        defense = percent(defense, stat_total(attributes, STAT_ENHANCED_DEFENSE, 0));
        defense += stat_total(attributes, STAT_DEFENSE, 0);
        Some(defense as i32)
    }

    /// Damage range after quality, ethereal and damage bonuses
    pub fn displayed_damage(&self) -> Option<Range> {
        let base = self.item_type()?.base_damage()?;
        let mut min = i64::from(base.min);
        let mut max = i64::from(base.max);

        if matches!(self.quality_block(), Some(QualityBlock::Inferior(_))) {
            // integer scaling, truncating
            min = min * 3 / 4;
            max = max * 3 / 4;
        }
        if self.is_ethereal() {
            min = min * 3 / 2;
            max = max * 3 / 2;
        }

        let attributes = self.combined_attributes();
        let enhanced_max = stat_total(attributes, STAT_ENHANCED_DAMAGE, 0);
        let enhanced_min = stat_total(attributes, STAT_ENHANCED_DAMAGE, 1);
        min = percent(min, enhanced_min) + stat_total(attributes, STAT_MIN_DAMAGE, 0);
        max = percent(max, enhanced_max) + stat_total(attributes, STAT_MAX_DAMAGE, 0);

        let clamp = |v: i64| v.clamp(0, i64::from(u16::MAX)) as u16;
        Some(Range {
            min: clamp(min),
            max: clamp(max.max(min + 1)),
        })
    }

    /// Name as shown in game, including affixes and inscriptions
    pub fn display_name(&self) -> String {
        let base = self.name();
        let name = if let Some(runeword) = self.runeword_name() {
            runeword.to_string()
        } else {
            match self.quality_block() {
                Some(QualityBlock::Inferior(kind)) => match InferiorKind::from_raw(kind) {
                    Some(kind) => format!("{} {}", kind.name(), base),
                    None => base.clone(),
                },
                Some(QualityBlock::Superior(_)) => format!("Superior {}", base),
                Some(QualityBlock::Magic { prefix, suffix }) => {
                    let mut name = String::new();
                    if let Some(p) = self.registry.magic_prefix(prefix) {
                        name.push_str(&p.name);
                        name.push(' ');
                    }
                    name.push_str(&base);
                    if let Some(s) = self.registry.magic_suffix(suffix) {
                        name.push(' ');
                        name.push_str(&s.name);
                    }
                    name
                }
                Some(QualityBlock::Rare(affixes))
                | Some(QualityBlock::Crafted(affixes))
                | Some(QualityBlock::Tempered(affixes)) => affixes.name(self.registry),
                Some(QualityBlock::Unique(id)) => self
                    .registry
                    .unique(id)
                    .map(|u| u.name.clone())
                    .unwrap_or_else(|| base.clone()),
                Some(QualityBlock::Set(id)) => self
                    .registry
                    .set_item(id)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| base.clone()),
                Some(QualityBlock::Normal) | None => base.clone(),
            }
        };

        match self.personalized_name() {
            Some(owner) => format!("{}'s {}", owner, name),
            None => name,
        }
    }

    /// Hex dump of the record bytes, 16 per row with bit offsets
    pub fn hex_dump(&self) -> String {
        let mut out = String::new();
        for (row, chunk) in self.record_bytes().chunks(HEX_ROW_BYTES).enumerate() {
            let hex = hex::encode_upper(chunk);
            let spaced: Vec<&str> = (0..hex.len())
                .step_by(2)
                .map(|i| &hex[i..i + 2])
                .collect();
            let _ = writeln!(out, "{:6}  {}", row * HEX_ROW_BYTES * 8, spaced.join(" "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use crate::format::ItemVersion;
    use crate::properties::MagicalAttribute;
    use crate::quality::{QualityBlock, RareAffixes};
    use crate::registry::Registry;
    use crate::Item;

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    #[test]
    fn test_display_names() {
        let magic = Item::builder("cap", registry()).magic(1, 3).build().unwrap();
        assert_eq!(magic.display_name(), "Sturdy Cap of Strength");

        let rare = Item::builder("cap", registry())
            .rare(RareAffixes::new(1, 4))
            .build()
            .unwrap();
        assert_eq!(rare.display_name(), "Beast fang");

        let unique = Item::builder("cap", registry()).unique(2).build().unwrap();
        assert_eq!(unique.display_name(), "Biggin's Bonnet");

        let mut inferior = Item::builder("lsd", registry())
            .quality(QualityBlock::Inferior(1))
            .build()
            .unwrap();
        assert_eq!(inferior.display_name(), "Cracked Long Sword");
        inferior.personalize("Charsi").unwrap();
        assert_eq!(inferior.display_name(), "Charsi's Cracked Long Sword");
    }

    #[test]
    fn test_displayed_defense() {
        let mut cap = Item::builder("cap", registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        assert_eq!(cap.displayed_defense(), Some(5));
        cap.set_magical_attributes(&[
            MagicalAttribute::new(16, [100]),
            MagicalAttribute::new(31, [4]),
        ])
        .unwrap();
        assert_eq!(cap.displayed_defense(), Some(14));
        cap.set_ethereal(true).unwrap();
        assert_eq!(cap.displayed_defense(), Some(18));

        let sword = Item::builder("lsd", registry()).build().unwrap();
        assert_eq!(sword.displayed_defense(), None);
    }

    #[test]
    fn test_inferior_damage_truncates() {
        // base 3-19
        let normal = Item::builder("lsd", registry()).build().unwrap();
        let damage = normal.displayed_damage().unwrap();
        assert_eq!((damage.min, damage.max), (3, 19));

        let inferior = Item::builder("lsd", registry())
            .quality(QualityBlock::Inferior(0))
            .build()
            .unwrap();
        let damage = inferior.displayed_damage().unwrap();
        assert_eq!((damage.min, damage.max), (2, 14));
    }

    #[test]
    fn test_enhanced_damage() {
        let mut sword = Item::builder("lsd", registry()).build().unwrap();
        sword
            .set_magical_attributes(&[
                MagicalAttribute::new(17, [100, 100]),
                MagicalAttribute::new(22, [5]),
            ])
            .unwrap();
        let damage = sword.displayed_damage().unwrap();
        assert_eq!((damage.min, damage.max), (6, 43));
    }

    #[test]
    fn test_required_level() {
        let cap = Item::builder("cap", registry()).build().unwrap();
        assert_eq!(cap.required_level(), 0);
        let magic = Item::builder("cap", registry()).magic(4, 4).build().unwrap();
        assert_eq!(magic.required_level(), 18);
        let xap = Item::builder("xap", registry()).build().unwrap();
        assert_eq!(xap.required_level(), 22);
    }

    #[test]
    fn test_hex_dump() {
        let cap = Item::builder("cap", registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        let dump = cap.hex_dump();
        assert!(dump.starts_with("     0  4A 4D"));
        assert_eq!(dump.lines().count(), cap.record_bytes().len().div_ceil(16));
    }
}
