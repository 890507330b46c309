//! Reference data consumed by the codec.
//!
//! Item types, stat metadata, runewords, affixes, set and unique items, and socket
//! filler bonuses. A [`Registry`] is built once and passed by reference; every
//! lookup returns `Option` rather than a sentinel entry.
//!
//! The built-in tables are embedded at compile time from `share/data/*.tsv`.
//! The same files can be loaded from a directory to override them.

mod tables;

pub use tables::RegistryError;

use crate::format::ItemVersion;
use crate::properties::MagicalAttribute;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

// ============================================================================
// Character classes
// ============================================================================

/// Character class, as stored in ear items and class restrictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharClass {
    Amazon,
    Sorceress,
    Necromancer,
    Paladin,
    Barbarian,
    Druid,
    Assassin,
}

impl CharClass {
    pub const ALL: [CharClass; 7] = [
        CharClass::Amazon,
        CharClass::Sorceress,
        CharClass::Necromancer,
        CharClass::Paladin,
        CharClass::Barbarian,
        CharClass::Druid,
        CharClass::Assassin,
    ];

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(usize::from(id)).copied()
    }

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CharClass::Amazon => "amazon",
            CharClass::Sorceress => "sorceress",
            CharClass::Necromancer => "necromancer",
            CharClass::Paladin => "paladin",
            CharClass::Barbarian => "barbarian",
            CharClass::Druid => "druid",
            CharClass::Assassin => "assassin",
        }
    }

    /// Druid and Assassin exist only in the expansion
    pub fn is_expansion(self) -> bool {
        matches!(self, CharClass::Druid | CharClass::Assassin)
    }
}

impl fmt::Display for CharClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CharClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == lower)
            .ok_or_else(|| format!("unknown class '{}'", s))
    }
}

// ============================================================================
// Item types
// ============================================================================

/// Broad item category driving field presence and placement rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Helm,
    Circlet,
    Armor,
    Shield,
    Gloves,
    Boots,
    Belt,
    Sword,
    Axe,
    Mace,
    Wand,
    Staff,
    Polearm,
    Spear,
    Bow,
    Crossbow,
    Dagger,
    Javelin,
    ThrowingKnife,
    Claw,
    Orb,
    Arrows,
    Bolts,
    Ring,
    Amulet,
    Charm,
    Jewel,
    Gem,
    Rune,
    HealingPotion,
    ManaPotion,
    RejuvPotion,
    Tome,
    Scroll,
    Key,
    Quest,
    Misc,
}

impl ItemCategory {
    pub fn from_name(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }

    pub fn is_armor(self) -> bool {
        matches!(
            self,
            ItemCategory::Helm
                | ItemCategory::Circlet
                | ItemCategory::Armor
                | ItemCategory::Shield
                | ItemCategory::Gloves
                | ItemCategory::Boots
                | ItemCategory::Belt
        )
    }

    pub fn is_weapon(self) -> bool {
        matches!(
            self,
            ItemCategory::Sword
                | ItemCategory::Axe
                | ItemCategory::Mace
                | ItemCategory::Wand
                | ItemCategory::Staff
                | ItemCategory::Polearm
                | ItemCategory::Spear
                | ItemCategory::Bow
                | ItemCategory::Crossbow
                | ItemCategory::Dagger
                | ItemCategory::Javelin
                | ItemCategory::ThrowingKnife
                | ItemCategory::Claw
                | ItemCategory::Orb
        )
    }

    pub fn is_missile_weapon(self) -> bool {
        matches!(
            self,
            ItemCategory::Bow
                | ItemCategory::Crossbow
                | ItemCategory::Javelin
                | ItemCategory::ThrowingKnife
        )
    }

    pub fn is_quiver(self) -> bool {
        matches!(self, ItemCategory::Arrows | ItemCategory::Bolts)
    }

    pub fn is_socket_filler(self) -> bool {
        matches!(
            self,
            ItemCategory::Gem | ItemCategory::Rune | ItemCategory::Jewel
        )
    }

    pub fn is_potion(self) -> bool {
        matches!(
            self,
            ItemCategory::HealingPotion | ItemCategory::ManaPotion | ItemCategory::RejuvPotion
        )
    }

    /// Fits in belt slots
    pub fn is_beltable(self) -> bool {
        self.is_potion() || self == ItemCategory::Scroll
    }

    /// Can carry magic, rare or crafted affixes
    pub fn can_be_magic(self) -> bool {
        self.is_armor()
            || self.is_weapon()
            || self.is_quiver()
            || matches!(
                self,
                ItemCategory::Ring
                    | ItemCategory::Amulet
                    | ItemCategory::Charm
                    | ItemCategory::Jewel
            )
    }

    /// Whether this category belongs to a runeword base group.
    ///
    /// Groups are `weapon`, `melee`, `missile`, `helm` (helms and circlets), or a
    /// category name.
    pub fn matches_group(self, group: &str) -> bool {
        match group {
            "weapon" => self.is_weapon(),
            "melee" => self.is_weapon() && !self.is_missile_weapon() && self != ItemCategory::Orb,
            "missile" => self.is_missile_weapon(),
            "helm" => matches!(self, ItemCategory::Helm | ItemCategory::Circlet),
            other => self.name() == other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ItemCategory::Helm => "helm",
            ItemCategory::Circlet => "circlet",
            ItemCategory::Armor => "armor",
            ItemCategory::Shield => "shield",
            ItemCategory::Gloves => "gloves",
            ItemCategory::Boots => "boots",
            ItemCategory::Belt => "belt",
            ItemCategory::Sword => "sword",
            ItemCategory::Axe => "axe",
            ItemCategory::Mace => "mace",
            ItemCategory::Wand => "wand",
            ItemCategory::Staff => "staff",
            ItemCategory::Polearm => "polearm",
            ItemCategory::Spear => "spear",
            ItemCategory::Bow => "bow",
            ItemCategory::Crossbow => "crossbow",
            ItemCategory::Dagger => "dagger",
            ItemCategory::Javelin => "javelin",
            ItemCategory::ThrowingKnife => "throwing_knife",
            ItemCategory::Claw => "claw",
            ItemCategory::Orb => "orb",
            ItemCategory::Arrows => "arrows",
            ItemCategory::Bolts => "bolts",
            ItemCategory::Ring => "ring",
            ItemCategory::Amulet => "amulet",
            ItemCategory::Charm => "charm",
            ItemCategory::Jewel => "jewel",
            ItemCategory::Gem => "gem",
            ItemCategory::Rune => "rune",
            ItemCategory::HealingPotion => "healing_potion",
            ItemCategory::ManaPotion => "mana_potion",
            ItemCategory::RejuvPotion => "rejuv_potion",
            ItemCategory::Tome => "tome",
            ItemCategory::Scroll => "scroll",
            ItemCategory::Key => "key",
            ItemCategory::Quest => "quest",
            ItemCategory::Misc => "misc",
        }
    }
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Base item quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Normal,
    Exceptional,
    Elite,
}

impl Tier {
    pub fn next(self) -> Option<Tier> {
        match self {
            Tier::Normal => Some(Tier::Exceptional),
            Tier::Exceptional => Some(Tier::Elite),
            Tier::Elite => None,
        }
    }
}

/// Inclusive value range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub min: u16,
    pub max: u16,
}

/// Static description of an item type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemType {
    pub code: String,
    /// Numeric code used by v1.00 records
    pub id: u16,
    pub name: String,
    pub category: ItemCategory,
    pub width: u8,
    pub height: u8,
    #[serde(default)]
    pub defense: Option<Range>,
    #[serde(default)]
    pub durability: Option<u8>,
    #[serde(default)]
    pub damage: Option<Range>,
    #[serde(default)]
    pub two_handed_damage: Option<Range>,
    #[serde(default)]
    pub max_sockets: u8,
    #[serde(default)]
    pub required_level: u8,
    #[serde(default)]
    pub required_strength: u16,
    #[serde(default)]
    pub required_dexterity: u16,
    /// Maximum quantity; 0 for non-stackable types
    #[serde(default)]
    pub stack_max: u16,
    #[serde(default)]
    pub expansion: bool,
    #[serde(default)]
    pub two_handed: bool,
    /// Fresh items of this type are compact records
    #[serde(default)]
    pub compact: bool,
    #[serde(default)]
    pub class: Option<CharClass>,
    /// Normal, exceptional and elite codes of this base
    #[serde(default)]
    pub tiers: [Option<String>; 3],
    /// Next grade (gems, potions)
    #[serde(default)]
    pub upgrade: Option<String>,
    #[serde(default)]
    pub belt_rows: u8,
}

impl ItemType {
    pub fn is_armor(&self) -> bool {
        self.category.is_armor()
    }

    pub fn is_weapon(&self) -> bool {
        self.category.is_weapon()
    }

    pub fn is_shield(&self) -> bool {
        self.category == ItemCategory::Shield
    }

    pub fn is_stackable(&self) -> bool {
        self.stack_max > 0
    }

    pub fn is_quest(&self) -> bool {
        self.category == ItemCategory::Quest
    }

    pub fn is_tome(&self) -> bool {
        self.category == ItemCategory::Tome
    }

    pub fn is_socket_filler(&self) -> bool {
        self.category.is_socket_filler()
    }

    pub fn is_rune(&self) -> bool {
        self.category == ItemCategory::Rune
    }

    /// Records of this type carry a max durability field
    pub fn has_durability(&self) -> bool {
        self.is_armor() || self.is_weapon()
    }

    pub fn can_have_sockets(&self) -> bool {
        self.max_sockets > 0
    }

    /// Tier of this base, if it belongs to a tiered family
    pub fn tier(&self) -> Option<Tier> {
        [Tier::Normal, Tier::Exceptional, Tier::Elite]
            .into_iter()
            .zip(&self.tiers)
            .find(|(_, code)| code.as_deref() == Some(self.code.as_str()))
            .map(|(tier, _)| tier)
    }

    /// Code of this base at `tier`
    pub fn tier_code(&self, tier: Tier) -> Option<&str> {
        self.tiers[tier as usize].as_deref()
    }

    /// Damage range used for display: one-handed when present, else two-handed
    pub fn base_damage(&self) -> Option<Range> {
        self.damage.or(self.two_handed_damage)
    }
}

// ============================================================================
// Stats
// ============================================================================

/// Payload layout of a property record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeKind {
    #[default]
    Plain,
    SkillOnEvent,
    ChargedSkill,
    TimeBased,
}

impl EncodeKind {
    /// Numeric encode column value
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 | 1 => Some(EncodeKind::Plain),
            2 => Some(EncodeKind::SkillOnEvent),
            3 => Some(EncodeKind::ChargedSkill),
            4 => Some(EncodeKind::TimeBased),
            _ => None,
        }
    }
}

/// Save metadata of one stat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatDef {
    pub id: u16,
    pub name: String,
    /// Value width
    pub bits: u8,
    /// Bias added to stored values
    pub add: i32,
    #[serde(default)]
    pub param_bits: u8,
    #[serde(default)]
    pub encode: EncodeKind,
    /// Stats whose values follow this one without an id prefix
    #[serde(default)]
    pub chain: Vec<u16>,
    /// Width and bias used by formats before v1.10
    #[serde(default)]
    pub legacy: Option<(u8, i32)>,
    #[serde(default)]
    pub description: String,
}

impl StatDef {
    /// Check the widths agree with the encode kind
    pub fn check_encoding(&self) -> Result<(), String> {
        let (param, bits) = match self.encode {
            EncodeKind::Plain => {
                if self.bits == 0 || self.bits > 32 {
                    return Err(format!("plain stat with {} value bits", self.bits));
                }
                if self.chain.len() > 3 {
                    return Err(format!("{} chained stats", self.chain.len()));
                }
                return Ok(());
            }
            EncodeKind::SkillOnEvent => (16, 7),
            EncodeKind::ChargedSkill => (16, 16),
            EncodeKind::TimeBased => (0, 22),
        };
        if self.param_bits != param || self.bits != bits || !self.chain.is_empty() {
            return Err(format!(
                "{:?} needs {} parameter and {} value bits, table has {} and {}",
                self.encode, param, bits, self.param_bits, self.bits
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Runewords, affixes, set and unique items, socket bonuses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunewordDef {
    pub id: u16,
    pub name: String,
    /// Rune codes in socket order
    pub runes: Vec<String>,
    /// Base groups the runeword can be made in (see [`ItemCategory::matches_group`])
    pub categories: Vec<String>,
    pub min_version: ItemVersion,
    pub properties: Vec<MagicalAttribute>,
}

impl RunewordDef {
    /// Whether `item_type` is a valid base under `version`
    pub fn allows(&self, item_type: &ItemType, version: ItemVersion) -> bool {
        version >= self.min_version
            && self
                .categories
                .iter()
                .any(|group| item_type.category.matches_group(group))
    }

    /// Whether `codes` spells this runeword exactly
    pub fn matches_runes<S: AsRef<str>>(&self, codes: &[S]) -> bool {
        self.runes.len() == codes.len()
            && self
                .runes
                .iter()
                .zip(codes)
                .all(|(rune, code)| rune == code.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffixKind {
    Prefix,
    Suffix,
}

/// Magic prefix or suffix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffixDef {
    pub kind: AffixKind,
    pub id: u16,
    pub name: String,
    pub level: u8,
    pub properties: Vec<MagicalAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetItemDef {
    pub id: u16,
    pub name: String,
    pub set_name: String,
    pub code: String,
    pub level: u8,
    pub properties: Vec<MagicalAttribute>,
    /// Partial set bonus lists, in mask bit order
    #[serde(default)]
    pub bonuses: Vec<Vec<MagicalAttribute>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueDef {
    pub id: u16,
    pub name: String,
    pub code: String,
    pub level: u8,
    pub properties: Vec<MagicalAttribute>,
}

/// Properties a socket filler grants to its host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketBonus {
    pub code: String,
    pub weapon: Vec<MagicalAttribute>,
    pub armor: Vec<MagicalAttribute>,
    pub shield: Vec<MagicalAttribute>,
}

impl SocketBonus {
    /// Bonus list applying to a host of `host` type
    pub fn for_host(&self, host: &ItemType) -> &[MagicalAttribute] {
        if host.is_shield() {
            &self.shield
        } else if host.is_weapon() {
            &self.weapon
        } else {
            &self.armor
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable lookup tables
#[derive(Debug, Clone, Default)]
pub struct Registry {
    item_types: Vec<ItemType>,
    by_code: HashMap<String, usize>,
    by_id: HashMap<u16, usize>,
    stats: BTreeMap<u16, StatDef>,
    runewords: Vec<RunewordDef>,
    magic_prefixes: HashMap<u16, AffixDef>,
    magic_suffixes: HashMap<u16, AffixDef>,
    rare_prefixes: HashMap<u16, String>,
    rare_suffixes: HashMap<u16, String>,
    set_items: HashMap<u16, SetItemDef>,
    uniques: HashMap<u16, UniqueDef>,
    socket_bonuses: HashMap<String, SocketBonus>,
}

static BUILTIN: Lazy<Registry> = Lazy::new(tables::embedded);

/// Entries added on top of a registry (see [`Registry::with_overrides_yaml`])
#[derive(Debug, Default, Deserialize)]
struct Overrides {
    #[serde(default)]
    item_types: Vec<ItemType>,
    #[serde(default)]
    stats: Vec<StatDef>,
    #[serde(default)]
    runewords: Vec<RunewordDef>,
    #[serde(default)]
    set_items: Vec<SetItemDef>,
    #[serde(default)]
    uniques: Vec<UniqueDef>,
}

impl Registry {
    /// Tables embedded in the library
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Load tables from a directory of TSV files named like `share/data`.
    ///
    /// Files missing from the directory fall back to the embedded copies; rows that
    /// fail to parse are errors.
    pub fn from_tsv_dir(dir: impl AsRef<Path>) -> Result<Registry, RegistryError> {
        tables::from_dir(dir.as_ref())
    }

    /// Add or replace entries from a YAML document
    pub fn with_overrides_yaml(mut self, yaml: &str) -> Result<Registry, RegistryError> {
        let overrides: Overrides = serde_yaml::from_str(yaml)?;
        for item_type in overrides.item_types {
            self.insert_item_type(item_type);
        }
        for stat in overrides.stats {
            stat.check_encoding().map_err(|message| RegistryError::Invalid {
                table: "stats".to_string(),
                message: format!("stat {}: {}", stat.id, message),
            })?;
            self.stats.insert(stat.id, stat);
        }
        for runeword in overrides.runewords {
            self.runewords.retain(|r| r.id != runeword.id);
            self.runewords.push(runeword);
        }
        for set_item in overrides.set_items {
            self.set_items.insert(set_item.id, set_item);
        }
        for unique in overrides.uniques {
            self.uniques.insert(unique.id, unique);
        }
        Ok(self)
    }

    fn insert_item_type(&mut self, item_type: ItemType) {
        let code = item_type.code.clone();
        let id = item_type.id;
        let index = match self.by_code.get(&code) {
            Some(&index) => {
                self.by_id.remove(&self.item_types[index].id);
                self.item_types[index] = item_type;
                index
            }
            None => {
                self.item_types.push(item_type);
                self.item_types.len() - 1
            }
        };
        self.by_code.insert(code, index);
        self.by_id.insert(id, index);
    }

    // --- item types ---

    pub fn item_type(&self, code: &str) -> Option<&ItemType> {
        self.by_code
            .get(code.trim_end())
            .map(|&i| &self.item_types[i])
    }

    pub fn item_type_by_id(&self, id: u16) -> Option<&ItemType> {
        self.by_id.get(&id).map(|&i| &self.item_types[i])
    }

    pub fn item_types(&self) -> &[ItemType] {
        &self.item_types
    }

    // --- stats ---

    pub fn stat(&self, id: u16) -> Option<&StatDef> {
        self.stats.get(&id)
    }

    pub fn stats(&self) -> impl Iterator<Item = &StatDef> {
        self.stats.values()
    }

    // --- runewords ---

    pub fn runewords(&self) -> &[RunewordDef] {
        &self.runewords
    }

    pub fn runeword(&self, id: u16) -> Option<&RunewordDef> {
        self.runewords.iter().find(|r| r.id == id)
    }

    pub fn runeword_by_name(&self, name: &str) -> Option<&RunewordDef> {
        self.runewords
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Runeword spelled by `runes` that `item_type` can host under `version`
    pub fn find_runeword<S: AsRef<str>>(
        &self,
        runes: &[S],
        item_type: &ItemType,
        version: ItemVersion,
    ) -> Option<&RunewordDef> {
        self.runewords
            .iter()
            .find(|r| r.matches_runes(runes) && r.allows(item_type, version))
    }

    // --- affixes ---

    pub fn magic_prefix(&self, id: u16) -> Option<&AffixDef> {
        self.magic_prefixes.get(&id)
    }

    pub fn magic_suffix(&self, id: u16) -> Option<&AffixDef> {
        self.magic_suffixes.get(&id)
    }

    pub fn rare_prefix(&self, id: u16) -> Option<&str> {
        self.rare_prefixes.get(&id).map(String::as_str)
    }

    pub fn rare_suffix(&self, id: u16) -> Option<&str> {
        self.rare_suffixes.get(&id).map(String::as_str)
    }

    // --- set and unique items ---

    pub fn set_item(&self, id: u16) -> Option<&SetItemDef> {
        self.set_items.get(&id)
    }

    pub fn unique(&self, id: u16) -> Option<&UniqueDef> {
        self.uniques.get(&id)
    }

    // --- socket fillers ---

    pub fn socket_bonus(&self, code: &str) -> Option<&SocketBonus> {
        self.socket_bonuses.get(code.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_item_types() {
        let registry = Registry::builtin();
        let cap = registry.item_type("cap").unwrap();
        assert_eq!(cap.name, "Cap");
        assert_eq!(cap.category, ItemCategory::Helm);
        assert_eq!((cap.width, cap.height), (2, 2));
        assert_eq!(cap.defense, Some(Range { min: 3, max: 5 }));
        assert_eq!(cap.tier(), Some(Tier::Normal));
        assert_eq!(cap.tier_code(Tier::Elite), Some("uap"));
        assert_eq!(registry.item_type_by_id(cap.id).unwrap().code, "cap");
        assert!(registry.item_type("zzz").is_none());
    }

    #[test]
    fn test_padded_code_lookup() {
        let registry = Registry::builtin();
        assert!(registry.item_type("cap ").is_some());
    }

    #[test]
    fn test_item_type_flags() {
        let registry = Registry::builtin();
        assert!(registry.item_type("key").unwrap().is_stackable());
        assert!(registry.item_type("tbk").unwrap().is_tome());
        assert!(registry.item_type("r01").unwrap().is_socket_filler());
        assert!(registry.item_type("r01").unwrap().expansion);
        assert!(registry.item_type("box").unwrap().is_quest());
        assert!(registry.item_type("sst").unwrap().two_handed);
        assert_eq!(registry.item_type("ob1").unwrap().class, Some(CharClass::Sorceress));
        assert_eq!(registry.item_type("gcv").unwrap().upgrade.as_deref(), Some("gfv"));
        assert_eq!(registry.item_type("hbl").unwrap().belt_rows, 4);
    }

    #[test]
    fn test_every_builtin_stat_is_consistent() {
        let registry = Registry::builtin();
        assert!(registry.stats().count() > 100);
        for stat in registry.stats() {
            assert_eq!(stat.check_encoding(), Ok(()), "stat {}", stat.id);
            for next in &stat.chain {
                assert!(registry.stat(*next).is_some());
            }
        }
    }

    #[test]
    fn test_stat_encoding_check() {
        let mut stat = Registry::builtin().stat(198).unwrap().clone();
        assert_eq!(stat.encode, EncodeKind::SkillOnEvent);
        stat.param_bits = 9;
        assert!(stat.check_encoding().is_err());
    }

    #[test]
    fn test_runeword_lookup() {
        let registry = Registry::builtin();
        let sword = registry.item_type("crs").unwrap();
        let steel = registry
            .find_runeword(&["r03", "r01"], sword, ItemVersion::V110)
            .unwrap();
        assert_eq!(steel.name, "Steel");

        let helm = registry.item_type("cap").unwrap();
        assert!(registry
            .find_runeword(&["r03", "r01"], helm, ItemVersion::V110)
            .is_none());

        // Spirit needs v1.10
        let shield = registry.item_type("kit").unwrap();
        let spirit = ["r07", "r10", "r09", "r11"];
        assert!(registry.find_runeword(&spirit, shield, ItemVersion::V109).is_none());
        assert!(registry.find_runeword(&spirit, shield, ItemVersion::V110).is_some());
    }

    #[test]
    fn test_category_groups() {
        assert!(ItemCategory::Sword.matches_group("melee"));
        assert!(!ItemCategory::Bow.matches_group("melee"));
        assert!(ItemCategory::Circlet.matches_group("helm"));
        assert!(ItemCategory::Polearm.matches_group("polearm"));
        assert!(!ItemCategory::Shield.matches_group("weapon"));
    }

    #[test]
    fn test_affixes_and_names() {
        let registry = Registry::builtin();
        assert_eq!(registry.magic_prefix(1).unwrap().name, "Sturdy");
        assert_eq!(registry.magic_suffix(3).unwrap().name, "of Strength");
        assert_eq!(registry.rare_prefix(1), Some("Beast"));
        assert_eq!(registry.rare_suffix(4), Some("fang"));
        assert_eq!(registry.unique(9).unwrap().name, "The Stone of Jordan");
        assert_eq!(registry.set_item(20).unwrap().code, "skp");
        assert_eq!(registry.set_item(20).unwrap().bonuses.len(), 2);
    }

    #[test]
    fn test_socket_bonus_by_host() {
        let registry = Registry::builtin();
        let ruby = registry.socket_bonus("gpr").unwrap();
        let sword = registry.item_type("lsd").unwrap();
        let shield = registry.item_type("kit").unwrap();
        let helm = registry.item_type("cap").unwrap();
        assert_eq!(ruby.for_host(sword)[0].id, 48);
        assert_eq!(ruby.for_host(shield)[0].id, 39);
        assert_eq!(ruby.for_host(helm)[0].id, 7);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = r#"
item_types:
  - code: "zz1"
    id: 900
    name: "Test Blade"
    category: sword
    width: 1
    height: 3
    damage: { min: 1, max: 2 }
    durability: 10
    max_sockets: 2
"#;
        let registry = Registry::builtin().clone().with_overrides_yaml(yaml).unwrap();
        let blade = registry.item_type("zz1").unwrap();
        assert_eq!(blade.name, "Test Blade");
        assert_eq!(registry.item_type_by_id(900).unwrap().code, "zz1");
        assert!(registry.item_type("cap").is_some());
    }

    #[test]
    fn test_yaml_override_rejects_bad_stat() {
        let yaml = r#"
stats:
  - id: 500
    name: broken
    bits: 7
    add: 0
    encode: charged_skill
"#;
        let result = Registry::builtin().clone().with_overrides_yaml(yaml);
        assert!(matches!(result, Err(RegistryError::Invalid { .. })));
    }

    #[test]
    fn test_char_class() {
        assert_eq!(CharClass::from_id(6), Some(CharClass::Assassin));
        assert_eq!(CharClass::from_id(7), None);
        assert_eq!("Paladin".parse::<CharClass>().unwrap(), CharClass::Paladin);
        assert!(CharClass::Druid.is_expansion());
    }
}
