use super::layout::default_defense;
use super::mutate::magic_affix_attributes;
use super::{flag, EarAttributes, ExtendedFields, Item, ItemFields};
use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemVersion};
use crate::location::{EquipSlot, Location, Storage};
use crate::properties::MagicalAttribute;
use crate::quality::{QualityBlock, RareAffixes};
use crate::registry::{ItemType, Registry};

const DEFAULT_LEVEL: u8 = 1;

/// Tome of Identify stores 1 in the tome field
const IDENTIFY_TOME: &str = "ibk";

/// Builder for fresh items.
///
/// Unset values come from the item type: base defense, full durability, a stack
/// of one, and the attributes of the chosen affixes, set or unique item.
#[derive(Debug, Clone)]
pub struct ItemBuilder<'r> {
    registry: &'r Registry,
    code: String,
    ear: Option<EarAttributes>,
    version: ItemVersion,
    mode: GameMode,
    id: Option<u32>,
    level: u8,
    quality: QualityBlock,
    identified: bool,
    ethereal: bool,
    location: Location,
    equip_slot: EquipSlot,
    x: u8,
    y: u8,
    storage: Storage,
    quantity: Option<u16>,
    defense: Option<i32>,
    sockets: u8,
    personalized: Option<String>,
    attributes: Option<Vec<MagicalAttribute>>,
}

impl<'r> ItemBuilder<'r> {
    pub fn new(code: &str, registry: &'r Registry) -> Self {
        Self {
            registry,
            code: code.to_string(),
            ear: None,
            version: ItemVersion::LATEST,
            mode: GameMode::default(),
            id: None,
            level: DEFAULT_LEVEL,
            quality: QualityBlock::Normal,
            identified: true,
            ethereal: false,
            location: Location::Stored,
            equip_slot: EquipSlot::None,
            x: 0,
            y: 0,
            storage: Storage::Inventory,
            quantity: None,
            defense: None,
            sockets: 0,
            personalized: None,
            attributes: None,
        }
    }

    /// Builder for an ear taken from a character
    pub fn ear(ear: EarAttributes, registry: &'r Registry) -> Self {
        Self {
            ear: Some(ear),
            ..Self::new("", registry)
        }
    }

    pub fn version(mut self, version: ItemVersion) -> Self {
        self.version = version;
        self
    }

    pub fn mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    pub fn quality(mut self, quality: QualityBlock) -> Self {
        self.quality = quality;
        self
    }

    pub fn magic(self, prefix: u16, suffix: u16) -> Self {
        self.quality(QualityBlock::Magic { prefix, suffix })
    }

    pub fn rare(self, affixes: RareAffixes) -> Self {
        self.quality(QualityBlock::Rare(affixes))
    }

    pub fn crafted(self, affixes: RareAffixes) -> Self {
        self.quality(QualityBlock::Crafted(affixes))
    }

    pub fn set(self, id: u16) -> Self {
        self.quality(QualityBlock::Set(id))
    }

    pub fn unique(self, id: u16) -> Self {
        self.quality(QualityBlock::Unique(id))
    }

    pub fn identified(mut self, identified: bool) -> Self {
        self.identified = identified;
        self
    }

    pub fn ethereal(mut self, ethereal: bool) -> Self {
        self.ethereal = ethereal;
        self
    }

    pub fn location(mut self, location: Location, equip_slot: EquipSlot) -> Self {
        self.location = location;
        self.equip_slot = equip_slot;
        self
    }

    pub fn position(mut self, x: u8, y: u8) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn storage(mut self, storage: Storage) -> Self {
        self.storage = storage;
        self
    }

    pub fn quantity(mut self, quantity: u16) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn defense(mut self, defense: i32) -> Self {
        self.defense = Some(defense);
        self
    }

    pub fn sockets(mut self, sockets: u8) -> Self {
        self.sockets = sockets;
        self
    }

    pub fn personalized(mut self, name: &str) -> Self {
        self.personalized = Some(name.to_string());
        self
    }

    /// Replace the attributes the quality would grant
    pub fn attributes(mut self, attributes: Vec<MagicalAttribute>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Fields the builder describes, without encoding them
    pub fn fields(&self) -> Result<ItemFields> {
        let format = self.version.format();
        let mut flags = format.default_flags();
        if self.identified {
            flags |= flag::IDENTIFIED;
        }
        if self.ethereal {
            flags |= flag::ETHEREAL;
        }
        let mut fields = ItemFields {
            code: self.code.clone(),
            flags,
            header_version: format.header_version_value(self.effective_mode()),
            location: self.location,
            equip_slot: self.equip_slot,
            x: self.x,
            y: self.y,
            storage: self.storage,
            ear: None,
            quest_difficulty: None,
            socketed_count: 0,
            extended: None,
        };

        if let Some(ear) = &self.ear {
            fields.ear = Some(ear.clone());
            return Ok(fields);
        }

        let item_type = self
            .registry
            .item_type(&self.code)
            .ok_or_else(|| ItemError::UnknownItemCode(self.code.clone()))?;
        if format.has_quest_difficulty() && item_type.is_quest() {
            fields.quest_difficulty = Some(0);
        }
        if !item_type.compact {
            fields.extended = Some(self.extended(item_type)?);
        } else if self.quality != QualityBlock::Normal
            || self.sockets > 0
            || self.personalized.is_some()
        {
            return Err(ItemError::precondition(format!(
                "compact item '{}' carries no quality, sockets or name",
                self.code
            )));
        }
        Ok(fields)
    }

    fn effective_mode(&self) -> GameMode {
        if self.version.supports_expansion() {
            self.mode
        } else {
            GameMode::Classic
        }
    }

    fn extended(&self, item_type: &ItemType) -> Result<ExtendedFields> {
        if self.sockets > item_type.max_sockets {
            return Err(ItemError::precondition(format!(
                "'{}' allows at most {} sockets",
                self.code, item_type.max_sockets
            )));
        }

        let max_durability = item_type
            .has_durability()
            .then(|| item_type.durability.unwrap_or(0));
        let quantity = item_type
            .is_stackable()
            .then(|| self.quantity.unwrap_or(1).min(item_type.stack_max));
        let tome = item_type
            .is_tome()
            .then(|| u8::from(item_type.code == IDENTIFY_TOME));

        let attributes = match &self.attributes {
            Some(attributes) => attributes.clone(),
            None => self.quality_attributes()?,
        };
        let is_set = matches!(self.quality, QualityBlock::Set(_));

        Ok(ExtendedFields {
            id: self.id.unwrap_or_else(rand::random),
            level: self.level,
            quality: self.quality.clone(),
            personalized_name: self.personalized.clone(),
            tome,
            defense: item_type
                .is_armor()
                .then(|| self.defense.unwrap_or_else(|| default_defense(item_type))),
            max_durability,
            durability: max_durability.filter(|&m| m > 0).map(u16::from),
            quantity,
            total_sockets: (self.sockets > 0).then_some(self.sockets),
            set_bonus_mask: is_set.then_some(0),
            magic_attributes: attributes,
            ..ExtendedFields::default()
        })
    }

    /// Attributes granted by the chosen quality
    fn quality_attributes(&self) -> Result<Vec<MagicalAttribute>> {
        match &self.quality {
            QualityBlock::Magic { prefix, suffix } => {
                magic_affix_attributes(self.registry, &[*prefix], &[*suffix])
            }
            QualityBlock::Rare(affixes)
            | QualityBlock::Crafted(affixes)
            | QualityBlock::Tempered(affixes) => {
                let prefixes: Vec<u16> = affixes.prefixes.iter().flatten().copied().collect();
                let suffixes: Vec<u16> = affixes.suffixes.iter().flatten().copied().collect();
                magic_affix_attributes(self.registry, &prefixes, &suffixes)
            }
            QualityBlock::Unique(id) => self
                .registry
                .unique(*id)
                .map(|u| u.properties.clone())
                .ok_or_else(|| ItemError::precondition(format!("unknown unique item {}", id))),
            QualityBlock::Set(id) => self
                .registry
                .set_item(*id)
                .map(|s| s.properties.clone())
                .ok_or_else(|| ItemError::precondition(format!("unknown set item {}", id))),
            QualityBlock::Inferior(_) | QualityBlock::Normal | QualityBlock::Superior(_) => {
                Ok(Vec::new())
            }
        }
    }

    pub fn build(self) -> Result<Item<'r>> {
        let fields = self.fields()?;
        let item = Item::from_fields(&fields, self.version, self.mode, self.registry)?;
        tracing::debug!(
            code = %item.code(),
            version = %self.version,
            bits = item.bit_len(),
            "built item"
        );
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offsets::Field;
    use crate::quality::Quality;

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    #[test]
    fn test_defaults_from_item_type() {
        let cap = ItemBuilder::new("cap", registry()).build().unwrap();
        assert_eq!(cap.version(), ItemVersion::LATEST);
        assert_eq!(cap.quality(), Quality::Normal);
        assert_eq!(cap.level(), Some(DEFAULT_LEVEL));
        assert_eq!(cap.defense(), Some(5));
        assert_eq!(cap.durability(), Some(12));
        assert_eq!(cap.storage(), Storage::Inventory);
        assert!(cap.is_identified());

        let tome = ItemBuilder::new("ibk", registry()).build().unwrap();
        assert_eq!(tome.tome(), Some(1));
        assert_eq!(tome.quantity(), Some(1));
    }

    #[test]
    fn test_quality_attributes() {
        let magic = ItemBuilder::new("cap", registry())
            .magic(1, 3)
            .build()
            .unwrap();
        let ids: Vec<u16> = magic.magic_attributes().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![16, 0]);

        let set = ItemBuilder::new("skp", registry()).set(20).build().unwrap();
        assert_eq!(set.set_bonus_mask(), Some(0));
        assert!(set.offsets().is_present(Field::SetBonusProperties));

        assert!(ItemBuilder::new("cap", registry()).unique(999).build().is_err());
        assert!(ItemBuilder::new("cap", registry()).magic(999, 0).build().is_err());
    }

    #[test]
    fn test_explicit_attributes_win() {
        let item = ItemBuilder::new("cap", registry())
            .magic(1, 3)
            .attributes(vec![MagicalAttribute::new(0, [7])])
            .build()
            .unwrap();
        assert_eq!(item.magic_attributes(), vec![MagicalAttribute::new(0, [7])]);
    }

    #[test]
    fn test_compact_items() {
        let gem = ItemBuilder::new("gcv", registry()).build().unwrap();
        assert!(gem.is_compact());
        assert!(gem.has_flag(flag::COMPACT));
        assert!(ItemBuilder::new("gcv", registry()).magic(1, 0).build().is_err());
    }

    #[test]
    fn test_sockets_personalization_and_quantity() {
        let item = ItemBuilder::new("lsd", registry())
            .sockets(3)
            .personalized("Larzuk")
            .build()
            .unwrap();
        assert_eq!(item.total_sockets(), 3);
        assert_eq!(item.personalized_name().as_deref(), Some("Larzuk"));
        assert!(ItemBuilder::new("cap", registry()).sockets(3).build().is_err());

        let arrows = ItemBuilder::new("aqv", registry())
            .quantity(1000)
            .build()
            .unwrap();
        assert_eq!(arrows.quantity(), Some(350));
    }

    #[test]
    fn test_ear() {
        let ear = EarAttributes {
            class: 1,
            level: 80,
            name: "Mephisto".to_string(),
        };
        let item = ItemBuilder::ear(ear.clone(), registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        assert!(item.is_ear());
        assert_eq!(item.ear(), Some(ear));
        assert_eq!(item.name(), "Mephisto's Ear");
    }

    #[test]
    fn test_quest_difficulty_defaults() {
        let cube = ItemBuilder::new("box", registry())
            .version(ItemVersion::V120)
            .build()
            .unwrap();
        assert_eq!(cube.quest_difficulty(), Some(0));
        let cube = ItemBuilder::new("box", registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        assert_eq!(cube.quest_difficulty(), None);
    }

    #[test]
    fn test_unknown_code() {
        assert!(matches!(
            ItemBuilder::new("zzz", registry()).build(),
            Err(ItemError::UnknownItemCode(_))
        ));
    }
}
