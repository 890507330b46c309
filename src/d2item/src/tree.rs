//! Labeled-tree import and export of items.
//!
//! One item maps to one JSON object; socketed children are a nested array. Two
//! key conventions exist, chosen by [`TreeStyle`]:
//!
//! | field | [`SnakeSchema`] | [`PascalSchema`] |
//! |---|---|---|
//! | item code | `type` | `Type` |
//! | identified flag | `identified` | `IsIdentified` |
//! | magic list | `magic_attributes` | `MagicAttributes` |
//! | children | `socketed_items` | `SocketedItems` |
//!
//! Raw flags, header version and realm data are exported too, so a tree carries
//! every bit of the record. Keys that only describe the item (display name,
//! runeword name, attribute descriptions) are ignored on import.

use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemVersion, ALWAYS_ONE_FLAG};
use crate::item::{flag, EarAttributes, ExtendedFields, Item, ItemFields, RunewordRef};
use crate::location::{EquipSlot, Location, Storage};
use crate::properties::MagicalAttribute;
use crate::quality::QualityBlock;
use crate::registry::Registry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Missing or mistyped tree fields
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Tree node is not an object")]
    NotAnObject,

    #[error("Missing field '{0}'")]
    Missing(&'static str),

    #[error("Field '{key}' should be {expected}")]
    WrongType {
        key: &'static str,
        expected: &'static str,
    },

    #[error("Field '{key}' has an invalid value: {detail}")]
    InvalidValue { key: &'static str, detail: String },
}

/// Which key convention a tree uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeStyle {
    #[default]
    Snake,
    Pascal,
}

impl TreeStyle {
    pub fn schema(self) -> &'static dyn TreeSchema {
        match self {
            TreeStyle::Snake => &SnakeSchema,
            TreeStyle::Pascal => &PascalSchema,
        }
    }
}

impl fmt::Display for TreeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TreeStyle::Snake => "snake",
            TreeStyle::Pascal => "pascal",
        })
    }
}

impl FromStr for TreeStyle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "snake" | "snake_case" => Ok(TreeStyle::Snake),
            "pascal" | "pascalcase" => Ok(TreeStyle::Pascal),
            other => Err(format!("unknown tree style '{}'", other)),
        }
    }
}

// ============================================================================
// Keys
// ============================================================================

/// Every key a tree node can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeKey {
    Type,
    Name,
    Version,
    GameMode,
    Flags,
    HeaderVersion,
    Identified,
    Ethereal,
    Starter,
    Socketed,
    Personalized,
    Runeword,
    Compact,
    Location,
    EquipSlot,
    X,
    Y,
    Storage,
    Ear,
    EarClass,
    EarLevel,
    EarName,
    QuestDifficulty,
    Id,
    Level,
    Quality,
    QualityAttributes,
    Graphic,
    AutoAffix,
    RunewordId,
    RunewordConstant,
    RunewordName,
    PersonalizedName,
    Tome,
    RealmData,
    Defense,
    MaxDurability,
    Durability,
    Quantity,
    TotalSockets,
    SetBonusMask,
    MagicAttributes,
    SetAttributes,
    RunewordAttributes,
    SocketedItems,
    AttributeId,
    AttributeValues,
    AttributeDescription,
}

/// Flag bits a tree may set or clear by name
const EDITABLE_FLAGS: [(TreeKey, u32); 3] = [
    (TreeKey::Identified, flag::IDENTIFIED),
    (TreeKey::Ethereal, flag::ETHEREAL),
    (TreeKey::Starter, flag::STARTER),
];

/// Flag bits that follow from the record's parts; exported for reading only
const STRUCTURE_FLAGS: [(TreeKey, u32); 4] = [
    (TreeKey::Socketed, flag::SOCKETED),
    (TreeKey::Personalized, flag::PERSONALIZED),
    (TreeKey::Runeword, flag::RUNEWORD),
    (TreeKey::Compact, flag::COMPACT),
];

/// A decoded tree node: the record's fields and its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub fields: ItemFields,
    pub children: Vec<TreeNode>,
    explicit_header: bool,
    explicit_flags: bool,
}

/// A key convention for item trees.
///
/// Implementors only name the keys; export and import are shared.
pub trait TreeSchema: fmt::Debug + Send + Sync {
    fn key(&self, key: TreeKey) -> &'static str;

    /// Build the tree of `item` and its socketed children
    fn export(&self, item: &Item<'_>) -> Result<Value> {
        let fields = item.fields()?;
        let mut node = Node::new(self);
        node.put(TreeKey::Type, fields.code.as_str());
        node.put(TreeKey::Name, item.display_name());
        node.put(TreeKey::Version, item.version().name());
        node.put(TreeKey::GameMode, item.game_mode().to_string());
        node.put(TreeKey::Flags, fields.flags);
        node.put(TreeKey::HeaderVersion, fields.header_version);
        for (key, mask) in EDITABLE_FLAGS.iter().chain(&STRUCTURE_FLAGS) {
            node.put(*key, fields.flags & mask != 0);
        }
        node.put_json(TreeKey::Location, &fields.location)?;
        node.put_json(TreeKey::EquipSlot, &fields.equip_slot)?;
        node.put(TreeKey::X, fields.x);
        node.put(TreeKey::Y, fields.y);
        node.put_json(TreeKey::Storage, &fields.storage)?;

        if let Some(ear) = &fields.ear {
            let mut ear_node = Node::new(self);
            ear_node.put(TreeKey::EarClass, ear.class);
            ear_node.put(TreeKey::EarLevel, ear.level);
            ear_node.put(TreeKey::EarName, ear.name.as_str());
            node.put(TreeKey::Ear, ear_node.finish());
        }
        node.put_opt(TreeKey::QuestDifficulty, fields.quest_difficulty);
        if let Some(ext) = &fields.extended {
            export_extended(&mut node, ext, item.registry())?;
        }

        let children = item
            .socketed_items()
            .iter()
            .map(|child| self.export(child))
            .collect::<Result<Vec<_>>>()?;
        node.put(TreeKey::SocketedItems, children);
        Ok(node.finish())
    }

    /// Read a tree back into fields, children included
    fn import(&self, tree: &Value) -> Result<TreeNode, TreeError> {
        let r = Reader::new(self, tree)?;

        let ear = match r.object(TreeKey::Ear)? {
            Some(e) => Some(EarAttributes {
                class: e.required(TreeKey::EarClass)?,
                level: e.required(TreeKey::EarLevel)?,
                name: e
                    .string(TreeKey::EarName)?
                    .ok_or(TreeError::Missing(self.key(TreeKey::EarName)))?
                    .to_string(),
            }),
            None => None,
        };
        let code = match (r.string(TreeKey::Type)?, &ear) {
            (Some(code), _) => code.to_string(),
            (None, Some(_)) => String::new(),
            (None, None) => return Err(TreeError::Missing(self.key(TreeKey::Type))),
        };

        let raw_flags: Option<u32> = r.uint(TreeKey::Flags)?;
        let mut flags = raw_flags.unwrap_or(flag::IDENTIFIED);
        for (key, mask) in EDITABLE_FLAGS {
            match r.boolean(key)? {
                Some(true) => flags |= mask,
                Some(false) => flags &= !mask,
                None => {}
            }
        }
        let header_version = r.uint(TreeKey::HeaderVersion)?;

        let extended = if r.has(TreeKey::Id) {
            Some(import_extended(&r)?)
        } else {
            None
        };

        let children = r
            .array(TreeKey::SocketedItems)?
            .iter()
            .map(|child| self.import(child))
            .collect::<Result<Vec<_>, _>>()?;

        let fields = ItemFields {
            code,
            flags,
            header_version: header_version.unwrap_or(0),
            location: r.parse::<Location>(TreeKey::Location)?.unwrap_or_default(),
            equip_slot: r.parse::<EquipSlot>(TreeKey::EquipSlot)?.unwrap_or_default(),
            x: r.uint(TreeKey::X)?.unwrap_or(0),
            y: r.uint(TreeKey::Y)?.unwrap_or(0),
            storage: r.parse::<Storage>(TreeKey::Storage)?.unwrap_or_default(),
            ear,
            quest_difficulty: r.uint(TreeKey::QuestDifficulty)?,
            socketed_count: u8::try_from(children.len()).map_err(|_| TreeError::InvalidValue {
                key: self.key(TreeKey::SocketedItems),
                detail: format!("{} children", children.len()),
            })?,
            extended,
        };
        Ok(TreeNode {
            fields,
            children,
            explicit_header: header_version.is_some(),
            explicit_flags: raw_flags.is_some(),
        })
    }

    /// Format version and game mode a tree says it was exported from
    fn source(&self, tree: &Value) -> (Option<ItemVersion>, Option<GameMode>) {
        let text = |key| {
            tree.get(self.key(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        (
            text(TreeKey::Version).and_then(|v| v.parse().ok()),
            text(TreeKey::GameMode).and_then(|m| m.parse().ok()),
        )
    }
}

/// `snake_case` keys
#[derive(Debug, Clone, Copy, Default)]
pub struct SnakeSchema;

impl TreeSchema for SnakeSchema {
    fn key(&self, key: TreeKey) -> &'static str {
        match key {
            TreeKey::Type => "type",
            TreeKey::Name => "name",
            TreeKey::Version => "version",
            TreeKey::GameMode => "game_mode",
            TreeKey::Flags => "flags",
            TreeKey::HeaderVersion => "header_version",
            TreeKey::Identified => "identified",
            TreeKey::Ethereal => "ethereal",
            TreeKey::Starter => "starter",
            TreeKey::Socketed => "socketed",
            TreeKey::Personalized => "personalized",
            TreeKey::Runeword => "runeword",
            TreeKey::Compact => "compact",
            TreeKey::Location => "location",
            TreeKey::EquipSlot => "equip_slot",
            TreeKey::X => "x",
            TreeKey::Y => "y",
            TreeKey::Storage => "storage",
            TreeKey::Ear => "ear",
            TreeKey::EarClass => "class",
            TreeKey::EarLevel => "level",
            TreeKey::EarName => "name",
            TreeKey::QuestDifficulty => "quest_difficulty",
            TreeKey::Id => "id",
            TreeKey::Level => "level",
            TreeKey::Quality => "quality",
            TreeKey::QualityAttributes => "quality_attributes",
            TreeKey::Graphic => "graphic",
            TreeKey::AutoAffix => "auto_affix",
            TreeKey::RunewordId => "runeword_id",
            TreeKey::RunewordConstant => "runeword_constant",
            TreeKey::RunewordName => "runeword_name",
            TreeKey::PersonalizedName => "personalized_name",
            TreeKey::Tome => "tome",
            TreeKey::RealmData => "realm_data",
            TreeKey::Defense => "defense",
            TreeKey::MaxDurability => "max_durability",
            TreeKey::Durability => "durability",
            TreeKey::Quantity => "quantity",
            TreeKey::TotalSockets => "total_sockets",
            TreeKey::SetBonusMask => "set_bonus_mask",
            TreeKey::MagicAttributes => "magic_attributes",
            TreeKey::SetAttributes => "set_attributes",
            TreeKey::RunewordAttributes => "runeword_attributes",
            TreeKey::SocketedItems => "socketed_items",
            TreeKey::AttributeId => "id",
            TreeKey::AttributeValues => "values",
            TreeKey::AttributeDescription => "description",
        }
    }
}

/// `PascalCase` keys, booleans prefixed with `Is`
#[derive(Debug, Clone, Copy, Default)]
pub struct PascalSchema;

impl TreeSchema for PascalSchema {
    fn key(&self, key: TreeKey) -> &'static str {
        match key {
            TreeKey::Type => "Type",
            TreeKey::Name => "Name",
            TreeKey::Version => "Version",
            TreeKey::GameMode => "GameMode",
            TreeKey::Flags => "Flags",
            TreeKey::HeaderVersion => "HeaderVersion",
            TreeKey::Identified => "IsIdentified",
            TreeKey::Ethereal => "IsEthereal",
            TreeKey::Starter => "IsStarter",
            TreeKey::Socketed => "IsSocketed",
            TreeKey::Personalized => "IsPersonalized",
            TreeKey::Runeword => "IsRuneword",
            TreeKey::Compact => "IsCompact",
            TreeKey::Location => "Location",
            TreeKey::EquipSlot => "EquipSlot",
            TreeKey::X => "PositionX",
            TreeKey::Y => "PositionY",
            TreeKey::Storage => "Storage",
            TreeKey::Ear => "Ear",
            TreeKey::EarClass => "Class",
            TreeKey::EarLevel => "Level",
            TreeKey::EarName => "Name",
            TreeKey::QuestDifficulty => "QuestDifficulty",
            TreeKey::Id => "Id",
            TreeKey::Level => "Level",
            TreeKey::Quality => "Quality",
            TreeKey::QualityAttributes => "QualityAttributes",
            TreeKey::Graphic => "GraphicId",
            TreeKey::AutoAffix => "AutoAffixId",
            TreeKey::RunewordId => "RunewordId",
            TreeKey::RunewordConstant => "RunewordConstant",
            TreeKey::RunewordName => "RunewordName",
            TreeKey::PersonalizedName => "PersonalizedName",
            TreeKey::Tome => "TomeId",
            TreeKey::RealmData => "RealmData",
            TreeKey::Defense => "Defense",
            TreeKey::MaxDurability => "MaxDurability",
            TreeKey::Durability => "Durability",
            TreeKey::Quantity => "Quantity",
            TreeKey::TotalSockets => "TotalSockets",
            TreeKey::SetBonusMask => "SetBonusMask",
            TreeKey::MagicAttributes => "MagicAttributes",
            TreeKey::SetAttributes => "SetAttributes",
            TreeKey::RunewordAttributes => "RunewordAttributes",
            TreeKey::SocketedItems => "SocketedItems",
            TreeKey::AttributeId => "Id",
            TreeKey::AttributeValues => "Values",
            TreeKey::AttributeDescription => "Description",
        }
    }
}

// ============================================================================
// Export helpers
// ============================================================================

struct Node<'a, S: ?Sized> {
    schema: &'a S,
    map: Map<String, Value>,
}

impl<'a, S: TreeSchema + ?Sized> Node<'a, S> {
    fn new(schema: &'a S) -> Self {
        Self {
            schema,
            map: Map::new(),
        }
    }

    fn put(&mut self, key: TreeKey, value: impl Into<Value>) {
        self.map.insert(self.schema.key(key).to_string(), value.into());
    }

    fn put_opt<T: Into<Value>>(&mut self, key: TreeKey, value: Option<T>) {
        if let Some(value) = value {
            self.put(key, value);
        }
    }

    fn put_json<T: Serialize>(&mut self, key: TreeKey, value: &T) -> Result<(), TreeError> {
        let json = serde_json::to_value(value).map_err(|e| TreeError::InvalidValue {
            key: self.schema.key(key),
            detail: e.to_string(),
        })?;
        self.put(key, json);
        Ok(())
    }

    fn finish(self) -> Value {
        Value::Object(self.map)
    }
}

fn attributes_value<S: TreeSchema + ?Sized>(
    schema: &S,
    attributes: &[MagicalAttribute],
    registry: &Registry,
) -> Value {
    let list = attributes
        .iter()
        .map(|attribute| {
            let mut node = Node::new(schema);
            node.put(TreeKey::AttributeId, attribute.id);
            node.put(TreeKey::AttributeValues, attribute.values.clone());
            node.put(TreeKey::AttributeDescription, attribute.description(registry));
            node.finish()
        })
        .collect::<Vec<_>>();
    Value::Array(list)
}

fn export_extended<S: TreeSchema + ?Sized>(
    node: &mut Node<'_, S>,
    ext: &ExtendedFields,
    registry: &Registry,
) -> Result<()> {
    let schema = node.schema;
    node.put(TreeKey::Id, ext.id);
    node.put(TreeKey::Level, ext.level);
    node.put(TreeKey::Quality, ext.quality.quality().name());
    node.put_json(TreeKey::QualityAttributes, &ext.quality)?;
    node.put_opt(TreeKey::Graphic, ext.graphic);
    node.put_opt(TreeKey::AutoAffix, ext.auto_affix);
    if let Some(runeword) = ext.runeword {
        node.put(TreeKey::RunewordId, runeword.id);
        node.put(TreeKey::RunewordConstant, runeword.constant);
        if let Some(def) = registry.runeword(runeword.id) {
            node.put(TreeKey::RunewordName, def.name.as_str());
        }
    }
    node.put_opt(TreeKey::PersonalizedName, ext.personalized_name.as_deref());
    node.put_opt(TreeKey::Tome, ext.tome);
    node.put_opt(TreeKey::RealmData, ext.realm_data.map(|words| words.to_vec()));
    node.put_opt(TreeKey::Defense, ext.defense);
    node.put_opt(TreeKey::MaxDurability, ext.max_durability);
    node.put_opt(TreeKey::Durability, ext.durability);
    node.put_opt(TreeKey::Quantity, ext.quantity);
    node.put_opt(TreeKey::TotalSockets, ext.total_sockets);
    node.put_opt(TreeKey::SetBonusMask, ext.set_bonus_mask);
    node.put(
        TreeKey::MagicAttributes,
        attributes_value(schema, &ext.magic_attributes, registry),
    );
    if !ext.set_attributes.is_empty() {
        let lists = ext
            .set_attributes
            .iter()
            .map(|list| attributes_value(schema, list, registry))
            .collect::<Vec<_>>();
        node.put(TreeKey::SetAttributes, lists);
    }
    if ext.runeword.is_some() {
        node.put(
            TreeKey::RunewordAttributes,
            attributes_value(schema, &ext.runeword_attributes, registry),
        );
    }
    Ok(())
}

// ============================================================================
// Import helpers
// ============================================================================

struct Reader<'a, S: ?Sized> {
    schema: &'a S,
    map: &'a Map<String, Value>,
}

impl<'a, S: TreeSchema + ?Sized> Reader<'a, S> {
    fn new(schema: &'a S, tree: &'a Value) -> Result<Self, TreeError> {
        let map = tree.as_object().ok_or(TreeError::NotAnObject)?;
        Ok(Self { schema, map })
    }

    fn value(&self, key: TreeKey) -> Option<&'a Value> {
        self.map.get(self.schema.key(key)).filter(|v| !v.is_null())
    }

    fn has(&self, key: TreeKey) -> bool {
        self.value(key).is_some()
    }

    fn wrong_type(&self, key: TreeKey, expected: &'static str) -> TreeError {
        TreeError::WrongType {
            key: self.schema.key(key),
            expected,
        }
    }

    fn uint<T: TryFrom<u64>>(&self, key: TreeKey) -> Result<Option<T>, TreeError> {
        let Some(value) = self.value(key) else {
            return Ok(None);
        };
        let raw = value
            .as_u64()
            .ok_or_else(|| self.wrong_type(key, "an unsigned integer"))?;
        T::try_from(raw)
            .map(Some)
            .map_err(|_| TreeError::InvalidValue {
                key: self.schema.key(key),
                detail: format!("{} is out of range", raw),
            })
    }

    fn required<T: TryFrom<u64>>(&self, key: TreeKey) -> Result<T, TreeError> {
        self.uint(key)?
            .ok_or(TreeError::Missing(self.schema.key(key)))
    }

    fn int(&self, key: TreeKey) -> Result<Option<i64>, TreeError> {
        self.value(key)
            .map(|v| v.as_i64().ok_or_else(|| self.wrong_type(key, "an integer")))
            .transpose()
    }

    fn string(&self, key: TreeKey) -> Result<Option<&'a str>, TreeError> {
        self.value(key)
            .map(|v| v.as_str().ok_or_else(|| self.wrong_type(key, "a string")))
            .transpose()
    }

    fn boolean(&self, key: TreeKey) -> Result<Option<bool>, TreeError> {
        self.value(key)
            .map(|v| v.as_bool().ok_or_else(|| self.wrong_type(key, "a boolean")))
            .transpose()
    }

    fn parse<T: DeserializeOwned>(&self, key: TreeKey) -> Result<Option<T>, TreeError> {
        self.value(key)
            .map(|v| {
                serde_json::from_value(v.clone()).map_err(|e| TreeError::InvalidValue {
                    key: self.schema.key(key),
                    detail: e.to_string(),
                })
            })
            .transpose()
    }

    fn array(&self, key: TreeKey) -> Result<&'a [Value], TreeError> {
        match self.value(key) {
            None => Ok(&[]),
            Some(v) => v
                .as_array()
                .map(Vec::as_slice)
                .ok_or_else(|| self.wrong_type(key, "an array")),
        }
    }

    fn object(&self, key: TreeKey) -> Result<Option<Reader<'a, S>>, TreeError> {
        self.value(key)
            .map(|v| Reader::new(self.schema, v).map_err(|_| self.wrong_type(key, "an object")))
            .transpose()
    }

    fn attributes(&self, key: TreeKey) -> Result<Vec<MagicalAttribute>, TreeError> {
        self.array(key)?
            .iter()
            .map(|entry| read_attribute(self.schema, entry, self.schema.key(key)))
            .collect()
    }
}

fn read_attribute<S: TreeSchema + ?Sized>(
    schema: &S,
    entry: &Value,
    list: &'static str,
) -> Result<MagicalAttribute, TreeError> {
    let r = Reader::new(schema, entry).map_err(|_| TreeError::WrongType {
        key: list,
        expected: "a list of attribute objects",
    })?;
    let id: u16 = r.required(TreeKey::AttributeId)?;
    let values = r
        .array(TreeKey::AttributeValues)?
        .iter()
        .map(|v| v.as_i64().ok_or_else(|| r.wrong_type(TreeKey::AttributeValues, "integers")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(MagicalAttribute::new(id, values))
}

fn import_extended<S: TreeSchema + ?Sized>(r: &Reader<'_, S>) -> Result<ExtendedFields, TreeError> {
    let runeword = match r.uint::<u16>(TreeKey::RunewordId)? {
        Some(id) => Some(RunewordRef {
            id,
            constant: r
                .uint(TreeKey::RunewordConstant)?
                .unwrap_or(RunewordRef::CONSTANT),
        }),
        None => None,
    };
    let defense = match r.int(TreeKey::Defense)? {
        Some(d) => Some(i32::try_from(d).map_err(|_| TreeError::InvalidValue {
            key: r.schema.key(TreeKey::Defense),
            detail: format!("{} is out of range", d),
        })?),
        None => None,
    };
    let set_attributes = r
        .array(TreeKey::SetAttributes)?
        .iter()
        .map(|list| {
            list.as_array()
                .ok_or_else(|| r.wrong_type(TreeKey::SetAttributes, "a list of lists"))?
                .iter()
                .map(|entry| read_attribute(r.schema, entry, r.schema.key(TreeKey::SetAttributes)))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ExtendedFields {
        id: r.required(TreeKey::Id)?,
        level: r.required(TreeKey::Level)?,
        quality: r
            .parse::<QualityBlock>(TreeKey::QualityAttributes)?
            .unwrap_or_default(),
        graphic: r.uint(TreeKey::Graphic)?,
        auto_affix: r.uint(TreeKey::AutoAffix)?,
        runeword,
        personalized_name: r.string(TreeKey::PersonalizedName)?.map(str::to_string),
        tome: r.uint(TreeKey::Tome)?,
        realm_data: r.parse::<[u32; 3]>(TreeKey::RealmData)?,
        defense,
        max_durability: r.uint(TreeKey::MaxDurability)?,
        durability: r.uint(TreeKey::Durability)?,
        quantity: r.uint(TreeKey::Quantity)?,
        total_sockets: r.uint(TreeKey::TotalSockets)?,
        set_bonus_mask: r.uint(TreeKey::SetBonusMask)?,
        magic_attributes: r.attributes(TreeKey::MagicAttributes)?,
        set_attributes,
        runeword_attributes: r.attributes(TreeKey::RunewordAttributes)?,
    })
}

// ============================================================================
// Item entry points
// ============================================================================

/// Rewrite version-bound fields for another format. Fails for content the
/// target game cannot hold.
fn retarget(
    fields: &mut ItemFields,
    version: ItemVersion,
    mode: GameMode,
    registry: &Registry,
) -> Result<()> {
    let format = version.format();
    let unsupported = |what: String| ItemError::UnsupportedInVersion(what, version.name());

    fields.header_version = format.header_version_value(mode);
    fields.flags = (fields.flags & !ALWAYS_ONE_FLAG) | format.default_flags();
    if !format.has_quest_difficulty() {
        fields.quest_difficulty = None;
    }

    if !mode.is_expansion() {
        if fields.equip_slot.is_expansion() {
            return Err(unsupported(format!("equip slot {}", fields.equip_slot)));
        }
        if let Some(class) = fields.ear.as_ref().and_then(EarAttributes::char_class) {
            if class.is_expansion() {
                return Err(unsupported(format!("{} ear in a classic game", class)));
            }
        }
    }

    if let Some(ext) = &mut fields.extended {
        if !format.has_realm_data() {
            ext.realm_data = None;
        }
        if let Some(runeword) = ext.runeword {
            if !mode.is_expansion() {
                return Err(unsupported("runewords in a classic game".to_string()));
            }
            let allowed = match (registry.runeword(runeword.id), registry.item_type(&fields.code)) {
                (Some(def), Some(item_type)) => def.allows(item_type, version),
                _ => false,
            };
            if !allowed {
                return Err(unsupported(format!("runeword {}", runeword.id)));
            }
        }
    }
    Ok(())
}

fn build<'r>(
    node: &TreeNode,
    version: ItemVersion,
    mode: GameMode,
    registry: &'r Registry,
    migrate: bool,
) -> Result<Item<'r>> {
    let mode = if version.supports_expansion() {
        mode
    } else {
        GameMode::Classic
    };
    let children = node
        .children
        .iter()
        .map(|child| build(child, version, mode, registry, migrate))
        .collect::<Result<Vec<_>>>()?;

    let mut fields = node.fields.clone();
    if migrate {
        retarget(&mut fields, version, mode, registry)?;
    } else {
        let format = version.format();
        if !node.explicit_header {
            fields.header_version = format.header_version_value(mode);
        }
        if !node.explicit_flags {
            fields.flags |= format.default_flags();
        }
    }
    Item::from_parts(&fields, children, version, mode, registry)
}

impl<'r> Item<'r> {
    /// Labeled tree of this item and its socketed children
    pub fn to_tree(&self, style: TreeStyle) -> Result<Value> {
        style.schema().export(self)
    }

    /// Encode a tree as an item of `version`.
    ///
    /// Raw flags and header version are taken from the tree as given. A tree without
    /// them gets the target format's header version and constant flag bits.
    pub fn from_tree(
        tree: &Value,
        style: TreeStyle,
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        let node = style.schema().import(tree)?;
        build(&node, version, mode, registry, false)
    }

    /// Encode a tree exported from another format, rewriting header version,
    /// format constant flags and fields the target lacks
    pub(crate) fn from_tree_migrating(
        tree: &Value,
        style: TreeStyle,
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        let node = style.schema().import(tree)?;
        build(&node, version, mode, registry, true)
    }
}
