//! WebAssembly bindings over the builtin registry.

use crate::checksum::checksum as rust_checksum;
use crate::format::{GameMode, ItemVersion};
use crate::item::Item as RustItem;
use crate::registry::Registry;
use crate::tree::TreeStyle;
use wasm_bindgen::prelude::*;

fn js_error(context: &str, error: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{}: {}", context, error))
}

fn parse_target(version: &str, mode: &str) -> Result<(ItemVersion, GameMode), JsValue> {
    let version = version
        .parse::<ItemVersion>()
        .map_err(|e| js_error("Bad version", e))?;
    let mode = mode
        .parse::<GameMode>()
        .map_err(|e| js_error("Bad game mode", e))?;
    Ok((version, mode))
}

fn parse_style(style: Option<String>) -> Result<TreeStyle, JsValue> {
    style
        .map(|s| s.parse::<TreeStyle>().map_err(|e| js_error("Bad tree style", e)))
        .transpose()
        .map(Option::unwrap_or_default)
}

/// Checksum of a byte buffer
#[wasm_bindgen(js_name = checksum)]
pub fn checksum(data: &[u8]) -> u32 {
    rust_checksum(data)
}

/// JavaScript-friendly item wrapper
#[wasm_bindgen]
pub struct Item {
    inner: RustItem<'static>,
}

#[wasm_bindgen]
impl Item {
    /// Decode one record, e.g. `new Item(bytes, "v110", "expansion")`
    #[wasm_bindgen(constructor)]
    pub fn new(data: &[u8], version: &str, mode: &str) -> Result<Item, JsValue> {
        let (version, mode) = parse_target(version, mode)?;
        let inner = RustItem::from_bytes(data, version, mode, Registry::builtin())
            .map_err(|e| js_error("Decode failed", e))?;
        Ok(Item { inner })
    }

    /// Build an item from its JSON tree
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(
        json: &str,
        version: &str,
        mode: &str,
        style: Option<String>,
    ) -> Result<Item, JsValue> {
        let (version, mode) = parse_target(version, mode)?;
        let tree: serde_json::Value =
            serde_json::from_str(json).map_err(|e| js_error("Parse failed", e))?;
        let inner =
            RustItem::from_tree(&tree, parse_style(style)?, version, mode, Registry::builtin())
                .map_err(|e| js_error("Encode failed", e))?;
        Ok(Item { inner })
    }

    #[wasm_bindgen(js_name = toBytes)]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.inner.to_bytes()
    }

    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self, style: Option<String>) -> Result<String, JsValue> {
        let tree = self
            .inner
            .to_tree(parse_style(style)?)
            .map_err(|e| js_error("Export failed", e))?;
        serde_json::to_string_pretty(&tree).map_err(|e| js_error("Serialize failed", e))
    }

    /// Re-encode under another version and game mode
    #[wasm_bindgen(js_name = convert)]
    pub fn convert(&self, version: &str, mode: &str) -> Result<Item, JsValue> {
        let (version, mode) = parse_target(version, mode)?;
        let inner = self
            .inner
            .convert(version, mode)
            .map_err(|e| js_error("Convert failed", e))?;
        Ok(Item { inner })
    }

    #[wasm_bindgen(getter)]
    pub fn code(&self) -> String {
        self.inner.code().to_string()
    }

    #[wasm_bindgen(getter, js_name = displayName)]
    pub fn display_name(&self) -> String {
        self.inner.display_name()
    }

    #[wasm_bindgen(js_name = hexDump)]
    pub fn hex_dump(&self) -> String {
        self.inner.hex_dump()
    }

    /// Socketed children as an array of `Item`
    #[wasm_bindgen(js_name = socketedItems)]
    pub fn socketed_items(&self) -> js_sys::Array {
        let array = js_sys::Array::new();
        for child in self.inner.socketed_items() {
            array.push(&JsValue::from(Item {
                inner: child.clone(),
            }));
        }
        array
    }

    #[wasm_bindgen(js_name = setIdentified)]
    pub fn set_identified(&mut self, identified: bool) -> Result<(), JsValue> {
        self.inner
            .set_identified(identified)
            .map_err(|e| js_error("Edit failed", e))
    }

    #[wasm_bindgen(js_name = personalize)]
    pub fn personalize(&mut self, name: &str) -> Result<(), JsValue> {
        self.inner
            .personalize(name)
            .map_err(|e| js_error("Personalize failed", e))
    }

    #[wasm_bindgen(js_name = upgradeTier)]
    pub fn upgrade_tier(&mut self) -> Result<String, JsValue> {
        self.inner
            .upgrade_tier()
            .map_err(|e| js_error("Upgrade failed", e))
    }

    #[wasm_bindgen(js_name = makeIndestructible)]
    pub fn make_indestructible(&mut self) -> Result<(), JsValue> {
        self.inner
            .make_indestructible()
            .map_err(|e| js_error("Edit failed", e))
    }
}
