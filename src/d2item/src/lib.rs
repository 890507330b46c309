//! # d2item
//!
//! Diablo II item record codec - decoding, encoding, editing and migration.
//!
//! This library provides functionality to:
//! - Decode and re-encode single item records for every format from v1.00 to Resurrected
//! - Edit items in place (sockets, runewords, quality, personalization, upgrades)
//! - Manage item collections with grid placement and equipment rules
//! - Export items as labeled trees and convert them between format versions
//!
//! ## Example
//!
//! ```no_run
//! use std::fs;
//! use d2item::{CodecOptions, GameMode, Item, ItemVersion, Registry};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = CodecOptions::default().with_version(ItemVersion::V110);
//! let bytes = fs::read("ring.d2i")?;
//! let mut item = options.decode(&bytes, Registry::builtin())?;
//!
//! println!("{}", item.display_name());
//! item.personalize("Akara")?;
//!
//! // Same item for Resurrected
//! let migrated = item.convert(ItemVersion::V160, GameMode::Expansion)?;
//! fs::write("ring.d2r.d2i", migrated.to_bytes())?;
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod bitstream;
pub mod checksum;
pub mod error;
pub mod format;
pub mod item;
pub mod items;
pub mod location;
pub mod offsets;
pub mod properties;
pub mod quality;
pub mod registry;
pub mod tree;

#[cfg(feature = "wasm")]
pub mod wasm;

#[doc(inline)]
pub use backup::{write_with_backup, BackupError};
#[doc(inline)]
pub use checksum::{checksum, Checksum};
#[doc(inline)]
pub use error::{ItemError, Result};
#[doc(inline)]
pub use format::{GameMode, ItemFormat, ItemVersion};
#[doc(inline)]
pub use item::{Item, ItemBuilder, ItemFields};
#[doc(inline)]
pub use items::{ItemHandle, Items, Owner, Page, Placement};
#[doc(inline)]
pub use location::{EquipSlot, Location, Storage};
#[doc(inline)]
pub use properties::MagicalAttribute;
#[doc(inline)]
pub use quality::{Quality, QualityBlock, RareAffixes};
#[doc(inline)]
pub use registry::{CharClass, Registry, RegistryError};
#[doc(inline)]
pub use tree::{TreeError, TreeStyle};

use serde::{Deserialize, Serialize};

/// Defaults for decoding, encoding and tree export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodecOptions {
    pub version: ItemVersion,
    pub mode: GameMode,
    pub style: TreeStyle,
}

impl CodecOptions {
    pub fn with_version(mut self, version: ItemVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_mode(mut self, mode: GameMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_style(mut self, style: TreeStyle) -> Self {
        self.style = style;
        self
    }

    pub fn decode<'r>(&self, bytes: &[u8], registry: &'r Registry) -> Result<Item<'r>> {
        Item::from_bytes(bytes, self.version, self.mode, registry)
    }

    pub fn encode_tree<'r>(
        &self,
        tree: &serde_json::Value,
        registry: &'r Registry,
    ) -> Result<Item<'r>> {
        Item::from_tree(tree, self.style, self.version, self.mode, registry)
    }

    pub fn export(&self, item: &Item<'_>) -> Result<serde_json::Value> {
        item.to_tree(self.style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CodecOptions::default();
        assert_eq!(options.version, ItemVersion::LATEST);
        assert_eq!(options.mode, GameMode::Expansion);
        assert_eq!(options.style, TreeStyle::Snake);
    }

    #[test]
    fn test_options_roundtrip() {
        let options = CodecOptions::default()
            .with_version(ItemVersion::V109)
            .with_mode(GameMode::Classic)
            .with_style(TreeStyle::Pascal);
        let cap = Item::builder("cap", Registry::builtin())
            .version(ItemVersion::V109)
            .mode(GameMode::Classic)
            .build()
            .unwrap();

        let decoded = options.decode(&cap.to_bytes(), Registry::builtin()).unwrap();
        let tree = options.export(&decoded).unwrap();
        assert_eq!(tree["Type"], "cap");
        let encoded = options.encode_tree(&tree, Registry::builtin()).unwrap();
        assert_eq!(encoded.to_bytes(), cap.to_bytes());
    }
}
