//! Sockets, socketed children and runewords.

use super::layout::{self, RUNEWORD_BITS};
use super::{flag, Item, RunewordRef};
use crate::bitstream::{BitStore, BitWriter};
use crate::error::{ItemError, Result};
use crate::location::{EquipSlot, Location, Storage};
use crate::offsets::Field;
use crate::properties::encode_list;
use crate::registry::{Registry, RunewordDef};

impl<'r> Item<'r> {
    /// Most sockets the item type allows
    pub fn max_socket_count(&self) -> u8 {
        self.item_type().map(|t| t.max_sockets).unwrap_or(0)
    }

    /// Sockets not yet holding an item
    pub fn empty_sockets(&self) -> usize {
        usize::from(self.total_sockets()).saturating_sub(self.socketed.len())
    }

    /// Set the number of sockets. 0 removes the socket field entirely.
    pub fn set_socket_count(&mut self, count: u8) -> Result<()> {
        if self.is_compact() {
            return Err(ItemError::precondition(format!(
                "compact item '{}' cannot have sockets",
                self.code
            )));
        }
        let max = self.max_socket_count();
        if count > max {
            return Err(ItemError::precondition(format!(
                "'{}' allows at most {} sockets, {} requested",
                self.code, max, count
            )));
        }
        if usize::from(count) < self.socketed.len() {
            return Err(ItemError::SocketsOccupied {
                requested: count,
                occupied: self.socketed.len() as u8,
            });
        }
        self.atomically("set socket count", |item| item.write_socket_count(count))
    }

    fn write_socket_count(&mut self, count: u8) -> Result<()> {
        let present = self.offsets.is_present(Field::SocketCount);
        match (present, count) {
            (false, 0) => Ok(()),
            (true, 0) => {
                self.remove_field(Field::SocketCount, layout::SOCKET_COUNT_BITS)?;
                self.set_flag(flag::SOCKETED, false)
            }
            (true, _) => {
                self.write_fixed(Field::SocketCount, layout::SOCKET_COUNT_BITS, u64::from(count))
            }
            (false, _) => {
                let at = self.require(Field::SocketCountMarker)?;
                let mut writer = BitWriter::new();
                layout::put(&mut writer, layout::SOCKET_COUNT_BITS, u64::from(count), "socket count")?;
                let (content, len) = writer.finish();
                self.insert_field(Field::SocketCount, at, &content, len)?;
                self.set_flag(flag::SOCKETED, true)
            }
        }
    }

    /// Check that `child` could go into the next free socket
    pub fn check_socketable(&self, child: &Item<'_>) -> Result<()> {
        let fits = child
            .item_type()
            .map(|t| t.is_socket_filler())
            .unwrap_or(false);
        if !fits {
            return Err(ItemError::NotSocketable(child.code().to_string()));
        }
        if child.version() != self.version() || child.game_mode() != self.mode {
            return Err(ItemError::precondition(format!(
                "cannot socket a {} {} item into a {} {} item",
                child.version(),
                child.game_mode(),
                self.version(),
                self.mode
            )));
        }
        if self.empty_sockets() == 0 {
            return Err(ItemError::NoFreeSocket);
        }
        Ok(())
    }

    /// Put `child` into the next free socket
    pub fn add_socketed_item(&mut self, mut child: Item<'r>) -> Result<()> {
        self.check_socketable(&child)?;
        let index = self.socketed.len() as u8;
        child.set_location(
            Location::Socketed,
            EquipSlot::None,
            index,
            0,
            Storage::None,
        )?;
        self.atomically("add socketed item", |item| {
            item.write_fixed(
                Field::SocketFillCount,
                item.socket_fill_bits,
                u64::from(index) + 1,
            )
        })?;
        self.socketed.push(child);
        self.invalidate();
        Ok(())
    }

    /// Take every socketed child out into `overflow`, removing the runeword and
    /// the sockets themselves
    pub fn remove_socketed_items(&mut self, overflow: &mut Vec<Item<'r>>) -> Result<()> {
        self.atomically("remove socketed items", |item| {
            if item.is_runeword() {
                item.strip_runeword()?;
            }
            if item.offsets.is_present(Field::SocketFillCount) {
                item.write_fixed(Field::SocketFillCount, item.socket_fill_bits, 0)?;
            }
            item.write_socket_count(0)
        })?;
        let removed = std::mem::take(&mut self.socketed);
        tracing::debug!(code = %self.code, count = removed.len(), "removed socketed items");
        overflow.extend(removed);
        self.invalidate();
        Ok(())
    }

    /// Fill every empty socket with a fresh item of type `code`. Returns how many were added.
    pub fn fill_empty_sockets(&mut self, code: &str) -> Result<usize> {
        let empty = self.empty_sockets();
        if empty == 0 {
            return Ok(0);
        }
        let template = Item::builder(code, self.registry)
            .version(self.version())
            .mode(self.mode)
            .build()?;
        self.check_socketable(&template)?;

        let snapshot = self.clone();
        for _ in 0..empty {
            let mut child = template.clone();
            child.randomize_id().or_else(|e| match e {
                // compact fillers carry no id
                ItemError::Precondition(_) => Ok(()),
                other => Err(other),
            })?;
            if let Err(e) = self.add_socketed_item(child) {
                *self = snapshot;
                return Err(ItemError::Rollback(Box::new(e)));
            }
        }
        Ok(empty)
    }

    // ========================================================================
    // Runewords
    // ========================================================================

    /// The runeword spelled by the socketed fillers, read in socket order.
    ///
    /// This socket sequence is the candidate [`apply_runeword`](Self::apply_runeword)
    /// matches against the registry; the item must be a fully socketed plain
    /// item in an expansion game.
    pub fn spelled_runeword(&self) -> Result<&'r RunewordDef> {
        if self.is_runeword() {
            return Err(ItemError::precondition(format!(
                "'{}' is already a runeword",
                self.code
            )));
        }
        if !self.mode.is_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                "runewords in a classic game".to_string(),
                self.version().name(),
            ));
        }
        if self.is_compact() || !self.quality().is_plain() {
            return Err(ItemError::precondition(format!(
                "a {} item cannot become a runeword",
                self.quality()
            )));
        }
        if self.socketed.is_empty() || self.empty_sockets() > 0 {
            return Err(ItemError::precondition("every socket must be filled"));
        }
        let host = self
            .item_type()
            .ok_or_else(|| ItemError::UnknownItemCode(self.code.clone()))?;
        let registry: &'r Registry = self.registry;
        let runes: Vec<&str> = self.socketed.iter().map(|c| c.code()).collect();
        registry
            .find_runeword(&runes, host, self.version())
            .ok_or(ItemError::RunewordMismatch)
    }

    /// Turn a fully socketed plain item into the runeword its runes spell.
    ///
    /// Returns the runeword id.
    pub fn apply_runeword(&mut self) -> Result<u16> {
        let runeword = self.spelled_runeword()?;
        self.write_runeword(runeword)
    }

    /// Like [`apply_runeword`](Self::apply_runeword), but fails with
    /// [`ItemError::RunewordMismatch`] unless the runes spell `expected`
    pub fn apply_runeword_expecting(&mut self, expected: u16) -> Result<u16> {
        let runeword = self.spelled_runeword()?;
        if runeword.id != expected {
            return Err(ItemError::RunewordMismatch);
        }
        self.write_runeword(runeword)
    }

    fn write_runeword(&mut self, runeword: &RunewordDef) -> Result<u16> {
        let (id, properties) = (runeword.id, runeword.properties.clone());
        self.atomically("apply runeword", |item| {
            item.randomize_id()?;
            item.write_runeword_ref(RunewordRef::new(id))?;
            item.set_flag(flag::RUNEWORD, true)?;

            let (content, len) = encode_list(&properties, item.format, item.registry)?;
            item.write_runeword_list(&content, len)
        })?;
        tracing::debug!(code = %self.code, runeword = id, "applied runeword");
        Ok(id)
    }

    /// Drop the runeword block and its properties, keeping the runes in place
    pub fn remove_runeword(&mut self) -> Result<()> {
        if !self.is_runeword() {
            return Err(ItemError::precondition(format!(
                "'{}' is not a runeword",
                self.code
            )));
        }
        self.atomically("remove runeword", |item| item.strip_runeword())
    }

    fn strip_runeword(&mut self) -> Result<()> {
        if self.offsets.is_present(Field::RunewordProperties) {
            let (at, len) = self.span(Field::RunewordProperties, &[])?;
            self.splice(Field::RunewordProperties, at, len, &BitStore::new(), 0)?;
            self.offsets.clear(Field::RunewordProperties);
        }
        if self.offsets.is_present(Field::Runeword) {
            self.remove_field(Field::Runeword, RUNEWORD_BITS)?;
        }
        self.set_flag(flag::RUNEWORD, false)?;
        self.randomize_id()
    }

    fn write_runeword_ref(&mut self, runeword: RunewordRef) -> Result<()> {
        let mut writer = BitWriter::new();
        layout::put(&mut writer, layout::RUNEWORD_ID_BITS, u64::from(runeword.id), "runeword id")?;
        layout::put(
            &mut writer,
            layout::RUNEWORD_CONSTANT_BITS,
            u64::from(runeword.constant),
            "runeword constant",
        )?;
        let (content, len) = writer.finish();

        match self.offsets.get(Field::Runeword) {
            Some(at) => self.splice(Field::Runeword, at, RUNEWORD_BITS, &content, len),
            None => {
                let at = self.require(Field::RunewordMarker)?;
                self.insert_field(Field::Runeword, at, &content, len)
            }
        }
    }

    fn write_runeword_list(&mut self, content: &BitStore, len: usize) -> Result<()> {
        match self.offsets.get(Field::RunewordProperties) {
            Some(at) => {
                let (_, old_len) = self.span(Field::RunewordProperties, &[])?;
                self.splice(Field::RunewordProperties, at, old_len, content, len)
            }
            None => {
                let at = self.offsets.end();
                self.insert_field(Field::RunewordProperties, at, content, len)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::format::{GameMode, ItemVersion};
    use crate::offsets::Field;
    use crate::registry::Registry;
    use crate::{Item, ItemError, Location};

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    fn sword(sockets: u8) -> Item<'static> {
        let mut item = Item::builder("lsd", registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        item.set_socket_count(sockets).unwrap();
        item
    }

    fn filler(code: &str) -> Item<'static> {
        Item::builder(code, registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap()
    }

    fn reparse<'r>(item: &Item<'r>) -> Item<'r> {
        Item::from_bytes(
            &item.to_bytes(),
            item.version(),
            item.game_mode(),
            item.registry(),
        )
        .unwrap()
    }

    #[test]
    fn test_socket_count_insert_write_remove() {
        let mut item = Item::builder("lsd", registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap();
        let end = item.bit_len();
        let magic = item.offsets().raw(Field::MagicProperties);

        item.set_socket_count(2).unwrap();
        assert!(item.is_socketed());
        assert_eq!(item.bit_len(), end + 4);
        assert_eq!(item.offsets().raw(Field::MagicProperties), magic + 4);
        assert_eq!(item.offsets().raw(Field::SocketCount), magic);

        item.set_socket_count(4).unwrap();
        assert_eq!(item.bit_len(), end + 4);
        assert_eq!(reparse(&item).total_sockets(), 4);

        item.set_socket_count(0).unwrap();
        assert!(!item.is_socketed());
        assert_eq!(item.bit_len(), end);
        assert_eq!(item.offsets().raw(Field::MagicProperties), magic);
    }

    #[test]
    fn test_socket_count_limits() {
        let mut item = sword(1);
        assert!(matches!(
            item.set_socket_count(5),
            Err(ItemError::Precondition(_))
        ));
        item.add_socketed_item(filler("r01")).unwrap();
        assert!(matches!(
            item.set_socket_count(0),
            Err(ItemError::SocketsOccupied { requested: 0, occupied: 1 })
        ));
        assert_eq!(item.total_sockets(), 1);
    }

    #[test]
    fn test_add_socketed_item_rules() {
        let mut item = sword(1);
        assert!(matches!(
            item.add_socketed_item(filler("cap")),
            Err(ItemError::NotSocketable(_))
        ));
        item.add_socketed_item(filler("gcv")).unwrap();
        assert_eq!(item.socket_count_field(), 1);
        assert_eq!(item.socketed_items()[0].location(), Location::Socketed);
        assert!(matches!(
            item.add_socketed_item(filler("gcv")),
            Err(ItemError::NoFreeSocket)
        ));

        let mut other = sword(2);
        let old = Item::builder("gcv", registry())
            .version(ItemVersion::V109)
            .build()
            .unwrap();
        assert!(matches!(
            other.add_socketed_item(old),
            Err(ItemError::Precondition(_))
        ));
    }

    #[test]
    fn test_remove_socketed_items() {
        let mut item = sword(2);
        item.add_socketed_item(filler("r03")).unwrap();
        item.add_socketed_item(filler("r01")).unwrap();
        item.apply_runeword().unwrap();

        let mut overflow = Vec::new();
        item.remove_socketed_items(&mut overflow).unwrap();
        assert_eq!(overflow.len(), 2);
        assert_eq!(item.socket_count_field(), 0);
        assert!(!item.is_socketed());
        assert!(!item.is_runeword());
        assert!(item.socketed_items().is_empty());

        let reparsed = reparse(&item);
        assert_eq!(reparsed.to_bytes(), item.to_bytes());
        assert_eq!(reparsed.offsets(), item.offsets());
    }

    #[test]
    fn test_fill_empty_sockets() {
        let mut item = sword(3);
        item.add_socketed_item(filler("gpv")).unwrap();
        assert_eq!(item.fill_empty_sockets("gcv").unwrap(), 2);
        assert_eq!(item.filled_sockets(), 3);
        assert_eq!(item.socket_count_field(), 3);
        assert_eq!(item.fill_empty_sockets("gcv").unwrap(), 0);

        let mut other = sword(2);
        let before = other.to_bytes();
        assert!(matches!(
            other.fill_empty_sockets("cap"),
            Err(ItemError::NotSocketable(_))
        ));
        assert_eq!(other.to_bytes(), before);
    }

    #[test]
    fn test_apply_and_remove_runeword() {
        let mut item = sword(2);
        let plain = item.bit_len();
        item.add_socketed_item(filler("r03")).unwrap();
        item.add_socketed_item(filler("r01")).unwrap();

        assert_eq!(item.apply_runeword().unwrap(), 20);
        assert!(item.is_runeword());
        assert_eq!(item.runeword_name(), Some("Steel"));
        assert!(item.bit_len() > plain + 16);

        let reparsed = reparse(&item);
        assert_eq!(reparsed.runeword_id(), Some(20));
        assert_eq!(reparsed.runeword_attributes(), item.runeword_attributes());
        assert_eq!(reparsed.offsets(), item.offsets());
        assert!(item.combined_attributes().iter().any(|a| a.id == 93));

        item.remove_runeword().unwrap();
        assert!(!item.is_runeword());
        assert_eq!(item.bit_len(), plain);
        assert_eq!(item.filled_sockets(), 2);
    }

    #[test]
    fn test_apply_expected_runeword() {
        let mut item = sword(2);
        item.add_socketed_item(filler("r03")).unwrap();
        item.add_socketed_item(filler("r01")).unwrap();
        assert_eq!(item.spelled_runeword().unwrap().name, "Steel");

        let before = item.to_bytes();
        assert_eq!(
            item.apply_runeword_expecting(22),
            Err(ItemError::RunewordMismatch)
        );
        assert_eq!(item.to_bytes(), before);
        assert!(!item.is_runeword());

        assert_eq!(item.apply_runeword_expecting(20).unwrap(), 20);
        assert_eq!(item.runeword_name(), Some("Steel"));
        assert!(matches!(
            item.spelled_runeword(),
            Err(ItemError::Precondition(_))
        ));
    }

    #[test]
    fn test_runeword_preconditions() {
        let mut item = sword(2);
        item.add_socketed_item(filler("r01")).unwrap();
        assert!(matches!(item.apply_runeword(), Err(ItemError::Precondition(_))));

        item.add_socketed_item(filler("r03")).unwrap();
        assert!(matches!(item.apply_runeword(), Err(ItemError::RunewordMismatch)));

        let mut plain = sword(0);
        assert!(matches!(plain.remove_runeword(), Err(ItemError::Precondition(_))));

        let before = item.to_bytes();
        assert_eq!(item.spelled_runeword().map(|r| r.id), Err(ItemError::RunewordMismatch));
        assert_eq!(item.to_bytes(), before);

        let mut classic = Item::builder("lsd", registry())
            .version(ItemVersion::V110)
            .mode(GameMode::Classic)
            .build()
            .unwrap();
        assert!(matches!(
            classic.apply_runeword(),
            Err(ItemError::UnsupportedInVersion(..))
        ));
    }
}
