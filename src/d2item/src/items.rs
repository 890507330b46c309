//! The item collection of one character: inventory, corpses, mercenary and golem.
//!
//! Items live in a generational arena and are addressed by [`ItemHandle`]. The
//! per-page occupancy grids and the equipped-slot index are a cache rebuilt from
//! the items' own location fields; any structural change drops it, so a handle
//! can never point at a moved or removed item.
//!
//! ```
//! use d2item::items::{Items, Page, Placement};
//! use d2item::{GameMode, Item, ItemVersion, Registry};
//!
//! # fn main() -> Result<(), d2item::ItemError> {
//! let registry = Registry::builtin();
//! let mut items = Items::new(ItemVersion::V110, GameMode::Expansion, registry);
//! let cap = Item::builder("cap", registry).version(ItemVersion::V110).build()?;
//! let placement = items.place(cap, Page::Inventory, 0, 0)?;
//! assert!(matches!(placement, Placement::Grid { .. }));
//! assert_eq!(items.free_cells(Page::Inventory), 36);
//! # Ok(())
//! # }
//! ```

mod grid;
mod list;

pub use grid::{belt_cell, belt_index, Grid, Page, BELT_COLUMNS, MAX_BELT_ROWS};
pub use list::{
    read_item_list, write_item_list, CorpseHeader, GOLEM_MARKER, LIST_MARKER, MERCENARY_MARKER,
};

use crate::bitstream::BitReader;
use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemVersion};
use crate::item::{Item, MAX_DURABILITY};
use crate::location::{EquipSlot, Location, Storage};
use crate::registry::{CharClass, ItemCategory, ItemType, Registry};
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::{Entry as SlotEntry, HashMap};
use std::fmt;

// ============================================================================
// Handles
// ============================================================================

/// Stable reference to an item in an [`Items`] collection.
///
/// A handle outlives the item it names only as a dead value: once the item is
/// removed, lookups through the old handle return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemHandle {
    index: u32,
    generation: u32,
}

impl ItemHandle {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Which list of the save an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Character,
    /// Index of the corpse in save order
    Corpse(usize),
    Mercenary,
    Golem,
}

/// Where a placed item ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Grid {
        handle: ItemHandle,
        page: Page,
        x: u8,
        y: u8,
    },
    Belt {
        handle: ItemHandle,
        index: u8,
    },
    /// The item went into a socket of `host` and no longer has a handle
    Socketed { host: ItemHandle },
}

impl Placement {
    pub fn handle(self) -> Option<ItemHandle> {
        match self {
            Placement::Grid { handle, .. } | Placement::Belt { handle, .. } => Some(handle),
            Placement::Socketed { .. } => None,
        }
    }
}

/// The character an item is being equipped on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wearer {
    pub class: Option<CharClass>,
    pub level: u8,
}

fn stale(handle: ItemHandle) -> ItemError {
    ItemError::precondition(format!("item handle {} is stale", handle))
}

/// Grid cells an item covers
fn footprint(item: &Item<'_>) -> (u8, u8) {
    item.item_type()
        .map(|t| (t.width.max(1), t.height.max(1)))
        .unwrap_or((1, 1))
}

fn slot_accepts(slot: EquipSlot, category: ItemCategory) -> bool {
    match slot {
        EquipSlot::None => false,
        EquipSlot::Head => matches!(category, ItemCategory::Helm | ItemCategory::Circlet),
        EquipSlot::Neck => category == ItemCategory::Amulet,
        EquipSlot::Torso => category == ItemCategory::Armor,
        EquipSlot::RightArm
        | EquipSlot::LeftArm
        | EquipSlot::AltRightArm
        | EquipSlot::AltLeftArm => {
            category.is_weapon() || category.is_quiver() || category == ItemCategory::Shield
        }
        EquipSlot::RightRing | EquipSlot::LeftRing => category == ItemCategory::Ring,
        EquipSlot::Belt => category == ItemCategory::Belt,
        EquipSlot::Feet => category == ItemCategory::Boots,
        EquipSlot::Gloves => category == ItemCategory::Gloves,
    }
}

/// Whether two items may share one weapon set
fn hands_compatible(a: &ItemType, b: &ItemType) -> bool {
    use ItemCategory::{Arrows, Bolts, Bow, Crossbow};
    if matches!(
        (a.category, b.category),
        (Bow, Arrows) | (Arrows, Bow) | (Crossbow, Bolts) | (Bolts, Crossbow)
    ) {
        return true;
    }
    if a.two_handed || b.two_handed {
        return false;
    }
    // quivers pair only with their launcher
    if a.category.is_quiver() || b.category.is_quiver() {
        return false;
    }
    !(a.is_shield() && b.is_shield())
}

// ============================================================================
// Layout cache
// ============================================================================

#[derive(Debug, Clone)]
struct Layout {
    grids: [Grid; 4],
    equipped: HashMap<EquipSlot, ItemHandle>,
}

impl Layout {
    fn new(version: ItemVersion, mode: GameMode) -> Self {
        let grid = |page: Page| {
            let (w, h) = page.size(version, mode);
            Grid::new(w, h)
        };
        Self {
            grids: Page::ALL.map(grid),
            equipped: HashMap::new(),
        }
    }

    fn grid(&self, page: Page) -> &Grid {
        &self.grids[page as usize]
    }

    fn grid_mut(&mut self, page: Page) -> &mut Grid {
        &mut self.grids[page as usize]
    }

    fn release(&mut self, handle: ItemHandle) {
        for grid in &mut self.grids {
            grid.release(handle);
        }
        self.equipped.retain(|_, h| *h != handle);
    }
}

enum Target {
    Cell { x: u8, y: u8 },
    Socket(ItemHandle),
}

// ============================================================================
// Items
// ============================================================================

#[derive(Clone)]
struct Entry<'r> {
    generation: u32,
    slot: Option<(Owner, Item<'r>)>,
}

/// Every item of one character save
#[derive(Clone)]
pub struct Items<'r> {
    registry: &'r Registry,
    version: ItemVersion,
    mode: GameMode,
    entries: Vec<Entry<'r>>,
    free: Vec<u32>,
    character: Vec<ItemHandle>,
    corpse_section: bool,
    corpses: Vec<(CorpseHeader, Vec<ItemHandle>)>,
    mercenary_section: bool,
    mercenary: Option<Vec<ItemHandle>>,
    golem_section: bool,
    golem: Option<ItemHandle>,
    layout: OnceCell<Layout>,
}

impl fmt::Debug for Items<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Items")
            .field("version", &self.version)
            .field("mode", &self.mode)
            .field("character", &self.character.len())
            .field("corpses", &self.corpses.len())
            .field("mercenary", &self.mercenary.as_ref().map(Vec::len))
            .field("golem", &self.golem.is_some())
            .finish()
    }
}

impl<'r> Items<'r> {
    /// An empty collection. Mercenary and golem sections exist only in expansion games.
    pub fn new(version: ItemVersion, mode: GameMode, registry: &'r Registry) -> Self {
        let mode = if version.supports_expansion() {
            mode
        } else {
            GameMode::Classic
        };
        let expansion = mode.is_expansion();
        Self {
            registry,
            version,
            mode,
            entries: Vec::new(),
            free: Vec::new(),
            character: Vec::new(),
            corpse_section: true,
            corpses: Vec::new(),
            mercenary_section: expansion,
            mercenary: None,
            golem_section: expansion,
            golem: None,
            layout: OnceCell::new(),
        }
    }

    /// Decode the item sections of a save starting at `bytes[0]`.
    ///
    /// Returns the collection and the number of bytes consumed. Sections after
    /// the character list are read when their marker is present.
    pub fn read(
        bytes: &[u8],
        version: ItemVersion,
        mode: GameMode,
        registry: &'r Registry,
    ) -> Result<(Items<'r>, usize)> {
        let mut items = Items::new(version, mode, registry);
        let mode = items.mode;
        let mut reader = BitReader::new(bytes);

        for item in list::read_item_list(&mut reader, version, mode, registry)? {
            items.push(Owner::Character, item);
        }

        items.corpse_section = list::peek_marker(&reader) == Some(LIST_MARKER);
        if items.corpse_section {
            for (header, corpse) in list::read_corpses(&mut reader, version, mode, registry)? {
                let index = items.corpses.len();
                items.corpses.push((header, Vec::new()));
                for item in corpse {
                    items.push(Owner::Corpse(index), item);
                }
            }
        }

        items.mercenary_section =
            mode.is_expansion() && list::peek_marker(&reader) == Some(MERCENARY_MARKER);
        if items.mercenary_section {
            if let Some(hired) = list::read_mercenary(&mut reader, version, mode, registry)? {
                items.mercenary = Some(Vec::new());
                for item in hired {
                    items.push(Owner::Mercenary, item);
                }
            }
        }

        items.golem_section =
            mode.is_expansion() && list::peek_marker(&reader) == Some(GOLEM_MARKER);
        if items.golem_section {
            if let Some(golem) = list::read_golem(&mut reader, version, mode, registry)? {
                items.push(Owner::Golem, golem);
            }
        }

        reader.align();
        let consumed = reader.position() / 8;
        tracing::debug!(
            items = items.len(),
            corpses = items.corpses.len(),
            consumed,
            "read item sections"
        );
        Ok((items, consumed))
    }

    /// Encode every section this collection carries
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        list::write_item_list(&mut out, self.resolve(&self.character).into_iter())?;
        if self.corpse_section {
            list::write_corpse_count(&mut out, self.corpses.len())?;
            for (header, handles) in &self.corpses {
                list::write_corpse(&mut out, header, self.resolve(handles).into_iter())?;
            }
        }
        if self.mercenary_section {
            let hired = self.mercenary.as_deref().map(|h| self.resolve(h).into_iter());
            list::write_mercenary(&mut out, hired)?;
        }
        if self.golem_section {
            list::write_golem(&mut out, self.golem.and_then(|h| self.get(h)));
        }
        Ok(out)
    }

    fn resolve(&self, handles: &[ItemHandle]) -> Vec<&Item<'r>> {
        handles.iter().filter_map(|&h| self.get(h)).collect()
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn version(&self) -> ItemVersion {
        self.version
    }

    pub fn game_mode(&self) -> GameMode {
        self.mode
    }

    // ------------------------------------------------------------------------
    // Arena
    // ------------------------------------------------------------------------

    fn push(&mut self, owner: Owner, item: Item<'r>) -> ItemHandle {
        let handle = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.slot = Some((owner, item));
                ItemHandle::new(index, entry.generation)
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    generation: 0,
                    slot: Some((owner, item)),
                });
                ItemHandle::new(index, 0)
            }
        };
        match owner {
            Owner::Character => self.character.push(handle),
            Owner::Corpse(index) => {
                if let Some((_, handles)) = self.corpses.get_mut(index) {
                    handles.push(handle);
                }
            }
            Owner::Mercenary => self.mercenary.get_or_insert_with(Vec::new).push(handle),
            Owner::Golem => self.golem = Some(handle),
        }
        if owner == Owner::Character {
            self.layout.take();
        }
        handle
    }

    fn check_compatible(&self, item: &Item<'_>) -> Result<()> {
        if item.version() != self.version || item.game_mode() != self.mode {
            return Err(ItemError::precondition(format!(
                "a {} {} item cannot join a {} {} collection",
                item.version(),
                item.game_mode(),
                self.version,
                self.mode
            )));
        }
        Ok(())
    }

    /// Add an item to `owner`'s list as it is, without moving it.
    ///
    /// Character items that overlap one another are kept but left out of the
    /// placement grids.
    pub fn insert(&mut self, item: Item<'r>, owner: Owner) -> Result<ItemHandle> {
        self.check_compatible(&item)?;
        match owner {
            Owner::Character => {}
            Owner::Corpse(index) if index >= self.corpses.len() => {
                return Err(ItemError::precondition(format!("no corpse {}", index)));
            }
            Owner::Corpse(_) => {}
            Owner::Mercenary if !self.mercenary_section => {
                return Err(ItemError::UnsupportedInVersion(
                    "mercenary items".to_string(),
                    self.version.name(),
                ));
            }
            Owner::Mercenary => {}
            Owner::Golem if !self.golem_section => {
                return Err(ItemError::UnsupportedInVersion(
                    "golem items".to_string(),
                    self.version.name(),
                ));
            }
            Owner::Golem if self.golem.is_some() => {
                return Err(ItemError::precondition("a golem item is already present"));
            }
            Owner::Golem => {}
        }
        Ok(self.push(owner, item))
    }

    /// Take an item out of the collection
    pub fn remove(&mut self, handle: ItemHandle) -> Option<Item<'r>> {
        let entry = self
            .entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation)?;
        let (owner, item) = entry.slot.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(handle.index);

        match owner {
            Owner::Character => self.character.retain(|&h| h != handle),
            Owner::Corpse(index) => {
                if let Some((_, handles)) = self.corpses.get_mut(index) {
                    handles.retain(|&h| h != handle);
                }
            }
            Owner::Mercenary => {
                if let Some(handles) = &mut self.mercenary {
                    handles.retain(|&h| h != handle);
                }
            }
            Owner::Golem => self.golem = None,
        }
        self.layout.take();
        tracing::trace!(%handle, code = %item.code(), "removed item");
        Some(item)
    }

    pub fn get(&self, handle: ItemHandle) -> Option<&Item<'r>> {
        self.entries
            .get(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.slot.as_ref())
            .map(|(_, item)| item)
    }

    /// Mutable access. Edits may move the item, so the placement cache is dropped.
    pub fn get_mut(&mut self, handle: ItemHandle) -> Option<&mut Item<'r>> {
        self.layout.take();
        self.entries
            .get_mut(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.slot.as_mut())
            .map(|(_, item)| item)
    }

    pub fn owner(&self, handle: ItemHandle) -> Option<Owner> {
        self.entries
            .get(handle.index as usize)
            .filter(|e| e.generation == handle.generation)
            .and_then(|e| e.slot.as_ref())
            .map(|(owner, _)| *owner)
    }

    /// Number of top-level items in every section
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemHandle, Owner, &Item<'r>)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, e)| {
            e.slot.as_ref().map(|(owner, item)| {
                (ItemHandle::new(index as u32, e.generation), *owner, item)
            })
        })
    }

    pub fn character_items(&self) -> impl Iterator<Item = (ItemHandle, &Item<'r>)> + '_ {
        self.character
            .iter()
            .filter_map(|&h| self.get(h).map(|item| (h, item)))
    }

    pub fn corpse_count(&self) -> usize {
        self.corpses.len()
    }

    pub fn corpse_header(&self, index: usize) -> Option<&CorpseHeader> {
        self.corpses.get(index).map(|(header, _)| header)
    }

    pub fn corpse_items(&self, index: usize) -> Vec<&Item<'r>> {
        self.corpses
            .get(index)
            .map(|(_, handles)| self.resolve(handles))
            .unwrap_or_default()
    }

    /// Add an empty corpse; returns its index for [`Owner::Corpse`]
    pub fn add_corpse(&mut self, header: CorpseHeader) -> usize {
        self.corpse_section = true;
        self.corpses.push((header, Vec::new()));
        self.corpses.len() - 1
    }

    pub fn mercenary_items(&self) -> Vec<&Item<'r>> {
        self.mercenary
            .as_deref()
            .map(|handles| self.resolve(handles))
            .unwrap_or_default()
    }

    pub fn golem(&self) -> Option<&Item<'r>> {
        self.golem.and_then(|h| self.get(h))
    }

    // ------------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------------

    fn layout(&self) -> &Layout {
        self.layout.get_or_init(|| self.build_layout())
    }

    fn build_layout(&self) -> Layout {
        let mut layout = Layout::new(self.version, self.mode);
        for (handle, item) in self.character_items() {
            let (x, y) = item.position();
            let result = match item.location() {
                Location::Stored => match Page::from_storage(item.storage()) {
                    Some(page) => {
                        let (w, h) = footprint(item);
                        layout.grid_mut(page).occupy(handle, x, y, w, h)
                    }
                    None => Ok(()),
                },
                Location::Belt => {
                    let (column, row) = belt_cell(x);
                    layout.grid_mut(Page::Belt).occupy(handle, column, row, 1, 1)
                }
                Location::Equipped => match layout.equipped.entry(item.equip_slot()) {
                    SlotEntry::Occupied(_) => Err(ItemError::precondition(format!(
                        "slot {} is taken twice",
                        item.equip_slot()
                    ))),
                    SlotEntry::Vacant(slot) => {
                        slot.insert(handle);
                        Ok(())
                    }
                },
                _ => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!(
                    %handle,
                    code = %item.code(),
                    error = %e,
                    "item left out of the placement grid"
                );
            }
        }
        layout
    }

    fn belt_rows_in(&self, layout: &Layout) -> u8 {
        layout
            .equipped
            .get(&EquipSlot::Belt)
            .and_then(|&h| self.get(h))
            .and_then(|item| item.item_type())
            .map(|t| t.belt_rows)
            .unwrap_or(0)
            .clamp(1, MAX_BELT_ROWS)
    }

    /// Usable belt rows: those of the equipped belt, or one without a belt
    pub fn belt_rows(&self) -> u8 {
        self.belt_rows_in(self.layout())
    }

    pub fn belt_capacity(&self) -> u8 {
        self.belt_rows() * BELT_COLUMNS
    }

    /// Width and height of a page as currently usable
    pub fn page_size(&self, page: Page) -> (u8, u8) {
        match page {
            Page::Belt => (BELT_COLUMNS, self.belt_rows()),
            other => {
                let grid = self.layout().grid(other);
                (grid.width(), grid.height())
            }
        }
    }

    pub fn free_cells(&self, page: Page) -> usize {
        let layout = self.layout();
        match page {
            Page::Belt => {
                let grid = layout.grid(Page::Belt);
                (0..self.belt_rows_in(layout))
                    .flat_map(|row| (0..BELT_COLUMNS).map(move |column| (column, row)))
                    .filter(|&(column, row)| grid.get(column, row).is_none())
                    .count()
            }
            other => layout.grid(other).free_cells(),
        }
    }

    /// The item covering a cell
    pub fn item_at(&self, page: Page, x: u8, y: u8) -> Option<ItemHandle> {
        self.layout().grid(page).get(x, y)
    }

    pub fn equipped(&self, slot: EquipSlot) -> Option<ItemHandle> {
        self.layout().equipped.get(&slot).copied()
    }

    fn resolve_target(
        &self,
        layout: &Layout,
        item: &Item<'r>,
        page: Page,
        x: u8,
        y: u8,
    ) -> Result<Target> {
        if page == Page::Belt {
            if !item.item_type().is_some_and(|t| t.category.is_beltable()) {
                return Err(ItemError::precondition(format!(
                    "'{}' does not fit in a belt",
                    item.code()
                )));
            }
            let rows = self.belt_rows_in(layout);
            if x >= BELT_COLUMNS || y >= rows {
                return Err(ItemError::precondition(format!(
                    "belt slot ({}, {}) is outside a {}-row belt",
                    x, y, rows
                )));
            }
            if layout.grid(Page::Belt).get(x, y).is_some() {
                return Err(ItemError::precondition(format!(
                    "belt slot ({}, {}) is occupied",
                    x, y
                )));
            }
            return Ok(Target::Cell { x, y });
        }

        let (w, h) = footprint(item);
        let occupants = layout.grid(page).occupants(x, y, w, h)?;
        match occupants.as_slice() {
            [] => Ok(Target::Cell { x, y }),
            [host] if item.item_type().is_some_and(|t| t.is_socket_filler()) => {
                let host_item = self.get(*host).ok_or_else(|| stale(*host))?;
                host_item.check_socketable(item)?;
                Ok(Target::Socket(*host))
            }
            _ => Err(ItemError::precondition(format!(
                "cells at ({}, {}) on the {} are occupied",
                x, y, page
            ))),
        }
    }

    fn write_placement(item: &mut Item<'r>, page: Page, x: u8, y: u8) -> Result<()> {
        if page == Page::Belt {
            item.set_location(
                Location::Belt,
                EquipSlot::None,
                belt_index(x, y),
                0,
                Storage::None,
            )
        } else {
            item.set_location(Location::Stored, EquipSlot::None, x, y, page.storage())
        }
    }

    fn placement(handle: ItemHandle, page: Page, x: u8, y: u8) -> Placement {
        match page {
            Page::Belt => Placement::Belt {
                handle,
                index: belt_index(x, y),
            },
            page => Placement::Grid { handle, page, x, y },
        }
    }

    /// Put a new item at `(x, y)` on `page`.
    ///
    /// When the footprint overlaps exactly one item and the new item is a socket
    /// filler, it goes into that item's next socket instead.
    pub fn place(&mut self, mut item: Item<'r>, page: Page, x: u8, y: u8) -> Result<Placement> {
        self.check_compatible(&item)?;
        match self.resolve_target(self.layout(), &item, page, x, y)? {
            Target::Socket(host) => {
                let host_item = self.get_mut(host).ok_or_else(|| stale(host))?;
                host_item.add_socketed_item(item)?;
                tracing::debug!(%host, "socketed item through placement");
                Ok(Placement::Socketed { host })
            }
            Target::Cell { x, y } => {
                Self::write_placement(&mut item, page, x, y)?;
                let handle = self.push(Owner::Character, item);
                Ok(Self::placement(handle, page, x, y))
            }
        }
    }

    /// Place a new item at the first free spot of `page`
    pub fn auto_place(&mut self, item: Item<'r>, page: Page) -> Result<Placement> {
        let (x, y) = self
            .find_free(self.layout(), &item, page)
            .ok_or_else(|| {
                ItemError::precondition(format!("no room for '{}' on the {}", item.code(), page))
            })?;
        self.place(item, page, x, y)
    }

    fn find_free(&self, layout: &Layout, item: &Item<'r>, page: Page) -> Option<(u8, u8)> {
        if page == Page::Belt {
            let grid = layout.grid(Page::Belt);
            return (0..self.belt_rows_in(layout))
                .flat_map(|row| (0..BELT_COLUMNS).map(move |column| (column, row)))
                .find(|&(column, row)| grid.get(column, row).is_none());
        }
        let (w, h) = footprint(item);
        layout.grid(page).find_free(w, h)
    }

    /// Move a character item to `(x, y)` on `page`, or into a socket there
    pub fn move_item(&mut self, handle: ItemHandle, page: Page, x: u8, y: u8) -> Result<Placement> {
        if self.owner(handle) != Some(Owner::Character) {
            return Err(ItemError::precondition(format!(
                "item {} is not a character item",
                handle
            )));
        }
        self.check_belt_removal(handle)?;
        let mut layout = self.layout().clone();
        layout.release(handle);
        let item = self.get(handle).ok_or_else(|| stale(handle))?;

        match self.resolve_target(&layout, item, page, x, y)? {
            Target::Socket(host) => {
                let snapshot = self.clone();
                let item = self.remove(handle).ok_or_else(|| stale(handle))?;
                let result = self
                    .get_mut(host)
                    .ok_or_else(|| stale(host))
                    .and_then(|host_item| host_item.add_socketed_item(item));
                if let Err(e) = result {
                    tracing::warn!(%handle, %host, error = %e, "socketing failed, collection restored");
                    *self = snapshot;
                    return Err(ItemError::Rollback(Box::new(e)));
                }
                Ok(Placement::Socketed { host })
            }
            Target::Cell { x, y } => {
                let item = self.get_mut(handle).ok_or_else(|| stale(handle))?;
                Self::write_placement(item, page, x, y)?;
                Ok(Self::placement(handle, page, x, y))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Equipment
    // ------------------------------------------------------------------------

    fn check_equip(
        &self,
        layout: &Layout,
        item: &Item<'r>,
        slot: EquipSlot,
        wearer: Option<Wearer>,
    ) -> Result<()> {
        let item_type = item
            .item_type()
            .ok_or_else(|| ItemError::precondition("ears cannot be equipped"))?;
        if !slot_accepts(slot, item_type.category) {
            return Err(ItemError::precondition(format!(
                "a {} cannot be equipped in slot {}",
                item_type.category, slot
            )));
        }
        if slot.is_expansion() && !self.mode.is_expansion() {
            return Err(ItemError::UnsupportedInVersion(
                format!("equip slot {}", slot),
                self.version.name(),
            ));
        }
        if layout.equipped.contains_key(&slot) {
            return Err(ItemError::precondition(format!("slot {} is occupied", slot)));
        }
        if let Some(other) = slot
            .paired_hand()
            .and_then(|paired| layout.equipped.get(&paired))
            .and_then(|&h| self.get(h))
            .and_then(|i| i.item_type())
        {
            if !hands_compatible(item_type, other) {
                return Err(ItemError::precondition(format!(
                    "'{}' cannot be held together with '{}'",
                    item_type.code, other.code
                )));
            }
        }
        if let Some(wearer) = wearer {
            if let (Some(required), Some(class)) = (item_type.class, wearer.class) {
                if required != class {
                    return Err(ItemError::precondition(format!(
                        "'{}' is for {} only",
                        item_type.code, required
                    )));
                }
            }
            let level = item.required_level();
            if level > wearer.level {
                return Err(ItemError::precondition(format!(
                    "'{}' requires level {}",
                    item_type.code, level
                )));
            }
        }
        Ok(())
    }

    /// Equip a new item on the character.
    ///
    /// The slot must take the item's category, two-handed items need the other
    /// hand free (bows and crossbows excepted for their ammunition), and when a
    /// `wearer` is given its class and level must meet the item's requirements.
    pub fn equip(
        &mut self,
        mut item: Item<'r>,
        slot: EquipSlot,
        wearer: Option<Wearer>,
    ) -> Result<ItemHandle> {
        self.check_compatible(&item)?;
        self.check_equip(self.layout(), &item, slot, wearer)?;
        item.set_location(Location::Equipped, slot, 0, 0, Storage::None)?;
        let handle = self.push(Owner::Character, item);
        tracing::debug!(%handle, %slot, "equipped item");
        Ok(handle)
    }

    /// Taking off the equipped belt must not leave potions beyond the first row
    fn check_belt_removal(&self, handle: ItemHandle) -> Result<()> {
        let layout = self.layout();
        if layout.equipped.get(&EquipSlot::Belt) != Some(&handle) {
            return Ok(());
        }
        let grid = layout.grid(Page::Belt);
        let stranded = (1..MAX_BELT_ROWS)
            .flat_map(|row| (0..BELT_COLUMNS).map(move |column| (column, row)))
            .filter(|&(column, row)| grid.get(column, row).is_some())
            .count();
        if stranded > 0 {
            return Err(ItemError::precondition(format!(
                "the belt still holds {} potion(s) beyond its first row",
                stranded
            )));
        }
        Ok(())
    }

    /// Move an equipped item to the first free inventory spot
    pub fn unequip(&mut self, handle: ItemHandle) -> Result<Placement> {
        let item = self.get(handle).ok_or_else(|| stale(handle))?;
        if item.location() != Location::Equipped || self.owner(handle) != Some(Owner::Character) {
            return Err(ItemError::precondition(format!(
                "item {} is not equipped",
                handle
            )));
        }
        let mut layout = self.layout().clone();
        layout.release(handle);
        let (x, y) = self
            .find_free(&layout, item, Page::Inventory)
            .ok_or_else(|| ItemError::precondition("no room in the inventory"))?;
        self.move_item(handle, Page::Inventory, x, y)
    }

    // ------------------------------------------------------------------------
    // Collection-wide edits
    // ------------------------------------------------------------------------

    /// Apply `edit` to every item `select` picks. The first failure stops the
    /// pass and restores every item edited so far.
    fn edit_all(
        &mut self,
        op: &'static str,
        select: impl Fn(&Item<'r>) -> bool,
        mut edit: impl FnMut(&mut Item<'r>) -> Result<bool>,
    ) -> Result<usize> {
        let snapshot = self.clone();
        let mut changed = 0;
        let mut failure = None;
        for entry in &mut self.entries {
            let Some((_, item)) = entry.slot.as_mut() else {
                continue;
            };
            if !select(&*item) {
                continue;
            }
            match edit(item) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            tracing::warn!(op, changed, error = %e, "collection edit failed, collection restored");
            *self = snapshot;
            return Err(ItemError::Rollback(Box::new(e)));
        }
        tracing::debug!(op, changed, "collection edit");
        Ok(changed)
    }

    pub fn upgrade_gems(&mut self) -> Result<usize> {
        self.edit_all("upgrade gems", |i| i.is_upgradable_gem(), |i| i.upgrade_gem())
    }

    pub fn upgrade_potions(&mut self) -> Result<usize> {
        self.edit_all(
            "upgrade potions",
            |i| i.is_upgradable_potion(),
            |i| i.upgrade_potion(),
        )
    }

    pub fn upgrade_rejuvenation_potions(&mut self) -> Result<usize> {
        self.edit_all(
            "upgrade rejuvenation potions",
            |i| i.is_upgradable_rejuvenation(),
            |i| i.upgrade_rejuvenation(),
        )
    }

    pub fn fill_all_stackables(&mut self) -> Result<usize> {
        self.edit_all(
            "fill stackables",
            |i| i.can_fill_stack(),
            |i| i.fill_stack().map(|_| true),
        )
    }

    pub fn repair_all(&mut self) -> Result<usize> {
        self.edit_all(
            "repair",
            |i| match (i.durability(), i.max_durability_value()) {
                (Some(current), Some(max)) => max > 0 && current < u16::from(max),
                _ => false,
            },
            |i| i.repair().map(|_| true),
        )
    }

    pub fn max_durability_all(&mut self) -> Result<usize> {
        self.edit_all(
            "max durability",
            |i| match i.max_durability_value() {
                Some(max) if max > 0 => {
                    max < MAX_DURABILITY || i.durability() < Some(u16::from(MAX_DURABILITY))
                }
                _ => false,
            },
            |i| i.max_durability().map(|_| true),
        )
    }

    pub fn make_all_indestructible(&mut self) -> Result<usize> {
        self.edit_all(
            "make indestructible",
            |i| i.has_durability() && !i.is_indestructible() && !i.is_compact(),
            |i| i.make_indestructible().map(|_| true),
        )
    }

    pub fn max_socket_count_all(&mut self) -> Result<usize> {
        self.edit_all(
            "max sockets",
            |i| !i.is_compact() && !i.is_ear() && i.total_sockets() < i.max_socket_count(),
            |i| {
                let max = i.max_socket_count();
                i.set_socket_count(max).map(|_| true)
            },
        )
    }

    /// Re-encode every item under another format, keeping section structure.
    ///
    /// Fails without producing a collection if any item cannot be represented
    /// in the target, or if the target has no room for mercenary or golem items.
    /// Handles of this collection do not carry over.
    pub fn convert_all(&self, version: ItemVersion, mode: GameMode) -> Result<Items<'r>> {
        let mut converted = Items::new(version, mode, self.registry);
        let convert = |handle: ItemHandle| -> Result<Item<'r>> {
            self.get(handle)
                .ok_or_else(|| stale(handle))?
                .convert(version, converted_mode(version, mode))
        };

        for &handle in &self.character {
            converted.push(Owner::Character, convert(handle)?);
        }
        converted.corpse_section = self.corpse_section;
        for (header, handles) in &self.corpses {
            let index = converted.corpses.len();
            converted.corpses.push((*header, Vec::new()));
            for &handle in handles {
                converted.push(Owner::Corpse(index), convert(handle)?);
            }
        }

        let has_mercenary = self.mercenary.as_ref().is_some_and(|h| !h.is_empty());
        if has_mercenary && !converted.mercenary_section {
            return Err(self.fail_convert("mercenary items", version));
        }
        if converted.mercenary_section {
            if let Some(handles) = &self.mercenary {
                converted.mercenary = Some(Vec::new());
                for &handle in handles {
                    converted.push(Owner::Mercenary, convert(handle)?);
                }
            }
        }

        if let Some(handle) = self.golem {
            if !converted.golem_section {
                return Err(self.fail_convert("golem items", version));
            }
            converted.push(Owner::Golem, convert(handle)?);
        }

        tracing::debug!(
            from = %self.version,
            to = %version,
            items = converted.len(),
            "converted collection"
        );
        Ok(converted)
    }

    fn fail_convert(&self, what: &str, version: ItemVersion) -> ItemError {
        tracing::warn!(from = %self.version, to = %version, what, "collection migration failed");
        ItemError::UnsupportedInVersion(what.to_string(), version.name())
    }
}

fn converted_mode(version: ItemVersion, mode: GameMode) -> GameMode {
    if version.supports_expansion() {
        mode
    } else {
        GameMode::Classic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityBlock;

    const V: ItemVersion = ItemVersion::V110;

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    fn item(code: &str) -> Item<'static> {
        Item::builder(code, registry()).version(V).build().unwrap()
    }

    fn items() -> Items<'static> {
        Items::new(V, GameMode::Expansion, registry())
    }

    #[test]
    fn test_place_and_occupancy() {
        let mut items = items();
        let sword = items.place(item("lsd"), Page::Inventory, 0, 0).unwrap();
        assert_eq!(items.free_cells(Page::Inventory), 34);
        assert!(items.place(item("cap"), Page::Inventory, 1, 1).is_err());

        let cap = items.place(item("cap"), Page::Inventory, 2, 0).unwrap();
        let cap = cap.handle().unwrap();
        assert_eq!(items.free_cells(Page::Inventory), 30);
        assert_eq!(items.item_at(Page::Inventory, 3, 1), Some(cap));
        assert_eq!(items.item_at(Page::Inventory, 1, 2), sword.handle());

        let placed = items.get(cap).unwrap();
        assert_eq!(placed.location(), Location::Stored);
        assert_eq!(placed.storage(), Storage::Inventory);
        assert_eq!(placed.position(), (2, 0));
    }

    #[test]
    fn test_place_out_of_bounds() {
        let mut items = items();
        assert!(items.place(item("lsd"), Page::Cube, 2, 0).is_err());
        assert!(items.place(item("lsd"), Page::Cube, 1, 1).is_ok());
        assert!(!items.is_empty());
    }

    #[test]
    fn test_stash_size_depends_on_mode() {
        let classic = Items::new(V, GameMode::Classic, registry());
        assert_eq!(classic.page_size(Page::Stash), (6, 4));
        assert_eq!(items().page_size(Page::Stash), (6, 8));
    }

    #[test]
    fn test_placing_a_filler_over_a_socketed_item() {
        let mut items = items();
        let mut sword = item("lsd");
        sword.set_socket_count(2).unwrap();
        let host = items
            .place(sword, Page::Inventory, 0, 0)
            .unwrap()
            .handle()
            .unwrap();

        let placement = items.place(item("gcv"), Page::Inventory, 1, 1).unwrap();
        assert_eq!(placement, Placement::Socketed { host });
        let host_item = items.get(host).unwrap();
        assert_eq!(host_item.filled_sockets(), 1);
        assert_eq!(host_item.socket_count_field(), 1);
        assert_eq!(items.len(), 1);

        // not a filler
        assert!(items.place(item("key"), Page::Inventory, 1, 1).is_err());
    }

    #[test]
    fn test_filler_over_unsocketed_item_is_rejected() {
        let mut items = items();
        items.place(item("lsd"), Page::Inventory, 0, 0).unwrap();
        assert_eq!(
            items.place(item("gcv"), Page::Inventory, 1, 1),
            Err(ItemError::NoFreeSocket)
        );
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_belt_rows_follow_equipped_belt() {
        let mut items = items();
        assert_eq!(items.belt_capacity(), 4);
        let potion = items.place(item("hp1"), Page::Belt, 0, 0).unwrap();
        assert_eq!(
            potion,
            Placement::Belt {
                handle: potion.handle().unwrap(),
                index: 0
            }
        );
        assert!(items.place(item("hp1"), Page::Belt, 0, 1).is_err());
        assert!(items.place(item("cap"), Page::Belt, 1, 0).is_err());

        items.equip(item("mbl"), EquipSlot::Belt, None).unwrap();
        assert_eq!(items.belt_rows(), 3);
        assert_eq!(items.free_cells(Page::Belt), 11);
        let placed = items.place(item("mp1"), Page::Belt, 2, 1).unwrap();
        let handle = placed.handle().unwrap();
        assert_eq!(items.get(handle).unwrap().location(), Location::Belt);
        assert_eq!(items.get(handle).unwrap().position(), (6, 0));
    }

    #[test]
    fn test_belt_with_potions_in_upper_rows_stays_on() {
        let mut items = items();
        let belt = items.equip(item("mbl"), EquipSlot::Belt, None).unwrap();
        let potion = items.place(item("hp1"), Page::Belt, 0, 2).unwrap();
        let potion = potion.handle().unwrap();
        let before = items.to_bytes().unwrap();

        assert!(matches!(
            items.unequip(belt),
            Err(ItemError::Precondition(_))
        ));
        assert!(items.move_item(belt, Page::Inventory, 0, 0).is_err());
        assert_eq!(items.to_bytes().unwrap(), before);
        assert_eq!(items.belt_rows(), 3);
        assert_eq!(items.item_at(Page::Belt, 0, 2), Some(potion));

        items.move_item(potion, Page::Belt, 0, 0).unwrap();
        items.unequip(belt).unwrap();
        assert_eq!(items.belt_rows(), 1);
        assert_eq!(items.free_cells(Page::Belt), 3);
        assert_eq!(items.get(potion).unwrap().position(), (0, 0));
    }

    #[test]
    fn test_equip_slot_rules() {
        let mut items = items();
        assert!(items.equip(item("lsd"), EquipSlot::Head, None).is_err());
        let cap = items.equip(item("cap"), EquipSlot::Head, None).unwrap();
        assert_eq!(items.equipped(EquipSlot::Head), Some(cap));
        assert!(items.equip(item("xap"), EquipSlot::Head, None).is_err());
        assert!(items.equip(item("rin"), EquipSlot::LeftRing, None).is_ok());
        assert!(items.equip(item("rin"), EquipSlot::RightRing, None).is_ok());
    }

    #[test]
    fn test_two_handed_pairing() {
        let mut items = items();
        items.equip(item("sbw"), EquipSlot::RightArm, None).unwrap();
        assert!(items.equip(item("cqv"), EquipSlot::LeftArm, None).is_err());
        items.equip(item("aqv"), EquipSlot::LeftArm, None).unwrap();

        items.equip(item("flb"), EquipSlot::AltRightArm, None).unwrap();
        assert!(items.equip(item("buc"), EquipSlot::AltLeftArm, None).is_err());

        let mut other = Items::new(V, GameMode::Expansion, registry());
        other.equip(item("buc"), EquipSlot::LeftArm, None).unwrap();
        assert!(other.equip(item("sml"), EquipSlot::RightArm, None).is_err());
        assert!(other.equip(item("lsd"), EquipSlot::RightArm, None).is_ok());
    }

    #[test]
    fn test_alternate_slots_need_expansion() {
        let mut classic = Items::new(V, GameMode::Classic, registry());
        let sword = Item::builder("lsd", registry())
            .version(V)
            .mode(GameMode::Classic)
            .build()
            .unwrap();
        assert!(matches!(
            classic.equip(sword, EquipSlot::AltRightArm, None),
            Err(ItemError::UnsupportedInVersion(..))
        ));
    }

    #[test]
    fn test_wearer_requirements() {
        let mut items = items();
        let sorceress = Wearer {
            class: Some(CharClass::Sorceress),
            level: 10,
        };
        assert!(items
            .equip(item("ktr"), EquipSlot::RightArm, Some(sorceress))
            .is_err());
        assert!(items
            .equip(item("xap"), EquipSlot::Head, Some(sorceress))
            .is_err());
        assert!(items
            .equip(item("ob1"), EquipSlot::RightArm, Some(sorceress))
            .is_ok());
        let veteran = Wearer {
            class: None,
            level: 30,
        };
        assert!(items.equip(item("xap"), EquipSlot::Head, Some(veteran)).is_ok());
    }

    #[test]
    fn test_move_and_unequip() {
        let mut items = items();
        let sword = items
            .place(item("lsd"), Page::Inventory, 0, 0)
            .unwrap()
            .handle()
            .unwrap();
        // overlapping its own old footprint is fine
        let moved = items.move_item(sword, Page::Inventory, 1, 0).unwrap();
        assert_eq!(moved.handle(), Some(sword));
        assert_eq!(items.item_at(Page::Inventory, 0, 0), None);
        assert_eq!(items.item_at(Page::Inventory, 2, 2), Some(sword));

        items.move_item(sword, Page::Stash, 4, 5).unwrap();
        assert_eq!(items.free_cells(Page::Inventory), 40);
        assert_eq!(items.get(sword).unwrap().storage(), Storage::Stash);

        let cap = items.equip(item("cap"), EquipSlot::Head, None).unwrap();
        let placement = items.unequip(cap).unwrap();
        assert_eq!(
            placement,
            Placement::Grid {
                handle: cap,
                page: Page::Inventory,
                x: 0,
                y: 0
            }
        );
        assert_eq!(items.equipped(EquipSlot::Head), None);
        assert!(items.unequip(cap).is_err());
    }

    #[test]
    fn test_moving_a_gem_into_a_socket() {
        let mut items = items();
        let mut sword = item("lsd");
        sword.set_socket_count(1).unwrap();
        let host = items
            .place(sword, Page::Inventory, 0, 0)
            .unwrap()
            .handle()
            .unwrap();
        let gem = items
            .place(item("gcv"), Page::Inventory, 5, 0)
            .unwrap()
            .handle()
            .unwrap();

        assert_eq!(
            items.move_item(gem, Page::Inventory, 0, 0).unwrap(),
            Placement::Socketed { host }
        );
        assert!(items.get(gem).is_none());
        assert_eq!(items.get(host).unwrap().filled_sockets(), 1);
        assert_eq!(items.free_cells(Page::Inventory), 34);
    }

    #[test]
    fn test_stale_handles() {
        let mut items = items();
        let first = items.insert(item("cap"), Owner::Character).unwrap();
        let removed = items.remove(first).unwrap();
        assert_eq!(removed.code(), "cap");
        assert!(items.get(first).is_none());
        assert!(items.remove(first).is_none());

        let second = items.insert(item("lsd"), Owner::Character).unwrap();
        assert_eq!(second.index(), first.index());
        assert_ne!(second, first);
        assert!(items.get(first).is_none());
        assert_eq!(items.get(second).unwrap().code(), "lsd");
    }

    #[test]
    fn test_overlapping_items_are_kept() {
        let mut items = items();
        let first = items.insert(item("cap"), Owner::Character).unwrap();
        let second = items.insert(item("cap"), Owner::Character).unwrap();
        assert_eq!(items.item_at(Page::Inventory, 0, 0), Some(first));
        assert_eq!(items.character_items().count(), 2);
        items.remove(first);
        assert_eq!(items.item_at(Page::Inventory, 1, 1), Some(second));
    }

    #[test]
    fn test_insert_checks_owner_and_version() {
        let mut items = items();
        let wrong = Item::builder("cap", registry()).build().unwrap();
        assert!(items.insert(wrong, Owner::Character).is_err());
        assert!(items.insert(item("cap"), Owner::Corpse(0)).is_err());
        items.insert(item("cap"), Owner::Golem).unwrap();
        assert!(items.insert(item("cap"), Owner::Golem).is_err());

        let mut classic = Items::new(V, GameMode::Classic, registry());
        let cap = Item::builder("cap", registry())
            .version(V)
            .mode(GameMode::Classic)
            .build()
            .unwrap();
        assert!(matches!(
            classic.insert(cap, Owner::Mercenary),
            Err(ItemError::UnsupportedInVersion(..))
        ));
    }

    #[test]
    fn test_sections_roundtrip() {
        let mut items = items();
        items.place(item("lsd"), Page::Inventory, 0, 0).unwrap();
        items.place(item("cap"), Page::Stash, 0, 0).unwrap();
        let corpse = items.add_corpse(CorpseHeader {
            unknown: 0,
            x: 400,
            y: 500,
        });
        items.insert(item("xap"), Owner::Corpse(corpse)).unwrap();
        items.insert(item("skp"), Owner::Mercenary).unwrap();
        items.insert(item("lsd"), Owner::Golem).unwrap();

        let bytes = items.to_bytes().unwrap();
        let mut padded = bytes.clone();
        padded.extend_from_slice(b"tail");
        let (decoded, consumed) =
            Items::read(&padded, V, GameMode::Expansion, registry()).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.to_bytes().unwrap(), bytes);
        assert_eq!(decoded.character_items().count(), 2);
        assert_eq!(decoded.corpse_count(), 1);
        assert_eq!(decoded.corpse_header(0).map(|h| h.x), Some(400));
        assert_eq!(decoded.corpse_items(0)[0].code(), "xap");
        assert_eq!(decoded.mercenary_items()[0].code(), "skp");
        assert_eq!(decoded.golem().map(|g| g.code()), Some("lsd"));
        assert_eq!(decoded.free_cells(Page::Stash), 44);
    }

    #[test]
    fn test_classic_sections() {
        let mut items = Items::new(V, GameMode::Classic, registry());
        let cap = Item::builder("cap", registry())
            .version(V)
            .mode(GameMode::Classic)
            .build()
            .unwrap();
        items.place(cap, Page::Inventory, 0, 0).unwrap();
        let bytes = items.to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 4..], &[b'J', b'M', 0, 0]);

        let (decoded, consumed) = Items::read(&bytes, V, GameMode::Classic, registry()).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.len(), 1);
        assert!(decoded.mercenary_items().is_empty());
    }

    #[test]
    fn test_collection_upgrades() {
        let mut items = items();
        for code in ["gcv", "gpv", "hp1", "mp5", "rvs", "cap"] {
            items.auto_place(item(code), Page::Inventory).unwrap();
        }
        assert_eq!(items.upgrade_gems().unwrap(), 1);
        assert_eq!(items.upgrade_potions().unwrap(), 1);
        assert_eq!(items.upgrade_rejuvenation_potions().unwrap(), 1);
        let codes: Vec<&str> = items.character_items().map(|(_, i)| i.code()).collect();
        assert_eq!(codes, ["gpv", "gpv", "hp5", "mp5", "rvl", "cap"]);
    }

    #[test]
    fn test_collection_durability_and_stacks() {
        let mut items = items();
        let cap = items.auto_place(item("cap"), Page::Inventory).unwrap();
        let cap = cap.handle().unwrap();
        items.get_mut(cap).unwrap().set_durability(3).unwrap();
        let key = items.auto_place(item("key"), Page::Inventory).unwrap();
        let key = key.handle().unwrap();
        items.auto_place(item("lsd"), Page::Inventory).unwrap();

        assert_eq!(items.repair_all().unwrap(), 1);
        assert_eq!(items.get(cap).unwrap().durability(), Some(12));
        assert_eq!(items.fill_all_stackables().unwrap(), 1);
        assert_eq!(items.get(key).unwrap().quantity(), Some(12));
        assert_eq!(items.max_durability_all().unwrap(), 2);
        assert_eq!(items.get(cap).unwrap().durability(), Some(255));
        assert_eq!(items.make_all_indestructible().unwrap(), 2);
        assert!(items.get(cap).unwrap().is_indestructible());
        assert_eq!(items.make_all_indestructible().unwrap(), 0);
    }

    #[test]
    fn test_failed_collection_edit_restores_every_item() {
        let mut items = items();
        for _ in 0..3 {
            let mut cap = item("cap");
            cap.set_durability(2).unwrap();
            items.auto_place(cap, Page::Inventory).unwrap();
        }
        let before = items.to_bytes().unwrap();

        let mut seen = 0;
        let result = items.edit_all(
            "repair",
            |i| i.has_durability(),
            |i| {
                seen += 1;
                if seen == 3 {
                    return Err(ItemError::precondition("refused"));
                }
                i.repair().map(|_| true)
            },
        );
        assert_eq!(
            result,
            Err(ItemError::Rollback(Box::new(ItemError::precondition(
                "refused"
            ))))
        );
        assert_eq!(items.to_bytes().unwrap(), before);
        assert!(items
            .character_items()
            .all(|(_, cap)| cap.durability() == Some(2)));

        assert_eq!(items.repair_all().unwrap(), 3);
    }

    #[test]
    fn test_max_socket_count_all() {
        let mut items = items();
        let sword = items.auto_place(item("lsd"), Page::Inventory).unwrap();
        items.auto_place(item("gcv"), Page::Inventory).unwrap();
        items.auto_place(item("rin"), Page::Inventory).unwrap();
        assert_eq!(items.max_socket_count_all().unwrap(), 1);
        assert_eq!(items.get(sword.handle().unwrap()).unwrap().total_sockets(), 4);
    }

    #[test]
    fn test_convert_all() {
        let mut items = items();
        items.auto_place(item("lsd"), Page::Inventory).unwrap();
        items.insert(item("skp"), Owner::Mercenary).unwrap();
        let converted = items
            .convert_all(ItemVersion::V160, GameMode::Expansion)
            .unwrap();
        assert_eq!(converted.version(), ItemVersion::V160);
        assert_eq!(converted.len(), 2);
        assert_eq!(converted.mercenary_items()[0].version(), ItemVersion::V160);

        // classic targets have no mercenary section
        assert!(matches!(
            items.convert_all(ItemVersion::V110, GameMode::Classic),
            Err(ItemError::UnsupportedInVersion(..))
        ));

        let mut expansion_only = self::items();
        expansion_only.auto_place(item("uap"), Page::Inventory).unwrap();
        assert!(expansion_only
            .convert_all(ItemVersion::V109, GameMode::Classic)
            .is_err());
    }

    #[test]
    fn test_placed_item_keeps_quality() {
        let mut items = items();
        let magic = Item::builder("cap", registry())
            .version(V)
            .magic(1, 3)
            .build()
            .unwrap();
        let handle = items
            .place(magic, Page::Cube, 1, 2)
            .unwrap()
            .handle()
            .unwrap();
        assert_eq!(
            items.get(handle).unwrap().quality_block(),
            Some(QualityBlock::Magic {
                prefix: 1,
                suffix: 3
            })
        );
    }
}
