//! Occupancy grids for the storage pages and the belt.

use super::ItemHandle;
use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemVersion};
use crate::location::Storage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Belt slots per row
pub const BELT_COLUMNS: u8 = 4;

/// Most belt rows any belt provides
pub const MAX_BELT_ROWS: u8 = 4;

/// A grid an item can be placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Inventory,
    Stash,
    Cube,
    Belt,
}

impl Page {
    pub const ALL: [Page; 4] = [Page::Inventory, Page::Stash, Page::Cube, Page::Belt];

    pub fn from_storage(storage: Storage) -> Option<Page> {
        match storage {
            Storage::Inventory => Some(Page::Inventory),
            Storage::Stash => Some(Page::Stash),
            Storage::Cube => Some(Page::Cube),
            Storage::None => None,
        }
    }

    /// Storage field value for items on this page; the belt has none
    pub fn storage(self) -> Storage {
        match self {
            Page::Inventory => Storage::Inventory,
            Page::Stash => Storage::Stash,
            Page::Cube => Storage::Cube,
            Page::Belt => Storage::None,
        }
    }

    /// Width and height of the page. The belt is sized for its fullest form.
    pub fn size(self, version: ItemVersion, mode: GameMode) -> (u8, u8) {
        match self {
            Page::Inventory => (10, 4),
            Page::Stash if version.is_resurrected() => (10, 10),
            Page::Stash if mode.is_expansion() => (6, 8),
            Page::Stash => (6, 4),
            Page::Cube => (3, 4),
            Page::Belt => (BELT_COLUMNS, MAX_BELT_ROWS),
        }
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Page::Inventory => "inventory",
            Page::Stash => "stash",
            Page::Cube => "cube",
            Page::Belt => "belt",
        };
        f.write_str(name)
    }
}

/// Cell occupancy of one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u8,
    height: u8,
    cells: Vec<Option<ItemHandle>>,
}

impl Grid {
    pub fn new(width: u8, height: u8) -> Self {
        Self {
            width,
            height,
            cells: vec![None; usize::from(width) * usize::from(height)],
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    fn index(&self, x: u8, y: u8) -> usize {
        usize::from(y) * usize::from(self.width) + usize::from(x)
    }

    fn check_bounds(&self, x: u8, y: u8, w: u8, h: u8) -> Result<()> {
        if w == 0
            || h == 0
            || u16::from(x) + u16::from(w) > u16::from(self.width)
            || u16::from(y) + u16::from(h) > u16::from(self.height)
        {
            return Err(ItemError::precondition(format!(
                "a {}x{} item does not fit at ({}, {}) on a {}x{} grid",
                w, h, x, y, self.width, self.height
            )));
        }
        Ok(())
    }

    pub fn get(&self, x: u8, y: u8) -> Option<ItemHandle> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells[self.index(x, y)]
    }

    /// Distinct items covering the footprint, in cell order
    pub fn occupants(&self, x: u8, y: u8, w: u8, h: u8) -> Result<Vec<ItemHandle>> {
        self.check_bounds(x, y, w, h)?;
        let mut found = Vec::new();
        for row in y..y + h {
            for col in x..x + w {
                if let Some(handle) = self.cells[self.index(col, row)] {
                    if !found.contains(&handle) {
                        found.push(handle);
                    }
                }
            }
        }
        Ok(found)
    }

    /// Mark the footprint as taken by `handle`; every cell must be free
    pub fn occupy(&mut self, handle: ItemHandle, x: u8, y: u8, w: u8, h: u8) -> Result<()> {
        if !self.occupants(x, y, w, h)?.is_empty() {
            return Err(ItemError::precondition(format!(
                "cells at ({}, {}) are occupied",
                x, y
            )));
        }
        for row in y..y + h {
            for col in x..x + w {
                let index = self.index(col, row);
                self.cells[index] = Some(handle);
            }
        }
        Ok(())
    }

    /// Free every cell taken by `handle`; returns how many were freed
    pub fn release(&mut self, handle: ItemHandle) -> usize {
        let mut freed = 0;
        for cell in self.cells.iter_mut().filter(|c| **c == Some(handle)) {
            *cell = None;
            freed += 1;
        }
        freed
    }

    pub fn free_cells(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// First position, row by row, where a `w` by `h` footprint is free
    pub fn find_free(&self, w: u8, h: u8) -> Option<(u8, u8)> {
        if w > self.width || h > self.height {
            return None;
        }
        (0..=self.height - h)
            .flat_map(|y| (0..=self.width - w).map(move |x| (x, y)))
            .find(|&(x, y)| {
                self.occupants(x, y, w, h)
                    .map(|o| o.is_empty())
                    .unwrap_or(false)
            })
    }
}

/// Belt slot index of a column and row
pub fn belt_index(column: u8, row: u8) -> u8 {
    row * BELT_COLUMNS + column
}

/// Column and row of a belt slot index
pub fn belt_cell(index: u8) -> (u8, u8) {
    (index % BELT_COLUMNS, index / BELT_COLUMNS)
}
