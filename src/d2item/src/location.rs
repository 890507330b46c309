//! Item placement fields: location, equip slot, and storage page.

use crate::error::{ItemError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an item is (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// In a grid: inventory, cube or stash (see [`Storage`])
    #[default]
    Stored,
    Equipped,
    Belt,
    Ground,
    Cursor,
    Socketed,
}

impl Location {
    pub fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => Location::Stored,
            1 => Location::Equipped,
            2 => Location::Belt,
            3 => Location::Ground,
            4 => Location::Cursor,
            6 => Location::Socketed,
            other => return Err(ItemError::InvalidLocation(other)),
        })
    }

    pub fn raw(self) -> u8 {
        match self {
            Location::Stored => 0,
            Location::Equipped => 1,
            Location::Belt => 2,
            Location::Ground => 3,
            Location::Cursor => 4,
            Location::Socketed => 6,
        }
    }
}

/// Body slot of an equipped item (4-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipSlot {
    #[default]
    None,
    Head,
    Neck,
    Torso,
    RightArm,
    LeftArm,
    RightRing,
    LeftRing,
    Belt,
    Feet,
    Gloves,
    AltRightArm,
    AltLeftArm,
}

impl EquipSlot {
    pub const ALL: [EquipSlot; 12] = [
        EquipSlot::Head,
        EquipSlot::Neck,
        EquipSlot::Torso,
        EquipSlot::RightArm,
        EquipSlot::LeftArm,
        EquipSlot::RightRing,
        EquipSlot::LeftRing,
        EquipSlot::Belt,
        EquipSlot::Feet,
        EquipSlot::Gloves,
        EquipSlot::AltRightArm,
        EquipSlot::AltLeftArm,
    ];

    pub fn from_raw(raw: u8) -> Result<Self> {
        if raw == 0 {
            return Ok(EquipSlot::None);
        }
        Self::ALL
            .get(usize::from(raw) - 1)
            .copied()
            .ok_or(ItemError::InvalidLocation(raw))
    }

    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Weapon and shield slots
    pub fn is_hand(self) -> bool {
        matches!(
            self,
            EquipSlot::RightArm
                | EquipSlot::LeftArm
                | EquipSlot::AltRightArm
                | EquipSlot::AltLeftArm
        )
    }

    /// The other hand of the same weapon set
    pub fn paired_hand(self) -> Option<EquipSlot> {
        match self {
            EquipSlot::RightArm => Some(EquipSlot::LeftArm),
            EquipSlot::LeftArm => Some(EquipSlot::RightArm),
            EquipSlot::AltRightArm => Some(EquipSlot::AltLeftArm),
            EquipSlot::AltLeftArm => Some(EquipSlot::AltRightArm),
            _ => None,
        }
    }

    /// Alternate weapon set slots exist only in the expansion
    pub fn is_expansion(self) -> bool {
        matches!(self, EquipSlot::AltRightArm | EquipSlot::AltLeftArm)
    }
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Grid page of a stored item (3-bit field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    #[default]
    None,
    Inventory,
    Cube,
    Stash,
}

impl Storage {
    pub fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => Storage::None,
            1 => Storage::Inventory,
            4 => Storage::Cube,
            5 => Storage::Stash,
            other => return Err(ItemError::InvalidLocation(other)),
        })
    }

    pub fn raw(self) -> u8 {
        match self {
            Storage::None => 0,
            Storage::Inventory => 1,
            Storage::Cube => 4,
            Storage::Stash => 5,
        }
    }
}
