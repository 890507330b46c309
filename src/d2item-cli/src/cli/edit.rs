//! Edit operation CLI definitions

use clap::Subcommand;

#[derive(Subcommand, Debug, Clone)]
pub enum EditOp {
    /// Set the owner name shown on the item
    Personalize {
        name: String,
    },

    /// Remove the owner name
    Unpersonalize,

    /// Set the number of sockets
    Sockets {
        count: u8,
    },

    /// Give the item its base type's maximum socket count
    MaxSockets,

    /// Fill every empty socket with copies of a filler (e.g. r01, gpv)
    FillSockets {
        code: String,
    },

    /// Turn matching socketed runes into a runeword
    ApplyRuneword,

    /// Drop the runeword, keeping the runes
    RemoveRuneword,

    /// Switch to the next tier base (normal, exceptional, elite)
    UpgradeTier,

    /// Upgrade a gem or potion to the next grade
    Upgrade,

    /// Make the item normal quality
    ToNormal,

    /// Make the item magic with the given affix ids
    ToMagic {
        prefix: u16,
        suffix: u16,
    },

    /// Set or clear the identified flag
    Identified {
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Set or clear the ethereal flag
    Ethereal {
        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Set the item level
    Level {
        level: u8,
    },

    /// Restore durability to its maximum
    Repair,

    /// Raise maximum durability to the field's limit
    MaxDurability,

    /// Make the item indestructible
    Indestructible,

    /// Fill a stackable item to its type's limit
    FillStack,
}
