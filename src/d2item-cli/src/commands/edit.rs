//! Edit command handler

use anyhow::{bail, Context, Result};
use d2item::{CodecOptions, Item, Registry};
use std::fs;
use std::path::Path;

use super::write_output;
use crate::cli::EditOp;

/// Apply one edit; returns a line describing the outcome
pub fn apply(item: &mut Item<'_>, op: &EditOp) -> Result<String> {
    let message = match op {
        EditOp::Personalize { name } => {
            item.personalize(name)?;
            format!("Personalized as {}", name)
        }
        EditOp::Unpersonalize => {
            item.unpersonalize()?;
            "Removed personalization".to_string()
        }
        EditOp::Sockets { count } => {
            item.set_socket_count(*count)?;
            format!("Socket count set to {}", count)
        }
        EditOp::MaxSockets => {
            let count = item.max_socket_count();
            item.set_socket_count(count)?;
            format!("Socket count set to {}", count)
        }
        EditOp::FillSockets { code } => {
            let filled = item.fill_empty_sockets(code)?;
            format!("Filled {} socket(s) with {}", filled, code)
        }
        EditOp::ApplyRuneword => {
            let id = item.apply_runeword()?;
            let name = item.runeword_name().unwrap_or("?");
            format!("Applied runeword {} ({})", name, id)
        }
        EditOp::RemoveRuneword => {
            item.remove_runeword()?;
            "Removed runeword".to_string()
        }
        EditOp::UpgradeTier => format!("Upgraded to {}", item.upgrade_tier()?),
        EditOp::Upgrade => {
            let upgraded = if item.is_upgradable_gem() {
                item.upgrade_gem()?
            } else if item.is_upgradable_potion() {
                item.upgrade_potion()?
            } else if item.is_upgradable_rejuvenation() {
                item.upgrade_rejuvenation()?
            } else {
                false
            };
            if !upgraded {
                bail!("{} has no higher grade", item.code());
            }
            format!("Upgraded to {}", item.code())
        }
        EditOp::ToNormal => {
            item.to_normal()?;
            "Changed to normal quality".to_string()
        }
        EditOp::ToMagic { prefix, suffix } => {
            item.to_magic(*prefix, *suffix)?;
            format!("Changed to magic: {}", item.display_name())
        }
        EditOp::Identified { value } => {
            item.set_identified(*value)?;
            format!("Identified: {}", value)
        }
        EditOp::Ethereal { value } => {
            item.set_ethereal(*value)?;
            format!("Ethereal: {}", value)
        }
        EditOp::Level { level } => {
            item.set_level(*level)?;
            format!("Item level set to {}", level)
        }
        EditOp::Repair => {
            item.repair()?;
            "Repaired".to_string()
        }
        EditOp::MaxDurability => {
            item.max_durability()?;
            "Maximum durability raised".to_string()
        }
        EditOp::Indestructible => {
            item.make_indestructible()?;
            "Made indestructible".to_string()
        }
        EditOp::FillStack => format!("Quantity set to {}", item.fill_stack()?),
    };
    Ok(message)
}

pub fn edit(
    input: &Path,
    options: &CodecOptions,
    op: &EditOp,
    output: Option<&Path>,
    backup: bool,
) -> Result<()> {
    let bytes = fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let mut item = options
        .decode(&bytes, Registry::builtin())
        .context("Failed to decode item")?;

    let message = apply(&mut item, op).with_context(|| format!("Edit failed on {}", item.code()))?;
    tracing::debug!(code = item.code(), ?op, "edit applied");

    let path = output.unwrap_or(input);
    write_output(path, &item.to_bytes(), backup && output.is_none())?;
    println!("{}", message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use d2item::ItemVersion;

    fn item(code: &str) -> Item<'static> {
        Item::builder(code, Registry::builtin())
            .version(ItemVersion::V110)
            .build()
            .unwrap()
    }

    #[test]
    fn test_personalize_and_sockets() {
        let mut sword = item("lsd");
        apply(&mut sword, &EditOp::Personalize { name: "Charsi".into() }).unwrap();
        apply(&mut sword, &EditOp::Sockets { count: 2 }).unwrap();
        assert_eq!(sword.personalized_name().as_deref(), Some("Charsi"));
        assert_eq!(sword.total_sockets(), 2);

        apply(&mut sword, &EditOp::FillSockets { code: "r03".into() }).unwrap();
        assert_eq!(sword.filled_sockets(), 2);
    }

    #[test]
    fn test_upgrade_dispatch() {
        let mut gem = item("gcv");
        let message = apply(&mut gem, &EditOp::Upgrade).unwrap();
        assert_eq!(message, format!("Upgraded to {}", gem.code()));
        assert_ne!(gem.code(), "gcv");

        let mut cap = item("cap");
        assert!(apply(&mut cap, &EditOp::Upgrade).is_err());
    }

    #[test]
    fn test_failed_edit_leaves_item_unchanged() {
        let mut cap = item("cap");
        let before = cap.to_bytes();
        assert!(apply(&mut cap, &EditOp::Sockets { count: 9 }).is_err());
        assert_eq!(cap.to_bytes(), before);
    }
}
