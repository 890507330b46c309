//! Command handlers for d2item CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod checksum;
pub mod configure;
pub mod edit;
pub mod item;

use anyhow::{Context, Result};
use d2item::bitstream::BitReader;
use d2item::items::{read_item_list, write_item_list};
use d2item::{CodecOptions, Item, Registry};
use std::fs;
use std::path::Path;

use crate::cli::InputArgs;

/// Decode the records an input points at
pub fn read_records<'r>(
    input: &InputArgs,
    options: &CodecOptions,
    registry: &'r Registry,
) -> Result<Vec<Item<'r>>> {
    let bytes = fs::read(&input.input)
        .with_context(|| format!("Failed to read {}", input.input.display()))?;
    let data = bytes
        .get(input.offset..)
        .with_context(|| format!("Offset {} is past the end of the file", input.offset))?;

    if input.list {
        let mut reader = BitReader::new(data);
        read_item_list(&mut reader, options.version, options.mode, registry)
            .context("Failed to decode item list")
    } else {
        let item = options.decode(data, registry).context("Failed to decode item")?;
        Ok(vec![item])
    }
}

/// Encode records back: a bare record, or a "JM" list
pub fn encode_records(items: &[Item<'_>], list: bool) -> Result<Vec<u8>> {
    match items {
        [item] if !list => Ok(item.to_bytes()),
        _ => {
            let mut out = Vec::new();
            write_item_list(&mut out, items.iter()).context("Failed to encode item list")?;
            Ok(out)
        }
    }
}

/// Write `bytes` to `path`, backing up the previous content first if asked
pub fn write_output(path: &Path, bytes: &[u8], backup: bool) -> Result<()> {
    if backup {
        let created = d2item::write_with_backup(path, bytes)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if created {
            println!("Backup created for {}", path.display());
        }
    } else {
        fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "wrote output");
    Ok(())
}
