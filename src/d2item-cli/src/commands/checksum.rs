//! Checksum command handler

use anyhow::{bail, Context, Result};
use d2item::checksum::{checksum, checksum_excluding, store_checksum};
use std::fs;
use std::path::Path;

pub fn handle(input: &Path, field: Option<usize>, store: bool) -> Result<()> {
    let mut bytes =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let sum = match field {
        Some(offset) if store => {
            let Some(sum) = store_checksum(&mut bytes, offset) else {
                bail!("Checksum field at {} does not fit in the file", offset);
            };
            fs::write(input, &bytes)
                .with_context(|| format!("Failed to write {}", input.display()))?;
            sum
        }
        Some(offset) => checksum_excluding(&bytes, offset),
        None => checksum(&bytes),
    };

    println!("{:#010X} ({})", sum, sum as i32);
    Ok(())
}
