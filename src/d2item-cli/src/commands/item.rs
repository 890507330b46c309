//! Decode, encode, convert and inspect handlers

use anyhow::{bail, Context, Result};
use d2item::{CodecOptions, GameMode, Item, ItemVersion, Registry};
use serde_json::Value;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::{encode_records, read_records, write_output};
use crate::cli::InputArgs;

/// Trees of every record, an array when the input is a list
pub fn trees(items: &[Item<'_>], options: &CodecOptions, list: bool) -> Result<Value> {
    let mut trees = items
        .iter()
        .map(|item| options.export(item))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to export item tree")?;
    match trees.pop() {
        Some(tree) if !list && trees.is_empty() => Ok(tree),
        Some(tree) => {
            trees.push(tree);
            Ok(Value::Array(trees))
        }
        None => Ok(Value::Array(Vec::new())),
    }
}

pub fn render_tree(tree: &Value, yaml: bool) -> Result<String> {
    if yaml {
        serde_yaml::to_string(tree).context("Failed to serialize YAML")
    } else {
        serde_json::to_string_pretty(tree).context("Failed to serialize JSON")
    }
}

pub fn decode(
    input: &InputArgs,
    options: &CodecOptions,
    yaml: bool,
    output: Option<&Path>,
) -> Result<()> {
    let items = read_records(input, options, Registry::builtin())?;
    let text = render_tree(&trees(&items, options, input.list)?, yaml)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?
        }
        None => println!("{}", text),
    }
    Ok(())
}

/// Read a JSON or YAML tree file
pub fn load_tree(path: &Path) -> Result<Value> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
        .unwrap_or(false);
    if is_yaml {
        serde_yaml::from_str(&text).context("Failed to parse YAML tree")
    } else {
        serde_json::from_str(&text).context("Failed to parse JSON tree")
    }
}

/// Encode a tree value into record bytes
pub fn encode_tree(tree: &Value, options: &CodecOptions) -> Result<Vec<u8>> {
    let registry = Registry::builtin();
    match tree {
        Value::Array(entries) => {
            let items = entries
                .iter()
                .enumerate()
                .map(|(index, entry)| {
                    options
                        .encode_tree(entry, registry)
                        .with_context(|| format!("Failed to encode item {}", index))
                })
                .collect::<Result<Vec<_>>>()?;
            encode_records(&items, true)
        }
        Value::Object(_) => {
            let item = options
                .encode_tree(tree, registry)
                .context("Failed to encode item")?;
            Ok(item.to_bytes())
        }
        _ => bail!("A tree must be an object or an array of objects"),
    }
}

pub fn encode(input: &Path, output: &Path, options: &CodecOptions) -> Result<()> {
    let bytes = encode_tree(&load_tree(input)?, options)?;
    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

pub struct ConvertTarget {
    pub from: ItemVersion,
    pub from_mode: GameMode,
    pub to: ItemVersion,
    pub to_mode: GameMode,
}

pub fn convert(
    input: &InputArgs,
    target: &ConvertTarget,
    output: Option<&Path>,
    backup: bool,
) -> Result<()> {
    let source = CodecOptions::default()
        .with_version(target.from)
        .with_mode(target.from_mode);
    let items = read_records(input, &source, Registry::builtin())?;
    let converted = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.convert(target.to, target.to_mode).with_context(|| {
                format!(
                    "Item {} ({}) cannot be converted to {} {}",
                    index,
                    item.code(),
                    target.to,
                    target.to_mode
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let bytes = encode_records(&converted, input.list)?;
    let path = output.unwrap_or(input.input.as_path());
    write_output(path, &bytes, backup && output.is_none())?;
    println!(
        "Converted {} item(s) from {} to {}",
        converted.len(),
        target.from,
        target.to
    );
    Ok(())
}

/// Human-readable summary of one record
pub fn describe(item: &Item<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} [{}]", item.display_name(), item.code());
    let _ = writeln!(
        out,
        "  format: {} {}, {} bits",
        item.version(),
        item.game_mode(),
        item.bit_len()
    );
    let _ = writeln!(
        out,
        "  quality: {}, flags: {:#010X}, required level: {}",
        item.quality(),
        item.flags(),
        item.required_level()
    );
    if let Some(defense) = item.displayed_defense() {
        let _ = writeln!(out, "  defense: {}", defense);
    }
    if let Some(damage) = item.displayed_damage() {
        let _ = writeln!(out, "  damage: {}-{}", damage.min, damage.max);
    }
    if let (Some(current), Some(max)) = (item.durability(), item.max_durability_value()) {
        let _ = writeln!(out, "  durability: {}/{}", current, max);
    }
    if let Some(quantity) = item.quantity() {
        let _ = writeln!(out, "  quantity: {}", quantity);
    }
    if item.total_sockets() > 0 {
        let _ = writeln!(
            out,
            "  sockets: {}/{}",
            item.filled_sockets(),
            item.total_sockets()
        );
    }
    for attribute in item.combined_attributes() {
        let _ = writeln!(out, "    {}", attribute.description(item.registry()));
    }
    out
}

pub fn inspect(input: &InputArgs, options: &CodecOptions) -> Result<()> {
    let items = read_records(input, options, Registry::builtin())?;
    for (index, item) in items.iter().enumerate() {
        if items.len() > 1 {
            println!("=== Item {} ===", index);
        }
        print!("{}", describe(item));

        println!("\nOffsets (bits):");
        for (field, offset) in item.offsets().iter() {
            println!("  {:<24} {}", field.name(), offset);
        }

        println!("\nHex:");
        print!("{}", item.hex_dump());
        for child in item.socketed_items() {
            println!("\n  socketed:");
            for line in describe(child).lines() {
                println!("  {}", line);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap() -> Item<'static> {
        Item::builder("cap", Registry::builtin())
            .version(ItemVersion::V110)
            .magic(1, 3)
            .build()
            .unwrap()
    }

    fn options() -> CodecOptions {
        CodecOptions::default().with_version(ItemVersion::V110)
    }

    #[test]
    fn test_single_tree_is_an_object() {
        let tree = trees(&[cap()], &options(), false).unwrap();
        assert!(tree.is_object());
        let tree = trees(&[cap()], &options(), true).unwrap();
        assert_eq!(tree.as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_encode_tree_forms() {
        let item = cap();
        let tree = options().export(&item).unwrap();
        assert_eq!(encode_tree(&tree, &options()).unwrap(), item.to_bytes());

        let list = encode_tree(&Value::Array(vec![tree.clone(), tree]), &options()).unwrap();
        assert_eq!(&list[..4], b"JM\x02\x00");
        assert!(encode_tree(&Value::from(3), &options()).is_err());
    }

    #[test]
    fn test_yaml_rendering() {
        let tree = options().export(&cap()).unwrap();
        let yaml = render_tree(&tree, true).unwrap();
        assert!(yaml.contains("type: cap"));
        let back: Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn test_describe() {
        let text = describe(&cap());
        assert!(text.starts_with("Sturdy Cap of Strength [cap]"));
        assert!(text.contains("v110 expansion"));
    }
}
