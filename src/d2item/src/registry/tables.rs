//! TSV table parsing for the registry.
//!
//! Each table is a header line followed by tab-separated rows; `-` marks an empty
//! cell. Property lists are written `id(v1,v2);id(v1)`, and several lists in one
//! cell are separated by `&`.

use super::{
    AffixDef, AffixKind, CharClass, EncodeKind, ItemCategory, ItemType, Range, Registry,
    RunewordDef, SetItemDef, SocketBonus, StatDef, UniqueDef,
};
use crate::format::ItemVersion;
use crate::properties::MagicalAttribute;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Registry construction errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Invalid {table} entry: {message}")]
    Invalid { table: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

const ITEM_TYPES: &str = "item_types.tsv";
const STATS: &str = "stats.tsv";
const RUNEWORDS: &str = "runewords.tsv";
const AFFIXES: &str = "affixes.tsv";
const RARE_NAMES: &str = "rare_names.tsv";
const SET_ITEMS: &str = "set_items.tsv";
const UNIQUES: &str = "uniques.tsv";
const SOCKET_BONUSES: &str = "socket_bonuses.tsv";

// Embed tables at compile time
const EMBEDDED: [(&str, &str); 8] = [
    (ITEM_TYPES, include_str!("../../../../share/data/item_types.tsv")),
    (STATS, include_str!("../../../../share/data/stats.tsv")),
    (RUNEWORDS, include_str!("../../../../share/data/runewords.tsv")),
    (AFFIXES, include_str!("../../../../share/data/affixes.tsv")),
    (RARE_NAMES, include_str!("../../../../share/data/rare_names.tsv")),
    (SET_ITEMS, include_str!("../../../../share/data/set_items.tsv")),
    (UNIQUES, include_str!("../../../../share/data/uniques.tsv")),
    (SOCKET_BONUSES, include_str!("../../../../share/data/socket_bonuses.tsv")),
];

fn embedded_source(file: &str) -> &'static str {
    EMBEDDED
        .iter()
        .find(|(name, _)| *name == file)
        .map(|(_, text)| *text)
        .unwrap_or("")
}

/// Registry from the embedded tables.
///
/// Rows that fail to parse are skipped with a warning.
pub(super) fn embedded() -> Registry {
    let mut registry = Registry::default();
    for (file, text) in EMBEDDED {
        if let Err(e) = load_table(&mut registry, file, text, false) {
            tracing::warn!("skipping embedded table {}: {}", file, e);
        }
    }
    tracing::debug!(
        item_types = registry.item_types.len(),
        stats = registry.stats.len(),
        runewords = registry.runewords.len(),
        "loaded built-in registry"
    );
    registry
}

/// Registry from TSV files in `dir`, falling back to embedded copies
pub(super) fn from_dir(dir: &Path) -> Result<Registry, RegistryError> {
    let mut registry = Registry::default();
    for (file, _) in EMBEDDED {
        let path = dir.join(file);
        let text: Cow<'static, str> = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| RegistryError::Io {
                path: path.clone(),
                source,
            })?;
            tracing::debug!("loading {}", path.display());
            Cow::Owned(text)
        } else {
            tracing::debug!("{} not found, using built-in table", path.display());
            Cow::Borrowed(embedded_source(file))
        };
        load_table(&mut registry, file, &text, true)?;
    }
    Ok(registry)
}

fn load_table(
    registry: &mut Registry,
    file: &str,
    text: &str,
    strict: bool,
) -> Result<(), RegistryError> {
    match file {
        ITEM_TYPES => {
            for item_type in parse_rows(file, text, strict, parse_item_type)? {
                registry.insert_item_type(item_type);
            }
        }
        STATS => {
            for stat in parse_rows(file, text, strict, parse_stat)? {
                registry.stats.insert(stat.id, stat);
            }
        }
        RUNEWORDS => registry.runewords = parse_rows(file, text, strict, parse_runeword)?,
        AFFIXES => {
            for affix in parse_rows(file, text, strict, parse_affix)? {
                let table = match affix.kind {
                    AffixKind::Prefix => &mut registry.magic_prefixes,
                    AffixKind::Suffix => &mut registry.magic_suffixes,
                };
                table.insert(affix.id, affix);
            }
        }
        RARE_NAMES => {
            for (kind, id, name) in parse_rows(file, text, strict, parse_rare_name)? {
                let table = match kind {
                    AffixKind::Prefix => &mut registry.rare_prefixes,
                    AffixKind::Suffix => &mut registry.rare_suffixes,
                };
                table.insert(id, name);
            }
        }
        SET_ITEMS => {
            for set_item in parse_rows(file, text, strict, parse_set_item)? {
                registry.set_items.insert(set_item.id, set_item);
            }
        }
        UNIQUES => {
            for unique in parse_rows(file, text, strict, parse_unique)? {
                registry.uniques.insert(unique.id, unique);
            }
        }
        SOCKET_BONUSES => {
            for bonus in parse_rows(file, text, strict, parse_socket_bonus)? {
                registry.socket_bonuses.insert(bonus.code.clone(), bonus);
            }
        }
        _ => {}
    }
    Ok(())
}

// ============================================================================
// Rows
// ============================================================================

struct Row<'a> {
    cols: Vec<&'a str>,
}

impl<'a> Row<'a> {
    fn str(&self, index: usize) -> Result<&'a str, String> {
        self.cols
            .get(index)
            .copied()
            .map(str::trim)
            .ok_or_else(|| format!("missing column {}", index + 1))
    }

    fn opt(&self, index: usize) -> Result<Option<&'a str>, String> {
        let value = self.str(index)?;
        Ok(if value.is_empty() || value == "-" {
            None
        } else {
            Some(value)
        })
    }

    fn num<T: FromStr>(&self, index: usize) -> Result<T, String> {
        let value = self.str(index)?;
        value
            .parse()
            .map_err(|_| format!("column {}: '{}' is not a number", index + 1, value))
    }

    fn opt_num<T: FromStr>(&self, index: usize) -> Result<Option<T>, String> {
        match self.opt(index)? {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| format!("column {}: '{}' is not a number", index + 1, value)),
        }
    }

    fn flag(&self, index: usize) -> Result<bool, String> {
        Ok(self.num::<u8>(index)? != 0)
    }

    fn range(&self, min: usize, max: usize) -> Result<Option<Range>, String> {
        Ok(match (self.opt_num(min)?, self.opt_num(max)?) {
            (Some(min), Some(max)) => Some(Range { min, max }),
            _ => None,
        })
    }
}

/// Parse every data row; in lenient mode bad rows are logged and skipped
fn parse_rows<T>(
    file: &str,
    text: &str,
    strict: bool,
    parse: impl Fn(&Row<'_>) -> Result<T, String>,
) -> Result<Vec<T>, RegistryError> {
    let mut out = Vec::new();
    for (index, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let row = Row {
            cols: line.split('\t').collect(),
        };
        match parse(&row) {
            Ok(value) => out.push(value),
            Err(message) if strict => {
                return Err(RegistryError::Parse {
                    file: file.to_string(),
                    line: index + 1,
                    message,
                })
            }
            Err(message) => tracing::warn!("{}:{}: {}", file, index + 1, message),
        }
    }
    Ok(out)
}

// ============================================================================
// Tables
// ============================================================================

fn parse_item_type(row: &Row<'_>) -> Result<ItemType, String> {
    let category = row.str(3)?;
    let class = row
        .opt(21)?
        .map(CharClass::from_str)
        .transpose()?;

    Ok(ItemType {
        code: row.str(0)?.to_string(),
        id: row.num(1)?,
        name: row.str(2)?.to_string(),
        category: ItemCategory::from_name(category)
            .ok_or_else(|| format!("unknown category '{}'", category))?,
        width: row.num(4)?,
        height: row.num(5)?,
        defense: row.range(6, 7)?,
        durability: row.opt_num(8)?,
        damage: row.range(9, 10)?,
        two_handed_damage: row.range(11, 12)?,
        max_sockets: row.num(13)?,
        required_level: row.num(14)?,
        required_strength: row.num(15)?,
        required_dexterity: row.num(16)?,
        stack_max: row.num(17)?,
        expansion: row.flag(18)?,
        two_handed: row.flag(19)?,
        compact: row.flag(20)?,
        class,
        tiers: [
            row.opt(22)?.map(str::to_string),
            row.opt(23)?.map(str::to_string),
            row.opt(24)?.map(str::to_string),
        ],
        upgrade: row.opt(25)?.map(str::to_string),
        belt_rows: row.num(26)?,
    })
}

fn parse_stat(row: &Row<'_>) -> Result<StatDef, String> {
    let encode_code: u8 = row.num(5)?;
    let chain = match row.opt(6)? {
        None => Vec::new(),
        Some(list) => list
            .split(',')
            .map(|id| {
                id.trim()
                    .parse()
                    .map_err(|_| format!("bad chained stat id '{}'", id))
            })
            .collect::<Result<Vec<u16>, String>>()?,
    };
    let legacy = match (row.opt_num(7)?, row.opt_num(8)?) {
        (Some(bits), Some(add)) => Some((bits, add)),
        _ => None,
    };

    let stat = StatDef {
        id: row.num(0)?,
        name: row.str(1)?.to_string(),
        bits: row.num(2)?,
        add: row.num(3)?,
        param_bits: row.num(4)?,
        encode: EncodeKind::from_code(encode_code)
            .ok_or_else(|| format!("unknown encode kind {}", encode_code))?,
        chain,
        legacy,
        description: row.opt(9)?.unwrap_or_default().to_string(),
    };
    stat.check_encoding()?;
    Ok(stat)
}

fn parse_runeword(row: &Row<'_>) -> Result<RunewordDef, String> {
    let version = row.str(4)?;
    Ok(RunewordDef {
        id: row.num(0)?,
        name: row.str(1)?.to_string(),
        runes: split_list(row.str(2)?),
        categories: split_list(row.str(3)?),
        min_version: version.parse::<ItemVersion>()?,
        properties: parse_properties(row.opt(5)?)?,
    })
}

fn parse_affix(row: &Row<'_>) -> Result<AffixDef, String> {
    Ok(AffixDef {
        kind: parse_kind(row.str(0)?)?,
        id: row.num(1)?,
        name: row.str(2)?.to_string(),
        level: row.num(3)?,
        properties: parse_properties(row.opt(4)?)?,
    })
}

fn parse_rare_name(row: &Row<'_>) -> Result<(AffixKind, u16, String), String> {
    Ok((
        parse_kind(row.str(0)?)?,
        row.num(1)?,
        row.str(2)?.to_string(),
    ))
}

fn parse_set_item(row: &Row<'_>) -> Result<SetItemDef, String> {
    let bonuses = match row.opt(6)? {
        None => Vec::new(),
        Some(lists) => lists
            .split('&')
            .map(|list| parse_properties(Some(list)))
            .collect::<Result<Vec<_>, String>>()?,
    };
    Ok(SetItemDef {
        id: row.num(0)?,
        name: row.str(1)?.to_string(),
        set_name: row.str(2)?.to_string(),
        code: row.str(3)?.to_string(),
        level: row.num(4)?,
        properties: parse_properties(row.opt(5)?)?,
        bonuses,
    })
}

fn parse_unique(row: &Row<'_>) -> Result<UniqueDef, String> {
    Ok(UniqueDef {
        id: row.num(0)?,
        name: row.str(1)?.to_string(),
        code: row.str(2)?.to_string(),
        level: row.num(3)?,
        properties: parse_properties(row.opt(4)?)?,
    })
}

fn parse_socket_bonus(row: &Row<'_>) -> Result<SocketBonus, String> {
    Ok(SocketBonus {
        code: row.str(0)?.to_string(),
        weapon: parse_properties(row.opt(1)?)?,
        armor: parse_properties(row.opt(2)?)?,
        shield: parse_properties(row.opt(3)?)?,
    })
}

fn parse_kind(value: &str) -> Result<AffixKind, String> {
    match value {
        "prefix" => Ok(AffixKind::Prefix),
        "suffix" => Ok(AffixKind::Suffix),
        other => Err(format!("unknown affix kind '{}'", other)),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `id(v1,v2);id(v1)`
pub(crate) fn parse_properties(value: Option<&str>) -> Result<Vec<MagicalAttribute>, String> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };

    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, rest) = entry
                .split_once('(')
                .ok_or_else(|| format!("bad property '{}'", entry))?;
            let values = rest
                .strip_suffix(')')
                .ok_or_else(|| format!("unclosed property '{}'", entry))?;
            let id: u16 = id
                .trim()
                .parse()
                .map_err(|_| format!("bad stat id in '{}'", entry))?;
            let values = values
                .split(',')
                .map(|v| {
                    v.trim()
                        .parse::<i64>()
                        .map_err(|_| format!("bad value in '{}'", entry))
                })
                .collect::<Result<Vec<_>, String>>()?;
            Ok(MagicalAttribute { id, values })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_properties() {
        let props = parse_properties(Some("16(20); 17(30,30)")).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[1], MagicalAttribute::new(17, vec![30, 30]));
        assert_eq!(parse_properties(None).unwrap(), Vec::new());
        assert!(parse_properties(Some("16(20")).is_err());
        assert!(parse_properties(Some("x(1)")).is_err());
    }

    #[test]
    fn test_embedded_tables_parse_strictly() {
        for (file, text) in EMBEDDED {
            let mut registry = Registry::default();
            load_table(&mut registry, file, text, true)
                .unwrap_or_else(|e| panic!("{}: {}", file, e));
        }
    }

    #[test]
    fn test_lenient_skips_bad_rows() {
        let text = "id\tname\tbits\tadd\tparam\tencode\tchain\tlb\tla\tdesc\n\
                    0\tstrength\t8\t32\t0\t0\t-\t-\t-\tStr\n\
                    1\tbroken\tx\t0\t0\t0\t-\t-\t-\tBroken\n";
        let mut registry = Registry::default();
        load_table(&mut registry, STATS, text, false).unwrap();
        assert_eq!(registry.stats.len(), 1);

        let mut strict = Registry::default();
        let err = load_table(&mut strict, STATS, text, true).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_from_dir_overrides_one_table() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(UNIQUES),
            "id\tname\tcode\tlevel\tproperties\n500\tTest Cap\tcap\t1\t0(5)\n",
        )
        .unwrap();

        let registry = Registry::from_tsv_dir(dir.path()).unwrap();
        assert_eq!(registry.unique(500).unwrap().name, "Test Cap");
        assert!(registry.unique(9).is_none());
        // other tables come from the embedded copies
        assert!(registry.item_type("cap").is_some());
    }

    #[test]
    fn test_from_dir_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(RUNEWORDS),
            "id\tname\trunes\tcategories\tmin_version\tproperties\n1\tBad\tr01\tsword\tv999\t-\n",
        )
        .unwrap();
        assert!(Registry::from_tsv_dir(dir.path()).is_err());
    }
}
