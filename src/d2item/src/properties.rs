//! Magical attribute lists.
//!
//! A property list is a run of records, each a 9-bit stat id followed by its
//! payload, ended by the id `0x1FF`. The payload shape comes from the stat's
//! registry entry:
//!
//! | Encode kind | Payload |
//! |---|---|
//! | plain | optional parameter, value, then each chained stat's value (no id prefix) |
//! | skill on event | 6-bit level, 10-bit skill, 7-bit chance |
//! | charged skill | 6-bit level, 10-bit skill, 8-bit charges, 8-bit maximum |
//! | time based | 2-bit period, 10-bit start, 10-bit end (one 22-bit value before Resurrected) |
//!
//! Every value except parameters and skill fields is stored with the stat's bias added.

use crate::bitstream::{BitError, BitReader, BitStore, BitWriter};
use crate::error::{ItemError, Result};
use crate::format::ItemFormat;
use crate::registry::{EncodeKind, Registry, StatDef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Width of a stat id
pub const PROPERTY_ID_BITS: usize = 9;

/// Stat id that ends a property list
pub const LIST_TERMINATOR: u16 = 0x1FF;

const SKILL_LEVEL_BITS: usize = 6;
const SKILL_ID_BITS: usize = 10;
const CHARGE_BITS: usize = 8;
const TIME_PERIOD_BITS: usize = 2;
const TIME_VALUE_BITS: usize = 10;

/// One decoded property record: a stat id and its 1-4 values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MagicalAttribute {
    pub id: u16,
    pub values: Vec<i64>,
}

impl MagicalAttribute {
    pub fn new(id: u16, values: impl Into<Vec<i64>>) -> Self {
        Self {
            id,
            values: values.into(),
        }
    }

    pub fn value(&self, index: usize) -> Option<i64> {
        self.values.get(index).copied()
    }

    pub fn name<'r>(&self, registry: &'r Registry) -> Option<&'r str> {
        registry.stat(self.id).map(|s| s.name.as_str())
    }

    /// Human-readable line from the stat's description template
    pub fn description(&self, registry: &Registry) -> String {
        let Some(stat) = registry.stat(self.id) else {
            return format!("Unknown stat {} {:?}", self.id, self.values);
        };

        let values = if stat.encode == EncodeKind::TimeBased && self.values.len() == 1 {
            split_time_based(self.values[0]).to_vec()
        } else {
            self.values.clone()
        };

        let mut text = stat.description.clone();
        for (i, value) in values.iter().enumerate() {
            text = text.replace(&format!("{{{}}}", i), &value.to_string());
        }
        text
    }
}

impl fmt::Display for MagicalAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.id)?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", v)?;
        }
        f.write_str(")")
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a property list, consuming its terminator.
///
/// An unknown stat id or a stat whose metadata cannot describe its payload aborts
/// the whole list.
pub fn read_list(
    reader: &mut BitReader<'_>,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<Vec<MagicalAttribute>> {
    let start = reader.position();
    let unterminated = |e: BitError| match e {
        BitError::OutOfBounds { .. } => ItemError::UnterminatedPropertyList(start),
        other => ItemError::Bits(other),
    };

    let mut attributes = Vec::new();
    loop {
        let id = reader.read(PROPERTY_ID_BITS).map_err(unterminated)? as u16;
        if id == LIST_TERMINATOR {
            tracing::trace!(start, count = attributes.len(), "property list terminated");
            return Ok(attributes);
        }

        let stat = registry.stat(id).ok_or(ItemError::UnknownStat(id))?;
        check_stat(stat, registry)?;

        let values = match read_record(reader, stat, format, registry) {
            Ok(values) => values,
            Err(ItemError::Bits(e)) => return Err(unterminated(e)),
            Err(e) => return Err(e),
        };
        tracing::trace!(id, ?values, "property record");
        attributes.push(MagicalAttribute { id, values });
    }
}

fn read_record(
    reader: &mut BitReader<'_>,
    stat: &StatDef,
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<Vec<i64>> {
    let (bits, add) = format.stat_encoding(stat);

    match stat.encode {
        EncodeKind::Plain => {
            let mut values = Vec::with_capacity(1 + stat.chain.len());
            if stat.param_bits > 0 {
                values.push(reader.read(usize::from(stat.param_bits))? as i64);
            }
            values.push(reader.read(bits)? as i64 - add);
            for &next in &stat.chain {
                let chained = registry.stat(next).ok_or(ItemError::UnknownStat(next))?;
                let (bits, add) = format.stat_encoding(chained);
                values.push(reader.read(bits)? as i64 - add);
            }
            Ok(values)
        }
        EncodeKind::SkillOnEvent => {
            let level = reader.read(SKILL_LEVEL_BITS)? as i64;
            let skill = reader.read(SKILL_ID_BITS)? as i64;
            let chance = reader.read(bits)? as i64 - add;
            Ok(vec![level, skill, chance])
        }
        EncodeKind::ChargedSkill => {
            let level = reader.read(SKILL_LEVEL_BITS)? as i64;
            let skill = reader.read(SKILL_ID_BITS)? as i64;
            let charges = reader.read(CHARGE_BITS)? as i64;
            let max_charges = reader.read(CHARGE_BITS)? as i64;
            Ok(vec![level, skill, charges, max_charges])
        }
        EncodeKind::TimeBased => {
            if format.splits_time_based() {
                let period = reader.read(TIME_PERIOD_BITS)? as i64;
                let start = reader.read(TIME_VALUE_BITS)? as i64;
                let end = reader.read(TIME_VALUE_BITS)? as i64;
                Ok(vec![period, start, end])
            } else {
                Ok(vec![reader.read(bits)? as i64])
            }
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a property list followed by its terminator
pub fn write_list(
    writer: &mut BitWriter,
    attributes: &[MagicalAttribute],
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<()> {
    for attribute in attributes {
        let stat = registry
            .stat(attribute.id)
            .ok_or(ItemError::UnknownStat(attribute.id))?;
        check_stat(stat, registry)?;

        let values = normalize_values(stat, &attribute.values, format);
        let expected = value_count(stat, format);
        if values.len() != expected {
            return Err(ItemError::StatEncodingMismatch {
                id: stat.id,
                detail: format!("expected {} values, got {}", expected, values.len()),
            });
        }

        writer.write(PROPERTY_ID_BITS, u64::from(attribute.id))?;
        write_record(writer, stat, &values, format, registry)?;
    }
    writer.write(PROPERTY_ID_BITS, u64::from(LIST_TERMINATOR))?;
    Ok(())
}

/// Encode a list into a standalone buffer, returning it and its bit length
pub fn encode_list(
    attributes: &[MagicalAttribute],
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<(BitStore, usize)> {
    let mut writer = BitWriter::new();
    write_list(&mut writer, attributes, format, registry)?;
    Ok(writer.finish())
}

fn write_record(
    writer: &mut BitWriter,
    stat: &StatDef,
    values: &[i64],
    format: &dyn ItemFormat,
    registry: &Registry,
) -> Result<()> {
    let (bits, add) = format.stat_encoding(stat);

    match stat.encode {
        EncodeKind::Plain => {
            let mut rest = values;
            if stat.param_bits > 0 {
                write_raw(writer, usize::from(stat.param_bits), rest[0], "stat parameter")?;
                rest = &rest[1..];
            }
            write_raw(writer, bits, rest[0] + add, "stat value")?;
            for (&next, &value) in stat.chain.iter().zip(&rest[1..]) {
                let chained = registry.stat(next).ok_or(ItemError::UnknownStat(next))?;
                let (bits, add) = format.stat_encoding(chained);
                write_raw(writer, bits, value + add, "chained stat value")?;
            }
        }
        EncodeKind::SkillOnEvent => {
            write_raw(writer, SKILL_LEVEL_BITS, values[0], "skill level")?;
            write_raw(writer, SKILL_ID_BITS, values[1], "skill id")?;
            write_raw(writer, bits, values[2] + add, "skill chance")?;
        }
        EncodeKind::ChargedSkill => {
            write_raw(writer, SKILL_LEVEL_BITS, values[0], "skill level")?;
            write_raw(writer, SKILL_ID_BITS, values[1], "skill id")?;
            write_raw(writer, CHARGE_BITS, values[2], "charges")?;
            write_raw(writer, CHARGE_BITS, values[3], "max charges")?;
        }
        EncodeKind::TimeBased => {
            if format.splits_time_based() {
                write_raw(writer, TIME_PERIOD_BITS, values[0], "time period")?;
                write_raw(writer, TIME_VALUE_BITS, values[1], "time start value")?;
                write_raw(writer, TIME_VALUE_BITS, values[2], "time end value")?;
            } else {
                write_raw(writer, bits, values[0], "time-based value")?;
            }
        }
    }
    Ok(())
}

fn write_raw(writer: &mut BitWriter, bits: usize, raw: i64, field: &'static str) -> Result<()> {
    let max = (1u64 << bits) - 1;
    if raw < 0 || raw as u64 > max {
        return Err(ItemError::OutOfRange {
            field,
            value: raw as u64,
            max,
        });
    }
    writer.write(bits, raw as u64)?;
    Ok(())
}

/// Number of values a record of `stat` carries under `format`
pub fn value_count(stat: &StatDef, format: &dyn ItemFormat) -> usize {
    match stat.encode {
        EncodeKind::Plain => usize::from(stat.param_bits > 0) + 1 + stat.chain.len(),
        EncodeKind::SkillOnEvent => 3,
        EncodeKind::ChargedSkill => 4,
        EncodeKind::TimeBased => {
            if format.splits_time_based() {
                3
            } else {
                1
            }
        }
    }
}

/// Bring time-based values into the shape `format` stores.
///
/// The split and the packed forms occupy the same 22 bits, so conversion is lossless.
fn normalize_values(stat: &StatDef, values: &[i64], format: &dyn ItemFormat) -> Vec<i64> {
    if stat.encode != EncodeKind::TimeBased {
        return values.to_vec();
    }
    match (format.splits_time_based(), values.len()) {
        (true, 1) => split_time_based(values[0]).to_vec(),
        (false, 3) => vec![values[0] | (values[1] << TIME_PERIOD_BITS) | (values[2] << 12)],
        _ => values.to_vec(),
    }
}

fn split_time_based(raw: i64) -> [i64; 3] {
    [raw & 0x3, (raw >> TIME_PERIOD_BITS) & 0x3FF, (raw >> 12) & 0x3FF]
}

/// Reject stats whose metadata cannot describe their payload
fn check_stat(stat: &StatDef, registry: &Registry) -> Result<()> {
    stat.check_encoding()
        .map_err(|detail| ItemError::StatEncodingMismatch { id: stat.id, detail })?;
    for &next in &stat.chain {
        let chained = registry.stat(next).ok_or(ItemError::UnknownStat(next))?;
        if chained.encode != EncodeKind::Plain || chained.param_bits != 0 {
            return Err(ItemError::StatEncodingMismatch {
                id: stat.id,
                detail: format!("chained stat {} is not a plain value", next),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Combining
// ============================================================================

/// Merge several lists into one, summing repeated plain stats.
///
/// Plain stats with a parameter merge only when the parameters match; skill and
/// time-based records are never merged.
pub fn combine<'a>(
    lists: impl IntoIterator<Item = &'a [MagicalAttribute]>,
    registry: &Registry,
) -> Vec<MagicalAttribute> {
    let mut combined: Vec<MagicalAttribute> = Vec::new();

    for attribute in lists.into_iter().flatten() {
        let mergeable = registry
            .stat(attribute.id)
            .map(|s| s.encode == EncodeKind::Plain)
            .unwrap_or(false);
        let has_param = registry
            .stat(attribute.id)
            .map(|s| s.param_bits > 0)
            .unwrap_or(false);

        let existing = combined.iter_mut().find(|a| {
            mergeable
                && a.id == attribute.id
                && a.values.len() == attribute.values.len()
                && (!has_param || a.values.first() == attribute.values.first())
        });

        match existing {
            Some(target) => {
                let skip = usize::from(has_param);
                for (t, v) in target.values.iter_mut().zip(&attribute.values).skip(skip) {
                    *t += v;
                }
            }
            None => combined.push(attribute.clone()),
        }
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ItemVersion;

    fn roundtrip(attrs: &[MagicalAttribute], version: ItemVersion) -> Vec<MagicalAttribute> {
        let registry = Registry::builtin();
        let format = version.format();
        let (store, len) = encode_list(attrs, format, registry).unwrap();
        let mut reader = BitReader::new(store.as_bytes());
        let decoded = read_list(&mut reader, format, registry).unwrap();
        assert_eq!(reader.position(), len);
        decoded
    }

    #[test]
    fn test_empty_list_is_terminator() {
        let registry = Registry::builtin();
        let (store, len) = encode_list(&[], ItemVersion::V110.format(), registry).unwrap();
        assert_eq!(len, PROPERTY_ID_BITS);
        assert_eq!(store.read(0, 9).unwrap(), 0x1FF);
    }

    #[test]
    fn test_plain_with_bias() {
        let attrs = vec![MagicalAttribute::new(39, vec![-20])];
        assert_eq!(roundtrip(&attrs, ItemVersion::V110), attrs);

        let registry = Registry::builtin();
        let (store, _) = encode_list(&attrs, ItemVersion::V110.format(), registry).unwrap();
        // fire resist stores value + 50
        assert_eq!(store.read(9, 8).unwrap(), 30);
    }

    #[test]
    fn test_chained_values() {
        let attrs = vec![
            MagicalAttribute::new(17, vec![120, 120]),
            MagicalAttribute::new(54, vec![3, 14, 75]),
            MagicalAttribute::new(57, vec![154, 154, 125]),
        ];
        assert_eq!(roundtrip(&attrs, ItemVersion::V160), attrs);

        let registry = Registry::builtin();
        let (_, len) = encode_list(&attrs[..1], ItemVersion::V110.format(), registry).unwrap();
        // id + two 9-bit values, no id prefix for the chained stat, then the terminator
        assert_eq!(len, 9 + 9 + 9 + 9);
    }

    #[test]
    fn test_parameter_stat() {
        let attrs = vec![MagicalAttribute::new(97, vec![54, 1])];
        assert_eq!(roundtrip(&attrs, ItemVersion::V110), attrs);
    }

    #[test]
    fn test_skill_records() {
        let attrs = vec![
            MagicalAttribute::new(198, vec![12, 48, 15]),
            MagicalAttribute::new(204, vec![13, 258, 9, 9]),
        ];
        assert_eq!(roundtrip(&attrs, ItemVersion::V110), attrs);
    }

    #[test]
    fn test_time_based_forms() {
        let split = vec![MagicalAttribute::new(268, vec![1, 10, 300])];
        assert_eq!(roundtrip(&split, ItemVersion::V140), split);

        let packed = roundtrip(&split, ItemVersion::V110);
        assert_eq!(packed.len(), 1);
        assert_eq!(packed[0].values, vec![1 | (10 << 2) | (300 << 12)]);

        // The packed value converts back to the split form losslessly
        assert_eq!(roundtrip(&packed, ItemVersion::V140), split);
    }

    #[test]
    fn test_legacy_width() {
        let registry = Registry::builtin();
        let attrs = vec![MagicalAttribute::new(31, vec![100])];
        let (_, old) = encode_list(&attrs, ItemVersion::V109.format(), registry).unwrap();
        let (_, new) = encode_list(&attrs, ItemVersion::V110.format(), registry).unwrap();
        assert_eq!(new - old, 1);
    }

    #[test]
    fn test_reencode_is_identical() {
        let registry = Registry::builtin();
        let format = ItemVersion::V110.format();
        let attrs = vec![
            MagicalAttribute::new(0, vec![15]),
            MagicalAttribute::new(48, vec![5, 30]),
            MagicalAttribute::new(127, vec![2]),
        ];
        let (store, len) = encode_list(&attrs, format, registry).unwrap();
        let decoded = read_list(&mut BitReader::new(store.as_bytes()), format, registry).unwrap();
        let (again, again_len) = encode_list(&decoded, format, registry).unwrap();
        assert_eq!(len, again_len);
        assert_eq!(store, again);
    }

    #[test]
    fn test_unknown_stat_aborts() {
        let registry = Registry::builtin();
        let mut writer = BitWriter::new();
        writer.write(9, 5).unwrap();
        writer.write(9, 0x1FF).unwrap();
        let (store, _) = writer.finish();
        let result = read_list(
            &mut BitReader::new(store.as_bytes()),
            ItemVersion::V110.format(),
            registry,
        );
        assert_eq!(result, Err(ItemError::UnknownStat(5)));
    }

    #[test]
    fn test_unterminated_list() {
        let registry = Registry::builtin();
        let mut writer = BitWriter::new();
        writer.write(9, 0).unwrap();
        writer.write(8, 40).unwrap();
        let (store, _) = writer.finish();
        let result = read_list(
            &mut BitReader::new(store.as_bytes()),
            ItemVersion::V110.format(),
            registry,
        );
        assert_eq!(result, Err(ItemError::UnterminatedPropertyList(0)));
    }

    #[test]
    fn test_value_out_of_range() {
        let registry = Registry::builtin();
        let attrs = vec![MagicalAttribute::new(127, vec![9])];
        let result = encode_list(&attrs, ItemVersion::V110.format(), registry);
        assert!(matches!(result, Err(ItemError::OutOfRange { .. })));
    }

    #[test]
    fn test_wrong_value_count() {
        let registry = Registry::builtin();
        let attrs = vec![MagicalAttribute::new(17, vec![50])];
        let result = encode_list(&attrs, ItemVersion::V110.format(), registry);
        assert!(matches!(
            result,
            Err(ItemError::StatEncodingMismatch { id: 17, .. })
        ));
    }

    #[test]
    fn test_description() {
        let registry = Registry::builtin();
        assert_eq!(
            MagicalAttribute::new(48, vec![5, 30]).description(registry),
            "Adds 5-30 Fire Damage"
        );
        assert_eq!(
            MagicalAttribute::new(0, vec![10]).description(registry),
            "+10 to Strength"
        );
        assert!(MagicalAttribute::new(500, vec![1])
            .description(registry)
            .starts_with("Unknown stat"));
    }

    #[test]
    fn test_combine() {
        let registry = Registry::builtin();
        let a = vec![
            MagicalAttribute::new(0, vec![5]),
            MagicalAttribute::new(97, vec![54, 1]),
        ];
        let b = vec![
            MagicalAttribute::new(0, vec![10]),
            MagicalAttribute::new(97, vec![54, 2]),
            MagicalAttribute::new(97, vec![36, 1]),
            MagicalAttribute::new(198, vec![1, 2, 3]),
            MagicalAttribute::new(198, vec![1, 2, 3]),
        ];
        let combined = combine([a.as_slice(), b.as_slice()], registry);
        assert_eq!(combined[0], MagicalAttribute::new(0, vec![15]));
        assert_eq!(combined[1], MagicalAttribute::new(97, vec![54, 3]));
        assert_eq!(combined[2], MagicalAttribute::new(97, vec![36, 1]));
        assert_eq!(combined.len(), 5);
    }
}
