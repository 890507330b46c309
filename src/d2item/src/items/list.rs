//! Container records: item lists and the corpse, mercenary and golem sections.
//!
//! ```text
//! item list   "JM" count:u16 item*
//! corpses     "JM" count:u16 (header:12 bytes, item list)*
//! mercenary   "jf" [item list]
//! golem       "kf" present:u8 [item]
//! ```

use crate::bitstream::BitReader;
use crate::error::{ItemError, Result};
use crate::format::{GameMode, ItemVersion};
use crate::item::Item;
use crate::registry::Registry;
use serde::{Deserialize, Serialize};

pub const LIST_MARKER: [u8; 2] = *b"JM";
pub const MERCENARY_MARKER: [u8; 2] = *b"jf";
pub const GOLEM_MARKER: [u8; 2] = *b"kf";

const COUNT_BITS: usize = 16;

/// Position data stored ahead of a corpse's items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpseHeader {
    pub unknown: u32,
    pub x: u32,
    pub y: u32,
}

impl CorpseHeader {
    pub const BYTES: usize = 12;

    fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        Ok(Self {
            unknown: reader.read_u32(32)?,
            x: reader.read_u32(32)?,
            y: reader.read_u32(32)?,
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.unknown.to_le_bytes());
        out.extend_from_slice(&self.x.to_le_bytes());
        out.extend_from_slice(&self.y.to_le_bytes());
    }
}

/// The next two bytes, if the reader is byte aligned and has them
pub fn peek_marker(reader: &BitReader<'_>) -> Option<[u8; 2]> {
    let value = reader.peek(16).ok()?;
    Some([(value & 0xFF) as u8, (value >> 8) as u8])
}

pub fn read_marker(reader: &mut BitReader<'_>, expected: [u8; 2]) -> Result<()> {
    let value = reader.read(16)?;
    let found = [(value & 0xFF) as u8, (value >> 8) as u8];
    if found != expected {
        return Err(ItemError::BadListMarker { expected, found });
    }
    Ok(())
}

fn read_count(reader: &mut BitReader<'_>) -> Result<usize> {
    Ok(reader.read(COUNT_BITS)? as usize)
}

fn write_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u16::try_from(count).map_err(|_| ItemError::OutOfRange {
        field: "item count",
        value: count as u64,
        max: u64::from(u16::MAX),
    })?;
    out.extend_from_slice(&count.to_le_bytes());
    Ok(())
}

/// Read `"JM" count` followed by that many top-level items
pub fn read_item_list<'r>(
    reader: &mut BitReader<'_>,
    version: ItemVersion,
    mode: GameMode,
    registry: &'r Registry,
) -> Result<Vec<Item<'r>>> {
    read_marker(reader, LIST_MARKER)?;
    let count = read_count(reader)?;
    let mut items = Vec::with_capacity(count);
    for index in 0..count {
        let item = Item::read(reader, version, mode, registry).inspect_err(|e| {
            tracing::debug!(index, count, error = %e, "item list entry failed to decode");
        })?;
        items.push(item);
    }
    tracing::debug!(count, "read item list");
    Ok(items)
}

pub fn write_item_list<'a, 'r: 'a>(
    out: &mut Vec<u8>,
    items: impl ExactSizeIterator<Item = &'a Item<'r>>,
) -> Result<()> {
    out.extend_from_slice(&LIST_MARKER);
    write_count(out, items.len())?;
    for item in items {
        out.extend(item.to_bytes());
    }
    Ok(())
}

/// Read the corpse section: a count, then a header and item list per corpse
pub fn read_corpses<'r>(
    reader: &mut BitReader<'_>,
    version: ItemVersion,
    mode: GameMode,
    registry: &'r Registry,
) -> Result<Vec<(CorpseHeader, Vec<Item<'r>>)>> {
    read_marker(reader, LIST_MARKER)?;
    let count = read_count(reader)?;
    let mut corpses = Vec::with_capacity(count);
    for _ in 0..count {
        let header = CorpseHeader::read(reader)?;
        let items = read_item_list(reader, version, mode, registry)?;
        corpses.push((header, items));
    }
    Ok(corpses)
}

pub fn write_corpse_count(out: &mut Vec<u8>, count: usize) -> Result<()> {
    out.extend_from_slice(&LIST_MARKER);
    write_count(out, count)
}

pub fn write_corpse<'a, 'r: 'a>(
    out: &mut Vec<u8>,
    header: &CorpseHeader,
    items: impl ExactSizeIterator<Item = &'a Item<'r>>,
) -> Result<()> {
    header.write(out);
    write_item_list(out, items)
}

/// Read the mercenary section. `None` when no hireling list follows the marker.
pub fn read_mercenary<'r>(
    reader: &mut BitReader<'_>,
    version: ItemVersion,
    mode: GameMode,
    registry: &'r Registry,
) -> Result<Option<Vec<Item<'r>>>> {
    read_marker(reader, MERCENARY_MARKER)?;
    if peek_marker(reader) == Some(LIST_MARKER) {
        return read_item_list(reader, version, mode, registry).map(Some);
    }
    Ok(None)
}

pub fn write_mercenary<'a, 'r: 'a>(
    out: &mut Vec<u8>,
    items: Option<impl ExactSizeIterator<Item = &'a Item<'r>>>,
) -> Result<()> {
    out.extend_from_slice(&MERCENARY_MARKER);
    match items {
        Some(items) => write_item_list(out, items),
        None => Ok(()),
    }
}

pub fn read_golem<'r>(
    reader: &mut BitReader<'_>,
    version: ItemVersion,
    mode: GameMode,
    registry: &'r Registry,
) -> Result<Option<Item<'r>>> {
    read_marker(reader, GOLEM_MARKER)?;
    if reader.read(8)? == 0 {
        return Ok(None);
    }
    Item::read(reader, version, mode, registry).map(Some)
}

pub fn write_golem(out: &mut Vec<u8>, golem: Option<&Item<'_>>) {
    out.extend_from_slice(&GOLEM_MARKER);
    match golem {
        Some(item) => {
            out.push(1);
            out.extend(item.to_bytes());
        }
        None => out.push(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    fn item(code: &str) -> Item<'static> {
        Item::builder(code, registry())
            .version(ItemVersion::V110)
            .build()
            .unwrap()
    }

    #[test]
    fn test_item_list_roundtrip() {
        let items = vec![item("cap"), item("gcv"), item("lsd")];
        let mut out = Vec::new();
        write_item_list(&mut out, items.iter()).unwrap();
        assert_eq!(&out[..4], &[b'J', b'M', 3, 0]);

        let mut reader = BitReader::new(&out);
        let decoded =
            read_item_list(&mut reader, ItemVersion::V110, GameMode::Expansion, registry())
                .unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[1].code(), "gcv");
        assert_eq!(reader.position(), out.len() * 8);
    }

    #[test]
    fn test_bad_list_marker() {
        let bytes = [b'J', b'X', 0, 0];
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            read_item_list(&mut reader, ItemVersion::V110, GameMode::Expansion, registry()),
            Err(ItemError::BadListMarker { .. })
        ));
    }

    #[test]
    fn test_corpse_section() {
        let header = CorpseHeader {
            unknown: 7,
            x: 1234,
            y: 5678,
        };
        let items = [item("cap")];
        let mut out = Vec::new();
        write_corpse_count(&mut out, 1).unwrap();
        write_corpse(&mut out, &header, items.iter()).unwrap();

        let mut reader = BitReader::new(&out);
        let corpses =
            read_corpses(&mut reader, ItemVersion::V110, GameMode::Expansion, registry()).unwrap();
        assert_eq!(corpses.len(), 1);
        assert_eq!(corpses[0].0, header);
        assert_eq!(corpses[0].1[0].code(), "cap");
    }

    #[test]
    fn test_mercenary_and_golem_sections() {
        let mut out = MERCENARY_MARKER.to_vec();
        write_golem(&mut out, Some(&item("lsd")));

        let mut reader = BitReader::new(&out);
        let mercenary =
            read_mercenary(&mut reader, ItemVersion::V110, GameMode::Expansion, registry())
                .unwrap();
        assert!(mercenary.is_none());
        let golem =
            read_golem(&mut reader, ItemVersion::V110, GameMode::Expansion, registry()).unwrap();
        assert_eq!(golem.map(|g| g.code().to_string()).as_deref(), Some("lsd"));

        let mut out = GOLEM_MARKER.to_vec();
        out.push(0);
        let mut reader = BitReader::new(&out);
        assert!(read_golem(&mut reader, ItemVersion::V110, GameMode::Expansion, registry())
            .unwrap()
            .is_none());
    }
}
