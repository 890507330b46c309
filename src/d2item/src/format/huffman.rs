//! Huffman coding of item type codes (Resurrected formats)
//!
//! Resurrected records store the item code as a prefix-free bit string per character,
//! terminated by the code for a space. Bit strings are listed in stream order: the
//! first character of each string is the first bit read from the record.

use crate::bitstream::{BitReader, BitWriter};
use crate::error::{ItemError, Result};

/// Longest code in the table
const MAX_CODE_LEN: usize = 9;

/// Character -> bit string
static ENCODE: phf::Map<char, &'static str> = phf::phf_map! {
    ' ' => "10",
    '0' => "111110011",
    '1' => "11111000",
    '2' => "001100",
    '3' => "1101101",
    '4' => "111110010",
    '5' => "00010110",
    '6' => "1101111",
    '7' => "01111",
    '8' => "000100",
    '9' => "01110",
    'a' => "11110",
    'b' => "0101",
    'c' => "01000",
    'd' => "110001",
    'e' => "110000",
    'f' => "010011",
    'g' => "11010",
    'h' => "00011",
    'i' => "1111101",
    'j' => "000101110",
    'k' => "010010",
    'l' => "11101",
    'm' => "01101",
    'n' => "001101",
    'o' => "111111",
    'p' => "11001",
    'q' => "11011001",
    'r' => "11100",
    's' => "0010",
    't' => "01100",
    'u' => "00001",
    'v' => "1101110",
    'w' => "00000",
    'x' => "00111",
    'y' => "0001010",
    'z' => "11011000",
};

/// Bit string -> character
static DECODE: phf::Map<&'static str, char> = phf::phf_map! {
    "10" => ' ',
    "111110011" => '0',
    "11111000" => '1',
    "001100" => '2',
    "1101101" => '3',
    "111110010" => '4',
    "00010110" => '5',
    "1101111" => '6',
    "01111" => '7',
    "000100" => '8',
    "01110" => '9',
    "11110" => 'a',
    "0101" => 'b',
    "01000" => 'c',
    "110001" => 'd',
    "110000" => 'e',
    "010011" => 'f',
    "11010" => 'g',
    "00011" => 'h',
    "1111101" => 'i',
    "000101110" => 'j',
    "010010" => 'k',
    "11101" => 'l',
    "01101" => 'm',
    "001101" => 'n',
    "111111" => 'o',
    "11001" => 'p',
    "11011001" => 'q',
    "11100" => 'r',
    "0010" => 's',
    "01100" => 't',
    "00001" => 'u',
    "1101110" => 'v',
    "00000" => 'w',
    "00111" => 'x',
    "0001010" => 'y',
    "11011000" => 'z',
};

/// Read one Huffman-coded character
fn read_char(reader: &mut BitReader<'_>) -> Result<char> {
    let start = reader.position();
    let mut bits = String::with_capacity(MAX_CODE_LEN);
    while bits.len() < MAX_CODE_LEN {
        bits.push(if reader.read_bool()? { '1' } else { '0' });
        if let Some(&c) = DECODE.get(bits.as_str()) {
            return Ok(c);
        }
    }
    Err(ItemError::InvalidHuffmanCode(start))
}

/// Decode an item code, consuming the terminating space.
///
/// Codes are at most four characters; a longer run is treated as corrupt.
pub fn read_code(reader: &mut BitReader<'_>) -> Result<String> {
    let start = reader.position();
    let mut code = String::with_capacity(4);
    loop {
        let c = read_char(reader)?;
        if c == ' ' {
            return Ok(code);
        }
        if code.len() == 4 {
            return Err(ItemError::InvalidHuffmanCode(start));
        }
        code.push(c);
    }
}

/// Encode an item code followed by the terminating space
pub fn write_code(writer: &mut BitWriter, code: &str) -> Result<()> {
    for c in code.trim_end().chars().chain(std::iter::once(' ')) {
        let bits = ENCODE
            .get(&c)
            .ok_or_else(|| ItemError::UnknownItemCode(code.to_string()))?;
        for b in bits.bytes() {
            writer.write(1, u64::from(b == b'1'))?;
        }
    }
    Ok(())
}

/// Number of bits `write_code` emits for `code`
pub fn code_bits(code: &str) -> Result<usize> {
    code.trim_end()
        .chars()
        .chain(std::iter::once(' '))
        .map(|c| {
            ENCODE
                .get(&c)
                .map(|bits| bits.len())
                .ok_or_else(|| ItemError::UnknownItemCode(code.to_string()))
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_inverse() {
        assert_eq!(ENCODE.len(), DECODE.len());
        for (c, bits) in ENCODE.entries() {
            assert_eq!(DECODE.get(bits), Some(c));
        }
    }

    #[test]
    fn test_prefix_free() {
        let codes: Vec<&str> = ENCODE.values().copied().collect();
        for a in &codes {
            for b in &codes {
                if a != b {
                    assert!(!b.starts_with(a), "{} is a prefix of {}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_code_roundtrip() {
        for code in ["cap", "r01", "7cr", "hp1", "gpw", "jew"] {
            let mut writer = BitWriter::new();
            write_code(&mut writer, code).unwrap();
            let (store, len) = writer.finish();
            assert_eq!(len, code_bits(code).unwrap());

            let mut reader = BitReader::new(store.as_bytes());
            assert_eq!(read_code(&mut reader).unwrap(), code);
            assert_eq!(reader.position(), len);
        }
    }

    #[test]
    fn test_space_padded_code() {
        assert_eq!(code_bits("cap ").unwrap(), code_bits("cap").unwrap());
    }

    #[test]
    fn test_unknown_character() {
        let mut writer = BitWriter::new();
        assert!(matches!(
            write_code(&mut writer, "C@P"),
            Err(ItemError::UnknownItemCode(_))
        ));
    }

    #[test]
    fn test_invalid_bits() {
        // All one-bits decode as a run of 'o' with no terminating space
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            read_code(&mut reader),
            Err(ItemError::InvalidHuffmanCode(_))
        ));
    }
}
