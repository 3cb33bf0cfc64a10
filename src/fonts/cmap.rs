//! ToUnicode CMap parsing.
//!
//! A ToUnicode CMap maps one- or two-byte character codes to Unicode text.
//! The stream syntax is the same token grammar as a content stream, so the
//! content tokenizer does the lexing; this module interprets the
//! `codespacerange` / `bfchar` / `bfrange` sections.

use std::collections::HashMap;

use crate::content::tokens::{self, Operand};
use crate::error::{Error, Result};

/// Largest bfrange span we will expand. Anything bigger is almost certainly
/// a corrupt range and would blow up the map.
const MAX_RANGE_SPAN: i64 = 0xFFFF;

/// Reverse-lookup table from character codes to Unicode and back.
#[derive(Debug, Clone, Default)]
pub struct ToUnicodeCMap {
    /// Code bytes → Unicode text (usually one char, occasionally a ligature
    /// expansion).
    forward: HashMap<Vec<u8>, String>,
    /// Single Unicode char → code bytes, for re-encoding edited text.
    reverse: HashMap<char, Vec<u8>>,
    /// Code width in bytes (1 or 2) from the codespace range.
    code_width: usize,
}

impl ToUnicodeCMap {
    /// Parse a decompressed CMap stream.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let ops = tokens::parse(data)
            .map_err(|e| Error::PdfParse(format!("CMap stream: {}", e)))?;

        let mut cmap = ToUnicodeCMap {
            code_width: 1,
            ..Default::default()
        };
        let mut in_cmap = false;
        let mut mapped = false;

        for op in &ops {
            match op.operator.as_str() {
                "begincmap" => in_cmap = true,
                "endcmap" => in_cmap = false,
                "endcodespacerange" if in_cmap => {
                    if let Some(Operand::HexStr(low)) = op.operands.first() {
                        if low.len() == 1 || low.len() == 2 {
                            cmap.code_width = low.len();
                        }
                    }
                }
                "endbfchar" if in_cmap => {
                    for pair in op.operands.chunks_exact(2) {
                        if let (Operand::HexStr(code), Some(text)) =
                            (&pair[0], destination_text(&pair[1], 0))
                        {
                            cmap.insert(code.clone(), text);
                            mapped = true;
                        }
                    }
                }
                "endbfrange" if in_cmap => {
                    for triple in op.operands.chunks_exact(3) {
                        if cmap.add_range(&triple[0], &triple[1], &triple[2]) {
                            mapped = true;
                        }
                    }
                }
                _ => {}
            }
        }

        if !mapped {
            return Err(Error::PdfParse("CMap contains no bf mappings".to_string()));
        }
        Ok(cmap)
    }

    fn add_range(&mut self, low: &Operand, high: &Operand, dst: &Operand) -> bool {
        let (Operand::HexStr(low), Operand::HexStr(high)) = (low, high) else {
            return false;
        };
        let (Some(lo), Some(hi)) = (code_to_int(low), code_to_int(high)) else {
            return false;
        };
        if hi < lo || hi - lo > MAX_RANGE_SPAN {
            return false;
        }

        let width = self.code_width.max(low.len());
        let mut any = false;
        for code in lo..=hi {
            let offset = (code - lo) as usize;
            let Some(text) = destination_text(dst, offset) else {
                continue;
            };
            let code_bytes = int_to_code(code, width);
            self.insert(code_bytes, text);
            any = true;
        }
        any
    }

    fn insert(&mut self, code: Vec<u8>, text: String) {
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            self.reverse.insert(c, code.clone());
        }
        self.forward.insert(code, text);
    }

    /// Decode code bytes to text. Greedy: try a one-byte code first, then a
    /// two-byte code; unknown codes decode to `?` and advance one byte.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let mut out = String::new();
        let mut i = 0;
        while i < bytes.len() {
            if let Some(text) = self.forward.get(&bytes[i..i + 1]) {
                out.push_str(text);
                i += 1;
            } else if i + 2 <= bytes.len() {
                if let Some(text) = self.forward.get(&bytes[i..i + 2]) {
                    out.push_str(text);
                    i += 2;
                } else {
                    out.push('?');
                    i += 1;
                }
            } else {
                out.push('?');
                i += 1;
            }
        }
        out
    }

    /// Encode text back to code bytes. Characters with no reverse mapping are
    /// omitted; the glyph guard has already substituted anything it could.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for c in text.chars() {
            if let Some(code) = self.reverse.get(&c) {
                out.extend_from_slice(code);
            }
        }
        out
    }

    /// Whether a character has a code in this font.
    pub fn contains_char(&self, c: char) -> bool {
        self.reverse.contains_key(&c)
    }

    /// All Unicode characters this CMap can produce.
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.forward.values().flat_map(|s| s.chars())
    }
}

/// Decode a bfchar/bfrange destination operand at the given range offset.
fn destination_text(dst: &Operand, offset: usize) -> Option<String> {
    match dst {
        Operand::HexStr(bytes) | Operand::Str(bytes) => {
            let mut units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            if units.is_empty() {
                return None;
            }
            // A range destination increments the last code unit.
            if offset > 0 {
                let last = units.len() - 1;
                units[last] = units[last].checked_add(offset as u16)?;
            }
            Some(String::from_utf16_lossy(&units))
        }
        Operand::Array(items) => items
            .get(offset)
            .and_then(|item| destination_text(item, 0)),
        _ => None,
    }
}

fn code_to_int(code: &[u8]) -> Option<i64> {
    if code.is_empty() || code.len() > 4 {
        return None;
    }
    Some(code.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64))
}

fn int_to_code(value: i64, width: usize) -> Vec<u8> {
    match width {
        1 => vec![(value & 0xFF) as u8],
        _ => vec![((value >> 8) & 0xFF) as u8, (value & 0xFF) as u8],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<00> <FF>
endcodespacerange
2 beginbfchar
<41> <0041>
<42> <0042>
endbfchar
1 beginbfrange
<61> <63> <0061>
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end";

    #[test]
    fn test_parse_bfchar_and_bfrange() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        assert_eq!(cmap.decode(b"AB"), "AB");
        assert_eq!(cmap.decode(b"abc"), "abc");
        assert_eq!(cmap.decode(b"\x7F"), "?");
    }

    #[test]
    fn test_encode_round_trip() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        assert_eq!(cmap.encode("Abc"), b"Abc".to_vec());
        // Unmappable characters are omitted.
        assert_eq!(cmap.encode("A\u{20AC}b"), b"Ab".to_vec());
    }

    #[test]
    fn test_two_byte_codes() {
        let data: &[u8] = b"begincmap
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfchar
<0030> <0058>
endbfchar
endcmap";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.decode(b"\x00\x30"), "X");
        assert_eq!(cmap.encode("X"), vec![0x00, 0x30]);
    }

    #[test]
    fn test_bfrange_array_destination() {
        let data: &[u8] = b"begincmap
1 begincodespacerange
<00> <FF>
endcodespacerange
1 beginbfrange
<01> <02> [<0058> <0059>]
endbfrange
endcmap";
        let cmap = ToUnicodeCMap::parse(data).unwrap();
        assert_eq!(cmap.decode(b"\x01\x02"), "XY");
    }

    #[test]
    fn test_empty_cmap_is_error() {
        assert!(ToUnicodeCMap::parse(b"begincmap endcmap").is_err());
        assert!(ToUnicodeCMap::parse(b"not a cmap ( unterminated").is_err());
    }

    #[test]
    fn test_chars_inventory() {
        let cmap = ToUnicodeCMap::parse(SAMPLE).unwrap();
        let chars: std::collections::HashSet<char> = cmap.chars().collect();
        assert!(chars.contains(&'A'));
        assert!(chars.contains(&'c'));
        assert!(!chars.contains(&'z'));
    }
}
