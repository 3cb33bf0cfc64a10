//! Font glyph inventory.
//!
//! For every font referenced by the document, derives the set of characters
//! the font is known to be able to render, plus decode/encode tables for the
//! text-run assembler and the rewriter. Built once per document before any
//! page is touched; read-only afterward.

mod cmap;
mod encoding;

pub use cmap::ToUnicodeCMap;
pub use encoding::SimpleEncoding;

use std::collections::{HashMap, HashSet};

use crate::backend::{DifferenceItem, DocumentBackend, FontResource, PageId};
use crate::error::Result;

/// Set of characters a font can render.
///
/// `known_complete` distinguishes an inventory derived from real encoding
/// data from the conservative fallback used when the font embeds nothing we
/// can parse. An assumed set is empty: no character is verified renderable.
#[derive(Debug, Clone, Default)]
pub struct GlyphSet {
    chars: HashSet<char>,
    pub known_complete: bool,
}

impl GlyphSet {
    pub fn contains(&self, c: char) -> bool {
        self.chars.contains(&c)
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

/// One font with its decode tables and glyph inventory.
#[derive(Debug, Clone)]
pub struct Font {
    /// Inventory key: BaseFont name when present, else the resource name.
    pub key: String,
    pub base_font: Option<String>,
    pub encoding: SimpleEncoding,
    pub cmap: Option<ToUnicodeCMap>,
    pub glyphs: GlyphSet,
}

impl Font {
    /// Decode string-operand bytes to text: through the ToUnicode table when
    /// the font has one, else through the simple single-byte encoding.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match &self.cmap {
            Some(cmap) => cmap.decode(bytes),
            None => bytes.iter().map(|&b| self.encoding.decode_byte(b)).collect(),
        }
    }

    /// Encode text back to string-operand bytes. With a ToUnicode table,
    /// unmappable characters are omitted; with a simple encoding they fall
    /// back to `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match &self.cmap {
            Some(cmap) => cmap.encode(text),
            None => text
                .chars()
                .map(|c| self.encoding.encode_char(c).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Whether the inventory had to be assumed because no encoding data was
    /// parsable.
    pub fn is_assumed(&self) -> bool {
        !self.glyphs.known_complete
    }
}

/// Decode bytes with no font in scope (no `Tf` seen yet): Latin-1.
pub fn decode_unfonted(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Encode text with no font in scope: Latin-1, `?` for anything outside it.
pub fn encode_unfonted(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| SimpleEncoding::Latin1.encode_char(c).unwrap_or(b'?'))
        .collect()
}

/// Per-document font inventory, shared read-only across all pages.
#[derive(Debug, Clone, Default)]
pub struct FontInventory {
    fonts: HashMap<String, Font>,
    /// Per page: resource name → inventory key.
    resources: HashMap<PageId, HashMap<Vec<u8>, String>>,
}

impl FontInventory {
    /// Scan every page's font resources once and build the inventory.
    ///
    /// Fonts are shared across pages; entries with the same key are merged by
    /// unioning their glyph sets. Unparsable font data is not an error; the
    /// font is marked assumed and the pass continues with degraded
    /// glyph-safety.
    pub fn build(backend: &dyn DocumentBackend) -> Result<Self> {
        let mut inventory = FontInventory::default();
        for page in backend.pages() {
            for resource in backend.page_fonts(page)? {
                inventory.register(page, &resource);
            }
        }
        Ok(inventory)
    }

    /// Add one page font resource to the inventory.
    pub fn register(&mut self, page: PageId, resource: &FontResource) {
        let font = build_font(resource);
        if font.is_assumed() {
            log::warn!(
                "font {}: no parsable encoding data, glyph inventory assumed empty",
                font.key
            );
        }
        self.resources
            .entry(page)
            .or_default()
            .insert(resource.name.clone(), font.key.clone());
        self.merge(font);
    }

    fn merge(&mut self, font: Font) {
        match self.fonts.get_mut(&font.key) {
            Some(existing) => {
                existing.glyphs.chars.extend(font.glyphs.chars);
                existing.glyphs.known_complete |= font.glyphs.known_complete;
                if existing.cmap.is_none() {
                    existing.cmap = font.cmap;
                }
            }
            None => {
                self.fonts.insert(font.key.clone(), font);
            }
        }
    }

    /// Resolve a page's font resource name (the `Tf` operand) to an
    /// inventory key.
    pub fn resolve(&self, page: PageId, name: &[u8]) -> Option<&str> {
        self.resources
            .get(&page)
            .and_then(|names| names.get(name))
            .map(String::as_str)
    }

    pub fn font(&self, key: &str) -> Option<&Font> {
        self.fonts.get(key)
    }

    /// Keys of fonts whose inventory had to be assumed, for the report.
    pub fn assumed_fonts(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .fonts
            .values()
            .filter(|f| f.is_assumed())
            .map(|f| f.key.clone())
            .collect();
        keys.sort();
        keys
    }
}

/// Derive a [`Font`] from one page font resource.
///
/// Renderable characters are unioned from every source that parses: the
/// ToUnicode table's image, codes listed in the encoding `Differences`, and
/// codes with a positive entry in the `Widths` array. If none parse, the
/// inventory is assumed (empty, not known-complete).
fn build_font(resource: &FontResource) -> Font {
    let encoding = resource
        .encoding_base
        .as_deref()
        .and_then(SimpleEncoding::from_name)
        .unwrap_or_default();

    let cmap = resource.to_unicode.as_deref().and_then(|data| {
        ToUnicodeCMap::parse(data)
            .map_err(|e| log::warn!("ignoring unparsable ToUnicode CMap: {}", e))
            .ok()
    });

    let mut chars = HashSet::new();
    let mut known_complete = false;

    if let Some(cmap) = &cmap {
        chars.extend(cmap.chars());
        known_complete = true;
    }

    if !resource.differences.is_empty() {
        let mut code: i64 = 0;
        for item in &resource.differences {
            match item {
                DifferenceItem::Code(c) => code = *c,
                DifferenceItem::Glyph(_) => {
                    if (0..=0xFF).contains(&code) {
                        chars.insert(encoding.decode_byte(code as u8));
                        known_complete = true;
                    }
                    code += 1;
                }
            }
        }
    }

    if let (Some(first), Some(widths)) = (resource.first_char, resource.widths.as_ref()) {
        for (i, width) in widths.iter().enumerate() {
            let code = first + i as i64;
            if *width > 0.0 && (0..=0xFF).contains(&code) {
                chars.insert(match &cmap {
                    Some(cmap) => {
                        let text = cmap.decode(&[code as u8]);
                        text.chars().next().unwrap_or('?')
                    }
                    None => encoding.decode_byte(code as u8),
                });
                known_complete = true;
            }
        }
    }

    let key = resource
        .base_font
        .clone()
        .unwrap_or_else(|| String::from_utf8_lossy(&resource.name).into_owned());

    Font {
        key,
        base_font: resource.base_font.clone(),
        encoding,
        cmap,
        glyphs: GlyphSet {
            chars,
            known_complete,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FontResource;

    fn resource(name: &[u8]) -> FontResource {
        FontResource {
            name: name.to_vec(),
            base_font: None,
            encoding_base: None,
            differences: Vec::new(),
            first_char: None,
            widths: None,
            to_unicode: None,
        }
    }

    #[test]
    fn test_assumed_when_nothing_parsable() {
        let font = build_font(&resource(b"F1"));
        assert!(font.is_assumed());
        assert!(font.glyphs.is_empty());
        // Decoding still works through the Latin-1 assumption.
        assert_eq!(font.decode(b"Hi"), "Hi");
    }

    #[test]
    fn test_widths_derive_inventory() {
        let mut r = resource(b"F1");
        r.first_char = Some(65);
        r.widths = Some(vec![500.0, 500.0, 0.0, 611.0]);
        let font = build_font(&r);
        assert!(!font.is_assumed());
        assert!(font.glyphs.contains('A'));
        assert!(font.glyphs.contains('B'));
        // Zero width: not verified renderable.
        assert!(!font.glyphs.contains('C'));
        assert!(font.glyphs.contains('D'));
    }

    #[test]
    fn test_differences_derive_inventory() {
        let mut r = resource(b"F1");
        r.differences = vec![
            DifferenceItem::Code(0xE9),
            DifferenceItem::Glyph("eacute".to_string()),
            DifferenceItem::Glyph("egrave".to_string()),
        ];
        let font = build_font(&r);
        assert!(!font.is_assumed());
        assert!(font.glyphs.contains('é'));
        assert!(font.glyphs.contains('ê')); // 0xEA in Latin-1
    }

    #[test]
    fn test_win_ansi_encoding_selected() {
        let mut r = resource(b"F1");
        r.encoding_base = Some("WinAnsiEncoding".to_string());
        let font = build_font(&r);
        assert_eq!(font.encoding, SimpleEncoding::WinAnsi);
        assert_eq!(font.decode(&[0x97]), "—");
        assert_eq!(font.encode("—"), vec![0x97]);
    }

    #[test]
    fn test_base_font_is_inventory_key() {
        let mut r = resource(b"F1");
        r.base_font = Some("Helvetica".to_string());
        let font = build_font(&r);
        assert_eq!(font.key, "Helvetica");
    }
}
