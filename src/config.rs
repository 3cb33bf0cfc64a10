//! Redaction configuration.

use regex::Regex;

use crate::content::substitute::ContentFilter;
use crate::metadata::MetadataFilter;
use crate::xmp::XmpFilter;

/// Fallback glyphs tried, in order, when a replacement character has no
/// glyph in the target font.
pub const DEFAULT_REPLACEMENT_GLYPHS: &[char] = &['?', '#', '*', ' '];

/// Everything a redaction pass needs: content rules, metadata rules, XMP
/// rules, and the glyph fallback list.
///
/// An empty section is skipped entirely; a default config redacts nothing.
#[derive(Debug)]
pub struct RedactionConfig {
    /// Regex rules applied to the text layer of every page.
    pub content_filters: Vec<ContentFilter>,

    /// Fallback glyphs for introduced characters, tried in order.
    pub replacement_glyphs: Vec<char>,

    /// Rules for the trailer Info dictionary.
    pub metadata_filter: MetadataFilter,

    /// Rules for the XMP metadata packet.
    pub xmp_filter: XmpFilter,
}

impl RedactionConfig {
    /// Create a config with defaults (no rules).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a content rule.
    pub fn with_content_filter(mut self, filter: ContentFilter) -> Self {
        self.content_filters.push(filter);
        self
    }

    /// Add a content rule replacing every match with fixed text.
    pub fn replace_text(mut self, pattern: Regex, replacement: impl Into<String>) -> Self {
        self.content_filters
            .push(ContentFilter::replace_all(pattern, replacement));
        self
    }

    /// Override the glyph fallback list.
    pub fn with_replacement_glyphs(mut self, glyphs: impl Into<Vec<char>>) -> Self {
        self.replacement_glyphs = glyphs.into();
        self
    }

    /// Replace the metadata rule set.
    pub fn with_metadata_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = filter;
        self
    }

    /// Delete every Info field that has no specific metadata rule.
    pub fn clear_metadata(mut self) -> Self {
        self.metadata_filter = std::mem::take(&mut self.metadata_filter).clear_by_default();
        self
    }

    /// Replace the XMP rule set.
    pub fn with_xmp_filter(mut self, filter: XmpFilter) -> Self {
        self.xmp_filter = filter;
        self
    }

    /// Strip the XMP packet from the document.
    pub fn remove_xmp(mut self) -> Self {
        self.xmp_filter = XmpFilter::remove_all();
        self
    }
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            content_filters: Vec::new(),
            replacement_glyphs: DEFAULT_REPLACEMENT_GLYPHS.to_vec(),
            metadata_filter: MetadataFilter::new(),
            xmp_filter: XmpFilter::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_inert() {
        let config = RedactionConfig::default();
        assert!(config.content_filters.is_empty());
        assert!(config.metadata_filter.is_empty());
        assert!(config.xmp_filter.is_empty());
        assert_eq!(config.replacement_glyphs, vec!['?', '#', '*', ' ']);
    }

    #[test]
    fn test_builder_chained() {
        let config = RedactionConfig::new()
            .replace_text(Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap(), "XXX-XX-XXXX")
            .with_replacement_glyphs(vec!['?'])
            .clear_metadata()
            .remove_xmp();

        assert_eq!(config.content_filters.len(), 1);
        assert_eq!(config.replacement_glyphs, vec!['?']);
        assert!(!config.metadata_filter.is_empty());
        assert!(!config.xmp_filter.is_empty());
    }
}
