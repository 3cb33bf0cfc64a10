//! The redaction pipeline.
//!
//! Order of operations: Info dictionary, then the XMP packet, then every
//! page's content stream. The font inventory is built once, before any page
//! is touched, and shared read-only across pages.

use std::io::{Read, Write};

use serde::Serialize;

use crate::backend::{DocumentBackend, LopdfBackend};
use crate::config::RedactionConfig;
use crate::content;
use crate::error::Result;
use crate::fonts::FontInventory;
use crate::metadata;
use crate::xmp;

/// What a redaction pass did, suitable for logging or JSON output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RedactionReport {
    /// Pages in the document.
    pub pages: usize,
    /// Pages whose content stream was rewritten.
    pub pages_changed: usize,
    /// Content matches replaced.
    pub text_replacements: usize,
    /// Introduced chars swapped for a fallback glyph.
    pub glyph_fallbacks: usize,
    /// Introduced chars left unchanged because no fallback was renderable.
    pub glyph_failures: usize,
    /// Info fields rewritten.
    pub metadata_edited: usize,
    /// Info fields deleted.
    pub metadata_deleted: usize,
    /// Whether the XMP packet was rewritten.
    pub xmp_edited: bool,
    /// Whether the XMP packet was removed.
    pub xmp_removed: bool,
    /// Fonts whose glyph inventory had to be assumed.
    pub assumed_fonts: Vec<String>,
}

/// Applies a [`RedactionConfig`] to PDF documents.
pub struct Redactor {
    config: RedactionConfig,
}

impl Redactor {
    pub fn new(config: RedactionConfig) -> Self {
        Redactor { config }
    }

    pub fn config(&self) -> &RedactionConfig {
        &self.config
    }

    /// Redact a loaded document in place.
    pub fn redact(&self, backend: &mut dyn DocumentBackend) -> Result<RedactionReport> {
        let mut report = RedactionReport::default();

        let meta = metadata::apply_metadata_filter(backend, &self.config.metadata_filter)?;
        report.metadata_edited = meta.edited;
        report.metadata_deleted = meta.deleted;

        let xmp = xmp::apply_xmp_filter(backend, &self.config.xmp_filter)?;
        report.xmp_edited = xmp.edited;
        report.xmp_removed = xmp.removed;

        let pages = backend.pages();
        report.pages = pages.len();
        if self.config.content_filters.is_empty() {
            return Ok(report);
        }

        let inventory = FontInventory::build(backend)?;
        report.assumed_fonts = inventory.assumed_fonts();

        for page in pages {
            let data = backend.page_content(page)?;
            let (out, edit) = content::redact_page(
                &data,
                page,
                &inventory,
                &self.config.content_filters,
                &self.config.replacement_glyphs,
            )?;
            report.text_replacements += edit.replacements;
            report.glyph_fallbacks += edit.glyph_fallbacks;
            report.glyph_failures += edit.glyph_failures;
            if edit.changed {
                log::debug!(
                    "page {:?}: {} replacements, stream rewritten",
                    page,
                    edit.replacements
                );
                backend.set_page_content(page, out)?;
                report.pages_changed += 1;
            }
        }
        Ok(report)
    }

    /// Redact an in-memory document, returning the new bytes and the report.
    pub fn redact_bytes(&self, data: &[u8]) -> Result<(Vec<u8>, RedactionReport)> {
        let mut backend = LopdfBackend::load_bytes(data)?;
        let report = self.redact(&mut backend)?;
        let mut out = Vec::new();
        backend.save(&mut out)?;
        Ok((out, report))
    }

    /// Redact from a reader to a writer.
    pub fn redact_stream<R: Read, W: Write>(
        &self,
        mut input: R,
        output: &mut W,
    ) -> Result<RedactionReport> {
        let mut data = Vec::new();
        input.read_to_end(&mut data)?;
        let (out, report) = self.redact_bytes(&data)?;
        output.write_all(&out)?;
        Ok(report)
    }
}

/// One-shot convenience: redact in-memory PDF bytes.
pub fn redact_bytes(data: &[u8], config: RedactionConfig) -> Result<(Vec<u8>, RedactionReport)> {
    Redactor::new(config).redact_bytes(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_to_json() {
        let report = RedactionReport {
            pages: 2,
            text_replacements: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pages"], 2);
        assert_eq!(json["text_replacements"], 3);
        assert_eq!(json["xmp_removed"], false);
    }

    #[test]
    fn test_invalid_bytes_rejected() {
        let redactor = Redactor::new(RedactionConfig::default());
        assert!(redactor.redact_bytes(b"not a pdf").is_err());
    }
}
