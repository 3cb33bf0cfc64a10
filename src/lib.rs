//! # repdf
//!
//! Text-layer redaction for PDF documents.
//!
//! Given regex rules, repdf rewrites the text-showing operators of every
//! page's content stream so the sensitive text is gone from the file itself,
//! not merely covered up. It also applies rules to the Info dictionary and
//! the XMP metadata packet.
//!
//! ## Quick Start
//!
//! ```no_run
//! use regex::Regex;
//! use repdf::{redact_bytes, RedactionConfig};
//!
//! fn main() -> repdf::Result<()> {
//!     let config = RedactionConfig::new()
//!         .replace_text(Regex::new(r"\d{3}-\d{2}-\d{4}")?, "XXX-XX-XXXX")
//!         .clear_metadata()
//!         .remove_xmp();
//!
//!     let data = std::fs::read("input.pdf")?;
//!     let (out, report) = redact_bytes(&data, config)?;
//!     std::fs::write("redacted.pdf", out)?;
//!     println!("replaced {} matches", report.text_replacements);
//!     Ok(())
//! }
//! ```
//!
//! ## How it works
//!
//! - **Text runs**: consecutive text-showing operators are assembled into
//!   one string, so a pattern spanning several `Tj`/`TJ` instructions still
//!   matches.
//! - **Glyph safety**: replacement characters are only written if the target
//!   font is known to carry a glyph for them; otherwise a configurable
//!   fallback glyph is used.
//! - **Everything else untouched**: graphics, images, and all non-text
//!   operators pass through unchanged.

pub mod backend;
pub mod config;
pub mod content;
pub mod detect;
pub mod error;
pub mod fonts;
pub mod metadata;
pub mod redactor;
pub mod xmp;

// Re-export commonly used types
pub use backend::{DocumentBackend, LopdfBackend};
pub use config::{RedactionConfig, DEFAULT_REPLACEMENT_GLYPHS};
pub use content::ContentFilter;
pub use detect::{detect_format_from_bytes, PdfFormat};
pub use error::{Error, Result};
pub use metadata::{MetadataFilter, MetadataValue, PdfDate, ALL_FIELDS, DEFAULT_FIELD};
pub use redactor::{redact_bytes, RedactionReport, Redactor};
pub use xmp::XmpFilter;

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::Filter(format!("invalid pattern: {}", err))
    }
}

use std::io::{Read, Write};
use std::path::Path;

/// Redact a PDF file and write the result to another path.
///
/// # Example
///
/// ```no_run
/// use regex::Regex;
/// use repdf::{redact_file, RedactionConfig};
///
/// let config = RedactionConfig::new()
///     .replace_text(Regex::new("Confidential").unwrap(), "Public");
/// let report = redact_file("in.pdf", "out.pdf", config).unwrap();
/// println!("{} pages rewritten", report.pages_changed);
/// ```
pub fn redact_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: RedactionConfig,
) -> Result<RedactionReport> {
    let data = std::fs::read(input)?;
    let (out, report) = Redactor::new(config).redact_bytes(&data)?;
    std::fs::write(output, out)?;
    Ok(report)
}

/// Redact a PDF from a reader to a writer.
pub fn redact_stream<R: Read, W: Write>(
    input: R,
    output: &mut W,
    config: RedactionConfig,
) -> Result<RedactionReport> {
    Redactor::new(config).redact_stream(input, output)
}
