//! Error types for the repdf library.

use std::io;
use thiserror::Error;

/// Result type alias for repdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during redaction.
///
/// Any error aborts the whole pass: a partially rewritten document would
/// render incorrectly, so there is no partial output.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing streams.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input is not recognized as PDF.
    #[error("Unknown file format: not a valid PDF")]
    UnknownFormat,

    /// The PDF header declares a version we do not understand.
    #[error("Unsupported PDF version: {0}")]
    UnsupportedVersion(String),

    /// Error in the PDF container structure (objects, xref, streams).
    #[error("PDF parsing error: {0}")]
    PdfParse(String),

    /// The PDF document is encrypted and cannot be redacted.
    #[error("Document is encrypted")]
    Encrypted,

    /// Malformed content-stream syntax on a page.
    #[error("Content stream parse error: {0}")]
    ContentParse(String),

    /// A content, metadata, or XMP filter function failed.
    #[error("Filter error: {0}")]
    Filter(String),

    /// A metadata string could not be decoded or re-encoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The XMP metadata packet is invalid.
    #[error("XMP metadata error: {0}")]
    Xmp(String),

    /// A required PDF object is missing.
    #[error("Missing required object: {0}")]
    MissingObject(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        match err {
            lopdf::Error::IO(e) => Error::Io(e),
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::PdfParse(err.to_string()),
        }
    }
}
