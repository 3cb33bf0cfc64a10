//! Content-stream redaction.
//!
//! The page pipeline: [`tokens`] parses the stream, [`assemble`] gathers
//! text-showing operands into runs, [`substitute`] applies the regex rules,
//! [`guard`] enforces glyph safety for introduced characters, and
//! [`rewrite`] pushes the edits back into the operator sequence and
//! serializes it.

pub mod assemble;
pub mod guard;
pub mod rewrite;
pub mod substitute;
pub mod tokens;

pub use rewrite::{redact_page, PageEdit};
pub use substitute::ContentFilter;
