//! Glyph-safe substitution.
//!
//! Introduced characters are only allowed into a page if the font they will
//! be shown in is known to carry a glyph for them; otherwise a blank box or
//! notdef glyph would leak the fact (and shape) of the redaction. Characters
//! that fail the check are swapped for the first renderable entry of the
//! configured fallback list.

use crate::content::assemble::TextRun;
use crate::content::substitute::{Origin, TaggedChar};
use crate::fonts::{Font, FontInventory, SimpleEncoding};

/// Counters from one guard pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardOutcome {
    /// Introduced chars swapped for a fallback glyph.
    pub fallbacks: usize,
    /// Introduced chars with no renderable fallback, left unchanged.
    pub failures: usize,
}

fn renderable(font: Option<&Font>, c: char) -> bool {
    match font {
        // An assumed inventory verifies nothing, so nothing passes.
        Some(f) => !f.is_assumed() && f.glyphs.contains(c),
        // No font in scope: the rewriter will emit Latin-1 bytes.
        None => SimpleEncoding::Latin1.encode_char(c).is_some(),
    }
}

/// Piece an introduced char at index `i` will be attached to: the piece of
/// the matched char it stands in for when hinted, else that of the nearest
/// preceding original char, else the nearest following one, else the run's
/// first piece.
pub(crate) fn attachment_piece(chars: &[TaggedChar], run: &TextRun, i: usize) -> usize {
    if let Origin::Introduced(Some(idx)) = chars[i].origin {
        return run.map[idx].piece;
    }
    for j in (0..i).rev() {
        match chars[j].origin {
            Origin::Original(idx) | Origin::Introduced(Some(idx)) => return run.map[idx].piece,
            Origin::Introduced(None) => {}
        }
    }
    for tagged in &chars[i + 1..] {
        match tagged.origin {
            Origin::Original(idx) | Origin::Introduced(Some(idx)) => return run.map[idx].piece,
            Origin::Introduced(None) => {}
        }
    }
    0
}

/// Check every introduced char against its target font and substitute
/// fallback glyphs where needed.
pub fn enforce(
    chars: &mut [TaggedChar],
    run: &TextRun,
    inventory: &FontInventory,
    fallback_glyphs: &[char],
) -> GuardOutcome {
    let mut outcome = GuardOutcome::default();

    for i in 0..chars.len() {
        if matches!(chars[i].origin, Origin::Original(_)) {
            continue;
        }
        let piece = attachment_piece(chars, run, i);
        let font = run.pieces[piece]
            .font
            .as_deref()
            .and_then(|key| inventory.font(key));

        if renderable(font, chars[i].c) {
            continue;
        }
        match fallback_glyphs.iter().find(|&&g| renderable(font, g)) {
            Some(&g) => {
                chars[i].c = g;
                outcome.fallbacks += 1;
            }
            None => {
                log::warn!(
                    "no renderable fallback for '{}' in font {}, leaving it in place",
                    chars[i].c.escape_default(),
                    run.pieces[piece].font.as_deref().unwrap_or("<none>")
                );
                outcome.failures += 1;
            }
        }
    }
    outcome
}
