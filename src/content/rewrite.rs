//! Token-stream rewriting.
//!
//! Pushes substituted run text back into the operator sequence: each
//! surviving original character returns to the operand it came from,
//! introduced characters join the operand of the nearest preceding original,
//! and operands whose text changed are re-encoded through their font. `TJ`
//! kerning numbers next to an edited item are dropped, since spacing tuned
//! for the old glyph widths would misplace the new text.

use std::collections::HashMap;

use crate::backend::PageId;
use crate::content::assemble::{self, TextRun};
use crate::content::guard;
use crate::content::substitute::{self, ContentFilter, Origin, TaggedChar};
use crate::content::tokens::{self, Op, Operand};
use crate::error::Result;
use crate::fonts::{encode_unfonted, FontInventory};

/// Counters from redacting one page's content stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageEdit {
    /// Matches replaced across all runs.
    pub replacements: usize,
    /// Introduced chars swapped for a fallback glyph.
    pub glyph_fallbacks: usize,
    /// Introduced chars with no renderable fallback.
    pub glyph_failures: usize,
    /// Whether the stream was rewritten at all.
    pub changed: bool,
}

/// Run the full content pipeline over one page's stream bytes.
///
/// Returns the (possibly identical) output bytes plus edit counters. Parse
/// failures abort with an error; a page we cannot fully read is a page we
/// cannot safely rewrite.
pub fn redact_page(
    data: &[u8],
    page: PageId,
    inventory: &FontInventory,
    filters: &[ContentFilter],
    fallback_glyphs: &[char],
) -> Result<(Vec<u8>, PageEdit)> {
    let mut ops = tokens::parse(data)?;
    let runs = assemble::assemble(&ops, inventory, page);
    let mut edit = PageEdit::default();

    for run in &runs {
        let (mut chars, count) = substitute::apply_filters(&run.text, filters);
        if count == 0 {
            continue;
        }
        edit.replacements += count;
        let outcome = guard::enforce(&mut chars, run, inventory, fallback_glyphs);
        edit.glyph_fallbacks += outcome.fallbacks;
        edit.glyph_failures += outcome.failures;
        if apply_edits(&mut ops, run, &chars, inventory) {
            edit.changed = true;
        }
    }

    if edit.changed {
        Ok((tokens::serialize(&ops), edit))
    } else {
        Ok((data.to_vec(), edit))
    }
}

/// Distribute substituted text back over the run's pieces and patch the
/// affected operands in place. Returns whether anything changed.
fn apply_edits(
    ops: &mut [Op],
    run: &TextRun,
    chars: &[TaggedChar],
    inventory: &FontInventory,
) -> bool {
    let mut piece_texts = vec![String::new(); run.pieces.len()];
    for (i, tagged) in chars.iter().enumerate() {
        let piece = match tagged.origin {
            Origin::Original(idx) => run.map[idx].piece,
            Origin::Introduced(_) => guard::attachment_piece(chars, run, i),
        };
        piece_texts[piece].push(tagged.c);
    }

    let edited: Vec<bool> = piece_texts
        .iter()
        .zip(&run.pieces)
        .map(|(new, piece)| *new != piece.text)
        .collect();
    if !edited.contains(&true) {
        return false;
    }

    for (pi, piece) in run.pieces.iter().enumerate() {
        if !edited[pi] {
            continue;
        }
        let bytes = match piece.font.as_deref().and_then(|key| inventory.font(key)) {
            Some(font) => font.encode(&piece_texts[pi]),
            None => encode_unfonted(&piece_texts[pi]),
        };
        set_string(&mut ops[piece.op_index], piece.item_index, bytes);
    }

    drop_stale_kerning(ops, run, &edited);
    true
}

/// Replace a string operand, keeping its literal/hex flavor.
fn set_string(op: &mut Op, item_index: Option<usize>, bytes: Vec<u8>) {
    let replace = |operand: &mut Operand| {
        *operand = match operand {
            Operand::HexStr(_) => Operand::HexStr(bytes.clone()),
            _ => Operand::Str(bytes.clone()),
        };
    };
    match item_index {
        None => {
            if let Some(operand) = op
                .operands
                .iter_mut()
                .rev()
                .find(|o| matches!(o, Operand::Str(_) | Operand::HexStr(_)))
            {
                replace(operand);
            }
        }
        Some(i) => {
            if let Some(Operand::Array(items)) = op.operands.first_mut() {
                if let Some(operand) = items.get_mut(i) {
                    replace(operand);
                }
            }
        }
    }
}

/// Remove `TJ` kerning numbers whose neighboring string item was edited.
/// A number survives only when the strings on both sides kept their text.
fn drop_stale_kerning(ops: &mut [Op], run: &TextRun, edited: &[bool]) {
    let mut tj_edits: HashMap<usize, HashMap<usize, bool>> = HashMap::new();
    for (pi, piece) in run.pieces.iter().enumerate() {
        if let Some(item_index) = piece.item_index {
            tj_edits
                .entry(piece.op_index)
                .or_default()
                .insert(item_index, edited[pi]);
        }
    }

    for (op_index, items_edited) in tj_edits {
        if !items_edited.values().any(|&e| e) {
            continue;
        }
        if let Some(Operand::Array(items)) = ops[op_index].operands.first_mut() {
            let keep: Vec<bool> = (0..items.len())
                .map(|i| {
                    if !matches!(items[i], Operand::Integer(_) | Operand::Real(_)) {
                        return true;
                    }
                    let neighbor_edited = |idx: Option<usize>| {
                        idx.is_some_and(|j| items_edited.get(&j).copied().unwrap_or(false))
                    };
                    let prev = items[..i]
                        .iter()
                        .rposition(|o| o.as_string_bytes().is_some());
                    let next = items[i + 1..]
                        .iter()
                        .position(|o| o.as_string_bytes().is_some())
                        .map(|p| p + i + 1);
                    !(neighbor_edited(prev) || neighbor_edited(next))
                })
                .collect();
            let mut idx = 0;
            items.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    const PAGE: PageId = (1, 0);

    fn extract_text(data: &[u8]) -> String {
        let ops = tokens::parse(data).unwrap();
        let runs = assemble::assemble(&ops, &FontInventory::default(), PAGE);
        runs.iter().map(|r| r.text.clone()).collect()
    }

    fn ssn_filter() -> Vec<ContentFilter> {
        vec![ContentFilter::replace_all(
            Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap(),
            "XXX-XX-XXXX",
        )]
    }

    const FALLBACKS: &[char] = &['?', '#', '*', ' '];

    #[test]
    fn test_single_operand_replacement() {
        let src = b"BT /F1 12 Tf (SSN: 123-45-6789.) Tj ET";
        let (out, edit) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        assert!(edit.changed);
        assert_eq!(edit.replacements, 1);
        assert_eq!(extract_text(&out), "SSN: XXX-XX-XXXX.");
    }

    #[test]
    fn test_match_spanning_operators() {
        let src = b"BT (123-) Tj [(45) -20 (-6789)] TJ ET";
        let (out, edit) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        assert!(edit.changed);
        assert_eq!(extract_text(&out), "XXX-XX-XXXX");
        // The kerning number bordered edited items and must be gone.
        let ops = tokens::parse(&out).unwrap();
        let tj = ops.iter().find(|op| op.operator == "TJ").unwrap();
        let Operand::Array(items) = &tj.operands[0] else {
            panic!("TJ operand is not an array");
        };
        assert!(items
            .iter()
            .all(|o| !matches!(o, Operand::Integer(_) | Operand::Real(_))));
    }

    #[test]
    fn test_kerning_kept_between_unedited_items() {
        let src = b"BT [(keep) -30 (keep) -40 (123-45-6789)] TJ ET";
        let (out, _) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        let ops = tokens::parse(&out).unwrap();
        let tj = ops.iter().find(|op| op.operator == "TJ").unwrap();
        let Operand::Array(items) = &tj.operands[0] else {
            panic!("TJ operand is not an array");
        };
        // -30 sits between two untouched strings and survives; -40 borders
        // the edited item and is dropped.
        assert_eq!(
            items
                .iter()
                .filter(|o| matches!(o, Operand::Integer(_)))
                .count(),
            1
        );
        assert_eq!(extract_text(&out), "keepkeepXXX-XX-XXXX");
    }

    #[test]
    fn test_no_match_returns_input_bytes() {
        let src: &[u8] = b"BT (nothing to see) Tj ET";
        let (out, edit) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        assert!(!edit.changed);
        assert_eq!(edit.replacements, 0);
        assert_eq!(out, src);
    }

    #[test]
    fn test_hex_string_stays_hex() {
        // "123-45-6789" in hex.
        let src = b"BT <3132332D34352D36373839> Tj ET";
        let (out, edit) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        assert!(edit.changed);
        assert_eq!(extract_text(&out), "XXX-XX-XXXX");
        assert!(out.windows(1).any(|w| w == b"<"));
    }

    #[test]
    fn test_deletion_empties_operand() {
        let filters = vec![ContentFilter::replace_all(
            Regex::new("secret").unwrap(),
            "",
        )];
        let src = b"BT (a secret plan) Tj ET";
        let (out, _) =
            redact_page(src, PAGE, &FontInventory::default(), &filters, FALLBACKS).unwrap();
        assert_eq!(extract_text(&out), "a  plan");
    }

    #[test]
    fn test_expansion_attaches_to_matched_piece() {
        let filters = vec![ContentFilter::replace_all(
            Regex::new("ab").unwrap(),
            "abcdef",
        )];
        let src = b"BT (xa) Tj (by) Tj ET";
        let (out, _) =
            redact_page(src, PAGE, &FontInventory::default(), &filters, FALLBACKS).unwrap();
        assert_eq!(extract_text(&out), "xabcdefy");
    }

    #[test]
    fn test_parse_error_propagates() {
        let src = b"BT (unterminated Tj ET";
        let err = redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS);
        assert!(err.is_err());
    }

    #[test]
    fn test_surrounding_operators_survive() {
        let src = b"q 0.5 0 0 0.5 0 0 cm BT (123-45-6789) Tj ET Q";
        let (out, _) =
            redact_page(src, PAGE, &FontInventory::default(), &ssn_filter(), FALLBACKS).unwrap();
        let ops = tokens::parse(&out).unwrap();
        let names: Vec<&str> = ops.iter().map(|o| o.operator.as_str()).collect();
        assert_eq!(names, vec!["q", "cm", "BT", "Tj", "ET", "Q"]);
    }
}
