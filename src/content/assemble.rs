//! Text-run assembly.
//!
//! Collects consecutive text-showing operators into logical runs so that a
//! pattern spanning several `Tj`/`TJ` instructions (or several `TJ` array
//! items) can still match. Each run carries an offset map from every
//! character of the assembled text back to the operand it came from, which
//! is what lets the rewriter push edits back into the right operators.

use crate::backend::PageId;
use crate::content::tokens::{self, Op, Operand};
use crate::fonts::{decode_unfonted, FontInventory};

/// Operators that may appear inside a run without breaking it. These adjust
/// text position or state but do not draw anything between the strings, so
/// matched text is still visually contiguous across them.
const RUN_COMPATIBLE: &[&str] = &[
    "BT", "ET", "Tf", "Tc", "Tw", "Tz", "TL", "Tr", "Ts", "Td", "TD", "Tm", "T*",
];

fn is_run_compatible(operator: &str) -> bool {
    RUN_COMPATIBLE.contains(&operator)
}

/// One string operand inside a run: where it lives in the operator sequence
/// and what it decodes to.
#[derive(Debug, Clone)]
pub struct Piece {
    /// Index of the owning operator in the parsed sequence.
    pub op_index: usize,
    /// For `TJ`, the index of this string within the array operand.
    pub item_index: Option<usize>,
    /// Font inventory key in effect, `None` before any `Tf`.
    pub font: Option<String>,
    /// Decoded text of this operand.
    pub text: String,
}

/// Location of one run character: which piece it belongs to and its char
/// offset within that piece.
#[derive(Debug, Clone, Copy)]
pub struct CharLoc {
    pub piece: usize,
    pub offset: usize,
}

/// A maximal sequence of text-showing operands with nothing incompatible in
/// between, assembled into one string for pattern matching.
#[derive(Debug, Clone, Default)]
pub struct TextRun {
    pub pieces: Vec<Piece>,
    /// Concatenation of all piece texts.
    pub text: String,
    /// One entry per char of `text`, mapping it back to its piece.
    pub map: Vec<CharLoc>,
}

impl TextRun {
    fn push_piece(
        &mut self,
        op_index: usize,
        item_index: Option<usize>,
        font: Option<String>,
        text: String,
    ) {
        let piece = self.pieces.len();
        for (offset, c) in text.chars().enumerate() {
            self.map.push(CharLoc { piece, offset });
            self.text.push(c);
        }
        self.pieces.push(Piece {
            op_index,
            item_index,
            font,
            text,
        });
    }
}

fn decode(inventory: &FontInventory, font: Option<&str>, bytes: &[u8]) -> String {
    match font.and_then(|key| inventory.font(key)) {
        Some(f) => f.decode(bytes),
        None => decode_unfonted(bytes),
    }
}

/// Assemble the text runs of one page's parsed operator sequence.
///
/// `page` selects the resource-name table used to resolve `Tf` operands;
/// fonts absent from the inventory fall back to a Latin-1 reading.
pub fn assemble(ops: &[Op], inventory: &FontInventory, page: PageId) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut current = TextRun::default();
    let mut font: Option<String> = None;

    let mut flush = |run: &mut TextRun| {
        if !run.pieces.is_empty() {
            runs.push(std::mem::take(run));
        } else {
            *run = TextRun::default();
        }
    };

    for (op_index, op) in ops.iter().enumerate() {
        if tokens::is_text_showing(&op.operator) {
            match op.operator.as_str() {
                "TJ" => {
                    if let Some(Operand::Array(items)) = op.operands.first() {
                        for (item_index, item) in items.iter().enumerate() {
                            if let Some(bytes) = item.as_string_bytes() {
                                let text = decode(inventory, font.as_deref(), bytes);
                                current.push_piece(
                                    op_index,
                                    Some(item_index),
                                    font.clone(),
                                    text,
                                );
                            }
                        }
                    }
                }
                // Tj and ' carry the string as their only operand; " carries
                // it last, after the two spacing numbers.
                _ => {
                    let string = op
                        .operands
                        .iter()
                        .rev()
                        .find_map(|o| o.as_string_bytes());
                    if let Some(bytes) = string {
                        let text = decode(inventory, font.as_deref(), bytes);
                        current.push_piece(op_index, None, font.clone(), text);
                    }
                }
            }
        } else if op.operator == "Tf" {
            font = op.operands.first().and_then(|o| match o {
                Operand::Name(name) => Some(
                    inventory
                        .resolve(page, name)
                        .map(str::to_string)
                        .unwrap_or_else(|| String::from_utf8_lossy(name).into_owned()),
                ),
                _ => None,
            });
        } else if !is_run_compatible(&op.operator) {
            flush(&mut current);
        }
    }
    flush(&mut current);
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tokens::parse;

    const PAGE: PageId = (1, 0);

    fn assemble_str(src: &[u8]) -> Vec<TextRun> {
        let ops = parse(src).unwrap();
        assemble(&ops, &FontInventory::default(), PAGE)
    }

    #[test]
    fn test_single_run_across_operators() {
        let runs = assemble_str(b"BT /F1 12 Tf (Hello ) Tj 0 -14 Td (World) Tj ET");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "Hello World");
        assert_eq!(runs[0].pieces.len(), 2);
        assert_eq!(runs[0].pieces[0].font.as_deref(), Some("F1"));
    }

    #[test]
    fn test_tj_array_items_are_pieces() {
        let runs = assemble_str(b"BT (123-) Tj [(45) -20 (-6789)] TJ ET");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "123-45-6789");
        assert_eq!(runs[0].pieces.len(), 3);
        assert_eq!(runs[0].pieces[1].item_index, Some(0));
        assert_eq!(runs[0].pieces[2].item_index, Some(2));
    }

    #[test]
    fn test_incompatible_operator_breaks_run() {
        let runs = assemble_str(b"BT (a) Tj ET q BT (b) Tj ET");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].text, "a");
        assert_eq!(runs[1].text, "b");
    }

    #[test]
    fn test_quote_operators() {
        let runs = assemble_str(b"BT (a) ' 1 2 (b) \" ET");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].text, "ab");
    }

    #[test]
    fn test_offset_map() {
        let runs = assemble_str(b"BT (ab) Tj (cd) Tj ET");
        let run = &runs[0];
        assert_eq!(run.text, "abcd");
        assert_eq!(run.map.len(), 4);
        assert_eq!(run.map[0].piece, 0);
        assert_eq!(run.map[1].offset, 1);
        assert_eq!(run.map[2].piece, 1);
        assert_eq!(run.map[2].offset, 0);
    }

    #[test]
    fn test_no_text_no_runs() {
        let runs = assemble_str(b"q 1 0 0 1 10 10 cm Q");
        assert!(runs.is_empty());
    }
}
