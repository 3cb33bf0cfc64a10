//! Regex substitution over assembled run text.
//!
//! Filters run in configuration order, each seeing the output of the
//! previous one. Every character of the result carries an origin tag so the
//! rewriter knows which operand to attach it to and the glyph guard knows
//! which characters still need a renderability check.

use std::collections::HashMap;

use regex::{Captures, Regex};

/// Where a character of post-substitution text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Carried over from the run's original text at this char index.
    Original(usize),
    /// Produced by a replacement; not yet known renderable. The payload is
    /// the original char index this char stands in for (position-aligned
    /// within the matched span), used to attach it to a piece and font.
    Introduced(Option<usize>),
}

/// One character of substituted text with its origin tag.
#[derive(Debug, Clone, Copy)]
pub struct TaggedChar {
    pub c: char,
    pub origin: Origin,
}

/// Replacement callback: receives the match captures, returns the
/// replacement text, or `None` to leave this match untouched.
pub type ReplacementFn = Box<dyn Fn(&Captures) -> Option<String> + Send + Sync>;

/// A content redaction rule: pattern plus replacement function.
pub struct ContentFilter {
    pub pattern: Regex,
    pub replace: ReplacementFn,
}

impl ContentFilter {
    pub fn new<F>(pattern: Regex, replace: F) -> Self
    where
        F: Fn(&Captures) -> Option<String> + Send + Sync + 'static,
    {
        ContentFilter {
            pattern,
            replace: Box::new(replace),
        }
    }

    /// Convenience rule replacing every match with fixed text.
    pub fn replace_all(pattern: Regex, replacement: impl Into<String>) -> Self {
        let replacement = replacement.into();
        Self::new(pattern, move |_| Some(replacement.clone()))
    }
}

impl std::fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFilter")
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// Apply all filters in order to a run's text. Returns the tagged result and
/// the number of matches that were actually replaced.
pub fn apply_filters(text: &str, filters: &[ContentFilter]) -> (Vec<TaggedChar>, usize) {
    let mut chars: Vec<TaggedChar> = text
        .chars()
        .enumerate()
        .map(|(i, c)| TaggedChar {
            c,
            origin: Origin::Original(i),
        })
        .collect();
    let mut total = 0;
    for filter in filters {
        let (next, count) = apply_one(&chars, filter);
        chars = next;
        total += count;
    }
    (chars, total)
}

fn apply_one(chars: &[TaggedChar], filter: &ContentFilter) -> (Vec<TaggedChar>, usize) {
    let text: String = chars.iter().map(|t| t.c).collect();

    // Match offsets are in bytes; the tag vector is per char.
    let mut byte_to_idx: HashMap<usize, usize> = text
        .char_indices()
        .enumerate()
        .map(|(idx, (byte, _))| (byte, idx))
        .collect();
    byte_to_idx.insert(text.len(), chars.len());

    let mut out = Vec::with_capacity(chars.len());
    let mut count = 0;
    let mut last = 0usize;

    for caps in filter.pattern.captures_iter(&text) {
        let m = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let (start, end) = (byte_to_idx[&m.start()], byte_to_idx[&m.end()]);
        out.extend_from_slice(&chars[byte_to_idx[&last]..start]);

        match (filter.replace)(&caps) {
            None => out.extend_from_slice(&chars[start..end]),
            Some(replacement) => {
                count += 1;
                let span = &chars[start..end];
                for (i, c) in replacement.chars().enumerate() {
                    // A replacement char identical to the matched char at the
                    // same offset keeps its origin (and therefore its proven
                    // renderability). Everything else is introduced, hinted
                    // at the matched char it replaces; overflow past the
                    // match end stays attached to the last matched char.
                    let aligned = span.get(i.min(span.len().saturating_sub(1)));
                    let origin = match aligned {
                        Some(t) if t.c == c && i < span.len() => t.origin,
                        Some(t) => Origin::Introduced(match t.origin {
                            Origin::Original(idx) => Some(idx),
                            Origin::Introduced(hint) => hint,
                        }),
                        None => Origin::Introduced(None),
                    };
                    out.push(TaggedChar { c, origin });
                }
            }
        }
        last = m.end();
    }
    out.extend_from_slice(&chars[byte_to_idx[&last]..]);
    (out, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_string(chars: &[TaggedChar]) -> String {
        chars.iter().map(|t| t.c).collect()
    }

    #[test]
    fn test_fixed_replacement_and_tags() {
        let filters = vec![ContentFilter::replace_all(
            Regex::new(r"\d{3}-\d{2}-\d{4}").unwrap(),
            "XXX-XX-XXXX",
        )];
        let (chars, count) = apply_filters("ssn 123-45-6789 end", &filters);
        assert_eq!(count, 1);
        assert_eq!(as_string(&chars), "ssn XXX-XX-XXXX end");
        // The dashes line up with the match and keep their origins.
        assert_eq!(chars[7].origin, Origin::Original(7));
        assert!(matches!(chars[4].origin, Origin::Introduced(Some(4))));
        // Text outside the match is untouched.
        assert_eq!(chars[0].origin, Origin::Original(0));
        assert_eq!(chars[16].origin, Origin::Original(16));
    }

    #[test]
    fn test_none_leaves_match_unchanged() {
        let filters = vec![ContentFilter::new(
            Regex::new(r"\d+").unwrap(),
            |caps: &Captures| {
                if &caps[0] == "42" {
                    None
                } else {
                    Some("N".to_string())
                }
            },
        )];
        let (chars, count) = apply_filters("keep 42 redact 7", &filters);
        assert_eq!(as_string(&chars), "keep 42 redact N");
        assert_eq!(count, 1);
        assert_eq!(chars[5].origin, Origin::Original(5));
    }

    #[test]
    fn test_filters_chain_in_order() {
        let filters = vec![
            ContentFilter::replace_all(Regex::new("cat").unwrap(), "dog"),
            ContentFilter::replace_all(Regex::new("dog").unwrap(), "bird"),
        ];
        let (chars, count) = apply_filters("a cat", &filters);
        assert_eq!(as_string(&chars), "a bird");
        assert_eq!(count, 2);
    }

    #[test]
    fn test_capture_groups_in_replacement() {
        let filters = vec![ContentFilter::new(
            Regex::new(r"(\w+)@\S+").unwrap(),
            |caps: &Captures| Some(format!("{}@redacted", &caps[1])),
        )];
        let (chars, _) = apply_filters("mail bob@example.com now", &filters);
        assert_eq!(as_string(&chars), "mail bob@redacted now");
    }

    #[test]
    fn test_deletion_replacement() {
        let filters = vec![ContentFilter::replace_all(
            Regex::new("secret ").unwrap(),
            "",
        )];
        let (chars, count) = apply_filters("a secret plan", &filters);
        assert_eq!(as_string(&chars), "a plan");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_non_ascii_text() {
        let filters = vec![
            ContentFilter::replace_all(Regex::new("é").unwrap(), "e"),
            ContentFilter::replace_all(Regex::new("à").unwrap(), "a"),
        ];
        let (chars, count) = apply_filters("café déjà", &filters);
        assert_eq!(as_string(&chars), "cafe deja");
        assert_eq!(count, 3);
    }
}
