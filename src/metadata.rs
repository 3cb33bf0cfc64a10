//! Info dictionary redaction.
//!
//! Document metadata lives in the trailer's Info dictionary as PDF strings.
//! Rules are keyed by field name; the pseudo-key `DEFAULT` catches every
//! field without a specific rule, and `ALL` rules run against every field
//! after the specific or default ones. A rule for a field the dictionary
//! lacks still runs, seeing `None`, and may create the field. Date-valued
//! strings are parsed into timestamps before the rules see them and
//! serialized back afterward.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::backend::DocumentBackend;
use crate::error::{Error, Result};

/// Pseudo-field matched when no rule exists for a field's own name.
pub const DEFAULT_FIELD: &str = "DEFAULT";
/// Pseudo-field whose rules run against every field.
pub const ALL_FIELDS: &str = "ALL";

/// A decoded Info dictionary value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Text(String),
    Date(PdfDate),
}

impl MetadataValue {
    /// The text form, for rules that treat everything as a string.
    pub fn as_text(&self) -> String {
        match self {
            MetadataValue::Text(s) => s.clone(),
            MetadataValue::Date(d) => d.format(),
        }
    }
}

/// A PDF `D:` date. The offset is optional because PDF permits local-time
/// stamps with no zone designator, and we round-trip those without
/// inventing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfDate {
    pub stamp: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)^D:
            (\d{4})(\d{2})?(\d{2})?      # date
            (\d{2})?(\d{2})?(\d{2})?     # time
            (?:([Zz+\-])(\d{2})?'?(\d{2})?'?)?$",
        )
        .expect("date pattern is valid")
    })
}

impl PdfDate {
    /// Parse a `D:YYYYMMDDHHmmSSOHH'mm'` string; omitted trailing components
    /// default per the PDF spec (month and day to 1, time to zero).
    pub fn parse(s: &str) -> Option<Self> {
        let caps = date_pattern().captures(s)?;
        let part = |i: usize, default: u32| -> u32 {
            caps.get(i)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(default)
        };

        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, part(2, 1), part(3, 1))?;
        let stamp = date.and_hms_opt(part(4, 0), part(5, 0), part(6, 0))?;

        let offset = match caps.get(7).map(|m| m.as_str()) {
            None => None,
            Some("Z") | Some("z") => FixedOffset::east_opt(0),
            Some(sign) => {
                let seconds = (part(8, 0) * 3600 + part(9, 0) * 60) as i32;
                if sign == "-" {
                    FixedOffset::west_opt(seconds)
                } else {
                    FixedOffset::east_opt(seconds)
                }
            }
        };
        Some(PdfDate { stamp, offset })
    }

    /// Serialize back to the `D:` form.
    pub fn format(&self) -> String {
        let mut out = self.stamp.format("D:%Y%m%d%H%M%S").to_string();
        if let Some(offset) = self.offset {
            let total = offset.local_minus_utc();
            let sign = if total < 0 { '-' } else { '+' };
            let total = total.abs();
            out.push_str(&format!(
                "{}{:02}'{:02}'",
                sign,
                total / 3600,
                (total % 3600) / 60
            ));
        }
        out
    }
}

/// Rule callback: receives the decoded value (`None` when the field is
/// absent), returns the new value or `None` to delete the field.
pub type MetadataFn =
    Box<dyn Fn(Option<MetadataValue>) -> Option<MetadataValue> + Send + Sync>;

/// Redaction rules for the Info dictionary.
#[derive(Default)]
pub struct MetadataFilter {
    rules: HashMap<String, Vec<MetadataFn>>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule for one field (or `DEFAULT` / `ALL`).
    pub fn add<F>(mut self, field: impl Into<String>, rule: F) -> Self
    where
        F: Fn(Option<MetadataValue>) -> Option<MetadataValue> + Send + Sync + 'static,
    {
        self.rules
            .entry(field.into())
            .or_default()
            .push(Box::new(rule));
        self
    }

    /// Delete every field that has no specific rule.
    pub fn clear_by_default(self) -> Self {
        self.add(DEFAULT_FIELD, |_| None)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules applying to a field: its own (falling back to `DEFAULT`),
    /// then the `ALL` rules.
    fn rules_for<'a>(&'a self, field: &str) -> impl Iterator<Item = &'a MetadataFn> + 'a {
        let specific = self
            .rules
            .get(field)
            .or_else(|| self.rules.get(DEFAULT_FIELD))
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let all = self
            .rules
            .get(ALL_FIELDS)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        specific.iter().chain(all.iter())
    }
}

impl std::fmt::Debug for MetadataFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut fields: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        fields.sort_unstable();
        f.debug_struct("MetadataFilter")
            .field("fields", &fields)
            .finish()
    }
}

/// Counters from one Info dictionary pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataOutcome {
    pub edited: usize,
    pub deleted: usize,
}

/// Decode raw PDF string bytes: UTF-16BE when the BOM is present, else the
/// Latin-1 reading of PDFDocEncoding.
pub fn decode_pdf_string(bytes: &[u8]) -> Result<String> {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let rest = &bytes[2..];
        if rest.len() % 2 != 0 {
            return Err(Error::Encoding(
                "UTF-16BE string has odd byte count".to_string(),
            ));
        }
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16(&units)
            .map_err(|_| Error::Encoding("invalid UTF-16BE string".to_string()))
    } else {
        Ok(bytes.iter().map(|&b| b as char).collect())
    }
}

/// Encode text as a PDF string: Latin-1 when it fits, else BOM + UTF-16BE.
pub fn encode_pdf_string(text: &str) -> Vec<u8> {
    if text.chars().all(|c| (c as u32) <= 0xFF) {
        text.chars().map(|c| c as u8).collect()
    } else {
        let mut out = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_be_bytes());
        }
        out
    }
}

/// Apply the filter to the Info dictionary. The fields visited are the
/// union of the existing fields and the filter's named fields, so a rule
/// for an absent field runs with `None` and may create it; fields named
/// by neither are untouched.
pub fn apply_metadata_filter(
    backend: &mut dyn DocumentBackend,
    filter: &MetadataFilter,
) -> Result<MetadataOutcome> {
    let mut outcome = MetadataOutcome::default();
    if filter.is_empty() {
        return Ok(outcome);
    }

    let existing = backend.info_fields()?;
    let mut fields: Vec<(String, Option<Vec<u8>>)> = existing
        .into_iter()
        .map(|(field, bytes)| (field, Some(bytes)))
        .collect();
    let mut named: Vec<&String> = filter
        .rules
        .keys()
        .filter(|k| {
            k.as_str() != DEFAULT_FIELD
                && k.as_str() != ALL_FIELDS
                && !fields.iter().any(|(f, _)| f == *k)
        })
        .collect();
    named.sort_unstable();
    fields.extend(named.into_iter().map(|k| (k.clone(), None)));

    for (field, bytes) in fields {
        let mut value = match &bytes {
            Some(bytes) => {
                let text = decode_pdf_string(bytes)?;
                Some(match PdfDate::parse(&text) {
                    Some(date) => MetadataValue::Date(date),
                    None => MetadataValue::Text(text),
                })
            }
            None => None,
        };
        let original = value.clone();

        for rule in filter.rules_for(&field) {
            value = rule(value);
        }
        if value == original {
            continue;
        }

        match value {
            None => {
                log::debug!("deleting Info field {}", field);
                backend.set_info_field(&field, None)?;
                outcome.deleted += 1;
            }
            Some(v) => {
                let encoded = match v {
                    MetadataValue::Text(s) => encode_pdf_string(&s),
                    MetadataValue::Date(d) => d.format().into_bytes(),
                };
                backend.set_info_field(&field, Some(encoded))?;
                outcome.edited += 1;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_round_trip_with_offset() {
        let date = PdfDate::parse("D:20240315093000-05'00'").unwrap();
        assert_eq!(date.stamp.to_string(), "2024-03-15 09:30:00");
        assert_eq!(date.offset, FixedOffset::west_opt(5 * 3600));
        assert_eq!(date.format(), "D:20240315093000-05'00'");
    }

    #[test]
    fn test_date_without_offset() {
        let date = PdfDate::parse("D:20240315093000").unwrap();
        assert!(date.offset.is_none());
        assert_eq!(date.format(), "D:20240315093000");
    }

    #[test]
    fn test_date_partial_components_default() {
        let date = PdfDate::parse("D:2024").unwrap();
        assert_eq!(date.stamp.to_string(), "2024-01-01 00:00:00");
    }

    #[test]
    fn test_date_z_designator() {
        let date = PdfDate::parse("D:20240101120000Z").unwrap();
        assert_eq!(date.offset, FixedOffset::east_opt(0));
    }

    #[test]
    fn test_non_date_text_is_not_a_date() {
        assert!(PdfDate::parse("Jane Author").is_none());
        assert!(PdfDate::parse("D:not-a-date").is_none());
    }

    #[test]
    fn test_pdf_string_latin1() {
        let bytes = encode_pdf_string("café");
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9]);
        assert_eq!(decode_pdf_string(&bytes).unwrap(), "café");
    }

    #[test]
    fn test_pdf_string_utf16() {
        let bytes = encode_pdf_string("漢字");
        assert!(bytes.starts_with(&[0xFE, 0xFF]));
        assert_eq!(decode_pdf_string(&bytes).unwrap(), "漢字");
    }

    #[test]
    fn test_odd_utf16_is_error() {
        let result = decode_pdf_string(&[0xFE, 0xFF, 0x00]);
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn test_rules_for_precedence() {
        let filter = MetadataFilter::new()
            .add("Title", |v| v)
            .clear_by_default()
            .add(ALL_FIELDS, |v| v);

        // Title: own rule + ALL. Author: DEFAULT + ALL.
        assert_eq!(filter.rules_for("Title").count(), 2);
        assert_eq!(filter.rules_for("Author").count(), 2);
        let deleted = filter
            .rules_for("Author")
            .next()
            .map(|rule| rule(Some(MetadataValue::Text("x".to_string()))));
        assert_eq!(deleted, Some(None));
    }
}
