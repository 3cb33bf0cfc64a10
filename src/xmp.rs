//! XMP metadata redaction.
//!
//! The XMP packet is an XML document attached to the catalog. Rules operate
//! on the packet as a string; every non-`None` result is streamed through an
//! XML reader/writer pass so a rule cannot leave a malformed packet behind.
//! A `None` result removes the metadata stream entirely.

use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use crate::backend::DocumentBackend;
use crate::error::{Error, Result};

/// Rule callback: receives the current packet (or `None` if the document has
/// none), returns the new packet or `None` to remove it.
pub type XmpFn = Box<dyn Fn(Option<String>) -> Result<Option<String>> + Send + Sync>;

/// Redaction rules for the XMP packet, applied in order.
#[derive(Default)]
pub struct XmpFilter {
    rules: Vec<XmpFn>,
}

impl XmpFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(mut self, rule: F) -> Self
    where
        F: Fn(Option<String>) -> Result<Option<String>> + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
        self
    }

    /// A filter that strips the packet from the document.
    pub fn remove_all() -> Self {
        Self::new().add(|_| Ok(None))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for XmpFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmpFilter")
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// Counters from one XMP pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmpOutcome {
    pub edited: bool,
    pub removed: bool,
}

/// Stream a packet through an XML read/write pass, normalizing it and
/// rejecting anything malformed.
pub fn validate_packet(packet: &str) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(packet);
    let mut writer = Writer::new(Vec::new());
    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(event) => writer
                .write_event(event)
                .map_err(|e| Error::Xmp(e.to_string()))?,
            Err(e) => {
                return Err(Error::Xmp(format!(
                    "invalid XML at offset {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }
    Ok(writer.into_inner())
}

/// Apply the filter chain to the document's XMP packet.
pub fn apply_xmp_filter(
    backend: &mut dyn DocumentBackend,
    filter: &XmpFilter,
) -> Result<XmpOutcome> {
    let mut outcome = XmpOutcome::default();
    if filter.is_empty() {
        return Ok(outcome);
    }

    let original = backend.xmp_packet()?;
    let had_packet = original.is_some();
    let mut current = match original {
        Some(bytes) => Some(
            String::from_utf8(bytes)
                .map_err(|_| Error::Xmp("packet is not valid UTF-8".to_string()))?,
        ),
        None => None,
    };
    let before = current.clone();

    for rule in &filter.rules {
        current = rule(current.take())?;
    }
    if current == before {
        return Ok(outcome);
    }

    match current {
        None => {
            if had_packet {
                log::debug!("removing XMP metadata stream");
                backend.set_xmp_packet(None)?;
                outcome.removed = true;
            }
        }
        Some(packet) => {
            let validated = validate_packet(&packet)?;
            backend.set_xmp_packet(Some(validated))?;
            outcome.edited = true;
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
  <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
    <rdf:Description xmlns:dc="http://purl.org/dc/elements/1.1/">
      <dc:title>Secret Project</dc:title>
    </rdf:Description>
  </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    #[test]
    fn test_validate_well_formed_packet() {
        let out = validate_packet(PACKET).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<dc:title>Secret Project</dc:title>"));
    }

    #[test]
    fn test_validate_rejects_mismatched_tags() {
        let result = validate_packet("<a><b></a></b>");
        assert!(matches!(result, Err(Error::Xmp(_))));
    }

    #[test]
    fn test_remove_all_has_one_rule() {
        let filter = XmpFilter::remove_all();
        assert!(!filter.is_empty());
        assert_eq!((filter.rules[0])(Some("x".to_string())).unwrap(), None);
    }

    #[test]
    fn test_rules_chain() {
        let filter = XmpFilter::new()
            .add(|p| Ok(p.map(|s| s.replace("Secret", "[x]"))))
            .add(|p| Ok(p.map(|s| s.replace("Project", "[y]"))));
        let mut current = Some(PACKET.to_string());
        for rule in &filter.rules {
            current = rule(current.take()).unwrap();
        }
        let text = current.unwrap();
        assert!(text.contains("<dc:title>[x] [y]</dc:title>"));
    }
}
