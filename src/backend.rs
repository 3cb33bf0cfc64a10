//! PDF backend abstraction layer.
//!
//! Provides a trait-based interface for the document-container operations the
//! redaction pipeline needs, isolating the concrete PDF library (lopdf) from
//! the content-stream rewriting logic.

use std::io::Write;

use crate::detect::detect_format_from_bytes;
use crate::error::{Error, Result};

/// Page identifier: (object number, generation number).
pub type PageId = (u32, u16);

/// One entry of an encoding `Differences` array.
#[derive(Debug, Clone, PartialEq)]
pub enum DifferenceItem {
    /// An integer setting the code for the next glyph name.
    Code(i64),
    /// A glyph name consuming the current code.
    Glyph(String),
}

/// Font data extracted from a page's resource dictionary.
///
/// Everything the glyph inventory can be derived from; fields are `None` when
/// the font dictionary does not carry them.
#[derive(Debug, Clone)]
pub struct FontResource {
    /// Resource name (key in the page's font dictionary, e.g. `F1`).
    pub name: Vec<u8>,
    /// Base font name (e.g. `Helvetica-Bold`).
    pub base_font: Option<String>,
    /// Named base encoding (`WinAnsiEncoding`, `MacRomanEncoding`, ...).
    pub encoding_base: Option<String>,
    /// Encoding dictionary `Differences` entries.
    pub differences: Vec<DifferenceItem>,
    pub first_char: Option<i64>,
    pub widths: Option<Vec<f64>>,
    /// Decompressed ToUnicode CMap stream bytes.
    pub to_unicode: Option<Vec<u8>>,
}

/// Abstract interface for PDF document access.
///
/// The redaction core is written against this trait; [`LopdfBackend`] is the
/// concrete implementation used by the library entry points.
pub trait DocumentBackend {
    /// All pages in document order.
    fn pages(&self) -> Vec<PageId>;

    /// Raw (decompressed, concatenated) content-stream bytes for a page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>>;

    /// Replace a page's content stream with new bytes.
    fn set_page_content(&mut self, page: PageId, content: Vec<u8>) -> Result<()>;

    /// Font resource entries referenced by a page.
    fn page_fonts(&self, page: PageId) -> Result<Vec<FontResource>>;

    /// Info dictionary fields with string-like values, as raw PDF string
    /// bytes.
    fn info_fields(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// Set an Info dictionary field; `None` deletes it.
    fn set_info_field(&mut self, key: &str, value: Option<Vec<u8>>) -> Result<()>;

    /// Raw XMP metadata packet bytes, if the document has one.
    fn xmp_packet(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the XMP metadata stream; `None` removes it entirely.
    fn set_xmp_packet(&mut self, packet: Option<Vec<u8>>) -> Result<()>;

    /// Serialize the whole document.
    fn save(&mut self, out: &mut dyn Write) -> Result<()>;
}

// ---------------------------------------------------------------------------
// LopdfBackend: concrete implementation backed by lopdf
// ---------------------------------------------------------------------------

use lopdf::{Dictionary, Document as LopdfDocument, Object, Stream, StringFormat};

/// Concrete [`DocumentBackend`] backed by `lopdf::Document`.
pub struct LopdfBackend {
    doc: LopdfDocument,
}

impl LopdfBackend {
    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        detect_format_from_bytes(data)?;
        let doc = LopdfDocument::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            _ => Error::from(e),
        })?;
        if doc.is_encrypted() {
            return Err(Error::Encrypted);
        }
        Ok(Self { doc })
    }

    /// Load from a reader, buffering the whole document first.
    pub fn load_reader<R: std::io::Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::load_bytes(&data)
    }

    /// Direct access to the underlying `lopdf::Document`.
    ///
    /// Escape hatch for operations not covered by [`DocumentBackend`].
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Follow a reference to its target object; non-references pass through.
    fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        match obj {
            Object::Reference(r) => self.doc.get_object(*r).unwrap_or(obj),
            _ => obj,
        }
    }

    fn font_resource(&self, name: &[u8], dict: &Dictionary) -> FontResource {
        let base_font = dict
            .get(b"BaseFont")
            .ok()
            .and_then(|o| o.as_name().ok())
            .map(|n| String::from_utf8_lossy(n).into_owned());

        let mut encoding_base = None;
        let mut differences = Vec::new();
        if let Ok(enc) = dict.get(b"Encoding") {
            match self.resolve(enc) {
                Object::Name(n) => {
                    encoding_base = Some(String::from_utf8_lossy(n).into_owned());
                }
                Object::Dictionary(enc_dict) => {
                    encoding_base = enc_dict
                        .get(b"BaseEncoding")
                        .ok()
                        .and_then(|o| o.as_name().ok())
                        .map(|n| String::from_utf8_lossy(n).into_owned());
                    if let Ok(diff) = enc_dict.get(b"Differences") {
                        if let Object::Array(items) = self.resolve(diff) {
                            for item in items {
                                match item {
                                    Object::Integer(i) => {
                                        differences.push(DifferenceItem::Code(*i))
                                    }
                                    Object::Name(n) => differences.push(DifferenceItem::Glyph(
                                        String::from_utf8_lossy(n).into_owned(),
                                    )),
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        let first_char = dict
            .get(b"FirstChar")
            .ok()
            .map(|o| self.resolve(o))
            .and_then(|o| o.as_i64().ok());

        let widths = dict
            .get(b"Widths")
            .ok()
            .map(|o| self.resolve(o))
            .and_then(|o| o.as_array().ok())
            .map(|arr| {
                arr.iter()
                    .map(|o| match self.resolve(o) {
                        Object::Integer(i) => *i as f64,
                        Object::Real(r) => *r as f64,
                        _ => 0.0,
                    })
                    .collect()
            });

        let to_unicode = dict.get(b"ToUnicode").ok().and_then(|o| {
            if let Object::Stream(s) = self.resolve(o) {
                Some(
                    s.decompressed_content()
                        .unwrap_or_else(|_| s.content.clone()),
                )
            } else {
                None
            }
        });

        FontResource {
            name: name.to_vec(),
            base_font,
            encoding_base,
            differences,
            first_char,
            widths,
            to_unicode,
        }
    }

    /// Object id of the Info dictionary, creating an empty one on demand.
    fn ensure_info_id(&mut self) -> Result<(u32, u16)> {
        if let Ok(Object::Reference(id)) = self.doc.trailer.get(b"Info") {
            return Ok(*id);
        }
        let id = self.doc.add_object(Object::Dictionary(Dictionary::new()));
        self.doc.trailer.set("Info", id);
        Ok(id)
    }

    fn catalog_id(&self) -> Result<(u32, u16)> {
        self.doc
            .trailer
            .get(b"Root")
            .ok()
            .and_then(|o| o.as_reference().ok())
            .ok_or_else(|| Error::MissingObject("document catalog".to_string()))
    }
}

impl DocumentBackend for LopdfBackend {
    fn pages(&self) -> Vec<PageId> {
        self.doc.get_pages().into_values().collect()
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>> {
        let page_dict = self
            .doc
            .get_dictionary(page)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        let contents = match page_dict.get(b"Contents") {
            Ok(c) => c,
            // A page with no content stream is legal: nothing to redact.
            Err(_) => return Ok(Vec::new()),
        };

        let stream_bytes = |s: &Stream| -> Vec<u8> {
            s.decompressed_content()
                .unwrap_or_else(|_| s.content.clone())
        };

        match self.resolve(contents) {
            Object::Stream(s) => Ok(stream_bytes(s)),
            Object::Array(arr) => {
                // Multiple streams are concatenated into one logical stream,
                // with whitespace between them per the spec.
                let mut content = Vec::new();
                for obj in arr {
                    if let Object::Stream(s) = self.resolve(obj) {
                        content.extend_from_slice(&stream_bytes(s));
                        content.push(b'\n');
                    }
                }
                Ok(content)
            }
            _ => Err(Error::PdfParse("invalid page content entry".to_string())),
        }
    }

    fn set_page_content(&mut self, page: PageId, content: Vec<u8>) -> Result<()> {
        self.doc
            .change_page_content(page, content)
            .map_err(|e| Error::PdfParse(e.to_string()))
    }

    fn page_fonts(&self, page: PageId) -> Result<Vec<FontResource>> {
        let fonts = self
            .doc
            .get_page_fonts(page)
            .map_err(|e| Error::PdfParse(e.to_string()))?;

        Ok(fonts
            .iter()
            .map(|(name, dict)| self.font_resource(name, dict))
            .collect())
    }

    fn info_fields(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let info = match self.doc.trailer.get(b"Info") {
            Ok(obj) => match self.resolve(obj) {
                Object::Dictionary(d) => d,
                _ => return Ok(Vec::new()),
            },
            Err(_) => return Ok(Vec::new()),
        };

        let mut fields = Vec::new();
        for (key, value) in info.iter() {
            let key = String::from_utf8_lossy(key).into_owned();
            match self.resolve(value) {
                Object::String(bytes, _) => fields.push((key, bytes.clone())),
                // `Trapped` is a name; expose it like a string value so the
                // DEFAULT filter reaches it too.
                Object::Name(bytes) => fields.push((key, bytes.clone())),
                other => {
                    log::warn!("Info field {} has non-string value {:?}, skipped", key, other)
                }
            }
        }
        Ok(fields)
    }

    fn set_info_field(&mut self, key: &str, value: Option<Vec<u8>>) -> Result<()> {
        let id = self.ensure_info_id()?;
        let dict = self
            .doc
            .get_object_mut(id)
            .map_err(Error::from)?
            .as_dict_mut()
            .map_err(Error::from)?;
        match value {
            Some(bytes) => dict.set(key.as_bytes(), Object::String(bytes, StringFormat::Literal)),
            None => {
                dict.remove(key.as_bytes());
            }
        }
        Ok(())
    }

    fn xmp_packet(&self) -> Result<Option<Vec<u8>>> {
        let catalog = self.doc.catalog().map_err(Error::from)?;
        let metadata = match catalog.get(b"Metadata") {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        match self.resolve(metadata) {
            Object::Stream(s) => Ok(Some(
                s.decompressed_content()
                    .unwrap_or_else(|_| s.content.clone()),
            )),
            _ => Ok(None),
        }
    }

    fn set_xmp_packet(&mut self, packet: Option<Vec<u8>>) -> Result<()> {
        let catalog_id = self.catalog_id()?;
        let existing = self
            .doc
            .catalog()
            .ok()
            .and_then(|c| c.get(b"Metadata").ok())
            .and_then(|o| o.as_reference().ok());

        match packet {
            None => {
                if let Some(id) = existing {
                    self.doc.delete_object(id);
                }
                let catalog = self
                    .doc
                    .get_object_mut(catalog_id)
                    .map_err(Error::from)?
                    .as_dict_mut()
                    .map_err(Error::from)?;
                catalog.remove(b"Metadata");
            }
            Some(bytes) => {
                let mut dict = Dictionary::new();
                dict.set("Type", Object::Name(b"Metadata".to_vec()));
                dict.set("Subtype", Object::Name(b"XML".to_vec()));
                let stream = Stream::new(dict, bytes);
                let id = match existing {
                    Some(id) => {
                        self.doc.objects.insert(id, Object::Stream(stream));
                        id
                    }
                    None => self.doc.add_object(Object::Stream(stream)),
                };
                let catalog = self
                    .doc
                    .get_object_mut(catalog_id)
                    .map_err(Error::from)?
                    .as_dict_mut()
                    .map_err(Error::from)?;
                catalog.set("Metadata", id);
            }
        }
        Ok(())
    }

    fn save(&mut self, mut out: &mut dyn Write) -> Result<()> {
        // save_to needs a sized writer; a reference to the trait object is.
        self.doc.save_to(&mut out).map_err(Error::from)?;
        Ok(())
    }
}
