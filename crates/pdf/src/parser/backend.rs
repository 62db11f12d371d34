use std::collections::BTreeMap;

use lopdf::content::Content;

use crate::PdfError;

/// A page identifier mirroring `lopdf::ObjectId`: (object number, generation number).
pub type PageId = (u32, u16);

/// Owned, backend-neutral view of a PDF object.
///
/// The layout interpreter never touches `lopdf` types directly; operands
/// arrive as `RawObject`s so the interpreter can run on hand-built fixture
/// streams in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum RawObject {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<RawObject>),
    Dict(Vec<(Vec<u8>, RawObject)>),
    Reference(PageId),
}

/// One content-stream operation: operator plus its operands.
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<RawObject>,
}

/// Numeric operand, whichever of the two PDF number types it came as.
pub fn as_number(value: &RawObject) -> Option<f32> {
    match value {
        RawObject::Real(r) => Some(*r),
        RawObject::Integer(i) => Some(*i as f32),
        _ => None,
    }
}

fn dict_entries(dict: &lopdf::Dictionary) -> Vec<(Vec<u8>, RawObject)> {
    dict.iter()
        .map(|(key, value)| (key.clone(), value_from_lopdf(value)))
        .collect()
}

/// Lift a `lopdf::Object` into a [`RawObject`].
///
/// Stream payloads are dropped on purpose; content bytes flow through
/// [`PdfBackend::page_content`] instead, so only the stream's dictionary
/// survives the conversion.
pub fn value_from_lopdf(object: &lopdf::Object) -> RawObject {
    use lopdf::Object;

    match object {
        Object::Null => RawObject::Null,
        Object::Boolean(b) => RawObject::Bool(*b),
        Object::Integer(i) => RawObject::Integer(*i),
        Object::Real(r) => RawObject::Real(*r),
        Object::Name(name) => RawObject::Name(name.clone()),
        Object::String(bytes, _format) => RawObject::Str(bytes.clone()),
        Object::Reference(id) => RawObject::Reference(*id),
        Object::Array(items) => RawObject::Array(items.iter().map(value_from_lopdf).collect()),
        Object::Dictionary(dict) => RawObject::Dict(dict_entries(dict)),
        Object::Stream(stream) => RawObject::Dict(dict_entries(&stream.dict)),
    }
}

fn utf16be(payload: &[u8]) -> String {
    let units: Vec<u16> = payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decode raw PDF string bytes without any font information.
///
/// A UTF-16BE byte-order mark wins outright; otherwise the bytes are taken
/// as UTF-8 when they validate, and as Latin-1 when they do not. French
/// statements produced with WinAnsi-encoded fonts land in that last branch,
/// which maps every byte to its code point and so keeps the accented
/// characters intact.
pub fn decode_string_bytes(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, payload @ ..] => utf16be(payload),
        _ => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_owned(),
            Err(_) => latin1(bytes),
        },
    }
}

/// The seam between the layout interpreter and the PDF library.
///
/// Tests substitute a fixture implementation that replays canned operation
/// streams; production code goes through [`LopdfBackend`].
pub trait PdfBackend {
    /// 1-based page number to [`PageId`], in page order.
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// Raw content-stream bytes of one page.
    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError>;

    /// Parse content bytes into a sequence of [`ContentOp`]s.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// Decode the bytes of a text-showing operand, taking the current
    /// font's declared encoding into account when the backend knows it.
    fn decode_text(&self, page: PageId, font_key: &[u8], bytes: &[u8]) -> String;
}

/// [`PdfBackend`] over an in-memory [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Open a document from bytes. Encrypted statements are refused rather
    /// than half-read.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        match lopdf::Document::load_mem(data) {
            Ok(doc) if doc.is_encrypted() => Err(PdfError::Encrypted),
            Ok(doc) => Ok(Self { doc }),
            Err(err) => Err(PdfError::Load(err.to_string())),
        }
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Declared encoding of a font on a page (`WinAnsiEncoding`,
    /// `Identity-H`, ...), when the font dictionary names one.
    fn font_encoding(&self, page: PageId, font_key: &[u8]) -> Option<String> {
        let fonts = self.doc.get_page_fonts(page).ok()?;
        match fonts.get(font_key)?.get(b"Encoding") {
            Ok(lopdf::Object::Name(name)) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }
}

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_content(&self, page: PageId) -> Result<Vec<u8>, PdfError> {
        self.doc
            .get_page_content(page)
            .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e)))
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content = Content::decode(data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(value_from_lopdf).collect(),
            })
            .collect())
    }

    fn decode_text(&self, page: PageId, font_key: &[u8], bytes: &[u8]) -> String {
        // Fonts with an Identity encoding show text as 2-byte CID codes,
        // which in the statements we care about map straight to UTF-16BE.
        let cid_font = self
            .font_encoding(page, font_key)
            .is_some_and(|enc| enc.contains("Identity"));

        if cid_font && !bytes.is_empty() && bytes.len() % 2 == 0 {
            let decoded = utf16be(bytes);
            if decoded.chars().any(|c| c != '\u{FFFD}' && c != '\0') {
                return decoded;
            }
        }

        decode_string_bytes(bytes)
    }
}
