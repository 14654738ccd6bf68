//! PDF object model and object parser.
//!
//! Implements the eight basic PDF object types plus indirect references and
//! indirect object wrappers (`N G obj ... endobj`). Stream bodies are
//! captured raw next to their declared `/Filter` chain: decoding is the
//! concern of [`super::filters`], and a forensic scan frequently wants the
//! undecoded bytes anyway (hashing, EXIF probing, byte-range checks).
//!
//! The parser is tolerant: garbage between dictionary entries is skipped,
//! a missing `endobj` is recorded rather than fatal, and a stream whose
//! declared `/Length` disagrees with the actual `endstream` position falls
//! back to a forward search. Every concession is logged into the caller's
//! error list so the report can show what was tolerated.

use super::lexer::{Lexer, Token};
use super::scanner::is_pdf_whitespace;
use super::{ParseError, ParseResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Maximum container nesting before the parser refuses to recurse further.
const MAX_NESTING_DEPTH: usize = 128;

/// Identity of an indirect object: `(object number, generation)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.generation)
    }
}

/// PDF name object, stored without the leading slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PdfName(pub String);

impl PdfName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// PDF string object. Raw bytes: encoding depends on context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfString(pub Vec<u8>);

impl PdfString {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Decode to text: UTF-16BE when the BOM is present, otherwise treated
    /// as PDFDocEncoding (Latin-1 superset, decoded byte-per-char).
    pub fn to_text(&self) -> String {
        if self.0.len() >= 2 && self.0[0] == 0xfe && self.0[1] == 0xff {
            let units: Vec<u16> = self.0[2..]
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            self.0.iter().map(|&b| b as char).collect()
        }
    }
}

/// Ordered collection of objects.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

impl PdfArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfObject> {
        self.0.iter()
    }
}

/// Name-keyed mapping. Keys are stored without the leading slash.
///
/// Backed by a `BTreeMap` so iteration order (and with it every piece of
/// derived evidence) is deterministic across scans of the same bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub BTreeMap<String, PdfObject>);

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of the `/Type` entry, when present and a name.
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type").and_then(PdfObject::as_name)
    }

    pub fn iter(&self) -> std::collections::btree_map::Iter<'_, String, PdfObject> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Stream object: dictionary plus raw (possibly compressed) body bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    /// Body exactly as stored in the file; see [`super::filters::decode_stream`].
    pub data: Vec<u8>,
}

impl PdfStream {
    /// Decode the body through the declared `/Filter` chain, bounded by
    /// `max_size`.
    pub fn decode(&self, max_size: usize) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(self, max_size)
    }

    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// Any PDF object.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    /// Indirect reference `N G R`
    Reference(u32, u16),
}

impl PdfObject {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value of an integer or real.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PdfObject::Integer(i) => Some(*i as f64),
            PdfObject::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PdfObject::Name(n) => Some(n.as_str()),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjectId> {
        match self {
            PdfObject::Reference(num, gen) => Some(ObjectId::new(*num, *gen)),
            _ => None,
        }
    }

    /// Parse a direct object at the lexer's current position.
    pub fn parse(lexer: &mut Lexer<'_>) -> ParseResult<Self> {
        Self::parse_at_depth(lexer, 0)
    }

    fn parse_at_depth(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token, depth)
    }

    fn parse_from_token(lexer: &mut Lexer<'_>, token: Token, depth: usize) -> ParseResult<Self> {
        if depth > MAX_NESTING_DEPTH {
            return Err(ParseError::SyntaxError {
                position: lexer.pos(),
                message: "object nesting too deep".to_string(),
            });
        }

        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::True => Ok(PdfObject::Boolean(true)),
            Token::False => Ok(PdfObject::Boolean(false)),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::LiteralString(bytes) | Token::HexString(bytes) => {
                Ok(PdfObject::String(PdfString::new(bytes)))
            }
            Token::Name(name) => Ok(PdfObject::Name(PdfName(name))),
            Token::Integer(i) => Self::parse_integer_or_reference(lexer, i),
            Token::ArrayStart => Self::parse_array(lexer, depth),
            Token::DictStart => Self::parse_dictionary(lexer, depth),
            other => Err(ParseError::SyntaxError {
                position: lexer.pos(),
                message: format!("unexpected token {other:?} where an object was expected"),
            }),
        }
    }

    /// `N G R` lookahead. Two non-negative integers followed by a bare `R`
    /// collapse into a reference; anything else rewinds.
    fn parse_integer_or_reference(lexer: &mut Lexer<'_>, first: i64) -> ParseResult<Self> {
        if !(0..=9_999_999).contains(&first) {
            return Ok(PdfObject::Integer(first));
        }

        let checkpoint = lexer.pos();
        let looked_ahead = (|| {
            let gen = match lexer.next_token() {
                Ok(Token::Integer(g)) if (0..=65_535).contains(&g) => g,
                _ => return None,
            };
            match lexer.next_token() {
                Ok(Token::R) => Some(PdfObject::Reference(first as u32, gen as u16)),
                _ => None,
            }
        })();

        match looked_ahead {
            Some(reference) => Ok(reference),
            None => {
                lexer.seek(checkpoint);
                Ok(PdfObject::Integer(first))
            }
        }
    }

    fn parse_array(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Self> {
        let mut array = PdfArray::new();
        loop {
            let checkpoint = lexer.pos();
            match lexer.next_token() {
                Ok(Token::ArrayEnd) => break,
                Ok(token) => {
                    array
                        .0
                        .push(Self::parse_from_token(lexer, token, depth + 1)?);
                }
                Err(ParseError::UnexpectedEof(pos)) => {
                    return Err(ParseError::UnexpectedEof(pos))
                }
                Err(_) => {
                    // Skip one unparseable token and keep collecting.
                    lexer.seek(checkpoint + 1);
                }
            }
        }
        Ok(PdfObject::Array(array))
    }

    fn parse_dictionary(lexer: &mut Lexer<'_>, depth: usize) -> ParseResult<Self> {
        let mut dict = PdfDictionary::new();
        loop {
            let checkpoint = lexer.pos();
            match lexer.next_token() {
                Ok(Token::DictEnd) => break,
                Ok(Token::Name(key)) => {
                    let value = Self::parse_at_depth(lexer, depth + 1)?;
                    dict.insert(key, value);
                }
                Ok(_) => {
                    // Garbage between entries; drop it and resync on the
                    // next name key or the closing delimiter.
                    continue;
                }
                Err(ParseError::UnexpectedEof(pos)) => {
                    return Err(ParseError::UnexpectedEof(pos))
                }
                Err(_) => {
                    lexer.seek(checkpoint + 1);
                }
            }
        }
        Ok(PdfObject::Dictionary(dict))
    }
}

/// A parsed `N G obj ... endobj` wrapper.
#[derive(Debug, Clone, PartialEq)]
pub struct IndirectObject {
    pub id: ObjectId,
    /// Offset of the object header (the object number) in the file.
    pub offset: usize,
    pub object: PdfObject,
}

/// Parse the indirect object whose header starts at `offset`.
///
/// Tolerated damage: a missing `endobj`, a `/Length` that disagrees with
/// the actual `endstream` position: is appended to `errors` while the
/// object is still returned. Returns the offset just past the object so the
/// caller can resume a sequential sweep.
pub fn parse_indirect_at(
    input: &[u8],
    offset: usize,
    errors: &mut Vec<String>,
) -> ParseResult<(IndirectObject, usize)> {
    let mut lexer = Lexer::at(input, offset);

    let number = match lexer.next_token()? {
        Token::Integer(n) if (0..=9_999_999).contains(&n) => n as u32,
        other => {
            return Err(ParseError::SyntaxError {
                position: offset,
                message: format!("expected object number, found {other:?}"),
            })
        }
    };
    let generation = match lexer.next_token()? {
        Token::Integer(g) if (0..=65_535).contains(&g) => g as u16,
        other => {
            return Err(ParseError::SyntaxError {
                position: offset,
                message: format!("expected generation number, found {other:?}"),
            })
        }
    };
    match lexer.next_token()? {
        Token::Obj => {}
        other => {
            return Err(ParseError::SyntaxError {
                position: offset,
                message: format!("expected 'obj', found {other:?}"),
            })
        }
    }

    let id = ObjectId::new(number, generation);
    let mut object = PdfObject::parse(&mut lexer)?;

    // A dictionary followed by the `stream` keyword is a stream object.
    let checkpoint = lexer.pos();
    match lexer.next_token() {
        Ok(Token::StreamKeyword) => {
            let dict = match object {
                PdfObject::Dictionary(d) => d,
                _ => {
                    return Err(ParseError::SyntaxError {
                        position: checkpoint,
                        message: "'stream' keyword after a non-dictionary object".to_string(),
                    })
                }
            };
            let stream = read_stream_body(input, &mut lexer, id, dict, errors)?;
            object = PdfObject::Stream(stream);
        }
        _ => lexer.seek(checkpoint),
    }

    // `endobj` should follow; its absence is recorded, not fatal.
    let after_object = lexer.pos();
    match lexer.next_token() {
        Ok(Token::EndObj) => {}
        _ => {
            errors.push(format!("object {id}: missing endobj terminator"));
            lexer.seek(after_object);
        }
    }

    Ok((
        IndirectObject {
            id,
            offset,
            object,
        },
        lexer.pos(),
    ))
}

/// Capture a stream body. Trusts the declared `/Length` only when an
/// `endstream` keyword actually follows the claimed extent; otherwise
/// searches forward for the terminator.
fn read_stream_body(
    input: &[u8],
    lexer: &mut Lexer<'_>,
    id: ObjectId,
    dict: PdfDictionary,
    errors: &mut Vec<String>,
) -> ParseResult<PdfStream> {
    lexer.skip_eol();
    let data_start = lexer.pos();

    let declared = dict.get("Length").and_then(PdfObject::as_integer);

    if let Some(len) = declared {
        let len = len.max(0) as usize;
        let data_end = data_start.saturating_add(len);
        if data_end <= input.len() && endstream_follows(input, data_end) {
            lexer.seek(data_end);
            let mut tail = Lexer::at(input, data_end);
            // Consume the endstream keyword we just verified.
            let _ = tail.next_token();
            lexer.seek(tail.pos());
            return Ok(PdfStream {
                dict,
                data: input[data_start..data_end].to_vec(),
            });
        }
        errors.push(format!(
            "object {id}: declared stream /Length {len} does not reach endstream, searching"
        ));
    }

    // No usable length (indirect, absent, or wrong): search for the
    // terminator and trim the trailing EOL that precedes it.
    match find_bytes(input, b"endstream", data_start) {
        Some(end_pos) => {
            let mut data_end = end_pos;
            if data_end > data_start && input[data_end - 1] == b'\n' {
                data_end -= 1;
                if data_end > data_start && input[data_end - 1] == b'\r' {
                    data_end -= 1;
                }
            } else if data_end > data_start && input[data_end - 1] == b'\r' {
                data_end -= 1;
            }
            lexer.seek(end_pos + b"endstream".len());
            Ok(PdfStream {
                dict,
                data: input[data_start..data_end].to_vec(),
            })
        }
        None => Err(ParseError::UnexpectedEof(data_start)),
    }
}

fn endstream_follows(input: &[u8], mut pos: usize) -> bool {
    while pos < input.len() && is_pdf_whitespace(input[pos]) {
        pos += 1;
    }
    input[pos..].starts_with(b"endstream")
}

/// Binary-safe substring search starting at `from`.
pub(crate) fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &[u8]) -> PdfObject {
        let mut lexer = Lexer::new(input);
        PdfObject::parse(&mut lexer).unwrap()
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_one(b"null"), PdfObject::Null);
        assert_eq!(parse_one(b"true"), PdfObject::Boolean(true));
        assert_eq!(parse_one(b"42"), PdfObject::Integer(42));
        assert_eq!(parse_one(b"-1.5"), PdfObject::Real(-1.5));
        assert_eq!(
            parse_one(b"/Catalog"),
            PdfObject::Name(PdfName::new("Catalog"))
        );
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_one(b"7 0 R"), PdfObject::Reference(7, 0));
        assert_eq!(parse_one(b"12 3 R"), PdfObject::Reference(12, 3));
    }

    #[test]
    fn test_integer_not_mistaken_for_reference() {
        // "7 0 obj": the 7 is an object header, not a reference.
        let mut lexer = Lexer::new(b"7 0 obj");
        assert_eq!(PdfObject::parse(&mut lexer).unwrap(), PdfObject::Integer(7));
        assert_eq!(PdfObject::parse(&mut lexer).unwrap(), PdfObject::Integer(0));
    }

    #[test]
    fn test_array_of_references() {
        let obj = parse_one(b"[1 0 R 2 0 R 300]");
        let array = obj.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array.get(0), Some(&PdfObject::Reference(1, 0)));
        assert_eq!(array.get(1), Some(&PdfObject::Reference(2, 0)));
        assert_eq!(array.get(2), Some(&PdfObject::Integer(300)));
    }

    #[test]
    fn test_nested_dictionary() {
        let obj = parse_one(
            b"<< /Type /Page /Resources << /Font << /F1 5 0 R >> >> /MediaBox [0 0 612 792] >>",
        );
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get_type(), Some("Page"));
        let resources = dict.get("Resources").unwrap().as_dict().unwrap();
        let fonts = resources.get("Font").unwrap().as_dict().unwrap();
        assert_eq!(fonts.get("F1"), Some(&PdfObject::Reference(5, 0)));
    }

    #[test]
    fn test_dictionary_with_garbage_between_entries() {
        let obj = parse_one(b"<< /A 1 12 /B 2 >>");
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("A"), Some(&PdfObject::Integer(1)));
        assert_eq!(dict.get("B"), Some(&PdfObject::Integer(2)));
    }

    #[test]
    fn test_parse_indirect_simple() {
        let input = b"5 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let mut errors = Vec::new();
        let (indirect, end) = parse_indirect_at(input, 0, &mut errors).unwrap();
        assert_eq!(indirect.id, ObjectId::new(5, 0));
        assert!(errors.is_empty());
        assert!(end <= input.len());
        assert_eq!(
            indirect.object.as_dict().unwrap().get_type(),
            Some("Catalog")
        );
    }

    #[test]
    fn test_parse_indirect_stream_with_length() {
        let input = b"4 0 obj\n<< /Length 5 >>\nstream\nhello\nendstream\nendobj\n";
        let mut errors = Vec::new();
        let (indirect, _) = parse_indirect_at(input, 0, &mut errors).unwrap();
        let stream = indirect.object.as_stream().unwrap();
        assert_eq!(stream.data, b"hello");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_parse_indirect_stream_bad_length_falls_back() {
        let input = b"4 0 obj\n<< /Length 9999 >>\nstream\nhello\nendstream\nendobj\n";
        let mut errors = Vec::new();
        let (indirect, _) = parse_indirect_at(input, 0, &mut errors).unwrap();
        let stream = indirect.object.as_stream().unwrap();
        assert_eq!(stream.data, b"hello");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("does not reach endstream"));
    }

    #[test]
    fn test_parse_indirect_stream_indirect_length() {
        let input = b"4 0 obj\n<< /Length 6 0 R >>\nstream\nhello\nendstream\nendobj\n";
        let mut errors = Vec::new();
        let (indirect, _) = parse_indirect_at(input, 0, &mut errors).unwrap();
        assert_eq!(indirect.object.as_stream().unwrap().data, b"hello");
    }

    #[test]
    fn test_parse_indirect_missing_endobj() {
        let input = b"3 0 obj\n<< /A 1 >>\n2 0 obj";
        let mut errors = Vec::new();
        let (indirect, _) = parse_indirect_at(input, 0, &mut errors).unwrap();
        assert_eq!(indirect.id, ObjectId::new(3, 0));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("missing endobj"));
    }

    #[test]
    fn test_string_to_text_utf16() {
        let s = PdfString::new(vec![0xfe, 0xff, 0x00, b'H', 0x00, b'i']);
        assert_eq!(s.to_text(), "Hi");
    }

    #[test]
    fn test_string_to_text_pdfdoc() {
        let s = PdfString::new(b"Acrobat".to_vec());
        assert_eq!(s.to_text(), "Acrobat");
    }

    #[test]
    fn test_find_bytes() {
        assert_eq!(find_bytes(b"abcabc", b"abc", 0), Some(0));
        assert_eq!(find_bytes(b"abcabc", b"abc", 1), Some(3));
        assert_eq!(find_bytes(b"abcabc", b"xyz", 0), None);
        assert_eq!(find_bytes(b"abc", b"abc", 3), None);
    }

    #[test]
    fn test_object_id_display() {
        assert_eq!(ObjectId::new(7, 0).to_string(), "7 0");
        assert_eq!(ObjectId::new(12, 4).to_string(), "12 4");
    }

    #[test]
    fn test_deep_nesting_bounded() {
        let mut input = Vec::new();
        for _ in 0..200 {
            input.extend_from_slice(b"[ ");
        }
        let mut lexer = Lexer::new(&input);
        assert!(PdfObject::parse(&mut lexer).is_err());
    }
}
