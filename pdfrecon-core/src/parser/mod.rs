//! Tolerant PDF container parsing.
//!
//! This module takes a raw byte buffer and recovers as much PDF structure as
//! it can: marker offsets, the object population, cross-reference sections,
//! and the revision layout implied by `%%EOF` markers. Parsing here is a
//! pattern-recognition problem over bytes, not grammar validation: every
//! layer returns partial results plus recorded errors rather than failing the
//! file.
//!
//! # Layers
//!
//! - [`scanner`]: single-pass literal marker scan over the raw bytes
//! - [`lexer`] / [`objects`]: tokenization and the PDF object model
//! - [`filters`]: stream decode chain (Flate, ASCIIHex, ASCII85, LZW, RunLength)
//! - [`xref`]: classic tables, xref streams, and `/Prev` chains
//! - [`document`]: whole-document assembly into a [`document::ParsedDocument`]
//!
//! # Example
//!
//! ```rust
//! use pdfrecon::parser::document::ParsedDocument;
//! use pdfrecon::ScanConfig;
//!
//! let bytes = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n\
//!               trailer\n<< /Root 1 0 R >>\nstartxref\n9\n%%EOF\n".to_vec();
//! let doc = ParsedDocument::parse(bytes, &ScanConfig::default());
//! assert_eq!(doc.eof_offsets.len(), 1);
//! ```

pub mod document;
pub mod filters;
pub mod lexer;
pub mod objects;
pub mod scanner;
pub mod xref;

pub use self::document::ParsedDocument;
pub use self::objects::{ObjectId, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString};
pub use self::scanner::{MarkerKind, MarkerScan};
pub use self::xref::{XRefEntry, XRefEntryKind, XRefSection};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors raised by the parsing layers.
///
/// These are local by design: the document assembler demotes them to
/// recorded strings and keeps going, so a single bad object never takes
/// down the scan of a file.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// File does not begin with a `%PDF-` header
    #[error("Invalid PDF header")]
    InvalidHeader,

    /// Zero-length input
    #[error("File is empty (0 bytes)")]
    EmptyFile,

    /// Syntax error at a byte offset
    #[error("Syntax error at offset {position}: {message}")]
    SyntaxError { position: usize, message: String },

    /// Input ended in the middle of a token or object
    #[error("Unexpected end of input at offset {0}")]
    UnexpectedEof(usize),

    /// A cross-reference section could not be read
    #[error("Invalid xref section at offset {offset}: {message}")]
    InvalidXRef { offset: usize, message: String },

    /// The `/Prev` chain revisited an offset
    #[error("Circular xref chain at offset {0}")]
    CircularXRefChain(usize),

    /// A stream filter failed to decode
    #[error("Stream decode error: {0}")]
    StreamDecode(String),

    /// A stream declared or produced more bytes than the configured bound
    #[error("Stream exceeds size limit: {actual} bytes, limit {limit}")]
    StreamTooLarge { actual: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let errors = vec![
            ParseError::InvalidHeader,
            ParseError::EmptyFile,
            ParseError::SyntaxError {
                position: 12,
                message: "unexpected '>'".to_string(),
            },
            ParseError::UnexpectedEof(99),
            ParseError::InvalidXRef {
                offset: 400,
                message: "bad subsection header".to_string(),
            },
            ParseError::CircularXRefChain(400),
            ParseError::StreamDecode("corrupt deflate stream".to_string()),
            ParseError::StreamTooLarge {
                actual: 128,
                limit: 64,
            },
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
