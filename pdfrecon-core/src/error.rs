use thiserror::Error;

/// Top-level error type for the analyzer.
///
/// Most failure modes do not surface here: a malformed or even unopenable
/// input file still yields a [`crate::FileReport`] whose `errors` list records
/// what went wrong. This type is reserved for failures of the analysis
/// machinery itself: cancellation, rendering, and revision output I/O.
#[derive(Error, Debug)]
pub enum PdfReconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Revision extraction failed: {0}")]
    RevisionExtraction(String),

    #[error("Page rendering failed: {0}")]
    Render(String),

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PdfReconError>;

impl From<crate::parser::ParseError> for PdfReconError {
    fn from(err: crate::parser::ParseError) -> Self {
        PdfReconError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let error = PdfReconError::RevisionExtraction("disk full".to_string());
        assert_eq!(error.to_string(), "Revision extraction failed: disk full");
        assert_eq!(
            PdfReconError::Cancelled.to_string(),
            "Operation cancelled"
        );
    }

    #[test]
    fn test_error_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error = PdfReconError::from(io_error);

        match error {
            PdfReconError::Io(ref err) => assert_eq!(err.kind(), ErrorKind::NotFound),
            _ => panic!("Expected IO error variant"),
        }
    }

    #[test]
    fn test_error_from_parse_error() {
        let parse_error = crate::parser::ParseError::InvalidHeader;
        let error: PdfReconError = parse_error.into();

        match error {
            PdfReconError::Parse(msg) => assert!(msg.contains("header")),
            _ => panic!("Expected Parse variant"),
        }
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PdfReconError>();
    }
}
