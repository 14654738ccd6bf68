//! Synthetic PDF fixtures for integration tests.
//!
//! Builds small but structurally honest PDFs in memory: real byte offsets
//! in the xref tables, real `/Prev` chains for incremental saves, real
//! `startxref` targets. Tests assert against documents the parser has no
//! reason to distrust.

/// Incremental PDF builder. Objects are written as they are added; each
/// `end_revision` call appends a correct xref table, trailer, `startxref`,
/// and `%%EOF`, chaining to the previous revision via `/Prev`.
pub struct PdfBuilder {
    bytes: Vec<u8>,
    pending: Vec<(u32, usize)>,
    max_object: u32,
    prev_xref: Option<usize>,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        Self {
            bytes: format!("%PDF-{version}\n").into_bytes(),
            pending: Vec::new(),
            max_object: 0,
            prev_xref: None,
        }
    }

    /// Append `number 0 obj <body> endobj`.
    pub fn object(&mut self, number: u32, body: &str) -> &mut Self {
        let offset = self.bytes.len();
        self.pending.push((number, offset));
        self.max_object = self.max_object.max(number);
        self.bytes
            .extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
        self
    }

    /// Append a stream object; `/Length` is filled in automatically and
    /// `dict_entries` supplies the rest of the dictionary (no `<<`/`>>`).
    pub fn stream_object(&mut self, number: u32, dict_entries: &str, data: &[u8]) -> &mut Self {
        let offset = self.bytes.len();
        self.pending.push((number, offset));
        self.max_object = self.max_object.max(number);
        self.bytes.extend_from_slice(
            format!(
                "{number} 0 obj\n<< {dict_entries} /Length {} >>\nstream\n",
                data.len()
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\nendstream\nendobj\n");
        self
    }

    /// Close the current revision: xref table for the objects added since
    /// the last revision, a trailer carrying `trailer_entries` (e.g.
    /// `"/Root 1 0 R"`), `startxref`, `%%EOF`.
    pub fn end_revision(&mut self, trailer_entries: &str) -> &mut Self {
        let xref_offset = self.bytes.len();
        self.bytes.extend_from_slice(b"xref\n");

        if self.prev_xref.is_none() {
            self.bytes.extend_from_slice(b"0 1\n0000000000 65535 f \n");
        }
        let mut objects = std::mem::take(&mut self.pending);
        objects.sort_unstable();
        for (number, offset) in objects {
            self.bytes
                .extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
        }

        self.bytes.extend_from_slice(
            format!("trailer\n<< /Size {} {trailer_entries}", self.max_object + 1).as_bytes(),
        );
        if let Some(prev) = self.prev_xref {
            self.bytes.extend_from_slice(format!(" /Prev {prev}").as_bytes());
        }
        self.bytes.extend_from_slice(b" >>\nstartxref\n");
        self.bytes.extend_from_slice(xref_offset.to_string().as_bytes());
        self.bytes.extend_from_slice(b"\n%%EOF\n");

        self.prev_xref = Some(xref_offset);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// One-page document skeleton: catalog (1), page tree (2), page (3),
/// content stream (4). Callers add more objects before closing.
pub fn one_page_document(content: &[u8]) -> PdfBuilder {
    let mut builder = PdfBuilder::new("1.4");
    builder
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>",
        )
        .stream_object(4, "", content);
    builder
}

/// Write `bytes` as `<name>` in a fresh temp dir, returning the dir guard
/// and the file path.
pub fn write_fixture(bytes: &[u8], name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    (dir, path)
}
