//! Prior-revision extraction.
//!
//! Every `%%EOF` except the last terminates a complete historical version
//! of the document: the byte prefix up to and including that marker. The
//! extractor materializes each prefix as `<stem>_rev<K>.pdf` so an examiner
//! can open what the document looked like before each incremental save.
//!
//! A prefix whose cross-reference structure will not parse is still written
//! (manual inspection has salvaged stranger things) but marked `Corrupt`
//! and excluded from the user-facing revision list.

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::{PdfReconError, Result};
use crate::parser::document::ParsedDocument;
use crate::parser::scanner::{MarkerKind, MarkerScan};
use crate::parser::{lexer, xref};
use crate::report::{Revision, RevisionStatus};
use std::path::{Path, PathBuf};

const EOF_MARKER_LEN: usize = 5; // %%EOF

/// Build the revision list for `doc` without touching the filesystem.
/// The latest revision is the file itself and is not listed.
pub fn plan(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Revision> {
    if doc.eof_offsets.len() < 2 {
        return Vec::new();
    }

    let mut revisions = Vec::new();
    for (i, &eof_offset) in doc.eof_offsets[..doc.eof_offsets.len() - 1]
        .iter()
        .enumerate()
    {
        let index = i + 1;
        let end = (eof_offset + EOF_MARKER_LEN).min(doc.source.len());
        let prefix = &doc.source[..end];

        let status = match validate_prefix(prefix, config.max_stream_size) {
            Ok(()) => RevisionStatus::Valid,
            Err(reason) => RevisionStatus::Corrupt(reason),
        };

        revisions.push(Revision {
            index,
            byte_range: (0, end),
            status,
            output_path: None,
        });
    }
    revisions
}

/// Sanity-check that a revision prefix is a readable PDF: it must carry a
/// header, a final `startxref`, and a cross-reference section with entries.
fn validate_prefix(prefix: &[u8], max_stream_size: usize) -> std::result::Result<(), String> {
    let markers = MarkerScan::scan(prefix);
    if markers.count(MarkerKind::Header) == 0 {
        return Err("revision has no %PDF- header".to_string());
    }
    let Some(startxref) = markers.last(MarkerKind::StartXref) else {
        return Err("revision has no startxref".to_string());
    };

    let mut lexer = lexer::Lexer::at(prefix, startxref + b"startxref".len());
    let declared = match lexer.next_token() {
        Ok(lexer::Token::Integer(offset)) if offset >= 0 => offset as usize,
        _ => return Err("revision startxref has no offset".to_string()),
    };

    let mut errors = Vec::new();
    let sections = xref::read_chain(prefix, declared, max_stream_size, &mut errors);
    if sections.is_empty() {
        return Err(format!(
            "revision xref unreadable: {}",
            errors.last().map(String::as_str).unwrap_or("no sections")
        ));
    }
    if sections.iter().all(|s| s.entries.is_empty()) {
        return Err("revision xref has no entries".to_string());
    }
    Ok(())
}

/// Write each planned revision to `out_dir`, filling `output_path`.
/// Corrupt revisions are written too. Cancellation removes the file being
/// written and aborts.
pub fn materialize(
    doc: &ParsedDocument,
    revisions: &mut [Revision],
    source_path: &Path,
    out_dir: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    if revisions.is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(out_dir)?;

    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    for revision in revisions.iter_mut() {
        cancel.check()?;

        let file_name = format!("{stem}_rev{}.pdf", revision.index);
        let target = out_dir.join(&file_name);
        let bytes = &doc.source[revision.byte_range.0..revision.byte_range.1];

        if let Err(e) = std::fs::write(&target, bytes) {
            let _ = std::fs::remove_file(&target);
            return Err(PdfReconError::RevisionExtraction(format!(
                "writing {}: {e}",
                target.display()
            )));
        }
        if cancel.is_cancelled() {
            let _ = std::fs::remove_file(&target);
            return Err(PdfReconError::Cancelled);
        }

        tracing::debug!(
            "revision {} ({} bytes, {:?}) written to {}",
            revision.index,
            bytes.len(),
            revision.status,
            target.display()
        );
        revision.output_path = Some(target);
    }
    Ok(())
}

/// Resolve the configured output directory against the input's parent.
pub fn resolve_output_dir(source_path: &Path, config: &ScanConfig) -> PathBuf {
    if config.revision_output_dir.is_absolute() {
        config.revision_output_dir.clone()
    } else {
        source_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&config.revision_output_dir)
    }
}
