//! The scan pipeline.
//!
//! [`Analyzer`] wires the stages together: byte scan and structural parse,
//! metadata and content enrichment, indicator evaluation, revision
//! extraction, visual identity, classification. Each stage's non-fatal
//! problems accumulate into the report's `errors` in stage order, which
//! keeps two scans of the same bytes byte-for-byte comparable.
//!
//! `scan` returns `Ok(FileReport)` even for files that cannot be opened or
//! are not PDFs: those produce an empty-findings Green report carrying a
//! single error entry. The only `Err` a scan produces is cancellation.

use crate::analysis::{self, classify};
use crate::cache::ScanCache;
use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::content;
use crate::error::Result;
use crate::metadata::{self, ExtendedMetadataExtractor};
use crate::parser::document::ParsedDocument;
use crate::parser::objects::find_bytes;
use crate::report::{FileReport, Revision, RiskLevel};
use crate::revision;
use crate::visual::PageRenderer;
use std::path::Path;
use std::sync::Arc;

/// How deep into the file the `%PDF-` header may legitimately sit.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Scan one file with the given configuration.
///
/// Convenience wrapper over a one-shot [`Analyzer`] without renderer,
/// external metadata, or cache.
pub fn scan(path: impl AsRef<Path>, config: &ScanConfig) -> Result<FileReport> {
    Analyzer::new(config.clone()).scan(path)
}

/// Extract prior revisions of `path` into `out_dir`, independently of a
/// full scan.
pub fn extract_revisions(
    path: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
) -> Result<Vec<Revision>> {
    Analyzer::new(ScanConfig::default()).extract_revisions(path, out_dir)
}

/// The forensic analyzer. Holds read-only configuration plus the optional
/// collaborators; one instance is shared freely across a scanning pool.
pub struct Analyzer {
    config: ScanConfig,
    renderer: Option<Box<dyn PageRenderer>>,
    metadata_extractor: Option<Box<dyn ExtendedMetadataExtractor>>,
    cache: Option<Arc<ScanCache>>,
}

impl Analyzer {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            config,
            renderer: None,
            metadata_extractor: None,
            cache: None,
        }
    }

    /// Plug in a page renderer, enabling the visual-identity check.
    pub fn with_renderer(mut self, renderer: Box<dyn PageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Plug in an external metadata extractor; its keys are merged into
    /// the XMP property map before evaluation.
    pub fn with_metadata_extractor(mut self, extractor: Box<dyn ExtendedMetadataExtractor>) -> Self {
        self.metadata_extractor = Some(extractor);
        self
    }

    /// Share a scan cache keyed by `(path, mtime, size)`.
    pub fn with_cache(mut self, cache: Arc<ScanCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn scan(&self, path: impl AsRef<Path>) -> Result<FileReport> {
        self.scan_with_cancel(path, &CancelToken::new())
    }

    /// Full pipeline with cooperative cancellation. The token is polled
    /// between stages; on cancellation the in-progress report is discarded
    /// and any partially written revision file removed.
    pub fn scan_with_cancel(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancelToken,
    ) -> Result<FileReport> {
        let path = path.as_ref();
        tracing::debug!("scanning {}", path.display());

        let file_meta = match std::fs::metadata(path) {
            Ok(meta) => Some(meta),
            Err(e) => {
                return Ok(fatal_report(path, 0, String::new(), format!("cannot open file: {e}")))
            }
        };

        if let (Some(cache), Some(meta)) = (self.cache.as_ref(), file_meta.as_ref()) {
            if let Ok(mtime) = meta.modified() {
                if let Some(hit) = cache.get(path, mtime, meta.len()) {
                    tracing::debug!("cache hit for {}", path.display());
                    return Ok((*hit).clone());
                }
            }
        }

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Ok(fatal_report(path, 0, String::new(), format!("cannot read file: {e}")))
            }
        };
        let size = bytes.len() as u64;
        let md5 = format!("{:x}", md5::compute(&bytes));

        // Not a PDF at all: empty-findings Green report, one error, done.
        let header_window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
        if find_bytes(header_window, b"%PDF-", 0).is_none() {
            return Ok(fatal_report(
                path,
                size,
                md5,
                "no %PDF- header in the first 1024 bytes; not a PDF".to_string(),
            ));
        }

        cancel.check()?;

        // C1-C3: markers, objects, cross-reference chain.
        let mut doc = ParsedDocument::parse(bytes, &self.config);
        cancel.check()?;

        // C4: Info + XMP.
        metadata::enrich(&mut doc, self.config.max_stream_size);
        if let Some(extractor) = self.metadata_extractor.as_deref() {
            merge_external_metadata(&mut doc, extractor, path);
        }
        cancel.check()?;

        // C5: content-stream statistics.
        let (page_stats, content_errors) = content::inspect_pages(&doc, &self.config);
        doc.page_stats = page_stats;
        doc.errors.extend(content_errors);
        cancel.check()?;

        // C6: the indicator catalog.
        let (findings, evaluator_errors) = analysis::evaluate_all(&doc, &self.config);
        doc.errors.extend(evaluator_errors);
        cancel.check()?;

        // C7: prior revisions.
        let mut revisions = revision::plan(&doc, &self.config);
        if !revisions.is_empty() && self.config.extract_revisions {
            let out_dir = revision::resolve_output_dir(path, &self.config);
            if let Err(e) = revision::materialize(&doc, &mut revisions, path, &out_dir, cancel) {
                match e {
                    crate::PdfReconError::Cancelled => return Err(crate::PdfReconError::Cancelled),
                    other => doc.errors.push(other.to_string()),
                }
            }
        }
        cancel.check()?;

        // C8: visual identity of the extracted revisions.
        if let Some(renderer) = self.renderer.as_deref() {
            if !revisions.is_empty() {
                let visual_errors = crate::visual::check_visual_identity(
                    renderer,
                    &doc.source,
                    doc.pages.len(),
                    &mut revisions,
                    &self.config,
                    cancel,
                )?;
                doc.errors.extend(visual_errors);
            }
        }

        // C9: fuse into the report.
        let classification = classify::classify(&findings, &revisions);
        let timeline = classify::build_timeline(&doc);

        let report = FileReport {
            path: path.to_path_buf(),
            size,
            md5,
            findings,
            revisions,
            classification,
            timeline,
            errors: doc.errors,
        };

        if let (Some(cache), Some(meta)) = (self.cache.as_ref(), file_meta.as_ref()) {
            if let Ok(mtime) = meta.modified() {
                cache.insert(path.to_path_buf(), mtime, meta.len(), report.clone());
            }
        }

        tracing::debug!(
            "{}: {:?}, {} finding(s), {} revision(s)",
            path.display(),
            report.classification,
            report.findings.len(),
            report.revisions.len()
        );
        Ok(report)
    }

    /// Extract prior revisions without running the full indicator pipeline.
    pub fn extract_revisions(
        &self,
        path: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
    ) -> Result<Vec<Revision>> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let doc = ParsedDocument::parse(bytes, &self.config);
        let mut revisions = revision::plan(&doc, &self.config);
        revision::materialize(
            &doc,
            &mut revisions,
            path,
            out_dir.as_ref(),
            &CancelToken::new(),
        )?;
        Ok(revisions)
    }
}

fn merge_external_metadata(
    doc: &mut ParsedDocument,
    extractor: &dyn ExtendedMetadataExtractor,
    path: &Path,
) {
    match extractor.extract(path) {
        Ok(external) => {
            let packet = doc.xmp.get_or_insert_with(|| crate::metadata::xmp::XmpPacket {
                raw: Vec::new(),
                properties: Default::default(),
            });
            for (key, value) in external {
                // The file's own packet wins on conflicts.
                packet.properties.entry(key).or_insert(value);
            }
        }
        Err(e) => doc
            .errors
            .push(format!("external metadata extractor failed: {e}")),
    }
}

fn fatal_report(path: &Path, size: u64, md5: String, error: String) -> FileReport {
    FileReport {
        path: path.to_path_buf(),
        size,
        md5,
        findings: Vec::new(),
        revisions: Vec::new(),
        classification: RiskLevel::Green,
        timeline: Vec::new(),
        errors: vec![error],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_green_with_error() {
        let report = scan("/nonexistent/definitely_missing.pdf", &ScanConfig::default())
            .expect("scan returns a report");
        assert_eq!(report.classification, RiskLevel::Green);
        assert!(report.findings.is_empty());
        assert!(report.revisions.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("cannot open"));
    }

    #[test]
    fn test_non_pdf_is_green_with_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("not_a.pdf");
        std::fs::write(&path, b"just some text, no header anywhere").expect("write");

        let report = scan(&path, &ScanConfig::default()).expect("report");
        assert_eq!(report.classification, RiskLevel::Green);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("not a PDF"));
        assert!(!report.md5.is_empty());
    }

    #[test]
    fn test_empty_file_is_green_with_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("empty.pdf");
        std::fs::write(&path, b"").expect("write");

        let report = scan(&path, &ScanConfig::default()).expect("report");
        assert_eq!(report.classification, RiskLevel::Green);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn test_cancelled_scan_returns_err() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4\n1 0 obj\nnull\nendobj\n%%EOF\n").expect("write");

        let analyzer = Analyzer::new(ScanConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            analyzer.scan_with_cancel(&path, &cancel),
            Err(crate::PdfReconError::Cancelled)
        ));
    }

    #[test]
    fn test_cache_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, b"%PDF-1.4\n1 0 obj\nnull\nendobj\n%%EOF\n").expect("write");

        let cache = Arc::new(ScanCache::new());
        let analyzer =
            Analyzer::new(ScanConfig::analysis_only()).with_cache(Arc::clone(&cache));

        let first = analyzer.scan(&path).expect("first scan");
        assert_eq!(cache.len(), 1);
        let second = analyzer.scan(&path).expect("second scan");
        assert_eq!(first.md5, second.md5);
        assert_eq!(first.errors, second.errors);
    }
}
