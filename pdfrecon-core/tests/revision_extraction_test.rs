//! Revision extraction round-trips and bookkeeping.

mod common;

use common::{one_page_document, write_fixture};
use pdfrecon::parser::document::ParsedDocument;
use pdfrecon::{extract_revisions, scan, Analyzer, RiskLevel, ScanConfig};

fn three_revision_fixture() -> Vec<u8> {
    let mut builder = one_page_document(b"BT (v1) Tj ET");
    builder.end_revision("/Root 1 0 R");
    builder.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Rotate 90 >>",
    );
    builder.end_revision("/Root 1 0 R");
    builder.object(
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Rotate 270 >>",
    );
    builder.end_revision("/Root 1 0 R");
    builder.build()
}

#[test]
fn extracts_every_prior_revision() {
    let (dir, path) = write_fixture(&three_revision_fixture(), "doc.pdf");
    let out_dir = dir.path().join("out");

    let revisions = extract_revisions(&path, &out_dir).expect("extract");

    assert_eq!(revisions.len(), 2);
    for (i, revision) in revisions.iter().enumerate() {
        assert_eq!(revision.index, i + 1);
        assert!(!revision.is_corrupt());
        let output = revision.output_path.as_ref().expect("written to disk");
        assert_eq!(
            output.file_name().and_then(|n| n.to_str()),
            Some(format!("doc_rev{}.pdf", i + 1).as_str())
        );
        let written = std::fs::read(output).expect("read extracted file");
        assert_eq!(written.len(), revision.byte_range.1);
        assert!(written.starts_with(b"%PDF-1.4"));
        assert!(written.ends_with(b"%%EOF"));
    }
}

/// Re-scanning extracted revision K yields exactly K `%%EOF` markers.
#[test]
fn extracted_revision_roundtrip() {
    let (dir, path) = write_fixture(&three_revision_fixture(), "doc.pdf");
    let out_dir = dir.path().join("out");
    let revisions = extract_revisions(&path, &out_dir).expect("extract");

    for revision in &revisions {
        let bytes = std::fs::read(revision.output_path.as_ref().unwrap()).expect("read");
        let reparsed = ParsedDocument::parse(bytes, &ScanConfig::default());
        assert_eq!(
            reparsed.eof_offsets.len(),
            revision.index,
            "revision {} should contain exactly {} %%EOF marker(s)",
            revision.index,
            revision.index
        );
    }
}

#[test]
fn scan_materializes_into_sibling_directory() {
    let (dir, path) = write_fixture(&three_revision_fixture(), "doc.pdf");

    let report = scan(&path, &ScanConfig::default()).expect("scan");

    assert_eq!(report.revisions.len(), 2);
    let expected_dir = dir.path().join("Altered_files");
    for revision in &report.revisions {
        let output = revision.output_path.as_ref().expect("materialized");
        assert!(output.starts_with(&expected_dir));
        assert!(output.exists());
    }
}

#[test]
fn corrupt_revision_written_but_excluded() {
    // First revision has no startxref at all; the final document is fine.
    let mut bytes: Vec<u8> = Vec::new();
    bytes.extend_from_slice(b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n");
    let obj_off = bytes.len();
    bytes.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /PageMode /UseNone >>\nendobj\n");
    let xref_off = bytes.len();
    bytes.extend_from_slice(b"xref\n1 1\n");
    bytes.extend_from_slice(format!("{obj_off:010} 00000 n \n").as_bytes());
    bytes.extend_from_slice(b"trailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n");
    bytes.extend_from_slice(xref_off.to_string().as_bytes());
    bytes.extend_from_slice(b"\n%%EOF\n");

    let (dir, path) = write_fixture(&bytes, "damaged.pdf");
    let out_dir = dir.path().join("out");
    let revisions = extract_revisions(&path, &out_dir).expect("extract");

    assert_eq!(revisions.len(), 1);
    assert!(revisions[0].is_corrupt());
    // Written to disk for manual inspection all the same.
    assert!(revisions[0].output_path.as_ref().unwrap().exists());

    // And the scan-level report excludes it from the usable list while
    // honoring `usable + 1 <= eof count`.
    let report = scan(&path, &ScanConfig::analysis_only()).expect("scan");
    assert_eq!(report.usable_revisions().count(), 0);
    assert!(report.usable_revisions().count() + 1 <= 2);
}

#[test]
fn cancellation_discards_partial_output() {
    let (dir, path) = write_fixture(&three_revision_fixture(), "doc.pdf");
    let analyzer = Analyzer::new(ScanConfig::default());
    let cancel = pdfrecon::CancelToken::new();
    cancel.cancel();

    let result = analyzer.scan_with_cancel(&path, &cancel);
    assert!(result.is_err());
    // Nothing was left behind.
    assert!(!dir.path().join("Altered_files").exists());
}

#[test]
fn disabled_extraction_still_reports_revisions() {
    let (dir, path) = write_fixture(&three_revision_fixture(), "doc.pdf");

    let report = scan(&path, &ScanConfig::analysis_only()).expect("scan");

    assert_eq!(report.revisions.len(), 2);
    assert!(report.revisions.iter().all(|r| r.output_path.is_none()));
    assert!(!dir.path().join("Altered_files").exists());
    // Valid revisions still drive classification (here trumped by the
    // High-severity HasRevisions finding).
    assert_eq!(report.classification, RiskLevel::Red);
}
