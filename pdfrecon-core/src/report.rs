//! Per-file scan output.
//!
//! A [`FileReport`] is an in-memory value; persisting it (Excel, CSV, JSON,
//! HTML) belongs to external writers, which is why everything here derives
//! `Serialize` and owns its data outright.

use crate::analysis::{Finding, Severity};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::path::PathBuf;

/// Overall risk classification for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

/// State of one extracted prior revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RevisionStatus {
    /// Extracted and structurally parseable.
    Valid,
    /// Extracted but its cross-reference structure would not parse.
    Corrupt(String),
    /// Renders pixel-identical to the final document.
    VisuallyIdentical,
}

/// A prior version recovered from the file's incremental-update history.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
    /// 1-based position in revision order; the earliest save is 1.
    pub index: usize,
    /// Byte range `[start, end)` of this revision within the source file.
    /// `start` is always 0: a revision is a prefix of the file.
    pub byte_range: (usize, usize),
    pub status: RevisionStatus,
    /// Where the revision bytes were materialized, when they were.
    pub output_path: Option<PathBuf>,
}

impl Revision {
    pub fn is_corrupt(&self) -> bool {
        matches!(self.status, RevisionStatus::Corrupt(_))
    }

    pub fn len(&self) -> usize {
        self.byte_range.1 - self.byte_range.0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One dated event in the document's reconstructed history.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    /// Normalized timestamp; `None` when the raw string would not parse.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// The timestamp exactly as it appeared in the file.
    pub raw_timestamp: String,
    /// Where the event came from (`Info`, `XMP`, `XMP history`, `Signature`).
    pub source: String,
    /// What the event was (`CreationDate`, `saved`, ...).
    pub event: String,
}

/// Complete result of scanning one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// File size in bytes.
    pub size: u64,
    /// MD5 of the file contents, lowercase hex.
    pub md5: String,
    pub findings: Vec<Finding>,
    pub revisions: Vec<Revision>,
    pub classification: RiskLevel,
    /// Dated events merged from Info, XMP, XMP history, and signatures,
    /// stable-sorted by timestamp.
    pub timeline: Vec<TimelineEvent>,
    /// Non-fatal problems encountered during the scan, in discovery order.
    pub errors: Vec<String>,
}

impl FileReport {
    /// True when any finding carries High severity.
    pub fn has_high_severity_finding(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::High)
    }

    /// Revisions that parsed (and were therefore worth showing to a user).
    pub fn usable_revisions(&self) -> impl Iterator<Item = &Revision> {
        self.revisions.iter().filter(|r| !r.is_corrupt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Evidence, IndicatorKind};

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Red > RiskLevel::Yellow);
        assert!(RiskLevel::Yellow > RiskLevel::Green);
    }

    #[test]
    fn test_revision_accessors() {
        let revision = Revision {
            index: 1,
            byte_range: (0, 1024),
            status: RevisionStatus::Valid,
            output_path: None,
        };
        assert_eq!(revision.len(), 1024);
        assert!(!revision.is_corrupt());

        let corrupt = Revision {
            status: RevisionStatus::Corrupt("no xref".to_string()),
            ..revision
        };
        assert!(corrupt.is_corrupt());
    }

    #[test]
    fn test_report_serializes() {
        let report = FileReport {
            path: PathBuf::from("sample.pdf"),
            size: 4,
            md5: "0cc175b9c0f1b6a831c399e269772661".to_string(),
            findings: vec![Finding::new(
                IndicatorKind::HasRevisions,
                "2 revisions",
                Evidence::default().with_count(2),
            )],
            revisions: vec![],
            classification: RiskLevel::Red,
            timeline: vec![],
            errors: vec![],
        };
        let json = serde_json::to_string(&report).expect("report serializes");
        assert!(json.contains("HasRevisions"));
        assert!(json.contains("Red"));
    }

    #[test]
    fn test_usable_revisions_filters_corrupt() {
        let report = FileReport {
            path: PathBuf::from("x.pdf"),
            size: 0,
            md5: String::new(),
            findings: vec![],
            revisions: vec![
                Revision {
                    index: 1,
                    byte_range: (0, 10),
                    status: RevisionStatus::Corrupt("bad".to_string()),
                    output_path: None,
                },
                Revision {
                    index: 2,
                    byte_range: (0, 20),
                    status: RevisionStatus::Valid,
                    output_path: None,
                },
            ],
            classification: RiskLevel::Yellow,
            timeline: vec![],
            errors: vec![],
        };
        assert_eq!(report.usable_revisions().count(), 1);
    }
}
