//! Indicator evaluation and risk classification.
//!
//! The indicator catalog is data, not code: every indicator is a
//! [`IndicatorKind`] with a fixed severity, every evaluator is a pure
//! function from the parsed document to zero or more [`Finding`]s, and the
//! registry in [`EVALUATORS`] is the single place a new indicator gets
//! wired in. The classifier ([`classify`]) operates on severity alone.

pub mod classify;
pub mod indicators;

use crate::config::ScanConfig;
use crate::parser::document::ParsedDocument;
use crate::parser::objects::ObjectId;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Weight of an indicator. Any High finding makes the file Red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Medium,
    High,
}

/// Every indicator the analyzer can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum IndicatorKind {
    HasRevisions,
    TouchUpTextEdit,
    JavaScriptAutoExecute,
    MissingObjects,
    MultipleFontSubsets,
    MultipleCreatorsOrProducers,
    XmpHistory,
    MultipleDocumentIds,
    MultipleStartxref,
    ObjectsWithGenGreaterZero,
    MoreLayersThanPages,
    LinearizedAndUpdated,
    HasPieceInfo,
    HasRedactions,
    HasAnnotations,
    AcroFormNeedAppearances,
    HasDigitalSignature,
    DateInconsistency,
    MetadataVersionMismatch,
    SuspiciousTextPositioning,
    WhiteRectangleOverlay,
    ExcessiveDrawingOperations,
    OrphanedObjects,
    LargeObjectNumberGaps,
    ContainsJavaScript,
    DuplicateImagesDifferentXrefs,
    ImagesWithExif,
    CropBoxMediaBoxMismatch,
    ExcessiveFormFields,
    DuplicateBookmarks,
    InvalidBookmarkDestinations,
    EncryptionPresent,
}

impl IndicatorKind {
    /// Severity is a property of the indicator, never of the instance.
    pub fn severity(self) -> Severity {
        match self {
            IndicatorKind::HasRevisions
            | IndicatorKind::TouchUpTextEdit
            | IndicatorKind::JavaScriptAutoExecute
            | IndicatorKind::MissingObjects => Severity::High,
            _ => Severity::Medium,
        }
    }
}

/// Structured detail attached to a finding. All fields are owned copies:
/// evidence must outlive the [`ParsedDocument`] it was derived from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Evidence {
    /// Objects implicated by the finding.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<ObjectId>,
    /// Byte offsets into the scanned file.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub offsets: Vec<usize>,
    /// Extracted strings (names, producers, dates, hashes).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    /// A count, when the rule is numeric.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl Evidence {
    pub fn with_objects(mut self, objects: Vec<ObjectId>) -> Self {
        self.objects = objects;
        self
    }

    pub fn with_offsets(mut self, offsets: Vec<usize>) -> Self {
        self.offsets = offsets;
        self
    }

    pub fn with_values(mut self, values: Vec<String>) -> Self {
        self.values = values;
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }
}

/// One emitted indicator instance. Immutable after emission; owned by the
/// enclosing report.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub kind: IndicatorKind,
    pub severity: Severity,
    pub evidence: Evidence,
    /// One-line description for the report.
    pub human_summary: String,
}

impl Finding {
    pub fn new(kind: IndicatorKind, human_summary: impl Into<String>, evidence: Evidence) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            evidence,
            human_summary: human_summary.into(),
        }
    }
}

/// Signature shared by every evaluator.
pub type Evaluator = fn(&ParsedDocument, &ScanConfig) -> Vec<Finding>;

/// The evaluator registry, in catalog order. Adding an indicator means
/// adding a kind, an evaluator function, and one row here.
pub const EVALUATORS: &[(&str, Evaluator)] = &[
    ("has_revisions", indicators::has_revisions),
    ("touchup_textedit", indicators::touchup_textedit),
    ("javascript_auto_execute", indicators::javascript_auto_execute),
    ("missing_objects", indicators::missing_objects),
    ("multiple_font_subsets", indicators::multiple_font_subsets),
    (
        "multiple_creators_or_producers",
        indicators::multiple_creators_or_producers,
    ),
    ("xmp_history", indicators::xmp_history),
    ("multiple_document_ids", indicators::multiple_document_ids),
    ("multiple_startxref", indicators::multiple_startxref),
    (
        "objects_with_gen_greater_zero",
        indicators::objects_with_gen_greater_zero,
    ),
    ("more_layers_than_pages", indicators::more_layers_than_pages),
    ("linearized_and_updated", indicators::linearized_and_updated),
    ("has_piece_info", indicators::has_piece_info),
    ("has_redactions", indicators::has_redactions),
    ("has_annotations", indicators::has_annotations),
    (
        "acroform_need_appearances",
        indicators::acroform_need_appearances,
    ),
    ("has_digital_signature", indicators::has_digital_signature),
    ("date_inconsistency", indicators::date_inconsistency),
    (
        "metadata_version_mismatch",
        indicators::metadata_version_mismatch,
    ),
    (
        "suspicious_text_positioning",
        indicators::suspicious_text_positioning,
    ),
    ("white_rectangle_overlay", indicators::white_rectangle_overlay),
    (
        "excessive_drawing_operations",
        indicators::excessive_drawing_operations,
    ),
    ("orphaned_objects", indicators::orphaned_objects),
    ("large_object_number_gaps", indicators::large_object_number_gaps),
    ("contains_javascript", indicators::contains_javascript),
    (
        "duplicate_images_different_xrefs",
        indicators::duplicate_images_different_xrefs,
    ),
    ("images_with_exif", indicators::images_with_exif),
    (
        "cropbox_mediabox_mismatch",
        indicators::cropbox_mediabox_mismatch,
    ),
    ("excessive_form_fields", indicators::excessive_form_fields),
    ("duplicate_bookmarks", indicators::duplicate_bookmarks),
    (
        "invalid_bookmark_destinations",
        indicators::invalid_bookmark_destinations,
    ),
    ("encryption_present", indicators::encryption_present),
];

/// Run every registered evaluator. An evaluator that panics contributes an
/// error entry instead of findings; the others are unaffected.
pub fn evaluate_all(doc: &ParsedDocument, config: &ScanConfig) -> (Vec<Finding>, Vec<String>) {
    let mut findings = Vec::new();
    let mut errors = Vec::new();

    for (name, evaluator) in EVALUATORS {
        match catch_unwind(AssertUnwindSafe(|| evaluator(doc, config))) {
            Ok(emitted) => findings.extend(emitted),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::warn!("evaluator {name} panicked: {message}");
                errors.push(format!("evaluator {name} failed: {message}"));
            }
        }
    }

    (findings, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_assignments() {
        assert_eq!(IndicatorKind::HasRevisions.severity(), Severity::High);
        assert_eq!(IndicatorKind::TouchUpTextEdit.severity(), Severity::High);
        assert_eq!(
            IndicatorKind::JavaScriptAutoExecute.severity(),
            Severity::High
        );
        assert_eq!(IndicatorKind::MissingObjects.severity(), Severity::High);
        assert_eq!(
            IndicatorKind::WhiteRectangleOverlay.severity(),
            Severity::Medium
        );
        assert_eq!(IndicatorKind::XmpHistory.severity(), Severity::Medium);
        assert_eq!(IndicatorKind::EncryptionPresent.severity(), Severity::Medium);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::High > Severity::Medium);
    }

    #[test]
    fn test_finding_inherits_kind_severity() {
        let finding = Finding::new(IndicatorKind::HasRevisions, "summary", Evidence::default());
        assert_eq!(finding.severity, Severity::High);
    }

    #[test]
    fn test_registry_covers_catalog_once() {
        let mut names: Vec<&str> = EVALUATORS.iter().map(|(name, _)| *name).collect();
        let before = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), before, "duplicate evaluator registration");
        assert_eq!(before, 32);
    }

    #[test]
    fn test_evidence_builder() {
        let evidence = Evidence::default()
            .with_objects(vec![ObjectId::new(7, 0)])
            .with_values(vec!["x".to_string()])
            .with_count(3);
        assert_eq!(evidence.objects.len(), 1);
        assert_eq!(evidence.count, Some(3));
    }
}
