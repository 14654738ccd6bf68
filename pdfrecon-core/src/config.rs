//! Scan configuration.
//!
//! The numeric cutoffs used by the indicator evaluators are policy, not
//! physics. Every threshold the evaluators consult lives here so a deployment
//! can tune them without touching the evaluators themselves.

use std::path::PathBuf;

/// Configuration for a single-file scan.
///
/// All fields are plain data; construct with [`ScanConfig::default`] and
/// override what you need:
///
/// ```rust
/// use pdfrecon::ScanConfig;
///
/// let config = ScanConfig {
///     text_positioning_threshold: 60,
///     ..ScanConfig::default()
/// };
/// assert_eq!(config.drawing_ops_threshold, 50);
/// ```
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Text-positioning operators within one BT/ET block before
    /// `SuspiciousTextPositioning` fires.
    pub text_positioning_threshold: usize,
    /// Drawing operators on one page before `ExcessiveDrawingOperations` fires.
    pub drawing_ops_threshold: usize,
    /// Defined-but-unreferenced objects tolerated before `OrphanedObjects` fires.
    pub orphan_objects_threshold: usize,
    /// Fraction of the object-number range `[1, max]` that may be absent
    /// before `LargeObjectNumberGaps` fires.
    pub object_gap_fraction: f64,
    /// AcroForm fields tolerated before `ExcessiveFormFields` fires.
    pub form_fields_threshold: usize,
    /// Pages compared by the visual-identity checker.
    pub visual_check_pages: usize,
    /// Render resolution for the visual-identity checker.
    pub visual_check_dpi: u32,
    /// Upper bound on the inflated size of any decoded stream. Streams
    /// declaring more are skipped and recorded as errors.
    pub max_stream_size: usize,
    /// Directory receiving extracted revision files. A relative path is
    /// resolved against the scanned file's parent directory.
    pub revision_output_dir: PathBuf,
    /// Materialize prior revisions during `scan`. Disable to inspect
    /// without writing anything next to the input.
    pub extract_revisions: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            text_positioning_threshold: 40,
            drawing_ops_threshold: 50,
            orphan_objects_threshold: 10,
            object_gap_fraction: 0.30,
            form_fields_threshold: 50,
            visual_check_pages: 5,
            visual_check_dpi: 72,
            max_stream_size: 64 * 1024 * 1024,
            revision_output_dir: PathBuf::from("Altered_files"),
            extract_revisions: true,
        }
    }
}

impl ScanConfig {
    /// Configuration that analyzes without writing revision files to disk.
    pub fn analysis_only() -> Self {
        Self {
            extract_revisions: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds() {
        let config = ScanConfig::default();
        assert_eq!(config.text_positioning_threshold, 40);
        assert_eq!(config.drawing_ops_threshold, 50);
        assert_eq!(config.orphan_objects_threshold, 10);
        assert!((config.object_gap_fraction - 0.30).abs() < f64::EPSILON);
        assert_eq!(config.form_fields_threshold, 50);
        assert_eq!(config.visual_check_pages, 5);
        assert_eq!(config.visual_check_dpi, 72);
        assert_eq!(config.max_stream_size, 64 * 1024 * 1024);
        assert_eq!(config.revision_output_dir, PathBuf::from("Altered_files"));
        assert!(config.extract_revisions);
    }

    #[test]
    fn test_analysis_only() {
        let config = ScanConfig::analysis_only();
        assert!(!config.extract_revisions);
        assert_eq!(config.drawing_ops_threshold, 50);
    }
}
