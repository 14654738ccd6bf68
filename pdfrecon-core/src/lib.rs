//! # pdfrecon
//!
//! A forensic analysis engine for PDF files: byte-level and structural
//! inspection that surfaces technical indicators of alteration, editing,
//! and hidden content, recovers prior document revisions hidden inside
//! incrementally-saved files, and classifies each file by risk.
//!
//! ## What a scan does
//!
//! 1. **Byte scan**: locate every structural marker (`%%EOF`, `startxref`,
//!    `obj`, ...) in a single pass over the raw bytes.
//! 2. **Structural parse**: recover the object population, the
//!    cross-reference chain, and the revision layout, tolerating the
//!    malformed files forensic work actually encounters.
//! 3. **Metadata & content**: Info dictionary, XMP packet (including the
//!    `xmpMM:History` editing log), and per-page content-stream statistics
//!    (invisible text, white overlay rectangles, positioning density).
//! 4. **Indicators**: a catalog of 32 evaluators, each a pure predicate
//!    over the parsed document.
//! 5. **Revisions**: every `%%EOF` before the last marks a complete prior
//!    version; each is validated and can be materialized as a standalone
//!    PDF, and optionally compared pixel-for-pixel against the final
//!    document through a pluggable renderer.
//! 6. **Classification**: `Red` when any high-severity indicator fired,
//!    `Yellow` on medium indicators or recoverable prior versions, `Green`
//!    otherwise.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pdfrecon::{scan, ScanConfig};
//!
//! # fn main() -> pdfrecon::Result<()> {
//! let report = scan("contract.pdf", &ScanConfig::default())?;
//! println!("{:?}: {} finding(s)", report.classification, report.findings.len());
//! for finding in &report.findings {
//!     println!("  [{:?}] {}", finding.severity, finding.human_summary);
//! }
//! for revision in report.usable_revisions() {
//!     println!("  prior version {} -> {:?}", revision.index, revision.output_path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Long-running drivers hold an [`Analyzer`] instead, wiring in a page
//! renderer for the visual-identity check, a shared [`ScanCache`], and a
//! [`CancelToken`] per scan:
//!
//! ```rust,no_run
//! use pdfrecon::{Analyzer, CancelToken, ScanCache, ScanConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> pdfrecon::Result<()> {
//! let analyzer = Analyzer::new(ScanConfig::default())
//!     .with_cache(Arc::new(ScanCache::new()));
//! let cancel = CancelToken::new();
//! let report = analyzer.scan_with_cancel("dossier.pdf", &cancel)?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```
//!
//! ## Design stance
//!
//! Parsing is treated as pattern recognition over a byte buffer, not
//! grammar validation: every layer returns partial results plus recorded
//! errors rather than failing the file. A scan is fatal only when the file
//! cannot be read or carries no `%PDF-` header at all: and even then the
//! result is an ordinary (Green, empty-findings) report with one error
//! entry, never a panic.

pub mod analysis;
pub mod analyzer;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod content;
pub mod error;
pub mod metadata;
pub mod parser;
pub mod report;
pub mod revision;
pub mod visual;

pub use analysis::{Evidence, Finding, IndicatorKind, Severity};
pub use analyzer::{extract_revisions, scan, Analyzer};
pub use cache::ScanCache;
pub use cancel::CancelToken;
pub use config::ScanConfig;
pub use content::PageStats;
pub use error::{PdfReconError, Result};
pub use metadata::ExtendedMetadataExtractor;
pub use parser::document::ParsedDocument;
pub use parser::objects::ObjectId;
pub use report::{FileReport, Revision, RevisionStatus, RiskLevel, TimelineEvent};
pub use visual::{PageRenderer, RgbBitmap};
