//! Visual-identity checking.
//!
//! Some incremental saves change nothing a reader can see (metadata-only
//! resaves); others silently replace page content. Rendering both the
//! revision and the final document and comparing pixels is the only way to
//! tell the two apart. Rendering itself is an external capability: the
//! analyzer only defines the seam and does the comparison.

use crate::cancel::CancelToken;
use crate::config::ScanConfig;
use crate::error::Result;
use crate::report::{Revision, RevisionStatus};

/// A rendered page: tightly packed RGB8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbBitmap {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub pixels: Vec<u8>,
}

impl RgbBitmap {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Exact comparison; differing dimensions are never identical.
    pub fn identical(&self, other: &RgbBitmap) -> bool {
        self.width == other.width && self.height == other.height && self.pixels == other.pixels
    }
}

/// External page renderer. The analyzer never renders; a PDF rasterizer
/// implements this and is plugged into the [`crate::Analyzer`].
pub trait PageRenderer: Send + Sync {
    /// Render one page (0-based) of a complete PDF byte buffer at `dpi`.
    fn render(&self, document: &[u8], page_index: usize, dpi: u32) -> Result<RgbBitmap>;
}

/// Compare each non-corrupt revision against the final document over the
/// first `visual_check_pages` pages. A revision whose compared pages all
/// match exactly is marked [`RevisionStatus::VisuallyIdentical`].
///
/// Render failures leave the revision's status untouched and are returned
/// as error strings.
pub fn check_visual_identity(
    renderer: &dyn PageRenderer,
    source: &[u8],
    page_count: usize,
    revisions: &mut [Revision],
    config: &ScanConfig,
    cancel: &CancelToken,
) -> Result<Vec<String>> {
    let mut errors = Vec::new();
    let pages_to_check = config.visual_check_pages.min(page_count);
    if pages_to_check == 0 {
        return Ok(errors);
    }

    for revision in revisions.iter_mut() {
        cancel.check()?;
        if revision.is_corrupt() {
            continue;
        }

        let prefix = &source[revision.byte_range.0..revision.byte_range.1];
        match compare_documents(renderer, prefix, source, pages_to_check, config.visual_check_dpi) {
            Ok(true) => {
                tracing::debug!(
                    "revision {} is visually identical over {pages_to_check} page(s)",
                    revision.index
                );
                revision.status = RevisionStatus::VisuallyIdentical;
            }
            Ok(false) => {}
            Err(e) => {
                errors.push(format!(
                    "visual check for revision {}: {e}",
                    revision.index
                ));
            }
        }
    }
    Ok(errors)
}

fn compare_documents(
    renderer: &dyn PageRenderer,
    revision: &[u8],
    full: &[u8],
    pages: usize,
    dpi: u32,
) -> Result<bool> {
    for page_index in 0..pages {
        let a = renderer.render(revision, page_index, dpi)?;
        let b = renderer.render(full, page_index, dpi)?;
        if !a.identical(&b) {
            return Ok(false);
        }
    }
    Ok(true)
}
