//! The indicator catalog: one evaluator per indicator kind.
//!
//! Every function here has the same shape: read the parsed document,
//! apply one predicate, emit zero or more findings with owned evidence.
//! Thresholds come from [`ScanConfig`]; nothing in this module performs
//! I/O or mutates the document.

use super::{Evidence, Finding, IndicatorKind};
use crate::config::ScanConfig;
use crate::metadata;
use crate::parser::document::ParsedDocument;
use crate::parser::objects::{ObjectId, PdfDictionary, PdfObject};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Upper bound on outline items walked, against malicious outline graphs.
const MAX_OUTLINE_ITEMS: usize = 8192;

/// `len(eof_offsets) >= 2`: the file carries at least one recoverable
/// prior version.
pub fn has_revisions(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    if doc.eof_offsets.len() < 2 {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::HasRevisions,
        format!(
            "{} %%EOF markers: {} prior document version(s) are recoverable from \
             incremental saves",
            doc.eof_offsets.len(),
            doc.eof_offsets.len() - 1
        ),
        Evidence::default()
            .with_offsets(doc.eof_offsets.clone())
            .with_count(doc.eof_offsets.len()),
    )]
}

/// Any dictionary carrying `/TouchUp_TextEdit true`: Acrobat's own marker
/// for manual text edits.
pub fn touchup_textedit(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut owners = BTreeSet::new();
    doc.for_each_dict(|owner, dict| {
        if dict.get("TouchUp_TextEdit").and_then(PdfObject::as_bool) == Some(true) {
            owners.insert(owner);
        }
    });
    if owners.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::TouchUpTextEdit,
        "Acrobat TouchUp_TextEdit flag present: text was edited in place with \
         Acrobat's touch-up tool",
        Evidence::default().with_objects(owners.into_iter().collect()),
    )]
}

fn is_javascript_action(doc: &ParsedDocument, action: &PdfObject) -> bool {
    doc.resolve(action)
        .as_dict()
        .and_then(|d| d.get("S"))
        .and_then(PdfObject::as_name)
        == Some("JavaScript")
}

/// Owner ids of actions that run without user interaction: the catalog's
/// `/OpenAction` and anything in its `/AA` dictionary.
fn auto_execute_js_owners(doc: &ParsedDocument) -> BTreeSet<ObjectId> {
    let mut owners = BTreeSet::new();
    let Some(catalog) = doc.catalog() else {
        return owners;
    };
    let catalog_id = doc
        .trailer
        .as_ref()
        .and_then(|t| t.get("Root"))
        .and_then(PdfObject::as_reference);

    let mut note = |action: &PdfObject| {
        if is_javascript_action(doc, action) {
            let owner = action.as_reference().or(catalog_id);
            if let Some(id) = owner {
                owners.insert(id);
            }
        }
    };

    if let Some(open_action) = catalog.get("OpenAction") {
        note(open_action);
    }
    if let Some(aa) = catalog.get("AA") {
        if let Some(aa_dict) = doc.resolve(aa).as_dict() {
            for (_, action) in aa_dict.iter() {
                note(action);
            }
        }
    }
    owners
}

/// `/OpenAction` or `/AA` resolving to a `/S /JavaScript` action.
pub fn javascript_auto_execute(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let Some(catalog) = doc.catalog() else {
        return Vec::new();
    };

    let mut triggers = Vec::new();
    if let Some(open_action) = catalog.get("OpenAction") {
        if is_javascript_action(doc, open_action) {
            triggers.push("OpenAction".to_string());
        }
    }
    if let Some(aa) = catalog.get("AA") {
        if let Some(aa_dict) = doc.resolve(aa).as_dict() {
            for (key, action) in aa_dict.iter() {
                if is_javascript_action(doc, action) {
                    triggers.push(format!("AA /{key}"));
                }
            }
        }
    }

    if triggers.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::JavaScriptAutoExecute,
        format!(
            "JavaScript runs automatically when the document opens (via {})",
            triggers.join(", ")
        ),
        Evidence::default()
            .with_objects(auto_execute_js_owners(doc).into_iter().collect())
            .with_values(triggers),
    )]
}

/// References with no definition anywhere in the file. Every missing id is
/// listed in this one finding's evidence.
pub fn missing_objects(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let missing = doc.missing_ids();
    if missing.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MissingObjects,
        format!(
            "{} referenced object(s) are not defined in the file; content was \
             removed or the file was truncated",
            missing.len()
        ),
        Evidence::default()
            .with_count(missing.len())
            .with_objects(missing),
    )]
}

/// Two subset embeddings of the same font (same base name behind different
/// `ABCDEF+` prefixes): the classic residue of editing text after export.
pub fn multiple_font_subsets(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let subset_re = match regex::Regex::new(r"^([A-Z]{6})\+(.+)$") {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut base_fonts = BTreeSet::new();
    doc.for_each_dict(|_, dict| {
        if let Some(name) = dict.get("BaseFont").and_then(PdfObject::as_name) {
            base_fonts.insert(name.to_string());
        }
    });

    let mut by_suffix: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in &base_fonts {
        if let Some(captures) = subset_re.captures(name) {
            by_suffix
                .entry(captures[2].to_string())
                .or_default()
                .insert(captures[1].to_string());
        }
    }

    let mut findings = Vec::new();
    for (suffix, prefixes) in by_suffix {
        if prefixes.len() >= 2 {
            let names: Vec<String> = prefixes
                .iter()
                .map(|prefix| format!("{prefix}+{suffix}"))
                .collect();
            findings.push(Finding::new(
                IndicatorKind::MultipleFontSubsets,
                format!(
                    "Font '{suffix}' is embedded as {} different subsets; text using \
                     it was added in more than one editing session",
                    prefixes.len()
                ),
                Evidence::default().with_values(names),
            ));
        }
    }
    findings
}

/// Info and XMP disagree about the creating application, or revisions
/// disagree among themselves.
pub fn multiple_creators_or_producers(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut conflicts: Vec<String> = Vec::new();

    let info = doc.info_dict.as_ref();
    let info_get =
        |key: &str| -> Option<&str> { info.and_then(|m| m.get(key)).map(String::as_str) };
    let xmp_get = |key: &str| -> Option<&str> { doc.xmp.as_ref().and_then(|x| x.get(key)) };

    for (info_key, xmp_key) in [("Creator", "xmp:CreatorTool"), ("Producer", "pdf:Producer")] {
        if let (Some(a), Some(b)) = (info_get(info_key), xmp_get(xmp_key)) {
            if !a.trim().is_empty() && !b.trim().is_empty() && a.trim() != b.trim() {
                conflicts.push(format!("Info /{info_key} '{}' vs {xmp_key} '{}'", a.trim(), b.trim()));
            }
        }
    }

    for key in ["Creator", "Producer"] {
        let across = metadata::info_values_across_revisions(doc, key);
        if across.len() > 1 {
            conflicts.push(format!("/{key} changed across revisions: {}", across.join(" → ")));
        }
    }

    if conflicts.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MultipleCreatorsOrProducers,
        "Creator/Producer metadata is inconsistent: the file passed through more \
         than one application",
        Evidence::default().with_values(conflicts),
    )]
}

/// A populated `xmpMM:History` sequence is a first-party editing log.
pub fn xmp_history(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let Some(xmp) = doc.xmp.as_ref() else {
        return Vec::new();
    };
    let history = xmp.history();
    if history.is_empty() {
        return Vec::new();
    }

    let values: Vec<String> = history
        .iter()
        .map(|event| {
            format!(
                "{} at {} by {}",
                event.action.as_deref().unwrap_or("?"),
                event.when.as_deref().unwrap_or("?"),
                event.software_agent.as_deref().unwrap_or("?"),
            )
        })
        .collect();

    vec![Finding::new(
        IndicatorKind::XmpHistory,
        format!(
            "XMP records {} editing event(s) in xmpMM:History",
            history.len()
        ),
        Evidence::default()
            .with_count(history.len())
            .with_values(values),
    )]
}

fn id_first_element(trailer: &PdfDictionary) -> Option<String> {
    let array = trailer.get("ID").and_then(PdfObject::as_array)?;
    let first = array.get(0).and_then(PdfObject::as_string)?;
    Some(
        first
            .as_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect(),
    )
}

/// Document `/ID` churn across revisions, or XMP original-vs-current
/// document id mismatch.
pub fn multiple_document_ids(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut values = Vec::new();

    let mut first_ids = BTreeSet::new();
    for section in &doc.xref_sections {
        if let Some(id) = id_first_element(&section.trailer) {
            first_ids.insert(id);
        }
    }
    if first_ids.len() > 1 {
        values.push(format!(
            "trailer /ID first element differs across revisions: {}",
            first_ids.into_iter().collect::<Vec<_>>().join(", ")
        ));
    }

    if let Some(xmp) = doc.xmp.as_ref() {
        if let (Some(original), Some(current)) = (
            xmp.get("xmpMM:OriginalDocumentID"),
            xmp.get("xmpMM:DocumentID"),
        ) {
            if original != current {
                values.push(format!(
                    "xmpMM:OriginalDocumentID '{original}' differs from xmpMM:DocumentID '{current}'"
                ));
            }
        }
    }

    if values.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MultipleDocumentIds,
        "Document identity changed: the file is not the original save",
        Evidence::default().with_values(values),
    )]
}

/// More than one `startxref` means more than one save.
pub fn multiple_startxref(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    if doc.startxref_entries.len() < 2 {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MultipleStartxref,
        format!(
            "{} startxref statements: the file was saved incrementally",
            doc.startxref_entries.len()
        ),
        Evidence::default()
            .with_count(doc.startxref_entries.len())
            .with_offsets(
                doc.startxref_entries
                    .iter()
                    .map(|e| e.marker_offset)
                    .collect(),
            ),
    )]
}

/// Nonzero generations mean object numbers were freed and reused.
pub fn objects_with_gen_greater_zero(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let reused: Vec<ObjectId> = doc.defined_ids().filter(|id| id.generation > 0).collect();
    if reused.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::ObjectsWithGenGreaterZero,
        format!(
            "{} object(s) have generation > 0: object slots were deleted and reused",
            reused.len()
        ),
        Evidence::default()
            .with_count(reused.len())
            .with_objects(reused),
    )]
}

/// Distinct optional-content groups reachable from `/OCProperties`.
fn count_ocgs(doc: &ParsedDocument) -> usize {
    let Some(oc_props) = doc
        .catalog()
        .and_then(|c| c.get("OCProperties"))
        .map(|o| doc.resolve(o))
        .and_then(PdfObject::as_dict)
    else {
        return 0;
    };
    let Some(ocgs) = oc_props.get("OCGs").map(|o| doc.resolve(o)).and_then(PdfObject::as_array)
    else {
        return 0;
    };
    let distinct: BTreeSet<ObjectId> = ocgs.iter().filter_map(PdfObject::as_reference).collect();
    distinct.len().max(
        // Inline OCG dictionaries (no references) still count.
        ocgs.iter().filter(|o| o.as_dict().is_some()).count(),
    )
}

/// More optional-content layers than pages.
pub fn more_layers_than_pages(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let layers = count_ocgs(doc);
    if layers == 0 || layers <= doc.pages.len() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MoreLayersThanPages,
        format!(
            "{layers} optional-content layer(s) across {} page(s): layered content \
             can hide or swap page areas",
            doc.pages.len()
        ),
        Evidence::default().with_count(layers),
    )]
}

/// A linearized file is written in one pass; incremental updates on top of
/// one mean it was modified afterwards.
pub fn linearized_and_updated(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    if !doc.linearized || doc.eof_offsets.len() < 2 {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::LinearizedAndUpdated,
        "Linearized file with incremental updates: modified after its original \
         single-pass save",
        Evidence::default().with_count(doc.eof_offsets.len()),
    )]
}

/// `/PieceInfo` is private application data, typically left by editors.
pub fn has_piece_info(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut owners = BTreeSet::new();
    doc.for_each_dict(|owner, dict| {
        if dict.contains_key("PieceInfo") {
            owners.insert(owner);
        }
    });
    if owners.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::HasPieceInfo,
        "PieceInfo private application data present: an editing application \
         stored its own state in the file",
        Evidence::default().with_objects(owners.into_iter().collect()),
    )]
}

/// Redaction annotations: content marked for removal, not necessarily
/// actually removed.
pub fn has_redactions(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut owners = BTreeSet::new();
    doc.for_each_dict(|owner, dict| {
        if dict.get("Subtype").and_then(PdfObject::as_name) == Some("Redact") {
            owners.insert(owner);
        }
    });
    if owners.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::HasRedactions,
        "Redaction annotations present: verify the underlying content was \
         actually removed",
        Evidence::default().with_objects(owners.into_iter().collect()),
    )]
}

/// Any page with a non-empty `/Annots` array.
pub fn has_annotations(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut annotated_pages = Vec::new();
    let mut total = 0usize;

    for &page_id in &doc.pages {
        let Some(page) = doc.get_object(page_id).and_then(PdfObject::as_dict) else {
            continue;
        };
        let Some(annots) = page.get("Annots").map(|a| doc.resolve(a)).and_then(PdfObject::as_array)
        else {
            continue;
        };
        if !annots.is_empty() {
            annotated_pages.push(page_id);
            total += annots.len();
        }
    }

    if annotated_pages.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::HasAnnotations,
        format!(
            "{total} annotation(s) on {} page(s): overlays can visually replace \
             original content",
            annotated_pages.len()
        ),
        Evidence::default()
            .with_count(total)
            .with_objects(annotated_pages),
    )]
}

/// `/AcroForm /NeedAppearances true` defers field rendering to the viewer.
pub fn acroform_need_appearances(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let need = doc
        .catalog()
        .and_then(|c| c.get("AcroForm"))
        .map(|a| doc.resolve(a))
        .and_then(PdfObject::as_dict)
        .and_then(|form| form.get("NeedAppearances"))
        .and_then(PdfObject::as_bool)
        == Some(true);

    if !need {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::AcroFormNeedAppearances,
        "AcroForm NeedAppearances is true: field values are re-rendered by the \
         viewer and may differ from what was originally displayed",
        Evidence::default(),
    )]
}

/// `/Type /Sig` objects, with ByteRange coverage recorded as evidence.
/// Cryptographic validation is out of scope; coverage of the file tail is
/// what incremental-save tampering shows up in.
pub fn has_digital_signature(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut signatures: Vec<ObjectId> = Vec::new();
    let mut values = Vec::new();

    for (id, record) in &doc.objects {
        let Some(dict) = record.object.as_dict() else {
            continue;
        };
        if dict.get_type() != Some("Sig") {
            continue;
        }
        signatures.push(*id);

        if let Some(byte_range) = dict.get("ByteRange").map(|b| doc.resolve(b)).and_then(PdfObject::as_array) {
            let numbers: Vec<i64> = byte_range.iter().filter_map(PdfObject::as_integer).collect();
            if numbers.len() == 4 {
                let covered_end = (numbers[2] + numbers[3]) as usize;
                let file_len = doc.source.len();
                if covered_end < file_len {
                    values.push(format!(
                        "signature {id}: ByteRange covers bytes 0..{covered_end} of \
                         {file_len}; {} byte(s) after the signature are not covered",
                        file_len - covered_end
                    ));
                } else {
                    values.push(format!(
                        "signature {id}: ByteRange covers the full file ({file_len} bytes)"
                    ));
                }
            } else {
                values.push(format!(
                    "signature {id}: malformed ByteRange with {} element(s)",
                    numbers.len()
                ));
            }
        }
        if let Some(time) = dict.get("M").and_then(PdfObject::as_string) {
            values.push(format!("signature {id} signed at {}", time.to_text()));
        }
    }

    if signatures.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::HasDigitalSignature,
        format!("{} digital signature(s) present", signatures.len()),
        Evidence::default()
            .with_objects(signatures)
            .with_values(values),
    )]
}

/// Info and XMP timestamps for the same event differ beyond one second.
pub fn date_inconsistency(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut conflicts = Vec::new();

    let info = doc.info_dict.as_ref();
    let xmp = doc.xmp.as_ref();

    for (info_key, xmp_key) in [
        ("CreationDate", "xmp:CreateDate"),
        ("ModDate", "xmp:ModifyDate"),
    ] {
        let info_raw = info.and_then(|m| m.get(info_key));
        let xmp_raw = xmp.and_then(|x| x.get(xmp_key));
        let (Some(info_raw), Some(xmp_raw)) = (info_raw, xmp_raw) else {
            continue;
        };
        let (Some(a), Some(b)) = (
            metadata::parse_any_date(info_raw),
            metadata::parse_any_date(xmp_raw),
        ) else {
            continue;
        };
        let delta = (a - b).num_seconds().abs();
        if delta > 1 {
            conflicts.push(format!(
                "Info /{info_key} '{info_raw}' vs {xmp_key} '{xmp_raw}' ({delta}s apart)"
            ));
        }
    }

    if conflicts.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::DateInconsistency,
        "Info and XMP timestamps disagree: metadata was edited or regenerated",
        Evidence::default().with_values(conflicts),
    )]
}

fn header_version(doc: &ParsedDocument) -> Option<(u32, u32)> {
    let version = doc.pdf_version.as_deref()?;
    let (major, minor) = version.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Producer claims an old PDF version while the file uses newer features,
/// or the header itself predates the features in use.
pub fn metadata_version_mismatch(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut values = Vec::new();
    let header = header_version(doc);

    // Header < 1.5 cannot legitimately contain xref or object streams.
    if let Some((1, minor)) = header {
        if minor < 5 && (doc.uses_xref_streams || doc.uses_object_streams) {
            let feature = if doc.uses_xref_streams {
                "cross-reference streams"
            } else {
                "object streams"
            };
            values.push(format!(
                "header declares PDF 1.{minor} but the file uses {feature} (PDF 1.5+)"
            ));
        }
    }

    // Producer/creator strings that name a version far below the header.
    if let Some((major, minor)) = header {
        if (major, minor) >= (1, 6) {
            let claim_re = regex::Regex::new(r"(?i)pdf[ \-]?1\.([0-5])").ok();
            let mut claims: Vec<&str> = Vec::new();
            if let Some(info) = doc.info_dict.as_ref() {
                claims.extend(info.get("Producer").map(String::as_str));
                claims.extend(info.get("Creator").map(String::as_str));
            }
            if let Some(xmp) = doc.xmp.as_ref() {
                claims.extend(xmp.get("pdf:Producer"));
                claims.extend(xmp.get("xmp:CreatorTool"));
            }
            if let Some(re) = claim_re {
                for claim in claims {
                    if let Some(captures) = re.captures(claim) {
                        let claimed_minor: u32 =
                            captures[1].parse().unwrap_or(0);
                        if claimed_minor <= 4 {
                            values.push(format!(
                                "metadata claims PDF 1.{claimed_minor} ('{}') but the header \
                                 declares {major}.{minor}",
                                claim.trim()
                            ));
                        }
                    }
                }
            }
        }
    }

    if values.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::MetadataVersionMismatch,
        "Declared PDF version is inconsistent with the file's features or metadata",
        Evidence::default().with_values(values),
    )]
}

/// A BT/ET block repositioning text dozens of times is characteristic of
/// text pasted or reconstructed glyph-by-glyph.
pub fn suspicious_text_positioning(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for stats in &doc.page_stats {
        if stats.max_positioning_per_block >= config.text_positioning_threshold {
            findings.push(Finding::new(
                IndicatorKind::SuspiciousTextPositioning,
                format!(
                    "Page {}: {} text-positioning operators inside one text block \
                     (threshold {})",
                    stats.page_index + 1,
                    stats.max_positioning_per_block,
                    config.text_positioning_threshold
                ),
                Evidence::default()
                    .with_objects(vec![stats.page_id])
                    .with_count(stats.max_positioning_per_block),
            ));
        }
    }
    findings
}

/// Two or more white-filled rectangles on one page.
pub fn white_rectangle_overlay(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for stats in &doc.page_stats {
        if stats.white_rectangles >= 2 {
            findings.push(Finding::new(
                IndicatorKind::WhiteRectangleOverlay,
                format!(
                    "Page {}: {} white-filled rectangle(s): content may be painted over",
                    stats.page_index + 1,
                    stats.white_rectangles
                ),
                Evidence::default()
                    .with_objects(vec![stats.page_id])
                    .with_count(stats.white_rectangles),
            ));
        }
    }
    findings
}

/// Drawing-operator volume beyond the configured threshold.
pub fn excessive_drawing_operations(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for stats in &doc.page_stats {
        if stats.drawing_ops > config.drawing_ops_threshold {
            findings.push(Finding::new(
                IndicatorKind::ExcessiveDrawingOperations,
                format!(
                    "Page {}: {} drawing operators (threshold {})",
                    stats.page_index + 1,
                    stats.drawing_ops,
                    config.drawing_ops_threshold
                ),
                Evidence::default()
                    .with_objects(vec![stats.page_id])
                    .with_count(stats.drawing_ops),
            ));
        }
    }
    findings
}

/// Defined-but-never-referenced objects beyond the configured tolerance.
/// Structural objects that are never referenced by design are excluded.
pub fn orphaned_objects(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    let orphans: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter(|(id, record)| {
            if doc.referenced_ids.contains(id) {
                return false;
            }
            match record.object.as_dict().and_then(PdfDictionary::get_type) {
                Some("XRef") | Some("ObjStm") => false,
                _ => !record
                    .object
                    .as_dict()
                    .map(|d| d.contains_key("Linearized"))
                    .unwrap_or(false),
            }
        })
        .map(|(id, _)| *id)
        .collect();

    if orphans.len() <= config.orphan_objects_threshold {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::OrphanedObjects,
        format!(
            "{} object(s) are defined but never referenced (threshold {}): \
             leftovers from deleted content",
            orphans.len(),
            config.orphan_objects_threshold
        ),
        Evidence::default()
            .with_count(orphans.len())
            .with_objects(orphans),
    )]
}

/// A sparse object-number space: more than the configured fraction of
/// `[1, max]` absent.
pub fn large_object_number_gaps(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    let numbers: BTreeSet<u32> = doc.defined_ids().map(|id| id.number).collect();
    let Some(&max) = numbers.iter().max() else {
        return Vec::new();
    };
    if max == 0 {
        return Vec::new();
    }

    let present = numbers.iter().filter(|&&n| n >= 1).count();
    let missing = (max as usize).saturating_sub(present);
    let fraction = missing as f64 / max as f64;
    if fraction <= config.object_gap_fraction {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::LargeObjectNumberGaps,
        format!(
            "{missing} of {max} object numbers are absent ({:.0}% gaps): large \
             amounts of content were deleted or rewritten",
            fraction * 100.0
        ),
        Evidence::default().with_count(missing),
    )]
}

/// `/S /JavaScript` actions that do not auto-execute (those are already
/// reported by [`javascript_auto_execute`]).
pub fn contains_javascript(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut owners = BTreeSet::new();
    doc.for_each_dict(|owner, dict| {
        if dict.get("S").and_then(PdfObject::as_name) == Some("JavaScript") {
            owners.insert(owner);
        }
    });

    let auto = auto_execute_js_owners(doc);
    let remaining: Vec<ObjectId> = owners.difference(&auto).copied().collect();
    if remaining.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::ContainsJavaScript,
        format!(
            "{} JavaScript action(s) present (not auto-executing)",
            remaining.len()
        ),
        Evidence::default()
            .with_count(remaining.len())
            .with_objects(remaining),
    )]
}

fn image_xobjects(doc: &ParsedDocument) -> Vec<(ObjectId, &crate::parser::objects::PdfStream)> {
    doc.objects
        .iter()
        .filter_map(|(id, record)| {
            let stream = record.object.as_stream()?;
            (stream.dict.get("Subtype").and_then(PdfObject::as_name) == Some("Image"))
                .then_some((*id, stream))
        })
        .collect()
}

/// Identical image bytes stored under two different object ids: an image
/// was replaced or duplicated by an editor rather than reused by reference.
pub fn duplicate_images_different_xrefs(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut by_hash: BTreeMap<String, Vec<ObjectId>> = BTreeMap::new();
    for (id, stream) in image_xobjects(doc) {
        let digest = Sha256::digest(&stream.data);
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        by_hash.entry(hex).or_default().push(id);
    }

    let mut findings = Vec::new();
    for (hash, ids) in by_hash {
        if ids.len() >= 2 {
            findings.push(Finding::new(
                IndicatorKind::DuplicateImagesDifferentXrefs,
                format!(
                    "{} image objects share identical content (SHA-256 {}…)",
                    ids.len(),
                    &hash[..16]
                ),
                Evidence::default()
                    .with_objects(ids)
                    .with_values(vec![hash]),
            ));
        }
    }
    findings
}

/// EXIF blocks inside embedded images: camera/scanner metadata the
/// producing application did not strip.
pub fn images_with_exif(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    const EXIF_MARKER: &[u8] = b"Exif\x00\x00";

    let mut carriers = Vec::new();
    for (id, stream) in image_xobjects(doc) {
        let in_raw = crate::parser::objects::find_bytes(&stream.data, EXIF_MARKER, 0).is_some();
        let in_decoded = !in_raw
            && stream
                .decode(config.max_stream_size)
                .map(|data| crate::parser::objects::find_bytes(&data, EXIF_MARKER, 0).is_some())
                .unwrap_or(false);
        if in_raw || in_decoded {
            carriers.push(id);
        }
    }

    if carriers.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::ImagesWithExif,
        format!(
            "{} embedded image(s) carry EXIF metadata (source device/software \
             details survive inside the PDF)",
            carriers.len()
        ),
        Evidence::default()
            .with_count(carriers.len())
            .with_objects(carriers),
    )]
}

fn rect_area(rect: &PdfObject) -> Option<f64> {
    let array = rect.as_array()?;
    if array.len() != 4 {
        return None;
    }
    let n: Vec<f64> = array.iter().filter_map(PdfObject::as_number).collect();
    if n.len() != 4 {
        return None;
    }
    Some(((n[2] - n[0]) * (n[3] - n[1])).abs())
}

/// CropBox visibly smaller than MediaBox: content outside the crop is
/// still in the file but never displayed.
pub fn cropbox_mediabox_mismatch(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    for (index, &page_id) in doc.pages.iter().enumerate() {
        let media = doc.page_attribute(page_id, "MediaBox").and_then(rect_area);
        let crop = doc.page_attribute(page_id, "CropBox").and_then(rect_area);
        let (Some(media), Some(crop)) = (media, crop) else {
            continue;
        };
        if media > 0.0 && crop < 0.8 * media {
            findings.push(Finding::new(
                IndicatorKind::CropBoxMediaBoxMismatch,
                format!(
                    "Page {}: CropBox covers {:.0}% of MediaBox: {:.0}% of the page \
                     area is hidden from view",
                    index + 1,
                    crop / media * 100.0,
                    (1.0 - crop / media) * 100.0
                ),
                Evidence::default().with_objects(vec![page_id]),
            ));
        }
    }
    findings
}

fn count_form_fields(doc: &ParsedDocument, field: &PdfObject, visited: &mut HashSet<ObjectId>) -> usize {
    if let Some(id) = field.as_reference() {
        if !visited.insert(id) {
            return 0;
        }
    }
    let Some(dict) = doc.resolve(field).as_dict() else {
        return 0;
    };
    let mut count = 1;
    if let Some(kids) = dict.get("Kids").map(|k| doc.resolve(k)).and_then(PdfObject::as_array) {
        for kid in kids.iter() {
            count += count_form_fields(doc, kid, visited);
        }
    }
    count
}

/// AcroForm field count beyond the configured threshold.
pub fn excessive_form_fields(doc: &ParsedDocument, config: &ScanConfig) -> Vec<Finding> {
    let Some(fields) = doc
        .catalog()
        .and_then(|c| c.get("AcroForm"))
        .map(|a| doc.resolve(a))
        .and_then(PdfObject::as_dict)
        .and_then(|form| form.get("Fields"))
        .map(|f| doc.resolve(f))
        .and_then(PdfObject::as_array)
    else {
        return Vec::new();
    };

    let mut visited = HashSet::new();
    let total: usize = fields
        .iter()
        .map(|field| count_form_fields(doc, field, &mut visited))
        .sum();

    if total <= config.form_fields_threshold {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::ExcessiveFormFields,
        format!(
            "{total} AcroForm field(s) (threshold {})",
            config.form_fields_threshold
        ),
        Evidence::default().with_count(total),
    )]
}

/// Outline items in document order, cycle-safe and bounded.
fn collect_outline_items(doc: &ParsedDocument) -> Vec<ObjectId> {
    let mut items = Vec::new();
    let mut visited = HashSet::new();

    let Some(first) = doc
        .catalog()
        .and_then(|c| c.get("Outlines"))
        .map(|o| doc.resolve(o))
        .and_then(PdfObject::as_dict)
        .and_then(|outlines| outlines.get("First"))
        .and_then(PdfObject::as_reference)
    else {
        return items;
    };

    let mut stack = vec![first];
    while let Some(id) = stack.pop() {
        if items.len() >= MAX_OUTLINE_ITEMS || !visited.insert(id) {
            continue;
        }
        let Some(dict) = doc.get_object(id).and_then(PdfObject::as_dict) else {
            continue;
        };
        items.push(id);
        if let Some(next) = dict.get("Next").and_then(PdfObject::as_reference) {
            stack.push(next);
        }
        if let Some(child) = dict.get("First").and_then(PdfObject::as_reference) {
            stack.push(child);
        }
    }
    items
}

/// Identical outline titles.
pub fn duplicate_bookmarks(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let mut title_counts: BTreeMap<String, usize> = BTreeMap::new();
    for id in collect_outline_items(doc) {
        let Some(title) = doc
            .get_object(id)
            .and_then(PdfObject::as_dict)
            .and_then(|d| d.get("Title"))
            .and_then(PdfObject::as_string)
        else {
            continue;
        };
        *title_counts.entry(title.to_text()).or_default() += 1;
    }

    let duplicates: Vec<String> = title_counts
        .iter()
        .filter(|(_, &count)| count > 1)
        .map(|(title, count)| format!("'{title}' ×{count}"))
        .collect();

    if duplicates.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::DuplicateBookmarks,
        format!("{} duplicated bookmark title(s)", duplicates.len()),
        Evidence::default().with_values(duplicates),
    )]
}

/// Outline destinations pointing past the page list or at objects that are
/// not pages: bookmarks left dangling by page deletion.
pub fn invalid_bookmark_destinations(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    let page_set: BTreeSet<ObjectId> = doc.pages.iter().copied().collect();
    let mut broken = Vec::new();

    for id in collect_outline_items(doc) {
        let Some(dict) = doc.get_object(id).and_then(PdfObject::as_dict) else {
            continue;
        };

        // /Dest directly, or /A with a GoTo action's /D.
        let dest = dict.get("Dest").map(|d| doc.resolve(d)).or_else(|| {
            dict.get("A")
                .map(|a| doc.resolve(a))
                .and_then(PdfObject::as_dict)
                .filter(|action| {
                    action.get("S").and_then(PdfObject::as_name) == Some("GoTo")
                })
                .and_then(|action| action.get("D"))
                .map(|d| doc.resolve(d))
        });
        let Some(dest) = dest else {
            continue;
        };
        let Some(target) = dest.as_array().and_then(|a| a.get(0)) else {
            continue;
        };

        let valid = match target {
            PdfObject::Reference(num, gen) => page_set.contains(&ObjectId::new(*num, *gen)),
            PdfObject::Integer(index) => (*index as usize) < doc.pages.len() && *index >= 0,
            _ => true,
        };
        if !valid {
            broken.push(id);
        }
    }

    if broken.is_empty() {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::InvalidBookmarkDestinations,
        format!(
            "{} bookmark(s) point at pages that no longer exist",
            broken.len()
        ),
        Evidence::default()
            .with_count(broken.len())
            .with_objects(broken),
    )]
}

/// `/Encrypt` in any trailer. Presence only: decryption is out of scope.
pub fn encryption_present(doc: &ParsedDocument, _config: &ScanConfig) -> Vec<Finding> {
    if !doc.encrypted {
        return Vec::new();
    }
    vec![Finding::new(
        IndicatorKind::EncryptionPresent,
        "File is encrypted: analysis is limited to unencrypted structure",
        Evidence::default(),
    )]
}
