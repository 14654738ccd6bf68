//! Document metadata extraction: the trailer `/Info` dictionary, the XMP
//! packet, and timestamp normalization.
//!
//! PDF carries the same facts in two places with two syntaxes (Info dates as
//! `D:YYYYMMDDHHmmSS±HH'mm'`, XMP dates as ISO-8601), which is exactly why
//! they are worth comparing: honest producers keep them consistent, editing
//! tools frequently do not. Unparseable dates are preserved as raw strings:
//! a date that fails to parse is itself a data point, not an error.

pub mod xmp;

use crate::parser::document::ParsedDocument;
use crate::parser::objects::PdfObject;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use std::collections::BTreeMap;
use std::path::Path;

/// Optional external metadata source merged into the XMP property map
/// before evaluation. The bundled extractor is a separate tool; the
/// analyzer only consumes its key → value output.
pub trait ExtendedMetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> crate::Result<BTreeMap<String, String>>;
}

/// Fill `doc.info_dict` and `doc.xmp` in place.
pub fn enrich(doc: &mut ParsedDocument, max_stream_size: usize) {
    doc.info_dict = extract_info(doc);
    doc.xmp = xmp::find_xmp(doc, max_stream_size);
}

/// Flatten the newest resolvable `/Info` dictionary.
///
/// Trailers are searched newest-first; an incremental save that dropped or
/// replaced `/Info` still leaves the older dictionary reachable through the
/// older trailer, and [`info_values_across_revisions`] exploits exactly that.
pub fn extract_info(doc: &ParsedDocument) -> Option<BTreeMap<String, String>> {
    let trailers = doc
        .trailer
        .iter()
        .chain(doc.xref_sections.iter().map(|s| &s.trailer));

    for trailer in trailers {
        let Some(info) = trailer.get("Info") else {
            continue;
        };
        if let Some(dict) = doc.resolve(info).as_dict() {
            let mut flat = BTreeMap::new();
            for (key, value) in dict.iter() {
                if let Some(text) = object_to_text(value) {
                    flat.insert(key.clone(), text);
                }
            }
            if !flat.is_empty() {
                return Some(flat);
            }
        }
    }
    None
}

/// Every distinct value a given Info key takes across all revisions'
/// trailers, in chain order (newest first).
pub fn info_values_across_revisions(doc: &ParsedDocument, key: &str) -> Vec<String> {
    let mut values = Vec::new();
    for section in &doc.xref_sections {
        let Some(info) = section.trailer.get("Info") else {
            continue;
        };
        let Some(dict) = doc.resolve(info).as_dict() else {
            continue;
        };
        if let Some(text) = dict.get(key).and_then(object_to_text) {
            if !values.contains(&text) {
                values.push(text);
            }
        }
    }
    values
}

fn object_to_text(value: &PdfObject) -> Option<String> {
    match value {
        PdfObject::String(s) => Some(s.to_text()),
        PdfObject::Name(n) => Some(n.as_str().to_string()),
        PdfObject::Integer(i) => Some(i.to_string()),
        PdfObject::Real(r) => Some(r.to_string()),
        PdfObject::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a PDF date string: `D:YYYYMMDDHHmmSS±HH'mm'` with any legal
/// truncation. A missing timezone is read as UTC.
pub fn parse_pdf_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim().strip_prefix("D:").unwrap_or(raw.trim());
    if s.len() < 4 {
        return None;
    }

    // Fields truncate from the right; a field that fails to parse falls
    // back to its default rather than rejecting the whole date.
    let digits_at = |start: usize, len: usize, default: u32| -> u32 {
        s.get(start..start + len)
            .and_then(|field| field.parse().ok())
            .unwrap_or(default)
    };

    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month = digits_at(4, 2, 1).clamp(1, 12);
    let day = digits_at(6, 2, 1).clamp(1, 31);
    let hour = digits_at(8, 2, 0).min(23);
    let minute = digits_at(10, 2, 0).min(59);
    let second = digits_at(12, 2, 0).min(59);

    let date = NaiveDate::from_ymd_opt(year, month, day)
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))?;
    let naive = date.and_hms_opt(hour, minute, second)?;

    let offset = parse_pdf_tz(&s[s.len().min(14)..]).unwrap_or_else(|| Utc.fix());
    offset.from_local_datetime(&naive).single()
}

fn parse_pdf_tz(tz: &str) -> Option<FixedOffset> {
    let tz = tz.trim();
    if tz.is_empty() || tz.starts_with('Z') {
        return Some(Utc.fix());
    }
    let sign = match tz.chars().next()? {
        '+' => 1,
        '-' => -1,
        _ => return None,
    };
    let hours: i32 = tz.get(1..3)?.parse().ok()?;
    // Minutes follow as 'mm' with apostrophe delimiters.
    let minutes: i32 = tz
        .get(4..6)
        .and_then(|m| m.parse().ok())
        .unwrap_or(0);
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Parse an XMP (ISO-8601) date, with fallbacks for the truncated forms
/// producers actually emit.
pub fn parse_xmp_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
        return Some(parsed);
    }
    // No timezone: read as UTC.
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Utc.fix().from_local_datetime(&naive).single();
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Utc.fix().from_local_datetime(&naive).single();
    }
    None
}

/// Parse either date syntax.
pub fn parse_any_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.starts_with("D:") {
        return parse_pdf_date(s);
    }
    parse_xmp_date(s).or_else(|| parse_pdf_date(s))
}
