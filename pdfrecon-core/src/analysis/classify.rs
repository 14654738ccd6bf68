//! Risk classification and timeline assembly.

use super::{Finding, Severity};
use crate::metadata;
use crate::parser::document::ParsedDocument;
use crate::parser::objects::PdfObject;
use crate::report::{Revision, RevisionStatus, RiskLevel, TimelineEvent};

/// The classification rule, on severity alone:
/// Red when any High finding exists; Yellow when any Medium finding exists
/// or any revision extracted as `Valid`; Green otherwise.
pub fn classify(findings: &[Finding], revisions: &[Revision]) -> RiskLevel {
    if findings.iter().any(|f| f.severity == Severity::High) {
        return RiskLevel::Red;
    }
    let has_valid_revision = revisions
        .iter()
        .any(|r| matches!(r.status, RevisionStatus::Valid));
    if !findings.is_empty() || has_valid_revision {
        return RiskLevel::Yellow;
    }
    RiskLevel::Green
}

fn event(raw: &str, source: &str, label: &str) -> TimelineEvent {
    TimelineEvent {
        timestamp: metadata::parse_any_date(raw),
        raw_timestamp: raw.to_string(),
        source: source.to_string(),
        event: label.to_string(),
    }
}

/// Merge every dated event the file carries: Info dates, XMP dates, XMP
/// history entries, signature times: and stable-sort by timestamp.
/// Unparseable timestamps keep their raw string, sort to the end, and stay
/// in insertion order, as do exact ties.
pub fn build_timeline(doc: &ParsedDocument) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    if let Some(info) = doc.info_dict.as_ref() {
        for key in ["CreationDate", "ModDate"] {
            if let Some(raw) = info.get(key) {
                events.push(event(raw, "Info", key));
            }
        }
    }

    if let Some(xmp) = doc.xmp.as_ref() {
        for key in ["xmp:CreateDate", "xmp:ModifyDate", "xmp:MetadataDate"] {
            if let Some(raw) = xmp.get(key) {
                events.push(event(raw, "XMP", key));
            }
        }
        for entry in xmp.history() {
            let label = match (&entry.action, &entry.software_agent) {
                (Some(action), Some(agent)) => format!("{action} by {agent}"),
                (Some(action), None) => action.clone(),
                (None, Some(agent)) => format!("event by {agent}"),
                (None, None) => "event".to_string(),
            };
            let raw = entry.when.clone().unwrap_or_default();
            events.push(event(&raw, "XMP history", &label));
        }
    }

    for (id, record) in &doc.objects {
        let Some(dict) = record.object.as_dict() else {
            continue;
        };
        if dict.get_type() != Some("Sig") {
            continue;
        }
        if let Some(time) = dict.get("M").and_then(PdfObject::as_string) {
            events.push(event(&time.to_text(), "Signature", &format!("signed ({id})")));
        }
    }

    // Stable: ties and unparseable dates keep insertion order.
    events.sort_by(|a, b| match (&a.timestamp, &b.timestamp) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    events
}
