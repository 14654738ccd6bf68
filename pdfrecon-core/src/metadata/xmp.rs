//! XMP packet extraction and parsing.
//!
//! The packet is flattened into a map of qualified element paths to text
//! values, e.g. `xmpMM:History/rdf:Seq/rdf:li[2]/stEvt:when`. The wrapper
//! elements (`x:xmpmeta`, `rdf:RDF`, `rdf:Description`) are elided from the
//! paths, and `rdf:li` items are indexed 1-based so repeated history events
//! stay distinct. Properties serialized as attributes (common for
//! `rdf:Description`) are captured under the same scheme.

use crate::parser::document::ParsedDocument;
use crate::parser::objects::PdfObject;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Path segments elided from qualified keys.
const WRAPPER_ELEMENTS: [&str; 3] = ["x:xmpmeta", "rdf:RDF", "rdf:Description"];

/// An embedded XMP packet: raw bytes plus the flattened property map.
#[derive(Debug, Clone)]
pub struct XmpPacket {
    pub raw: Vec<u8>,
    pub properties: BTreeMap<String, String>,
}

/// One `xmpMM:History` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmpHistoryEvent {
    pub index: usize,
    pub action: Option<String>,
    pub when: Option<String>,
    pub software_agent: Option<String>,
}

impl XmpPacket {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// History events in sequence order.
    pub fn history(&self) -> Vec<XmpHistoryEvent> {
        const PREFIX: &str = "xmpMM:History/rdf:Seq/rdf:li[";
        let mut events: BTreeMap<usize, XmpHistoryEvent> = BTreeMap::new();

        for (key, value) in &self.properties {
            let Some(rest) = key.strip_prefix(PREFIX) else {
                continue;
            };
            let Some(bracket) = rest.find(']') else {
                continue;
            };
            let Ok(index) = rest[..bracket].parse::<usize>() else {
                continue;
            };
            let field = &rest[bracket + 1..];

            let event = events.entry(index).or_insert_with(|| XmpHistoryEvent {
                index,
                ..Default::default()
            });
            match field {
                "/stEvt:action" => event.action = Some(value.clone()),
                "/stEvt:when" => event.when = Some(value.clone()),
                "/stEvt:softwareAgent" => event.software_agent = Some(value.clone()),
                _ => {}
            }
        }

        events.into_values().collect()
    }
}

/// Locate the document's XMP packet: the catalog's `/Metadata` stream when
/// present, otherwise the last raw `<?xpacket ...?>` span in the file (a
/// packet from an earlier revision is still evidence).
pub fn find_xmp(doc: &ParsedDocument, max_stream_size: usize) -> Option<XmpPacket> {
    if let Some(metadata) = doc.catalog().and_then(|catalog| catalog.get("Metadata")) {
        if let Some(stream) = doc.resolve(metadata).as_stream() {
            let raw = match stream.decode(max_stream_size) {
                Ok(data) => data,
                Err(_) => stream.data.clone(),
            };
            let properties = parse_xmp(&raw);
            return Some(XmpPacket { raw, properties });
        }
    }

    // Raw scan fallback for files whose catalog is damaged or missing.
    let begin = find_last(&doc.source, b"<?xpacket begin")?;
    let end_marker = crate::parser::objects::find_bytes(&doc.source, b"<?xpacket end", begin)?;
    let end = crate::parser::objects::find_bytes(&doc.source, b"?>", end_marker)
        .map(|p| p + 2)
        .unwrap_or(doc.source.len());
    let raw = doc.source[begin..end].to_vec();
    let properties = parse_xmp(&raw);
    Some(XmpPacket { raw, properties })
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    let mut found = None;
    let mut from = 0;
    while let Some(pos) = crate::parser::objects::find_bytes(haystack, needle, from) {
        found = Some(pos);
        from = pos + 1;
    }
    found
}

/// Flatten an XMP packet into qualified-path → value pairs.
///
/// Never fails: XML damage stops the walk and whatever was collected up to
/// that point is returned.
pub fn parse_xmp(raw: &[u8]) -> BTreeMap<String, String> {
    let text = String::from_utf8_lossy(raw);
    let mut reader = Reader::from_str(&text);

    let mut properties = BTreeMap::new();
    // Stack of open element path segments (li items already indexed), and
    // a parallel stack of per-parent child counters for li numbering.
    let mut path: Vec<String> = Vec::new();
    let mut li_counters: Vec<usize> = vec![0];

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let segment = make_segment(&name, li_counters.last_mut());
                collect_attributes(e, &path, &segment, &mut properties);
                path.push(segment);
                li_counters.push(0);
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let segment = make_segment(&name, li_counters.last_mut());
                collect_attributes(e, &path, &segment, &mut properties);
            }
            Ok(Event::Text(e)) => {
                let value = e.unescape().unwrap_or_default().trim().to_string();
                if !value.is_empty() {
                    if let Some(key) = qualified_key(&path, None) {
                        properties.entry(key).or_insert(value);
                    }
                }
            }
            Ok(Event::End(_)) => {
                path.pop();
                li_counters.pop();
                if li_counters.is_empty() {
                    li_counters.push(0);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    "XMP parse stopped at position {}: {e}",
                    reader.buffer_position()
                );
                break;
            }
            _ => {}
        }
    }

    properties
}

fn make_segment(name: &str, counter: Option<&mut usize>) -> String {
    if name == "rdf:li" {
        if let Some(counter) = counter {
            *counter += 1;
            return format!("rdf:li[{counter}]");
        }
    }
    name.to_string()
}

fn collect_attributes(
    element: &quick_xml::events::BytesStart<'_>,
    path: &[String],
    segment: &str,
    properties: &mut BTreeMap<String, String>,
) {
    for attr in element.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key.starts_with("xmlns") || key.starts_with("rdf:") || key.starts_with("x:") {
            continue;
        }
        if !key.contains(':') {
            continue;
        }
        let value = String::from_utf8_lossy(&attr.value).trim().to_string();
        if value.is_empty() {
            continue;
        }
        let mut full_path: Vec<String> = path.to_vec();
        full_path.push(segment.to_string());
        if let Some(qualified) = qualified_key(&full_path, Some(&key)) {
            properties.entry(qualified).or_insert(value);
        }
    }
}

/// Join the non-wrapper segments of `path` (plus an optional attribute
/// leaf) into a qualified key.
fn qualified_key(path: &[String], attribute: Option<&str>) -> Option<String> {
    let mut segments: Vec<&str> = path
        .iter()
        .map(String::as_str)
        .filter(|segment| !WRAPPER_ELEMENTS.contains(segment))
        .collect();
    if let Some(attr) = attribute {
        segments.push(attr);
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:pdf="http://ns.adobe.com/pdf/1.3/"
    xmlns:xmpMM="http://ns.adobe.com/xap/1.0/mm/"
    xmlns:stEvt="http://ns.adobe.com/xap/1.0/sType/ResourceEvent#"
    xmp:CreatorTool="Microsoft Word">
   <pdf:Producer>Acrobat Distiller 21.0</pdf:Producer>
   <xmp:CreateDate>2023-05-01T10:00:00Z</xmp:CreateDate>
   <xmp:ModifyDate>2023-05-02T11:30:00Z</xmp:ModifyDate>
   <xmpMM:DocumentID>uuid:aaa</xmpMM:DocumentID>
   <xmpMM:OriginalDocumentID>uuid:bbb</xmpMM:OriginalDocumentID>
   <xmpMM:History>
    <rdf:Seq>
     <rdf:li stEvt:action="created" stEvt:when="2023-05-01T10:00:00Z" stEvt:softwareAgent="Word"/>
     <rdf:li rdf:parseType="Resource">
      <stEvt:action>saved</stEvt:action>
      <stEvt:when>2023-05-02T11:30:00Z</stEvt:when>
     </rdf:li>
    </rdf:Seq>
   </xmpMM:History>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    #[test]
    fn test_simple_element_properties() {
        let props = parse_xmp(PACKET.as_bytes());
        assert_eq!(
            props.get("pdf:Producer").map(String::as_str),
            Some("Acrobat Distiller 21.0")
        );
        assert_eq!(
            props.get("xmp:CreateDate").map(String::as_str),
            Some("2023-05-01T10:00:00Z")
        );
    }

    #[test]
    fn test_attribute_properties() {
        let props = parse_xmp(PACKET.as_bytes());
        assert_eq!(
            props.get("xmp:CreatorTool").map(String::as_str),
            Some("Microsoft Word")
        );
    }

    #[test]
    fn test_history_entries_indexed() {
        let props = parse_xmp(PACKET.as_bytes());
        assert_eq!(
            props
                .get("xmpMM:History/rdf:Seq/rdf:li[1]/stEvt:action")
                .map(String::as_str),
            Some("created")
        );
        assert_eq!(
            props
                .get("xmpMM:History/rdf:Seq/rdf:li[2]/stEvt:action")
                .map(String::as_str),
            Some("saved")
        );
    }

    #[test]
    fn test_history_accessor() {
        let packet = XmpPacket {
            raw: PACKET.as_bytes().to_vec(),
            properties: parse_xmp(PACKET.as_bytes()),
        };
        let history = packet.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].action.as_deref(), Some("created"));
        assert_eq!(history[0].software_agent.as_deref(), Some("Word"));
        assert_eq!(history[1].action.as_deref(), Some("saved"));
        assert_eq!(history[1].when.as_deref(), Some("2023-05-02T11:30:00Z"));
    }

    #[test]
    fn test_document_ids() {
        let props = parse_xmp(PACKET.as_bytes());
        assert_eq!(props.get("xmpMM:DocumentID").map(String::as_str), Some("uuid:aaa"));
        assert_eq!(
            props.get("xmpMM:OriginalDocumentID").map(String::as_str),
            Some("uuid:bbb")
        );
    }

    #[test]
    fn test_malformed_xml_returns_partial() {
        let broken = b"<x:xmpmeta><rdf:RDF><rdf:Description>\
                       <pdf:Producer>P</pdf:Producer><open";
        let props = parse_xmp(broken);
        assert_eq!(props.get("pdf:Producer").map(String::as_str), Some("P"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_xmp(b"").is_empty());
    }
}
