//! Whole-document assembly.
//!
//! [`ParsedDocument`] is one parse of one input file: the marker inventory,
//! every object that could be recovered (from raw `obj` sites, from
//! cross-reference entries, and from inside object streams), the
//! cross-reference chain, and the reference graph computed over all of it.
//! Later pipeline stages hang their enrichments (Info/XMP metadata, per-page
//! content statistics) off the same struct so the indicator evaluators can
//! be pure functions of a single value.
//!
//! Assembly never fails: structural damage degrades into recorded `errors`
//! and whatever partial structure was recoverable.

use super::objects::{self, ObjectId, PdfDictionary, PdfObject};
use super::scanner::{MarkerKind, MarkerScan};
use super::xref::{self, XRefEntryKind, XRefSection};
use crate::config::ScanConfig;
use crate::content::PageStats;
use crate::metadata::xmp::XmpPacket;
use std::collections::{BTreeMap, BTreeSet, HashSet};

static NULL_OBJECT: PdfObject = PdfObject::Null;

/// One `startxref` statement: where the keyword sits and where it points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartXref {
    pub marker_offset: usize,
    pub declared_offset: usize,
}

/// A recovered indirect object.
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    /// Offset of the object header; for object-stream members, the offset
    /// of the containing stream's header.
    pub byte_offset: usize,
    pub object: PdfObject,
    pub in_object_stream: bool,
}

/// Everything recovered from one input file.
#[derive(Debug)]
pub struct ParsedDocument {
    /// The raw file bytes. Owned; everything else indexes into this.
    pub source: Vec<u8>,
    pub markers: MarkerScan,
    /// Declared version from the `%PDF-x.y` header.
    pub pdf_version: Option<String>,
    /// Start offset of each `%%EOF` marker, ascending. The marker ends at
    /// `offset + 5`, which is also the exclusive end of that revision.
    pub eof_offsets: Vec<usize>,
    pub startxref_entries: Vec<StartXref>,
    /// Cross-reference chain, newest section first.
    pub xref_sections: Vec<XRefSection>,
    pub objects: BTreeMap<ObjectId, ObjectRecord>,
    /// Every id that appears as an `N G R` reference anywhere.
    pub referenced_ids: BTreeSet<ObjectId>,
    /// Most recent trailer dictionary.
    pub trailer: Option<PdfDictionary>,
    /// Page object ids in tree order.
    pub pages: Vec<ObjectId>,
    /// Flat Info dictionary, filled by the metadata reader.
    pub info_dict: Option<BTreeMap<String, String>>,
    /// XMP packet, filled by the metadata reader.
    pub xmp: Option<XmpPacket>,
    /// Per-page content statistics, filled by the content inspector.
    pub page_stats: Vec<PageStats>,
    pub linearized: bool,
    pub encrypted: bool,
    pub uses_xref_streams: bool,
    pub uses_object_streams: bool,
    /// Non-fatal problems encountered while parsing, in discovery order.
    pub errors: Vec<String>,
}

impl ParsedDocument {
    /// Parse `source`. Infallible by design: a file of line noise yields a
    /// document with empty inventories and a populated error list.
    pub fn parse(source: Vec<u8>, config: &ScanConfig) -> Self {
        let markers = MarkerScan::scan(&source);
        let mut errors = Vec::new();

        let pdf_version = parse_header_version(&source, &markers);
        let eof_offsets = markers.offsets(MarkerKind::Eof).to_vec();
        let startxref_entries = parse_startxref_entries(&source, &markers, &mut errors);

        let xref_sections = match startxref_entries.last() {
            Some(entry) => xref::read_chain(
                &source,
                entry.declared_offset,
                config.max_stream_size,
                &mut errors,
            ),
            None => Vec::new(),
        };

        let mut doc = ParsedDocument {
            markers,
            pdf_version,
            eof_offsets,
            startxref_entries,
            uses_xref_streams: xref_sections.iter().any(|s| s.is_stream),
            xref_sections,
            objects: BTreeMap::new(),
            referenced_ids: BTreeSet::new(),
            trailer: None,
            pages: Vec::new(),
            info_dict: None,
            xmp: None,
            page_stats: Vec::new(),
            linearized: false,
            encrypted: false,
            uses_object_streams: false,
            errors,
            source,
        };

        doc.collect_objects_from_markers();
        doc.collect_objects_from_xref(config);
        doc.expand_object_streams(config);
        doc.collect_references();
        doc.pick_trailer();
        doc.collect_pages();
        doc.detect_flags();

        tracing::debug!(
            "parsed document: {} objects, {} revisions, {} xref sections, {} errors",
            doc.objects.len(),
            doc.eof_offsets.len(),
            doc.xref_sections.len(),
            doc.errors.len(),
        );
        doc
    }

    /// Sweep every `obj` site found by the scanner. Later definitions of
    /// the same id overwrite earlier ones, which matches incremental-save
    /// semantics (appended objects supersede).
    fn collect_objects_from_markers(&mut self) {
        let obj_offsets = self.markers.offsets(MarkerKind::Obj).to_vec();
        let mut last_end = 0usize;

        for marker in obj_offsets {
            // Markers inside a previously captured object (stream bodies
            // can contain anything) are not object headers.
            if marker < last_end {
                continue;
            }
            let Some(header) = object_header_start(&self.source, marker) else {
                continue;
            };
            match objects::parse_indirect_at(&self.source, header, &mut self.errors) {
                Ok((indirect, end)) => {
                    last_end = end;
                    self.objects.insert(
                        indirect.id,
                        ObjectRecord {
                            byte_offset: indirect.offset,
                            object: indirect.object,
                            in_object_stream: false,
                        },
                    );
                }
                Err(e) => {
                    tracing::debug!("obj marker at {marker} is not an object header: {e}");
                }
            }
        }
    }

    /// Parse any in-use xref entry whose target the raw sweep missed.
    fn collect_objects_from_xref(&mut self, _config: &ScanConfig) {
        let mut todo: Vec<(ObjectId, usize)> = Vec::new();
        for section in &self.xref_sections {
            for (id, entry) in &section.entries {
                if entry.kind == XRefEntryKind::InUse && !self.objects.contains_key(id) {
                    let offset = entry.offset as usize;
                    if offset < self.source.len() {
                        todo.push((*id, offset));
                    }
                }
            }
        }

        for (id, offset) in todo {
            match objects::parse_indirect_at(&self.source, offset, &mut self.errors) {
                Ok((indirect, _)) => {
                    if indirect.id != id {
                        self.errors.push(format!(
                            "xref names object {id} at offset {offset} but found {}",
                            indirect.id
                        ));
                    }
                    self.objects.entry(indirect.id).or_insert(ObjectRecord {
                        byte_offset: indirect.offset,
                        object: indirect.object,
                        in_object_stream: false,
                    });
                }
                Err(e) => {
                    self.errors
                        .push(format!("xref entry for {id} points at unparseable data: {e}"));
                }
            }
        }
    }

    /// Pull member objects out of `/Type /ObjStm` containers.
    fn expand_object_streams(&mut self, config: &ScanConfig) {
        let containers: Vec<(ObjectId, usize)> = self
            .objects
            .iter()
            .filter(|(_, rec)| {
                rec.object
                    .as_stream()
                    .map(|s| s.dict.get_type() == Some("ObjStm"))
                    .unwrap_or(false)
            })
            .map(|(id, rec)| (*id, rec.byte_offset))
            .collect();

        if !containers.is_empty() {
            self.uses_object_streams = true;
        }

        for (container_id, container_offset) in containers {
            let Some(stream) = self
                .objects
                .get(&container_id)
                .and_then(|r| r.object.as_stream())
                .cloned()
            else {
                continue;
            };

            let data = match stream.decode(config.max_stream_size) {
                Ok(d) => d,
                Err(e) => {
                    self.errors
                        .push(format!("object stream {container_id}: {e}"));
                    continue;
                }
            };

            let count = stream
                .dict
                .get("N")
                .and_then(PdfObject::as_integer)
                .unwrap_or(0)
                .max(0) as usize;
            let first = stream
                .dict
                .get("First")
                .and_then(PdfObject::as_integer)
                .unwrap_or(0)
                .max(0) as usize;

            // Header: N pairs of (object number, relative offset).
            let mut header = super::lexer::Lexer::new(&data);
            let mut members = Vec::with_capacity(count);
            for _ in 0..count {
                let number = match header.next_token() {
                    Ok(super::lexer::Token::Integer(n)) if n >= 0 => n as u32,
                    _ => break,
                };
                let relative = match header.next_token() {
                    Ok(super::lexer::Token::Integer(o)) if o >= 0 => o as usize,
                    _ => break,
                };
                members.push((number, relative));
            }
            if members.len() != count {
                self.errors.push(format!(
                    "object stream {container_id}: header lists {} of {count} members",
                    members.len()
                ));
            }

            for (number, relative) in members {
                let start = first.saturating_add(relative);
                if start >= data.len() {
                    self.errors.push(format!(
                        "object stream {container_id}: member {number} offset past stream end"
                    ));
                    continue;
                }
                let mut lexer = super::lexer::Lexer::at(&data, start);
                match PdfObject::parse(&mut lexer) {
                    Ok(object) => {
                        // Compressed members always have generation 0.
                        self.objects
                            .entry(ObjectId::new(number, 0))
                            .or_insert(ObjectRecord {
                                byte_offset: container_offset,
                                object,
                                in_object_stream: true,
                            });
                    }
                    Err(e) => {
                        self.errors.push(format!(
                            "object stream {container_id}: member {number}: {e}"
                        ));
                    }
                }
            }
        }
    }

    /// Walk every recovered value (and every trailer) recording `N G R`
    /// occurrences. Values are owned trees, so no cycle guard is needed at
    /// this level; reference *following* is where cycles live.
    fn collect_references(&mut self) {
        let mut referenced = BTreeSet::new();
        for record in self.objects.values() {
            collect_refs_into(&record.object, &mut referenced);
        }
        for section in &self.xref_sections {
            for (_, value) in section.trailer.iter() {
                collect_refs_into(value, &mut referenced);
            }
        }
        self.referenced_ids = referenced;
    }

    fn pick_trailer(&mut self) {
        if let Some(section) = self.xref_sections.first() {
            self.trailer = Some(section.trailer.clone());
            return;
        }
        // No usable chain: parse the dictionary after the last raw
        // `trailer` keyword instead.
        if let Some(offset) = self.markers.last(MarkerKind::Trailer) {
            let mut lexer = super::lexer::Lexer::at(&self.source, offset + b"trailer".len());
            if let Ok(PdfObject::Dictionary(dict)) = PdfObject::parse(&mut lexer) {
                self.trailer = Some(dict);
            }
        }
    }

    fn collect_pages(&mut self) {
        let mut pages = Vec::new();

        let pages_root = self
            .catalog()
            .and_then(|catalog| catalog.get("Pages"))
            .and_then(PdfObject::as_reference);
        if let Some(id) = pages_root {
            let mut visited = HashSet::new();
            self.walk_page_tree(id, &mut visited, &mut pages);
        }

        if pages.is_empty() {
            // No catalog or a broken tree: fall back to every object that
            // calls itself a page.
            for (id, record) in &self.objects {
                let is_page = record
                    .object
                    .as_dict()
                    .and_then(PdfDictionary::get_type)
                    == Some("Page");
                if is_page {
                    pages.push(*id);
                }
            }
        }

        self.pages = pages;
    }

    fn walk_page_tree(
        &self,
        node_id: ObjectId,
        visited: &mut HashSet<ObjectId>,
        pages: &mut Vec<ObjectId>,
    ) {
        if !visited.insert(node_id) {
            return;
        }
        let Some(dict) = self.get_object(node_id).and_then(PdfObject::as_dict) else {
            return;
        };

        match dict.get_type() {
            Some("Pages") => {
                if let Some(kids) = dict.get("Kids").map(|k| self.resolve(k)) {
                    if let Some(kids) = kids.as_array() {
                        for kid in kids.iter() {
                            if let Some(kid_id) = kid.as_reference() {
                                self.walk_page_tree(kid_id, visited, pages);
                            }
                        }
                    }
                }
            }
            // Treat a typeless node with /Contents as a page; damaged
            // files drop /Type more often than /Contents.
            Some("Page") => pages.push(node_id),
            None if dict.contains_key("Contents") => pages.push(node_id),
            _ => {}
        }
    }

    fn detect_flags(&mut self) {
        self.encrypted = self
            .xref_sections
            .iter()
            .map(|s| &s.trailer)
            .chain(self.trailer.iter())
            .any(|t| t.contains_key("Encrypt"));

        // Linearization dictionary must be the first object in the file.
        self.linearized = self
            .objects
            .values()
            .filter(|r| !r.in_object_stream)
            .min_by_key(|r| r.byte_offset)
            .and_then(|r| r.object.as_dict())
            .map(|d| d.contains_key("Linearized"))
            .unwrap_or(false);

        if !self.uses_object_streams {
            self.uses_object_streams = self.xref_sections.iter().any(|s| {
                s.entries
                    .values()
                    .any(|e| matches!(e.kind, XRefEntryKind::Compressed { .. }))
            });
        }
    }

    /// Ids defined somewhere in the file.
    pub fn defined_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects.keys().copied()
    }

    /// Referenced ids with no definition anywhere in the file.
    pub fn missing_ids(&self) -> Vec<ObjectId> {
        self.referenced_ids
            .iter()
            .filter(|id| !self.objects.contains_key(id))
            .copied()
            .collect()
    }

    /// Look up a defined object by id.
    pub fn get_object(&self, id: ObjectId) -> Option<&PdfObject> {
        self.objects.get(&id).map(|r| &r.object)
    }

    /// Follow references until a direct object is reached. Missing targets
    /// and reference cycles resolve to null.
    pub fn resolve<'a>(&'a self, object: &'a PdfObject) -> &'a PdfObject {
        let mut current = object;
        let mut visited: HashSet<ObjectId> = HashSet::new();
        while let Some(id) = current.as_reference() {
            if !visited.insert(id) {
                return &NULL_OBJECT;
            }
            match self.get_object(id) {
                Some(next) => current = next,
                None => return &NULL_OBJECT,
            }
        }
        current
    }

    /// The document catalog, when a trailer names one.
    pub fn catalog(&self) -> Option<&PdfDictionary> {
        self.trailer
            .as_ref()
            .and_then(|t| t.get("Root"))
            .map(|r| self.resolve(r))
            .and_then(PdfObject::as_dict)
    }

    /// Inheritable page attribute (`MediaBox`, `CropBox`, `Resources`, ...):
    /// the page's own entry or the nearest ancestor's, via `/Parent`.
    pub fn page_attribute<'a>(&'a self, page_id: ObjectId, key: &str) -> Option<&'a PdfObject> {
        let mut current = page_id;
        let mut visited = HashSet::new();
        while visited.insert(current) {
            let dict = self.get_object(current).and_then(PdfObject::as_dict)?;
            if let Some(value) = dict.get(key) {
                return Some(self.resolve(value));
            }
            current = dict.get("Parent").and_then(PdfObject::as_reference)?;
        }
        None
    }

    /// Visit every dictionary nested anywhere in every recovered object,
    /// including stream dictionaries.
    pub fn for_each_dict<F>(&self, mut f: F)
    where
        F: FnMut(ObjectId, &PdfDictionary),
    {
        for (id, record) in &self.objects {
            visit_dicts(&record.object, *id, &mut f);
        }
    }
}

fn visit_dicts<F>(object: &PdfObject, owner: ObjectId, f: &mut F)
where
    F: FnMut(ObjectId, &PdfDictionary),
{
    match object {
        PdfObject::Dictionary(dict) => {
            f(owner, dict);
            for (_, value) in dict.iter() {
                visit_dicts(value, owner, f);
            }
        }
        PdfObject::Stream(stream) => {
            f(owner, &stream.dict);
            for (_, value) in stream.dict.iter() {
                visit_dicts(value, owner, f);
            }
        }
        PdfObject::Array(array) => {
            for item in array.iter() {
                visit_dicts(item, owner, f);
            }
        }
        _ => {}
    }
}

fn collect_refs_into(object: &PdfObject, out: &mut BTreeSet<ObjectId>) {
    match object {
        PdfObject::Reference(num, gen) => {
            out.insert(ObjectId::new(*num, *gen));
        }
        PdfObject::Array(array) => {
            for item in array.iter() {
                collect_refs_into(item, out);
            }
        }
        PdfObject::Dictionary(dict) => {
            for (_, value) in dict.iter() {
                collect_refs_into(value, out);
            }
        }
        PdfObject::Stream(stream) => {
            for (_, value) in stream.dict.iter() {
                collect_refs_into(value, out);
            }
        }
        _ => {}
    }
}

fn parse_header_version(source: &[u8], markers: &MarkerScan) -> Option<String> {
    let offset = markers.first(MarkerKind::Header)?;
    let tail = &source[offset + b"%PDF-".len()..];
    let end = tail
        .iter()
        .position(|&b| !(b.is_ascii_digit() || b == b'.'))
        .unwrap_or(tail.len());
    let version = std::str::from_utf8(&tail[..end]).ok()?;
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

fn parse_startxref_entries(
    source: &[u8],
    markers: &MarkerScan,
    errors: &mut Vec<String>,
) -> Vec<StartXref> {
    let mut entries = Vec::new();
    for &marker_offset in markers.offsets(MarkerKind::StartXref) {
        let mut lexer =
            super::lexer::Lexer::at(source, marker_offset + b"startxref".len());
        match lexer.next_token() {
            Ok(super::lexer::Token::Integer(offset)) if offset >= 0 => {
                entries.push(StartXref {
                    marker_offset,
                    declared_offset: offset as usize,
                });
            }
            other => {
                errors.push(format!(
                    "startxref at offset {marker_offset} not followed by an offset: {other:?}"
                ));
            }
        }
    }
    entries
}

/// Walk back from an `obj` keyword to the start of its `N G` header.
fn object_header_start(input: &[u8], obj_marker: usize) -> Option<usize> {
    use super::scanner::is_pdf_whitespace as ws;

    let mut i = obj_marker;
    // generation digits
    while i > 0 && ws(input[i - 1]) {
        i -= 1;
    }
    let gen_end = i;
    while i > 0 && input[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == gen_end {
        return None;
    }
    // object number digits
    let num_ws_end = i;
    while i > 0 && ws(input[i - 1]) {
        i -= 1;
    }
    if i == num_ws_end {
        return None;
    }
    let num_end = i;
    while i > 0 && input[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == num_end {
        return None;
    }
    Some(i)
}
