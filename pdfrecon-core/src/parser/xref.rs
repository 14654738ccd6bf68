//! Cross-reference reading.
//!
//! A PDF carries one cross-reference section per save: classic `xref`
//! tables in older files, xref streams (`/Type /XRef`, row widths declared
//! in `/W`) in newer ones, linked oldest-ward through `/Prev`. The chain is
//! the document's revision ledger, which makes it central evidence here:
//! sections are kept separate rather than merged, so later analysis can see
//! exactly which save touched which objects.
//!
//! Offsets announced by `startxref` are treated as approximate: real files
//! are routinely off by a few bytes after being patched by other tools, so
//! the reader scans a small window around a failing offset before giving up.

use super::lexer::{Lexer, Token};
use super::objects::{self, ObjectId, PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};
use std::collections::{BTreeMap, HashSet};

/// How far from the declared offset a section is allowed to actually start.
const XREF_SLACK: usize = 64;

/// One cross-reference entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Byte offset for in-use entries; next free object number for free
    /// entries; meaningless for compressed entries.
    pub offset: u64,
    pub generation: u16,
    pub kind: XRefEntryKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntryKind {
    Free,
    InUse,
    /// Object lives inside an object stream.
    Compressed { container: u32, index: u32 },
}

/// One cross-reference section: one `/Prev` hop.
#[derive(Debug, Clone)]
pub struct XRefSection {
    /// Where the section actually starts in the file.
    pub byte_offset: usize,
    /// True when this section is an xref stream rather than a classic table.
    pub is_stream: bool,
    pub entries: BTreeMap<ObjectId, XRefEntry>,
    /// Trailer dictionary (the stream dictionary for xref streams).
    pub trailer: PdfDictionary,
    pub prev_offset: Option<usize>,
}

/// Follow the `/Prev` chain starting at `start`, newest section first.
///
/// Cycles terminate the chain with a recorded error. A hop that cannot be
/// parsed also terminates the chain; everything collected so far is still
/// returned.
pub fn read_chain(
    input: &[u8],
    start: usize,
    max_stream_size: usize,
    errors: &mut Vec<String>,
) -> Vec<XRefSection> {
    let mut sections = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut current = Some(start);

    while let Some(offset) = current {
        if !visited.insert(offset) {
            tracing::debug!("circular xref chain revisits offset {offset}");
            errors.push(ParseError::CircularXRefChain(offset).to_string());
            break;
        }

        match read_section(input, offset, max_stream_size, errors) {
            Ok(section) => {
                current = section.prev_offset;
                sections.push(section);
            }
            Err(e) => {
                errors.push(format!("xref section at offset {offset}: {e}"));
                break;
            }
        }
    }

    tracing::debug!(
        "xref chain from offset {start}: {} section(s)",
        sections.len()
    );
    sections
}

/// Read the single section at (or near) `offset`.
pub fn read_section(
    input: &[u8],
    offset: usize,
    max_stream_size: usize,
    errors: &mut Vec<String>,
) -> ParseResult<XRefSection> {
    if offset >= input.len() {
        return Err(ParseError::InvalidXRef {
            offset,
            message: "offset past end of file".to_string(),
        });
    }

    match read_section_exact(input, offset, max_stream_size, errors) {
        Ok(section) => Ok(section),
        Err(first_err) => {
            // Off-by-a-few startxref values are common after third-party
            // edits; scan a small window for where the section really is.
            let window_start = offset.saturating_sub(XREF_SLACK);
            if let Some(found) = objects::find_bytes(input, b"xref", window_start) {
                // Reject hits inside `startxref`.
                let standalone = found == 0 || !input[found - 1].is_ascii_alphanumeric();
                if standalone && found != offset && found <= offset + XREF_SLACK {
                    tracing::warn!(
                        "xref not at declared offset {offset}, recovered at {found}"
                    );
                    errors.push(format!(
                        "startxref points at {offset} but section found at {found}"
                    ));
                    return read_section_exact(input, found, max_stream_size, errors);
                }
            }
            Err(first_err)
        }
    }
}

fn read_section_exact(
    input: &[u8],
    offset: usize,
    max_stream_size: usize,
    errors: &mut Vec<String>,
) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::at(input, offset);
    let checkpoint = lexer.pos();

    match lexer.next_token() {
        Ok(Token::Keyword(word)) if word == "xref" => {
            read_classic_table(input, offset, &mut lexer)
        }
        _ => {
            // Not a classic table; the offset should name an xref stream
            // object (`N G obj` with /Type /XRef).
            lexer.seek(checkpoint);
            read_xref_stream(input, offset, max_stream_size, errors)
        }
    }
}

fn read_classic_table(
    _input: &[u8],
    offset: usize,
    lexer: &mut Lexer<'_>,
) -> ParseResult<XRefSection> {
    let mut entries = BTreeMap::new();

    loop {
        let checkpoint = lexer.pos();
        match lexer.next_token() {
            Ok(Token::Integer(start)) if start >= 0 => {
                let count = match lexer.next_token() {
                    Ok(Token::Integer(c)) if c >= 0 => c as u64,
                    other => {
                        return Err(ParseError::InvalidXRef {
                            offset,
                            message: format!("bad subsection header: {other:?}"),
                        })
                    }
                };

                for i in 0..count {
                    let entry_offset = match lexer.next_token() {
                        Ok(Token::Integer(o)) if o >= 0 => o as u64,
                        other => {
                            return Err(ParseError::InvalidXRef {
                                offset,
                                message: format!("bad entry offset: {other:?}"),
                            })
                        }
                    };
                    let generation = match lexer.next_token() {
                        Ok(Token::Integer(g)) if (0..=65_535).contains(&g) => g as u16,
                        other => {
                            return Err(ParseError::InvalidXRef {
                                offset,
                                message: format!("bad entry generation: {other:?}"),
                            })
                        }
                    };
                    let kind = match lexer.next_token() {
                        Ok(Token::Keyword(k)) if k == "n" => XRefEntryKind::InUse,
                        Ok(Token::Keyword(k)) if k == "f" => XRefEntryKind::Free,
                        other => {
                            return Err(ParseError::InvalidXRef {
                                offset,
                                message: format!("bad entry type: {other:?}"),
                            })
                        }
                    };

                    let number = (start as u64 + i) as u32;
                    entries.insert(
                        ObjectId::new(number, generation),
                        XRefEntry {
                            offset: entry_offset,
                            generation,
                            kind,
                        },
                    );
                }
            }
            Ok(Token::Keyword(word)) if word == "trailer" => {
                let trailer = match PdfObject::parse(lexer)? {
                    PdfObject::Dictionary(d) => d,
                    other => {
                        return Err(ParseError::InvalidXRef {
                            offset,
                            message: format!("trailer is not a dictionary: {other:?}"),
                        })
                    }
                };
                let prev_offset = trailer
                    .get("Prev")
                    .and_then(PdfObject::as_integer)
                    .and_then(|p| usize::try_from(p).ok());

                return Ok(XRefSection {
                    byte_offset: offset,
                    is_stream: false,
                    entries,
                    trailer,
                    prev_offset,
                });
            }
            _ => {
                // Some writers omit the trailer keyword and go straight to
                // the dictionary; tolerate an immediately following `<<`.
                lexer.seek(checkpoint);
                if let Ok(PdfObject::Dictionary(trailer)) = PdfObject::parse(lexer) {
                    tracing::warn!("trailer dictionary without 'trailer' keyword at {offset}");
                    let prev_offset = trailer
                        .get("Prev")
                        .and_then(PdfObject::as_integer)
                        .and_then(|p| usize::try_from(p).ok());
                    return Ok(XRefSection {
                        byte_offset: offset,
                        is_stream: false,
                        entries,
                        trailer,
                        prev_offset,
                    });
                }
                return Err(ParseError::InvalidXRef {
                    offset,
                    message: "xref table has no trailer".to_string(),
                });
            }
        }
    }
}

fn read_xref_stream(
    input: &[u8],
    offset: usize,
    max_stream_size: usize,
    errors: &mut Vec<String>,
) -> ParseResult<XRefSection> {
    let (indirect, _) = objects::parse_indirect_at(input, offset, errors).map_err(|e| {
        ParseError::InvalidXRef {
            offset,
            message: format!("no xref table and no parseable object: {e}"),
        }
    })?;

    let stream = indirect
        .object
        .as_stream()
        .ok_or_else(|| ParseError::InvalidXRef {
            offset,
            message: "object at xref offset is not a stream".to_string(),
        })?;

    if stream.dict.get_type() != Some("XRef") {
        return Err(ParseError::InvalidXRef {
            offset,
            message: format!(
                "stream at xref offset has /Type {:?}, expected /XRef",
                stream.dict.get_type()
            ),
        });
    }

    tracing::debug!("parsing xref stream {} at offset {offset}", indirect.id);
    let data = stream.decode(max_stream_size)?;

    let widths: Vec<usize> = stream
        .dict
        .get("W")
        .and_then(PdfObject::as_array)
        .map(|a| {
            a.iter()
                .filter_map(PdfObject::as_integer)
                .map(|w| w.max(0) as usize)
                .collect()
        })
        .ok_or_else(|| ParseError::InvalidXRef {
            offset,
            message: "xref stream missing /W".to_string(),
        })?;
    if widths.len() < 3 || widths.iter().sum::<usize>() == 0 {
        return Err(ParseError::InvalidXRef {
            offset,
            message: format!("implausible /W {widths:?}"),
        });
    }

    let size = stream
        .dict
        .get("Size")
        .and_then(PdfObject::as_integer)
        .unwrap_or(0)
        .max(0);

    // /Index defaults to a single run covering [0, Size).
    let index: Vec<(u32, u32)> = match stream.dict.get("Index").and_then(PdfObject::as_array) {
        Some(array) => {
            let numbers: Vec<i64> = array.iter().filter_map(PdfObject::as_integer).collect();
            numbers
                .chunks_exact(2)
                .map(|pair| (pair[0].max(0) as u32, pair[1].max(0) as u32))
                .collect()
        }
        None => vec![(0, size as u32)],
    };

    let row_len: usize = widths.iter().sum();
    let mut entries = BTreeMap::new();
    let mut rows = data.chunks_exact(row_len);

    'runs: for (run_start, run_count) in index {
        for i in 0..run_count {
            let Some(row) = rows.next() else {
                errors.push(format!(
                    "xref stream at {offset}: data ends mid-run ({} entries short)",
                    run_count - i
                ));
                break 'runs;
            };

            let mut fields = [0u64; 3];
            let mut cursor = 0usize;
            for (f, &w) in widths.iter().take(3).enumerate() {
                for _ in 0..w {
                    fields[f] = (fields[f] << 8) | row[cursor] as u64;
                    cursor += 1;
                }
            }
            // A zero-width type column means every entry is type 1.
            let entry_type = if widths[0] == 0 { 1 } else { fields[0] };

            let number = run_start + i;
            let (id, entry) = match entry_type {
                0 => {
                    let generation = fields[2] as u16;
                    (
                        ObjectId::new(number, generation),
                        XRefEntry {
                            offset: fields[1],
                            generation,
                            kind: XRefEntryKind::Free,
                        },
                    )
                }
                1 => {
                    let generation = fields[2] as u16;
                    (
                        ObjectId::new(number, generation),
                        XRefEntry {
                            offset: fields[1],
                            generation,
                            kind: XRefEntryKind::InUse,
                        },
                    )
                }
                2 => (
                    ObjectId::new(number, 0),
                    XRefEntry {
                        offset: 0,
                        generation: 0,
                        kind: XRefEntryKind::Compressed {
                            container: fields[1] as u32,
                            index: fields[2] as u32,
                        },
                    },
                ),
                other => {
                    errors.push(format!(
                        "xref stream at {offset}: unknown entry type {other} for object {number}"
                    ));
                    continue;
                }
            };
            entries.insert(id, entry);
        }
    }

    let trailer = stream.dict.clone();
    let prev_offset = trailer
        .get("Prev")
        .and_then(PdfObject::as_integer)
        .and_then(|p| usize::try_from(p).ok());

    Ok(XRefSection {
        byte_offset: offset,
        is_stream: true,
        entries,
        trailer,
        prev_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_classic_table() {
        let mut errors = Vec::new();
        let section = read_section(CLASSIC, 0, 1 << 20, &mut errors).unwrap();

        assert!(!section.is_stream);
        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.prev_offset, None);

        let entry = section.entries[&ObjectId::new(1, 0)];
        assert_eq!(entry.offset, 17);
        assert_eq!(entry.kind, XRefEntryKind::InUse);

        let free = section.entries[&ObjectId::new(0, 65535)];
        assert_eq!(free.kind, XRefEntryKind::Free);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_classic_table_multiple_subsections() {
        let table = b"xref\n0 1\n0000000000 65535 f \n5 2\n0000000100 00000 n \n0000000200 00001 n \ntrailer\n<< /Size 7 >>\n";
        let mut errors = Vec::new();
        let section = read_section(table, 0, 1 << 20, &mut errors).unwrap();

        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.entries[&ObjectId::new(5, 0)].offset, 100);
        assert_eq!(section.entries[&ObjectId::new(6, 1)].offset, 200);
    }

    #[test]
    fn test_slightly_wrong_offset_recovers() {
        // startxref points two bytes past the actual `xref` keyword.
        let mut errors = Vec::new();
        let section = read_section(CLASSIC, 2, 1 << 20, &mut errors).unwrap();
        assert_eq!(section.entries.len(), 3);
        assert!(errors.iter().any(|e| e.contains("section found at 0")));
    }

    fn build_xref_stream() -> Vec<u8> {
        // Three type-1 rows, W [1 2 1]: (type, offset, gen)
        let rows: &[(u8, u16, u8)] = &[(1, 15, 0), (1, 90, 0), (1, 200, 0)];
        let mut data = Vec::new();
        for &(t, off, gen) in rows {
            data.push(t);
            data.extend_from_slice(&off.to_be_bytes());
            data.push(gen);
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"7 0 obj\n<< /Type /XRef /Size 3 /W [1 2 1] /Length ");
        out.extend_from_slice(data.len().to_string().as_bytes());
        out.extend_from_slice(b" /Root 1 0 R >>\nstream\n");
        out.extend_from_slice(&data);
        out.extend_from_slice(b"\nendstream\nendobj\n");
        out
    }

    #[test]
    fn test_xref_stream() {
        let input = build_xref_stream();
        let mut errors = Vec::new();
        let section = read_section(&input, 0, 1 << 20, &mut errors).unwrap();

        assert!(section.is_stream);
        assert_eq!(section.entries.len(), 3);
        assert_eq!(section.entries[&ObjectId::new(1, 0)].offset, 90);
        assert_eq!(
            section.entries[&ObjectId::new(1, 0)].kind,
            XRefEntryKind::InUse
        );
        assert!(errors.is_empty());
    }

    #[test]
    fn test_xref_stream_compressed_entries() {
        // W [1 2 1], one type-2 row: object 4 lives in stream 9 at index 3.
        let data = vec![2u8, 0, 9, 3];
        let mut input = Vec::new();
        input.extend_from_slice(b"8 0 obj\n<< /Type /XRef /Size 1 /Index [4 1] /W [1 2 1] /Length 4 >>\nstream\n");
        input.extend_from_slice(&data);
        input.extend_from_slice(b"\nendstream\nendobj\n");

        let mut errors = Vec::new();
        let section = read_section(&input, 0, 1 << 20, &mut errors).unwrap();
        assert_eq!(
            section.entries[&ObjectId::new(4, 0)].kind,
            XRefEntryKind::Compressed {
                container: 9,
                index: 3
            }
        );
    }

    #[test]
    fn test_chain_with_prev() {
        let mut input = Vec::new();
        // Older section at offset 0.
        input.extend_from_slice(
            b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 >>\n",
        );
        let newer_offset = input.len();
        input.extend_from_slice(b"xref\n1 1\n0000000300 00000 n \ntrailer\n<< /Size 2 /Prev 0 >>\n");

        let mut errors = Vec::new();
        let sections = read_chain(&input, newer_offset, 1 << 20, &mut errors);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].byte_offset, newer_offset);
        assert_eq!(sections[1].byte_offset, 0);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_chain_cycle_detected() {
        // Section whose /Prev points at itself.
        let input = b"xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev 0 >>\n";
        let mut errors = Vec::new();
        let sections = read_chain(input, 0, 1 << 20, &mut errors);
        assert_eq!(sections.len(), 1);
        assert!(errors.iter().any(|e| e.contains("Circular")));
    }

    #[test]
    fn test_offset_past_eof() {
        let mut errors = Vec::new();
        assert!(read_section(b"xref", 100, 1 << 20, &mut errors).is_err());
    }
}
