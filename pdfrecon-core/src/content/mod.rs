//! Content-stream inspection.
//!
//! Decodes each page's `/Contents` and walks the operator sequence looking
//! for the drawing patterns that matter forensically: dense text
//! repositioning (text pasted over text), invisible text (render mode 3),
//! white-filled rectangles (content painted over), and outright drawing
//! volume. The walk tracks just enough interpreter state to be honest about
//! it: the `q`/`Q` graphics-state stack for the fill color and the `Tr`
//! render-mode state machine across the page.

use crate::config::ScanConfig;
use crate::parser::document::ParsedDocument;
use crate::parser::objects::{ObjectId, PdfObject};
use crate::parser::scanner::{is_pdf_delimiter, is_pdf_whitespace};

/// Operators counted as "drawing" for the volume indicator.
const DRAWING_OPERATORS: [&str; 14] = [
    "re", "m", "l", "c", "v", "y", "h", "f", "F", "f*", "S", "s", "B", "b",
];

/// Text-positioning operators.
const POSITIONING_OPERATORS: [&str; 4] = ["Tm", "Td", "TD", "T*"];

/// What the inspector saw on one page.
#[derive(Debug, Clone, Default)]
pub struct PageStats {
    /// 0-based position in the page list.
    pub page_index: usize,
    pub page_id: ObjectId,
    /// Text-positioning operators on the whole page.
    pub text_positioning_total: usize,
    /// Largest positioning count inside a single BT/ET block.
    pub max_positioning_per_block: usize,
    /// Captured byte runs shown while the render mode was 3 (invisible).
    pub invisible_text_runs: Vec<Vec<u8>>,
    /// `re` rectangles drawn while the fill color was white.
    pub white_rectangles: usize,
    /// Total drawing operators.
    pub drawing_ops: usize,
}

/// Inspect every page of `doc`. Pages whose content cannot be decoded are
/// skipped with an error entry; the stats list always aligns with the page
/// list by index.
pub fn inspect_pages(doc: &ParsedDocument, config: &ScanConfig) -> (Vec<PageStats>, Vec<String>) {
    let mut stats = Vec::with_capacity(doc.pages.len());
    let mut errors = Vec::new();

    for (page_index, &page_id) in doc.pages.iter().enumerate() {
        match page_content_bytes(doc, page_id, config.max_stream_size) {
            Ok(content) => {
                let mut page_stats = analyze_content(&content);
                page_stats.page_index = page_index;
                page_stats.page_id = page_id;
                stats.push(page_stats);
            }
            Err(message) => {
                errors.push(format!("page {} ({page_id}): {message}", page_index + 1));
                stats.push(PageStats {
                    page_index,
                    page_id,
                    ..Default::default()
                });
            }
        }
    }

    (stats, errors)
}

/// Concatenate and decode a page's `/Contents` stream(s).
fn page_content_bytes(
    doc: &ParsedDocument,
    page_id: ObjectId,
    max_stream_size: usize,
) -> Result<Vec<u8>, String> {
    let page = doc
        .get_object(page_id)
        .and_then(PdfObject::as_dict)
        .ok_or_else(|| "page object is not a dictionary".to_string())?;

    let Some(contents) = page.get("Contents") else {
        return Ok(Vec::new());
    };

    let mut streams = Vec::new();
    match doc.resolve(contents) {
        PdfObject::Stream(stream) => streams.push(stream),
        PdfObject::Array(array) => {
            for item in array.iter() {
                if let Some(stream) = doc.resolve(item).as_stream() {
                    streams.push(stream);
                }
            }
        }
        _ => return Ok(Vec::new()),
    }

    let mut combined = Vec::new();
    for stream in streams {
        let decoded = stream
            .decode(max_stream_size)
            .map_err(|e| format!("content stream decode failed: {e}"))?;
        if !combined.is_empty() {
            combined.push(b'\n');
        }
        combined.extend_from_slice(&decoded);
    }
    Ok(combined)
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    fill_is_white: bool,
}

/// Walk one decoded content stream.
pub(crate) fn analyze_content(content: &[u8]) -> PageStats {
    let mut stats = PageStats::default();
    let mut tokenizer = ContentTokenizer::new(content);

    let mut operands: Vec<ContentToken> = Vec::new();
    let mut gs = GraphicsState {
        fill_is_white: false,
    };
    let mut gs_stack: Vec<GraphicsState> = Vec::new();
    let mut render_mode: i64 = 0;
    let mut block_positioning = 0usize;
    let mut invisible_run: Vec<u8> = Vec::new();

    while let Some(token) = tokenizer.next_token() {
        let ContentToken::Operator(op) = token else {
            operands.push(token);
            continue;
        };

        match op.as_str() {
            "BT" => block_positioning = 0,
            "ET" => {}
            op_name if POSITIONING_OPERATORS.contains(&op_name) => {
                stats.text_positioning_total += 1;
                block_positioning += 1;
                stats.max_positioning_per_block =
                    stats.max_positioning_per_block.max(block_positioning);
            }
            "Tr" => {
                let new_mode = last_number(&operands).map(|n| n as i64).unwrap_or(0);
                if render_mode == 3 && new_mode != 3 && !invisible_run.is_empty() {
                    stats.invisible_text_runs.push(std::mem::take(&mut invisible_run));
                }
                render_mode = new_mode;
            }
            "Tj" | "'" | "\"" | "TJ" => {
                if render_mode == 3 {
                    for operand in &operands {
                        match operand {
                            ContentToken::String(bytes) | ContentToken::HexString(bytes) => {
                                invisible_run.extend_from_slice(bytes);
                            }
                            _ => {}
                        }
                    }
                }
            }
            "q" => gs_stack.push(gs),
            "Q" => gs = gs_stack.pop().unwrap_or(gs),
            "rg" => {
                let components = last_numbers(&operands, 3);
                gs.fill_is_white =
                    components.len() == 3 && components.iter().all(|&c| c >= 0.999);
            }
            "g" => {
                gs.fill_is_white = last_number(&operands).map(|v| v >= 0.999).unwrap_or(false);
            }
            // Any other fill-color change leaves white.
            "k" | "sc" | "scn" | "cs" => gs.fill_is_white = false,
            "BI" => tokenizer.skip_inline_image(),
            _ => {}
        }

        if DRAWING_OPERATORS.contains(&op.as_str()) {
            stats.drawing_ops += 1;
            if op == "re" && gs.fill_is_white {
                stats.white_rectangles += 1;
            }
        }

        operands.clear();
    }

    if !invisible_run.is_empty() {
        stats.invisible_text_runs.push(invisible_run);
    }
    stats
}

fn last_number(operands: &[ContentToken]) -> Option<f64> {
    operands.iter().rev().find_map(|t| match t {
        ContentToken::Number(n) => Some(*n),
        _ => None,
    })
}

fn last_numbers(operands: &[ContentToken], count: usize) -> Vec<f64> {
    let mut numbers: Vec<f64> = operands
        .iter()
        .filter_map(|t| match t {
            ContentToken::Number(n) => Some(*n),
            _ => None,
        })
        .collect();
    if numbers.len() > count {
        numbers.drain(..numbers.len() - count);
    }
    numbers
}

/// Token types in content streams.
#[derive(Debug, Clone, PartialEq)]
enum ContentToken {
    Number(f64),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(String),
    Operator(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
}

/// Content stream tokenizer. Malformed constructs are skipped byte-wise:
/// a content stream is evidence to sift, not a grammar to enforce.
struct ContentTokenizer<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> ContentTokenizer<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    fn next_token(&mut self) -> Option<ContentToken> {
        loop {
            self.skip_whitespace_and_comments();
            let b = *self.input.get(self.position)?;

            let token = match b {
                b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
                b'(' => self.read_string(),
                b'<' => {
                    if self.input.get(self.position + 1) == Some(&b'<') {
                        self.position += 2;
                        Some(ContentToken::DictStart)
                    } else {
                        self.read_hex_string()
                    }
                }
                b'>' => {
                    if self.input.get(self.position + 1) == Some(&b'>') {
                        self.position += 2;
                        Some(ContentToken::DictEnd)
                    } else {
                        self.position += 1;
                        continue;
                    }
                }
                b'[' => {
                    self.position += 1;
                    Some(ContentToken::ArrayStart)
                }
                b']' => {
                    self.position += 1;
                    Some(ContentToken::ArrayEnd)
                }
                b'/' => self.read_name(),
                b')' | b'{' | b'}' => {
                    self.position += 1;
                    continue;
                }
                _ => self.read_operator(),
            };

            match token {
                Some(token) => return Some(token),
                // Unreadable construct: drop one byte and keep going.
                None => self.position += 1,
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&b) = self.input.get(self.position) {
            if is_pdf_whitespace(b) {
                self.position += 1;
            } else if b == b'%' {
                while let Some(&c) = self.input.get(self.position) {
                    if c == b'\r' || c == b'\n' {
                        break;
                    }
                    self.position += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Option<ContentToken> {
        let start = self.position;
        if matches!(self.input.get(self.position), Some(b'+') | Some(b'-')) {
            self.position += 1;
        }
        while let Some(&b) = self.input.get(self.position) {
            if b.is_ascii_digit() || b == b'.' {
                self.position += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.position]).ok()?;
        let normalized = if text.starts_with('.') {
            format!("0{text}")
        } else {
            text.to_string()
        };
        normalized.parse().ok().map(ContentToken::Number)
    }

    fn read_string(&mut self) -> Option<ContentToken> {
        self.position += 1; // consume '('
        let mut bytes = Vec::new();
        let mut depth = 1usize;
        while let Some(&b) = self.input.get(self.position) {
            self.position += 1;
            match b {
                b'(' => {
                    depth += 1;
                    bytes.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(ContentToken::String(bytes));
                    }
                    bytes.push(b);
                }
                b'\\' => {
                    let esc = *self.input.get(self.position)?;
                    self.position += 1;
                    match esc {
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0c),
                        b'0'..=b'7' => {
                            let mut value = (esc - b'0') as u32;
                            for _ in 0..2 {
                                match self.input.get(self.position) {
                                    Some(&d @ b'0'..=b'7') => {
                                        value = value * 8 + (d - b'0') as u32;
                                        self.position += 1;
                                    }
                                    _ => break,
                                }
                            }
                            bytes.push((value & 0xff) as u8);
                        }
                        other => bytes.push(other),
                    }
                }
                other => bytes.push(other),
            }
        }
        // Unterminated string: surface what was collected.
        Some(ContentToken::String(bytes))
    }

    fn read_hex_string(&mut self) -> Option<ContentToken> {
        self.position += 1; // consume '<'
        let mut digits = Vec::new();
        while let Some(&b) = self.input.get(self.position) {
            self.position += 1;
            match b {
                b'>' => break,
                b if is_pdf_whitespace(b) => {}
                b => digits.push((b as char).to_digit(16)? as u8),
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        Some(ContentToken::HexString(
            digits.chunks(2).map(|p| p[0] * 16 + p[1]).collect(),
        ))
    }

    fn read_name(&mut self) -> Option<ContentToken> {
        self.position += 1; // consume '/'
        let start = self.position;
        while let Some(&b) = self.input.get(self.position) {
            if is_pdf_whitespace(b) || is_pdf_delimiter(b) {
                break;
            }
            self.position += 1;
        }
        Some(ContentToken::Name(
            String::from_utf8_lossy(&self.input[start..self.position]).into_owned(),
        ))
    }

    fn read_operator(&mut self) -> Option<ContentToken> {
        let start = self.position;
        while let Some(&b) = self.input.get(self.position) {
            if is_pdf_whitespace(b) || is_pdf_delimiter(b) {
                break;
            }
            self.position += 1;
        }
        if self.position == start {
            return None;
        }
        Some(ContentToken::Operator(
            String::from_utf8_lossy(&self.input[start..self.position]).into_owned(),
        ))
    }

    /// Skip an inline image: scan for a whitespace-delimited `EI`.
    fn skip_inline_image(&mut self) {
        let mut i = self.position;
        while i + 2 <= self.input.len() {
            if &self.input[i..i + 2] == b"EI"
                && (i == 0 || is_pdf_whitespace(self.input[i - 1]))
                && self
                    .input
                    .get(i + 2)
                    .map(|&b| is_pdf_whitespace(b))
                    .unwrap_or(true)
            {
                self.position = i + 2;
                return;
            }
            i += 1;
        }
        self.position = self.input.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_content() {
        let stats = analyze_content(b"");
        assert_eq!(stats.drawing_ops, 0);
        assert_eq!(stats.white_rectangles, 0);
        assert!(stats.invisible_text_runs.is_empty());
    }

    #[test]
    fn test_positioning_counts_per_block() {
        let content = b"BT 1 0 0 1 10 10 Tm 5 5 Td T* ET BT 1 1 Td ET";
        let stats = analyze_content(content);
        assert_eq!(stats.text_positioning_total, 4);
        assert_eq!(stats.max_positioning_per_block, 3);
    }

    #[test]
    fn test_white_rectangle_detected() {
        let content = b"q 1 1 1 rg 100 200 50 30 re f Q";
        let stats = analyze_content(content);
        assert_eq!(stats.white_rectangles, 1);
        // re + f
        assert_eq!(stats.drawing_ops, 2);
    }

    #[test]
    fn test_white_rectangle_via_gray() {
        let stats = analyze_content(b"1 g 0 0 10 10 re f");
        assert_eq!(stats.white_rectangles, 1);
    }

    #[test]
    fn test_nonwhite_rectangle_not_counted() {
        let stats = analyze_content(b"1 0 0 rg 0 0 10 10 re f");
        assert_eq!(stats.white_rectangles, 0);
        assert_eq!(stats.drawing_ops, 2);
    }

    #[test]
    fn test_q_restores_fill_color() {
        // White set inside q/Q; after Q the outer (non-white) fill returns.
        let stats = analyze_content(b"0 g q 1 1 1 rg Q 0 0 10 10 re f");
        assert_eq!(stats.white_rectangles, 0);
    }

    #[test]
    fn test_invisible_text_captured() {
        let content = b"BT 3 Tr (hidden) Tj ( words) Tj 0 Tr (visible) Tj ET";
        let stats = analyze_content(content);
        assert_eq!(stats.invisible_text_runs.len(), 1);
        assert_eq!(stats.invisible_text_runs[0], b"hidden words");
    }

    #[test]
    fn test_invisible_text_run_open_at_end() {
        let stats = analyze_content(b"BT 3 Tr (never closed) Tj ET");
        assert_eq!(stats.invisible_text_runs.len(), 1);
        assert_eq!(stats.invisible_text_runs[0], b"never closed");
    }

    #[test]
    fn test_invisible_tj_array() {
        let content = b"BT 3 Tr [(a) -20 (b)] TJ ET";
        let stats = analyze_content(content);
        assert_eq!(stats.invisible_text_runs[0], b"ab");
    }

    #[test]
    fn test_drawing_operator_census() {
        let content = b"0 0 m 10 10 l 1 2 3 4 5 6 c h S 0 0 5 5 re f";
        let stats = analyze_content(content);
        assert_eq!(stats.drawing_ops, 7);
    }

    #[test]
    fn test_inline_image_skipped() {
        // The binary payload contains bytes that would confuse the
        // tokenizer if not skipped.
        let content = b"BI /W 2 /H 2 ID \x00\xff(\x01 EI 0 0 5 5 re f";
        let stats = analyze_content(content);
        assert_eq!(stats.drawing_ops, 2);
    }

    #[test]
    fn test_operators_after_garbage() {
        let stats = analyze_content(b")))@#$ }} 0 0 5 5 re f");
        assert_eq!(stats.drawing_ops, 2);
    }
}
