//! Stream filter decoding.
//!
//! Supports the standard non-image filters: FlateDecode (with PNG and TIFF
//! predictors), ASCIIHexDecode, ASCII85Decode, LZWDecode, and
//! RunLengthDecode. Image codecs (DCTDecode, JPXDecode, ...) are not
//! decoded: the analyzer inspects those streams at the byte level.
//!
//! Every decode is bounded: output larger than the caller's limit aborts
//! with [`ParseError::StreamTooLarge`] instead of inflating a decompression
//! bomb into memory.

use super::objects::{PdfDictionary, PdfObject, PdfStream};
use super::{ParseError, ParseResult};
use std::io::Read;

/// Decode `stream` through its declared `/Filter` chain.
///
/// A stream with no `/Filter` is returned as-is (still subject to the size
/// bound). Filter names may be a single name or an array; `/DecodeParms`
/// aligns with the chain positionally.
pub fn decode_stream(stream: &PdfStream, max_size: usize) -> ParseResult<Vec<u8>> {
    let chain = filter_chain(&stream.dict);

    let mut data = stream.data.clone();
    if data.len() > max_size {
        return Err(ParseError::StreamTooLarge {
            actual: data.len(),
            limit: max_size,
        });
    }

    for (name, parms) in chain {
        data = apply_filter(&name, &data, parms.as_ref(), max_size)?;
        if data.len() > max_size {
            return Err(ParseError::StreamTooLarge {
                actual: data.len(),
                limit: max_size,
            });
        }
    }
    Ok(data)
}

/// The declared filter chain with per-filter decode parameters.
pub fn filter_chain(dict: &PdfDictionary) -> Vec<(String, Option<PdfDictionary>)> {
    let names: Vec<String> = match dict.get("Filter") {
        Some(PdfObject::Name(n)) => vec![n.as_str().to_string()],
        Some(PdfObject::Array(a)) => a
            .iter()
            .filter_map(|o| o.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let parms: Vec<Option<PdfDictionary>> = match dict.get("DecodeParms").or_else(|| dict.get("DP")) {
        Some(PdfObject::Dictionary(d)) => vec![Some(d.clone())],
        Some(PdfObject::Array(a)) => a
            .iter()
            .map(|o| o.as_dict().cloned())
            .collect(),
        _ => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, parms.get(i).cloned().flatten()))
        .collect()
}

fn apply_filter(
    name: &str,
    data: &[u8],
    parms: Option<&PdfDictionary>,
    max_size: usize,
) -> ParseResult<Vec<u8>> {
    match name {
        "FlateDecode" | "Fl" => {
            let inflated = flate_decode(data, max_size)?;
            apply_predictor(inflated, parms)
        }
        "LZWDecode" | "LZW" => {
            let expanded = lzw_decode(data, parms)?;
            apply_predictor(expanded, parms)
        }
        "ASCIIHexDecode" | "AHx" => ascii_hex_decode(data),
        "ASCII85Decode" | "A85" => ascii85_decode(data),
        "RunLengthDecode" | "RL" => run_length_decode(data),
        other => Err(ParseError::StreamDecode(format!(
            "unsupported filter /{other}"
        ))),
    }
}

fn flate_decode(data: &[u8], max_size: usize) -> ParseResult<Vec<u8>> {
    let mut out = Vec::new();
    match flate2::read::ZlibDecoder::new(data)
        .take(max_size as u64 + 1)
        .read_to_end(&mut out)
    {
        Ok(_) => Ok(out),
        Err(zlib_err) => {
            // Some producers emit raw deflate with no zlib wrapper.
            let mut raw = Vec::new();
            match flate2::read::DeflateDecoder::new(data)
                .take(max_size as u64 + 1)
                .read_to_end(&mut raw)
            {
                Ok(_) => Ok(raw),
                // Keep whatever the zlib pass managed to inflate.
                Err(_) if !out.is_empty() => Ok(out),
                Err(_) => Err(ParseError::StreamDecode(format!("flate: {zlib_err}"))),
            }
        }
    }
}

fn lzw_decode(data: &[u8], parms: Option<&PdfDictionary>) -> ParseResult<Vec<u8>> {
    let early_change = parms
        .and_then(|p| p.get("EarlyChange"))
        .and_then(PdfObject::as_integer)
        .unwrap_or(1);

    let mut decoder = if early_change != 0 {
        weezl::decode::Decoder::with_tiff_size_switch(weezl::BitOrder::Msb, 8)
    } else {
        weezl::decode::Decoder::new(weezl::BitOrder::Msb, 8)
    };
    decoder
        .decode(data)
        .map_err(|e| ParseError::StreamDecode(format!("lzw: {e}")))
}

fn ascii_hex_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut digits = Vec::new();
    for &b in data {
        match b {
            b'>' => break,
            b if b.is_ascii_whitespace() || b == 0 => continue,
            b => match (b as char).to_digit(16) {
                Some(d) => digits.push(d as u8),
                None => {
                    return Err(ParseError::StreamDecode(format!(
                        "ASCIIHex: invalid digit {:?}",
                        b as char
                    )))
                }
            },
        }
    }
    if digits.len() % 2 == 1 {
        digits.push(0);
    }
    Ok(digits.chunks(2).map(|pair| pair[0] * 16 + pair[1]).collect())
}

fn ascii85_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut group = [0u8; 5];
    let mut count = 0usize;
    let mut iter = data.iter().copied().peekable();

    while let Some(b) = iter.next() {
        match b {
            b'~' => break,
            b'z' if count == 0 => out.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[count] = b - b'!';
                count += 1;
                if count == 5 {
                    let value = group.iter().fold(0u32, |acc, &d| {
                        acc.wrapping_mul(85).wrapping_add(d as u32)
                    });
                    out.extend_from_slice(&value.to_be_bytes());
                    count = 0;
                }
            }
            b if b.is_ascii_whitespace() || b == 0 => continue,
            other => {
                return Err(ParseError::StreamDecode(format!(
                    "ASCII85: invalid byte 0x{other:02x}"
                )))
            }
        }
    }

    // A trailing partial group of n digits yields n-1 bytes.
    if count == 1 {
        return Err(ParseError::StreamDecode(
            "ASCII85: single trailing digit".to_string(),
        ));
    }
    if count > 1 {
        for slot in group.iter_mut().skip(count) {
            *slot = 84; // pad with 'u'
        }
        let value = group
            .iter()
            .fold(0u32, |acc, &d| acc.wrapping_mul(85).wrapping_add(d as u32));
        out.extend_from_slice(&value.to_be_bytes()[..count - 1]);
    }
    Ok(out)
}

fn run_length_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break, // EOD
            0..=127 => {
                let n = length as usize + 1;
                if i + n > data.len() {
                    return Err(ParseError::StreamDecode(
                        "RunLength: literal run past end of data".to_string(),
                    ));
                }
                out.extend_from_slice(&data[i..i + n]);
                i += n;
            }
            129..=255 => {
                let n = 257 - length as usize;
                let b = *data.get(i).ok_or_else(|| {
                    ParseError::StreamDecode("RunLength: repeat run past end of data".to_string())
                })?;
                i += 1;
                out.extend(std::iter::repeat(b).take(n));
            }
        }
    }
    Ok(out)
}

/// Undo a `/Predictor` transform declared in DecodeParms.
fn apply_predictor(data: Vec<u8>, parms: Option<&PdfDictionary>) -> ParseResult<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let predictor = parms
        .get("Predictor")
        .and_then(PdfObject::as_integer)
        .unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }

    let colors = parms
        .get("Colors")
        .and_then(PdfObject::as_integer)
        .unwrap_or(1)
        .max(1) as usize;
    let bpc = parms
        .get("BitsPerComponent")
        .and_then(PdfObject::as_integer)
        .unwrap_or(8)
        .max(1) as usize;
    let columns = parms
        .get("Columns")
        .and_then(PdfObject::as_integer)
        .unwrap_or(1)
        .max(1) as usize;

    let bytes_per_pixel = (colors * bpc).div_ceil(8).max(1);
    let row_len = (colors * bpc * columns).div_ceil(8);

    if predictor == 2 {
        return tiff_predictor(data, bytes_per_pixel, row_len);
    }
    png_predictor(data, bytes_per_pixel, row_len)
}

fn tiff_predictor(
    mut data: Vec<u8>,
    bytes_per_pixel: usize,
    row_len: usize,
) -> ParseResult<Vec<u8>> {
    for row in data.chunks_mut(row_len) {
        for i in bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
        }
    }
    Ok(data)
}

fn png_predictor(data: Vec<u8>, bytes_per_pixel: usize, row_len: usize) -> ParseResult<Vec<u8>> {
    // Each row is prefixed with one predictor tag byte.
    let stride = row_len + 1;
    if stride == 1 || data.len() % stride != 0 {
        return Err(ParseError::StreamDecode(format!(
            "predictor: data length {} not a multiple of row stride {}",
            data.len(),
            stride
        )));
    }

    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(stride) {
        let tag = chunk[0];
        let mut row = chunk[1..].to_vec();

        match tag {
            0 => {}
            1 => {
                for i in bytes_per_pixel..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
                }
            }
            2 => {
                for i in 0..row.len() {
                    row[i] = row[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row.len() {
                    let left = if i >= bytes_per_pixel {
                        row[i - bytes_per_pixel] as u16
                    } else {
                        0
                    };
                    let up = prev_row[i] as u16;
                    row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row.len() {
                    let left = if i >= bytes_per_pixel {
                        row[i - bytes_per_pixel] as i16
                    } else {
                        0
                    };
                    let up = prev_row[i] as i16;
                    let up_left = if i >= bytes_per_pixel {
                        prev_row[i - bytes_per_pixel] as i16
                    } else {
                        0
                    };
                    let p = left + up - up_left;
                    let pa = (p - left).abs();
                    let pb = (p - up).abs();
                    let pc = (p - up_left).abs();
                    let predicted = if pa <= pb && pa <= pc {
                        left
                    } else if pb <= pc {
                        up
                    } else {
                        up_left
                    };
                    row[i] = row[i].wrapping_add(predicted as u8);
                }
            }
            other => {
                return Err(ParseError::StreamDecode(format!(
                    "predictor: unknown PNG filter tag {other}"
                )))
            }
        }

        out.extend_from_slice(&row);
        prev_row = row;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::objects::{PdfName, PdfStream};
    use std::io::Write;

    fn stream_with_filter(data: Vec<u8>, filter: &str) -> PdfStream {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfObject::Name(PdfName::new(filter)));
        dict.insert("Length", PdfObject::Integer(data.len() as i64));
        PdfStream { dict, data }
    }

    fn deflate(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_no_filter_passthrough() {
        let stream = PdfStream {
            dict: PdfDictionary::new(),
            data: b"plain".to_vec(),
        };
        assert_eq!(decode_stream(&stream, 1024).unwrap(), b"plain");
    }

    #[test]
    fn test_flate_roundtrip() {
        let stream = stream_with_filter(deflate(b"BT /F1 12 Tf ET"), "FlateDecode");
        assert_eq!(decode_stream(&stream, 1024).unwrap(), b"BT /F1 12 Tf ET");
    }

    #[test]
    fn test_flate_size_bound() {
        let big = vec![b'x'; 4096];
        let stream = stream_with_filter(deflate(&big), "FlateDecode");
        assert!(matches!(
            decode_stream(&stream, 1024),
            Err(ParseError::StreamTooLarge { .. })
        ));
    }

    #[test]
    fn test_ascii_hex() {
        let stream = stream_with_filter(b"48 65 6C 6C 6F>".to_vec(), "ASCIIHexDecode");
        assert_eq!(decode_stream(&stream, 1024).unwrap(), b"Hello");
    }

    #[test]
    fn test_ascii_hex_odd_digits() {
        assert_eq!(ascii_hex_decode(b"414>").unwrap(), vec![0x41, 0x40]);
    }

    #[test]
    fn test_ascii85() {
        // "sure." encodes to F*2M7/c
        let stream = stream_with_filter(b"F*2M7/c~>".to_vec(), "ASCII85Decode");
        assert_eq!(decode_stream(&stream, 1024).unwrap(), b"sure.");
    }

    #[test]
    fn test_ascii85_z_shortcut() {
        assert_eq!(ascii85_decode(b"z~>").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_run_length() {
        // literal "ab", then 'c' repeated 3 times, then EOD
        let encoded = vec![1, b'a', b'b', 254, b'c', 128];
        assert_eq!(run_length_decode(&encoded).unwrap(), b"abccc");
    }

    #[test]
    fn test_filter_chain_array() {
        let mut dict = PdfDictionary::new();
        dict.insert(
            "Filter",
            PdfObject::Array(crate::parser::objects::PdfArray(vec![
                PdfObject::Name(PdfName::new("ASCIIHexDecode")),
                PdfObject::Name(PdfName::new("FlateDecode")),
            ])),
        );
        let chain = filter_chain(&dict);
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].0, "ASCIIHexDecode");
        assert_eq!(chain[1].0, "FlateDecode");
    }

    #[test]
    fn test_unsupported_filter() {
        let stream = stream_with_filter(vec![0xff, 0xd8], "DCTDecode");
        assert!(matches!(
            decode_stream(&stream, 1024),
            Err(ParseError::StreamDecode(_))
        ));
    }

    #[test]
    fn test_png_up_predictor() {
        // Two rows of 3 bytes, Up predictor (tag 2).
        let raw = vec![2, 1, 1, 1, 2, 1, 1, 1];
        let mut parms = PdfDictionary::new();
        parms.insert("Predictor", PdfObject::Integer(12));
        parms.insert("Columns", PdfObject::Integer(3));
        let out = apply_predictor(raw, Some(&parms)).unwrap();
        assert_eq!(out, vec![1, 1, 1, 2, 2, 2]);
    }
}
