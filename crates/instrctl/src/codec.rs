//! Binary-block framing and value packing
//!
//! Implements the IEEE-488.2 `#<d><L>` and HP `#A<lo><hi>` block headers,
//! fixed-width value packing with caller-chosen endianness, and
//! ASCII-delimited value streams. The decoder tolerates a bounded number of
//! leading bytes before the `#` sentinel and never silently truncates.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum number of bytes scanned for the `#` sentinel by default.
pub const DEFAULT_HEADER_SCAN_WINDOW: usize = 25;

/// Default separator for ASCII value streams.
pub const DEFAULT_ASCII_SEPARATOR: &str = ",";

/// Block header style used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderFormat {
    /// IEEE-488.2 `#<d><L>`; `#0` is indefinite-length.
    #[default]
    Ieee,
    /// HP `#A` followed by two little-endian length bytes.
    Hp,
    /// No header; the whole stream is payload.
    Empty,
}

/// Byte order for fixed-width values. Little-endian unless the caller says
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Decoded block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Offset of the first payload byte within the scanned buffer.
    pub payload_offset: usize,
    /// Declared payload length; `None` for indefinite-length (`#0`)
    /// blocks, where the caller's stop condition bounds the payload.
    pub payload_length: Option<usize>,
}

impl BlockHeader {
    /// Declared length as reported to callers: the byte count, or -1 for
    /// indefinite-length blocks.
    pub fn data_length(&self) -> i64 {
        match self.payload_length {
            Some(len) => len as i64,
            None => -1,
        }
    }
}

fn protocol(reason: impl Into<String>) -> Error {
    Error::Protocol {
        reason: reason.into(),
    }
}

fn find_sentinel(data: &[u8], scan_window: usize) -> Result<usize> {
    let window = scan_window.min(data.len());
    data[..window].iter().position(|&b| b == b'#').ok_or_else(|| {
        protocol(format!(
            "block header sentinel '#' not found within the first {scan_window} bytes"
        ))
    })
}

/// Decode an IEEE-488.2 block header, scanning up to `scan_window` bytes
/// for the `#` sentinel.
pub fn parse_ieee_header(data: &[u8], scan_window: usize) -> Result<BlockHeader> {
    let start = find_sentinel(data, scan_window)?;
    let digit = *data
        .get(start + 1)
        .ok_or_else(|| protocol("truncated IEEE block header"))?;
    if !digit.is_ascii_digit() {
        return Err(protocol(format!(
            "invalid IEEE length-of-length digit {:?}",
            char::from(digit)
        )));
    }
    let width = usize::from(digit - b'0');
    if width == 0 {
        // Indefinite-length block; payload runs to the caller's stop
        // condition.
        return Ok(BlockHeader {
            payload_offset: start + 2,
            payload_length: None,
        });
    }
    let length_field = data
        .get(start + 2..start + 2 + width)
        .ok_or_else(|| protocol("truncated IEEE block length field"))?;
    let mut length: u64 = 0;
    for &b in length_field {
        if !b.is_ascii_digit() {
            return Err(protocol("non-digit in IEEE block length field"));
        }
        length = length
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| protocol("IEEE block length overflows"))?;
    }
    let length = usize::try_from(length).map_err(|_| protocol("IEEE block length overflows"))?;
    Ok(BlockHeader {
        payload_offset: start + 2 + width,
        payload_length: Some(length),
    })
}

/// Decode an HP block header (`#A` + two little-endian length bytes).
pub fn parse_hp_header(data: &[u8], scan_window: usize) -> Result<BlockHeader> {
    let start = find_sentinel(data, scan_window)?;
    let marker = *data
        .get(start + 1)
        .ok_or_else(|| protocol("truncated HP block header"))?;
    if marker != b'A' && marker != b'a' {
        return Err(protocol(format!(
            "expected 'A' after '#' in HP block header, found {:?}",
            char::from(marker)
        )));
    }
    let length_bytes = data
        .get(start + 2..start + 4)
        .ok_or_else(|| protocol("bad HP length bytes"))?;
    let length = usize::from(u16::from_le_bytes([length_bytes[0], length_bytes[1]]));
    Ok(BlockHeader {
        payload_offset: start + 4,
        payload_length: Some(length),
    })
}

/// Encode an IEEE-488.2 definite-length header for `len` payload bytes.
/// The length field is at most nine digits wide, which bounds a single
/// definite block at 999 999 999 bytes.
pub fn ieee_header(len: usize) -> Result<Vec<u8>> {
    let digits = len.to_string();
    if digits.len() > 9 {
        return Err(protocol(format!(
            "payload of {len} bytes does not fit a definite-length IEEE block"
        )));
    }
    let mut header = Vec::with_capacity(2 + digits.len());
    header.push(b'#');
    header.push(b'0' + digits.len() as u8);
    header.extend_from_slice(digits.as_bytes());
    Ok(header)
}

/// Encode an HP header for `len` payload bytes. Fails when the length does
/// not fit the two-byte field.
pub fn hp_header(len: usize) -> Result<Vec<u8>> {
    let short = u16::try_from(len)
        .map_err(|_| protocol(format!("payload of {len} bytes does not fit an HP block")))?;
    let mut header = Vec::with_capacity(4);
    header.push(b'#');
    header.push(b'A');
    header.extend_from_slice(&short.to_le_bytes());
    Ok(header)
}

/// Fixed-width element of a binary block.
pub trait BinaryValue: Copy {
    const SIZE: usize;
    fn write_bytes(self, order: ByteOrder, out: &mut Vec<u8>);
    /// `bytes` is exactly `SIZE` long.
    fn read_bytes(bytes: &[u8], order: ByteOrder) -> Self;
}

macro_rules! binary_value {
    ($($ty:ty),*) => {
        $(
            impl BinaryValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn write_bytes(self, order: ByteOrder, out: &mut Vec<u8>) {
                    match order {
                        ByteOrder::Little => out.extend_from_slice(&self.to_le_bytes()),
                        ByteOrder::Big => out.extend_from_slice(&self.to_be_bytes()),
                    }
                }

                fn read_bytes(bytes: &[u8], order: ByteOrder) -> Self {
                    let arr = bytes.try_into().expect("caller sized the slice");
                    match order {
                        ByteOrder::Little => <$ty>::from_le_bytes(arr),
                        ByteOrder::Big => <$ty>::from_be_bytes(arr),
                    }
                }
            }
        )*
    };
}

binary_value!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

/// Pack a value sequence into raw payload bytes.
pub fn encode_values<T: BinaryValue>(values: &[T], order: ByteOrder) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::SIZE);
    for &value in values {
        value.write_bytes(order, &mut out);
    }
    out
}

/// Unpack payload bytes into the declared element sequence. The payload
/// must be a whole number of elements.
pub fn decode_values<T: BinaryValue>(payload: &[u8], order: ByteOrder) -> Result<Vec<T>> {
    if payload.len() % T::SIZE != 0 {
        return Err(protocol(format!(
            "payload of {} bytes is not a multiple of the {}-byte element size",
            payload.len(),
            T::SIZE
        )));
    }
    Ok(payload
        .chunks_exact(T::SIZE)
        .map(|chunk| T::read_bytes(chunk, order))
        .collect())
}

/// Frame values as a definite-length IEEE-488.2 block.
pub fn to_ieee_block<T: BinaryValue>(values: &[T], order: ByteOrder) -> Result<Vec<u8>> {
    let payload = encode_values(values, order);
    let mut block = ieee_header(payload.len())?;
    block.extend_from_slice(&payload);
    Ok(block)
}

/// Frame values as an HP block.
pub fn to_hp_block<T: BinaryValue>(values: &[T], order: ByteOrder) -> Result<Vec<u8>> {
    let payload = encode_values(values, order);
    let mut block = hp_header(payload.len())?;
    block.extend_from_slice(&payload);
    Ok(block)
}

/// Decode a definite-length IEEE-488.2 block. For indefinite (`#0`) blocks
/// the remainder of `block` is taken as payload; the caller is responsible
/// for having applied its stop condition.
pub fn from_ieee_block<T: BinaryValue>(
    block: &[u8],
    order: ByteOrder,
    scan_window: usize,
) -> Result<Vec<T>> {
    let header = parse_ieee_header(block, scan_window)?;
    let payload = payload_slice(block, header)?;
    decode_values(payload, order)
}

/// Decode an HP block.
pub fn from_hp_block<T: BinaryValue>(
    block: &[u8],
    order: ByteOrder,
    scan_window: usize,
) -> Result<Vec<T>> {
    let header = parse_hp_header(block, scan_window)?;
    let payload = payload_slice(block, header)?;
    decode_values(payload, order)
}

fn payload_slice(block: &[u8], header: BlockHeader) -> Result<&[u8]> {
    match header.payload_length {
        Some(length) => block
            .get(header.payload_offset..header.payload_offset + length)
            .ok_or_else(|| {
                protocol(format!(
                    "declared block length {} exceeds the {} available payload bytes",
                    length,
                    block.len().saturating_sub(header.payload_offset)
                ))
            }),
        None => Ok(&block[header.payload_offset.min(block.len())..]),
    }
}

/// Encode a length-prefixed ("pascal") byte string.
pub fn encode_prefixed_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let len = u8::try_from(data.len())
        .map_err(|_| protocol("length-prefixed byte string longer than 255 bytes"))?;
    let mut out = Vec::with_capacity(data.len() + 1);
    out.push(len);
    out.extend_from_slice(data);
    Ok(out)
}

/// Decode a length-prefixed byte string.
pub fn decode_prefixed_bytes(payload: &[u8]) -> Result<Vec<u8>> {
    let (&len, rest) = payload
        .split_first()
        .ok_or_else(|| protocol("empty length-prefixed byte string"))?;
    let len = usize::from(len);
    if rest.len() < len {
        return Err(protocol("length-prefixed byte string shorter than declared"));
    }
    Ok(rest[..len].to_vec())
}

/// Parse an ASCII value stream with a per-element converter. A trailing
/// separator is tolerated; empty elements elsewhere are malformed.
pub fn parse_ascii_values_with<T, C, F>(text: &str, separator: &str, convert: F) -> Result<C>
where
    C: FromIterator<T>,
    F: Fn(&str) -> Result<T>,
{
    let tokens: Vec<&str> = text.split(separator).collect();
    let last = tokens.len().saturating_sub(1);
    tokens
        .into_iter()
        .enumerate()
        .filter(|(index, token)| !(*index == last && token.trim().is_empty()))
        .map(|(_, token)| convert(token.trim()))
        .collect()
}

/// Parse an ASCII value stream using `FromStr` for each element.
pub fn parse_ascii_values<T, C>(text: &str, separator: &str) -> Result<C>
where
    T: FromStr,
    C: FromIterator<T>,
{
    parse_ascii_values_with(text, separator, |token| {
        token
            .parse()
            .map_err(|_| protocol(format!("cannot convert ASCII value {token:?}")))
    })
}

/// Render values as an ASCII stream with a custom per-element formatter.
pub fn format_ascii_values_with<T, F>(values: &[T], separator: &str, format: F) -> String
where
    F: Fn(&T) -> String,
{
    values
        .iter()
        .map(format)
        .collect::<Vec<_>>()
        .join(separator)
}

/// Render values as an ASCII stream with their `Display` form.
pub fn format_ascii_values<T: Display>(values: &[T], separator: &str) -> String {
    format_ascii_values_with(values, separator, T::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee_definite_decode_literal() {
        // "#18ABCDEFGH\n": single length digit, eight payload bytes, then
        // the terminator left for the I/O layer.
        let header = parse_ieee_header(b"#18ABCDEFGH\n", DEFAULT_HEADER_SCAN_WINDOW).unwrap();
        assert_eq!(header.payload_offset, 3);
        assert_eq!(header.payload_length, Some(8));
        assert_eq!(header.data_length(), 8);
        let payload: Vec<u8> = from_ieee_block(b"#18ABCDEFGH", ByteOrder::Little, 25).unwrap();
        assert_eq!(payload, b"ABCDEFGH");
    }

    #[test]
    fn test_ieee_indefinite_decode_literal() {
        let header = parse_ieee_header(b"#0payload\n", DEFAULT_HEADER_SCAN_WINDOW).unwrap();
        assert_eq!(header.payload_offset, 2);
        assert_eq!(header.payload_length, None);
        assert_eq!(header.data_length(), -1);
        // The caller strips its termination before handing the block over.
        let payload: Vec<u8> = from_ieee_block(b"#0payload", ByteOrder::Little, 25).unwrap();
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_ieee_zero_length_round_trip() {
        let block = to_ieee_block::<u8>(&[], ByteOrder::Little).unwrap();
        assert_eq!(block, b"#10");
        let decoded: Vec<u8> = from_ieee_block(&block, ByteOrder::Little, 25).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_ieee_maximum_length_header() {
        // The widest legal length field is nine digits; exercise the
        // header path without materializing the payload.
        let len: usize = 999_999_999;
        let header_bytes = ieee_header(len).unwrap();
        assert_eq!(header_bytes, b"#9999999999".to_vec());
        let header = parse_ieee_header(&header_bytes, DEFAULT_HEADER_SCAN_WINDOW).unwrap();
        assert_eq!(header.payload_length, Some(len));

        // One digit more does not fit the single-digit width field.
        assert!(ieee_header(1_000_000_000).is_err());
    }

    #[test]
    fn test_header_scan_window() {
        let mut stream = vec![b' '; 24];
        stream.extend_from_slice(b"#13abc");
        // Sentinel at position 24 is still inside the default window.
        let header = parse_ieee_header(&stream, DEFAULT_HEADER_SCAN_WINDOW).unwrap();
        assert_eq!(header.payload_length, Some(3));

        let mut stream = vec![b' '; 25];
        stream.extend_from_slice(b"#13abc");
        let err = parse_ieee_header(&stream, DEFAULT_HEADER_SCAN_WINDOW).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));

        // Position 0 works with a window of one byte.
        assert!(parse_ieee_header(b"#10", 1).is_ok());
    }

    #[test]
    fn test_hp_round_trip() {
        let values: Vec<i16> = vec![-5, 0, 1000, i16::MAX];
        let block = to_hp_block(&values, ByteOrder::Big).unwrap();
        assert_eq!(&block[..2], b"#A");
        assert_eq!(u16::from_le_bytes([block[2], block[3]]), 8);
        let decoded: Vec<i16> = from_hp_block(&block, ByteOrder::Big, 25).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_hp_rejects_oversize_payload() {
        let values = vec![0u8; 0x1_0000];
        assert!(to_hp_block(&values, ByteOrder::Little).is_err());
    }

    #[test]
    fn test_declared_length_mismatch() {
        let err = from_ieee_block::<u8>(b"#1800AB", ByteOrder::Little, 25).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_value_endianness() {
        let block = to_ieee_block(&[0x0102_0304u32], ByteOrder::Big).unwrap();
        assert_eq!(&block[3..], &[1, 2, 3, 4]);
        let block = to_ieee_block(&[0x0102_0304u32], ByteOrder::Little).unwrap();
        assert_eq!(&block[3..], &[4, 3, 2, 1]);
    }

    #[test]
    fn test_decode_partial_element_fails() {
        let err = decode_values::<u32>(&[1, 2, 3], ByteOrder::Little).unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_float_round_trip() {
        let values = vec![-4e-4f64, 5.5, f64::MIN_POSITIVE];
        let block = to_ieee_block(&values, ByteOrder::Little).unwrap();
        let decoded: Vec<f64> = from_ieee_block(&block, ByteOrder::Little, 25).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_prefixed_bytes() {
        let encoded = encode_prefixed_bytes(b"abc").unwrap();
        assert_eq!(encoded, vec![3, b'a', b'b', b'c']);
        assert_eq!(decode_prefixed_bytes(&encoded).unwrap(), b"abc");
        assert!(encode_prefixed_bytes(&[0; 256]).is_err());
        assert!(decode_prefixed_bytes(&[5, 1]).is_err());
    }

    #[test]
    fn test_ascii_values_literal_response() {
        let response = "-000.0004E+0,-000.0005E+0,-000.0004E+0";
        let values: Vec<f64> = parse_ascii_values(response, ",").unwrap();
        assert_eq!(values, vec![-4e-4, -5e-4, -4e-4]);

        // Writing the same list in scientific notation yields a stream that
        // parses back to the same values.
        let written = format_ascii_values_with(&values, ",", |v| format!("{v:E}"));
        let reparsed: Vec<f64> = parse_ascii_values(&written, ",").unwrap();
        assert_eq!(reparsed, values);
    }

    #[test]
    fn test_ascii_trailing_separator_tolerated() {
        let values: Vec<i32> = parse_ascii_values("1,2,3,", ",").unwrap();
        assert_eq!(values, vec![1, 2, 3]);
        // Empty element in the middle stays an error.
        assert!(parse_ascii_values::<i32, Vec<i32>>("1,,3", ",").is_err());
    }

    #[test]
    fn test_ascii_custom_separator_and_converter() {
        let values: Vec<u32> =
            parse_ascii_values_with("0a; 14; ff", ";", |t| {
                u32::from_str_radix(t, 16).map_err(|_| Error::Protocol {
                    reason: format!("bad hex {t:?}"),
                })
            })
            .unwrap();
        assert_eq!(values, vec![0x0A, 0x14, 0xFF]);
    }

    #[test]
    fn test_format_ascii_display() {
        assert_eq!(format_ascii_values(&[1, 2, 3], ","), "1,2,3");
    }
}

#[cfg(all(test, feature = "property-based-tests"))]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_ieee_block_round_trip(values in proptest::collection::vec(proptest::num::i32::ANY, 0..200)) {
            for order in [ByteOrder::Little, ByteOrder::Big] {
                let block = to_ieee_block(&values, order).unwrap();
                let decoded: Vec<i32> = from_ieee_block(&block, order, DEFAULT_HEADER_SCAN_WINDOW).unwrap();
                prop_assert_eq!(&decoded, &values);
            }
        }

        #[test]
        fn prop_ascii_round_trip(values in proptest::collection::vec(proptest::num::i64::ANY, 0..100)) {
            let text = format_ascii_values(&values, ",");
            if values.is_empty() {
                prop_assert_eq!(text, "");
            } else {
                let reparsed: Vec<i64> = parse_ascii_values(&text, ",").unwrap();
                prop_assert_eq!(reparsed, values);
            }
        }

        #[test]
        fn prop_header_survives_leading_garbage(pad in 0usize..25, len in 0usize..500) {
            let mut stream = vec![b'x'; pad];
            stream.extend_from_slice(&ieee_header(len).unwrap());
            let header = parse_ieee_header(&stream, DEFAULT_HEADER_SCAN_WINDOW).unwrap();
            prop_assert_eq!(header.payload_length, Some(len));
        }
    }
}
