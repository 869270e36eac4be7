//! # Order-Preserving Key Encoding
//!
//! Byte-comparable encoding of [`Value`]s: whenever `a < b`, the encoding
//! of `a` is lexicographically below the encoding of `b`, and equal
//! values encode to adjacent byte strings differing only in the numeric
//! variant tag (identical bytes in the tagless ordering form). This
//! single invariant is what turns range predicates into contiguous
//! key-space scans on both tables and indexes.
//!
//! ## Type Prefix Scheme
//!
//! Every encoding starts with a type prefix byte whose numeric order
//! matches the cross-type order of [`Value`]:
//!
//! ```text
//! 0x05  NULL
//! 0x10  FALSE         0x11  TRUE
//! 0x20  NUMBER        10-byte position, then a one-byte int/float tag
//! 0x30  TEXT          0x00-escaped bytes, 0x00 0x00 terminator
//! 0x35  BLOB          same framing as TEXT
//! 0x40  ARRAY         recursive element encodings, 0x00 terminator
//! 0x45  DOCUMENT      (name, value) encodings, 0x00 terminator
//! ```
//!
//! ## Numbers
//!
//! Integers and floats compare numerically cross-type, so they share one
//! prefix and one 10-byte position: the IEEE 754 bits of the greatest
//! double not above the number (all bits inverted when negative, sign bit
//! set otherwise, which linearizes the total ordering including
//! infinities and NaN), followed by a big-endian `u16` remainder. The
//! remainder is zero for floats and recovers the integers a double cannot
//! represent exactly; doubles are never more than 1024 apart over the i64
//! range, so it always fits. Equal numbers therefore share their position
//! bytes, and a trailing tag byte both breaks the tie deterministically
//! (float below int) and tells the decoder which variant to rebuild.
//!
//! [`encode_value_ordered`] drops the tag. Index entries use that form,
//! collapsing numerically equal values into identical bytes: an equality
//! lookup for `2.0` lands on entries written for integer `2`.
//!
//! Text and blob escape embedded zero bytes (`0x00` -> `0x00 0xFF`) and
//! close with `0x00 0x00`, so a string that is a strict prefix of another
//! sorts first and embedded zeros never truncate the key.
//!
//! ## Composite Keys
//!
//! Multi-field keys concatenate per-field encodings separated by a single
//! `0x00` boundary byte. `0x00` is strictly below every type prefix, so
//! composite ordering is exactly lexicographic-by-field.

use crate::error::{Error, Result};
use crate::types::{int_float_parts, Document, Value, ValueType};

pub mod type_prefix {
    pub const NULL: u8 = 0x05;
    pub const FALSE: u8 = 0x10;
    pub const TRUE: u8 = 0x11;
    pub const NUMBER: u8 = 0x20;
    pub const TEXT: u8 = 0x30;
    pub const BLOB: u8 = 0x35;
    pub const ARRAY: u8 = 0x40;
    pub const DOCUMENT: u8 = 0x45;
}

const NUMBER_TAG_FLOAT: u8 = 0x01;
const NUMBER_TAG_INT: u8 = 0x02;

/// Separator between the fields of a composite key. Strictly less than
/// every type prefix byte.
pub const FIELD_SEPARATOR: u8 = 0x00;

const TERMINATOR: [u8; 2] = [0x00, 0x00];
const ESCAPED_ZERO: [u8; 2] = [0x00, 0xFF];

/// Appends the order-preserving encoding of `value` to `buf`. Numbers
/// carry their variant tag, so the value round-trips exactly.
pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    encode_impl(value, buf, true);
}

/// Appends the tagless ordering form: numerically equal integers and
/// floats produce identical bytes. Not decodable; index entries use it so
/// byte equality is value equality.
pub fn encode_value_ordered(value: &Value, buf: &mut Vec<u8>) {
    encode_impl(value, buf, false);
}

fn encode_impl(value: &Value, buf: &mut Vec<u8>, tagged: bool) {
    match value {
        Value::Null => buf.push(type_prefix::NULL),
        Value::Bool(false) => buf.push(type_prefix::FALSE),
        Value::Bool(true) => buf.push(type_prefix::TRUE),
        Value::Int(i) => {
            let (whole, rem) = int_float_parts(*i);
            encode_number_position(whole, rem, buf);
            if tagged {
                buf.push(NUMBER_TAG_INT);
            }
        }
        Value::Float(f) => {
            encode_number_position(*f, 0, buf);
            if tagged {
                buf.push(NUMBER_TAG_FLOAT);
            }
        }
        Value::Text(s) => {
            buf.push(type_prefix::TEXT);
            encode_escaped(s.as_bytes(), buf);
        }
        Value::Blob(b) => {
            buf.push(type_prefix::BLOB);
            encode_escaped(b, buf);
        }
        Value::Array(items) => {
            buf.push(type_prefix::ARRAY);
            for item in items {
                encode_impl(item, buf, tagged);
            }
            buf.push(0x00);
        }
        Value::Document(doc) => {
            buf.push(type_prefix::DOCUMENT);
            for (name, item) in doc.iter() {
                buf.push(type_prefix::TEXT);
                encode_escaped(name.as_bytes(), buf);
                encode_impl(item, buf, tagged);
            }
            buf.push(0x00);
        }
    }
}

fn encode_number_position(whole: f64, rem: u16, buf: &mut Vec<u8>) {
    buf.push(type_prefix::NUMBER);
    buf.extend_from_slice(&float_to_ordered_bits(whole).to_be_bytes());
    buf.extend_from_slice(&rem.to_be_bytes());
}

/// Encodes a single value as a standalone key.
pub fn encode_single(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    encode_value(value, &mut buf);
    buf
}

/// Encodes a composite key: per-field encodings joined by
/// [`FIELD_SEPARATOR`].
pub fn encode_key(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 16);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            buf.push(FIELD_SEPARATOR);
        }
        encode_value(value, &mut buf);
    }
    buf
}

/// Composite variant of [`encode_value_ordered`].
pub fn encode_key_ordered(values: &[Value]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 16);
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            buf.push(FIELD_SEPARATOR);
        }
        encode_value_ordered(value, &mut buf);
    }
    buf
}

/// Decodes a single value occupying the whole buffer, checking its type
/// prefix against `expected`.
pub fn decode_value(buf: &[u8], expected: ValueType) -> Result<Value> {
    let (value, read) = decode_component(buf)?;
    if read != buf.len() {
        return Err(Error::Validation("trailing bytes after encoded value".into()));
    }
    if value.value_type() != expected && !value.is_null() {
        return Err(Error::Validation(format!(
            "expected {} value, found {}",
            expected,
            value.value_type()
        )));
    }
    Ok(value)
}

/// Decodes one value from the front of `buf`, returning it and the number
/// of bytes consumed. Used for composite keys and index entry splitting.
pub fn decode_component(buf: &[u8]) -> Result<(Value, usize)> {
    let prefix = *buf
        .first()
        .ok_or_else(|| Error::Validation("empty encoded value".into()))?;
    let rest = &buf[1..];

    match prefix {
        type_prefix::NULL => Ok((Value::Null, 1)),
        type_prefix::FALSE => Ok((Value::Bool(false), 1)),
        type_prefix::TRUE => Ok((Value::Bool(true), 1)),
        type_prefix::NUMBER => {
            let raw = fixed8(rest)?;
            let whole = ordered_bits_to_float(u64::from_be_bytes(raw));
            let tail = rest
                .get(8..11)
                .ok_or_else(|| Error::Validation("truncated numeric encoding".into()))?;
            let rem = u16::from_be_bytes([tail[0], tail[1]]);
            match tail[2] {
                NUMBER_TAG_FLOAT if rem == 0 => Ok((Value::Float(whole), 12)),
                NUMBER_TAG_INT
                    if whole.is_finite()
                        && whole.fract() == 0.0
                        && whole.abs() <= 9.3e18 =>
                {
                    let x = i64::try_from(whole as i128 + rem as i128).map_err(|_| {
                        Error::Validation("integer encoding out of range".into())
                    })?;
                    Ok((Value::Int(x), 12))
                }
                _ => Err(Error::Validation("malformed numeric encoding".into())),
            }
        }
        type_prefix::TEXT => {
            let (bytes, read) = decode_escaped(rest)?;
            let text = String::from_utf8(bytes)
                .map_err(|_| Error::Validation("encoded text is not valid UTF-8".into()))?;
            Ok((Value::Text(text), 1 + read))
        }
        type_prefix::BLOB => {
            let (bytes, read) = decode_escaped(rest)?;
            Ok((Value::Blob(bytes), 1 + read))
        }
        type_prefix::ARRAY => {
            let mut items = Vec::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    Some(0x00) => return Ok((Value::Array(items), 1 + pos + 1)),
                    Some(_) => {
                        let (item, read) = decode_component(&rest[pos..])?;
                        items.push(item);
                        pos += read;
                    }
                    None => {
                        return Err(Error::Validation("unterminated encoded array".into()))
                    }
                }
            }
        }
        type_prefix::DOCUMENT => {
            let mut doc = Document::new();
            let mut pos = 0;
            loop {
                match rest.get(pos) {
                    Some(0x00) => return Ok((Value::Document(doc), 1 + pos + 1)),
                    Some(&type_prefix::TEXT) => {
                        let (name_bytes, read) = decode_escaped(&rest[pos + 1..])?;
                        let name = String::from_utf8(name_bytes).map_err(|_| {
                            Error::Validation("encoded field name is not valid UTF-8".into())
                        })?;
                        pos += 1 + read;
                        let (item, read) = decode_component(&rest[pos..])?;
                        doc.insert(name, item);
                        pos += read;
                    }
                    Some(_) => {
                        return Err(Error::Validation(
                            "malformed field name in encoded document".into(),
                        ))
                    }
                    None => {
                        return Err(Error::Validation("unterminated encoded document".into()))
                    }
                }
            }
        }
        other => Err(Error::Validation(format!(
            "unknown type prefix 0x{other:02x}"
        ))),
    }
}

fn fixed8(buf: &[u8]) -> Result<[u8; 8]> {
    let slice = buf
        .get(..8)
        .ok_or_else(|| Error::Validation("truncated numeric encoding".into()))?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(slice);
    Ok(raw)
}

fn float_to_ordered_bits(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    }
}

fn ordered_bits_to_float(bits: u64) -> f64 {
    if bits & (1 << 63) != 0 {
        f64::from_bits(bits ^ (1 << 63))
    } else {
        f64::from_bits(!bits)
    }
}

fn encode_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &b in data {
        if b == 0x00 {
            buf.extend_from_slice(&ESCAPED_ZERO);
        } else {
            buf.push(b);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

fn decode_escaped(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut pos = 0;
    loop {
        match buf.get(pos) {
            Some(0x00) => match buf.get(pos + 1) {
                Some(0x00) => return Ok((out, pos + 2)),
                Some(0xFF) => {
                    out.push(0x00);
                    pos += 2;
                }
                _ => return Err(Error::Validation("invalid escape in encoded bytes".into())),
            },
            Some(&b) => {
                out.push(b);
                pos += 1;
            }
            None => return Err(Error::Validation("unterminated encoded bytes".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn enc(v: &Value) -> Vec<u8> {
        encode_single(v)
    }

    #[test]
    fn int_encoding_orders_across_sign() {
        let values = [i64::MIN, -100, -1, 0, 1, 100, i64::MAX];
        for pair in values.windows(2) {
            assert!(
                enc(&Value::Int(pair[0])) < enc(&Value::Int(pair[1])),
                "{} should encode below {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn float_encoding_orders_across_the_full_domain() {
        let values = [
            f64::NEG_INFINITY,
            -1e300,
            -1.5,
            -f64::MIN_POSITIVE,
            0.0,
            f64::MIN_POSITIVE,
            0.5,
            1.5,
            1e300,
            f64::INFINITY,
            f64::NAN,
        ];
        for pair in values.windows(2) {
            assert!(
                enc(&Value::Float(pair[0])) < enc(&Value::Float(pair[1])),
                "{} should encode below {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn negative_zero_encodes_below_positive_zero() {
        assert!(enc(&Value::Float(-0.0)) < enc(&Value::Float(0.0)));
    }

    #[test]
    fn text_prefix_sorts_before_extension() {
        assert!(enc(&Value::Text("ab".into())) < enc(&Value::Text("ab\u{0}".into())));
        assert!(enc(&Value::Text("ab".into())) < enc(&Value::Text("abc".into())));
        assert!(enc(&Value::Text("".into())) < enc(&Value::Text("a".into())));
    }

    #[test]
    fn blob_with_embedded_zeros_round_trips() {
        let v = Value::Blob(vec![0, 1, 0, 0xFF, 0]);
        let buf = enc(&v);
        assert_eq!(decode_value(&buf, ValueType::Blob).unwrap(), v);
    }

    #[test]
    fn cross_type_encoding_matches_value_order() {
        let values = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Float(f64::NEG_INFINITY),
            Value::Int(i64::MAX),
            Value::Float(f64::NAN),
            Value::Text("a".into()),
            Value::Blob(vec![b'a']),
            Value::Array(vec![Value::Int(1)]),
            Value::Document(doc! { "a" => 1i64 }),
        ];
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(enc(&pair[0]) < enc(&pair[1]));
        }
    }

    #[test]
    fn numeric_encoding_interleaves_ints_and_floats() {
        let values = [
            Value::Float(f64::NEG_INFINITY),
            Value::Int(i64::MIN),
            Value::Int(i64::MIN + 1),
            Value::Float(-2.5),
            Value::Int(-2),
            Value::Float(-0.0),
            Value::Int(0),
            Value::Float(0.5),
            Value::Int(2),
            Value::Float(2.5),
            Value::Int(i64::MAX),
            Value::Float(f64::INFINITY),
        ];
        for pair in values.windows(2) {
            assert!(pair[0] < pair[1], "{} vs {}", pair[0], pair[1]);
            assert!(
                enc(&pair[0]) < enc(&pair[1]),
                "{} should encode below {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn equal_numbers_share_their_position_bytes() {
        let float = enc(&Value::Float(2.0));
        let int = enc(&Value::Int(2));
        assert_eq!(float[..11], int[..11]);
        assert!(float < int);

        let mut a = Vec::new();
        encode_value_ordered(&Value::Float(2.0), &mut a);
        let mut b = Vec::new();
        encode_value_ordered(&Value::Int(2), &mut b);
        assert_eq!(a, b);
    }

    #[test]
    fn large_integers_round_trip_exactly() {
        for v in [
            i64::MIN,
            i64::MIN + 1,
            -(1 << 53) - 1,
            (1 << 53) + 1,
            i64::MAX - 1,
            i64::MAX,
        ] {
            let buf = enc(&Value::Int(v));
            assert_eq!(decode_value(&buf, ValueType::Int).unwrap(), Value::Int(v));
        }
    }

    #[test]
    fn every_indexable_type_round_trips() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(3.25),
            Value::Text("héllo".into()),
            Value::Blob(vec![1, 2, 3]),
            Value::Array(vec![Value::Int(1), Value::Text("x".into())]),
            Value::Document(doc! { "nested" => "yes" }),
        ];
        for v in values {
            let buf = enc(&v);
            let (decoded, read) = decode_component(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(read, buf.len());
        }
    }

    #[test]
    fn decode_value_rejects_type_mismatch() {
        let buf = enc(&Value::Int(5));
        assert!(decode_value(&buf, ValueType::Text).is_err());
        assert!(decode_value(&buf, ValueType::Int).is_ok());
    }

    #[test]
    fn composite_key_orders_field_by_field() {
        let a = encode_key(&[Value::Int(1), Value::Text("b".into())]);
        let b = encode_key(&[Value::Int(1), Value::Text("c".into())]);
        let c = encode_key(&[Value::Int(2), Value::Text("a".into())]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn shorter_composite_key_sorts_before_its_extension() {
        let one = encode_key(&[Value::Text("a".into())]);
        let two = encode_key(&[Value::Text("a".into()), Value::Int(0)]);
        assert!(one < two);
    }
}
