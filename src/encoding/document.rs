//! Document storage codec.
//!
//! A stored document is a varint field count followed by one frame per
//! field, in insertion order:
//!
//! ```text
//! [varint count]
//! [varint name_len][name bytes][varint value_len][encoded value] ...
//! ```
//!
//! Values reuse the self-describing key encoding, so the codec has a
//! single value format end to end. The length frames exist for
//! [`get_field`]: a scan predicate that touches one field skips over the
//! others without decoding them.

use super::key;
use super::varint::{read_varint, write_varint};
use crate::error::{Error, Result};
use crate::types::{Document, Value};

pub fn encode_document(doc: &Document) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + doc.len() * 24);
    write_varint(&mut buf, doc.len() as u64);
    let mut value_buf = Vec::with_capacity(24);
    for (name, value) in doc.iter() {
        write_varint(&mut buf, name.len() as u64);
        buf.extend_from_slice(name.as_bytes());
        value_buf.clear();
        key::encode_value(value, &mut value_buf);
        write_varint(&mut buf, value_buf.len() as u64);
        buf.extend_from_slice(&value_buf);
    }
    buf
}

pub fn decode_document(buf: &[u8]) -> Result<Document> {
    let (count, mut pos) = read_varint(buf)?;
    let mut doc = Document::with_capacity(count as usize);
    for _ in 0..count {
        let (name, value_frame, next) = read_field_frame(buf, pos)?;
        let (value, read) = key::decode_component(value_frame)?;
        if read != value_frame.len() {
            return Err(Error::Validation("trailing bytes in field frame".into()));
        }
        doc.insert(name.to_string(), value);
        pos = next;
    }
    if pos != buf.len() {
        return Err(Error::Validation("trailing bytes after document".into()));
    }
    Ok(doc)
}

/// Extracts a single field from an encoded document without materializing
/// the rest. Returns `None` if the field is absent.
pub fn get_field(buf: &[u8], name: &str) -> Result<Option<Value>> {
    let (count, mut pos) = read_varint(buf)?;
    for _ in 0..count {
        let (field_name, value_frame, next) = read_field_frame(buf, pos)?;
        if field_name == name {
            let (value, _) = key::decode_component(value_frame)?;
            return Ok(Some(value));
        }
        pos = next;
    }
    Ok(None)
}

fn read_field_frame<'a>(buf: &'a [u8], pos: usize) -> Result<(&'a str, &'a [u8], usize)> {
    let (name_len, read) = read_varint(&buf[pos..])?;
    let name_start = pos + read;
    let name_end = name_start + name_len as usize;
    let name_bytes = buf
        .get(name_start..name_end)
        .ok_or_else(|| Error::Validation("truncated field name".into()))?;
    let name = std::str::from_utf8(name_bytes)
        .map_err(|_| Error::Validation("field name is not valid UTF-8".into()))?;

    let (value_len, read) = read_varint(&buf[name_end..])?;
    let value_start = name_end + read;
    let value_end = value_start + value_len as usize;
    let value_frame = buf
        .get(value_start..value_end)
        .ok_or_else(|| Error::Validation("truncated field value".into()))?;

    Ok((name, value_frame, value_end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn round_trip_preserves_field_order() {
        let d = doc! {
            "zeta" => 1i64,
            "alpha" => "two",
            "mid" => 3.5f64,
        };
        let decoded = decode_document(&encode_document(&d)).unwrap();
        assert_eq!(decoded, d);
        let names: Vec<_> = decoded.field_names().collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn round_trip_nested_documents_and_arrays() {
        let d = doc! {
            "tags" => Value::Array(vec![Value::Text("a".into()), Value::Int(2)]),
            "address" => Value::Document(doc! { "city" => "Paris", "zip" => 75011i64 }),
            "none" => Value::Null,
        };
        assert_eq!(decode_document(&encode_document(&d)).unwrap(), d);
    }

    #[test]
    fn empty_document_round_trips() {
        let d = Document::new();
        assert_eq!(decode_document(&encode_document(&d)).unwrap(), d);
    }

    #[test]
    fn get_field_finds_without_full_decode() {
        let d = doc! { "a" => 1i64, "b" => "text", "c" => true };
        let buf = encode_document(&d);
        assert_eq!(get_field(&buf, "b").unwrap(), Some(Value::Text("text".into())));
        assert_eq!(get_field(&buf, "missing").unwrap(), None);
    }

    #[test]
    fn corrupt_buffer_is_a_validation_error() {
        let d = doc! { "a" => 1i64 };
        let mut buf = encode_document(&d);
        buf.truncate(buf.len() - 2);
        assert!(matches!(
            decode_document(&buf),
            Err(Error::Validation(_))
        ));
    }
}
