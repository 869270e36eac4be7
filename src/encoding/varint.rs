//! Variable-length integer encoding used for length framing in the
//! document codec.
//!
//! The scheme is optimized for small values, with the leading byte
//! selecting the width:
//!
//! | Value range           | Bytes | Leading byte |
//! |-----------------------|-------|--------------|
//! | 0 - 240               | 1     | the value    |
//! | 241 - 2287            | 2     | 241-248      |
//! | 2288 - 67823          | 3     | 249          |
//! | 67824 - 0xFF_FFFF     | 4     | 250          |
//! | up to u32::MAX        | 5     | 251          |
//! | up to u64::MAX        | 9     | 255          |
//!
//! Lengths written by the codec are always re-read by the codec, so a
//! malformed varint means a corrupt stored document and decodes to a
//! validation error.

use crate::error::{Error, Result};

/// Appends the varint encoding of `value` to `buf`.
pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    if value <= 240 {
        buf.push(value as u8);
    } else if value <= 2287 {
        let v = value - 240;
        buf.push(((v >> 8) + 241) as u8);
        buf.push((v & 0xFF) as u8);
    } else if value <= 67823 {
        let v = value - 2288;
        buf.push(249);
        buf.push((v >> 8) as u8);
        buf.push((v & 0xFF) as u8);
    } else if value <= 0xFF_FFFF {
        buf.push(250);
        buf.push((value >> 16) as u8);
        buf.push((value >> 8) as u8);
        buf.push(value as u8);
    } else if value <= 0xFFFF_FFFF {
        buf.push(251);
        buf.push((value >> 24) as u8);
        buf.push((value >> 16) as u8);
        buf.push((value >> 8) as u8);
        buf.push(value as u8);
    } else {
        buf.push(255);
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

/// Reads a varint from the front of `buf`, returning the value and the
/// number of bytes consumed.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let first = *buf
        .first()
        .ok_or_else(|| Error::Validation("empty buffer for varint".into()))?;

    let need = |n: usize| -> Result<()> {
        if buf.len() < n {
            Err(Error::Validation(format!("truncated {n}-byte varint")))
        } else {
            Ok(())
        }
    };

    match first {
        0..=240 => Ok((first as u64, 1)),
        241..=248 => {
            need(2)?;
            Ok((240 + ((first as u64 - 241) << 8) + buf[1] as u64, 2))
        }
        249 => {
            need(3)?;
            Ok((2288 + ((buf[1] as u64) << 8) + buf[2] as u64, 3))
        }
        250 => {
            need(4)?;
            Ok((
                ((buf[1] as u64) << 16) | ((buf[2] as u64) << 8) | buf[3] as u64,
                4,
            ))
        }
        251 => {
            need(5)?;
            Ok((
                ((buf[1] as u64) << 24)
                    | ((buf[2] as u64) << 16)
                    | ((buf[3] as u64) << 8)
                    | buf[4] as u64,
                5,
            ))
        }
        255 => {
            need(9)?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[1..9]);
            Ok((u64::from_be_bytes(raw), 9))
        }
        other => Err(Error::Validation(format!("invalid varint marker {other}"))),
    }
}
