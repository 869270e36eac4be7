//! # Encoding Module
//!
//! Two codecs share one value format:
//!
//! - **Key encoding** ([`key`]): order-preserving, byte-comparable
//!   encodings for primary keys and index entries
//! - **Document encoding** ([`document`]): varint-framed field table for
//!   stored rows, supporting single-field extraction

pub mod document;
pub mod key;
pub mod varint;

pub use document::{decode_document, encode_document, get_field};
pub use key::{decode_value, encode_key, encode_single, encode_value, type_prefix};
