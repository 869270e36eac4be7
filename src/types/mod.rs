//! # Data Model
//!
//! This module defines the runtime data model: [`Value`], the tagged union
//! stored in documents, and [`Document`], the insertion-ordered field map
//! that is the unit of row storage.
//!
//! ## Cross-Type Ordering
//!
//! `Value` implements a single total order used everywhere: by comparison
//! expressions in the executor, by ORDER BY, and by the key codec (the byte
//! order of encoded keys matches this order). Types rank as:
//!
//! ```text
//! NULL < booleans (FALSE < TRUE) < numbers < text < blob
//!      < array < document
//! ```
//!
//! Within a type the order is the natural one. Integers and floats form a
//! single numeric class compared by value, so `Int(2)` equals
//! `Float(2.0)`; the comparison is exact over the whole i64 range and
//! never rounds through f64. Floats use IEEE 754 total ordering so NaN and
//! negative zero have defined positions. Keeping the comparison order
//! identical to the encoded key order is what makes an index-driven plan
//! return exactly the rows a full scan would.

mod document;
mod value;

pub use document::Document;
pub use value::{Value, ValueType};

pub(crate) use value::int_float_parts;

use crate::error::{Error, Result};
use std::fmt;

/// A dotted path to a field, e.g. `address.city`. Single-segment paths are
/// plain top-level field references.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::Validation(format!("invalid field path {raw:?}")));
        }
        Ok(FieldPath(segments))
    }

    pub fn single(name: impl Into<String>) -> Self {
        FieldPath(vec![name.into()])
    }

    pub fn root(&self) -> &str {
        &self.0[0]
    }

    pub fn is_single(&self) -> bool {
        self.0.len() == 1
    }

    /// Resolves the path against a document, descending through nested
    /// documents. Returns `None` if any segment is absent or a non-document
    /// value is reached before the last segment.
    pub fn resolve<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let mut current = doc.get(&self.0[0])?;
        for segment in &self.0[1..] {
            match current {
                Value::Document(inner) => current = inner.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Sets the value at the path, creating intermediate documents for
    /// missing segments. Fails if an intermediate segment resolves to a
    /// non-document value.
    pub fn set(&self, doc: &mut Document, value: Value) -> Result<()> {
        if self.is_single() {
            doc.insert(self.0[0].clone(), value);
            return Ok(());
        }
        let mut current = doc;
        for segment in &self.0[..self.0.len() - 1] {
            if current.get(segment).is_none() {
                current.insert(segment.clone(), Value::Document(Document::new()));
            }
            match current.get_mut(segment) {
                Some(Value::Document(inner)) => current = inner,
                _ => {
                    return Err(Error::Validation(format!(
                        "cannot set {self}: {segment:?} is not a document"
                    )))
                }
            }
        }
        current.insert(self.0[self.0.len() - 1].clone(), value);
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn parse_rejects_empty_segments() {
        assert!(FieldPath::parse("a..b").is_err());
        assert!(FieldPath::parse("").is_err());
    }

    #[test]
    fn resolve_descends_nested_documents() {
        let d = doc! { "address" => Value::Document(doc! { "city" => "Lyon" }) };
        let path = FieldPath::parse("address.city").unwrap();
        assert_eq!(path.resolve(&d), Some(&Value::Text("Lyon".into())));
        assert_eq!(FieldPath::parse("address.zip").unwrap().resolve(&d), None);
    }

    #[test]
    fn set_creates_intermediate_documents() {
        let mut d = Document::new();
        FieldPath::parse("a.b")
            .unwrap()
            .set(&mut d, Value::Int(1))
            .unwrap();
        assert_eq!(
            FieldPath::parse("a.b").unwrap().resolve(&d),
            Some(&Value::Int(1))
        );
    }

    #[test]
    fn set_fails_through_scalar() {
        let mut d = doc! { "a" => 1i64 };
        let err = FieldPath::parse("a.b").unwrap().set(&mut d, Value::Int(2));
        assert!(err.is_err());
    }
}
