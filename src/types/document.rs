//! Insertion-ordered document.
//!
//! Field order is part of a document's identity: it is preserved by the
//! codec and by every mutation. Replacing an existing field keeps its
//! original position. Lookups are linear; documents are expected to stay
//! small (tens of fields), where a scan beats hashing.

use super::Value;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Document {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Inserts a field. If the name already exists its value is replaced in
    /// place, keeping the original position.
    pub fn insert(&mut self, name: String, value: Value) {
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl Ord for Document {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ordered like a sequence of (name, value) pairs, matching the
        // byte order the key codec produces for document-typed keys.
        self.fields.iter().cmp(other.fields.iter())
    }
}

impl PartialOrd for Document {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.insert(name, value);
        }
        doc
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Builds a [`Document`] from `name => value` pairs, values converted via
/// `Into<Value>`.
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut d = $crate::Document::new();
        $(d.insert(::std::string::String::from($name), $crate::Value::from($value));)+
        d
    }};
}
