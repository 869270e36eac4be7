//! Runtime value representation.
//!
//! `Value` is the tagged union stored in document fields. Comparison is a
//! total order (see the module-level notes in [`crate::types`]): `Ord` is
//! implemented directly, and `PartialEq` is defined as order-equality so
//! that `Eq`/`Ord` stay consistent for floats.

use super::Document;
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Document(Document),
}

/// Discriminant of a [`Value`], used by schema constraints and the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Null,
    Bool,
    Int,
    Float,
    Text,
    Blob,
    Array,
    Document,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
            ValueType::Array => "array",
            ValueType::Document => "document",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "null" => Some(ValueType::Null),
            "bool" => Some(ValueType::Bool),
            "int" => Some(ValueType::Int),
            "float" => Some(ValueType::Float),
            "text" => Some(ValueType::Text),
            "blob" => Some(ValueType::Blob),
            "array" => Some(ValueType::Array),
            "document" => Some(ValueType::Document),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
            Value::Array(_) => ValueType::Array,
            Value::Document(_) => ValueType::Document,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for types that can appear in an encoded key: everything except
    /// NULL (which carries no order information a key could use) is
    /// indexable, but composite containers are rejected as primary keys.
    pub fn is_key_scalar(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_) | Value::Blob(_)
        )
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
            Value::Blob(_) => 4,
            Value::Array(_) => 5,
            Value::Document(_) => 6,
        }
    }
}

/// Splits an integer into the greatest double not above it plus the exact
/// remainder. Doubles are spaced at most 1024 apart over the i64 range, so
/// the remainder always fits a `u16`, and the pair places every integer
/// exactly in the double ordering. The key codec reuses the same split, so
/// comparison order and encoded byte order agree.
pub(crate) fn int_float_parts(x: i64) -> (f64, u16) {
    let nearest = x as f64;
    let trunc = nearest as i128;
    if trunc <= x as i128 {
        (nearest, (x as i128 - trunc) as u16)
    } else {
        let below = if nearest > 0.0 {
            f64::from_bits(nearest.to_bits() - 1)
        } else {
            f64::from_bits(nearest.to_bits() + 1)
        };
        (below, (x as i128 - below as i128) as u16)
    }
}

fn cmp_int_float(x: i64, f: f64) -> Ordering {
    let (whole, rem) = int_float_parts(x);
    whole.total_cmp(&f).then(if rem > 0 {
        Ordering::Greater
    } else {
        Ordering::Equal
    })
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Int(a), Value::Float(b)) => cmp_int_float(*a, *b),
            (Value::Float(a), Value::Int(b)) => cmp_int_float(*b, *a).reverse(),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Blob(a), Value::Blob(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Document(a), Value::Document(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "x{b:02x?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Document(d) => write!(f, "{d}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_classes_order_null_first() {
        let ordered = [
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Float(f64::NEG_INFINITY),
            Value::Int(i64::MIN),
            Value::Int(0),
            Value::Float(0.5),
            Value::Int(1),
            Value::Float(f64::INFINITY),
            Value::Text(String::new()),
            Value::Blob(vec![]),
            Value::Array(vec![]),
            Value::Document(Document::new()),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} should sort below {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert!(Value::Int(2) < Value::Float(2.5));
        assert!(Value::Float(2.5) < Value::Int(3));
        assert!(Value::Float(f64::NEG_INFINITY) < Value::Int(i64::MIN));
        assert!(Value::Int(i64::MAX) < Value::Float(f64::INFINITY));
        assert!(Value::Float(-0.0) < Value::Int(0));
        assert_eq!(Value::Int(0), Value::Float(0.0));
    }

    #[test]
    fn large_integers_keep_exact_order_against_floats() {
        // 2^53 + 1 has no exact double; equality must not round through f64
        let big = (1i64 << 53) + 1;
        assert_ne!(Value::Int(big), Value::Float((1i64 << 53) as f64));
        assert!(Value::Int(big) > Value::Float((1i64 << 53) as f64));
        assert!(Value::Int(big) < Value::Float(((1i64 << 53) + 2) as f64));
        assert!(Value::Int(i64::MAX) > Value::Float(9.2e18));
        assert!(Value::Int(i64::MAX) < Value::Float(9.3e18));
    }

    #[test]
    fn float_ordering_handles_nan() {
        assert!(Value::Float(f64::INFINITY) < Value::Float(f64::NAN));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn arrays_compare_lexicographically() {
        let a = Value::Array(vec![Value::Int(1)]);
        let b = Value::Array(vec![Value::Int(1), Value::Int(0)]);
        assert!(a < b);
    }
}
