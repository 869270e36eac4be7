//! # Index Maintenance
//!
//! Secondary indexes are flat key ranges mapping indexed values back to
//! primary keys. Entry layout under the index prefix (see
//! [`catalog::index_prefix`]):
//!
//! ```text
//! non-unique:  prefix ++ values ++ 0x00 ++ pk     ->  pk
//! unique:      prefix ++ values                   ->  pk
//! ```
//!
//! `values` is the tagless ordering encoding of the indexed fields joined
//! by the field separator, so byte order over entries is value order, all
//! entries for one value are contiguous, and numerically equal integers
//! and floats land on identical bytes. Unique indexes omit the pk suffix,
//! which makes the uniqueness check a single point lookup that also
//! catches an integer colliding with an equal float. Both shapes store
//! the encoded pk as the entry value, so readers never parse it out of
//! the key.
//!
//! A document missing any indexed field gets no entry. Comparison
//! predicates only ever match present fields, so skipping is invisible to
//! index scans.

use super::catalog::{self, IndexConfig};
use crate::encoding::key::{encode_key_ordered, encode_value_ordered, FIELD_SEPARATOR};
use crate::engine::{Direction, EngineTransaction};
use crate::error::{Error, Result};
use crate::types::{Document, Value};

/// Resolves the indexed field values for a document. `None` when any
/// indexed field is absent, meaning the document is not indexed.
pub fn entry_values(config: &IndexConfig, doc: &Document) -> Option<Vec<Value>> {
    config
        .fields
        .iter()
        .map(|path| path.resolve(doc).cloned())
        .collect()
}

fn entry_key(config: &IndexConfig, values: &[Value], pk_enc: &[u8]) -> Vec<u8> {
    let mut key = catalog::index_prefix(&config.name);
    key.extend_from_slice(&encode_key_ordered(values));
    if !config.unique {
        key.push(FIELD_SEPARATOR);
        key.extend_from_slice(pk_enc);
    }
    key
}

pub fn on_insert(
    tx: &mut dyn EngineTransaction,
    config: &IndexConfig,
    doc: &Document,
    pk_enc: &[u8],
) -> Result<()> {
    let Some(values) = entry_values(config, doc) else {
        return Ok(());
    };
    let key = entry_key(config, &values, pk_enc);
    if config.unique && tx.get(&key)?.is_some() {
        return Err(Error::ConstraintViolation(format!(
            "unique index {} rejects duplicate value",
            config.name
        )));
    }
    tx.put(&key, pk_enc)
}

pub fn on_delete(
    tx: &mut dyn EngineTransaction,
    config: &IndexConfig,
    doc: &Document,
    pk_enc: &[u8],
) -> Result<()> {
    let Some(values) = entry_values(config, doc) else {
        return Ok(());
    };
    tx.delete(&entry_key(config, &values, pk_enc))
}

pub fn on_replace(
    tx: &mut dyn EngineTransaction,
    config: &IndexConfig,
    old: &Document,
    new: &Document,
    pk_enc: &[u8],
) -> Result<()> {
    on_delete(tx, config, old, pk_enc)?;
    on_insert(tx, config, new, pk_enc)
}

/// Builds entries for every existing row of the index's table. A unique
/// violation aborts the build; the caller's rollback removes any partial
/// entries.
pub fn backfill(tx: &mut dyn EngineTransaction, config: &IndexConfig) -> Result<()> {
    let prefix = catalog::data_prefix(&config.table);
    let mut rows = Vec::new();
    for pair in tx.iterate(&prefix, Direction::Forward)? {
        let (key, value) = pair?;
        if !key.starts_with(&prefix) {
            break;
        }
        let pk_enc = key[prefix.len()..].to_vec();
        rows.push((pk_enc, crate::encoding::decode_document(&value)?));
    }
    for (pk_enc, doc) in rows {
        on_insert(tx, config, &doc, &pk_enc)?;
    }
    Ok(())
}

/// One-sided or two-sided bound on the first indexed field. The flag is
/// true for inclusive bounds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeBounds {
    pub low: Option<(Value, bool)>,
    pub high: Option<(Value, bool)>,
}

/// What an index scan should match.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexPredicate {
    /// Exact match on every indexed field.
    Eq(Vec<Value>),
    /// Exact match on a leading subset of a composite index's fields.
    Prefix(Vec<Value>),
    /// Range over the first indexed field.
    Range(RangeBounds),
}

/// Pull-based scan over one index's entries, yielding encoded primary
/// keys in entry order.
///
/// The cursor holds no iterator between pulls. Each [`next`] call seeks
/// past the previously returned entry, so the borrow on the transaction
/// ends when the call returns.
///
/// [`next`]: IndexCursor::next
pub struct IndexCursor {
    config: IndexConfig,
    predicate: IndexPredicate,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl IndexCursor {
    pub fn new(config: IndexConfig, predicate: IndexPredicate) -> Self {
        Self {
            config,
            predicate,
            last_key: None,
            done: false,
        }
    }

    pub fn next(&mut self, tx: &dyn EngineTransaction) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        match &self.predicate {
            IndexPredicate::Eq(values) if self.config.unique => {
                self.done = true;
                let mut key = catalog::index_prefix(&self.config.name);
                key.extend_from_slice(&encode_key_ordered(values));
                Ok(tx.get(&key)?)
            }
            IndexPredicate::Eq(values) | IndexPredicate::Prefix(values) => {
                let mut matched = catalog::index_prefix(&self.config.name);
                matched.extend_from_slice(&encode_key_ordered(values));
                matched.push(FIELD_SEPARATOR);
                self.scan_contiguous(tx, matched)
            }
            IndexPredicate::Range(bounds) => self.scan_range(tx, bounds.clone()),
        }
    }

    /// Scans entries sharing a fixed byte prefix.
    fn scan_contiguous(
        &mut self,
        tx: &dyn EngineTransaction,
        matched: Vec<u8>,
    ) -> Result<Option<Vec<u8>>> {
        let seek = match &self.last_key {
            Some(last) => successor(last),
            None => matched.clone(),
        };
        let mut iter = tx.iterate(&seek, Direction::Forward)?;
        match iter.next().transpose()? {
            Some((key, value)) if key.starts_with(&matched) => {
                drop(iter);
                self.last_key = Some(key);
                Ok(Some(value))
            }
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }

    /// Bounds are compared at the byte level: value encodings are
    /// prefix-free and equal values encode to equal bytes, so the entry's
    /// first field equals a bound exactly when the key tail starts with
    /// the bound's encoding, and is otherwise ordered by plain byte
    /// comparison.
    fn scan_range(
        &mut self,
        tx: &dyn EngineTransaction,
        bounds: RangeBounds,
    ) -> Result<Option<Vec<u8>>> {
        let prefix = catalog::index_prefix(&self.config.name);
        let encode_bound = |(value, inclusive): &(Value, bool)| {
            let mut bytes = Vec::with_capacity(16);
            encode_value_ordered(value, &mut bytes);
            (bytes, *inclusive)
        };
        let low = bounds.low.as_ref().map(encode_bound);
        let high = bounds.high.as_ref().map(encode_bound);

        let seek = match &self.last_key {
            Some(last) => successor(last),
            None => {
                let mut seek = prefix.clone();
                if let Some((low_bytes, _)) = &low {
                    seek.extend_from_slice(low_bytes);
                }
                seek
            }
        };
        let iter = tx.iterate(&seek, Direction::Forward)?;
        for pair in iter {
            let (key, value) = pair?;
            if !key.starts_with(&prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if let Some((low_bytes, inclusive)) = &low {
                let at_bound = rest.starts_with(low_bytes);
                if (!at_bound && rest < low_bytes.as_slice()) || (at_bound && !inclusive) {
                    continue;
                }
            }
            if let Some((high_bytes, inclusive)) = &high {
                let at_bound = rest.starts_with(high_bytes);
                if (!at_bound && rest > high_bytes.as_slice()) || (at_bound && !inclusive) {
                    break;
                }
            }
            self.last_key = Some(key);
            return Ok(Some(value));
        }
        self.done = true;
        Ok(None)
    }
}

/// Smallest key strictly greater than `key`.
fn successor(key: &[u8]) -> Vec<u8> {
    let mut next = key.to_vec();
    next.push(0x00);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::{create_table, TableConfig};
    use crate::doc;
    use crate::encoding::encode_single;
    use crate::engine::{Engine, MemoryEngine};
    use crate::types::FieldPath;

    fn setup(unique: bool) -> (MemoryEngine, IndexConfig) {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        create_table(
            tx.as_mut(),
            &TableConfig {
                name: "t".into(),
                primary_key: None,
                next_seq: 1,
                fields: Vec::new(),
            },
        )
        .unwrap();
        tx.commit().unwrap();
        let config = IndexConfig {
            name: "ix".into(),
            table: "t".into(),
            unique,
            fields: vec![FieldPath::single("a")],
        };
        (engine, config)
    }

    fn collect(
        tx: &dyn EngineTransaction,
        config: &IndexConfig,
        predicate: IndexPredicate,
    ) -> Vec<Vec<u8>> {
        let mut cursor = IndexCursor::new(config.clone(), predicate);
        let mut out = Vec::new();
        while let Some(pk) = cursor.next(tx).unwrap() {
            out.push(pk);
        }
        out
    }

    #[test]
    fn eq_scan_returns_all_matching_pks_in_pk_order() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        for (pk, a) in [(3, 10), (1, 10), (2, 20)] {
            let doc = doc! { "a" => Value::Int(a) };
            on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(pk))).unwrap();
        }
        let pks = collect(tx.as_ref(), &config, IndexPredicate::Eq(vec![Value::Int(10)]));
        assert_eq!(
            pks,
            vec![
                encode_single(&Value::Int(1)),
                encode_single(&Value::Int(3))
            ]
        );
    }

    #[test]
    fn unique_index_rejects_duplicate_and_allows_after_delete() {
        let (engine, config) = setup(true);
        let mut tx = engine.begin(true).unwrap();
        let doc = doc! { "a" => Value::Int(5) };
        on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(1))).unwrap();
        let err = on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(2)))
            .unwrap_err();
        assert!(err.is_constraint_violation());

        on_delete(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(1))).unwrap();
        on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(2))).unwrap();
    }

    #[test]
    fn missing_field_produces_no_entry() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        let doc = doc! { "b" => Value::Int(1) };
        on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(1))).unwrap();
        let pks = collect(tx.as_ref(), &config, IndexPredicate::Range(RangeBounds::default()));
        assert!(pks.is_empty());
    }

    #[test]
    fn range_scan_respects_bounds() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        for pk in 1..=5 {
            let doc = doc! { "a" => Value::Int(pk * 10) };
            on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(pk))).unwrap();
        }
        let pks = collect(
            tx.as_ref(),
            &config,
            IndexPredicate::Range(RangeBounds {
                low: Some((Value::Int(20), false)),
                high: Some((Value::Int(40), true)),
            }),
        );
        assert_eq!(
            pks,
            vec![
                encode_single(&Value::Int(3)),
                encode_single(&Value::Int(4))
            ]
        );
    }

    #[test]
    fn prefix_scan_matches_leading_composite_field() {
        let (engine, _) = setup(false);
        let config = IndexConfig {
            name: "ix2".into(),
            table: "t".into(),
            unique: false,
            fields: vec![FieldPath::single("a"), FieldPath::single("b")],
        };
        let mut tx = engine.begin(true).unwrap();
        for (pk, a, b) in [(1, 1, 9), (2, 1, 3), (3, 2, 1)] {
            let doc = doc! { "a" => Value::Int(a), "b" => Value::Int(b) };
            on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(pk))).unwrap();
        }
        let pks = collect(
            tx.as_ref(),
            &config,
            IndexPredicate::Prefix(vec![Value::Int(1)]),
        );
        // within a=1, entries sort by b then pk
        assert_eq!(
            pks,
            vec![
                encode_single(&Value::Int(2)),
                encode_single(&Value::Int(1))
            ]
        );
    }

    #[test]
    fn unique_index_treats_equal_int_and_float_as_duplicates() {
        let (engine, config) = setup(true);
        let mut tx = engine.begin(true).unwrap();
        let int_doc = doc! { "a" => Value::Int(5) };
        let float_doc = doc! { "a" => Value::Float(5.0) };
        on_insert(tx.as_mut(), &config, &int_doc, &encode_single(&Value::Int(1))).unwrap();
        let err = on_insert(
            tx.as_mut(),
            &config,
            &float_doc,
            &encode_single(&Value::Int(2)),
        )
        .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn eq_scan_matches_numerically_equal_entries() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        let doc = doc! { "a" => Value::Int(10) };
        on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(1))).unwrap();
        let pks = collect(
            tx.as_ref(),
            &config,
            IndexPredicate::Eq(vec![Value::Float(10.0)]),
        );
        assert_eq!(pks, vec![encode_single(&Value::Int(1))]);
    }

    #[test]
    fn range_scan_crosses_int_and_float_entries() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        for (pk, v) in [
            (1, Value::Int(10)),
            (2, Value::Float(15.5)),
            (3, Value::Int(20)),
            (4, Value::Float(25.0)),
        ] {
            let doc = doc! { "a" => v };
            on_insert(tx.as_mut(), &config, &doc, &encode_single(&Value::Int(pk))).unwrap();
        }
        // float low bound lands on the integer 10; exclusive high 25
        // excludes the numerically equal float
        let pks = collect(
            tx.as_ref(),
            &config,
            IndexPredicate::Range(RangeBounds {
                low: Some((Value::Float(10.0), true)),
                high: Some((Value::Int(25), false)),
            }),
        );
        assert_eq!(
            pks,
            vec![
                encode_single(&Value::Int(1)),
                encode_single(&Value::Int(2)),
                encode_single(&Value::Int(3))
            ]
        );
    }

    #[test]
    fn replace_moves_entry_to_new_value() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        let pk = encode_single(&Value::Int(1));
        let old = doc! { "a" => Value::Int(1) };
        let new = doc! { "a" => Value::Int(2) };
        on_insert(tx.as_mut(), &config, &old, &pk).unwrap();
        on_replace(tx.as_mut(), &config, &old, &new, &pk).unwrap();
        assert!(collect(tx.as_ref(), &config, IndexPredicate::Eq(vec![Value::Int(1)])).is_empty());
        assert_eq!(
            collect(tx.as_ref(), &config, IndexPredicate::Eq(vec![Value::Int(2)])),
            vec![pk]
        );
    }

    #[test]
    fn backfill_indexes_existing_rows() {
        let (engine, config) = setup(false);
        let mut tx = engine.begin(true).unwrap();
        for pk in [1, 2] {
            let doc = doc! { "a" => Value::Int(pk) };
            let key = catalog::row_key("t", &Value::Int(pk));
            tx.put(&key, &crate::encoding::encode_document(&doc)).unwrap();
        }
        backfill(tx.as_mut(), &config).unwrap();
        assert_eq!(
            collect(tx.as_ref(), &config, IndexPredicate::Eq(vec![Value::Int(2)])),
            vec![encode_single(&Value::Int(2))]
        );
    }
}
