//! # Table Manager
//!
//! Row storage for one table: schema validation, primary key handling,
//! and the hooks that keep secondary indexes in sync with every mutation.
//!
//! Rows live under the table's data prefix keyed by the order-preserving
//! encoding of the primary key, so a plain forward scan yields rows in
//! primary key order. Tables without a declared primary key draw keys
//! from the per-table auto-increment sequence in the catalog.

use super::catalog::{self, IndexConfig, TableConfig};
use super::index;
use crate::encoding::{decode_document, encode_document, encode_single};
use crate::engine::{Direction, EngineTransaction};
use crate::error::{Error, Result};
use crate::types::{Document, Value, ValueType};

/// Checks a document against the table's declared constraints, coercing
/// integer values into declared float fields. Undeclared fields always
/// pass; constraints only bind the fields they name.
pub fn validate_document(config: &TableConfig, doc: &mut Document) -> Result<()> {
    for constraint in &config.fields {
        let Some(value) = doc.get_mut(&constraint.name) else {
            continue;
        };
        let actual = value.value_type();
        if actual == constraint.field_type {
            continue;
        }
        if constraint.field_type == ValueType::Float {
            if let Value::Int(n) = value {
                *value = Value::Float(*n as f64);
                continue;
            }
        }
        return Err(Error::Validation(format!(
            "field {} expects {}, got {}",
            constraint.name,
            constraint.field_type.name(),
            actual.name()
        )));
    }
    Ok(())
}

fn declared_primary_key(config: &TableConfig, doc: &Document) -> Result<Option<Value>> {
    let Some(field) = &config.primary_key else {
        return Ok(None);
    };
    let Some(value) = doc.get(field) else {
        return Err(Error::Validation(format!(
            "primary key field {field} is required"
        )));
    };
    if !value.is_key_scalar() {
        return Err(Error::Validation(format!(
            "primary key field {field} must be a scalar, got {}",
            value.value_type().name()
        )));
    }
    Ok(Some(value.clone()))
}

/// Inserts a document, allocating an auto-increment key if the table has
/// no declared primary key. Returns the primary key under which the row
/// was stored.
pub fn insert(
    tx: &mut dyn EngineTransaction,
    config: &TableConfig,
    indexes: &[IndexConfig],
    mut doc: Document,
) -> Result<Value> {
    validate_document(config, &mut doc)?;
    let pk = match declared_primary_key(config, &doc)? {
        Some(pk) => pk,
        None => Value::Int(catalog::allocate_seq(tx, &config.name)?),
    };
    let key = catalog::row_key(&config.name, &pk);
    if tx.get(&key)?.is_some() {
        return Err(Error::ConstraintViolation(format!(
            "duplicate primary key {pk} in table {}",
            config.name
        )));
    }
    tx.put(&key, &encode_document(&doc))?;
    let pk_enc = encode_single(&pk);
    for ix in indexes {
        index::on_insert(tx, ix, &doc, &pk_enc)?;
    }
    Ok(pk)
}

pub fn get(
    tx: &dyn EngineTransaction,
    table: &str,
    pk_enc: &[u8],
) -> Result<Option<Document>> {
    let mut key = catalog::data_prefix(table);
    key.extend_from_slice(pk_enc);
    match tx.get(&key)? {
        Some(raw) => Ok(Some(decode_document(&raw)?)),
        None => Ok(None),
    }
}

/// Deletes a row and its index entries. The row must exist.
pub fn delete(
    tx: &mut dyn EngineTransaction,
    config: &TableConfig,
    indexes: &[IndexConfig],
    pk_enc: &[u8],
) -> Result<()> {
    let doc = get(tx, &config.name, pk_enc)?.ok_or_else(|| {
        Error::NotFound(format!("document in table {}", config.name))
    })?;
    for ix in indexes {
        index::on_delete(tx, ix, &doc, pk_enc)?;
    }
    let mut key = catalog::data_prefix(&config.name);
    key.extend_from_slice(pk_enc);
    tx.delete(&key)
}

/// Overwrites an existing row in place, keeping its key, and moves index
/// entries whose values changed.
pub fn replace(
    tx: &mut dyn EngineTransaction,
    config: &TableConfig,
    indexes: &[IndexConfig],
    pk_enc: &[u8],
    mut doc: Document,
) -> Result<()> {
    validate_document(config, &mut doc)?;
    let old = get(tx, &config.name, pk_enc)?.ok_or_else(|| {
        Error::NotFound(format!("document in table {}", config.name))
    })?;
    let mut key = catalog::data_prefix(&config.name);
    key.extend_from_slice(pk_enc);
    tx.put(&key, &encode_document(&doc))?;
    for ix in indexes {
        index::on_replace(tx, ix, &old, &doc, pk_enc)?;
    }
    Ok(())
}

/// Pull-based scan over a table's rows in primary key order. Like
/// [`index::IndexCursor`], it re-seeks past the last returned key on
/// every pull instead of holding an iterator across calls.
pub struct TableCursor {
    prefix: Vec<u8>,
    last_key: Option<Vec<u8>>,
    done: bool,
}

impl TableCursor {
    pub fn new(table: &str) -> Self {
        Self {
            prefix: catalog::data_prefix(table),
            last_key: None,
            done: false,
        }
    }

    /// Yields the next `(encoded pk, document)` pair, or `None` at the end
    /// of the table.
    pub fn next(
        &mut self,
        tx: &dyn EngineTransaction,
    ) -> Result<Option<(Vec<u8>, Document)>> {
        if self.done {
            return Ok(None);
        }
        let seek = match &self.last_key {
            Some(last) => {
                let mut next = last.clone();
                next.push(0x00);
                next
            }
            None => self.prefix.clone(),
        };
        let mut iter = tx.iterate(&seek, Direction::Forward)?;
        match iter.next().transpose()? {
            Some((key, value)) if key.starts_with(&self.prefix) => {
                drop(iter);
                let pk_enc = key[self.prefix.len()..].to_vec();
                self.last_key = Some(key);
                Ok(Some((pk_enc, decode_document(&value)?)))
            }
            _ => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::catalog::{create_table, FieldConstraint};
    use crate::doc;
    use crate::engine::{Engine, MemoryEngine};
    use crate::types::FieldPath;

    fn users_config() -> TableConfig {
        TableConfig {
            name: "users".into(),
            primary_key: Some("id".into()),
            next_seq: 1,
            fields: vec![
                FieldConstraint {
                    name: "id".into(),
                    field_type: ValueType::Int,
                },
                FieldConstraint {
                    name: "score".into(),
                    field_type: ValueType::Float,
                },
            ],
        }
    }

    fn begin_with(config: &TableConfig) -> (MemoryEngine, Box<dyn EngineTransaction>) {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        create_table(tx.as_mut(), config).unwrap();
        tx.commit().unwrap();
        let tx = engine.begin(true).unwrap();
        (engine, tx)
    }

    #[test]
    fn insert_uses_declared_primary_key() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        let pk = insert(
            tx.as_mut(),
            &config,
            &[],
            doc! { "id" => Value::Int(42), "name" => Value::Text("ada".into()) },
        )
        .unwrap();
        assert_eq!(pk, Value::Int(42));
        let stored = get(tx.as_ref(), "users", &encode_single(&pk))
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("name"), Some(&Value::Text("ada".into())));
    }

    #[test]
    fn insert_without_declared_key_auto_increments() {
        let config = TableConfig {
            name: "logs".into(),
            primary_key: None,
            next_seq: 1,
            fields: Vec::new(),
        };
        let (_engine, mut tx) = begin_with(&config);
        let first = insert(tx.as_mut(), &config, &[], doc! { "m" => Value::Int(1) }).unwrap();
        let second = insert(tx.as_mut(), &config, &[], doc! { "m" => Value::Int(2) }).unwrap();
        assert_eq!(first, Value::Int(1));
        assert_eq!(second, Value::Int(2));
    }

    #[test]
    fn duplicate_primary_key_is_a_constraint_violation() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        insert(tx.as_mut(), &config, &[], doc! { "id" => Value::Int(1) }).unwrap();
        let err = insert(tx.as_mut(), &config, &[], doc! { "id" => Value::Int(1) }).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn missing_primary_key_field_is_rejected() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        let err = insert(tx.as_mut(), &config, &[], doc! { "name" => Value::Text("x".into()) })
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn int_coerces_into_declared_float_field() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        insert(
            tx.as_mut(),
            &config,
            &[],
            doc! { "id" => Value::Int(1), "score" => Value::Int(3) },
        )
        .unwrap();
        let stored = get(tx.as_ref(), "users", &encode_single(&Value::Int(1)))
            .unwrap()
            .unwrap();
        assert_eq!(stored.get("score"), Some(&Value::Float(3.0)));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        let err = insert(
            tx.as_mut(),
            &config,
            &[],
            doc! { "id" => Value::Text("one".into()) },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn cursor_scans_in_primary_key_order() {
        let config = users_config();
        let (_engine, mut tx) = begin_with(&config);
        for id in [30, 10, 20] {
            insert(tx.as_mut(), &config, &[], doc! { "id" => Value::Int(id) }).unwrap();
        }
        let mut cursor = TableCursor::new("users");
        let mut ids = Vec::new();
        while let Some((_, doc)) = cursor.next(tx.as_ref()).unwrap() {
            ids.push(doc.get("id").cloned().unwrap());
        }
        assert_eq!(ids, vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
    }

    #[test]
    fn delete_and_replace_keep_indexes_in_sync() {
        let config = users_config();
        let indexes = vec![IndexConfig {
            name: "ix_score".into(),
            table: "users".into(),
            unique: false,
            fields: vec![FieldPath::single("score")],
        }];
        let (_engine, mut tx) = begin_with(&config);
        let pk = insert(
            tx.as_mut(),
            &config,
            &indexes,
            doc! { "id" => Value::Int(1), "score" => Value::Float(1.5) },
        )
        .unwrap();
        let pk_enc = encode_single(&pk);

        replace(
            tx.as_mut(),
            &config,
            &indexes,
            &pk_enc,
            doc! { "id" => Value::Int(1), "score" => Value::Float(9.5) },
        )
        .unwrap();
        let mut cursor = index::IndexCursor::new(
            indexes[0].clone(),
            index::IndexPredicate::Eq(vec![Value::Float(9.5)]),
        );
        assert_eq!(cursor.next(tx.as_ref()).unwrap(), Some(pk_enc.clone()));

        delete(tx.as_mut(), &config, &indexes, &pk_enc).unwrap();
        assert!(get(tx.as_ref(), "users", &pk_enc).unwrap().is_none());
        let mut cursor = index::IndexCursor::new(
            indexes[0].clone(),
            index::IndexPredicate::Eq(vec![Value::Float(9.5)]),
        );
        assert_eq!(cursor.next(tx.as_ref()).unwrap(), None);
    }
}
