//! # Catalog
//!
//! Table and index definitions stored inside the same key space as user
//! data, under a dedicated namespace byte so that catalog, row, and index
//! keys never collide:
//!
//! | prefix            | contents                          |
//! |-------------------|-----------------------------------|
//! | `0x01 't' name`   | table config document             |
//! | `0x01 'i' name`   | index config document             |
//! | `0x02 name 0x00`  | row data, suffixed by encoded pk  |
//! | `0x03 name 0x00`  | index entries                     |
//!
//! Names are identifiers and cannot contain `0x00`, so the separator
//! byte unambiguously ends the name. Catalog scans iterate a config
//! prefix in byte order, which for identifier names is name order.
//!
//! The catalog itself is exposed through the virtual `__genji_tables`
//! table; every name starting with `__genji_` is reserved.

use crate::doc;
use crate::encoding::{decode_document, encode_document, encode_single};
use crate::engine::{Direction, EngineTransaction};
use crate::error::{Error, Result};
use crate::types::{Document, FieldPath, Value, ValueType};

/// Virtual table listing every user table.
pub const SYSTEM_TABLE: &str = "__genji_tables";

const RESERVED_PREFIX: &str = "__genji_";

const NS_CATALOG: u8 = 0x01;
const NS_DATA: u8 = 0x02;
const NS_INDEX: u8 = 0x03;

pub fn is_reserved_name(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Declared constraint on one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConstraint {
    pub name: String,
    pub field_type: ValueType,
}

/// Persistent definition of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableConfig {
    pub name: String,
    /// Top-level field holding the primary key, if one is declared.
    /// Tables without one key rows by an auto-allocated sequence.
    pub primary_key: Option<String>,
    /// Next auto-increment value for tables without a declared key.
    pub next_seq: i64,
    pub fields: Vec<FieldConstraint>,
}

impl TableConfig {
    pub fn to_document(&self) -> Document {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|f| {
                Value::Document(doc! {
                    "field" => Value::Text(f.name.clone()),
                    "type" => Value::Text(f.field_type.name().to_string()),
                })
            })
            .collect();
        doc! {
            "name" => Value::Text(self.name.clone()),
            "primary_key" => match &self.primary_key {
                Some(pk) => Value::Text(pk.clone()),
                None => Value::Null,
            },
            "next_seq" => Value::Int(self.next_seq),
            "fields" => Value::Array(fields),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let name = text_field(doc, "name")?;
        let primary_key = match doc.get("primary_key") {
            Some(Value::Text(pk)) => Some(pk.clone()),
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(Error::Validation(format!(
                    "table config primary_key must be text, got {}",
                    other.value_type().name()
                )))
            }
        };
        let next_seq = match doc.get("next_seq") {
            Some(Value::Int(n)) => *n,
            _ => return Err(Error::Validation("table config missing next_seq".into())),
        };
        let mut fields = Vec::new();
        if let Some(Value::Array(entries)) = doc.get("fields") {
            for entry in entries {
                let Value::Document(entry) = entry else {
                    return Err(Error::Validation("malformed field constraint".into()));
                };
                let type_name = text_field(entry, "type")?;
                let field_type = ValueType::parse(&type_name).ok_or_else(|| {
                    Error::Validation(format!("unknown field type {type_name:?}"))
                })?;
                fields.push(FieldConstraint {
                    name: text_field(entry, "field")?,
                    field_type,
                });
            }
        }
        Ok(TableConfig {
            name,
            primary_key,
            next_seq,
            fields,
        })
    }

    pub fn constraint(&self, field: &str) -> Option<&FieldConstraint> {
        self.fields.iter().find(|f| f.name == field)
    }
}

/// Persistent definition of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    pub name: String,
    pub table: String,
    pub unique: bool,
    pub fields: Vec<FieldPath>,
}

impl IndexConfig {
    pub fn to_document(&self) -> Document {
        let fields: Vec<Value> = self
            .fields
            .iter()
            .map(|p| Value::Text(p.to_string()))
            .collect();
        doc! {
            "name" => Value::Text(self.name.clone()),
            "table" => Value::Text(self.table.clone()),
            "unique" => Value::Bool(self.unique),
            "fields" => Value::Array(fields),
        }
    }

    pub fn from_document(doc: &Document) -> Result<Self> {
        let name = text_field(doc, "name")?;
        let table = text_field(doc, "table")?;
        let unique = matches!(doc.get("unique"), Some(Value::Bool(true)));
        let mut fields = Vec::new();
        if let Some(Value::Array(entries)) = doc.get("fields") {
            for entry in entries {
                let Value::Text(path) = entry else {
                    return Err(Error::Validation("malformed index field path".into()));
                };
                fields.push(FieldPath::parse(path)?);
            }
        }
        if fields.is_empty() {
            return Err(Error::Validation(format!(
                "index {name} config has no fields"
            )));
        }
        Ok(IndexConfig {
            name,
            table,
            unique,
            fields,
        })
    }
}

fn text_field(doc: &Document, name: &str) -> Result<String> {
    match doc.get(name) {
        Some(Value::Text(text)) => Ok(text.clone()),
        _ => Err(Error::Validation(format!("config missing text field {name:?}"))),
    }
}

// -- Key builders ---------------------------------------------------------

fn config_key(kind: u8, name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + name.len());
    key.push(NS_CATALOG);
    key.push(kind);
    key.extend_from_slice(name.as_bytes());
    key
}

pub fn table_config_key(name: &str) -> Vec<u8> {
    config_key(b't', name)
}

pub fn index_config_key(name: &str) -> Vec<u8> {
    config_key(b'i', name)
}

/// Prefix under which a table's rows live. Row keys append the encoded
/// primary key directly after this prefix.
pub fn data_prefix(table: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + table.len());
    key.push(NS_DATA);
    key.extend_from_slice(table.as_bytes());
    key.push(0x00);
    key
}

pub fn row_key(table: &str, pk: &Value) -> Vec<u8> {
    let mut key = data_prefix(table);
    key.extend_from_slice(&encode_single(pk));
    key
}

/// Prefix under which an index's entries live.
pub fn index_prefix(index: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + index.len());
    key.push(NS_INDEX);
    key.extend_from_slice(index.as_bytes());
    key.push(0x00);
    key
}

// -- Config storage -------------------------------------------------------

pub fn get_table(tx: &dyn EngineTransaction, name: &str) -> Result<TableConfig> {
    match tx.get(&table_config_key(name))? {
        Some(raw) => TableConfig::from_document(&decode_document(&raw)?),
        None => Err(Error::NotFound(format!("table {name}"))),
    }
}

pub fn put_table(tx: &mut dyn EngineTransaction, config: &TableConfig) -> Result<()> {
    let raw = encode_document(&config.to_document());
    tx.put(&table_config_key(&config.name), &raw)
}

pub fn create_table(tx: &mut dyn EngineTransaction, config: &TableConfig) -> Result<()> {
    if is_reserved_name(&config.name) {
        return Err(Error::ConstraintViolation(format!(
            "table name {} is reserved",
            config.name
        )));
    }
    if tx.get(&table_config_key(&config.name))?.is_some() {
        return Err(Error::AlreadyExists(format!("table {}", config.name)));
    }
    put_table(tx, config)
}

/// Drops a table, its rows, and every index defined on it.
pub fn drop_table(tx: &mut dyn EngineTransaction, name: &str) -> Result<()> {
    if is_reserved_name(name) {
        return Err(Error::ConstraintViolation(format!(
            "table {name} is read-only"
        )));
    }
    if tx.get(&table_config_key(name))?.is_none() {
        return Err(Error::NotFound(format!("table {name}")));
    }
    for index in indexes_on(tx, name)? {
        drop_index(tx, &index.name)?;
    }
    delete_prefix(tx, &data_prefix(name))?;
    tx.delete(&table_config_key(name))
}

pub fn get_index(tx: &dyn EngineTransaction, name: &str) -> Result<IndexConfig> {
    match tx.get(&index_config_key(name))? {
        Some(raw) => IndexConfig::from_document(&decode_document(&raw)?),
        None => Err(Error::NotFound(format!("index {name}"))),
    }
}

pub fn create_index(tx: &mut dyn EngineTransaction, config: &IndexConfig) -> Result<()> {
    if is_reserved_name(&config.name) {
        return Err(Error::ConstraintViolation(format!(
            "index name {} is reserved",
            config.name
        )));
    }
    if tx.get(&index_config_key(&config.name))?.is_some() {
        return Err(Error::AlreadyExists(format!("index {}", config.name)));
    }
    get_table(tx, &config.table)?;
    let raw = encode_document(&config.to_document());
    tx.put(&index_config_key(&config.name), &raw)
}

/// Drops an index config and all of its entries.
pub fn drop_index(tx: &mut dyn EngineTransaction, name: &str) -> Result<()> {
    if tx.get(&index_config_key(name))?.is_none() {
        return Err(Error::NotFound(format!("index {name}")));
    }
    delete_prefix(tx, &index_prefix(name))?;
    tx.delete(&index_config_key(name))
}

pub fn list_tables(tx: &dyn EngineTransaction) -> Result<Vec<TableConfig>> {
    let mut tables = Vec::new();
    for raw in scan_prefix(tx, &config_key(b't', ""))? {
        tables.push(TableConfig::from_document(&decode_document(&raw)?)?);
    }
    Ok(tables)
}

pub fn list_indexes(tx: &dyn EngineTransaction) -> Result<Vec<IndexConfig>> {
    let mut indexes = Vec::new();
    for raw in scan_prefix(tx, &config_key(b'i', ""))? {
        indexes.push(IndexConfig::from_document(&decode_document(&raw)?)?);
    }
    Ok(indexes)
}

pub fn indexes_on(tx: &dyn EngineTransaction, table: &str) -> Result<Vec<IndexConfig>> {
    let mut indexes = list_indexes(tx)?;
    indexes.retain(|ix| ix.table == table);
    Ok(indexes)
}

/// Allocates the next auto-increment value for a table, persisting the
/// bumped counter in the same transaction.
pub fn allocate_seq(tx: &mut dyn EngineTransaction, table: &str) -> Result<i64> {
    let mut config = get_table(tx, table)?;
    let allocated = config.next_seq;
    config.next_seq += 1;
    put_table(tx, &config)?;
    Ok(allocated)
}

fn scan_prefix(tx: &dyn EngineTransaction, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut values = Vec::new();
    for pair in tx.iterate(prefix, Direction::Forward)? {
        let (key, value) = pair?;
        if !key.starts_with(prefix) {
            break;
        }
        values.push(value);
    }
    Ok(values)
}

fn delete_prefix(tx: &mut dyn EngineTransaction, prefix: &[u8]) -> Result<()> {
    let mut keys = Vec::new();
    for pair in tx.iterate(prefix, Direction::Forward)? {
        let (key, _) = pair?;
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key);
    }
    for key in keys {
        tx.delete(&key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Engine, MemoryEngine};

    fn schemaless(name: &str) -> TableConfig {
        TableConfig {
            name: name.to_string(),
            primary_key: None,
            next_seq: 1,
            fields: Vec::new(),
        }
    }

    #[test]
    fn table_config_round_trips_through_document() {
        let config = TableConfig {
            name: "users".into(),
            primary_key: Some("id".into()),
            next_seq: 7,
            fields: vec![
                FieldConstraint {
                    name: "id".into(),
                    field_type: ValueType::Int,
                },
                FieldConstraint {
                    name: "name".into(),
                    field_type: ValueType::Text,
                },
            ],
        };
        let decoded = TableConfig::from_document(&config.to_document()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn index_config_round_trips_through_document() {
        let config = IndexConfig {
            name: "ix_city".into(),
            table: "users".into(),
            unique: true,
            fields: vec![FieldPath::parse("address.city").unwrap()],
        };
        let decoded = IndexConfig::from_document(&config.to_document()).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn create_twice_reports_already_exists() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        create_table(tx.as_mut(), &schemaless("t")).unwrap();
        let err = create_table(tx.as_mut(), &schemaless("t")).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn reserved_names_are_rejected() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        let err = create_table(tx.as_mut(), &schemaless("__genji_tables")).unwrap_err();
        assert!(err.is_constraint_violation());
        let err = drop_table(tx.as_mut(), SYSTEM_TABLE).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn list_tables_is_name_ordered() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        for name in ["zebra", "apple", "mango"] {
            create_table(tx.as_mut(), &schemaless(name)).unwrap();
        }
        let names: Vec<_> = list_tables(tx.as_ref())
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["apple", "mango", "zebra"]);
    }

    #[test]
    fn drop_table_cascades_to_indexes_and_rows() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        create_table(tx.as_mut(), &schemaless("t")).unwrap();
        create_index(
            tx.as_mut(),
            &IndexConfig {
                name: "ix".into(),
                table: "t".into(),
                unique: false,
                fields: vec![FieldPath::single("a")],
            },
        )
        .unwrap();
        tx.put(&row_key("t", &Value::Int(1)), b"row").unwrap();
        let mut entry = index_prefix("ix");
        entry.push(0xAA);
        tx.put(&entry, b"pk").unwrap();

        drop_table(tx.as_mut(), "t").unwrap();

        assert!(tx.get(&table_config_key("t")).unwrap().is_none());
        assert!(tx.get(&index_config_key("ix")).unwrap().is_none());
        assert!(tx.get(&row_key("t", &Value::Int(1))).unwrap().is_none());
        assert!(tx.get(&entry).unwrap().is_none());
    }

    #[test]
    fn allocate_seq_advances_and_persists() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        create_table(tx.as_mut(), &schemaless("t")).unwrap();
        assert_eq!(allocate_seq(tx.as_mut(), "t").unwrap(), 1);
        assert_eq!(allocate_seq(tx.as_mut(), "t").unwrap(), 2);
        assert_eq!(get_table(tx.as_ref(), "t").unwrap().next_seq, 3);
    }

    #[test]
    fn dropping_missing_objects_reports_not_found() {
        let engine = MemoryEngine::new();
        let mut tx = engine.begin(true).unwrap();
        assert!(drop_table(tx.as_mut(), "ghost").unwrap_err().is_not_found());
        assert!(drop_index(tx.as_mut(), "ghost").unwrap_err().is_not_found());
    }
}
