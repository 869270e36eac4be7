//! # Executor
//!
//! Volcano-style execution: a SELECT becomes a [`SelectExec`] that pulls
//! one row at a time through source, filter, sort, offset, limit, and
//! projection stages. Mutations run eagerly through [`execute`] and
//! report how many rows they touched.
//!
//! ```text
//! source (table scan | index scan | catalog) -> filter -> [sort]
//!     -> offset -> limit -> project
//! ```
//!
//! The filter stage always re-evaluates the complete WHERE clause, even
//! after an index scan already narrowed the candidates, so the planner
//! can never change results, only row fetch counts.
//!
//! UPDATE and DELETE first collect every matching row, then apply the
//! mutations, so a scan never observes its own writes.
//!
//! Expressions follow SQL's three-valued logic: comparing against NULL
//! yields NULL, and only rows whose predicate is exactly TRUE pass the
//! filter.

use tracing::debug;

use super::ast::*;
use super::planner::{self, AccessPath};
use crate::database::catalog::{self, IndexConfig, TableConfig, SYSTEM_TABLE};
use crate::database::index::IndexCursor;
use crate::database::table::{self, TableCursor};
use crate::database::CancelToken;
use crate::encoding::key::decode_component;
use crate::encoding::encode_single;
use crate::engine::EngineTransaction;
use crate::error::{Error, Result};
use crate::types::{Document, Value};

/// Runs one statement to completion, returning the number of rows
/// affected. A SELECT is drained and its rows discarded; callers that
/// want the rows go through [`SelectExec`] instead.
pub fn execute(
    tx: &mut dyn EngineTransaction,
    stmt: &Statement,
    cancel: &CancelToken,
) -> Result<u64> {
    match stmt {
        Statement::CreateTable(stmt) => create_table(tx, stmt),
        Statement::DropTable(stmt) => drop_table(tx, stmt),
        Statement::CreateIndex(stmt) => create_index(tx, stmt),
        Statement::DropIndex(stmt) => drop_index(tx, stmt),
        Statement::Insert(stmt) => insert(tx, stmt, cancel),
        Statement::Update(stmt) => update(tx, stmt, cancel),
        Statement::Delete(stmt) => delete(tx, stmt, cancel),
        Statement::Select(stmt) => {
            let mut exec = SelectExec::new(&*tx, stmt.clone(), cancel.clone())?;
            let mut rows = 0;
            while exec.next(&*tx)?.is_some() {
                rows += 1;
            }
            Ok(rows)
        }
    }
}

// -- DDL -------------------------------------------------------------------

fn create_table(tx: &mut dyn EngineTransaction, stmt: &CreateTableStmt) -> Result<u64> {
    let primary_key = stmt
        .fields
        .iter()
        .find(|f| f.primary_key)
        .map(|f| f.name.clone());
    let config = TableConfig {
        name: stmt.name.clone(),
        primary_key,
        next_seq: 1,
        fields: stmt
            .fields
            .iter()
            .map(|f| catalog::FieldConstraint {
                name: f.name.clone(),
                field_type: f.field_type,
            })
            .collect(),
    };
    match catalog::create_table(tx, &config) {
        Ok(()) => {
            debug!(table = %stmt.name, "table created");
            Ok(0)
        }
        Err(err) if stmt.if_not_exists && err.is_already_exists() => Ok(0),
        Err(err) => Err(err),
    }
}

fn drop_table(tx: &mut dyn EngineTransaction, stmt: &DropStmt) -> Result<u64> {
    match catalog::drop_table(tx, &stmt.name) {
        Ok(()) => {
            debug!(table = %stmt.name, "table dropped");
            Ok(0)
        }
        Err(err) if stmt.if_exists && err.is_not_found() => Ok(0),
        Err(err) => Err(err),
    }
}

fn create_index(tx: &mut dyn EngineTransaction, stmt: &CreateIndexStmt) -> Result<u64> {
    if catalog::is_reserved_name(&stmt.table) {
        return Err(Error::ConstraintViolation(format!(
            "table {} is read-only",
            stmt.table
        )));
    }
    let config = IndexConfig {
        name: stmt.name.clone(),
        table: stmt.table.clone(),
        unique: stmt.unique,
        fields: stmt.fields.clone(),
    };
    match catalog::create_index(tx, &config) {
        Ok(()) => {
            crate::database::index::backfill(tx, &config)?;
            debug!(index = %stmt.name, table = %stmt.table, "index created");
            Ok(0)
        }
        Err(err) if stmt.if_not_exists && err.is_already_exists() => Ok(0),
        Err(err) => Err(err),
    }
}

fn drop_index(tx: &mut dyn EngineTransaction, stmt: &DropStmt) -> Result<u64> {
    match catalog::drop_index(tx, &stmt.name) {
        Ok(()) => Ok(0),
        Err(err) if stmt.if_exists && err.is_not_found() => Ok(0),
        Err(err) => Err(err),
    }
}

// -- DML -------------------------------------------------------------------

fn writable_table(tx: &dyn EngineTransaction, name: &str) -> Result<TableConfig> {
    if catalog::is_reserved_name(name) {
        return Err(Error::ConstraintViolation(format!(
            "table {name} is read-only"
        )));
    }
    catalog::get_table(tx, name)
}

fn insert(
    tx: &mut dyn EngineTransaction,
    stmt: &InsertStmt,
    cancel: &CancelToken,
) -> Result<u64> {
    let config = writable_table(&*tx, &stmt.table)?;
    let indexes = catalog::indexes_on(&*tx, &stmt.table)?;

    let field_names: Vec<String> = match &stmt.fields {
        Some(names) => names.clone(),
        None => {
            if config.fields.is_empty() {
                return Err(Error::Validation(format!(
                    "INSERT into {} without a field list requires declared fields",
                    stmt.table
                )));
            }
            config.fields.iter().map(|f| f.name.clone()).collect()
        }
    };

    let mut count = 0;
    for row in &stmt.rows {
        cancel.check()?;
        if row.len() != field_names.len() {
            return Err(Error::Validation(format!(
                "INSERT expects {} values, got {}",
                field_names.len(),
                row.len()
            )));
        }
        let empty = Document::new();
        let mut doc = Document::with_capacity(row.len());
        for (name, expr) in field_names.iter().zip(row) {
            doc.insert(name.clone(), eval(expr, &empty, None)?);
        }
        table::insert(tx, &config, &indexes, doc)?;
        count += 1;
    }
    debug!(table = %stmt.table, rows = count, "insert");
    Ok(count)
}

fn update(
    tx: &mut dyn EngineTransaction,
    stmt: &UpdateStmt,
    cancel: &CancelToken,
) -> Result<u64> {
    let config = writable_table(&*tx, &stmt.table)?;
    let indexes = catalog::indexes_on(&*tx, &stmt.table)?;
    let matches = collect_matches(&*tx, &config, &indexes, stmt.where_clause.as_ref(), cancel)?;

    let mut count = 0;
    for (pk, doc) in matches {
        cancel.check()?;
        let mut updated = doc.clone();
        for (path, expr) in &stmt.assignments {
            let value = eval(expr, &doc, Some(&pk))?;
            path.set(&mut updated, value)?;
        }
        if let Some(field) = &config.primary_key {
            if updated.get(field) != doc.get(field) {
                return Err(Error::ConstraintViolation(format!(
                    "primary key field {field} cannot be modified"
                )));
            }
        }
        table::replace(tx, &config, &indexes, &encode_single(&pk), updated)?;
        count += 1;
    }
    debug!(table = %stmt.table, rows = count, "update");
    Ok(count)
}

fn delete(
    tx: &mut dyn EngineTransaction,
    stmt: &DeleteStmt,
    cancel: &CancelToken,
) -> Result<u64> {
    let config = writable_table(&*tx, &stmt.table)?;
    let indexes = catalog::indexes_on(&*tx, &stmt.table)?;
    let matches = collect_matches(&*tx, &config, &indexes, stmt.where_clause.as_ref(), cancel)?;

    let mut count = 0;
    for (pk, _) in matches {
        cancel.check()?;
        table::delete(tx, &config, &indexes, &encode_single(&pk))?;
        count += 1;
    }
    debug!(table = %stmt.table, rows = count, "delete");
    Ok(count)
}

/// Materializes the rows a WHERE clause matches before any of them are
/// touched.
fn collect_matches(
    tx: &dyn EngineTransaction,
    config: &TableConfig,
    indexes: &[IndexConfig],
    where_clause: Option<&Expr>,
    cancel: &CancelToken,
) -> Result<Vec<(Value, Document)>> {
    let mut source = Source::open(&config.name, indexes, where_clause)?;
    let mut matches = Vec::new();
    while let Some((pk, doc)) = source.next(tx)? {
        cancel.check()?;
        if passes(where_clause, &doc, &pk)? {
            matches.push((pk, doc));
        }
    }
    Ok(matches)
}

fn passes(where_clause: Option<&Expr>, doc: &Document, pk: &Value) -> Result<bool> {
    match where_clause {
        Some(expr) => Ok(eval(expr, doc, Some(pk))? == Value::Bool(true)),
        None => Ok(true),
    }
}

// -- Row source ------------------------------------------------------------

enum Source {
    Table(TableCursor),
    Index { cursor: IndexCursor, table: String },
    Catalog(std::vec::IntoIter<(Value, Document)>),
}

impl Source {
    fn open(table: &str, indexes: &[IndexConfig], where_clause: Option<&Expr>) -> Result<Self> {
        match planner::plan(indexes, where_clause) {
            AccessPath::FullScan => Ok(Source::Table(TableCursor::new(table))),
            AccessPath::Index { config, predicate } => Ok(Source::Index {
                cursor: IndexCursor::new(config, predicate),
                table: table.to_string(),
            }),
        }
    }

    fn next(&mut self, tx: &dyn EngineTransaction) -> Result<Option<(Value, Document)>> {
        match self {
            Source::Table(cursor) => match cursor.next(tx)? {
                Some((pk_enc, doc)) => {
                    let (pk, _) = decode_component(&pk_enc)?;
                    Ok(Some((pk, doc)))
                }
                None => Ok(None),
            },
            Source::Index { cursor, table } => loop {
                let Some(pk_enc) = cursor.next(tx)? else {
                    return Ok(None);
                };
                if let Some(doc) = table::get(tx, table, &pk_enc)? {
                    let (pk, _) = decode_component(&pk_enc)?;
                    return Ok(Some((pk, doc)));
                }
            },
            Source::Catalog(rows) => Ok(rows.next()),
        }
    }
}

// -- SELECT ----------------------------------------------------------------

/// Lazy SELECT execution. Each [`next`] call pulls rows from the source
/// until one passes the filter, then applies offset, limit, and
/// projection. An ORDER BY materializes the filtered rows on the first
/// pull and serves the tail stages from the sorted buffer.
///
/// [`next`]: SelectExec::next
pub struct SelectExec {
    stmt: SelectStmt,
    source: Source,
    sorted: Option<std::vec::IntoIter<(Value, Document)>>,
    offset: u64,
    limit: Option<u64>,
    cancel: CancelToken,
}

impl SelectExec {
    pub fn new(
        tx: &dyn EngineTransaction,
        stmt: SelectStmt,
        cancel: CancelToken,
    ) -> Result<Self> {
        let source = if stmt.table == SYSTEM_TABLE {
            Source::Catalog(catalog_rows(tx)?.into_iter())
        } else {
            if catalog::is_reserved_name(&stmt.table) {
                return Err(Error::NotFound(format!("table {}", stmt.table)));
            }
            catalog::get_table(tx, &stmt.table)?;
            let indexes = catalog::indexes_on(tx, &stmt.table)?;
            Source::open(&stmt.table, &indexes, stmt.where_clause.as_ref())?
        };

        let offset = match &stmt.offset {
            Some(expr) => eval_count(expr, "OFFSET")?,
            None => 0,
        };
        let limit = match &stmt.limit {
            Some(expr) => Some(eval_count(expr, "LIMIT")?),
            None => None,
        };

        Ok(Self {
            stmt,
            source,
            sorted: None,
            offset,
            limit,
            cancel,
        })
    }

    pub fn next(&mut self, tx: &dyn EngineTransaction) -> Result<Option<Document>> {
        if self.stmt.order_by.is_some() && self.sorted.is_none() {
            self.materialize_sorted(tx)?;
        }
        loop {
            self.cancel.check()?;
            if let Some(limit) = self.limit {
                if limit == 0 {
                    return Ok(None);
                }
            }
            let pair = match &mut self.sorted {
                Some(buffer) => buffer.next(),
                None => self.source.next(tx)?,
            };
            let Some((pk, doc)) = pair else {
                return Ok(None);
            };
            if self.sorted.is_none() && !passes(self.stmt.where_clause.as_ref(), &doc, &pk)? {
                continue;
            }
            if self.offset > 0 {
                self.offset -= 1;
                continue;
            }
            if let Some(limit) = &mut self.limit {
                *limit -= 1;
            }
            return Ok(Some(self.project(&doc, &pk)?));
        }
    }

    /// Drains the filtered source into a buffer sorted by the ORDER BY
    /// field. Rows missing the field sort as NULL, first ascending.
    fn materialize_sorted(&mut self, tx: &dyn EngineTransaction) -> Result<()> {
        let order = self.stmt.order_by.clone().unwrap();
        let mut rows = Vec::new();
        while let Some((pk, doc)) = self.source.next(tx)? {
            self.cancel.check()?;
            if passes(self.stmt.where_clause.as_ref(), &doc, &pk)? {
                rows.push((pk, doc));
            }
        }
        rows.sort_by(|(_, a), (_, b)| {
            let left = order.field.resolve(a).unwrap_or(&Value::Null);
            let right = order.field.resolve(b).unwrap_or(&Value::Null);
            let ordering = left.cmp(right);
            if order.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });
        self.sorted = Some(rows.into_iter());
        Ok(())
    }

    fn project(&self, doc: &Document, pk: &Value) -> Result<Document> {
        let mut out = Document::new();
        for projection in &self.stmt.projections {
            match projection {
                Projection::Wildcard => {
                    for (name, value) in doc.iter() {
                        out.insert(name.to_string(), value.clone());
                    }
                }
                Projection::Expr { expr, alias } => {
                    let name = alias.clone().unwrap_or_else(|| expr.display_name());
                    out.insert(name, eval(expr, doc, Some(pk))?);
                }
            }
        }
        Ok(out)
    }
}

/// Rows of the virtual catalog table, keyed by table name. The exposed
/// row carries a `table_name` field; the stored config layout stays
/// internal.
fn catalog_rows(tx: &dyn EngineTransaction) -> Result<Vec<(Value, Document)>> {
    let tables = catalog::list_tables(tx)?;
    Ok(tables
        .into_iter()
        .map(|config| {
            let mut row = Document::new();
            row.insert("table_name".to_string(), Value::Text(config.name.clone()));
            (Value::Text(config.name), row)
        })
        .collect())
}

fn eval_count(expr: &Expr, clause: &str) -> Result<u64> {
    match eval(expr, &Document::new(), None)? {
        Value::Int(n) if n >= 0 => Ok(n as u64),
        other => Err(Error::Validation(format!(
            "{clause} expects a non-negative integer, got {other}"
        ))),
    }
}

// -- Expression evaluation -------------------------------------------------

/// Evaluates an expression against one document. `pk` feeds the `pk()`
/// function; it is absent when evaluating outside row context, e.g.
/// VALUES tuples.
fn eval(expr: &Expr, doc: &Document, pk: Option<&Value>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Field(path) => Ok(path.resolve(doc).cloned().unwrap_or(Value::Null)),
        Expr::BinaryOp { left, op, right } => {
            let lhs = eval(left, doc, pk)?;
            let rhs = eval(right, doc, pk)?;
            apply_binary(*op, lhs, rhs)
        }
        Expr::Not(inner) => match truth(&eval(inner, doc, pk)?)? {
            Some(b) => Ok(Value::Bool(!b)),
            None => Ok(Value::Null),
        },
        Expr::Call { name, args } => call_function(name, args, doc, pk),
    }
}

fn apply_binary(op: BinaryOperator, lhs: Value, rhs: Value) -> Result<Value> {
    match op {
        BinaryOperator::And => match (truth(&lhs)?, truth(&rhs)?) {
            (Some(false), _) | (_, Some(false)) => Ok(Value::Bool(false)),
            (Some(true), Some(true)) => Ok(Value::Bool(true)),
            _ => Ok(Value::Null),
        },
        BinaryOperator::Or => match (truth(&lhs)?, truth(&rhs)?) {
            (Some(true), _) | (_, Some(true)) => Ok(Value::Bool(true)),
            (Some(false), Some(false)) => Ok(Value::Bool(false)),
            _ => Ok(Value::Null),
        },
        comparison => {
            if lhs.is_null() || rhs.is_null() {
                return Ok(Value::Null);
            }
            let ordering = lhs.cmp(&rhs);
            let result = match comparison {
                BinaryOperator::Eq => ordering.is_eq(),
                BinaryOperator::Neq => ordering.is_ne(),
                BinaryOperator::Lt => ordering.is_lt(),
                BinaryOperator::LtEq => ordering.is_le(),
                BinaryOperator::Gt => ordering.is_gt(),
                BinaryOperator::GtEq => ordering.is_ge(),
                BinaryOperator::And | BinaryOperator::Or => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        other => Err(Error::Validation(format!(
            "expected a boolean condition, got {}",
            other.value_type().name()
        ))),
    }
}

fn call_function(
    name: &str,
    args: &[Expr],
    doc: &Document,
    pk: Option<&Value>,
) -> Result<Value> {
    match name {
        "pk" => {
            expect_arity(name, args, 0)?;
            Ok(pk.cloned().unwrap_or(Value::Null))
        }
        "lower" | "upper" => {
            expect_arity(name, args, 1)?;
            match eval(&args[0], doc, pk)? {
                Value::Text(text) => Ok(Value::Text(if name == "lower" {
                    text.to_lowercase()
                } else {
                    text.to_uppercase()
                })),
                Value::Null => Ok(Value::Null),
                other => Err(Error::Validation(format!(
                    "{name}() expects text, got {}",
                    other.value_type().name()
                ))),
            }
        }
        _ => Err(Error::Validation(format!("unknown function {name}()"))),
    }
}

fn expect_arity(name: &str, args: &[Expr], arity: usize) -> Result<()> {
    if args.len() != arity {
        return Err(Error::Validation(format!(
            "{name}() expects {arity} arguments, got {}",
            args.len()
        )));
    }
    Ok(())
}
