//! # Database
//!
//! Public entry point tying the layers together. A [`Database`] wraps one
//! storage [`Engine`] and executes SQL scripts against it.
//!
//! Transaction scoping:
//!
//! - [`exec`] runs each statement of a script under its own transaction,
//!   committed on success. The first failure rolls back that statement's
//!   transaction and aborts the script; earlier statements stay
//!   committed. The error reports the failing statement's index.
//! - [`query`] returns lazy [`Rows`] backed by a read-only snapshot
//!   transaction that lives as long as the `Rows` value. Leading
//!   statements of the script run first, each like `exec`; the final
//!   statement must be a SELECT.
//! - [`view`] and [`update_in`] expose one explicit transaction to a
//!   closure, read-only and writable respectively. `update_in` commits
//!   only when the closure returns `Ok`.
//!
//! [`exec`]: Database::exec
//! [`query`]: Database::query
//! [`view`]: Database::view
//! [`update_in`]: Database::update_in

pub mod catalog;
pub mod index;
pub mod table;

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::engine::{Engine, EngineTransaction};
use crate::error::{Error, Result};
use crate::sql::ast::Statement;
use crate::sql::executor::{self, SelectExec};
use crate::sql::parse_script;
use crate::types::Document;

/// Cooperative cancellation flag. Clones share the flag; cancelling any
/// clone stops every execution pulling on it at its next row.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct Database {
    engine: Box<dyn Engine>,
}

impl Database {
    pub fn new(engine: impl Engine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Runs a script, discarding any result rows.
    pub fn exec(&self, script: &str) -> Result<()> {
        self.exec_with(script, &CancelToken::new())
    }

    pub fn exec_with(&self, script: &str, cancel: &CancelToken) -> Result<()> {
        let statements = parse_script(script)?;
        debug!(statements = statements.len(), "executing script");
        for (index, stmt) in statements.iter().enumerate() {
            self.run_one(index, stmt, cancel)?;
        }
        Ok(())
    }

    fn run_one(&self, index: usize, stmt: &Statement, cancel: &CancelToken) -> Result<()> {
        let mut tx = self
            .engine
            .begin(!stmt.is_read_only())
            .map_err(|e| statement_error(index, e))?;
        match executor::execute(tx.as_mut(), stmt, cancel) {
            Ok(_) => tx.commit().map_err(|e| statement_error(index, e)),
            Err(err) => {
                let _ = tx.rollback();
                Err(statement_error(index, err))
            }
        }
    }

    /// Runs a script whose final statement is a SELECT, returning its
    /// rows lazily. The snapshot the rows read from is taken after the
    /// leading statements commit.
    pub fn query(&self, script: &str) -> Result<Rows> {
        self.query_with(script, &CancelToken::new())
    }

    pub fn query_with(&self, script: &str, cancel: &CancelToken) -> Result<Rows> {
        let mut statements = parse_script(script)?;
        let Some(Statement::Select(select)) = statements.pop() else {
            return Err(Error::Validation(
                "query expects the final statement to be a SELECT".into(),
            ));
        };
        for (index, stmt) in statements.iter().enumerate() {
            self.run_one(index, stmt, cancel)?;
        }
        let last_index = statements.len();
        let tx = self.engine.begin(false)?;
        let exec = SelectExec::new(tx.as_ref(), select, cancel.clone())
            .map_err(|e| statement_error(last_index, e))?;
        Ok(Rows {
            tx,
            exec,
            closed: false,
        })
    }

    /// Runs a closure against one read-only snapshot transaction.
    pub fn view<T>(&self, f: impl FnOnce(&Tx) -> Result<T>) -> Result<T> {
        let mut tx = self.engine.begin(false)?;
        let result = f(&Tx::new(tx.as_mut()));
        let _ = tx.rollback();
        result
    }

    /// Runs a closure against one writable transaction, committing only
    /// when the closure succeeds.
    pub fn update_in<T>(&self, f: impl FnOnce(&Tx) -> Result<T>) -> Result<T> {
        let mut tx = self.engine.begin(true)?;
        match f(&Tx::new(tx.as_mut())) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }
}

fn statement_error(index: usize, source: Error) -> Error {
    Error::Statement {
        index,
        source: Box::new(source),
    }
}

/// Lazy SELECT results holding their snapshot transaction. Dropping or
/// [`close`](Rows::close)-ing releases it.
pub struct Rows {
    tx: Box<dyn EngineTransaction>,
    exec: SelectExec,
    closed: bool,
}

impl Rows {
    /// Pulls the next row. `Ok(None)` marks the end of the results.
    pub fn next_row(&mut self) -> Result<Option<Document>> {
        self.exec.next(self.tx.as_ref())
    }

    /// Drains the remaining rows.
    pub fn collect_all(mut self) -> Result<Vec<Document>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Releases the underlying snapshot transaction.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.tx.rollback()
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Iterator for Rows {
    type Item = Result<Document>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.tx.rollback();
        }
    }
}

/// Handle passed to [`Database::view`] and [`Database::update_in`]
/// closures. Every call runs in the transaction the closure was opened
/// with; nothing is visible outside until that transaction commits.
pub struct Tx<'a> {
    inner: RefCell<&'a mut dyn EngineTransaction>,
    cancel: CancelToken,
}

impl<'a> Tx<'a> {
    fn new(tx: &'a mut dyn EngineTransaction) -> Self {
        Self {
            inner: RefCell::new(tx),
            cancel: CancelToken::new(),
        }
    }

    /// Runs a script inside the transaction, returning the total number
    /// of rows affected.
    pub fn exec(&self, script: &str) -> Result<u64> {
        let mut total = 0;
        let statements = parse_script(script)?;
        for stmt in &statements {
            let mut tx = self.inner.borrow_mut();
            total += executor::execute(&mut **tx, stmt, &self.cancel)?;
        }
        Ok(total)
    }

    /// Runs a single SELECT and materializes its rows.
    pub fn query_all(&self, script: &str) -> Result<Vec<Document>> {
        let mut statements = parse_script(script)?;
        let Some(Statement::Select(select)) = statements.pop() else {
            return Err(Error::Validation(
                "query expects the final statement to be a SELECT".into(),
            ));
        };
        for stmt in &statements {
            let mut tx = self.inner.borrow_mut();
            executor::execute(&mut **tx, stmt, &self.cancel)?;
        }
        let tx = self.inner.borrow();
        let mut exec = SelectExec::new(&**tx, select, self.cancel.clone())?;
        let mut rows = Vec::new();
        while let Some(row) = exec.next(&**tx)? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let tx = self.inner.borrow();
        Ok(catalog::list_tables(&**tx)?
            .into_iter()
            .map(|t| t.name)
            .collect())
    }

    pub fn list_indexes(&self) -> Result<Vec<String>> {
        let tx = self.inner.borrow();
        Ok(catalog::list_indexes(&**tx)?
            .into_iter()
            .map(|ix| ix.name)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::types::Value;

    fn db() -> Database {
        Database::new(MemoryEngine::new())
    }

    #[test]
    fn exec_commits_each_statement() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY); INSERT INTO t VALUES (1)")
            .unwrap();
        let rows = db.query("SELECT id FROM t").unwrap().collect_all().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn failing_statement_reports_its_index_and_keeps_earlier_commits() {
        let db = db();
        let err = db
            .exec("CREATE TABLE t (id INT PRIMARY KEY); INSERT INTO missing VALUES (1)")
            .unwrap_err();
        let Error::Statement { index, source } = err else {
            panic!("expected statement error")
        };
        assert_eq!(index, 1);
        assert!(source.is_not_found());
        // the CREATE TABLE before the failure stayed committed
        db.exec("INSERT INTO t VALUES (1)").unwrap();
    }

    #[test]
    fn query_runs_leading_statements_then_streams_the_select() {
        let db = db();
        let rows = db
            .query(
                "CREATE TABLE t (id INT PRIMARY KEY);
                 INSERT INTO t VALUES (2), (1);
                 SELECT id FROM t",
            )
            .unwrap()
            .collect_all()
            .unwrap();
        assert_eq!(rows[0].get("id"), Some(&Value::Int(1)));
        assert_eq!(rows[1].get("id"), Some(&Value::Int(2)));
    }

    #[test]
    fn query_rejects_scripts_not_ending_in_select() {
        let db = db();
        let err = db.query("CREATE TABLE t").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rows_iterate_lazily_over_a_snapshot() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY); INSERT INTO t VALUES (1), (2)")
            .unwrap();
        let mut rows = db.query("SELECT id FROM t").unwrap();
        assert!(rows.next_row().unwrap().is_some());
        // writes after the snapshot stay invisible to it
        db.exec("INSERT INTO t VALUES (3)").unwrap();
        assert!(rows.next_row().unwrap().is_some());
        assert!(rows.next_row().unwrap().is_none());
        rows.close().unwrap();
    }

    #[test]
    fn update_in_rolls_back_on_error() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
        let result: Result<()> = db.update_in(|tx| {
            tx.exec("INSERT INTO t VALUES (1)")?;
            Err(Error::Validation("abort".into()))
        });
        assert!(result.is_err());
        let rows = db.query("SELECT * FROM t").unwrap().collect_all().unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn update_in_commits_on_success() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY)").unwrap();
        let affected = db
            .update_in(|tx| tx.exec("INSERT INTO t VALUES (1), (2)"))
            .unwrap();
        assert_eq!(affected, 2);
        let names = db.view(|tx| tx.list_tables()).unwrap();
        assert_eq!(names, vec!["t".to_string()]);
    }

    #[test]
    fn view_sees_a_consistent_snapshot() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY); INSERT INTO t VALUES (1)")
            .unwrap();
        let count = db
            .view(|tx| Ok(tx.query_all("SELECT * FROM t")?.len()))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn cancel_token_stops_a_query() {
        let db = db();
        db.exec("CREATE TABLE t (id INT PRIMARY KEY); INSERT INTO t VALUES (1)")
            .unwrap();
        let cancel = CancelToken::new();
        let mut rows = db.query_with("SELECT * FROM t", &cancel).unwrap();
        cancel.cancel();
        let err = rows.next_row().unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
