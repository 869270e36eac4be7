//! # genji
//!
//! An embedded document database with a SQL-like query layer over a
//! pluggable ordered key-value storage engine.
//!
//! ## Architecture
//!
//! ```text
//!  +---------------------------------------------------------------+
//!  |  Database  (scripts, transactions scoping, Rows, CancelToken) |
//!  +---------------------------------------------------------------+
//!  |  SQL       lexer -> parser -> AST -> planner -> executor      |
//!  +---------------------------------------------------------------+
//!  |  Catalog / Table / Index managers                             |
//!  +---------------------------------------------------------------+
//!  |  Encoding  (order-preserving keys, framed documents)          |
//!  +---------------------------------------------------------------+
//!  |  Engine    (ordered KV contract; MemoryEngine reference)      |
//!  +---------------------------------------------------------------+
//! ```
//!
//! Rows are schemaless documents. Tables may declare typed constraints
//! and a primary key; rows are stored under the order-preserving
//! encoding of that key, so table scans come back in key order and
//! secondary indexes are plain sorted key ranges. One total order over
//! all values drives both in-memory comparison and key byte order,
//! which is what lets the planner swap a full scan for an index scan
//! without changing results.
//!
//! ## Example
//!
//! ```
//! use genji::{Database, MemoryEngine, Value};
//!
//! # fn main() -> genji::Result<()> {
//! let db = Database::new(MemoryEngine::new());
//! db.exec(
//!     "CREATE TABLE users (id INT PRIMARY KEY, name TEXT);
//!      INSERT INTO users VALUES (1, 'ada'), (2, 'alan')",
//! )?;
//! let rows = db.query("SELECT name FROM users WHERE id = 2")?;
//! for row in rows {
//!     assert_eq!(row?.get("name"), Some(&Value::Text("alan".into())));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Concurrency follows a single-writer, multi-reader model: opening a
//! writable transaction blocks until the previous writer finishes, and
//! read transactions see an immutable snapshot taken when they begin.

pub mod database;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod sql;
pub mod types;

pub use database::{CancelToken, Database, Rows, Tx};
pub use engine::{Direction, Engine, EngineTransaction, KvPair, MemoryEngine};
pub use error::{Error, Result};
pub use types::{Document, FieldPath, Value, ValueType};
