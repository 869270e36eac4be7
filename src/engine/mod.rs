//! # Storage Engine Abstraction
//!
//! Uniform ordered key-value contract implemented by interchangeable
//! backends. The database layer never touches a backend directly; it goes
//! through [`Engine`] and [`EngineTransaction`], so a B+tree-on-disk or
//! LSM backend plugs in by satisfying the same contract as the in-memory
//! reference engine.
//!
//! ## Contract
//!
//! Every backend must guarantee:
//!
//! 1. **Single writer**: at most one writable transaction is active at a
//!    time; `begin(true)` blocks until the current writer commits or
//!    rolls back.
//! 2. **Snapshot isolation**: a read-only transaction observes the state
//!    as of its start, unaffected by later commits.
//! 3. **Ordered lazy iteration**: `iterate` yields `(key, value)` pairs
//!    in strict ascending or descending byte order from the seek key,
//!    without materializing the range.
//! 4. **Discard on drop**: a transaction dropped without commit leaves
//!    the store unchanged.
//! 5. Operating on a finished transaction is an `Engine` error, never a
//!    silent no-op.
//!
//! The [`conformance`] module packages these guarantees as a reusable
//! test suite; every backend implementation is expected to run it.

pub mod conformance;
pub mod memory;

pub use memory::MemoryEngine;

use crate::error::Result;

/// Iteration direction for [`EngineTransaction::iterate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending byte order, starting at the first key >= the seek key.
    Forward,
    /// Descending byte order, starting at the last key <= the seek key.
    /// An empty seek key means "from the end of the key space".
    Reverse,
}

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Factory for transactions over one ordered key-value store.
pub trait Engine: Send + Sync {
    fn begin(&self, writable: bool) -> Result<Box<dyn EngineTransaction>>;
}

/// A transaction over an ordered key-value store.
///
/// Mutating calls on a read-only transaction, and any call on a committed
/// or rolled-back transaction, fail with an `Engine` error. Dropping an
/// unfinished transaction rolls it back.
pub trait EngineTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Removes a key. Fails with `NotFound` if the key is absent.
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Lazy ordered iteration from the seek key. The iterator borrows the
    /// transaction and must be dropped before the transaction finishes.
    fn iterate<'a>(
        &'a self,
        from: &[u8],
        direction: Direction,
    ) -> Result<Box<dyn Iterator<Item = Result<KvPair>> + 'a>>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;
}
