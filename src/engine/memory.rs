//! In-memory reference engine.
//!
//! The committed state is an immutable snapshot behind an `Arc`. Read
//! transactions clone the `Arc` (O(1)) and keep reading that snapshot for
//! their whole lifetime, which gives snapshot isolation for free. A write
//! transaction takes the engine-wide writer mutex (waiters block), clones
//! the tree, mutates the clone, and publishes it on commit with a single
//! pointer swap. Rollback and drop just discard the clone.
//!
//! The full-tree clone makes writes O(n); this engine is the contract
//! reference and test backend, not a production store.

use super::{Direction, Engine, EngineTransaction, KvPair};
use crate::error::{Error, Result};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

type Store = BTreeMap<Vec<u8>, Vec<u8>>;

struct Shared {
    committed: RwLock<Arc<Store>>,
    writer: Arc<Mutex<()>>,
}

#[derive(Clone)]
pub struct MemoryEngine {
    shared: Arc<Shared>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        MemoryEngine {
            shared: Arc::new(Shared {
                committed: RwLock::new(Arc::new(Store::new())),
                writer: Arc::new(Mutex::new(())),
            }),
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemoryEngine {
    fn begin(&self, writable: bool) -> Result<Box<dyn EngineTransaction>> {
        if writable {
            // Blocks until the current writer (if any) finishes.
            let guard = Mutex::lock_arc(&self.shared.writer);
            let working = (**self.shared.committed.read()).clone();
            Ok(Box::new(MemoryTransaction {
                shared: Arc::clone(&self.shared),
                snapshot: Arc::new(Store::new()),
                working: Some(working),
                state: TxState::Active,
                _writer: Some(guard),
            }))
        } else {
            let snapshot = Arc::clone(&self.shared.committed.read());
            Ok(Box::new(MemoryTransaction {
                shared: Arc::clone(&self.shared),
                snapshot,
                working: None,
                state: TxState::Active,
                _writer: None,
            }))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Active,
    Committed,
    RolledBack,
}

pub struct MemoryTransaction {
    shared: Arc<Shared>,
    snapshot: Arc<Store>,
    working: Option<Store>,
    state: TxState,
    _writer: Option<ArcMutexGuard<RawMutex, ()>>,
}

impl MemoryTransaction {
    fn store(&self) -> &Store {
        self.working.as_ref().unwrap_or(&self.snapshot)
    }

    fn check_active(&self) -> Result<()> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::Committed => Err(Error::engine("transaction already committed")),
            TxState::RolledBack => Err(Error::engine("transaction already rolled back")),
        }
    }

    fn working_mut(&mut self) -> Result<&mut Store> {
        self.check_active()?;
        self.working
            .as_mut()
            .ok_or_else(|| Error::engine("write on read-only transaction"))
    }
}

impl EngineTransaction for MemoryTransaction {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_active()?;
        Ok(self.store().get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.working_mut()?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        match self.working_mut()?.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound("key".into())),
        }
    }

    fn iterate<'a>(
        &'a self,
        from: &[u8],
        direction: Direction,
    ) -> Result<Box<dyn Iterator<Item = Result<KvPair>> + 'a>> {
        self.check_active()?;
        let store = self.store();
        match direction {
            Direction::Forward => {
                let range = store.range::<[u8], _>((Bound::Included(from), Bound::Unbounded));
                Ok(Box::new(range.map(|(k, v)| Ok((k.clone(), v.clone())))))
            }
            Direction::Reverse => {
                let upper = if from.is_empty() {
                    Bound::Unbounded
                } else {
                    Bound::Included(from)
                };
                let range = store.range::<[u8], _>((Bound::Unbounded, upper));
                Ok(Box::new(range.rev().map(|(k, v)| Ok((k.clone(), v.clone())))))
            }
        }
    }

    fn commit(&mut self) -> Result<()> {
        self.check_active()?;
        if let Some(working) = self.working.take() {
            *self.shared.committed.write() = Arc::new(working);
        }
        self.state = TxState::Committed;
        self._writer = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.check_active()?;
        self.working = None;
        self.state = TxState::RolledBack;
        self._writer = None;
        Ok(())
    }
}
