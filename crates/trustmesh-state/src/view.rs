use std::sync::{Mutex, MutexGuard};

/// A handle representing an active write batch against the store. Modeled
/// as an explicit value threaded through calls (rather than ambient/
/// thread-local state) per the design note in §9: the outermost caller
/// begins the batch via [`crate::store::StateStore::begin_write`]; nested
/// store calls accept `Option<&WriteBatch>` and reuse the active one when
/// given, starting a fresh one-statement batch otherwise.
pub struct WriteBatch<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl<'a> WriteBatch<'a> {
    pub(crate) fn new(guard: MutexGuard<'a, ()>) -> Self {
        Self { _guard: guard }
    }
}

/// Serializes writers so multi-tree updates (transaction + indexes + head
/// set) are applied as a group without interleaving from another writer.
/// Readers are never blocked by this lock — sled trees are independently
/// consistent per key.
#[derive(Default)]
pub struct WriteLock(Mutex<()>);

impl WriteLock {
    pub fn begin(&self) -> WriteBatch<'_> {
        WriteBatch::new(self.0.lock().expect("state write lock poisoned"))
    }
}
