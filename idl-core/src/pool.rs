#![forbid(unsafe_code)]

//! Leases of global-only symbol tables for concurrent pruning.
//!
//! A frozen [`SymbolTable`] owns a [`ClonePool`]. Each lease hands out a table
//! sharing the frozen global scope with an empty local stack; the table goes
//! back to the pool when the lease is released or dropped.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::IdlError;
use crate::symtab::SymbolTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Tables created when the pool is set up.
    pub initial: usize,
    /// Tables added each time the pool runs dry.
    pub growth: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            initial: 5,
            growth: 5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub created: usize,
    pub available: usize,
    /// Leases that came back with local scopes still pushed.
    pub unbalanced: usize,
}

#[derive(Debug)]
pub struct ClonePool {
    shell: SymbolTable,
    free: Mutex<Vec<SymbolTable>>,
    release_lock: Mutex<()>,
    created: AtomicUsize,
    unbalanced: AtomicUsize,
    options: PoolOptions,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ClonePool {
    pub(crate) fn new(shell: SymbolTable, options: PoolOptions) -> Self {
        let free = (0..options.initial).map(|_| shell.global_only()).collect();
        Self {
            shell,
            free: Mutex::new(free),
            release_lock: Mutex::new(()),
            created: AtomicUsize::new(options.initial),
            unbalanced: AtomicUsize::new(0),
            options,
        }
    }

    pub(crate) fn lease(self: &Arc<Self>) -> SymtabLease {
        let mut table = {
            let mut free = lock(&self.free);
            if free.is_empty() {
                let growth = self.options.growth.max(1);
                free.extend((0..growth).map(|_| self.shell.global_only()));
                let total = self.created.fetch_add(growth, Ordering::Relaxed) + growth;
                debug!(growth, total, "symbol table pool grown");
            }
            free.pop().unwrap_or_else(|| self.shell.global_only())
        };
        table.attach_pool(Arc::clone(self));
        trace!("symbol table leased");
        SymtabLease {
            table,
            pool: Arc::clone(self),
            released: false,
        }
    }

    fn recycle(&self, mut table: SymbolTable) {
        table.reset_to_global();
        table.detach_pool();
        lock(&self.free).push(table);
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            available: lock(&self.free).len(),
            unbalanced: self.unbalanced.load(Ordering::Relaxed),
        }
    }
}

/// Exclusive use of a global-only symbol table.
///
/// The table is returned to its pool on [`SymtabLease::release`] or on drop.
/// Releasing consumes the lease, so a table cannot be released twice.
#[derive(Debug)]
pub struct SymtabLease {
    table: SymbolTable,
    pool: Arc<ClonePool>,
    released: bool,
}

impl SymtabLease {
    /// Returns the table to the pool. Fails, after recycling the table
    /// anyway, if local scopes are still pushed.
    pub fn release(mut self) -> Result<(), IdlError> {
        let _guard = lock(&self.pool.release_lock);
        let levels = self.table.levels();
        let callstack = self.table.callstack();
        let table = std::mem::take(&mut self.table);
        self.released = true;
        self.pool.recycle(table);
        trace!(levels, "symbol table released");
        if levels > 1 {
            self.pool.unbalanced.fetch_add(1, Ordering::Relaxed);
            return Err(IdlError::InvalidOperation {
                message: format!(
                    "released a symbol table with {} local scope(s) still pushed",
                    levels - 1
                ),
                callstack,
            });
        }
        Ok(())
    }
}

impl Deref for SymtabLease {
    type Target = SymbolTable;

    fn deref(&self) -> &SymbolTable {
        &self.table
    }
}

impl DerefMut for SymtabLease {
    fn deref_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }
}

impl Drop for SymtabLease {
    fn drop(&mut self) {
        if !self.released {
            let _guard = lock(&self.pool.release_lock);
            let levels = self.table.levels();
            if levels > 1 {
                self.pool.unbalanced.fetch_add(1, Ordering::Relaxed);
                warn!(
                    levels,
                    callstack = ?self.table.callstack(),
                    "symbol table dropped with local scopes still pushed"
                );
            }
            let table = std::mem::take(&mut self.table);
            self.pool.recycle(table);
            trace!("symbol table returned on drop");
        }
    }
}
