use std::fmt::Debug;

use log::debug;

use super::savepoint::{normalize, Savepoint};
use crate::error::TxnError;
use crate::store::TxnStore;

/// Savepoints of the current transaction, oldest first.
///
/// Entries are only ever removed from the top, so rollback and release are
/// plain truncations to the index of the target entry.
#[derive(Debug)]
pub struct SavepointStack<T> {
    entries: Vec<Savepoint<T>>,
    next_seq: u64,
}

impl<T> Default for SavepointStack<T> {
    fn default() -> Self {
        SavepointStack {
            entries: Vec::new(),
            next_seq: 0,
        }
    }
}

impl<T: Debug + Clone> SavepointStack<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a savepoint on top of the stack.
    ///
    /// `pristine` tells whether the transaction has run no statement since it
    /// began; a restart savepoint is only accepted then, and only on an empty
    /// stack, so its snapshot is the transaction's initial state.
    pub fn push<S>(
        &mut self,
        store: &S,
        txn: &S::Handle,
        name: &str,
        is_restart: bool,
        pristine: bool,
    ) -> Result<&Savepoint<T>, TxnError>
    where
        S: TxnStore<Token = T>,
    {
        if is_restart && (self.restart().is_some() || !self.entries.is_empty() || !pristine) {
            return Err(TxnError::InvalidRestartPlacement(name.to_string()));
        }

        let token = store.create_savepoint(txn)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!(
            "Created savepoint {} (restart: {}, seq: {}, depth: {})",
            name,
            is_restart,
            seq,
            self.entries.len() + 1
        );
        self.entries.push(Savepoint::new(name, is_restart, token, seq));
        Ok(&self.entries[self.entries.len() - 1])
    }

    fn position_from_top(&self, name: &str) -> Option<usize> {
        let key = normalize(name);
        self.entries.iter().rposition(|sp| sp.matches(&key))
    }

    /// Most recently created savepoint called `name`.
    pub fn find_from_top(&self, name: &str) -> Option<&Savepoint<T>> {
        self.position_from_top(name).map(|idx| &self.entries[idx])
    }

    /// Rewinds the store to the savepoint and drops every savepoint created
    /// after it. The target stays on the stack.
    pub fn rollback_to<S>(&mut self, store: &S, txn: &S::Handle, name: &str) -> Result<&Savepoint<T>, TxnError>
    where
        S: TxnStore<Token = T>,
    {
        let idx = self
            .position_from_top(name)
            .ok_or_else(|| TxnError::SavepointNotFound(name.to_string()))?;
        self.rewind_to(store, txn, idx)
    }

    /// Rolls back to the restart savepoint, even when a newer savepoint
    /// shadows its name.
    pub fn rollback_to_restart<S>(&mut self, store: &S, txn: &S::Handle) -> Result<&Savepoint<T>, TxnError>
    where
        S: TxnStore<Token = T>,
    {
        let idx = self
            .entries
            .iter()
            .position(|sp| sp.is_restart)
            .ok_or_else(|| TxnError::SavepointNotFound("restart savepoint".to_string()))?;
        self.rewind_to(store, txn, idx)
    }

    fn rewind_to<S>(&mut self, store: &S, txn: &S::Handle, idx: usize) -> Result<&Savepoint<T>, TxnError>
    where
        S: TxnStore<Token = T>,
    {
        store.rollback_to_savepoint(txn, &self.entries[idx].token)?;

        let dropped = self.entries.len() - idx - 1;
        self.entries.truncate(idx + 1);
        debug!(
            "Rolled back to savepoint {} (dropped {} above it)",
            self.entries[idx].name, dropped
        );
        Ok(&self.entries[idx])
    }

    /// Forgets the savepoint and every savepoint above it. Writes are kept.
    pub fn release_down_to(&mut self, name: &str) -> Result<usize, TxnError> {
        let idx = self
            .position_from_top(name)
            .ok_or_else(|| TxnError::SavepointNotFound(name.to_string()))?;
        let released = self.entries.len() - idx;
        self.entries.truncate(idx);
        debug!("Released savepoint {} ({} entries)", name, released);
        Ok(released)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn restart(&self) -> Option<&Savepoint<T>> {
        self.entries.iter().find(|sp| sp.is_restart)
    }

    /// `(name, is_restart)` pairs, top of the stack first.
    pub fn names(&self) -> Vec<(String, bool)> {
        self.entries
            .iter()
            .rev()
            .map(|sp| (sp.name.clone(), sp.is_restart))
            .collect()
    }

    /// Oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Savepoint<T>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
