use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use super::{Key, StoreError, TxnStore, Value, WriteOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryTxn {
    id: u64,
}

impl MemoryTxn {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Snapshot token: the length of the owning transaction's write log when the
/// savepoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMark {
    txn: u64,
    len: usize,
}

#[derive(Debug, Clone)]
struct Committed {
    // None is a tombstone left by a committed delete.
    value: Option<Value>,
    commit_ts: u64,
}

#[derive(Debug)]
struct TxnRecord {
    read_ts: u64,
    epoch: u32,
    writes: Vec<(Key, Option<Value>)>,
}

impl TxnRecord {
    fn own_write(&self, key: &str) -> Option<&Option<Value>> {
        self.writes.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

#[derive(Debug, Default)]
struct Inner {
    committed: BTreeMap<Key, Committed>,
    txns: HashMap<u64, TxnRecord>,
    next_txn_id: u64,
    clock: u64,
    write_faults: VecDeque<StoreError>,
    commit_faults: VecDeque<StoreError>,
}

fn record_mut<'a>(
    txns: &'a mut HashMap<u64, TxnRecord>,
    txn: &MemoryTxn,
) -> Result<&'a mut TxnRecord, StoreError> {
    txns.get_mut(&txn.id)
        .ok_or_else(|| StoreError::non_retryable(format!("transaction {} not found", txn.id)))
}

fn committed_after(committed: &BTreeMap<Key, Committed>, key: &str, ts: u64) -> Option<u64> {
    committed
        .get(key)
        .map(|c| c.commit_ts)
        .filter(|commit_ts| *commit_ts > ts)
}

/// In-process transactional key-value store.
///
/// Each transaction reads at the logical timestamp it started (or last bumped
/// its epoch) at and buffers its writes in a log. Savepoints are positions in
/// that log. Commit fails with a retryable error when another transaction
/// committed one of the written keys after the read timestamp.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::non_retryable("Failed to acquire store lock"))
    }

    pub fn committed_value(&self, key: &str) -> Option<Value> {
        let inner = self.lock().ok()?;
        inner.committed.get(key).and_then(|c| c.value.clone())
    }

    pub fn committed_keys(&self) -> Vec<Key> {
        match self.lock() {
            Ok(inner) => inner
                .committed
                .iter()
                .filter(|(_, c)| c.value.is_some())
                .map(|(k, _)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Transactions that have begun and not yet been committed or aborted.
    pub fn open_transactions(&self) -> usize {
        self.lock().map(|inner| inner.txns.len()).unwrap_or(0)
    }

    pub fn epoch(&self, txn: &MemoryTxn) -> Option<u32> {
        let inner = self.lock().ok()?;
        inner.txns.get(&txn.id).map(|r| r.epoch)
    }

    /// Makes the next `write` on any transaction fail with `err`.
    pub fn fail_next_write(&self, err: StoreError) {
        if let Ok(mut inner) = self.lock() {
            inner.write_faults.push_back(err);
        }
    }

    /// Makes the next `commit` on any transaction fail with `err`.
    pub fn fail_next_commit(&self, err: StoreError) {
        if let Ok(mut inner) = self.lock() {
            inner.commit_faults.push_back(err);
        }
    }
}

impl TxnStore for MemoryStore {
    type Handle = MemoryTxn;
    type Token = WriteMark;

    fn begin(&self) -> Result<MemoryTxn, StoreError> {
        let mut inner = self.lock()?;
        inner.next_txn_id += 1;
        let id = inner.next_txn_id;
        let read_ts = inner.clock;
        inner.txns.insert(
            id,
            TxnRecord {
                read_ts,
                epoch: 0,
                writes: Vec::new(),
            },
        );
        debug!("Began store transaction {} at timestamp {}", id, read_ts);
        Ok(MemoryTxn { id })
    }

    fn write(&self, txn: &MemoryTxn, op: WriteOp) -> Result<u64, StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let record = record_mut(&mut inner.txns, txn)?;

        if let Some(err) = inner.write_faults.pop_front() {
            debug!("Injected write failure for transaction {}: {}", txn.id, err);
            return Err(err);
        }

        if let Some(commit_ts) = committed_after(&inner.committed, op.key(), record.read_ts) {
            return Err(StoreError::retryable(format!(
                "write too old: key {:?} committed at {} after transaction {} read at {}",
                op.key(),
                commit_ts,
                txn.id,
                record.read_ts
            )));
        }

        let existed = match record.own_write(op.key()) {
            Some(value) => value.is_some(),
            None => inner
                .committed
                .get(op.key())
                .map_or(false, |c| c.value.is_some()),
        };

        let rows = match op {
            WriteOp::Put { key, value } => {
                record.writes.push((key, Some(value)));
                1
            }
            WriteOp::Delete { key } => {
                record.writes.push((key, None));
                u64::from(existed)
            }
        };
        Ok(rows)
    }

    fn read(&self, txn: &MemoryTxn, key: &str) -> Result<Option<Value>, StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let record = record_mut(&mut inner.txns, txn)?;

        if let Some(value) = record.own_write(key) {
            return Ok(value.clone());
        }

        match inner.committed.get(key) {
            Some(c) if c.commit_ts > record.read_ts => Err(StoreError::retryable(format!(
                "read within uncertainty interval: key {:?} committed at {} after read timestamp {}",
                key, c.commit_ts, record.read_ts
            ))),
            Some(c) => Ok(c.value.clone()),
            None => Ok(None),
        }
    }

    fn create_savepoint(&self, txn: &MemoryTxn) -> Result<WriteMark, StoreError> {
        let mut inner = self.lock()?;
        let record = record_mut(&mut inner.txns, txn)?;
        Ok(WriteMark {
            txn: txn.id,
            len: record.writes.len(),
        })
    }

    fn rollback_to_savepoint(&self, txn: &MemoryTxn, token: &WriteMark) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = record_mut(&mut inner.txns, txn)?;
        if token.txn != txn.id || token.len > record.writes.len() {
            return Err(StoreError::non_retryable(format!(
                "savepoint token {:?} is not valid for transaction {}",
                token, txn.id
            )));
        }
        let discarded = record.writes.len() - token.len;
        record.writes.truncate(token.len);
        debug!("Transaction {} discarded {} writes", txn.id, discarded);
        Ok(())
    }

    fn bump_epoch(&self, txn: &MemoryTxn) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let record = record_mut(&mut inner.txns, txn)?;
        record.epoch += 1;
        record.read_ts = inner.clock;
        debug!(
            "Transaction {} moved to epoch {} reading at {}",
            txn.id, record.epoch, record.read_ts
        );
        Ok(())
    }

    fn commit(&self, txn: &MemoryTxn) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        let record = record_mut(&mut inner.txns, txn)?;

        let failure = match inner.commit_faults.pop_front() {
            Some(err) => Some(err),
            None => record.writes.iter().find_map(|(key, _)| {
                committed_after(&inner.committed, key, record.read_ts).map(|commit_ts| {
                    StoreError::retryable(format!(
                        "write conflict on key {:?}: committed at {} after read timestamp {}",
                        key, commit_ts, record.read_ts
                    ))
                })
            }),
        };
        // A failed commit leaves the transaction open so the caller can
        // rewind it or abort it.
        if let Some(err) = failure {
            debug!("Commit of transaction {} failed: {}", txn.id, err);
            return Err(err);
        }

        let writes = std::mem::take(&mut record.writes);
        inner.txns.remove(&txn.id);
        inner.clock += 1;
        let commit_ts = inner.clock;
        for (key, value) in writes {
            inner.committed.insert(key, Committed { value, commit_ts });
        }
        debug!("Committed transaction {} at timestamp {}", txn.id, commit_ts);
        Ok(())
    }

    fn abort(&self, txn: &MemoryTxn) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if inner.txns.remove(&txn.id).is_some() {
            debug!("Aborted store transaction {}", txn.id);
        }
        Ok(())
    }
}
