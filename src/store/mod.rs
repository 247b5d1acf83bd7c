use std::fmt::Debug;

use thiserror::Error;

pub mod memory;

pub type Key = String;
pub type Value = Vec<u8>;

/// A single mutation issued by a statement through its transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl WriteOp {
    pub fn put(key: impl Into<Key>, value: impl Into<Value>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Key>) -> Self {
        WriteOp::Delete { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Transient conflict; the same work under a fresh epoch may succeed.
    Retryable,
    NonRetryable,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn retryable(message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::Retryable,
            message: message.into(),
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        StoreError {
            kind: StoreErrorKind::NonRetryable,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        StoreError {
            kind: StoreErrorKind::Cancelled,
            message: "operation canceled".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == StoreErrorKind::Retryable
    }
}

/// The narrow slice of a transactional key-value store that the session
/// layer relies on.
///
/// Every call may block on the network. Implementations are shared between
/// sessions, so methods take `&self` and synchronize internally. A handle is
/// only ever used by the session that began it.
pub trait TxnStore {
    type Handle: Debug;
    type Token: Debug + Clone;

    fn begin(&self) -> Result<Self::Handle, StoreError>;

    /// Applies `op` inside the transaction and returns the rows affected.
    fn write(&self, txn: &Self::Handle, op: WriteOp) -> Result<u64, StoreError>;

    /// Reads `key` as seen by the transaction, including its own writes.
    fn read(&self, txn: &Self::Handle, key: &str) -> Result<Option<Value>, StoreError>;

    fn create_savepoint(&self, txn: &Self::Handle) -> Result<Self::Token, StoreError>;

    /// Discards every write performed after `token` was created.
    fn rollback_to_savepoint(&self, txn: &Self::Handle, token: &Self::Token) -> Result<(), StoreError>;

    /// Moves the transaction to a fresh conflict epoch without changing its
    /// identity. Subsequent operations are evaluated at a newer read point.
    fn bump_epoch(&self, txn: &Self::Handle) -> Result<(), StoreError>;

    fn commit(&self, txn: &Self::Handle) -> Result<(), StoreError>;

    /// Releases the transaction. Aborting twice is not an error.
    fn abort(&self, txn: &Self::Handle) -> Result<(), StoreError>;
}
