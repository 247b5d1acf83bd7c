use thiserror::Error;

use crate::store::{StoreError, StoreErrorKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    #[error("current transaction is aborted, commands ignored until end of transaction block")]
    TransactionAborted,
    #[error("savepoint \"{0}\" does not exist")]
    SavepointNotFound(String),
    #[error("savepoint \"{0}\" can only be used as a restart savepoint as the first statement of a transaction")]
    InvalidRestartPlacement(String),
    #[error("restart transaction: {0}")]
    RetryableStore(String),
    #[error("{0}")]
    NonRetryableStore(String),
    #[error("commit failed: {reason}")]
    CommitFailed { reason: String, retryable: bool },
    #[error("there is no transaction in progress: {0}")]
    NoTransaction(String),
    #[error("there is already a transaction in progress")]
    TransactionInProgress,
    #[error("query execution canceled")]
    Cancelled,
    #[error("session is already executing a statement")]
    SessionBusy,
    #[error("session is closed")]
    SessionClosed,
    #[error("syntax error: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure tag attached to a statement outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Retryable,
    NonRetryable,
}

impl TxnError {
    /// Whether resubmitting the whole transaction can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TxnError::RetryableStore(_) => true,
            TxnError::CommitFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn class(&self) -> FailureClass {
        if self.is_retryable() {
            FailureClass::Retryable
        } else {
            FailureClass::NonRetryable
        }
    }

    pub(crate) fn commit_failed(err: StoreError) -> Self {
        TxnError::CommitFailed {
            retryable: err.is_retryable(),
            reason: err.message,
        }
    }
}

impl From<StoreError> for TxnError {
    fn from(err: StoreError) -> Self {
        match err.kind {
            StoreErrorKind::Retryable => TxnError::RetryableStore(err.message),
            StoreErrorKind::NonRetryable => TxnError::NonRetryableStore(err.message),
            StoreErrorKind::Cancelled => TxnError::Cancelled,
        }
    }
}
