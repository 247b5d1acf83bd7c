use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TxnError;

/// Transaction status of a session, as reported by SHOW TRANSACTION STATUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxnState {
    NoTxn,
    Open,
    Aborted,
}

impl Default for TxnState {
    fn default() -> Self {
        TxnState::NoTxn
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxnState::NoTxn => "NoTxn",
            TxnState::Open => "Open",
            TxnState::Aborted => "Aborted",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Release,
    RollbackTo,
    Ordinary,
}

impl StatementKind {
    pub fn tag(&self) -> &'static str {
        match self {
            StatementKind::Begin => "BEGIN",
            StatementKind::Commit => "COMMIT",
            StatementKind::Rollback => "ROLLBACK",
            StatementKind::Savepoint => "SAVEPOINT",
            StatementKind::Release => "RELEASE SAVEPOINT",
            StatementKind::RollbackTo => "ROLLBACK TO SAVEPOINT",
            StatementKind::Ordinary => "statement",
        }
    }
}

/// What happened while executing a boundary; input to [`TxnState::next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnEvent {
    Begin,
    StatementSucceeded,
    StatementFailed { retryable: bool, restart_active: bool },
    CommitSucceeded,
    CommitFailed,
    Rollback,
    SavepointChanged,
    RollbackToSucceeded,
    RollbackToMissing,
    RewindFailed,
    Cancelled,
}

impl TxnState {
    /// A store transaction handle is held in exactly these states.
    pub fn holds_txn(self) -> bool {
        matches!(self, TxnState::Open | TxnState::Aborted)
    }

    /// Checks whether a statement of `kind` may run in this state at all.
    pub fn admits(self, kind: StatementKind) -> Result<(), TxnError> {
        match (self, kind) {
            (TxnState::Aborted, StatementKind::Rollback | StatementKind::RollbackTo) => Ok(()),
            (TxnState::Aborted, _) => Err(TxnError::TransactionAborted),
            (TxnState::Open, StatementKind::Begin) => Err(TxnError::TransactionInProgress),
            (
                TxnState::NoTxn,
                StatementKind::Savepoint | StatementKind::Release | StatementKind::RollbackTo,
            ) => Err(TxnError::NoTransaction(format!(
                "{} can only be used in transaction blocks",
                kind.tag()
            ))),
            _ => Ok(()),
        }
    }

    pub fn next(self, event: TxnEvent) -> TxnState {
        use TxnEvent::*;
        use TxnState::*;

        match (self, event) {
            (NoTxn, Begin) => Open,
            // Implicit transactions and no-op control statements never leave NoTxn.
            (NoTxn, _) => NoTxn,

            (Open, StatementFailed { retryable: true, restart_active: true }) => Open,
            (Open, StatementFailed { .. }) => Aborted,
            (Open, CommitSucceeded | Rollback) => NoTxn,
            (Open, CommitFailed | RewindFailed | Cancelled) => Aborted,
            (Open, _) => Open,

            (Aborted, Rollback) => NoTxn,
            (Aborted, RollbackToSucceeded) => Open,
            (Aborted, _) => Aborted,
        }
    }
}
