use log::{debug, warn};

use crate::error::TxnError;
use crate::savepoint::SavepointStack;
use crate::store::TxnStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Every write since the restart savepoint is gone and the transaction
    /// runs in a new epoch. The caller may resubmit the failed statement.
    Rewound { savepoint: String },
    /// No restart savepoint is active; the failure ends the transaction.
    NotRestartable,
    /// A restart savepoint exists but rewinding to it failed.
    RewindFailed(TxnError),
}

/// Absorbs retryable failures of transactions that declared a restart
/// savepoint. It never re-executes anything itself.
#[derive(Debug, Default)]
pub struct RetryCoordinator {
    rewinds: u64,
}

impl RetryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_retryable<S>(
        &mut self,
        stack: &mut SavepointStack<S::Token>,
        store: &S,
        txn: &S::Handle,
        cause: &TxnError,
    ) -> RetryDecision
    where
        S: TxnStore,
    {
        let name = match stack.restart() {
            Some(sp) => sp.name().to_string(),
            None => {
                debug!("No restart savepoint; retryable error ends the transaction: {}", cause);
                return RetryDecision::NotRestartable;
            }
        };

        if let Err(err) = stack.rollback_to_restart(store, txn) {
            warn!("Failed to rewind to restart savepoint {}: {}", name, err);
            return RetryDecision::RewindFailed(err);
        }
        if let Err(err) = store.bump_epoch(txn) {
            warn!("Failed to advance epoch after rewinding to {}: {}", name, err);
            return RetryDecision::RewindFailed(err.into());
        }

        self.rewinds += 1;
        debug!(
            "Rewound to restart savepoint {} after: {} (rewind #{})",
            name, cause, self.rewinds
        );
        RetryDecision::Rewound { savepoint: name }
    }

    /// Number of successful rewinds performed so far.
    pub fn rewinds(&self) -> u64 {
        self.rewinds
    }
}
