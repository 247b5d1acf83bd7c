use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::store::{StoreError, TxnStore, Value, WriteOp};

/// Shared flag used to cancel the statement a session is running.
///
/// Cancellation is cooperative: it is observed before every store call the
/// statement makes and before COMMIT.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn check(&self) -> Result<(), StoreError> {
        if self.is_cancelled() {
            Err(StoreError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// What an ordinary statement gets to work with: its transaction and
/// nothing else.
pub struct StatementCtx<'c, S: TxnStore> {
    store: &'c S,
    txn: &'c S::Handle,
    cancel: &'c CancelToken,
}

impl<'c, S: TxnStore> StatementCtx<'c, S> {
    pub(crate) fn new(store: &'c S, txn: &'c S::Handle, cancel: &'c CancelToken) -> Self {
        StatementCtx {
            store,
            txn,
            cancel,
        }
    }

    pub fn write(&mut self, op: WriteOp) -> Result<u64, StoreError> {
        self.cancel.check()?;
        self.store.write(self.txn, op)
    }

    pub fn read(&mut self, key: &str) -> Result<Option<Value>, StoreError> {
        self.cancel.check()?;
        self.store.read(self.txn, key)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
