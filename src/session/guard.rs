use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::error::TxnError;
use crate::store::{StoreError, TxnStore};

/// Marks a session as executing a statement until dropped.
pub(crate) struct InFlight {
    flag: Arc<AtomicBool>,
}

impl InFlight {
    pub(crate) fn enter(flag: &Arc<AtomicBool>) -> Result<Self, TxnError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TxnError::SessionBusy)?;
        Ok(InFlight { flag: flag.clone() })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Store transaction backing a single autocommit statement. Aborted on drop
/// unless it committed.
pub(crate) struct ImplicitTxn<'s, S: TxnStore> {
    store: &'s S,
    handle: S::Handle,
    finished: bool,
}

impl<'s, S: TxnStore> ImplicitTxn<'s, S> {
    pub(crate) fn begin(store: &'s S) -> Result<Self, StoreError> {
        let handle = store.begin()?;
        Ok(ImplicitTxn {
            store,
            handle,
            finished: false,
        })
    }

    pub(crate) fn handle(&self) -> &S::Handle {
        &self.handle
    }

    pub(crate) fn commit(mut self) -> Result<(), StoreError> {
        self.store.commit(&self.handle)?;
        self.finished = true;
        Ok(())
    }
}

impl<S: TxnStore> Drop for ImplicitTxn<'_, S> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.store.abort(&self.handle) {
                warn!("Failed to abort implicit transaction {:?}: {}", self.handle, err);
            }
        }
    }
}
