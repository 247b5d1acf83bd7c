mod boundary;
mod context;
mod guard;

pub use boundary::{Boundary, Thunk};
pub use context::{CancelToken, StatementCtx};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::error::TxnError;
use crate::result::{Execution, StatementOutcome};
use crate::retry::{RetryCoordinator, RetryDecision};
use crate::savepoint::{SavepointInfo, SavepointStack};
use crate::state::{StatementKind, TxnEvent, TxnState};
use crate::store::{StoreErrorKind, TxnStore, Value};
use guard::{ImplicitTxn, InFlight};

/// Store transaction owned by the session between BEGIN and COMMIT/ROLLBACK.
#[derive(Debug)]
struct LiveTxn<H> {
    handle: H,
    // No boundary has run since BEGIN.
    pristine: bool,
    // The store side is already aborted; only the session still holds it.
    released: bool,
}

/// Snapshot of a session for SHOW-style introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: u64,
    pub state: TxnState,
    /// Top of the stack first.
    pub savepoints: Vec<SavepointInfo>,
    pub steps: u64,
    pub rewinds: u64,
}

/// Transaction controller for a single client connection.
///
/// Statements are executed strictly one at a time. The session owns at most
/// one store transaction and aborts it when dropped.
pub struct Session<S: TxnStore> {
    id: u64,
    store: S,
    config: SessionConfig,
    state: TxnState,
    stack: SavepointStack<S::Token>,
    txn: Option<LiveTxn<S::Handle>>,
    retry: RetryCoordinator,
    steps: u64,
    cancel: CancelToken,
    busy: Arc<AtomicBool>,
}

impl<S: TxnStore> Session<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SessionConfig::default())
    }

    pub fn with_config(store: S, config: SessionConfig) -> Self {
        let id = rand::random::<u64>();
        debug!("Opened session {}", id);
        Session {
            id,
            store,
            config,
            state: TxnState::NoTxn,
            stack: SavepointStack::new(),
            txn: None,
            retry: RetryCoordinator::new(),
            steps: 0,
            cancel: CancelToken::new(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Token that cancels whatever statement [`Session::execute`] is running.
    ///
    /// A cancel issued while the session is idle stays pending and fails the
    /// next statement, so a client can cancel a COMMIT it is about to send.
    /// The token is cleared once that statement finishes.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn current_status(&self) -> TxnState {
        self.state
    }

    /// `(name, is_restart)` pairs, top of the stack first.
    pub fn savepoint_names(&self) -> Vec<(String, bool)> {
        self.stack.names()
    }

    /// Boundaries executed so far, rejected ones included.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            state: self.state,
            savepoints: self.stack.iter().rev().map(|sp| sp.info()).collect(),
            steps: self.steps,
            rewinds: self.retry.rewinds(),
        }
    }

    /// Reads `key` the way the next statement would see it.
    pub fn read(&self, key: &str) -> Result<Option<Value>, TxnError> {
        match &self.txn {
            Some(txn) if txn.released => Err(TxnError::TransactionAborted),
            Some(txn) => Ok(self.store.read(&txn.handle, key)?),
            None => {
                let implicit = ImplicitTxn::begin(&self.store)?;
                Ok(self.store.read(implicit.handle(), key)?)
            }
        }
    }

    pub fn execute(&mut self, boundary: Boundary<'_, S>) -> Execution {
        let cancel = self.cancel.clone();
        let execution = self.execute_cancellable(boundary, &cancel);
        cancel.reset();
        execution
    }

    /// Like [`Session::execute`], observing `cancel` instead of the
    /// session's own token.
    pub fn execute_cancellable(&mut self, boundary: Boundary<'_, S>, cancel: &CancelToken) -> Execution {
        let _in_flight = match InFlight::enter(&self.busy) {
            Ok(guard) => guard,
            Err(err) => return Execution::new(self.state, Err(err)),
        };

        self.steps += 1;
        let before = self.state;
        let kind = boundary.kind();

        let outcome = match self.state.admits(kind) {
            Ok(()) => self.dispatch(boundary, cancel),
            Err(err) => {
                if self.config.log_rejected_statements {
                    warn!(
                        "Session {} rejected {} in state {}: {}",
                        self.id,
                        kind.tag(),
                        self.state,
                        err
                    );
                }
                Err(err)
            }
        };

        let began = before == TxnState::NoTxn && kind == StatementKind::Begin;
        if let Some(txn) = self.txn.as_mut() {
            if !began {
                txn.pristine = false;
            }
        }

        debug!(
            "Session {} step {}: {} {} -> {}",
            self.id,
            self.steps,
            kind.tag(),
            before,
            self.state
        );
        Execution::new(self.state, outcome)
    }

    fn dispatch(&mut self, boundary: Boundary<'_, S>, cancel: &CancelToken) -> Result<StatementOutcome, TxnError> {
        match boundary {
            Boundary::Begin => self.begin(),
            Boundary::Commit => self.commit(cancel),
            Boundary::Rollback => self.rollback(),
            Boundary::Savepoint { name, restart } => self.savepoint(&name, restart),
            Boundary::Release(name) => self.release(&name),
            Boundary::RollbackTo(name) => self.rollback_to(&name),
            Boundary::Ordinary(thunk) if self.state == TxnState::NoTxn => self.run_implicit(thunk, cancel),
            Boundary::Ordinary(thunk) => self.run_in_txn(thunk, cancel),
        }
    }

    fn transition(&mut self, event: TxnEvent) {
        let next = self.state.next(event);
        if next != self.state {
            debug!("Session {}: {} -> {} on {:?}", self.id, self.state, next, event);
        }
        self.state = next;
    }

    fn begin(&mut self) -> Result<StatementOutcome, TxnError> {
        let handle = self.store.begin()?;
        debug!("Session {} began transaction {:?}", self.id, handle);
        self.txn = Some(LiveTxn {
            handle,
            pristine: true,
            released: false,
        });
        self.stack.clear();
        self.transition(TxnEvent::Begin);
        Ok(StatementOutcome::done())
    }

    fn commit(&mut self, cancel: &CancelToken) -> Result<StatementOutcome, TxnError> {
        if self.state == TxnState::NoTxn {
            warn!("Session {}: COMMIT with no transaction in progress", self.id);
            return Ok(StatementOutcome::done());
        }
        if let Err(err) = cancel.check() {
            self.abandon_txn();
            return Err(err.into());
        }

        let txn = self
            .txn
            .as_ref()
            .ok_or_else(|| TxnError::NoTransaction("COMMIT".to_string()))?;
        match self.store.commit(&txn.handle) {
            Ok(()) => {
                self.txn = None;
                self.stack.clear();
                self.transition(TxnEvent::CommitSucceeded);
                Ok(StatementOutcome::done())
            }
            Err(err) => {
                // The store transaction stays live: the client may ROLLBACK TO
                // a savepoint and try again, or ROLLBACK.
                warn!("Session {} commit failed: {}", self.id, err);
                self.transition(TxnEvent::CommitFailed);
                Err(TxnError::commit_failed(err))
            }
        }
    }

    fn rollback(&mut self) -> Result<StatementOutcome, TxnError> {
        match self.txn.take() {
            Some(txn) => {
                if !txn.released {
                    if let Err(err) = self.store.abort(&txn.handle) {
                        warn!("Failed to abort {:?}: {}", txn.handle, err);
                    }
                }
                self.stack.clear();
                self.transition(TxnEvent::Rollback);
            }
            None => warn!("Session {}: ROLLBACK with no transaction in progress", self.id),
        }
        Ok(StatementOutcome::done())
    }

    fn savepoint(&mut self, name: &str, restart: bool) -> Result<StatementOutcome, TxnError> {
        let is_restart = restart || self.config.is_restart_name(name);
        let txn = self
            .txn
            .as_ref()
            .ok_or_else(|| TxnError::NoTransaction("SAVEPOINT".to_string()))?;
        self.stack
            .push(&self.store, &txn.handle, name, is_restart, txn.pristine)?;
        self.transition(TxnEvent::SavepointChanged);
        Ok(StatementOutcome::done())
    }

    fn release(&mut self, name: &str) -> Result<StatementOutcome, TxnError> {
        self.stack.release_down_to(name)?;
        self.transition(TxnEvent::SavepointChanged);
        Ok(StatementOutcome::done())
    }

    fn rollback_to(&mut self, name: &str) -> Result<StatementOutcome, TxnError> {
        let txn = self
            .txn
            .as_ref()
            .ok_or_else(|| TxnError::NoTransaction("ROLLBACK TO SAVEPOINT".to_string()))?;
        if txn.released {
            // Nothing left in the store to rewind.
            return Err(TxnError::TransactionAborted);
        }

        let rewound = self
            .stack
            .rollback_to(&self.store, &txn.handle, name)
            .map(|sp| sp.is_restart());
        let bumped = match rewound {
            Ok(true) => self.store.bump_epoch(&txn.handle).map_err(TxnError::from),
            Ok(false) => Ok(()),
            Err(err) => Err(err),
        };

        match bumped {
            Ok(()) => {
                self.transition(TxnEvent::RollbackToSucceeded);
                Ok(StatementOutcome::done())
            }
            Err(err @ TxnError::SavepointNotFound(_)) => {
                self.transition(TxnEvent::RollbackToMissing);
                Err(err)
            }
            Err(err) => {
                warn!("Session {} failed to roll back to {}: {}", self.id, name, err);
                self.transition(TxnEvent::RewindFailed);
                Err(err)
            }
        }
    }

    /// Autocommit path. The state stays NoTxn whatever happens.
    fn run_implicit(&mut self, thunk: Thunk<'_, S>, cancel: &CancelToken) -> Result<StatementOutcome, TxnError> {
        let implicit = ImplicitTxn::begin(&self.store)?;
        let result = {
            let mut ctx = StatementCtx::new(&self.store, implicit.handle(), cancel);
            thunk(&mut ctx)
        };
        let outcome = result?;
        cancel.check()?;
        implicit.commit().map_err(TxnError::commit_failed)?;
        Ok(outcome)
    }

    fn run_in_txn(&mut self, thunk: Thunk<'_, S>, cancel: &CancelToken) -> Result<StatementOutcome, TxnError> {
        let txn = self
            .txn
            .as_ref()
            .ok_or_else(|| TxnError::NoTransaction("statement".to_string()))?;

        // A statement that unwinds leaves the transaction unusable.
        self.state = TxnState::Aborted;
        let result = {
            let mut ctx = StatementCtx::new(&self.store, &txn.handle, cancel);
            thunk(&mut ctx)
        };
        self.state = TxnState::Open;

        let err = match result {
            Ok(outcome) => {
                self.transition(TxnEvent::StatementSucceeded);
                return Ok(outcome);
            }
            Err(err) => err,
        };

        match err.kind {
            StoreErrorKind::Cancelled => {
                self.abandon_txn();
                Err(TxnError::Cancelled)
            }
            StoreErrorKind::Retryable => {
                let cause = TxnError::from(err);
                let decision = match self.txn.as_ref() {
                    Some(txn) => self
                        .retry
                        .on_retryable(&mut self.stack, &self.store, &txn.handle, &cause),
                    None => RetryDecision::NotRestartable,
                };
                match decision {
                    RetryDecision::Rewound { savepoint } => {
                        self.transition(TxnEvent::StatementFailed {
                            retryable: true,
                            restart_active: true,
                        });
                        Ok(StatementOutcome::Rewound { savepoint })
                    }
                    RetryDecision::NotRestartable => {
                        self.transition(TxnEvent::StatementFailed {
                            retryable: true,
                            restart_active: false,
                        });
                        Err(cause)
                    }
                    RetryDecision::RewindFailed(rewind_err) => {
                        warn!(
                            "Session {} could not absorb retryable error {}: {}",
                            self.id, cause, rewind_err
                        );
                        self.transition(TxnEvent::RewindFailed);
                        Err(cause)
                    }
                }
            }
            StoreErrorKind::NonRetryable => {
                let restart_active = self.stack.restart().is_some();
                self.transition(TxnEvent::StatementFailed {
                    retryable: false,
                    restart_active,
                });
                Err(err.into())
            }
        }
    }

    /// Aborts the store transaction after a cancellation. The session keeps
    /// the handle and sits in Aborted until the client rolls back.
    fn abandon_txn(&mut self) {
        if let Some(txn) = self.txn.as_mut() {
            if !txn.released {
                if let Err(err) = self.store.abort(&txn.handle) {
                    warn!("Failed to abort {:?} on cancel: {}", txn.handle, err);
                }
                txn.released = true;
            }
        }
        warn!("Session {}: statement canceled, transaction aborted", self.id);
        self.transition(TxnEvent::Cancelled);
    }
}

impl<S: TxnStore> Drop for Session<S> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            if txn.released {
                return;
            }
            match self.store.abort(&txn.handle) {
                Ok(()) => debug!("Session {} closed; aborted {:?}", self.id, txn.handle),
                Err(err) => warn!("Session {} failed to abort {:?} on close: {}", self.id, txn.handle, err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::{StoreError, WriteOp};

    fn put<'a>(key: &'a str) -> Boundary<'a, MemoryStore> {
        Boundary::ordinary(move |ctx| ctx.write(WriteOp::put(key, "v")).map(StatementOutcome::rows))
    }

    #[test]
    fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let mut session = Session::new(store.clone());

        assert_eq!(session.execute(Boundary::Begin).state, TxnState::Open);
        assert!(session.execute(put("a")).is_ok());
        assert_eq!(store.committed_value("a"), None);
        assert_eq!(session.execute(Boundary::Commit).state, TxnState::NoTxn);
        assert_eq!(store.committed_value("a"), Some(b"v".to_vec()));
        assert_eq!(session.steps(), 3);
    }

    #[test]
    fn test_implicit_statement_autocommits() {
        let store = MemoryStore::new();
        let mut session = Session::new(store.clone());
        let exec = session.execute(put("auto"));
        assert_eq!(exec.state, TxnState::NoTxn);
        assert_eq!(exec.outcome, Ok(StatementOutcome::rows(1)));
        assert_eq!(store.committed_value("auto"), Some(b"v".to_vec()));
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_failed_implicit_statement_leaves_nothing() {
        let store = MemoryStore::new();
        let mut session = Session::new(store.clone());
        let exec = session.execute(Boundary::ordinary(|ctx| {
            ctx.write(WriteOp::put("half", "1"))?;
            Err(StoreError::non_retryable("boom"))
        }));
        assert_eq!(exec.state, TxnState::NoTxn);
        assert_eq!(exec.error(), Some(&TxnError::NonRetryableStore("boom".to_string())));
        assert_eq!(store.committed_value("half"), None);
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_drop_aborts_open_transaction() {
        let store = MemoryStore::new();
        {
            let mut session = Session::new(store.clone());
            session.execute(Boundary::Begin);
            session.execute(put("pending"));
            assert_eq!(store.open_transactions(), 1);
        }
        assert_eq!(store.open_transactions(), 0);
        assert_eq!(store.committed_value("pending"), None);
    }

    #[test]
    fn test_read_sees_own_writes() {
        let store = MemoryStore::new();
        let mut session = Session::new(store);
        assert_eq!(session.read("k").unwrap(), None);
        session.execute(Boundary::Begin);
        session.execute(put("k"));
        assert_eq!(session.read("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_status_reports_stack_top_first() {
        let mut session = Session::new(MemoryStore::new());
        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("restart_point"));
        session.execute(Boundary::savepoint("inner"));

        let status = session.status();
        assert_eq!(status.state, TxnState::Open);
        let names: Vec<_> = status.savepoints.iter().map(|sp| sp.name.as_str()).collect();
        assert_eq!(names, vec!["inner", "restart_point"]);
        assert!(status.savepoints[1].is_restart);
        assert_eq!(status.rewinds, 0);
    }
}
