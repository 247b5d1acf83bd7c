//! Per-connection transaction and savepoint handling for a SQL front end
//! sitting on a transactional key-value store.
//!
//! A [`Session`] receives one statement boundary at a time, keeps the
//! transaction state and savepoint stack, and absorbs retryable store
//! failures when the transaction declared a restart savepoint.

pub mod config;
pub mod error;
pub mod result;
pub mod retry;
pub mod savepoint;
pub mod script;
pub mod session;
pub mod sql;
pub mod state;
pub mod store;
pub mod worker;

pub use config::SessionConfig;
pub use error::{FailureClass, TxnError};
pub use result::{Execution, StatementOutcome};
pub use session::{Boundary, CancelToken, Session, SessionStatus, StatementCtx};
pub use state::TxnState;
pub use store::memory::MemoryStore;
pub use store::{StoreError, TxnStore, WriteOp};
pub use worker::{SessionClient, SessionWorker};

#[cfg(test)]
mod tests;
