use std::sync::Once;

use crate::config::SessionConfig;
use crate::result::StatementOutcome;
use crate::session::{Boundary, Session};
use crate::store::memory::MemoryStore;
use crate::store::{StoreError, WriteOp};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

pub fn new_session() -> (MemoryStore, Session<MemoryStore>) {
    new_session_with(SessionConfig::default())
}

pub fn new_session_with(config: SessionConfig) -> (MemoryStore, Session<MemoryStore>) {
    init_logging();
    let store = MemoryStore::new();
    let session = Session::with_config(store.clone(), config);
    (store, session)
}

pub fn put(key: &'static str) -> Boundary<'static, MemoryStore> {
    Boundary::ordinary(move |ctx| ctx.write(WriteOp::put(key, "1")).map(StatementOutcome::rows))
}

/// Statement that fails with a transient conflict after writing `key`.
pub fn conflict_after(key: &'static str) -> Boundary<'static, MemoryStore> {
    Boundary::ordinary(move |ctx| {
        ctx.write(WriteOp::put(key, "partial"))?;
        Err(StoreError::retryable("injected conflict"))
    })
}

pub fn conflict() -> Boundary<'static, MemoryStore> {
    Boundary::ordinary(|_| Err(StoreError::retryable("injected conflict")))
}

pub fn fail(message: &'static str) -> Boundary<'static, MemoryStore> {
    Boundary::ordinary(move |_| Err(StoreError::non_retryable(message)))
}
