use std::fmt;

use super::context::StatementCtx;
use crate::result::StatementOutcome;
use crate::sql::boundary::ControlStatement;
use crate::state::StatementKind;
use crate::store::{StoreError, TxnStore};

/// Body of an ordinary statement. It only sees the transaction it runs in.
pub type Thunk<'a, S> =
    Box<dyn FnOnce(&mut StatementCtx<'_, S>) -> Result<StatementOutcome, StoreError> + Send + 'a>;

/// One unit submitted to a session.
pub enum Boundary<'a, S: TxnStore> {
    Begin,
    Commit,
    Rollback,
    /// `restart` forces the restart role regardless of the name.
    Savepoint { name: String, restart: bool },
    Release(String),
    RollbackTo(String),
    Ordinary(Thunk<'a, S>),
}

impl<'a, S: TxnStore> Boundary<'a, S> {
    pub fn ordinary<F>(f: F) -> Self
    where
        F: FnOnce(&mut StatementCtx<'_, S>) -> Result<StatementOutcome, StoreError> + Send + 'a,
    {
        Boundary::Ordinary(Box::new(f))
    }

    pub fn savepoint(name: impl Into<String>) -> Self {
        Boundary::Savepoint {
            name: name.into(),
            restart: false,
        }
    }

    pub fn restart_savepoint(name: impl Into<String>) -> Self {
        Boundary::Savepoint {
            name: name.into(),
            restart: true,
        }
    }

    pub fn release(name: impl Into<String>) -> Self {
        Boundary::Release(name.into())
    }

    pub fn rollback_to(name: impl Into<String>) -> Self {
        Boundary::RollbackTo(name.into())
    }

    pub fn kind(&self) -> StatementKind {
        match self {
            Boundary::Begin => StatementKind::Begin,
            Boundary::Commit => StatementKind::Commit,
            Boundary::Rollback => StatementKind::Rollback,
            Boundary::Savepoint { .. } => StatementKind::Savepoint,
            Boundary::Release(_) => StatementKind::Release,
            Boundary::RollbackTo(_) => StatementKind::RollbackTo,
            Boundary::Ordinary(_) => StatementKind::Ordinary,
        }
    }
}

impl<S: TxnStore> fmt::Debug for Boundary<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Boundary::Begin => write!(f, "BEGIN"),
            Boundary::Commit => write!(f, "COMMIT"),
            Boundary::Rollback => write!(f, "ROLLBACK"),
            Boundary::Savepoint { name, restart } => {
                write!(f, "SAVEPOINT {}", name)?;
                if *restart {
                    write!(f, " (restart)")?;
                }
                Ok(())
            }
            Boundary::Release(name) => write!(f, "RELEASE SAVEPOINT {}", name),
            Boundary::RollbackTo(name) => write!(f, "ROLLBACK TO SAVEPOINT {}", name),
            Boundary::Ordinary(_) => write!(f, "<statement>"),
        }
    }
}

impl<S: TxnStore> From<ControlStatement> for Boundary<'_, S> {
    fn from(stmt: ControlStatement) -> Self {
        match stmt {
            ControlStatement::Begin => Boundary::Begin,
            ControlStatement::Commit => Boundary::Commit,
            ControlStatement::Rollback => Boundary::Rollback,
            ControlStatement::Savepoint(name) => Boundary::savepoint(name),
            ControlStatement::Release(name) => Boundary::Release(name),
            ControlStatement::RollbackTo(name) => Boundary::RollbackTo(name),
        }
    }
}
