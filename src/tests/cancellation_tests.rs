#[cfg(test)]
mod tests {
    use std::panic::{self, AssertUnwindSafe};

    use crate::error::TxnError;
    use crate::result::StatementOutcome;
    use crate::session::Boundary;
    use crate::state::TxnState;
    use crate::store::memory::MemoryStore;
    use crate::store::WriteOp;
    use crate::tests::common::{new_session, put};

    #[test]
    fn test_cancel_inside_transaction_aborts() {
        let (store, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(put("committed_before_cancel"));

        let token = session.cancel_token();
        let exec = session.execute(Boundary::<MemoryStore>::ordinary(move |ctx| {
            ctx.write(WriteOp::put("a", "1"))?;
            token.cancel();
            ctx.write(WriteOp::put("b", "1"))?;
            Ok(StatementOutcome::rows(2))
        }));

        assert_eq!(exec.outcome, Err(TxnError::Cancelled));
        assert_eq!(exec.state, TxnState::Aborted);
        // The store transaction is released right away.
        assert_eq!(store.open_transactions(), 0);
        assert_eq!(session.read("a"), Err(TxnError::TransactionAborted));

        assert_eq!(
            session.execute(Boundary::Commit).outcome,
            Err(TxnError::TransactionAborted)
        );
        assert_eq!(session.execute(Boundary::Rollback).state, TxnState::NoTxn);
        assert!(store.committed_keys().is_empty());

        // The token is reset once the canceled statement finishes.
        assert!(session.execute(put("after")).is_ok());
        assert_eq!(store.committed_value("after"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_cancel_implicit_statement_leaves_nothing() {
        let (store, mut session) = new_session();
        let token = session.cancel_token();

        let exec = session.execute(Boundary::<MemoryStore>::ordinary(move |ctx| {
            ctx.write(WriteOp::put("a", "1"))?;
            token.cancel();
            Ok(StatementOutcome::rows(1))
        }));

        assert_eq!(exec.outcome, Err(TxnError::Cancelled));
        assert_eq!(exec.state, TxnState::NoTxn);
        assert_eq!(store.committed_value("a"), None);
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_cancel_before_commit() {
        let (store, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(put("x"));

        session.cancel_token().cancel();
        let exec = session.execute(Boundary::Commit);
        assert_eq!(exec.outcome, Err(TxnError::Cancelled));
        assert_eq!(exec.state, TxnState::Aborted);
        assert_eq!(store.committed_value("x"), None);
        assert_eq!(store.open_transactions(), 0);

        // The pending cancel was spent on the COMMIT.
        assert_eq!(session.execute(Boundary::Rollback).state, TxnState::NoTxn);
        assert!(session.execute(put("y")).is_ok());
        assert_eq!(store.committed_value("y"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_idle_cancel_fails_only_the_next_statement() {
        let (store, mut session) = new_session();

        session.cancel_token().cancel();
        let exec = session.execute(put("first"));
        assert_eq!(exec.outcome, Err(TxnError::Cancelled));
        assert_eq!(exec.state, TxnState::NoTxn);
        assert_eq!(store.committed_value("first"), None);

        assert!(session.execute(put("second")).is_ok());
        assert_eq!(store.committed_value("second"), Some(b"1".to_vec()));
    }

    #[test]
    fn test_panicking_statement_leaves_transaction_aborted() {
        let (store, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(put("x"));

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            session.execute(Boundary::<MemoryStore>::ordinary(|_| panic!("statement blew up")))
        }));
        assert!(unwound.is_err());
        assert_eq!(session.current_status(), TxnState::Aborted);

        // The in-flight guard was released during unwinding.
        assert_eq!(session.execute(Boundary::Rollback).state, TxnState::NoTxn);
        assert_eq!(store.open_transactions(), 0);
        assert_eq!(store.committed_value("x"), None);
    }

    #[test]
    fn test_dropping_session_releases_aborted_transaction() {
        let (store, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("a"));
        session.execute(Boundary::<MemoryStore>::ordinary(|_| {
            Err(crate::store::StoreError::non_retryable("boom"))
        }));
        assert_eq!(session.current_status(), TxnState::Aborted);
        assert_eq!(store.open_transactions(), 1);

        drop(session);
        assert_eq!(store.open_transactions(), 0);
    }
}
