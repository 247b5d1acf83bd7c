#[cfg(test)]
mod tests {
    use crate::error::TxnError;
    use crate::result::StatementOutcome;
    use crate::session::Boundary;
    use crate::state::TxnState;
    use crate::tests::common::{fail, new_session, put};

    #[test]
    fn test_rollback_to_discards_later_writes() -> Result<(), TxnError> {
        let (store, mut session) = new_session();

        session.execute(Boundary::Begin).outcome?;
        session.execute(put("first")).outcome?;
        session.execute(Boundary::savepoint("sp1")).outcome?;
        session.execute(put("second")).outcome?;
        session.execute(Boundary::rollback_to("sp1")).outcome?;

        assert_eq!(session.read("first")?, Some(b"1".to_vec()));
        assert_eq!(session.read("second")?, None);
        // The target survives the rollback.
        assert_eq!(session.savepoint_names(), vec![("sp1".to_string(), false)]);

        session.execute(Boundary::Commit).outcome?;
        assert_eq!(store.committed_keys(), vec!["first".to_string()]);
        Ok(())
    }

    #[test]
    fn test_nested_rollback_then_commit() -> Result<(), TxnError> {
        let (store, mut session) = new_session();

        session.execute(Boundary::Begin).outcome?;
        session.execute(Boundary::savepoint("a")).outcome?;
        session.execute(put("x")).outcome?;
        session.execute(Boundary::savepoint("b")).outcome?;
        session.execute(put("y")).outcome?;
        session.execute(Boundary::rollback_to("a")).outcome?;
        let exec = session.execute(Boundary::Commit);

        assert!(exec.is_ok());
        assert_eq!(exec.state, TxnState::NoTxn);
        assert!(session.savepoint_names().is_empty());
        assert_eq!(store.committed_value("x"), None);
        assert_eq!(store.committed_value("y"), None);
        assert_eq!(store.open_transactions(), 0);
        Ok(())
    }

    #[test]
    fn test_release_keeps_writes_and_pops_savepoints() -> Result<(), TxnError> {
        let (store, mut session) = new_session();

        session.execute(Boundary::Begin).outcome?;
        session.execute(Boundary::savepoint("outer")).outcome?;
        session.execute(put("kept")).outcome?;
        session.execute(Boundary::savepoint("inner")).outcome?;
        session.execute(put("also_kept")).outcome?;
        session.execute(Boundary::savepoint("top")).outcome?;

        session.execute(Boundary::release("inner")).outcome?;
        assert_eq!(session.savepoint_names(), vec![("outer".to_string(), false)]);

        // Released savepoints are gone for good.
        let exec = session.execute(Boundary::rollback_to("top"));
        assert_eq!(exec.outcome, Err(TxnError::SavepointNotFound("top".to_string())));
        assert_eq!(exec.state, TxnState::Open);

        session.execute(Boundary::Commit).outcome?;
        assert_eq!(store.committed_value("kept"), Some(b"1".to_vec()));
        assert_eq!(store.committed_value("also_kept"), Some(b"1".to_vec()));
        Ok(())
    }

    #[test]
    fn test_missing_savepoint_leaves_state_alone() {
        let (_, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("a"));

        let exec = session.execute(Boundary::release("nope"));
        assert_eq!(exec.outcome, Err(TxnError::SavepointNotFound("nope".to_string())));
        assert_eq!(exec.state, TxnState::Open);
        assert_eq!(session.savepoint_names().len(), 1);

        session.execute(fail("broken"));
        let exec = session.execute(Boundary::rollback_to("nope"));
        assert_eq!(exec.outcome, Err(TxnError::SavepointNotFound("nope".to_string())));
        assert_eq!(exec.state, TxnState::Aborted);
    }

    #[test]
    fn test_rollback_to_recovers_aborted_transaction() -> Result<(), TxnError> {
        let (store, mut session) = new_session();

        session.execute(Boundary::Begin).outcome?;
        session.execute(put("before")).outcome?;
        session.execute(Boundary::savepoint("sp")).outcome?;
        session.execute(put("doomed")).outcome?;

        let exec = session.execute(fail("constraint violated"));
        assert_eq!(exec.state, TxnState::Aborted);
        assert_eq!(
            exec.outcome,
            Err(TxnError::NonRetryableStore("constraint violated".to_string()))
        );

        let exec = session.execute(put("ignored"));
        assert_eq!(exec.outcome, Err(TxnError::TransactionAborted));

        let exec = session.execute(Boundary::rollback_to("sp"));
        assert_eq!(exec.state, TxnState::Open);
        session.execute(Boundary::Commit).outcome?;

        assert_eq!(store.committed_keys(), vec!["before".to_string()]);
        Ok(())
    }

    #[test]
    fn test_names_are_case_insensitive_and_shadow() -> Result<(), TxnError> {
        let (_, mut session) = new_session();

        session.execute(Boundary::Begin).outcome?;
        session.execute(Boundary::savepoint("Dup")).outcome?;
        session.execute(put("one")).outcome?;
        session.execute(Boundary::savepoint("dup")).outcome?;
        session.execute(put("two")).outcome?;

        // The newest "dup" is the target.
        session.execute(Boundary::rollback_to("DUP")).outcome?;
        assert_eq!(session.read("one")?, Some(b"1".to_vec()));
        assert_eq!(session.read("two")?, None);
        assert_eq!(session.savepoint_names().len(), 2);

        session.execute(Boundary::release("dup")).outcome?;
        assert_eq!(session.savepoint_names(), vec![("Dup".to_string(), false)]);
        Ok(())
    }

    #[test]
    fn test_restart_savepoint_placement() {
        let (_, mut session) = new_session();

        session.execute(Boundary::Begin);
        session.execute(put("x"));
        let exec = session.execute(Boundary::savepoint("restart_point"));
        assert!(matches!(exec.outcome, Err(TxnError::InvalidRestartPlacement(_))));
        assert_eq!(exec.state, TxnState::Open);
        assert!(session.savepoint_names().is_empty());
        session.execute(Boundary::Rollback);

        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("plain"));
        let exec = session.execute(Boundary::restart_savepoint("anything"));
        assert!(matches!(exec.outcome, Err(TxnError::InvalidRestartPlacement(_))));
        session.execute(Boundary::Rollback);

        session.execute(Boundary::Begin);
        let exec = session.execute(Boundary::savepoint("RESTART_POINT"));
        assert_eq!(exec.outcome, Ok(StatementOutcome::done()));
        assert_eq!(
            session.savepoint_names(),
            vec![("RESTART_POINT".to_string(), true)]
        );

        // Re-declaring the restart savepoint is rejected as well.
        let exec = session.execute(Boundary::savepoint("restart_point"));
        assert!(matches!(exec.outcome, Err(TxnError::InvalidRestartPlacement(_))));
    }

    #[test]
    fn test_savepoint_statements_outside_transaction() {
        let (store, mut session) = new_session();

        for boundary in [
            Boundary::savepoint("a"),
            Boundary::release("a"),
            Boundary::rollback_to("a"),
        ] {
            let exec = session.execute(boundary);
            assert!(matches!(exec.outcome, Err(TxnError::NoTransaction(_))));
            assert_eq!(exec.state, TxnState::NoTxn);
        }
        assert_eq!(store.open_transactions(), 0);
    }

    #[test]
    fn test_introspection_does_not_mutate() {
        let (_, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("a"));
        let steps = session.steps();

        for _ in 0..3 {
            assert_eq!(session.current_status(), TxnState::Open);
            assert_eq!(session.savepoint_names(), vec![("a".to_string(), false)]);
            let _ = session.status();
        }
        assert_eq!(session.steps(), steps);
    }

    #[test]
    fn test_status_serializes() {
        let (_, mut session) = new_session();
        session.execute(Boundary::Begin);
        session.execute(Boundary::savepoint("restart_point"));

        let json = serde_json::to_value(session.status()).unwrap();
        assert_eq!(json["state"], "Open");
        assert_eq!(json["savepoints"][0]["name"], "restart_point");
        assert_eq!(json["savepoints"][0]["is_restart"], true);
        assert_eq!(json["rewinds"], 0);
    }
}
