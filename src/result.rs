use crate::error::{FailureClass, TxnError};
use crate::state::TxnState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Success { rows_affected: Option<u64> },
    /// A retryable failure was absorbed by rewinding to the restart
    /// savepoint. Nothing the statement did survives.
    Rewound { savepoint: String },
}

impl StatementOutcome {
    pub fn done() -> Self {
        StatementOutcome::Success { rows_affected: None }
    }

    pub fn rows(n: u64) -> Self {
        StatementOutcome::Success { rows_affected: Some(n) }
    }

    pub fn rows_affected(&self) -> u64 {
        match self {
            StatementOutcome::Success { rows_affected } => rows_affected.unwrap_or(0),
            StatementOutcome::Rewound { .. } => 0,
        }
    }
}

/// Result of one statement boundary: the session's state afterwards plus the
/// statement outcome or the error to report to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub state: TxnState,
    pub outcome: Result<StatementOutcome, TxnError>,
}

impl Execution {
    pub fn new(state: TxnState, outcome: Result<StatementOutcome, TxnError>) -> Self {
        Execution { state, outcome }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&TxnError> {
        self.outcome.as_ref().err()
    }

    pub fn failure_class(&self) -> Option<FailureClass> {
        self.error().map(TxnError::class)
    }

    pub fn rewound(&self) -> bool {
        matches!(self.outcome, Ok(StatementOutcome::Rewound { .. }))
    }
}
