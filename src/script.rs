use std::fmt;

use log::{debug, info};

use crate::error::FailureClass;
use crate::result::{Execution, StatementOutcome};
use crate::session::{Boundary, Session, StatementCtx};
use crate::sql::{classify, Classified, ShowStatement};
use crate::state::TxnState;
use crate::store::{StoreError, TxnStore, WriteOp};

/// Runs the text of an ordinary statement inside the transaction it is given.
pub trait StatementExecutor<S: TxnStore> {
    fn execute(&self, stmt: &str, ctx: &mut StatementCtx<'_, S>) -> Result<StatementOutcome, StoreError>;
}

/// Minimal key/value statement language for scripts:
///
/// - `INSERT key [value]`
/// - `DELETE key`
/// - `SELECT key` (1 row when the key is visible)
/// - `CONFLICT` fails with a retryable error
/// - `ERROR message` fails with a non-retryable error
#[derive(Debug, Clone, Copy, Default)]
pub struct KvExecutor;

impl<S: TxnStore> StatementExecutor<S> for KvExecutor {
    fn execute(&self, stmt: &str, ctx: &mut StatementCtx<'_, S>) -> Result<StatementOutcome, StoreError> {
        let mut words = stmt.split_whitespace();
        let verb = words.next().unwrap_or("").to_uppercase();
        match (verb.as_str(), words.next()) {
            ("INSERT", Some(key)) => {
                let value = words.next().unwrap_or("1");
                ctx.write(WriteOp::put(key, value)).map(StatementOutcome::rows)
            }
            ("DELETE", Some(key)) => ctx.write(WriteOp::delete(key)).map(StatementOutcome::rows),
            ("SELECT", Some(key)) => {
                let found = ctx.read(key)?.is_some();
                Ok(StatementOutcome::rows(u64::from(found)))
            }
            ("CONFLICT", None) => Err(StoreError::retryable("injected transaction conflict")),
            ("ERROR", Some(first)) => {
                let rest: Vec<&str> = words.collect();
                let mut message = first.to_string();
                if !rest.is_empty() {
                    message.push(' ');
                    message.push_str(&rest.join(" "));
                }
                Err(StoreError::non_retryable(message))
            }
            _ => Err(StoreError::non_retryable(format!("unsupported statement: {}", stmt))),
        }
    }
}

/// One line of a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub n: usize,
    pub stmt: String,
    pub result: String,
    pub failure: Option<FailureClass>,
    pub before: TxnState,
    pub after: TxnState,
    pub progress: String,
    pub savepoints: String,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} -- {}", self.n, self.stmt, self.result)?;
        writeln!(
            f,
            "-- {:<11} -> {:<11} {}  {}",
            self.before, self.after, self.progress, self.savepoints
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    pub steps: Vec<StepReport>,
}

impl Transcript {
    pub fn final_state(&self) -> Option<TxnState> {
        self.steps.last().map(|step| step.after)
    }

    /// Whether some step failed in a way that resubmitting the whole script
    /// could fix.
    pub fn failed_retryably(&self) -> bool {
        self.steps
            .iter()
            .any(|step| step.failure == Some(FailureClass::Retryable))
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "{}", step)?;
        }
        Ok(())
    }
}

/// Result of [`ScriptRunner::run_with_retries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRun {
    pub attempts: u32,
    pub transcript: Transcript,
}

/// Bottom to top, `>`-separated, restart savepoint marked with `(r)`.
pub fn render_savepoints(names_top_first: &[(String, bool)]) -> String {
    if names_top_first.is_empty() {
        return "(none)".to_string();
    }
    names_top_first
        .iter()
        .rev()
        .map(|(name, is_restart)| {
            if *is_restart {
                format!("{}(r)", name)
            } else {
                name.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(">")
}

fn describe(execution: &Execution) -> String {
    match &execution.outcome {
        Ok(StatementOutcome::Rewound { savepoint }) => format!("rewound to {}", savepoint),
        Ok(outcome) => {
            let rows = outcome.rows_affected();
            format!("{} row{}", rows, if rows == 1 { "" } else { "s" })
        }
        Err(err) => err.to_string(),
    }
}

/// Drives a session line by line and records how state, savepoints and
/// visible writes evolve.
///
/// Before every ordinary statement a progress marker is written in the same
/// transaction, so the progress bar shows which steps' writes survive
/// rollbacks.
pub struct ScriptRunner<E> {
    executor: E,
    runs: u64,
}

impl<E> ScriptRunner<E> {
    pub fn new(executor: E) -> Self {
        ScriptRunner { executor, runs: 0 }
    }

    pub fn run<S>(&mut self, session: &mut Session<S>, script: &str) -> Transcript
    where
        S: TxnStore,
        E: StatementExecutor<S> + Sync,
    {
        self.runs += 1;
        let prefix = format!("progress/{}/{}/", session.id(), self.runs);

        // Leftovers from a previous run never leak into this one.
        if session.current_status() != TxnState::NoTxn {
            session.execute(Boundary::Rollback);
        }

        let stmts: Vec<&str> = script
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        debug!("Running script of {} statements with marker prefix {}", stmts.len(), prefix);

        let mut transcript = Transcript::default();
        for (i, stmt) in stmts.iter().enumerate() {
            let n = i + 1;
            let before = session.current_status();
            let (result, failure) = self.step(session, stmt, format!("{}{}", prefix, n));
            let after = session.current_status();
            transcript.steps.push(StepReport {
                n,
                stmt: stmt.to_string(),
                result,
                failure,
                before,
                after,
                progress: progress_bar(session, &prefix, stmts.len()),
                savepoints: render_savepoints(&session.savepoint_names()),
            });
        }
        transcript
    }

    fn step<S>(&self, session: &mut Session<S>, stmt: &str, marker: String) -> (String, Option<FailureClass>)
    where
        S: TxnStore,
        E: StatementExecutor<S> + Sync,
    {
        let boundary = match classify(stmt) {
            Ok(Classified::Control(control)) => Boundary::from(control),
            Ok(Classified::Show(ShowStatement::TransactionStatus)) => {
                return (session.current_status().to_string(), None);
            }
            Ok(Classified::Show(ShowStatement::SavepointStatus)) => {
                return (render_savepoints(&session.savepoint_names()), None);
            }
            Ok(Classified::Ordinary(text)) => {
                let executor = &self.executor;
                let text = text.to_string();
                Boundary::ordinary(move |ctx| {
                    ctx.write(WriteOp::put(marker, "1"))?;
                    executor.execute(&text, ctx)
                })
            }
            Err(err) => return (err.to_string(), Some(err.class())),
        };

        let execution = session.execute(boundary);
        (describe(&execution), execution.failure_class())
    }

    /// Runs `script`, and while it fails retryably, rolls back and runs it
    /// again up to `implicit_retry_limit` more times.
    pub fn run_with_retries<S>(&mut self, session: &mut Session<S>, script: &str) -> RetryRun
    where
        S: TxnStore,
        E: StatementExecutor<S> + Sync,
    {
        let limit = session.config().implicit_retry_limit;
        let mut attempts = 1;
        let mut transcript = self.run(session, script);
        while transcript.failed_retryably() && attempts <= limit {
            info!(
                "Script failed with a retryable error; retrying (attempt {} of {})",
                attempts + 1,
                limit + 1
            );
            session.execute(Boundary::Rollback);
            attempts += 1;
            transcript = self.run(session, script);
        }
        RetryRun { attempts, transcript }
    }
}

fn progress_bar<S: TxnStore>(session: &Session<S>, prefix: &str, len: usize) -> String {
    if session.current_status() == TxnState::Aborted {
        return "X".repeat(len);
    }
    (1..=len)
        .map(|n| match session.read(&format!("{}{}", prefix, n)) {
            Ok(Some(_)) => '#',
            // Unreadable markers are shown as not written.
            _ => '.',
        })
        .collect()
}
