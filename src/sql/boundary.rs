use std::fmt;

use nom::{
    branch::alt,
    character::complete::{multispace0, multispace1},
    combinator::{all_consuming, map, opt, value},
    sequence::{delimited, pair, preceded, tuple},
};

use super::parser_utils::{kw_word, name, SqlResult};
use crate::error::TxnError;

/// Statement that changes transaction or savepoint state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlStatement {
    Begin,
    Commit,
    Rollback,
    Savepoint(String),
    Release(String),
    RollbackTo(String),
}

impl fmt::Display for ControlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlStatement::Begin => write!(f, "BEGIN"),
            ControlStatement::Commit => write!(f, "COMMIT"),
            ControlStatement::Rollback => write!(f, "ROLLBACK"),
            ControlStatement::Savepoint(name) => write!(f, "SAVEPOINT {}", name),
            ControlStatement::Release(name) => write!(f, "RELEASE SAVEPOINT {}", name),
            ControlStatement::RollbackTo(name) => write!(f, "ROLLBACK TO SAVEPOINT {}", name),
        }
    }
}

/// Read-only observers of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowStatement {
    TransactionStatus,
    SavepointStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified<'a> {
    Control(ControlStatement),
    Show(ShowStatement),
    /// Anything else, without the trailing `;`.
    Ordinary(&'a str),
}

const CONTROL_KEYWORDS: [&str; 8] = [
    "BEGIN", "START", "COMMIT", "END", "ROLLBACK", "ABORT", "SAVEPOINT", "RELEASE",
];

/// Sorts one statement into a control boundary, a SHOW observer or ordinary
/// text for the executor.
///
/// A statement that starts with a control keyword but does not parse is an
/// error rather than ordinary text.
pub fn classify(input: &str) -> Result<Classified<'_>, TxnError> {
    let text = input.trim();
    let text = text.strip_suffix(';').unwrap_or(text).trim_end();
    if text.is_empty() {
        return Err(TxnError::Parse("empty statement".to_string()));
    }

    let first = text
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .unwrap_or("");
    if CONTROL_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(first)) {
        return match all_consuming(control)(text) {
            Ok((_, stmt)) => Ok(Classified::Control(stmt)),
            Err(e) => Err(TxnError::Parse(format!("failed to parse \"{}\": {}", text, e))),
        };
    }

    match all_consuming(show)(text) {
        Ok((_, stmt)) => Ok(Classified::Show(stmt)),
        Err(_) => Ok(Classified::Ordinary(text)),
    }
}

fn control(input: &str) -> SqlResult<ControlStatement> {
    delimited(
        multispace0,
        alt((begin, commit, rollback_to, rollback, savepoint, release)),
        multispace0,
    )(input)
}

fn txn_noise(input: &str) -> SqlResult<Option<&str>> {
    opt(preceded(
        multispace1,
        alt((kw_word("TRANSACTION"), kw_word("WORK"))),
    ))(input)
}

fn begin(input: &str) -> SqlResult<ControlStatement> {
    value(
        ControlStatement::Begin,
        alt((
            map(pair(kw_word("BEGIN"), txn_noise), |_| ()),
            map(
                tuple((kw_word("START"), multispace1, kw_word("TRANSACTION"))),
                |_| (),
            ),
        )),
    )(input)
}

fn commit(input: &str) -> SqlResult<ControlStatement> {
    value(
        ControlStatement::Commit,
        pair(alt((kw_word("COMMIT"), kw_word("END"))), txn_noise),
    )(input)
}

fn rollback(input: &str) -> SqlResult<ControlStatement> {
    value(
        ControlStatement::Rollback,
        pair(alt((kw_word("ROLLBACK"), kw_word("ABORT"))), txn_noise),
    )(input)
}

/// `[SAVEPOINT] name`; a savepoint may itself be called "savepoint".
fn savepoint_target(input: &str) -> SqlResult<String> {
    alt((
        preceded(pair(kw_word("SAVEPOINT"), multispace1), name),
        name,
    ))(input)
}

fn rollback_to(input: &str) -> SqlResult<ControlStatement> {
    let (input, _) = tuple((
        kw_word("ROLLBACK"),
        txn_noise,
        multispace1,
        kw_word("TO"),
        multispace1,
    ))(input)?;
    let (input, target) = savepoint_target(input)?;
    Ok((input, ControlStatement::RollbackTo(target)))
}

fn savepoint(input: &str) -> SqlResult<ControlStatement> {
    map(
        preceded(pair(kw_word("SAVEPOINT"), multispace1), name),
        ControlStatement::Savepoint,
    )(input)
}

fn release(input: &str) -> SqlResult<ControlStatement> {
    map(
        preceded(pair(kw_word("RELEASE"), multispace1), savepoint_target),
        ControlStatement::Release,
    )(input)
}

fn show(input: &str) -> SqlResult<ShowStatement> {
    preceded(
        pair(kw_word("SHOW"), multispace1),
        alt((
            value(
                ShowStatement::TransactionStatus,
                tuple((kw_word("TRANSACTION"), multispace1, kw_word("STATUS"))),
            ),
            value(
                ShowStatement::SavepointStatus,
                tuple((kw_word("SAVEPOINT"), multispace1, kw_word("STATUS"))),
            ),
        )),
    )(input)
}
