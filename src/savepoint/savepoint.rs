use chrono::{DateTime, Utc};
use serde::Serialize;

/// A named rewind point inside an open transaction.
#[derive(Debug, Clone)]
pub struct Savepoint<T> {
    pub(crate) name: String,
    // Lowercased name used for lookups.
    pub(crate) key: String,
    pub(crate) is_restart: bool,
    pub(crate) token: T,
    pub(crate) seq: u64,
    pub(crate) created_at: DateTime<Utc>,
}

impl<T> Savepoint<T> {
    pub(crate) fn new(name: &str, is_restart: bool, token: T, seq: u64) -> Self {
        Savepoint {
            name: name.to_string(),
            key: normalize(name),
            is_restart,
            token,
            seq,
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_restart(&self) -> bool {
        self.is_restart
    }

    pub fn token(&self) -> &T {
        &self.token
    }

    /// Creation index within the session; strictly increasing.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn matches(&self, key: &str) -> bool {
        self.key == key
    }

    pub fn info(&self) -> SavepointInfo {
        SavepointInfo {
            name: self.name.clone(),
            is_restart: self.is_restart,
            created_at: self.created_at,
        }
    }
}

/// Savepoint names compare case-insensitively.
pub(crate) fn normalize(name: &str) -> String {
    name.to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavepointInfo {
    pub name: String,
    pub is_restart: bool,
    pub created_at: DateTime<Utc>,
}
