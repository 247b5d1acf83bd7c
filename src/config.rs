use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::TxnError;

pub const DEFAULT_RESTART_SAVEPOINT: &str = "restart_point";

fn default_restart_savepoint_name() -> Option<String> {
    Some(DEFAULT_RESTART_SAVEPOINT.to_string())
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// `SAVEPOINT <name>` with this name declares the restart savepoint.
    /// `None` disables name-based detection.
    #[serde(default = "default_restart_savepoint_name")]
    pub restart_savepoint_name: Option<String>,
    /// Whole-transaction retries the script runner attempts after a
    /// retryable failure. The session itself never retries.
    pub implicit_retry_limit: u32,
    /// Default deadline for statements submitted through a session worker.
    pub statement_timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub log_rejected_statements: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            restart_savepoint_name: default_restart_savepoint_name(),
            implicit_retry_limit: 0,
            statement_timeout_ms: None,
            log_rejected_statements: true,
        }
    }
}

impl SessionConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, TxnError> {
        let cfg: SessionConfig =
            serde_yaml::from_str(content).map_err(|e| TxnError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TxnError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TxnError::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&content)
    }

    fn validate(&self) -> Result<(), TxnError> {
        if let Some(name) = &self.restart_savepoint_name {
            if name.trim().is_empty() {
                return Err(TxnError::Config(
                    "restart_savepoint_name must not be empty".to_string(),
                ));
            }
        }
        if self.statement_timeout_ms == Some(0) {
            return Err(TxnError::Config(
                "statement_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_restart_name(&self, name: &str) -> bool {
        self.restart_savepoint_name
            .as_deref()
            .map_or(false, |restart| restart.to_lowercase() == name.to_lowercase())
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }
}
