//! Types for access key rotation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Description attached to every secret the automation creates
pub const SECRET_DESCRIPTION: &str = "Secret managed by Prisma automation.";

/// Default maximum age before an access key counts as expired
pub const DEFAULT_MAX_KEY_AGE_DAYS: i64 = 90;

/// Number of keys Prisma Cloud allows per user; at the limit the older key
/// is still inside its buffer period
pub const MAX_KEYS_PER_USER: usize = 2;

/// An access key as it is written to the vault
///
/// `value` is the encoded secret payload, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessKeyPair {
    pub name: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessKeyPair")
            .field("name", &self.name)
            .field("value", &"<redacted>")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// What happened to one key's vault secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum RotationAction {
    /// Existing secret received a new version
    Updated,
    /// Secret did not exist and was created
    Created,
    /// Nothing written (debug mode, or no rotation due)
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOutcome {
    pub name: String,
    #[serde(flatten)]
    pub action: RotationAction,
}

/// Result of one key rotation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationReport {
    pub keys_listed: usize,
    pub expired: Vec<String>,
    /// Id of the access key issued during the pass
    pub issued_key_id: Option<String>,
    pub outcomes: Vec<KeyOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RotationReport {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            keys_listed: 0,
            expired: Vec::new(),
            issued_key_id: None,
            outcomes: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.action, RotationAction::Failed(_)))
            .count()
    }
}

impl Default for RotationReport {
    fn default() -> Self {
        Self::new()
    }
}
