//! Error taxonomy shared by the automation agents.
//!
//! Expected per-item failures (missing resources, non-200 vendor responses,
//! rejected registrations) are converted to `None` or outcome values by the
//! agents. Only the variants that make a pass meaningless propagate to the
//! binaries.

use thiserror::Error;

/// Errors produced by the Prisma/AWS automation library
#[derive(Debug, Error)]
pub enum AutomationError {
    /// The requested resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A document was rejected or could not be interpreted
    #[error("Validation error: {0}")]
    Validation(String),

    /// Token refresh did not fix repeated 401 responses
    #[error("Authentication still failing after {attempts} token refreshes")]
    RetryExhausted { attempts: u32 },

    /// Login itself failed, so no token could be obtained
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// An AWS SDK call failed for a reason other than a missing resource
    #[error("AWS {operation} failed: {message}")]
    Aws { operation: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    /// Whether the error means the target resource is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, AutomationError::NotFound(_))
    }

    /// Whether the whole pass must stop
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AutomationError::RetryExhausted { .. }
                | AutomationError::AuthenticationFailed(_)
                | AutomationError::Config(_)
        )
    }
}

pub type Result<T, E = AutomationError> = std::result::Result<T, E>;
