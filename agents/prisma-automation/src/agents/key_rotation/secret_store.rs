//! Secret Store Adapter
//!
//! Automation secrets are stored doubly encoded: the vault's `SecretString`
//! is a JSON object whose `AWS_SECRETS` field is itself a JSON document with
//! the key pair.
//!
//! ```json
//! {"AWS_SECRETS": "{\"prisma_access_key\": \"…\", \"prisma_secret_key\": \"…\"}"}
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::SECRET_DESCRIPTION;
use crate::error::{AutomationError, Result};
use crate::tools::aws::SecretVault;
use crate::tools::prisma::PrismaCredentials;

#[derive(Serialize, Deserialize)]
struct SecretEnvelope {
    #[serde(rename = "AWS_SECRETS")]
    aws_secrets: String,
}

/// Wrap a key pair in the `AWS_SECRETS` envelope
pub fn encode_credentials(credentials: &PrismaCredentials) -> Result<String> {
    let envelope = SecretEnvelope {
        aws_secrets: serde_json::to_string(credentials)?,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Unwrap a key pair from the `AWS_SECRETS` envelope
pub fn decode_credentials(secret_string: &str) -> Result<PrismaCredentials> {
    let envelope: SecretEnvelope = serde_json::from_str(secret_string)?;
    Ok(serde_json::from_str(&envelope.aws_secrets)?)
}

pub struct SecretStoreAdapter {
    vault: Arc<dyn SecretVault>,
    debug_mode: bool,
}

impl SecretStoreAdapter {
    pub fn new(vault: Arc<dyn SecretVault>, debug_mode: bool) -> Self {
        Self { vault, debug_mode }
    }

    /// Automation access keys used to log in to Prisma Cloud
    pub async fn load_automation_credentials(&self, secret_name: &str) -> Result<PrismaCredentials> {
        debug!(secret = %secret_name, "Loading automation credentials");

        let secret_string = self.vault.get_secret_string(secret_name).await?;
        decode_credentials(&secret_string).map_err(|e| {
            AutomationError::Config(format!(
                "secret {} does not hold AWS_SECRETS credentials: {}",
                secret_name, e
            ))
        })
    }

    /// Store a new version of an existing secret
    ///
    /// `false` when the secret does not exist, the write failed, or debug
    /// mode suppressed it.
    pub async fn rotate_secret(&self, secret_name: &str, secret_value: &str) -> bool {
        if self.debug_mode {
            info!(secret = %secret_name, "API PUT_REQUEST \u{2717}: not sending the request");
            return false;
        }

        match self.vault.put_secret_value(secret_name, secret_value).await {
            Ok(()) => {
                info!(secret = %secret_name, "Secret successfully rotated");
                true
            }
            Err(e) if e.is_not_found() => {
                info!(secret = %secret_name, "The requested secret was not found");
                false
            }
            Err(e) => {
                warn!(secret = %secret_name, error = %e, "Failed to rotate secret");
                false
            }
        }
    }

    /// Create a secret with the automation description
    pub async fn create_secret(&self, secret_name: &str, secret_value: &str) -> bool {
        if self.debug_mode {
            info!(secret = %secret_name, "API CREATE_REQUEST \u{2717}: not sending the request");
            return false;
        }

        match self
            .vault
            .create_secret(secret_name, secret_value, SECRET_DESCRIPTION)
            .await
        {
            Ok(()) => {
                info!(secret = %secret_name, "Secret successfully created");
                true
            }
            Err(e) => {
                warn!(secret = %secret_name, error = %e, "Failed to create secret");
                false
            }
        }
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{capture_logs, InMemoryVault};

    fn credentials() -> PrismaCredentials {
        PrismaCredentials {
            access_key: "0d6f2c1e-access".into(),
            secret_key: "s3cr3t/value=".into(),
        }
    }

    #[test]
    fn test_envelope_is_doubly_encoded() {
        let encoded = encode_credentials(&credentials()).unwrap();
        let outer: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        let inner = outer["AWS_SECRETS"].as_str().unwrap();
        let inner: serde_json::Value = serde_json::from_str(inner).unwrap();
        assert_eq!(inner["prisma_access_key"], "0d6f2c1e-access");
        assert_eq!(inner["prisma_secret_key"], "s3cr3t/value=");

        let decoded = decode_credentials(&encoded).unwrap();
        assert_eq!(decoded.access_key, "0d6f2c1e-access");
    }

    #[tokio::test]
    async fn test_load_automation_credentials() {
        let encoded = encode_credentials(&credentials()).unwrap();
        let vault = Arc::new(InMemoryVault::default().with_secret("Prisma-Automation-Secrets", &encoded));
        let store = SecretStoreAdapter::new(vault, false);

        let loaded = tokio_test::assert_ok!(store.load_automation_credentials("Prisma-Automation-Secrets").await);
        assert_eq!(loaded.secret_key, "s3cr3t/value=");

        assert!(store.load_automation_credentials("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_malformed_secret_is_fatal() {
        let vault = Arc::new(InMemoryVault::default().with_secret("automation", r#"{"prisma_access_key":"flat"}"#));
        let store = SecretStoreAdapter::new(vault, false);

        let err = store.load_automation_credentials("automation").await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_rotate_missing_secret_returns_false() {
        let vault = Arc::new(InMemoryVault::default());
        let store = SecretStoreAdapter::new(vault.clone(), false);

        assert!(!store.rotate_secret("key-a", "v").await);
        assert!(store.create_secret("key-a", "v").await);
        assert!(store.rotate_secret("key-a", "v2").await);
        assert_eq!(vault.value("key-a").as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_debug_mode_create_sends_nothing() {
        let vault = Arc::new(InMemoryVault::default());
        let store = SecretStoreAdapter::new(vault.clone(), true);

        assert!(!store.create_secret("key-a", "v").await);
        assert!(!store.rotate_secret("key-a", "v").await);
        assert_eq!(vault.write_count(), 0);
    }

    #[tokio::test]
    async fn test_debug_mode_labels_secret_writes() {
        let (logs, _guard) = capture_logs();
        let store = SecretStoreAdapter::new(Arc::new(InMemoryVault::default()), true);

        store.rotate_secret("key-a", "v").await;
        store.create_secret("key-a", "v").await;

        let output = logs.contents();
        assert!(output.contains("API PUT_REQUEST"), "{output}");
        assert!(output.contains("API CREATE_REQUEST"), "{output}");
        assert!(!output.contains("UPDATE_REQUEST"), "{output}");
    }
}
