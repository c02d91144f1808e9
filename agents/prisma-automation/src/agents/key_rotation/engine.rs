//! Key Rotation Engine
//!
//! Checks the automation access key's age against Prisma Cloud, issues a
//! replacement once it has expired and room remains for a second key, and
//! writes the new pair to the vault (update, or create when absent).
//! Deleting the old key after its buffer period is not automated.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use super::secret_store::{encode_credentials, SecretStoreAdapter};
use super::types::{
    AccessKeyPair, KeyOutcome, RotationAction, RotationReport, DEFAULT_MAX_KEY_AGE_DAYS,
    MAX_KEYS_PER_USER,
};
use crate::error::{AutomationError, Result};
use crate::tools::prisma::{AccessKeyInfo, ApiOutcome, NewAccessKeyRequest, PrismaClient, PrismaCredentials};

pub struct KeyRotationEngine {
    client: PrismaClient,
    store: SecretStoreAdapter,
    /// Id of the access key the automation logs in with
    automation_key_id: String,
    max_key_age: Duration,
}

impl KeyRotationEngine {
    pub fn new(client: PrismaClient, store: SecretStoreAdapter, automation_key_id: impl Into<String>) -> Self {
        Self {
            client,
            store,
            automation_key_id: automation_key_id.into(),
            max_key_age: Duration::days(DEFAULT_MAX_KEY_AGE_DAYS),
        }
    }

    pub fn with_max_key_age_days(mut self, days: i64) -> Self {
        self.max_key_age = Duration::days(days);
        self
    }

    /// Whether a key is past its maximum age or its own expiry time
    pub fn is_expired(&self, key: &AccessKeyInfo, now: DateTime<Utc>) -> bool {
        if let Some(expires_on) = key.expires_on.filter(|ms| *ms > 0) {
            if now.timestamp_millis() >= expires_on {
                return true;
            }
        }
        match DateTime::<Utc>::from_timestamp_millis(key.created_ts) {
            Some(created) => now - created >= self.max_key_age,
            None => false,
        }
    }

    /// Write each pair to the vault secret of the same name
    pub async fn rotate_keys(&self, keys: &[AccessKeyPair]) -> Vec<KeyOutcome> {
        info!(count = keys.len(), "Rotating keys from Prisma in AWS");

        let mut outcomes = Vec::with_capacity(keys.len());
        for key in keys {
            let action = if self.store.rotate_secret(&key.name, &key.value).await {
                RotationAction::Updated
            } else {
                info!(secret = %key.name, "Secret doesn't exist in AWS yet, creating it now");
                if self.store.create_secret(&key.name, &key.value).await {
                    RotationAction::Created
                } else if self.store.debug_mode() {
                    RotationAction::Skipped("debug mode".to_string())
                } else {
                    warn!(secret = %key.name, "Issue creating secret in AWS");
                    RotationAction::Failed("secret could not be updated or created".to_string())
                }
            };
            outcomes.push(KeyOutcome {
                name: key.name.clone(),
                action,
            });
        }
        outcomes
    }

    /// One rotation pass
    pub async fn run(&self) -> Result<RotationReport> {
        let now = Utc::now();
        let mut report = RotationReport::new();
        let secret_name = self.client.config().automation_secret_name.clone();

        let keys = self
            .client
            .list_access_keys()
            .await?
            .ok_or_else(|| AutomationError::NotFound("Prisma Cloud access keys".to_string()))?;
        report.keys_listed = keys.len();

        report.expired = keys
            .iter()
            .filter(|k| self.is_expired(k, now))
            .map(|k| k.name.clone())
            .collect();
        info!(listed = keys.len(), expired = report.expired.len(), "Access keys checked");

        let Some(automation_key) = keys.iter().find(|k| k.id == self.automation_key_id) else {
            warn!("Automation access key is not listed; nothing to rotate");
            return Ok(report.finish());
        };

        if !self.is_expired(automation_key, now) {
            info!(key = %automation_key.name, "Automation access key is not expired");
            return Ok(report.finish());
        }

        let owned = keys
            .iter()
            .filter(|k| k.username == automation_key.username)
            .count();
        if owned >= MAX_KEYS_PER_USER {
            info!(
                key = %automation_key.name,
                owner = automation_key.username.as_deref().unwrap_or("unknown"),
                owned,
                "Replacement already issued; old key remains in its buffer period"
            );
            report.outcomes.push(KeyOutcome {
                name: secret_name,
                action: RotationAction::Skipped("buffer period active".to_string()),
            });
            return Ok(report.finish());
        }

        let request = NewAccessKeyRequest {
            name: secret_name.clone(),
            expires_on: None,
        };
        let action = match self.client.add_access_key(&request).await? {
            ApiOutcome::Success(issued) => {
                info!(key_id = %issued.id, "Replacement access key issued");
                report.issued_key_id = Some(issued.id.clone());
                let value = encode_credentials(&PrismaCredentials {
                    access_key: issued.id,
                    secret_key: issued.secret_key,
                })?;
                let pair = AccessKeyPair {
                    name: secret_name,
                    value,
                    created_at: now,
                };
                report.outcomes.extend(self.rotate_keys(&[pair]).await);
                return Ok(report.finish());
            }
            ApiOutcome::Skipped => RotationAction::Skipped("debug mode".to_string()),
            ApiOutcome::Failed { status, .. } => {
                RotationAction::Failed(format!("access key creation returned status {}", status))
            }
        };

        report.outcomes.push(KeyOutcome {
            name: secret_name,
            action,
        });
        Ok(report.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::key_rotation::secret_store::decode_credentials;
    use crate::config::AutomationConfig;
    use crate::testing::{test_config, InMemoryVault, ScriptedTransport};
    use crate::tools::prisma::RawResponse;
    use serde_json::json;
    use std::sync::Arc;

    const SECRET: &str = "Prisma-Automation-Secrets";

    fn key(id: &str, age_days: i64) -> serde_json::Value {
        owned_key(id, age_days, "automation@svc")
    }

    fn owned_key(id: &str, age_days: i64, owner: &str) -> serde_json::Value {
        let created = Utc::now() - Duration::days(age_days);
        json!({
            "id": id,
            "name": format!("key-{}", id),
            "createdTs": created.timestamp_millis(),
            "expiresOn": 0,
            "status": "active",
            "username": owner
        })
    }

    fn console(keys: serde_json::Value) -> Arc<ScriptedTransport> {
        Arc::new(
            ScriptedTransport::new()
                .route("/login", vec![RawResponse::new(200, r#"{"token":"cspm-token"}"#)])
                .route(
                    "/access_keys",
                    vec![
                        RawResponse::new(200, keys.to_string()),
                        RawResponse::new(200, r#"{"id":"new-id","secretKey":"new-secret"}"#),
                    ],
                ),
        )
    }

    fn engine(config: AutomationConfig, transport: Arc<ScriptedTransport>, vault: Arc<InMemoryVault>) -> KeyRotationEngine {
        let store = SecretStoreAdapter::new(vault, config.debug_mode);
        let client = PrismaClient::new(
            config,
            PrismaCredentials {
                access_key: "auto-id".into(),
                secret_key: "auto-secret".into(),
            },
            transport,
        );
        KeyRotationEngine::new(client, store, "auto-id")
    }

    #[test]
    fn test_expiry_window() {
        let engine = engine(test_config(), Arc::new(ScriptedTransport::new()), Arc::new(InMemoryVault::default()));
        let now = Utc::now();
        let info = |age: i64, expires_on: Option<i64>| AccessKeyInfo {
            id: "k".into(),
            name: "k".into(),
            created_ts: (now - Duration::days(age)).timestamp_millis(),
            expires_on,
            status: None,
            username: None,
        };

        assert!(!engine.is_expired(&info(10, None), now));
        assert!(engine.is_expired(&info(90, None), now));
        assert!(engine.is_expired(&info(120, Some(0)), now));
        let past = (now - Duration::hours(1)).timestamp_millis();
        assert!(engine.is_expired(&info(1, Some(past)), now));
    }

    #[tokio::test]
    async fn test_expired_single_key_is_replaced_and_stored() {
        let transport = console(json!([key("auto-id", 95)]));
        let vault = Arc::new(InMemoryVault::default().with_secret(SECRET, "old"));
        let engine = engine(test_config(), transport.clone(), vault.clone());

        let report = engine.run().await.unwrap();

        assert_eq!(report.issued_key_id.as_deref(), Some("new-id"));
        assert_eq!(report.outcomes, vec![KeyOutcome { name: SECRET.into(), action: RotationAction::Updated }]);

        let stored = decode_credentials(&vault.value(SECRET).unwrap()).unwrap();
        assert_eq!(stored.access_key, "new-id");
        assert_eq!(stored.secret_key, "new-secret");

        let create = transport.last_call("/access_keys").unwrap();
        assert_eq!(create.token.as_deref(), Some("cspm-token"));
        assert_eq!(create.body.unwrap()["name"], SECRET);
    }

    #[tokio::test]
    async fn test_missing_secret_is_created() {
        let transport = console(json!([key("auto-id", 200)]));
        let vault = Arc::new(InMemoryVault::default());
        let engine = engine(test_config(), transport, vault.clone());

        let report = engine.run().await.unwrap();

        assert_eq!(report.outcomes[0].action, RotationAction::Created);
        assert!(vault.value(SECRET).is_some());
        assert_eq!(vault.writes.lock().unwrap().clone(), vec![format!("put:{}", SECRET), format!("create:{}", SECRET)]);
    }

    #[tokio::test]
    async fn test_fresh_key_is_left_alone() {
        let transport = console(json!([key("auto-id", 5)]));
        let vault = Arc::new(InMemoryVault::default());
        let engine = engine(test_config(), transport.clone(), vault.clone());

        let report = engine.run().await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(report.expired.is_empty());
        assert_eq!(transport.count("/access_keys"), 1);
        assert_eq!(vault.write_count(), 0);
    }

    #[tokio::test]
    async fn test_buffer_period_blocks_second_issue() {
        let transport = console(json!([key("auto-id", 100), key("replacement", 3)]));
        let vault = Arc::new(InMemoryVault::default());
        let engine = engine(test_config(), transport.clone(), vault.clone());

        let report = engine.run().await.unwrap();

        assert_eq!(report.expired, vec!["key-auto-id".to_string()]);
        assert!(matches!(report.outcomes[0].action, RotationAction::Skipped(_)));
        assert_eq!(transport.count("/access_keys"), 1);
        assert_eq!(vault.write_count(), 0);
    }

    #[tokio::test]
    async fn test_other_users_keys_do_not_start_buffer_period() {
        let transport = console(json!([
            key("auto-id", 120),
            owned_key("alice-key", 10, "alice@corp"),
        ]));
        let vault = Arc::new(InMemoryVault::default());
        let engine = engine(test_config(), transport.clone(), vault.clone());

        let report = engine.run().await.unwrap();

        assert_eq!(report.keys_listed, 2);
        assert_eq!(report.issued_key_id.as_deref(), Some("new-id"));
        assert_eq!(report.outcomes[0].action, RotationAction::Created);
        assert_eq!(transport.count("/access_keys"), 2);
    }

    #[tokio::test]
    async fn test_debug_mode_issues_and_writes_nothing() {
        let mut config = test_config();
        config.debug_mode = true;
        let transport = console(json!([key("auto-id", 95)]));
        let vault = Arc::new(InMemoryVault::default());
        let engine = engine(config, transport.clone(), vault.clone());

        let report = engine.run().await.unwrap();

        assert_eq!(report.outcomes[0].action, RotationAction::Skipped("debug mode".into()));
        assert!(report.issued_key_id.is_none());
        // Only the read went out
        assert_eq!(transport.count("/access_keys"), 1);
        assert_eq!(vault.write_count(), 0);
    }

    #[tokio::test]
    async fn test_rotate_keys_create_or_update() {
        let vault = Arc::new(InMemoryVault::default().with_secret("existing", "v1"));
        let engine = engine(test_config(), Arc::new(ScriptedTransport::new()), vault.clone());
        let pair = |name: &str| AccessKeyPair {
            name: name.into(),
            value: "v2".into(),
            created_at: Utc::now(),
        };

        let outcomes = engine.rotate_keys(&[pair("existing"), pair("new")]).await;

        assert_eq!(outcomes[0].action, RotationAction::Updated);
        assert_eq!(outcomes[1].action, RotationAction::Created);
        assert_eq!(vault.value("existing").as_deref(), Some("v2"));
        assert_eq!(vault.value("new").as_deref(), Some("v2"));
    }
}
