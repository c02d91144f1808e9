//! Prisma Cloud API client
//!
//! Covers both vendor API families:
//!
//! - **CSPM** (`/login`, `/access_keys`) for access key management
//! - **CWP** (`/authenticate`, `/version`, `/defenders…`, `/registry`) for
//!   defender deployment
//!
//! ## Token refresh
//!
//! Every authenticated call goes through [`PrismaClient::send`]: a 401
//! refreshes the family's token and repeats the same request, up to
//! `max_auth_retries` refreshes. A 200 returns the payload, the dry-run
//! status returns [`ApiOutcome::Skipped`], and anything else is logged and
//! handed back as [`ApiOutcome::Failed`] without retrying.

pub mod token;
pub mod transport;
pub mod types;

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{AutomationConfig, FargateParams, AUTH_TIMEOUT, READ_TIMEOUT};
use crate::error::{AutomationError, Result};
use crate::tools::aws::TaskDefinition;

pub use token::TokenManager;
pub use transport::{HttpVendorTransport, VendorTransport};
pub use types::{
    AccessKeyInfo, ApiOutcome, AuthScheme, NewAccessKey, NewAccessKeyRequest, PrismaCredentials,
    RawResponse, ServerlessDefender, TokenFamily, VendorRequest, DRY_RUN_STATUS,
};

/// Authenticated client for the Prisma Cloud CSPM and CWP APIs
pub struct PrismaClient {
    transport: Arc<dyn VendorTransport>,
    tokens: TokenManager,
    config: AutomationConfig,
}

impl PrismaClient {
    pub fn new(
        config: AutomationConfig,
        credentials: PrismaCredentials,
        transport: Arc<dyn VendorTransport>,
    ) -> Self {
        let tokens = TokenManager::new(&config, credentials);
        Self {
            transport,
            tokens,
            config,
        }
    }

    /// Log in up front to CSPM, and to CWP when it is configured
    pub async fn authenticate(&self) -> Result<()> {
        self.tokens.refresh(self.transport.as_ref(), TokenFamily::Cspm).await?;
        if self.config.cwp_configured() {
            self.tokens.refresh(self.transport.as_ref(), TokenFamily::Cwp).await?;
        }

        let tenant_id = self.tokens.tenant_id().await;
        info!(
            tenant_id = tenant_id.as_deref().unwrap_or("unknown"),
            "Authenticated against Prisma Cloud"
        );
        Ok(())
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub fn config(&self) -> &AutomationConfig {
        &self.config
    }

    /// Issue a request with the token refresh policy applied
    pub async fn send(&self, request: VendorRequest) -> Result<ApiOutcome<RawResponse>> {
        let max_refreshes = self.config.max_auth_retries;
        let mut refreshes = 0;

        loop {
            let response = if request.mutating && self.config.debug_mode {
                info!(url = %request.url, "API {}_REQUEST \u{2717}: not sending the request", request.kind());
                RawResponse::dry_run()
            } else {
                if self.config.debug_mode {
                    debug!(url = %request.url, "API READ_REQUEST \u{2713}: sending the request through");
                }
                let token = self
                    .tokens
                    .token(self.transport.as_ref(), request.family)
                    .await?;
                match self.transport.send(&request, Some(&token)).await {
                    Ok(response) => response,
                    Err(AutomationError::Http(e)) => {
                        warn!(url = %request.url, error = %e, "Prisma API request failed");
                        return Ok(ApiOutcome::Failed {
                            status: 0,
                            body: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            };

            match response.status {
                200 => {
                    debug!(url = %request.url, "API success");
                    return Ok(ApiOutcome::Success(response));
                }
                401 => {
                    if refreshes >= max_refreshes {
                        return Err(AutomationError::RetryExhausted {
                            attempts: refreshes,
                        });
                    }
                    info!(family = %request.family, "Prisma API token expired... generating a new one");
                    self.tokens
                        .refresh(self.transport.as_ref(), request.family)
                        .await?;
                    refreshes += 1;
                }
                DRY_RUN_STATUS => return Ok(ApiOutcome::Skipped),
                status => {
                    let body = response.text();
                    warn!(url = %request.url, status, body = %body, "Unexpected Prisma API response");
                    return Ok(ApiOutcome::Failed { status, body });
                }
            }
        }
    }

    /// Latest console version, normalized to the image tag form (`32_05_123`)
    pub async fn latest_version(&self) -> Result<Option<String>> {
        let request = VendorRequest::get(TokenFamily::Cwp, self.config.cwp_url("version"), AUTH_TIMEOUT);

        let version = self
            .send(request)
            .await?
            .success()
            .map(|response| normalize_version(&response.text()));

        if let Some(version) = &version {
            info!(version = %version, "Latest defender version retrieved");
        }
        Ok(version)
    }

    /// Latest serverless defenders
    pub async fn serverless_defenders(&self) -> Result<Option<Vec<ServerlessDefender>>> {
        let request = VendorRequest::get(TokenFamily::Cwp, self.config.cwp_url("defenders"), READ_TIMEOUT)
            .query(vec![
                ("type".to_string(), "serverless".to_string()),
                ("latest".to_string(), "true".to_string()),
            ]);

        match self.send(request).await?.success() {
            Some(response) => {
                let defenders: Vec<ServerlessDefender> = response.json()?;
                info!(count = defenders.len(), "Serverless defenders retrieved");
                Ok(Some(defenders))
            }
            None => Ok(None),
        }
    }

    /// Serverless defender bundle (zip bytes) for a Lambda runtime
    pub async fn serverless_bundle(&self, runtime: &str) -> Result<Option<Vec<u8>>> {
        let request = VendorRequest::post(
            TokenFamily::Cwp,
            self.config.cwp_url("defenders/serverless/bundle"),
            json!({ "provider": "aws", "runtime": runtime }),
            READ_TIMEOUT,
        );

        let bundle = self.send(request).await?.success().map(|r| r.body);
        if let Some(bundle) = &bundle {
            info!(runtime = %runtime, bytes = bundle.len(), "Serverless defender bundle downloaded");
        }
        Ok(bundle)
    }

    /// Whether the image already appears in the registry scan results
    ///
    /// `None` means the lookup itself failed.
    pub async fn image_in_registry(&self, image: &str) -> Result<Option<bool>> {
        let request = VendorRequest::get(TokenFamily::Cwp, self.config.cwp_url("registry"), READ_TIMEOUT)
            .query(vec![
                ("compact".to_string(), "true".to_string()),
                ("search".to_string(), image.to_string()),
            ]);

        Ok(self
            .send(request)
            .await?
            .success()
            .map(|response| registry_body_has_results(&response.body)))
    }

    /// Ask the console to inject the defender into a task definition
    ///
    /// The definition must already be sanitized.
    pub async fn generate_protected_task(
        &self,
        params: &FargateParams,
        task_definition: &TaskDefinition,
    ) -> Result<Option<TaskDefinition>> {
        let request = VendorRequest::post(
            TokenFamily::Cwp,
            self.config.cwp_url("defenders/fargate.json"),
            serde_json::to_value(task_definition)?,
            AUTH_TIMEOUT,
        )
        .query(fargate_query(params)?);

        match self.send(request).await?.success() {
            Some(response) => {
                let protected = TaskDefinition::from_json(response.json()?)?;
                info!(family = %protected.family, "Protected task definition generated");
                Ok(Some(protected))
            }
            None => Ok(None),
        }
    }

    /// Access keys visible to the automation user
    pub async fn list_access_keys(&self) -> Result<Option<Vec<AccessKeyInfo>>> {
        let request = VendorRequest::get(TokenFamily::Cspm, self.config.cspm_url("access_keys"), READ_TIMEOUT)
            .auth(AuthScheme::Redlock);

        match self.send(request).await?.success() {
            Some(response) => Ok(Some(response.json()?)),
            None => Ok(None),
        }
    }

    /// Create a new access key; `Skipped` in debug mode
    pub async fn add_access_key(
        &self,
        request: &NewAccessKeyRequest,
    ) -> Result<ApiOutcome<NewAccessKey>> {
        info!(name = %request.name, "Creating access key");

        let request = VendorRequest::post(
            TokenFamily::Cspm,
            self.config.cspm_url("access_keys"),
            serde_json::to_value(request)?,
            READ_TIMEOUT,
        )
        .auth(AuthScheme::Redlock)
        .mutating();

        Ok(match self.send(request).await? {
            ApiOutcome::Success(response) => ApiOutcome::Success(response.json()?),
            ApiOutcome::Skipped => ApiOutcome::Skipped,
            ApiOutcome::Failed { status, body } => ApiOutcome::Failed { status, body },
        })
    }
}

/// `"32.05.123"` (JSON string body) -> `32_05_123`
pub fn normalize_version(body: &str) -> String {
    body.trim()
        .trim_matches(|c| c == '"' || c == '\\')
        .replace('.', "_")
}

/// The registry endpoint answers with an empty body (or `null`/`[]`) when
/// nothing matches the search
fn registry_body_has_results(body: &[u8]) -> bool {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Null) => false,
        Ok(serde_json::Value::Array(items)) => !items.is_empty(),
        Ok(_) => true,
        Err(_) => !body.iter().all(|b| b.is_ascii_whitespace()),
    }
}

fn fargate_query(params: &FargateParams) -> Result<Vec<(String, String)>> {
    let value = serde_json::to_value(params)?;
    let object = value
        .as_object()
        .ok_or_else(|| AutomationError::Validation("fargate params are not an object".to_string()))?;

    Ok(object
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect())
}
