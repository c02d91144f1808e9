//! Token Manager
//!
//! Holds one bearer token per API family. Tokens live only in memory and are
//! replaced whenever the vendor answers 401.

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::transport::VendorTransport;
use super::types::{
    AuthScheme, CspmLoginResponse, CwpLoginResponse, PrismaCredentials, TokenFamily,
    VendorRequest,
};
use crate::config::{AutomationConfig, AUTH_TIMEOUT};
use crate::error::{AutomationError, Result};

#[derive(Debug, Default)]
struct TokenState {
    cspm: Option<String>,
    cwp: Option<String>,
    tenant_id: Option<String>,
    logins: u32,
}

pub struct TokenManager {
    credentials: PrismaCredentials,
    cspm_login_url: String,
    /// `None` when no CWP endpoint is configured
    cwp_login_url: Option<String>,
    state: Mutex<TokenState>,
}

impl TokenManager {
    pub fn new(config: &AutomationConfig, credentials: PrismaCredentials) -> Self {
        Self {
            credentials,
            cspm_login_url: config.cspm_url("login"),
            cwp_login_url: config
                .cwp_configured()
                .then(|| config.cwp_url("authenticate")),
            state: Mutex::new(TokenState::default()),
        }
    }

    /// Current token for the family, logging in first if none is held
    pub async fn token(&self, transport: &dyn VendorTransport, family: TokenFamily) -> Result<String> {
        let cached = {
            let state = self.state.lock().await;
            match family {
                TokenFamily::Cspm => state.cspm.clone(),
                TokenFamily::Cwp => state.cwp.clone(),
            }
        };

        match cached {
            Some(token) => Ok(token),
            None => self.refresh(transport, family).await,
        }
    }

    /// Log in again and replace the family's token
    pub async fn refresh(&self, transport: &dyn VendorTransport, family: TokenFamily) -> Result<String> {
        let url = match family {
            TokenFamily::Cspm => &self.cspm_login_url,
            TokenFamily::Cwp => self
                .cwp_login_url
                .as_ref()
                .ok_or_else(|| AutomationError::Config("CWP_ENDPOINT is not configured".to_string()))?,
        };

        info!(family = %family, endpoint = %url, "Generating Prisma token");

        let body = json!({
            "username": self.credentials.access_key,
            "password": self.credentials.secret_key,
        });
        let request =
            VendorRequest::post(family, url.clone(), body, AUTH_TIMEOUT).auth(AuthScheme::None);

        let response = transport.send(&request, None).await?;
        if response.status != 200 {
            return Err(AutomationError::AuthenticationFailed(format!(
                "{} login returned status {}",
                family, response.status
            )));
        }

        let mut state = self.state.lock().await;
        let token = match family {
            TokenFamily::Cspm => {
                let login: CspmLoginResponse = response.json()?;
                state.tenant_id = login
                    .customer_names
                    .first()
                    .and_then(|c| c.prisma_id.clone());
                state.cspm = Some(login.token.clone());
                login.token
            }
            TokenFamily::Cwp => {
                let login: CwpLoginResponse = response.json()?;
                state.cwp = Some(login.token.clone());
                login.token
            }
        };
        state.logins += 1;

        debug!(family = %family, token_len = token.len(), "Prisma token stored");
        Ok(token)
    }

    /// Tenant (prisma) id reported by the last CSPM login
    pub async fn tenant_id(&self) -> Option<String> {
        self.state.lock().await.tenant_id.clone()
    }

    /// Number of successful logins since creation
    pub async fn login_count(&self) -> u32 {
        self.state.lock().await.logins
    }
}
