//! Prisma Cloud request and response types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status reserved for requests that debug mode deliberately did not send
pub const DRY_RUN_STATUS: u16 = 999;

/// The two vendor API families, each with its own bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFamily {
    /// Cloud Security Posture Management (`/login`)
    Cspm,
    /// Cloud Workload Protection (`/authenticate`)
    Cwp,
}

impl std::fmt::Display for TokenFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenFamily::Cspm => write!(f, "cspm"),
            TokenFamily::Cwp => write!(f, "cwp"),
        }
    }
}

/// Automation access key pair used to log in to both API families
#[derive(Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct PrismaCredentials {
    #[serde(rename = "prisma_access_key")]
    pub access_key: String,
    #[serde(rename = "prisma_secret_key")]
    pub secret_key: String,
}

impl std::fmt::Debug for PrismaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrismaCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// How the token is attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Login calls carry no token
    None,
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `x-redlock-auth: <token>` (CSPM access key endpoints)
    Redlock,
}

/// A single vendor API call, independent of the HTTP client
#[derive(Debug, Clone)]
pub struct VendorRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub family: TokenFamily,
    pub auth: AuthScheme,
    pub timeout: Duration,
    /// Mutating requests are suppressed in debug mode
    pub mutating: bool,
}

impl VendorRequest {
    pub fn get(family: TokenFamily, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
            family,
            auth: AuthScheme::Bearer,
            timeout,
            mutating: false,
        }
    }

    pub fn post(
        family: TokenFamily,
        url: impl Into<String>,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            query: Vec::new(),
            body: Some(body),
            family,
            auth: AuthScheme::Bearer,
            timeout,
            mutating: false,
        }
    }

    pub fn query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    pub fn auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    pub fn mutating(mut self) -> Self {
        self.mutating = true;
        self
    }

    /// Label used in debug-mode log lines
    pub fn kind(&self) -> &'static str {
        if self.mutating {
            "CREATE"
        } else {
            "READ"
        }
    }
}

/// Status and body as returned by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn dry_run() -> Self {
        Self::new(DRY_RUN_STATUS, Vec::new())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Result of an authenticated call after the refresh loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiOutcome<T> {
    Success(T),
    /// Debug mode suppressed the request
    Skipped,
    /// Non-200, non-401 status; already logged
    Failed { status: u16, body: String },
}

impl<T> ApiOutcome<T> {
    pub fn success(self) -> Option<T> {
        match self {
            ApiOutcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, ApiOutcome::Skipped)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CspmLoginResponse {
    pub token: String,
    #[serde(default)]
    pub customer_names: Vec<CustomerName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerName {
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub prisma_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CwpLoginResponse {
    pub token: String,
}

/// Serverless defender as listed by `GET /defenders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerlessDefender {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub category: Option<String>,
}

/// CSPM access key metadata as listed by `GET /access_keys`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyInfo {
    pub id: String,
    pub name: String,
    /// Creation time in epoch milliseconds
    pub created_ts: i64,
    #[serde(default)]
    pub expires_on: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    /// Owning user; keys of every user are listed for admin roles
    #[serde(default)]
    pub username: Option<String>,
}

/// Body of `POST /access_keys`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessKeyRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<i64>,
}

/// Response of `POST /access_keys`; the secret is only ever returned once
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessKey {
    pub id: String,
    pub secret_key: String,
}

impl std::fmt::Debug for NewAccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewAccessKey")
            .field("id", &self.id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = PrismaCredentials {
            access_key: "ak-123".into(),
            secret_key: "very-secret".into(),
        };
        let printed = format!("{:?}", creds);
        assert!(printed.contains("ak-123"));
        assert!(!printed.contains("very-secret"));
    }

    #[test]
    fn test_cspm_login_response_parsing() {
        let body = r#"{"token":"abc","message":"login_successful","customerNames":[{"customerName":"acme","prismaId":"8068","tosAccepted":true}]}"#;
        let parsed: CspmLoginResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.token, "abc");
        assert_eq!(parsed.customer_names[0].prisma_id.as_deref(), Some("8068"));
    }

    #[test]
    fn test_request_kind_labels() {
        let read = VendorRequest::get(TokenFamily::Cwp, "https://x/version", Duration::from_secs(1));
        assert_eq!(read.kind(), "READ");
        let create = VendorRequest::post(
            TokenFamily::Cspm,
            "https://x/access_keys",
            serde_json::json!({}),
            Duration::from_secs(1),
        )
        .mutating();
        assert_eq!(create.kind(), "CREATE");
    }

    #[test]
    fn test_access_key_listing_parsing() {
        let body = r#"[{"id":"k1","name":"automation","createdTs":1700000000000,"expiresOn":0,"status":"active","role":{"id":"r"}}]"#;
        let keys: Vec<AccessKeyInfo> = serde_json::from_str(body).unwrap();
        assert_eq!(keys[0].created_ts, 1_700_000_000_000);
        assert_eq!(keys[0].status.as_deref(), Some("active"));
    }
}
