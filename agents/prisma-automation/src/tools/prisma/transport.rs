//! HTTP transport for the Prisma Cloud APIs
//!
//! The transport only moves bytes: it never interprets status codes, so the
//! token refresh policy in [`super::PrismaClient`] sees every 401 and 999.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::types::{AuthScheme, HttpMethod, RawResponse, VendorRequest};
use crate::error::Result;

const ACCEPT: &str = "application/json; charset=UTF-8";

/// Opaque transport to the vendor API
#[async_trait]
pub trait VendorTransport: Send + Sync {
    /// Send the request with the given token attached per `request.auth`
    async fn send(&self, request: &VendorRequest, token: Option<&str>) -> Result<RawResponse>;
}

/// `reqwest`-backed transport used by the binaries
pub struct HttpVendorTransport {
    client: Client,
}

impl HttpVendorTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("prisma-automation/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl VendorTransport for HttpVendorTransport {
    async fn send(&self, request: &VendorRequest, token: Option<&str>) -> Result<RawResponse> {
        debug!(url = %request.url, kind = request.kind(), "Sending Prisma API request");

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout)
        .header("accept", ACCEPT);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder = match (request.auth, token) {
            (AuthScheme::Bearer, Some(token)) => builder.bearer_auth(token),
            (AuthScheme::Redlock, Some(token)) => builder.header("x-redlock-auth", token),
            _ => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse { status, body })
    }
}
