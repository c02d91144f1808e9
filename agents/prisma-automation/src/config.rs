//! Runtime configuration
//!
//! Everything is environment driven: the binaries flatten [`CommonArgs`]
//! into their clap parsers, so each flag can also come from the variable
//! named in its `env` attribute. Only the defender agent talks to the
//! compute console and flattens [`WorkloadArgs`] as well. Credentials are
//! never part of the config; they are read from the automation secret at
//! runtime.

use crate::error::{AutomationError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Timeout for login, version and protected-task generation calls
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(360);

/// Timeout for every other vendor call
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Default secret holding the automation access key pair
pub const DEFAULT_AUTOMATION_SECRET: &str = "Prisma-Automation-Secrets";

/// Arguments shared by every automation binary
#[derive(clap::Args, Debug, Clone)]
pub struct CommonArgs {
    /// Cloud Security Posture Management API host (e.g. api2.prismacloud.io)
    #[arg(long, env = "CSPM_ENDPOINT")]
    pub cspm_endpoint: String,

    /// Secrets Manager secret holding the automation access keys
    #[arg(long, env = "AWS_AUTOMATION_SECRET_NAME", default_value = DEFAULT_AUTOMATION_SECRET)]
    pub automation_secret_name: String,

    /// AWS region for Secrets Manager and ECS
    #[arg(long, env = "AWS_REGION", default_value = "us-east-2")]
    pub aws_region: String,

    /// Suppress every mutating request
    #[arg(long, env = "DEBUG_MODE", default_value_t = false)]
    pub debug_mode: bool,

    /// Maximum token refreshes per request before giving up
    #[arg(long, env = "MAX_AUTH_RETRIES", default_value_t = 3)]
    pub max_auth_retries: u32,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

/// Compute (CWP) console arguments for agents that manage workloads
#[derive(clap::Args, Debug, Clone)]
pub struct WorkloadArgs {
    /// Cloud Workload Protection API base (host plus API path)
    #[arg(long, env = "CWP_ENDPOINT")]
    pub cwp_endpoint: String,

    /// Compute console address passed to the Fargate transformation
    #[arg(long, env = "CONSOLE_ADDRESS")]
    pub console_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// How far a defender pass walks the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkScope {
    /// Stop after the first Fargate service of the first cluster
    #[default]
    FirstFargateService,
    /// Visit every Fargate service in every cluster
    Fleet,
}

/// Validated configuration consumed by the library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub cspm_endpoint: String,
    /// Empty unless [`AutomationConfig::with_workload`] was applied
    pub cwp_endpoint: String,
    pub console_address: String,
    pub automation_secret_name: String,
    pub aws_region: String,
    pub debug_mode: bool,
    pub max_auth_retries: u32,
    pub walk_scope: WalkScope,
    /// Template task definition used to learn the current defender image
    pub template_path: Option<PathBuf>,
}

impl AutomationConfig {
    /// Build from parsed CLI arguments, without the compute console
    pub fn from_args(args: &CommonArgs) -> Result<Self> {
        let config = Self {
            cspm_endpoint: args.cspm_endpoint.trim().to_string(),
            cwp_endpoint: String::new(),
            console_address: String::new(),
            automation_secret_name: args.automation_secret_name.clone(),
            aws_region: args.aws_region.clone(),
            debug_mode: args.debug_mode,
            max_auth_retries: args.max_auth_retries,
            walk_scope: WalkScope::default(),
            template_path: None,
        };
        config.validate()?;
        Ok(config)
    }

    /// Add the compute console endpoints; both must be non-empty
    pub fn with_workload(mut self, args: &WorkloadArgs) -> Result<Self> {
        self.cwp_endpoint = args.cwp_endpoint.trim().to_string();
        self.console_address = args.console_address.trim().to_string();
        for (name, value) in [
            ("CWP_ENDPOINT", &self.cwp_endpoint),
            ("CONSOLE_ADDRESS", &self.console_address),
        ] {
            if value.is_empty() {
                return Err(AutomationError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(self)
    }

    pub fn cwp_configured(&self) -> bool {
        !self.cwp_endpoint.is_empty()
    }

    pub fn with_walk_scope(mut self, scope: WalkScope) -> Self {
        self.walk_scope = scope;
        self
    }

    pub fn with_template_path(mut self, path: Option<PathBuf>) -> Self {
        self.template_path = path;
        self
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("CSPM_ENDPOINT", &self.cspm_endpoint),
            ("AWS_AUTOMATION_SECRET_NAME", &self.automation_secret_name),
        ] {
            if value.is_empty() {
                return Err(AutomationError::Config(format!("{} must not be empty", name)));
            }
        }
        if self.max_auth_retries == 0 {
            return Err(AutomationError::Config(
                "max_auth_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL for a CSPM API path
    pub fn cspm_url(&self, path: &str) -> String {
        join_endpoint(&self.cspm_endpoint, path)
    }

    /// Full URL for a CWP API path
    pub fn cwp_url(&self, path: &str) -> String {
        join_endpoint(&self.cwp_endpoint, path)
    }

    /// Fresh transformation parameters for one cluster
    pub fn fargate_params(&self) -> FargateParams {
        FargateParams::new(&self.console_address)
    }
}

/// Endpoints are configured as bare hosts; an explicit scheme is kept as-is.
fn join_endpoint(endpoint: &str, path: &str) -> String {
    let base = endpoint.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{}/{}", base, path)
    } else {
        format!("https://{}/{}", base, path)
    }
}

/// Query parameters for `POST /defenders/fargate.json`
///
/// One value is built per cluster and refined service by service: once a
/// registry credential is discovered it is reused for later services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FargateParams {
    #[serde(rename = "consoleaddr")]
    pub console_addr: String,
    pub cloud_formation: bool,
    pub filesystem_monitoring: bool,
    pub interpreter: String,
    pub extract_entrypoint: bool,
    pub registry_type: String,
    #[serde(rename = "registryCredentialID")]
    pub registry_credential_id: String,
    pub defender_image: String,
    pub defender_image_pull_secret: String,
}

impl FargateParams {
    pub fn new(console_addr: &str) -> Self {
        Self {
            console_addr: console_addr.to_string(),
            cloud_formation: false,
            filesystem_monitoring: false,
            interpreter: String::new(),
            extract_entrypoint: false,
            registry_type: "aws".to_string(),
            registry_credential_id: String::new(),
            defender_image: String::new(),
            defender_image_pull_secret: String::new(),
        }
    }

    pub fn has_registry_credential(&self) -> bool {
        !self.registry_credential_id.is_empty()
    }
}
