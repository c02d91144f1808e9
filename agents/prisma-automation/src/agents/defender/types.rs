//! Defender deployment types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container name the console gives the injected defender
pub const DEFENDER_CONTAINER_NAME: &str = "TwistlockDefender";

/// Environment variable carrying the defender install bundle
pub const INSTALL_BUNDLE_VAR: &str = "INSTALL_BUNDLE";

/// Width of the version suffix on defender image tags (`32_05_123`)
pub const VERSION_TAG_WIDTH: usize = 9;

/// Protection state of one task definition, recomputed every pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefenderStatus {
    Undefended,
    Outdated,
    Defended,
}

impl std::fmt::Display for DefenderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DefenderStatus::Undefended => write!(f, "undefended"),
            DefenderStatus::Outdated => write!(f, "outdated"),
            DefenderStatus::Defended => write!(f, "defended"),
        }
    }
}

/// Current defender image and install bundle
///
/// Learned once per pass from the template task definition and applied to
/// every outdated service.
#[derive(Clone, PartialEq, Eq)]
pub struct DefenderRelease {
    pub image: String,
    pub bundle: String,
    pub version: String,
}

impl std::fmt::Debug for DefenderRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefenderRelease")
            .field("image", &self.image)
            .field("bundle", &format_args!("<{} bytes>", self.bundle.len()))
            .field("version", &self.version)
            .finish()
    }
}

/// What the pass did to one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "reason", rename_all = "snake_case")]
pub enum DeploymentAction {
    /// Defender injected into an undefended service
    Protected,
    /// Defender image and bundle replaced
    Upgraded,
    AlreadyDefended,
    SkippedNotFargate,
    /// Dry run: the new revision was prepared but not registered
    DryRun,
    Failed(String),
}

impl DeploymentAction {
    pub fn is_failure(&self) -> bool {
        matches!(self, DeploymentAction::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOutcome {
    pub cluster: String,
    pub service: String,
    /// `None` for services that were never classified
    pub status: Option<DefenderStatus>,
    #[serde(flatten)]
    pub action: DeploymentAction,
    pub new_task_definition_arn: Option<String>,
}

impl ServiceOutcome {
    pub fn new(cluster: &str, service: &str, status: Option<DefenderStatus>, action: DeploymentAction) -> Self {
        Self {
            cluster: cluster.to_string(),
            service: service.to_string(),
            status,
            action,
            new_task_definition_arn: None,
        }
    }

    pub fn with_arn(mut self, arn: Option<String>) -> Self {
        self.new_task_definition_arn = arn;
        self
    }
}

/// Result of one defender deployment pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub latest_version: String,
    pub clusters_visited: usize,
    pub services: Vec<ServiceOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn new(latest_version: &str) -> Self {
        let now = Utc::now();
        Self {
            latest_version: latest_version.to_string(),
            clusters_visited: 0,
            services: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    pub fn record(&mut self, outcome: ServiceOutcome) {
        self.services.push(outcome);
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    pub fn count(&self, action: &DeploymentAction) -> usize {
        self.services.iter().filter(|s| &s.action == action).count()
    }

    pub fn failures(&self) -> usize {
        self.services.iter().filter(|s| s.action.is_failure()).count()
    }
}
