//! Defender Status Classifier
//!
//! Pure function of the task definition and the latest console version:
//! no network calls, same answer for the same input.

use tracing::info;

use super::types::{DefenderStatus, DEFENDER_CONTAINER_NAME, VERSION_TAG_WIDTH};
use crate::tools::aws::{ContainerDefinition, TaskDefinition};

/// Classifier output: the defender container (when present) and its status
#[derive(Debug, Clone, Copy)]
pub struct Classification<'a> {
    pub agent: Option<&'a ContainerDefinition>,
    pub status: DefenderStatus,
}

/// Classify a task definition against the latest defender version
///
/// A definition without the defender container is undefended. Otherwise the
/// trailing version tag of the defender image is compared byte for byte
/// with `latest_version`.
pub fn classify<'a>(task_definition: &'a TaskDefinition, latest_version: &str) -> Classification<'a> {
    let Some(agent) = task_definition.container(DEFENDER_CONTAINER_NAME) else {
        info!(family = %task_definition.family, "Task definition is not defended, defender deployment starting");
        return Classification {
            agent: None,
            status: DefenderStatus::Undefended,
        };
    };

    let current = version_tag(&agent.image);
    let status = if current == latest_version {
        DefenderStatus::Defended
    } else {
        info!(
            family = %task_definition.family,
            current_version = %current,
            latest_version = %latest_version,
            "Defender is outdated, initiating update"
        );
        DefenderStatus::Outdated
    };

    Classification {
        agent: Some(agent),
        status,
    }
}

/// Trailing fixed-width version tag of a defender image reference
///
/// Shorter references are returned whole.
pub fn version_tag(image: &str) -> &str {
    let start = image.len().saturating_sub(VERSION_TAG_WIDTH);
    image.get(start..).unwrap_or(image)
}
