//! ECS service types

use serde::{Deserialize, Serialize};

/// A running ECS service as returned by `DescribeServices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub service_arn: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub cluster_arn: String,
    /// ARN of the task definition the service currently runs
    pub task_definition: String,
    #[serde(default)]
    pub launch_type: Option<String>,
    #[serde(default)]
    pub capacity_provider_strategy: Vec<CapacityProviderStrategyItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityProviderStrategyItem {
    pub capacity_provider: String,
    #[serde(default)]
    pub weight: i64,
    #[serde(default)]
    pub base: i64,
}

impl ServiceDescriptor {
    /// Fargate placement: a weighted FARGATE capacity provider, or the
    /// FARGATE launch type when no strategy is configured
    pub fn is_fargate(&self) -> bool {
        if !self.capacity_provider_strategy.is_empty() {
            return self
                .capacity_provider_strategy
                .iter()
                .any(|s| s.capacity_provider == "FARGATE" && s.weight > 0);
        }
        self.launch_type.as_deref() == Some("FARGATE")
    }

    /// Short service name, falling back to the ARN's last segment
    pub fn name(&self) -> &str {
        if !self.service_name.is_empty() {
            return &self.service_name;
        }
        self.service_arn.rsplit('/').next().unwrap_or(&self.service_arn)
    }
}
