//! In-memory stand-ins for the vendor API and the AWS control planes

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};

use crate::config::{AutomationConfig, WalkScope};
use crate::error::{AutomationError, Result};
use crate::tools::aws::{
    ContainerOrchestrator, RegistrableTaskDefinition, SecretVault, ServiceDescriptor,
    TaskDefinition,
};
use crate::tools::prisma::{RawResponse, VendorRequest, VendorTransport};

pub fn test_config() -> AutomationConfig {
    AutomationConfig {
        cspm_endpoint: "api.prisma.test".to_string(),
        cwp_endpoint: "cwp.prisma.test/api/v32.05".to_string(),
        console_address: "console.prisma.test".to_string(),
        automation_secret_name: "Prisma-Automation-Secrets".to_string(),
        aws_region: "us-east-2".to_string(),
        debug_mode: false,
        max_auth_retries: 3,
        walk_scope: WalkScope::FirstFargateService,
        template_path: None,
    }
}

/// Formatted log lines written while a [`capture_logs`] guard is held
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub token: Option<String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Replays canned responses per URL suffix; the last response repeats
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<(String, VecDeque<RawResponse>)>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, suffix: &str, responses: Vec<RawResponse>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((suffix.to_string(), responses.into()));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.url.ends_with(suffix))
            .count()
    }

    pub fn last_call(&self, suffix: &str) -> Option<RecordedCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.url.ends_with(suffix))
    }
}

#[async_trait]
impl VendorTransport for ScriptedTransport {
    async fn send(&self, request: &VendorRequest, token: Option<&str>) -> Result<RawResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: request.url.clone(),
            token: token.map(str::to_string),
            query: request.query.clone(),
            body: request.body.clone(),
        });

        let mut routes = self.routes.lock().unwrap();
        let queue = routes
            .iter_mut()
            .find(|(suffix, _)| request.url.ends_with(suffix.as_str()))
            .map(|(_, queue)| queue);

        Ok(match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| RawResponse::new(404, "no response scripted")),
            None => RawResponse::new(404, "no route"),
        })
    }
}

#[derive(Default)]
pub struct InMemoryVault {
    pub secrets: Mutex<HashMap<String, String>>,
    pub writes: Mutex<Vec<String>>,
}

impl InMemoryVault {
    pub fn with_secret(self, name: &str, value: &str) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.secrets.lock().unwrap().get(name).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl SecretVault for InMemoryVault {
    async fn get_secret_string(&self, name: &str) -> Result<String> {
        self.value(name)
            .ok_or_else(|| AutomationError::NotFound(name.to_string()))
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> Result<()> {
        self.writes.lock().unwrap().push(format!("put:{}", name));
        let mut secrets = self.secrets.lock().unwrap();
        match secrets.get_mut(name) {
            Some(existing) => {
                *existing = value.to_string();
                Ok(())
            }
            None => Err(AutomationError::NotFound(name.to_string())),
        }
    }

    async fn create_secret(&self, name: &str, value: &str, _description: &str) -> Result<()> {
        self.writes.lock().unwrap().push(format!("create:{}", name));
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

/// ECS fake: clusters -> services -> task definitions
#[derive(Default)]
pub struct FakeOrchestrator {
    pub clusters: Vec<String>,
    pub services: HashMap<String, Vec<ServiceDescriptor>>,
    pub task_definitions: HashMap<String, Value>,
    pub reject_registration: bool,
    pub reject_update: bool,
    pub registered: Mutex<Vec<Value>>,
    pub updates: Mutex<Vec<(String, String, String)>>,
}

impl FakeOrchestrator {
    pub fn with_service(mut self, cluster: &str, service: ServiceDescriptor, task_definition: Value) -> Self {
        if !self.clusters.iter().any(|c| c == cluster) {
            self.clusters.push(cluster.to_string());
        }
        self.task_definitions
            .insert(service.task_definition.clone(), task_definition);
        self.services
            .entry(cluster.to_string())
            .or_default()
            .push(service);
        self
    }

    pub fn registered(&self) -> Vec<Value> {
        self.registered.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(String, String, String)> {
        self.updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContainerOrchestrator for FakeOrchestrator {
    async fn list_clusters(&self) -> Result<Vec<String>> {
        Ok(self.clusters.clone())
    }

    async fn list_services(&self, cluster: &str) -> Result<Vec<String>> {
        Ok(self
            .services
            .get(cluster)
            .map(|services| services.iter().map(|s| s.service_arn.clone()).collect())
            .unwrap_or_default())
    }

    async fn describe_service(&self, cluster: &str, service: &str) -> Result<ServiceDescriptor> {
        self.services
            .get(cluster)
            .and_then(|services| services.iter().find(|s| s.service_arn == service))
            .cloned()
            .ok_or_else(|| AutomationError::NotFound(service.to_string()))
    }

    async fn describe_task_definition(&self, task_definition: &str) -> Result<TaskDefinition> {
        let document = self
            .task_definitions
            .get(task_definition)
            .cloned()
            .ok_or_else(|| AutomationError::NotFound(task_definition.to_string()))?;
        TaskDefinition::from_json(document)
    }

    async fn register_task_definition(&self, task_definition: &RegistrableTaskDefinition) -> Result<String> {
        if self.reject_registration {
            return Err(AutomationError::Aws {
                operation: "RegisterTaskDefinition".to_string(),
                message: "ClientException: invalid container definition".to_string(),
            });
        }
        let mut registered = self.registered.lock().unwrap();
        registered.push(task_definition.to_json()?);
        Ok(format!(
            "arn:aws:ecs:us-east-2:123456789:task-definition/{}:{}",
            task_definition.family(),
            100 + registered.len()
        ))
    }

    async fn update_service(&self, cluster: &str, service: &str, task_definition: &str) -> Result<Value> {
        if self.reject_update {
            return Err(AutomationError::Aws {
                operation: "UpdateService".to_string(),
                message: "ServiceNotActiveException: Service was not ACTIVE.".to_string(),
            });
        }
        self.updates.lock().unwrap().push((
            cluster.to_string(),
            service.to_string(),
            task_definition.to_string(),
        ));
        Ok(json!({ "serviceArn": service, "taskDefinition": task_definition }))
    }
}

/// Fargate service descriptor for a cluster/service pair
pub fn fargate_service(cluster: &str, name: &str, task_definition: &str) -> ServiceDescriptor {
    serde_json::from_value(json!({
        "serviceArn": format!("arn:aws:ecs:us-east-2:123456789:service/{}/{}", cluster, name),
        "serviceName": name,
        "clusterArn": format!("arn:aws:ecs:us-east-2:123456789:cluster/{}", cluster),
        "taskDefinition": task_definition,
        "launchType": "FARGATE"
    }))
    .unwrap()
}

/// Described, unprotected application task definition
pub fn app_task_definition(arn: &str, family: &str, image: &str) -> Value {
    json!({
        "taskDefinitionArn": arn,
        "family": family,
        "containerDefinitions": [{
            "name": family,
            "image": image,
            "essential": true,
            "portMappings": [{"containerPort": 8080, "protocol": "tcp"}]
        }],
        "networkMode": "awsvpc",
        "requiresCompatibilities": ["FARGATE"],
        "cpu": "256",
        "memory": "512",
        "revision": 4,
        "status": "ACTIVE",
        "requiresAttributes": [{"name": "ecs.capability.execution-role-awslogs"}],
        "compatibilities": ["EC2", "FARGATE"],
        "registeredAt": "2024-03-01T10:00:00+00:00",
        "registeredBy": "arn:aws:iam::123456789:user/deployer"
    })
}

/// Response of the fargate.json transformation for `app_task_definition`
pub fn protected_task_definition(family: &str, image: &str, defender_image: &str, bundle: &str) -> Value {
    json!({
        "family": family,
        "containerDefinitions": [
            {
                "name": family,
                "image": image,
                "essential": true,
                "entryPoint": ["/var/lib/twistlock/fargate/defender", "fargate", "entrypoint", "/app/start"],
                "portMappings": [{"containerPort": 8080, "protocol": "tcp"}],
                "volumesFrom": [{"sourceContainer": "TwistlockDefender", "readOnly": false}]
            },
            {
                "name": "TwistlockDefender",
                "image": defender_image,
                "entryPoint": ["/usr/local/bin/defender", "fargate", "sidecar"],
                "environment": [
                    {"name": "DEFENDER_TYPE", "value": "fargate"},
                    {"name": "INSTALL_BUNDLE", "value": bundle},
                    {"name": "WS_ADDRESS", "value": "wss://console.prisma.test:443"}
                ],
                "essential": false,
                "logConfiguration": null
            }
        ],
        "networkMode": "awsvpc",
        "requiresCompatibilities": ["FARGATE"],
        "cpu": "256",
        "memory": "512"
    })
}
