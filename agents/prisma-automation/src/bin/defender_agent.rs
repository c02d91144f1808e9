//! Defender Agent - Standalone Binary
//!
//! Runs one Fargate defender deployment pass: services without the Prisma
//! Cloud defender are protected, outdated defenders are upgraded.
//!
//! ## Usage
//!
//! ```bash
//! # First Fargate service of the first cluster (default)
//! defender-agent --cspm-endpoint api2.prismacloud.io \
//!     --cwp-endpoint us-east1.cloud.twistlock.com/us-2-158320372/api/v32.05 \
//!     --console-address us-east1.cloud.twistlock.com
//!
//! # Whole fleet, report as JSON, nothing registered
//! DEBUG_MODE=true defender-agent --full-fleet --output json
//!
//! # Latest serverless defenders
//! defender-agent --list-serverless
//!
//! # Download the Lambda defender bundle for a runtime
//! defender-agent --bundle-runtime python3.12 --bundle-output layer.zip
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prisma_automation::agents::defender::{DefenderDeploymentAgent, DeploymentAction, DeploymentReport};
use prisma_automation::agents::key_rotation::SecretStoreAdapter;
use prisma_automation::logging::init_tracing;
use prisma_automation::tools::aws::AwsControlPlane;
use prisma_automation::tools::prisma::{HttpVendorTransport, PrismaClient};
use prisma_automation::{AutomationConfig, CommonArgs, WalkScope, WorkloadArgs};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Defender Agent - Deploy and upgrade Prisma Cloud defenders on ECS Fargate
#[derive(Parser, Debug)]
#[command(name = "defender-agent", version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    workload: WorkloadArgs,

    /// Visit every Fargate service in every cluster instead of stopping
    /// after the first one
    #[arg(long, env = "FULL_FLEET")]
    full_fleet: bool,

    /// Template task definition used to learn the current defender release
    #[arg(long, env = "DEFENDER_TEMPLATE_PATH")]
    template_path: Option<PathBuf>,

    /// List the latest serverless defenders and exit
    #[arg(long)]
    list_serverless: bool,

    /// Download the serverless defender bundle for this Lambda runtime
    /// (e.g. python3.12) and exit
    #[arg(long)]
    bundle_runtime: Option<String>,

    /// Where to write the downloaded bundle
    #[arg(long, default_value = "twistlock_serverless_defender.zip")]
    bundle_output: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.common.log_format);

    let scope = if args.full_fleet {
        WalkScope::Fleet
    } else {
        WalkScope::FirstFargateService
    };
    let config = AutomationConfig::from_args(&args.common)
        .context("Invalid configuration")?
        .with_workload(&args.workload)
        .context("Invalid configuration")?
        .with_walk_scope(scope)
        .with_template_path(args.template_path.clone());

    info!(
        region = %config.aws_region,
        scope = ?config.walk_scope,
        debug_mode = config.debug_mode,
        "Starting Defender Agent"
    );

    let aws = Arc::new(AwsControlPlane::new(&config.aws_region).await);
    let store = SecretStoreAdapter::new(aws.clone(), config.debug_mode);
    let credentials = store
        .load_automation_credentials(&config.automation_secret_name)
        .await
        .context("Failed to load automation credentials")?;

    let transport = Arc::new(HttpVendorTransport::new().context("Failed to create HTTP client")?);
    let client = PrismaClient::new(config, credentials, transport);

    if args.list_serverless {
        let defenders = client
            .serverless_defenders()
            .await
            .context("Failed to list serverless defenders")?
            .unwrap_or_default();
        match args.output {
            OutputFormat::Text => {
                for defender in &defenders {
                    println!(
                        "{:<48} {:<12} {}",
                        defender.hostname,
                        defender.version,
                        if defender.connected { "connected" } else { "disconnected" }
                    );
                }
            }
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&defenders).context("Failed to serialize defenders")?
                );
            }
        }
        return Ok(());
    }

    if let Some(runtime) = &args.bundle_runtime {
        let bundle = client
            .serverless_bundle(runtime)
            .await
            .context("Failed to download serverless bundle")?
            .ok_or_else(|| anyhow::anyhow!("No serverless bundle returned for runtime {}", runtime))?;
        tokio::fs::write(&args.bundle_output, &bundle)
            .await
            .with_context(|| format!("Failed to write {}", args.bundle_output.display()))?;
        info!(
            runtime = %runtime,
            path = %args.bundle_output.display(),
            bytes = bundle.len(),
            "Serverless defender bundle written"
        );
        return Ok(());
    }

    let agent = DefenderDeploymentAgent::new(client, aws);
    let report = agent.run().await.context("Defender deployment pass failed")?;

    match args.output {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        }
    }

    if report.failures() > 0 {
        warn!(failures = report.failures(), "Some services could not be deployed");
    }

    Ok(())
}

fn print_report(report: &DeploymentReport) {
    println!("Latest defender version: {}", report.latest_version);
    for outcome in &report.services {
        let status = outcome
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let action = match &outcome.action {
            DeploymentAction::Protected => "protected".to_string(),
            DeploymentAction::Upgraded => "upgraded".to_string(),
            DeploymentAction::AlreadyDefended => "already defended".to_string(),
            DeploymentAction::SkippedNotFargate => "skipped (not fargate)".to_string(),
            DeploymentAction::DryRun => "dry run".to_string(),
            DeploymentAction::Failed(reason) => format!("failed: {}", reason),
        };
        println!(
            "{}/{}: {} -> {}{}",
            outcome.cluster,
            outcome.service,
            status,
            action,
            outcome
                .new_task_definition_arn
                .as_deref()
                .map(|arn| format!(" ({})", arn))
                .unwrap_or_default()
        );
    }
}
