//! Key Rotation Agent - Standalone Binary
//!
//! Runs one access key rotation pass: an expired automation key is replaced
//! and the new pair written to Secrets Manager.
//!
//! ## Usage
//!
//! ```bash
//! key-rotation-agent --cspm-endpoint api2.prismacloud.io
//!
//! # Rotate after 60 days, report as JSON
//! key-rotation-agent --max-key-age-days 60 --output json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prisma_automation::agents::key_rotation::{
    KeyRotationEngine, RotationAction, RotationReport, SecretStoreAdapter, DEFAULT_MAX_KEY_AGE_DAYS,
};
use prisma_automation::logging::init_tracing;
use prisma_automation::tools::aws::AwsControlPlane;
use prisma_automation::tools::prisma::{HttpVendorTransport, PrismaClient};
use prisma_automation::{AutomationConfig, CommonArgs};
use std::sync::Arc;
use tracing::{info, warn};

/// Key Rotation Agent - Rotate the Prisma Cloud automation access key
#[derive(Parser, Debug)]
#[command(name = "key-rotation-agent", version, about)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Age in days after which an access key is rotated
    #[arg(long, env = "MAX_KEY_AGE_DAYS", default_value_t = DEFAULT_MAX_KEY_AGE_DAYS)]
    max_key_age_days: i64,

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

    if args.max_key_age_days <= 0 {
        anyhow::bail!("--max-key-age-days must be positive, got {}", args.max_key_age_days);
    }

    let config = AutomationConfig::from_args(&args.common).context("Invalid configuration")?;

    info!(
        secret = %config.automation_secret_name,
        max_key_age_days = args.max_key_age_days,
        debug_mode = config.debug_mode,
        "Starting Key Rotation Agent"
    );

    let aws = Arc::new(AwsControlPlane::new(&config.aws_region).await);
    let store = SecretStoreAdapter::new(aws, config.debug_mode);
    let credentials = store
        .load_automation_credentials(&config.automation_secret_name)
        .await
        .context("Failed to load automation credentials")?;
    let automation_key_id = credentials.access_key.clone();

    let transport = Arc::new(HttpVendorTransport::new().context("Failed to create HTTP client")?);
    let client = PrismaClient::new(config, credentials, transport);

    let engine = KeyRotationEngine::new(client, store, automation_key_id)
        .with_max_key_age_days(args.max_key_age_days);
    let report = engine.run().await.context("Key rotation pass failed")?;

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
        warn!(failures = report.failures(), "Some secrets could not be written");
    }

    Ok(())
}

fn print_report(report: &RotationReport) {
    println!("Access keys listed: {}", report.keys_listed);
    if !report.expired.is_empty() {
        println!("Expired: {}", report.expired.join(", "));
    }
    if let Some(id) = &report.issued_key_id {
        println!("Issued key: {}", id);
    }
    for outcome in &report.outcomes {
        let action = match &outcome.action {
            RotationAction::Updated => "updated".to_string(),
            RotationAction::Created => "created".to_string(),
            RotationAction::Skipped(reason) => format!("skipped ({})", reason),
            RotationAction::Failed(reason) => format!("failed: {}", reason),
        };
        println!("{}: {}", outcome.name, action);
    }
}
