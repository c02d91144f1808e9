//! Prisma Cloud automation
//!
//! Library behind the `defender-agent` and `key-rotation-agent` binaries.
//!
//! - [`tools`]: Prisma Cloud API client and AWS control plane access
//! - [`agents`]: defender deployment and access key rotation logic
//! - [`config`]: environment driven configuration
//! - [`error`]: shared error taxonomy
//! - [`logging`]: tracing subscriber setup

pub mod agents;
pub mod config;
pub mod error;
pub mod logging;
pub mod tools;

#[cfg(test)]
mod testing;

pub use config::{AutomationConfig, CommonArgs, FargateParams, LogFormat, WalkScope, WorkloadArgs};
pub use error::{AutomationError, Result};
