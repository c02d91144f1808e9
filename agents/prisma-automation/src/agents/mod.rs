//! Automation agents
//!
//! - [`defender`]: Fargate defender deployment and upgrades
//! - [`key_rotation`]: automation access key rotation

pub mod defender;
pub mod key_rotation;
