//! Access Key Rotation Agent
//!
//! Keeps the Prisma Cloud automation access key fresh: once the key passes
//! its maximum age a replacement is issued and written to Secrets Manager
//! in the same `AWS_SECRETS` layout the agents read their credentials from.

pub mod engine;
pub mod secret_store;
pub mod types;

pub use engine::KeyRotationEngine;
pub use secret_store::{decode_credentials, encode_credentials, SecretStoreAdapter};
pub use types::{
    AccessKeyPair, KeyOutcome, RotationAction, RotationReport, DEFAULT_MAX_KEY_AGE_DAYS,
    SECRET_DESCRIPTION,
};
