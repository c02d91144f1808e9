//! External API clients

pub mod aws;
pub mod prisma;
