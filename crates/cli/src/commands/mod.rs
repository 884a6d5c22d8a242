//! CLI command implementations

pub mod connect;
pub mod deploy;
pub mod docs;
pub mod doctor;
pub mod health;
pub mod keda;
