use thiserror::Error;

use crate::config::ConfigError;
use crate::identity::IdentityError;
use crate::telemetry::logging::InitError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to initialise logging: {0}")]
    Logging(#[from] InitError),
    #[error("failed to resolve agent identity: {0}")]
    Identity(#[from] IdentityError),
    #[error("control http surface failed: {0:#}")]
    Http(anyhow::Error),
    #[error("runtime failure: {0}")]
    Runtime(String),
}
