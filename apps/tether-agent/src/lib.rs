pub mod app;
pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod exec;
pub mod http;
pub mod identity;
pub mod session;
pub mod telemetry;

pub use app::{resolve_identity, run, run_with_config};
pub use config::AgentConfig;
pub use error::AgentError;
