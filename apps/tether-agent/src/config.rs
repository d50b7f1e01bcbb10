use directories::{BaseDirs, ProjectDirs};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tether_proto::WireFields;
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::connection::{BackoffPolicy, ConnectionSettings};
use crate::identity::IdentityMode;
use crate::telemetry::logging::LogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("at least one endpoint is required")]
    NoEndpoints,
    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("wire field names must be non-empty and distinct (got {0:?})")]
    WireFields(WireFields),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("invalid http listen address {addr:?}: {source}")]
    ListenAddr {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("could not determine a home directory; pass --home")]
    NoHome,
    #[error("could not determine a data directory; pass --identity-file")]
    NoDataDir,
}

/// Fully validated runtime configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub connection: ConnectionSettings,
    pub wire: WireFields,
    pub logging: LogConfig,
    pub identity_mode: IdentityMode,
    pub identity_file: PathBuf,
    pub home: PathBuf,
    pub shell: PathBuf,
    pub http_listen: Option<SocketAddr>,
    pub shutdown_grace: Duration,
}

impl TryFrom<Cli> for AgentConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let failover = cli.failover_enabled();
        let endpoints = parse_endpoints(&cli.endpoints)?;

        let wire = WireFields::new(cli.field_type, cli.field_target, cli.field_payload);
        validate_wire_fields(&wire)?;

        let dial_timeout = non_zero(Duration::from_secs(cli.dial_timeout_secs), "dial timeout")?;
        let idle_timeout = non_zero(Duration::from_secs(cli.idle_timeout_secs), "idle timeout")?;
        let reconnect_pause = non_zero(
            Duration::from_millis(cli.reconnect_pause_ms),
            "reconnect pause",
        )?;
        let max_delay = non_zero(Duration::from_secs(cli.max_backoff_secs), "max backoff")?;

        let http_listen: Option<SocketAddr> = cli
            .http_listen
            .map(|addr| {
                addr.parse().map_err(|source| ConfigError::ListenAddr {
                    addr: addr.clone(),
                    source,
                })
            })
            .transpose()?;

        let home = match cli.home {
            Some(home) => home,
            None => BaseDirs::new()
                .map(|dirs| dirs.home_dir().to_path_buf())
                .ok_or(ConfigError::NoHome)?,
        };
        let identity_file = match cli.identity_file {
            Some(path) => path,
            None => default_identity_file().ok_or(ConfigError::NoDataDir)?,
        };
        let shell = cli.shell.unwrap_or_else(default_shell);

        Ok(AgentConfig {
            connection: ConnectionSettings {
                endpoints,
                failover,
                dial_timeout,
                idle_timeout,
                reconnect_pause,
                backoff: BackoffPolicy {
                    max_delay,
                    cap: cli.backoff_cap,
                    ..BackoffPolicy::default()
                },
                handshake: cli.handshake,
                diagnostics: cli.verbose,
            },
            wire,
            logging: LogConfig {
                level: cli.log_level,
                file: cli.log_file,
                verbose: cli.verbose,
            },
            identity_mode: cli.identity_mode,
            identity_file,
            home,
            shell,
            http_listen,
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}

fn parse_endpoints(raw: &[String]) -> Result<Vec<Url>, ConfigError> {
    let endpoints = raw
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|endpoint| {
            let url = Url::parse(endpoint).map_err(|err| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            })?;
            match url.scheme() {
                "ws" | "wss" => Ok(url),
                other => Err(ConfigError::InvalidEndpoint {
                    endpoint: endpoint.to_string(),
                    reason: format!("unsupported scheme {other:?}; expected ws or wss"),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    if endpoints.is_empty() {
        return Err(ConfigError::NoEndpoints);
    }
    Ok(endpoints)
}

fn validate_wire_fields(fields: &WireFields) -> Result<(), ConfigError> {
    let names = [&fields.kind, &fields.target, &fields.payload];
    let distinct: HashSet<&str> = names.iter().map(|n| n.as_str()).collect();
    if names.iter().any(|n| n.is_empty()) || distinct.len() != names.len() {
        return Err(ConfigError::WireFields(fields.clone()));
    }
    Ok(())
}

fn non_zero(value: Duration, what: &'static str) -> Result<Duration, ConfigError> {
    if value.is_zero() {
        Err(ConfigError::ZeroDuration(what))
    } else {
        Ok(value)
    }
}

/// `<data dir>/tether/agent_id`.
pub fn default_identity_file() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tether").map(|dirs| dirs.data_dir().join("agent_id"))
}

fn default_shell() -> PathBuf {
    std::env::var_os("SHELL")
        .filter(|shell| !shell.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(crate::exec::POSIX_SHELL))
}
