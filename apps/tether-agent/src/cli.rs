use clap::{ArgAction, Parser};
use std::path::PathBuf;

use crate::connection::HandshakeMode;
use crate::identity::IdentityMode;
use crate::telemetry::logging::LogLevel;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "tether-agent",
    author,
    version,
    about = "Remote agent that keeps a WebSocket to a control endpoint and runs the commands it sends"
)]
pub struct Cli {
    /// Control endpoint(s), tried in the order given.
    #[arg(
        long = "endpoint",
        env = "TETHER_ENDPOINTS",
        value_delimiter = ',',
        default_value = "ws://127.0.0.1:3000"
    )]
    pub endpoints: Vec<String>,

    /// Try every endpoint in turn instead of only the first.
    #[arg(
        long,
        env = "TETHER_FAILOVER",
        action = ArgAction::Set,
        default_value_t = true,
        num_args = 0..=1,
        default_missing_value = "true",
        overrides_with = "no_failover"
    )]
    pub failover: bool,

    /// Dial only the first endpoint.
    #[arg(long = "no-failover", overrides_with = "failover")]
    pub no_failover: bool,

    /// Log frames and command text at debug level.
    #[arg(short, long, env = "TETHER_VERBOSE", default_value_t = false)]
    pub verbose: bool,

    #[arg(long, env = "TETHER_LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Append logs to this file instead of stderr.
    #[arg(long, env = "TETHER_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[arg(long, env = "TETHER_IDENTITY_MODE", value_enum, default_value_t = IdentityMode::Persisted)]
    pub identity_mode: IdentityMode,

    /// Token file for the persisted identity mode.
    #[arg(long, env = "TETHER_IDENTITY_FILE")]
    pub identity_file: Option<PathBuf>,

    /// Directory that `~` and bare `cd` resolve to.
    #[arg(long, env = "TETHER_HOME")]
    pub home: Option<PathBuf>,

    /// Interpreter for general commands (invoked with `-c`).
    #[arg(long, env = "TETHER_SHELL")]
    pub shell: Option<PathBuf>,

    #[arg(long, env = "TETHER_DIAL_TIMEOUT_SECS", default_value_t = 10)]
    pub dial_timeout_secs: u64,

    /// Drop the connection after this long without a well-formed frame.
    #[arg(long, env = "TETHER_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    pub idle_timeout_secs: u64,

    #[arg(long, env = "TETHER_RECONNECT_PAUSE_MS", default_value_t = 1000)]
    pub reconnect_pause_ms: u64,

    #[arg(long, env = "TETHER_MAX_BACKOFF_SECS", default_value_t = 30)]
    pub max_backoff_secs: u64,

    #[arg(long, env = "TETHER_BACKOFF_CAP", default_value_t = 10)]
    pub backoff_cap: u32,

    /// Time allowed for running commands to finish on shutdown.
    #[arg(long, env = "TETHER_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Serve the local control HTTP surface on this address.
    #[arg(long, env = "TETHER_HTTP_LISTEN")]
    pub http_listen: Option<String>,

    #[arg(long, env = "TETHER_FIELD_TYPE", default_value = "type")]
    pub field_type: String,

    #[arg(long, env = "TETHER_FIELD_TARGET", default_value = "agentId")]
    pub field_target: String,

    #[arg(long, env = "TETHER_FIELD_PAYLOAD", default_value = "content")]
    pub field_payload: String,

    #[arg(long, env = "TETHER_HANDSHAKE", value_enum, default_value_t = HandshakeMode::Identity)]
    pub handshake: HandshakeMode,
}

impl Cli {
    pub fn failover_enabled(&self) -> bool {
        self.failover && !self.no_failover
    }
}
