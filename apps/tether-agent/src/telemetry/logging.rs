use clap::ValueEnum;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Replaces the computed filter entirely when set.
pub const FILTER_ENV: &str = "TETHER_LOG_FILTER";
/// Lets the websocket and http stacks log at the agent's level.
pub const TRACE_DEPS_ENV: &str = "TETHER_TRACE_DEPS";

/// The agent's own crates; these follow the configured level.
const AGENT_TARGETS: &[&str] = &["tether_agent", "tether_proto"];

/// The websocket client emits an event per frame and the control http stack
/// one per request. Below `info` they bury the agent's own events.
const CHATTY_DEPENDENCIES: &[&str] = &[
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "hyper_util",
    "axum",
    "tower_http",
];

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    /// Diagnostic verbosity: never log below `debug`.
    pub verbose: bool,
}

/// Environment input to the filter, read once at startup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOverrides {
    pub filter: Option<String>,
    pub trace_dependencies: bool,
}

impl FilterOverrides {
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var(FILTER_ENV)
                .ok()
                .filter(|raw| !raw.trim().is_empty()),
            trace_dependencies: std::env::var(TRACE_DEPS_ENV)
                .map(|raw| is_enabled(&raw))
                .unwrap_or(false),
        }
    }
}

fn is_enabled(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Filter directives and whether the chatty dependencies were held at `warn`.
#[derive(Debug, PartialEq, Eq)]
pub struct Directives {
    pub filter: String,
    pub dependencies_quieted: bool,
}

impl LogConfig {
    pub fn effective_level(&self) -> LogLevel {
        if self.verbose {
            self.level.max(LogLevel::Debug)
        } else {
            self.level
        }
    }

    pub fn directives(&self, overrides: &FilterOverrides) -> Directives {
        if let Some(filter) = &overrides.filter {
            return Directives {
                filter: filter.clone(),
                dependencies_quieted: false,
            };
        }

        let level = self.effective_level();
        if level <= LogLevel::Info || overrides.trace_dependencies {
            return Directives {
                filter: level.directive().to_owned(),
                dependencies_quieted: false,
            };
        }

        let mut parts = vec![LogLevel::Info.directive().to_owned()];
        parts.extend(
            AGENT_TARGETS
                .iter()
                .map(|target| format!("{target}={}", level.directive())),
        );
        parts.extend(CHATTY_DEPENDENCIES.iter().map(|target| format!("{target}=warn")));
        Directives {
            filter: parts.join(","),
            dependencies_quieted: true,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("invalid log filter {filter:?}: {reason}")]
    Filter { filter: String, reason: String },
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to install logger: {0}")]
    Install(String),
}

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

pub fn init(config: &LogConfig) -> Result<(), InitError> {
    init_with(config, &FilterOverrides::from_env())
}

/// Installs the global subscriber. Calls after the first successful one are
/// no-ops, but the filter is still validated.
pub fn init_with(config: &LogConfig, overrides: &FilterOverrides) -> Result<(), InitError> {
    let directives = config.directives(overrides);
    let filter = EnvFilter::try_new(&directives.filter).map_err(|err| InitError::Filter {
        filter: directives.filter.clone(),
        reason: err.to_string(),
    })?;
    if GUARD.get().is_some() {
        return Ok(());
    }

    let (writer, guard) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| InitError::Io {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let level = config.effective_level();
    let output = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(config.file.is_none())
        .with_target(level >= LogLevel::Debug);
    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|err| InitError::Install(err.to_string()))?;
    let _ = GUARD.set(guard);

    if directives.dependencies_quieted {
        debug!(
            held_at_warn = ?CHATTY_DEPENDENCIES,
            "set {TRACE_DEPS_ENV}=1 to log transport crates at {}",
            level.directive()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: LogLevel, verbose: bool) -> LogConfig {
        LogConfig {
            level,
            file: None,
            verbose,
        }
    }

    #[test]
    fn verbose_raises_level_to_debug_but_never_lowers_it() {
        assert_eq!(config(LogLevel::Warn, true).effective_level(), LogLevel::Debug);
        assert_eq!(config(LogLevel::Trace, true).effective_level(), LogLevel::Trace);
        assert_eq!(config(LogLevel::Warn, false).effective_level(), LogLevel::Warn);
    }

    #[test]
    fn quiet_levels_apply_to_everything() {
        let directives = config(LogLevel::Warn, false).directives(&FilterOverrides::default());
        assert_eq!(
            directives,
            Directives {
                filter: "warn".into(),
                dependencies_quieted: false
            }
        );
    }

    #[test]
    fn debug_scopes_to_agent_and_holds_transport_at_warn() {
        let directives = config(LogLevel::Info, true).directives(&FilterOverrides::default());
        assert!(directives.dependencies_quieted);
        assert!(directives.filter.starts_with("info,tether_agent=debug,tether_proto=debug"));
        assert!(directives.filter.contains("tungstenite=warn"));
        assert!(directives.filter.contains("tower_http=warn"));
        assert!(EnvFilter::try_new(&directives.filter).is_ok());
    }

    #[test]
    fn trace_dependencies_lifts_the_cap() {
        let overrides = FilterOverrides {
            filter: None,
            trace_dependencies: true,
        };
        let directives = config(LogLevel::Trace, false).directives(&overrides);
        assert_eq!(directives.filter, "trace");
        assert!(!directives.dependencies_quieted);
    }

    #[test]
    fn explicit_filter_wins() {
        let overrides = FilterOverrides {
            filter: Some("tether_agent::connection=trace".into()),
            trace_dependencies: false,
        };
        let directives = config(LogLevel::Error, true).directives(&overrides);
        assert_eq!(directives.filter, "tether_agent::connection=trace");
    }

    #[test]
    fn malformed_filter_is_rejected() {
        let overrides = FilterOverrides {
            filter: Some("tether_agent=loud".into()),
            trace_dependencies: false,
        };
        let err = init_with(&config(LogLevel::Info, false), &overrides).unwrap_err();
        assert!(matches!(err, InitError::Filter { .. }), "{err}");
    }

    #[test]
    fn truthy_values() {
        for raw in ["1", "true", "YES", " on "] {
            assert!(is_enabled(raw), "{raw}");
        }
        for raw in ["0", "", "off", "no"] {
            assert!(!is_enabled(raw), "{raw}");
        }
    }
}
