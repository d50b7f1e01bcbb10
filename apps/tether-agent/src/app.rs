use std::sync::Arc;
use tether_proto::Codec;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::cli::Cli;
use crate::config::AgentConfig;
use crate::connection::ConnectionManager;
use crate::dispatch::HandlerRegistry;
use crate::error::AgentError;
use crate::exec::CommandExecutor;
use crate::http::{self, HttpState};
use crate::identity::{
    HostIdentity, IdentityError, IdentityMode, IdentityProvider, MachineIdentity,
    PersistedIdentity,
};
use crate::session::ShellEnvironment;
use crate::telemetry::logging;

pub async fn run(cli: Cli) -> Result<(), AgentError> {
    let config = AgentConfig::try_from(cli)?;
    logging::init(&config.logging)?;
    run_with_config(config, shutdown_on_ctrl_c()).await
}

/// Runs the agent until `shutdown` is cancelled, then drains in-flight commands.
pub async fn run_with_config(
    config: AgentConfig,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let (provider, identity) = resolve_identity(&config)?;
    info!(
        mode = ?config.identity_mode,
        %identity,
        endpoints = config.connection.endpoints.len(),
        failover = config.connection.failover,
        verbose = config.logging.verbose,
        "starting tether agent"
    );

    let http_task = match config.http_listen {
        Some(addr) => {
            let listener = http::bind(addr).await.map_err(AgentError::Http)?;
            Some(tokio::spawn(http::serve(
                listener,
                HttpState::new(provider),
                shutdown.clone(),
            )))
        }
        None => None,
    };

    let executor = CommandExecutor::new(ShellEnvironment::detect(&config.home), &config.shell)
        .with_diagnostics(config.connection.diagnostics);
    let tracker = TaskTracker::new();
    let mut manager = ConnectionManager::new(
        config.connection,
        Codec::new(config.wire),
        Arc::new(HandlerRegistry::with_builtin_handlers()),
        Arc::new(executor),
        Arc::from(identity),
        tracker.clone(),
    );
    manager.run(shutdown.clone()).await;

    tracker.close();
    if tokio::time::timeout(config.shutdown_grace, tracker.wait())
        .await
        .is_err()
    {
        warn!(
            remaining = tracker.len(),
            grace_secs = config.shutdown_grace.as_secs(),
            "commands still running at shutdown; abandoning them"
        );
    }

    if let Some(task) = http_task {
        match task.await {
            Ok(result) => result.map_err(AgentError::Http)?,
            Err(err) => return Err(AgentError::Runtime(err.to_string())),
        }
    }
    info!("tether agent stopped");
    Ok(())
}

/// Builds the configured identity strategy and reads the identity once.
pub fn resolve_identity(
    config: &AgentConfig,
) -> Result<(Arc<dyn IdentityProvider>, String), IdentityError> {
    match config.identity_mode {
        IdentityMode::Host => {
            let provider = HostIdentity;
            let identity = provider.identity()?;
            Ok((Arc::new(provider), identity))
        }
        IdentityMode::Machine => {
            let provider = MachineIdentity::default();
            let identity = provider.identity()?;
            Ok((Arc::new(provider), identity))
        }
        IdentityMode::Persisted => {
            let provider = PersistedIdentity::new(&config.identity_file);
            let identity = provider.ensure()?;
            Ok((Arc::new(provider), identity))
        }
    }
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                trigger.cancel();
            }
            Err(err) => warn!(error = %err, "cannot listen for shutdown signal"),
        }
    });
    token
}
