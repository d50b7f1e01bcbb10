//! Per-connection shell context.
//!
//! A [`SessionState`] is created when a connection is established and dropped
//! with it; nothing here survives a reconnect. Clones share the same state so
//! concurrently running handlers of one connection observe each other's
//! navigation.

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};

use crate::identity::{local_hostname, local_username};

#[derive(Clone, Debug)]
pub struct SessionState {
    current_dir: Arc<RwLock<PathBuf>>,
}

impl SessionState {
    pub fn new(start: impl Into<PathBuf>) -> Self {
        Self {
            current_dir: Arc::new(RwLock::new(start.into())),
        }
    }

    /// Snapshot of the working directory.
    pub async fn current_dir(&self) -> PathBuf {
        self.current_dir.read().await.clone()
    }

    /// Exclusive access for the duration of a navigation: resolution,
    /// verification and commit happen under one guard.
    pub(crate) async fn begin_navigation(&self) -> RwLockWriteGuard<'_, PathBuf> {
        self.current_dir.write().await
    }
}

/// Facts about the local user that shape paths and prompts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellEnvironment {
    pub home: PathBuf,
    pub user: String,
    pub host: String,
}

impl ShellEnvironment {
    pub fn new(home: impl Into<PathBuf>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            home: home.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    pub fn detect(home: impl Into<PathBuf>) -> Self {
        Self::new(
            home,
            local_username(),
            local_hostname().unwrap_or_else(|| "computer".to_string()),
        )
    }

    pub fn display_dir(&self, path: &Path) -> String {
        paths::abbreviate_home(path, &self.home)
    }

    pub fn prompt(&self, cwd: &Path) -> String {
        format!("{}@{}:{}$ ", self.user, self.host, self.display_dir(cwd))
    }
}
