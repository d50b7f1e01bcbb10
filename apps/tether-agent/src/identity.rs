//! Stable per-device identity strings.
//!
//! Three strategies exist because deployed control planes address agents in
//! different ways: by a host/platform composite, by a machine-id composite, or
//! by an opaque token persisted on first run.

use clap::ValueEnum;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file {path:?} is unreadable: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("identity file {path:?} is empty")]
    Empty { path: PathBuf },
    #[error("failed to persist identity to {path:?}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

pub trait IdentityProvider: Send + Sync {
    fn identity(&self) -> Result<String, IdentityError>;
}

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq)]
pub enum IdentityMode {
    /// `hostname | os | arch`
    Host,
    /// `hostname::user::machine-id`
    Machine,
    /// Random token written once to the identity file.
    #[default]
    Persisted,
}

pub fn local_hostname() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}

pub fn local_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(whoami::username)
}

#[derive(Debug, Default, Clone)]
pub struct HostIdentity;

impl IdentityProvider for HostIdentity {
    fn identity(&self) -> Result<String, IdentityError> {
        let host = local_hostname().unwrap_or_else(|| "unknown".to_string());
        Ok(format!(
            "{host} | {} | {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ))
    }
}

#[derive(Debug, Clone)]
pub struct MachineIdentity {
    machine_id_paths: Vec<PathBuf>,
}

impl Default for MachineIdentity {
    fn default() -> Self {
        Self {
            machine_id_paths: MACHINE_ID_PATHS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl MachineIdentity {
    pub fn with_machine_id_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            machine_id_paths: paths,
        }
    }

    fn machine_id(&self) -> String {
        self.machine_id_paths
            .iter()
            .filter_map(|path| fs::read_to_string(path).ok())
            .map(|raw| raw.trim().to_string())
            .find(|id| !id.is_empty())
            .unwrap_or_default()
    }
}

impl IdentityProvider for MachineIdentity {
    fn identity(&self) -> Result<String, IdentityError> {
        let host = local_hostname().unwrap_or_default().to_lowercase();
        let user = local_username().to_lowercase();
        Ok(format!("{host}::{user}::{}", self.machine_id()))
    }
}

#[derive(Debug, Clone)]
pub struct PersistedIdentity {
    path: PathBuf,
}

impl PersistedIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the stored token, generating and writing one only when the file
    /// is absent or blank.
    pub fn ensure(&self) -> Result<String, IdentityError> {
        match self.identity() {
            Ok(existing) => {
                info!(path = %self.path.display(), "using existing agent identity");
                return Ok(existing);
            }
            Err(IdentityError::Read { source, .. }) if source.kind() != io::ErrorKind::NotFound => {
                return Err(IdentityError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
            Err(_) => {}
        }

        let token = Uuid::new_v4().to_string();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| IdentityError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, &token).map_err(|source| IdentityError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!(path = %self.path.display(), "generated and persisted new agent identity");
        Ok(token)
    }
}

impl IdentityProvider for PersistedIdentity {
    fn identity(&self) -> Result<String, IdentityError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| IdentityError::Read {
            path: self.path.clone(),
            source,
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(IdentityError::Empty {
                path: self.path.clone(),
            });
        }
        Ok(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_identity_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let provider = PersistedIdentity::new(dir.path().join("nested/agent_id"));

        assert!(provider.identity().is_err());
        let first = provider.ensure().unwrap();
        assert!(Uuid::parse_str(&first).is_ok());

        let second = provider.ensure().unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.identity().unwrap(), first);
    }

    #[test]
    fn persisted_identity_keeps_existing_value_and_trims_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_id");
        fs::write(&path, "device-42\n").unwrap();

        let provider = PersistedIdentity::new(&path);
        assert_eq!(provider.ensure().unwrap(), "device-42");
        assert_eq!(fs::read_to_string(&path).unwrap(), "device-42\n");
    }

    #[test]
    fn blank_identity_file_is_an_error_until_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_id");
        fs::write(&path, "  \n").unwrap();

        let provider = PersistedIdentity::new(&path);
        assert!(matches!(provider.identity(), Err(IdentityError::Empty { .. })));
        let regenerated = provider.ensure().unwrap();
        assert_eq!(provider.identity().unwrap(), regenerated);
    }

    #[test]
    fn host_identity_is_deterministic() {
        let a = HostIdentity.identity().unwrap();
        let b = HostIdentity.identity().unwrap();
        assert_eq!(a, b);
        assert!(a.ends_with(&format!(
            " | {} | {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        )));
    }

    #[test]
    fn machine_identity_uses_first_non_empty_machine_id() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        let real = dir.path().join("real");
        fs::write(&empty, "\n").unwrap();
        fs::write(&real, "abc123\n").unwrap();

        let provider = MachineIdentity::with_machine_id_paths(vec![
            dir.path().join("missing"),
            empty,
            real,
        ]);
        let identity = provider.identity().unwrap();
        assert!(identity.ends_with("::abc123"));
        assert_eq!(identity.matches("::").count(), 2);
        assert_eq!(identity, provider.identity().unwrap());
    }
}
