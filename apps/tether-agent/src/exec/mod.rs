//! Command execution against a [`SessionState`].
//!
//! Every call produces exactly one [`CommandResult`]; failures are reported in
//! the result and never end the session.

mod capture;
mod classify;

pub use capture::{Captured, POSIX_SHELL, run_captured};
pub use classify::{Classification, classify};

use std::path::{Path, PathBuf};
use tether_proto::{CommandResult, EMPTY_SUCCESS_SENTINEL};
use tracing::{debug, trace};

use crate::session::paths::{normalize_lexically, resolve_target};
use crate::session::{SessionState, ShellEnvironment};

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    env: ShellEnvironment,
    shell: PathBuf,
    diagnostics: bool,
}

impl CommandExecutor {
    pub fn new(env: ShellEnvironment, shell: impl Into<PathBuf>) -> Self {
        Self {
            env,
            shell: shell.into(),
            diagnostics: false,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn environment(&self) -> &ShellEnvironment {
        &self.env
    }

    pub async fn prompt(&self, session: &SessionState) -> String {
        self.env.prompt(&session.current_dir().await)
    }

    pub async fn execute(&self, session: &SessionState, command: &str) -> CommandResult {
        let command = command.trim();
        let Some(classification) = classify(command) else {
            return CommandResult::failure("", "empty command", self.prompt(session).await);
        };
        if self.diagnostics {
            debug!(command, class = classification.label(), "executing command");
        }

        match classification {
            Classification::Navigate { target } => self.navigate(session, target.as_deref()).await,
            Classification::PrintWorkingDirectory | Classification::ListDirectory => {
                self.run_shell(session, Path::new(POSIX_SHELL), command).await
            }
            Classification::Shell => self.run_shell(session, &self.shell, command).await,
        }
    }

    /// Changes the session directory. The session write lock is held from
    /// resolution until the new directory is committed.
    pub async fn navigate(&self, session: &SessionState, target: Option<&str>) -> CommandResult {
        let mut current = session.begin_navigation().await;
        let resolved = match target.map(str::trim).filter(|raw| !raw.is_empty()) {
            Some(raw) => resolve_target(raw, &current, &self.env.home),
            None => normalize_lexically(&self.env.home),
        };

        let rejection = match tokio::fs::metadata(&resolved).await {
            Ok(meta) if meta.is_dir() => None,
            Ok(_) => Some(format!("not a directory: {}", resolved.display())),
            Err(err) => Some(format!("cannot access {}: {err}", resolved.display())),
        };
        if let Some(detail) = rejection {
            trace!(requested = ?target, %detail, "navigation rejected");
            return CommandResult::failure("", detail, self.env.prompt(&current));
        }

        *current = resolved;
        let display = self.env.display_dir(&current);
        debug!(dir = %current.display(), "working directory changed");
        CommandResult::success("", self.env.prompt(&current)).with_directory(display)
    }

    async fn run_shell(
        &self,
        session: &SessionState,
        interpreter: &Path,
        command: &str,
    ) -> CommandResult {
        let cwd = session.current_dir().await;
        let Captured { output, failure } = run_captured(interpreter, command, &cwd).await;
        let prompt = self.prompt(session).await;
        match failure {
            Some(detail) => {
                if self.diagnostics {
                    debug!(command, %detail, "command failed");
                }
                CommandResult::failure(output, detail, prompt)
            }
            None if output.is_empty() => CommandResult::success(EMPTY_SUCCESS_SENTINEL, prompt),
            None => CommandResult::success(output, prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tether_proto::CommandStatus;

    fn executor(home: &Path) -> CommandExecutor {
        CommandExecutor::new(ShellEnvironment::new(home, "user", "box"), POSIX_SHELL)
    }

    #[tokio::test]
    async fn silent_success_reports_the_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new(dir.path());
        let result = executor(dir.path()).execute(&session, "true").await;
        assert_eq!(result.status, CommandStatus::Success);
        assert_eq!(result.output, EMPTY_SUCCESS_SENTINEL);
        assert_eq!(result.prompt, "user@box:~$ ");
    }

    #[tokio::test]
    async fn empty_command_is_rejected_without_touching_state() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new(dir.path());
        let result = executor(dir.path()).execute(&session, "   ").await;
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.error_detail.as_deref(), Some("empty command"));
        assert_eq!(session.current_dir().await, dir.path());
    }

    #[tokio::test]
    async fn nonzero_exit_keeps_captured_output() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new(dir.path());
        let result = executor(dir.path())
            .execute(&session, "echo nope 1>&2; exit 3")
            .await;
        assert_eq!(result.status, CommandStatus::Error);
        assert_eq!(result.output, "nope\n");
        assert_eq!(result.error_detail.as_deref(), Some("exit status 3"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_reported_like_a_failed_command() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new(dir.path());
        let exec = CommandExecutor::new(
            ShellEnvironment::new(dir.path(), "user", "box"),
            "/nonexistent/tether-shell",
        );
        let result = exec.execute(&session, "echo hi").await;
        assert_eq!(result.status, CommandStatus::Error);
        assert!(
            result
                .error_detail
                .unwrap()
                .starts_with("failed to start /nonexistent/tether-shell")
        );

        // Listing does not depend on the configured interpreter.
        let listing = exec.execute(&session, "ls").await;
        assert_eq!(listing.status, CommandStatus::Success);
    }

    #[tokio::test]
    async fn cd_dot_dot_returns_to_home() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home/user");
        let project = home.join("project");
        fs::create_dir_all(&project).unwrap();

        let session = SessionState::new(&project);
        let result = executor(&home).execute(&session, "cd ..").await;
        assert_eq!(result.status, CommandStatus::Success);
        assert_eq!(result.output, "");
        assert_eq!(result.directory_display.as_deref(), Some("~"));
        assert_eq!(result.prompt, "user@box:~$ ");
        assert_eq!(session.current_dir().await, home);
    }

    #[tokio::test]
    async fn failed_navigation_leaves_directory_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let session = SessionState::new(dir.path());
        let exec = executor(dir.path());

        let missing = exec.execute(&session, "cd does-not-exist").await;
        assert_eq!(missing.status, CommandStatus::Error);
        assert!(missing.directory_display.is_none());
        assert_eq!(session.current_dir().await, dir.path());

        let not_dir = exec.navigate(&session, Some("plain.txt")).await;
        assert_eq!(not_dir.status, CommandStatus::Error);
        assert!(not_dir.error_detail.unwrap().starts_with("not a directory"));
        assert_eq!(session.current_dir().await, dir.path());
    }

    #[tokio::test]
    async fn bare_cd_and_tilde_go_home() {
        let root = tempfile::tempdir().unwrap();
        let home = root.path().join("home");
        let nested = home.join("a/b");
        fs::create_dir_all(&nested).unwrap();
        let exec = executor(&home);

        let session = SessionState::new(root.path());
        let result = exec.execute(&session, "cd").await;
        assert_eq!(result.directory_display.as_deref(), Some("~"));
        assert_eq!(session.current_dir().await, home);

        let result = exec.execute(&session, "cd ~/a/./b").await;
        assert_eq!(result.directory_display.as_deref(), Some("~/a/b"));
        assert_eq!(session.current_dir().await, nested);
    }

    #[tokio::test]
    async fn shell_commands_run_in_the_session_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("inner")).unwrap();
        fs::write(dir.path().join("inner/marker"), "").unwrap();
        let session = SessionState::new(dir.path());
        let exec = executor(dir.path());

        exec.execute(&session, "cd inner").await;
        let listing = exec.execute(&session, "ls").await;
        assert_eq!(listing.output, "marker\n");
        assert_eq!(listing.prompt, "user@box:~/inner$ ");
    }

    #[tokio::test]
    async fn listing_a_missing_path_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let session = SessionState::new(dir.path());
        let result = executor(dir.path()).execute(&session, "ls nothing-here").await;
        assert_eq!(result.status, CommandStatus::Error);
        assert!(result.output.contains("nothing-here"));
        assert!(result.error_detail.unwrap().starts_with("exit status"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn listing_without_permission_reports_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Privileged users bypass directory permissions.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let session = SessionState::new(dir.path());
        let result = executor(dir.path()).execute(&session, "ls locked").await;
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(result.status, CommandStatus::Error);
        assert!(!result.error_detail.unwrap_or_default().is_empty());
        assert!(!result.output.is_empty());
    }
}
