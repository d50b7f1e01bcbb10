use std::io::{self, Read};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Interpreter used for listing and printing the working directory.
pub const POSIX_SHELL: &str = "/bin/sh";

/// Result of running one command through an interpreter.
#[derive(Debug)]
pub struct Captured {
    /// stdout and stderr, interleaved in write order.
    pub output: String,
    /// `None` when the command exited zero.
    pub failure: Option<String>,
}

/// Runs `<interpreter> -c <command>` in `cwd` with stdout and stderr sharing one pipe.
///
/// Spawn failures are folded into [`Captured::failure`]; the caller never has to
/// distinguish a missing interpreter from a non-zero exit.
pub async fn run_captured(interpreter: &Path, command: &str, cwd: &Path) -> Captured {
    match run_inner(interpreter, command, cwd).await {
        Ok(captured) => captured,
        Err(err) => Captured {
            output: String::new(),
            failure: Some(format!("failed to start {}: {err}", interpreter.display())),
        },
    }
}

async fn run_inner(interpreter: &Path, command: &str, cwd: &Path) -> io::Result<Captured> {
    let (mut reader, writer) = io::pipe()?;

    let mut cmd = Command::new(interpreter);
    cmd.arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    let mut child = cmd.spawn()?;
    // The command owns our copies of the write end; release them or the reader never sees EOF.
    drop(cmd);

    let drain = tokio::task::spawn_blocking(move || {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).map(|_| buf)
    });

    let status = child.wait().await?;
    let bytes = drain.await.map_err(io::Error::other)??;

    Ok(Captured {
        output: String::from_utf8_lossy(&bytes).into_owned(),
        failure: describe_failure(status),
    })
}

fn describe_failure(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    if let Some(code) = status.code() {
        return Some(format!("exit status {code}"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Some(format!("terminated by signal {signal}"));
        }
    }
    Some("terminated abnormally".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stdout_and_stderr_share_one_stream() {
        let dir = tempfile::tempdir().unwrap();
        let captured = run_captured(
            Path::new(POSIX_SHELL),
            "echo out; echo err 1>&2; echo again",
            dir.path(),
        )
        .await;
        assert!(captured.failure.is_none());
        assert_eq!(captured.output, "out\nerr\nagain\n");
    }

    #[tokio::test]
    async fn exit_codes_and_signals_are_described() {
        let dir = tempfile::tempdir().unwrap();
        let exited = run_captured(Path::new(POSIX_SHELL), "echo partial; exit 3", dir.path()).await;
        assert_eq!(exited.failure.as_deref(), Some("exit status 3"));
        assert_eq!(exited.output, "partial\n");

        let killed = run_captured(Path::new(POSIX_SHELL), "kill -9 $$", dir.path()).await;
        assert_eq!(killed.failure.as_deref(), Some("terminated by signal 9"));
    }

    #[tokio::test]
    async fn missing_interpreter_is_a_failure_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let captured = run_captured(Path::new("/nonexistent/tether-sh"), "true", dir.path()).await;
        let failure = captured.failure.unwrap();
        assert!(failure.starts_with("failed to start /nonexistent/tether-sh:"), "{failure}");
        assert!(captured.output.is_empty());
    }

    #[tokio::test]
    async fn runs_in_the_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let captured = run_captured(Path::new(POSIX_SHELL), "pwd", dir.path()).await;
        let reported = std::fs::canonicalize(captured.output.trim()).unwrap();
        assert_eq!(reported, std::fs::canonicalize(dir.path()).unwrap());
    }
}
