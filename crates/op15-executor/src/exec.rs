//! `exec.run` — spawn a command in the host environment and wait for it
//! to terminate, or kill it on timeout. A single synchronous call: no
//! background-session concept, no poll/kill/tail surface, just
//! spawn-wait-or-timeout returning `{exitCode, stdout, stderr}`.

use std::path::Path;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use op15_domain::error::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// `exitCode` reported when the child is killed for exceeding its deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Resolve `cwd` precedence: explicit argument > session workspace
/// root > home directory. Fails with `invalid-cwd` if the resolved
/// directory does not exist.
pub fn resolve_cwd(explicit: Option<&Path>, workspace_root: Option<&Path>, home: &Path) -> Result<std::path::PathBuf> {
    let candidate = explicit
        .or(workspace_root)
        .unwrap_or(home)
        .to_path_buf();
    if !candidate.is_dir() {
        return Err(Error::InvalidCwd(candidate.display().to_string()));
    }
    Ok(candidate)
}

/// Run `command` via the host shell (`sh -c`) in `cwd`, killing it if
/// it outlives `timeout` (default 60s).
pub async fn run(command: &str, cwd: &Path, timeout: Option<Duration>) -> Result<ExecOutcome> {
    let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| Error::Other(format!("spawn failed: {e}")))?;

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");

    let wait_fut = async {
        let mut stdout = String::new();
        let mut stderr = String::new();
        let (status, _, _) = tokio::join!(
            child.wait(),
            stdout_pipe.read_to_string(&mut stdout),
            stderr_pipe.read_to_string(&mut stderr),
        );
        (status, stdout, stderr)
    };

    match tokio::time::timeout(timeout, wait_fut).await {
        Ok((status, stdout, stderr)) => {
            let status = status.map_err(|e| Error::Other(format!("wait failed: {e}")))?;
            Ok(ExecOutcome {
                exit_code: status.code().unwrap_or(-1),
                stdout,
                stderr,
            })
        }
        Err(_elapsed) => {
            let _ = child.kill().await;
            Ok(ExecOutcome {
                exit_code: TIMEOUT_EXIT_CODE,
                stdout: String::new(),
                stderr: format!("exec.run: timed out after {}ms, process killed", timeout.as_millis()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn run_returns_exit_code_and_stdout() {
        let tmp = TempDir::new().unwrap();
        let out = run("echo hello", tmp.path(), None).await.unwrap();
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn run_captures_nonzero_exit_code() {
        let tmp = TempDir::new().unwrap();
        let out = run("exit 3", tmp.path(), None).await.unwrap();
        assert_eq!(out.exit_code, 3);
    }

    #[tokio::test]
    async fn run_times_out_and_kills_child() {
        let tmp = TempDir::new().unwrap();
        let out = run("sleep 10 && echo done", tmp.path(), Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(out.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(out.stdout, "");
        assert!(out.stderr.contains("timed out"));
    }

    #[test]
    fn resolve_cwd_prefers_explicit_over_workspace_and_home() {
        let tmp = TempDir::new().unwrap();
        let explicit = tmp.path().join("explicit");
        let workspace = tmp.path().join("workspace");
        std::fs::create_dir(&explicit).unwrap();
        std::fs::create_dir(&workspace).unwrap();
        let resolved = resolve_cwd(Some(&explicit), Some(&workspace), tmp.path()).unwrap();
        assert_eq!(resolved, explicit);
    }

    #[test]
    fn resolve_cwd_fails_invalid_cwd_when_missing() {
        let tmp = TempDir::new().unwrap();
        let err = resolve_cwd(Some(&tmp.path().join("nope")), None, tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "invalid-cwd");
    }
}
