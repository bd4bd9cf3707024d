//! Child-process transport over standard streams.

use async_trait::async_trait;
use serde_json::Value;
use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Transport, TransportKind};
use crate::config::server::ProcessConfig;
use crate::error::{Error, Result};
use crate::mcp::framer::FramedChannel;
use crate::mcp::protocol::{JsonRpcNotification, JsonRpcRequest};

/// Resolve `command` to an executable path.
///
/// Commands containing a path separator are checked as given. Bare names are
/// searched on `PATH`; on Windows the usual script and binary extensions are
/// tried as well.
pub fn resolve_command(command: &str) -> Result<PathBuf> {
    let candidate = Path::new(command);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return if is_executable(candidate) {
            Ok(candidate.to_path_buf())
        } else {
            Err(Error::CommandNotFound(command.to_string()))
        };
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    for dir in env::split_paths(&search_path) {
        for name in candidate_names(command) {
            let full = dir.join(name);
            if is_executable(&full) {
                return Ok(full);
            }
        }
    }

    Err(Error::CommandNotFound(command.to_string()))
}

#[cfg(windows)]
fn candidate_names(command: &str) -> Vec<String> {
    if Path::new(command).extension().is_some() {
        return vec![command.to_string()];
    }
    let mut names = vec![command.to_string()];
    names.extend([".cmd", ".bat", ".exe"].iter().map(|ext| format!("{}{}", command, ext)));
    names
}

#[cfg(not(windows))]
fn candidate_names(command: &str) -> Vec<String> {
    vec![command.to_string()]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// An MCP server running as a child process.
pub struct ProcessTransport {
    server_id: String,
    child: Mutex<Child>,
    channel: FramedChannel<BufReader<ChildStdout>, ChildStdin>,
    stderr_task: Mutex<Option<JoinHandle<()>>>,
    shutdown_grace: Duration,
}

impl ProcessTransport {
    /// Resolve and spawn the configured command.
    ///
    /// The child is killed if the transport is dropped without being closed.
    pub fn spawn(server_id: &str, config: &ProcessConfig, shutdown_grace: Duration) -> Result<Self> {
        let program = resolve_command(&config.command)?;
        debug!(server = server_id, "Resolved command {} to {}", config.command, program.display());

        let mut child = Command::new(&program)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                command: config.command.clone(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Internal("child stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout was not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            let id = server_id.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %id, "stderr: {}", line);
                }
            })
        });

        info!(
            server = server_id,
            pid = child.id().unwrap_or_default(),
            "Started MCP server process: {} {}",
            config.command,
            config.args.join(" ")
        );

        Ok(Self {
            server_id: server_id.to_string(),
            child: Mutex::new(child),
            channel: FramedChannel::new(BufReader::new(stdout), stdin),
            stderr_task: Mutex::new(stderr_task),
            shutdown_grace,
        })
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn request(&self, request: &JsonRpcRequest, timeout: Duration, operation: &str) -> Result<Value> {
        self.channel.exchange(request, timeout, operation).await
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<()> {
        self.channel.send(notification).await
    }

    async fn check_alive(&self) -> Result<()> {
        let mut child = self.child.lock().await;
        match child.try_wait()? {
            Some(status) => Err(Error::ProcessExited(status.code())),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        // Closing stdin is the polite shutdown request for stdio servers.
        self.channel.close_writer().await;

        let mut child = self.child.lock().await;
        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => debug!(server = %self.server_id, "MCP server exited: {}", status),
            Ok(Err(e)) => warn!(server = %self.server_id, "Error waiting for MCP server: {}", e),
            Err(_) => {
                warn!(
                    server = %self.server_id,
                    "MCP server did not exit within {:?}, killing it",
                    self.shutdown_grace
                );
                if let Err(e) = child.kill().await {
                    warn!(server = %self.server_id, "Failed to kill MCP server: {}", e);
                }
            }
        }
        drop(child);

        if let Some(task) = self.stderr_task.lock().await.take() {
            task.abort();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Instant;

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(command: &Path) -> ProcessConfig {
        ProcessConfig {
            command: command.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_command_on_path() {
        let path = resolve_command("sh").unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_resolve_command_missing() {
        let err = resolve_command("no-such-mcp-server-xyz").unwrap_err();
        assert!(matches!(err, Error::CommandNotFound(ref c) if c == "no-such-mcp-server-xyz"));
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[test]
    fn test_resolve_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "srv", "exit 0");
        assert_eq!(resolve_command(script.to_str().unwrap()).unwrap(), script);

        let plain = dir.path().join("not-executable");
        std::fs::write(&plain, "data").unwrap();
        assert!(resolve_command(plain.to_str().unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_env_overrides_reach_child() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "env-srv",
            r#"read line
printf '{"jsonrpc":"2.0","id":0,"result":{"greeting":"%s"}}\n' "$GREETING""#,
        );
        let mut cfg = config(&script);
        cfg.env.insert("GREETING".to_string(), "hello".to_string());

        let transport = ProcessTransport::spawn("env", &cfg, Duration::from_secs(1)).unwrap();
        let response = transport
            .request(&JsonRpcRequest::list_tools(), Duration::from_secs(5), "tools/list")
            .await
            .unwrap();
        assert_eq!(response["result"]["greeting"], "hello");
        transport.close().await;
    }

    #[tokio::test]
    async fn test_check_alive_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "quitter", "exit 3");
        let transport = ProcessTransport::spawn("quitter", &config(&script), Duration::from_secs(1)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match transport.check_alive().await {
                Err(e) => break e,
                Ok(()) if Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(20)).await
                }
                Ok(()) => panic!("child never exited"),
            }
        };
        assert!(matches!(err, Error::ProcessExited(Some(3))));
        transport.close().await;
    }

    #[tokio::test]
    async fn test_close_kills_child_that_ignores_stdin_eof() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "stubborn", "trap '' TERM\nexec sleep 30");
        let transport = ProcessTransport::spawn("stubborn", &config(&script), Duration::from_millis(100)).unwrap();

        let started = Instant::now();
        transport.close().await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(transport.check_alive().await.is_err());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "cat-srv", "exec cat");
        let transport = ProcessTransport::spawn("cat", &config(&script), Duration::from_secs(2)).unwrap();

        transport.check_alive().await.unwrap();
        transport.close().await;
        transport.close().await;
        assert!(transport.check_alive().await.is_err());
    }

    #[tokio::test]
    async fn test_request_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_script(dir.path(), "cat-srv", "exec cat");
        let transport = ProcessTransport::spawn("cat", &config(&script), Duration::from_secs(2)).unwrap();
        transport.close().await;

        let err = transport
            .request(&JsonRpcRequest::list_tools(), Duration::from_millis(200), "tools/list")
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
