//! Local Anvil node lifecycle.
//!
//! The node runs detached from the CLI; its pid, port and start time are
//! kept in `anvil.pid` so later invocations can report on or stop it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

use chainctl_core::{ChainError, Result};

use crate::adapter::{NodeOps, NodeOptions, NodeStart, NodeStatus};
use crate::rpc::RpcClient;

const READY_TIMEOUT: Duration = Duration::from_secs(10);
const READY_POLL: Duration = Duration::from_millis(200);
const STOP_GRACE: Duration = Duration::from_secs(5);
const STOP_POLL: Duration = Duration::from_millis(100);
const DEFAULT_PORT: u16 = 8545;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PidRecord {
    pid: u32,
    port: u16,
    started_at: DateTime<Utc>,
}

/// Manages an `anvil` process whose state lives under `dir`.
pub struct AnvilNode {
    dir: PathBuf,
    binary: String,
}

impl AnvilNode {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            binary: "anvil".into(),
        }
    }

    /// Overrides the executable, e.g. an absolute path to a Foundry install.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn pid_file(&self) -> PathBuf {
        self.dir.join("anvil.pid")
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.join("anvil.log")
    }

    fn read_pid(&self) -> Option<PidRecord> {
        let content = std::fs::read_to_string(self.pid_file()).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(path = %self.pid_file().display(), error = %e, "ignoring unreadable pid file");
                None
            }
        }
    }

    fn write_pid(&self, record: &PidRecord) -> Result<()> {
        let path = self.pid_file();
        let content =
            serde_json::to_string_pretty(record).map_err(|e| ChainError::persistence(&path, e))?;
        std::fs::write(&path, content).map_err(|e| ChainError::persistence(&path, e))
    }

    fn clear_pid(&self) {
        let _ = std::fs::remove_file(self.pid_file());
    }

    fn args(options: &NodeOptions) -> Vec<String> {
        let mut args = vec![
            "--port".to_string(),
            options.port.to_string(),
            "--accounts".to_string(),
            options.accounts.to_string(),
            "--balance".to_string(),
            options.balance.to_string(),
        ];
        if let Some(secs) = options.block_time {
            args.push("--block-time".into());
            args.push(secs.to_string());
        }
        if let Some(url) = &options.fork_url {
            args.push("--fork-url".into());
            args.push(url.clone());
            if let Some(block) = options.fork_block {
                args.push("--fork-block-number".into());
                args.push(block.to_string());
            }
        }
        args
    }

    fn running_status(record: &PidRecord) -> NodeStatus {
        NodeStatus {
            running: true,
            pid: Some(record.pid),
            port: Some(record.port),
            rpc_url: Some(local_rpc_url(record.port)),
            started_at: Some(record.started_at),
        }
    }

    async fn wait_ready(&self, child: &mut std::process::Child, port: u16) -> Result<()> {
        let client = RpcClient::with_timeout(local_rpc_url(port), Duration::from_secs(1))?;
        let deadline = tokio::time::Instant::now() + READY_TIMEOUT;
        loop {
            if client.call::<String>("eth_chainId", serde_json::json!([])).await.is_ok() {
                return Ok(());
            }
            if let Ok(Some(exit)) = child.try_wait() {
                return Err(ChainError::NodeUnavailable(format!(
                    "anvil exited during startup ({exit}); see {}",
                    self.log_file().display()
                )));
            }
            if tokio::time::Instant::now() >= deadline {
                let _ = child.kill();
                return Err(ChainError::NodeUnavailable(format!(
                    "anvil did not become ready within {}s; see {}",
                    READY_TIMEOUT.as_secs(),
                    self.log_file().display()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }
}

#[async_trait]
impl NodeOps for AnvilNode {
    async fn start(&self, options: &NodeOptions) -> Result<NodeStart> {
        if port_open(options.port).await {
            let status = match self.read_pid() {
                Some(record) if record.port == options.port && process_alive(record.pid) => {
                    Self::running_status(&record)
                }
                _ => NodeStatus {
                    running: true,
                    port: Some(options.port),
                    rpc_url: Some(local_rpc_url(options.port)),
                    ..NodeStatus::default()
                },
            };
            info!(port = options.port, "node already listening, not spawning");
            return Ok(NodeStart {
                status,
                spawned: false,
            });
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| ChainError::persistence(&self.dir, e))?;
        let log_path = self.log_file();
        let log = std::fs::File::create(&log_path).map_err(|e| ChainError::persistence(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| ChainError::persistence(&log_path, e))?;

        let args = Self::args(options);
        debug!(binary = %self.binary, ?args, "spawning anvil");
        let mut cmd = std::process::Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        // Own process group so the node survives the CLI's terminal signals.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ChainError::Config(format!(
                    "`{}` not found on PATH; install Foundry (https://getfoundry.sh)",
                    self.binary
                ))
            } else {
                ChainError::NodeUnavailable(format!("failed to spawn {}: {e}", self.binary))
            }
        })?;

        let record = PidRecord {
            pid: child.id(),
            port: options.port,
            started_at: Utc::now(),
        };
        self.write_pid(&record)?;

        if let Err(e) = self.wait_ready(&mut child, options.port).await {
            self.clear_pid();
            return Err(e);
        }
        info!(pid = record.pid, port = record.port, "anvil started");
        Ok(NodeStart {
            status: Self::running_status(&record),
            spawned: true,
        })
    }

    async fn stop(&self) -> Result<bool> {
        let Some(record) = self.read_pid() else {
            return Ok(false);
        };
        if !process_alive(record.pid) {
            debug!(pid = record.pid, "removing stale pid file");
            self.clear_pid();
            return Ok(false);
        }

        send_terminate(record.pid);
        let deadline = tokio::time::Instant::now() + STOP_GRACE;
        while process_alive(record.pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(STOP_POLL).await;
        }
        if process_alive(record.pid) {
            warn!(pid = record.pid, "node ignored termination, killing");
            send_kill(record.pid);
        }
        self.clear_pid();
        info!(pid = record.pid, "anvil stopped");
        Ok(true)
    }

    async fn status(&self) -> Result<NodeStatus> {
        if let Some(record) = self.read_pid() {
            if process_alive(record.pid) {
                return Ok(Self::running_status(&record));
            }
        }
        if port_open(DEFAULT_PORT).await {
            // Listening, but not started by us.
            return Ok(NodeStatus {
                running: true,
                port: Some(DEFAULT_PORT),
                rpc_url: Some(local_rpc_url(DEFAULT_PORT)),
                ..NodeStatus::default()
            });
        }
        Ok(NodeStatus::default())
    }

    async fn logs(&self, lines: usize) -> Result<String> {
        let path = self.log_file();
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(tail(&content, lines)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(ChainError::persistence(&path, e)),
        }
    }
}

pub fn local_rpc_url(port: u16) -> String {
    format!("http://127.0.0.1:{port}")
}

async fn port_open(port: u16) -> bool {
    let connect = tokio::net::TcpStream::connect(("127.0.0.1", port));
    matches!(
        tokio::time::timeout(Duration::from_millis(500), connect).await,
        Ok(Ok(_))
    )
}

fn tail(content: &str, lines: usize) -> String {
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

// ---------------------------------------------------------------------------
// Process signalling
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // Signal 0 performs the permission and existence checks only.
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(unix)]
fn send_terminate(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(unix)]
fn send_kill(pid: u32) {
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn send_terminate(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .output();
}

#[cfg(not(unix))]
fn send_kill(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .output();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_include_optional_flags() {
        let options = NodeOptions {
            port: 9000,
            block_time: Some(2),
            fork_url: Some("https://rpc.example.org".into()),
            fork_block: Some(123),
            ..NodeOptions::default()
        };
        let args = AnvilNode::args(&options);
        assert_eq!(
            args,
            vec![
                "--port", "9000", "--accounts", "10", "--balance", "10000", "--block-time", "2",
                "--fork-url", "https://rpc.example.org", "--fork-block-number", "123",
            ]
        );
    }

    #[test]
    fn fork_block_requires_fork_url() {
        let options = NodeOptions {
            fork_block: Some(5),
            ..NodeOptions::default()
        };
        assert!(!AnvilNode::args(&options).contains(&"--fork-block-number".to_string()));
    }

    #[test]
    fn tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("a\nb", 10), "a\nb");
        assert_eq!(tail("", 5), "");
    }

    #[tokio::test]
    async fn stop_without_pid_file_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path());
        assert!(!node.stop().await.unwrap());
    }

    #[tokio::test]
    async fn stale_pid_file_is_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path());
        node.write_pid(&PidRecord {
            pid: 4_999_999,
            port: 1,
            started_at: Utc::now(),
        })
        .unwrap();
        assert!(!node.stop().await.unwrap());
        assert!(!node.pid_file().exists());
    }

    #[tokio::test]
    async fn logs_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path());
        assert_eq!(node.logs(50).await.unwrap(), "");
    }

    #[tokio::test]
    async fn logs_returns_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path());
        std::fs::write(node.log_file(), "one\ntwo\nthree\n").unwrap();
        assert_eq!(node.logs(1).await.unwrap(), "three");
    }

    #[tokio::test]
    async fn start_on_bound_port_does_not_spawn() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path()).with_binary("chainctl-no-such-anvil-binary");
        let options = NodeOptions {
            port,
            ..NodeOptions::default()
        };

        let started = node.start(&options).await.unwrap();
        assert!(!started.spawned);
        assert!(started.status.running);
        assert_eq!(started.status.port, Some(port));
        assert_eq!(started.status.pid, None);
        assert!(!node.pid_file().exists());
        assert!(!node.log_file().exists());

        // Calling again is still a no-op.
        assert!(!node.start(&options).await.unwrap().spawned);
        drop(listener);
    }

    #[tokio::test]
    async fn missing_binary_is_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let node = AnvilNode::new(tmp.path()).with_binary("chainctl-no-such-anvil-binary");
        let options = NodeOptions {
            port: 1,
            ..NodeOptions::default()
        };
        let err = node.start(&options).await.unwrap_err();
        assert!(matches!(err, ChainError::Config(_)));
        assert!(!node.pid_file().exists());
    }
}
