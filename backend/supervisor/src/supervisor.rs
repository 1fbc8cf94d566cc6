//! The Subprocess Supervisor: launches, tracks, and terminates tool servers.
//!
//! The supervisor exclusively owns every process handle. Other components
//! only ever see the [`ServerChannel`] returned from `start`; nobody signals
//! or waits on a child directly. There is no automatic restart: a fresh
//! subprocess is only launched when an agent handle is rebuilt.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_core::AgentError;

use crate::channel::ServerChannel;
use crate::health::{HealthCell, HealthStatus};

/// Launch description for one tool server.
#[derive(Debug, Clone)]
pub struct SubprocessSpec {
    /// Agent this server belongs to; used in diagnostics.
    pub agent_id: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl SubprocessSpec {
    pub fn new(agent_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
        }
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// What callers get back from `start`: the communication channel plus an
/// observable health status. Cloneable and shared across all requests for the
/// owning agent.
#[derive(Clone)]
pub struct SubprocessHandle {
    pub id: Uuid,
    channel: Arc<ServerChannel>,
    health: Arc<HealthCell>,
}

impl SubprocessHandle {
    pub fn channel(&self) -> &Arc<ServerChannel> {
        &self.channel
    }

    pub fn status(&self) -> HealthStatus {
        self.health.get()
    }
}

enum Control {
    Shutdown {
        grace: Duration,
        done: oneshot::Sender<()>,
    },
}

struct Entry {
    agent_id: String,
    health: Arc<HealthCell>,
    ctrl: mpsc::Sender<Control>,
}

/// Owns all running tool-server processes.
pub struct SubprocessSupervisor {
    entries: Mutex<HashMap<Uuid, Entry>>,
    grace: Duration,
}

impl SubprocessSupervisor {
    pub fn new(grace: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Launch a tool server.
    ///
    /// Synchronous up to confirming the process spawned; readiness probing is
    /// the caller's job via the returned channel.
    pub async fn start(&self, spec: SubprocessSpec) -> Result<SubprocessHandle, AgentError> {
        if let Some(dir) = &spec.working_dir {
            if !dir.is_dir() {
                return Err(AgentError::launch(
                    &spec.agent_id,
                    format!(
                        "working directory does not exist: {} (command: {})",
                        dir.display(),
                        spec.command
                    ),
                ));
            }
        }

        let mut cmd = Command::new(&spec.command);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AgentError::launch(
                &spec.agent_id,
                format!("failed to spawn '{}': {e}", spec.command),
            )
        })?;

        let id = Uuid::new_v4();
        let health = Arc::new(HealthCell::new());

        // Spawn always pipes these; absence is a programming error.
        let stdin = child.stdin.take().expect("child stdin was piped");
        let stdout = child.stdout.take().expect("child stdout was piped");
        let stderr = child.stderr.take().expect("child stderr was piped");

        let channel = Arc::new(ServerChannel::new(stdin, Arc::clone(&health)));
        tokio::spawn(Arc::clone(&channel).read_loop(stdout));
        tokio::spawn(forward_stderr(spec.agent_id.clone(), stderr));

        let (ctrl_tx, ctrl_rx) = mpsc::channel(1);
        tokio::spawn(monitor(
            child,
            ctrl_rx,
            Arc::clone(&health),
            Arc::clone(&channel),
            spec.agent_id.clone(),
        ));

        info!(
            subprocess_id = %id,
            agent_id = %spec.agent_id,
            command = %spec.command,
            "Tool server started"
        );

        self.entries.lock().await.insert(
            id,
            Entry {
                agent_id: spec.agent_id,
                health: Arc::clone(&health),
                ctrl: ctrl_tx,
            },
        );

        Ok(SubprocessHandle {
            id,
            channel,
            health,
        })
    }

    /// Gracefully stop one entry (used for orphans after a config reload).
    pub async fn stop(&self, id: Uuid) {
        let entry = self.entries.lock().await.remove(&id);
        if let Some(entry) = entry {
            shutdown_entry(&entry, self.grace).await;
        }
    }

    /// Terminate every tracked tool server: graceful stop signal, bounded
    /// grace period, then force-kill. Idempotent; safe to call when empty.
    pub async fn shutdown_all(&self) {
        let entries: Vec<Entry> = {
            let mut map = self.entries.lock().await;
            map.drain().map(|(_, e)| e).collect()
        };
        if entries.is_empty() {
            debug!("Supervisor shutdown: nothing to stop");
            return;
        }

        info!(count = entries.len(), "Shutting down tool servers");
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let grace = self.grace;
            tasks.push(tokio::spawn(
                async move { shutdown_entry(&entry, grace).await },
            ));
        }
        for task in tasks {
            let _ = task.await;
        }
        info!("All tool servers terminated");
    }

    /// Current health of every tracked entry (diagnostics).
    pub async fn statuses(&self) -> Vec<(Uuid, String, HealthStatus)> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(id, e)| (*id, e.agent_id.clone(), e.health.get()))
            .collect()
    }
}

async fn shutdown_entry(entry: &Entry, grace: Duration) {
    if entry.health.get() == HealthStatus::Terminated {
        return;
    }
    let (done_tx, done_rx) = oneshot::channel();
    let sent = entry
        .ctrl
        .send(Control::Shutdown {
            grace,
            done: done_tx,
        })
        .await;
    if sent.is_err() {
        // Monitor already gone: the process exited on its own.
        return;
    }
    // The monitor force-kills after `grace`; the margin covers kill latency.
    if timeout(grace + Duration::from_secs(2), done_rx).await.is_err() {
        warn!(agent_id = %entry.agent_id, "Tool server shutdown confirmation timed out");
    }
}

/// Owns the child process. Waits for natural exit or a shutdown command; the
/// supervisor never touches the `Child` from anywhere else.
async fn monitor(
    mut child: Child,
    mut ctrl_rx: mpsc::Receiver<Control>,
    health: Arc<HealthCell>,
    channel: Arc<ServerChannel>,
    agent_id: String,
) {
    tokio::select! {
        status = child.wait() => {
            match status {
                Ok(code) => warn!(agent_id = %agent_id, exit = %code, "Tool server exited unexpectedly"),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "Failed waiting on tool server"),
            }
            health.set(HealthStatus::Terminated);
            channel.close();
        }
        cmd = ctrl_rx.recv() => {
            match cmd {
                Some(Control::Shutdown { grace, done }) => {
                    debug!(agent_id = %agent_id, "Stopping tool server");
                    channel.close_input().await;
                    if timeout(grace, child.wait()).await.is_err() {
                        warn!(agent_id = %agent_id, "Tool server ignored stop signal; killing");
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                    }
                    health.set(HealthStatus::Terminated);
                    channel.close();
                    let _ = done.send(());
                }
                None => {
                    // Supervisor dropped without shutdown; just reap the child.
                    let _ = child.wait().await;
                    health.set(HealthStatus::Terminated);
                    channel.close();
                }
            }
        }
    }
}

async fn forward_stderr(agent_id: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(agent_id = %agent_id, "tool server stderr: {line}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// POSIX-sh tool server answering every request with a pong result.
    const PONG_SERVER: &str = r#"while IFS= read -r line; do id=$(printf %s "$line" | sed 's/.*"id":\([0-9]*\).*/\1/'); printf '{"id":%s,"result":{"pong":true}}\n' "$id"; done"#;

    fn sh_spec(agent_id: &str, script: &str) -> SubprocessSpec {
        SubprocessSpec::new(agent_id, "sh").args(["-c", script])
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let supervisor = SubprocessSupervisor::new(Duration::from_secs(2));
        let handle = supervisor
            .start(sh_spec("echo", PONG_SERVER))
            .await
            .unwrap();

        assert_eq!(handle.status(), HealthStatus::Starting);
        let result = handle.channel().request("ping", json!({})).await.unwrap();
        assert_eq!(result["pong"], true);
        assert_eq!(handle.status(), HealthStatus::Healthy);

        supervisor.shutdown_all().await;
        assert_eq!(handle.status(), HealthStatus::Terminated);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_launch_error() {
        let supervisor = SubprocessSupervisor::new(Duration::from_secs(1));
        let err = supervisor
            .start(SubprocessSpec::new("mapper", "/nonexistent/tool-server"))
            .await
            .err()
            .expect("spawn of a missing binary must fail");
        match err {
            AgentError::Launch { agent_id, message } => {
                assert_eq!(agent_id, "mapper");
                assert!(message.contains("/nonexistent/tool-server"));
            }
            other => panic!("expected Launch error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_working_dir_is_launch_error() {
        let supervisor = SubprocessSupervisor::new(Duration::from_secs(1));
        let spec = SubprocessSpec::new("mapper", "sh").working_dir("/no/such/dir");
        let err = supervisor
            .start(spec)
            .await
            .err()
            .expect("missing working dir must fail");
        assert!(err.to_string().contains("working directory"));
    }

    #[tokio::test]
    async fn test_unexpected_exit_terminates_entry_and_fails_channel() {
        let supervisor = SubprocessSupervisor::new(Duration::from_secs(1));
        let handle = supervisor.start(sh_spec("echo", "exit 0")).await.unwrap();

        // Give the monitor a moment to observe the exit.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.status(), HealthStatus::Terminated);
        assert!(handle.channel().request("ping", json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_all_is_idempotent() {
        let supervisor = SubprocessSupervisor::new(Duration::from_secs(1));
        let handle = supervisor
            .start(sh_spec("echo", PONG_SERVER))
            .await
            .unwrap();

        supervisor.shutdown_all().await;
        supervisor.shutdown_all().await;
        assert_eq!(handle.status(), HealthStatus::Terminated);
        assert!(supervisor.statuses().await.is_empty());
    }

    #[tokio::test]
    async fn test_stubborn_server_is_force_killed() {
        let supervisor = SubprocessSupervisor::new(Duration::from_millis(200));
        // Ignores EOF on stdin and just sleeps.
        let handle = supervisor
            .start(sh_spec("echo", "sleep 600"))
            .await
            .unwrap();

        supervisor.shutdown_all().await;
        assert_eq!(handle.status(), HealthStatus::Terminated);
    }
}
