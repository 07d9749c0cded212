//! C3 Agent Process — spawns and supervises one agent CLI child per session.
//!
//! Grounded on the teacher's exec/manager task split (dedicated stdout/stderr
//! reader tasks, a single stdin-writer task fed by an `mpsc` channel) and on
//! the CLI flag conventions for JSON-Lines stream communication with a
//! coding-agent subprocess.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use sa_domain::frame::{self, Frame};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, RwLock};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Parameters for spawning one agent child process.
pub struct SpawnParams {
    /// Session's own temp placeholder external id, used as `SessionID()`
    /// until the init frame supplies the agent's real one (§4.3).
    pub temp_external_id: String,
    pub work_dir: PathBuf,
    pub initial_prompt: String,
    /// Some(id) when C2 resolved this thread as resumable.
    pub resume_external_id: Option<String>,
    pub executable: String,
    pub default_options: Vec<String>,
    pub permission_prompt_tool: String,
    /// Path to the generated `--mcp-config` document naming the in-process
    /// permission endpoint (written by the caller; C3 only wires the flag).
    pub mcp_config_path: PathBuf,
}

/// One frame (or synthesized failure) surfaced to the Event Router (C4).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    Frame(Frame),
    /// Abnormal exit: non-zero status, stdout EOF with no prior result
    /// frame, or a stream that could not be parsed as JSON-Lines at all.
    Error(AgentProcessError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AgentProcessError {
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),
    #[error("agent exited unexpectedly (status={status:?})")]
    ExitedUnexpectedly { status: Option<i32> },
    #[error("agent stream corrupt: {0}")]
    StreamCorrupt(String),
}

/// A running (or recently-stopped) agent child process.
///
/// Cloning shares the same child — there is exactly one writer task and one
/// pair of reader tasks per spawn, matching "one place that tears a child
/// down" (§4.3 implementation notes).
#[derive(Clone)]
pub struct AgentProcess {
    external_id: Arc<RwLock<String>>,
    stdin_tx: mpsc::Sender<StdinMessage>,
    shutdown_tx: mpsc::Sender<()>,
}

enum StdinMessage {
    Line(String),
}

impl AgentProcess {
    /// Spawn the agent CLI and start its supervising tasks. Returns the
    /// handle plus the event receiver C4 should drain.
    pub fn spawn(params: SpawnParams) -> Result<(Self, mpsc::Receiver<AgentEvent>), AgentProcessError> {
        let mut cmd = Command::new(&params.executable);
        cmd.arg("--verbose")
            .arg("--print")
            .arg("--input-format")
            .arg("stream-json")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--permission-prompt-tool")
            .arg(&params.permission_prompt_tool)
            .arg("--mcp-config")
            .arg(&params.mcp_config_path)
            .arg("--strict-mcp-config")
            .args(&params.default_options)
            .current_dir(&params.work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(ref resume_id) = params.resume_external_id {
            cmd.arg("--resume").arg(resume_id);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentProcessError::SpawnFailed(e.to_string()))?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");
        let mut stdin = child.stdin.take().expect("stdin was piped");

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<StdinMessage>(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let external_id = Arc::new(RwLock::new(params.temp_external_id.clone()));

        // Stdin writer: single task owns the handle, so SendMessage never
        // needs its own lock around the child.
        tokio::spawn(async move {
            while let Some(StdinMessage::Line(line)) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = stdin.flush().await;
            }
        });

        // Stderr reader: logged at warn, never parsed as a frame.
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(target: "agent_stderr", "{line}");
            }
        });

        // Stdout reader + supervising wait, combined so exactly one place
        // (this task) decides the terminal AgentEvent.
        let external_id_for_reader = external_id.clone();
        let event_tx_for_reader = event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut saw_result = false;

            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                match frame::parse_line(&line) {
                                    Ok(frame) => {
                                        if let Frame::System(ref sys) = frame {
                                            if sys.is_init() {
                                                if let Some(ref real_id) = sys.session_id {
                                                    *external_id_for_reader.write().await = real_id.clone();
                                                }
                                            }
                                        }
                                        if matches!(frame, Frame::Result(_)) {
                                            saw_result = true;
                                        }
                                        if event_tx_for_reader.send(AgentEvent::Frame(frame)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, line = %line, "agent stream corrupt, skipping line");
                                        let _ = event_tx_for_reader
                                            .send(AgentEvent::Error(AgentProcessError::StreamCorrupt(e.to_string())))
                                            .await;
                                    }
                                }
                            }
                            Ok(None) => break, // stdout EOF
                            Err(e) => {
                                tracing::warn!(error = %e, "agent stdout read error");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = terminate(&mut child).await;
                        return;
                    }
                }
            }

            let status = child.wait().await.ok().and_then(|s| s.code());
            if !saw_result {
                let _ = event_tx_for_reader
                    .send(AgentEvent::Error(AgentProcessError::ExitedUnexpectedly { status }))
                    .await;
            }
        });

        Ok((
            Self {
                external_id,
                stdin_tx,
                shutdown_tx,
            },
            event_rx,
        ))
    }

    /// Current external session id: the temp placeholder until the init
    /// frame has been parsed, the agent's own id afterward.
    pub async fn session_id(&self) -> String {
        self.external_id.read().await.clone()
    }

    /// Write one JSON-Lines user frame to stdin (§4.3 "Input framing").
    /// Writing to a dead child returns an error rather than panicking.
    pub async fn send_message(&self, text: &str) -> Result<(), AgentProcessError> {
        let line = frame::user_input_line(text);
        self.stdin_tx
            .send(StdinMessage::Line(line))
            .await
            .map_err(|_| AgentProcessError::ExitedUnexpectedly { status: None })
    }

    /// SIGTERM, then SIGKILL after a grace period. Idempotent: a second
    /// call after the child has already exited is a harmless no-op.
    pub async fn close(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// SIGTERM-then-grace-timer-then-SIGKILL, the one routine both explicit
/// `Close()` and the idle reaper (§5) funnel through.
async fn terminate(child: &mut Child) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: pid is this child's own, obtained from the handle we hold.
            unsafe {
                libc::kill(pid as libc::pid_t, libc::SIGTERM);
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    let graceful = tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await;
    match graceful {
        Ok(_) => Ok(()),
        Err(_) => {
            child.kill().await?;
            child.wait().await.map(|_| ())
        }
    }
}

/// Outgoing MCP config document naming the single permission-prompt server,
/// written by the caller before spawn (§4.5 implementation notes).
#[derive(Debug, Clone, Serialize)]
pub struct McpConfigDocument {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: std::collections::HashMap<String, McpServerEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct McpServerEntry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
}

impl McpConfigDocument {
    /// Build the single-entry document pointing at this system's own
    /// `/mcp` endpoint, named after `claude.permission_prompt_tool`'s server.
    pub fn single_server(server_name: &str, base_url: &str) -> Self {
        let mut mcp_servers = std::collections::HashMap::new();
        mcp_servers.insert(
            server_name.to_string(),
            McpServerEntry {
                kind: "http",
                url: format!("{base_url}/mcp"),
            },
        );
        Self { mcp_servers }
    }

    pub fn write_to(&self, path: &std::path::Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).expect("serializable");
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mcp_config_document_names_one_http_server() {
        let doc = McpConfigDocument::single_server("permission_prompt", "http://localhost:8085");
        assert_eq!(doc.mcp_servers.len(), 1);
        let entry = doc.mcp_servers.get("permission_prompt").unwrap();
        assert_eq!(entry.kind, "http");
        assert_eq!(entry.url, "http://localhost:8085/mcp");
    }

    #[tokio::test]
    async fn spawn_failure_on_missing_executable_is_reported() {
        let params = SpawnParams {
            temp_external_id: "temp_1".into(),
            work_dir: std::env::temp_dir(),
            initial_prompt: "hello".into(),
            resume_external_id: None,
            executable: "definitely-not-a-real-binary-xyz".into(),
            default_options: Vec::new(),
            permission_prompt_tool: "permission_prompt".into(),
            mcp_config_path: std::env::temp_dir().join("mcp.json"),
        };
        let result = AgentProcess::spawn(params);
        assert!(matches!(result, Err(AgentProcessError::SpawnFailed(_))));
    }
}
