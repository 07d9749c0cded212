//! Session Manager (C6, §4.6) — owns the in-memory session maps and the
//! single-writer stdin discipline per session.
//!
//! `sessions` and `thread_index` are guarded by one `RwLock` apiece, held
//! only for pointer reads/writes, never across a store write or a chat
//! HTTP call (§5 locking discipline). Rekeying on the agent's real external
//! id happens under one write-lock acquisition so a lookup mid-rename always
//! resolves against either the old or the new key.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sa_agent::process::{AgentProcess, McpConfigDocument, SpawnParams};
use sa_domain::config::{ClaudeConfig, SessionConfig};
use sa_domain::error::{Error, Result};
use sa_domain::model::Session;
use sa_store::Store;
use tokio::sync::{Mutex, RwLock};

use crate::approval::{ApprovalRendezvous, SessionCorrelation};
use crate::chat::ChatAdapter;
use crate::resume;

pub struct LiveSession {
    pub channel: String,
    pub thread_ts: String,
    pub process: AgentProcess,
    pub last_active: Mutex<DateTime<Utc>>,
    /// The id the session was first registered under, i.e. the one the MCP
    /// permission server and the approval correlation are keyed by for the
    /// session's entire lifetime — `rekey` renames this session's entry in
    /// `sessions`/`thread_index` but never touches the approval maps, so
    /// anything addressing C5 must use this id rather than the current map key.
    pub temp_external_id: String,
    _mcp_task: tokio::task::JoinHandle<()>,
    _mcp_config_file: tempfile::NamedTempFile,
}

pub struct CreateSessionOutcome {
    pub external_id: String,
    pub resumed: bool,
}

#[derive(Clone)]
pub struct SessionManager {
    store: Store,
    chat: Arc<ChatAdapter>,
    approvals: Arc<ApprovalRendezvous>,
    claude: ClaudeConfig,
    session_config: SessionConfig,
    sessions: Arc<RwLock<HashMap<String, Arc<LiveSession>>>>,
    thread_index: Arc<RwLock<HashMap<String, String>>>,
}

fn thread_key(channel: &str, thread_ts: &str) -> String {
    format!("{channel}:{thread_ts}")
}

impl SessionManager {
    pub fn new(
        store: Store,
        chat: Arc<ChatAdapter>,
        approvals: Arc<ApprovalRendezvous>,
        claude: ClaudeConfig,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            store,
            chat,
            approvals,
            claude,
            session_config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            thread_index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn chat(&self) -> &Arc<ChatAdapter> {
        &self.chat
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    pub async fn get_by_thread(&self, channel: &str, thread_ts: &str) -> Option<Arc<LiveSession>> {
        let external_id = self.external_id_by_thread(channel, thread_ts).await?;
        self.sessions.read().await.get(&external_id).cloned()
    }

    pub async fn external_id_by_thread(&self, channel: &str, thread_ts: &str) -> Option<String> {
        self.thread_index.read().await.get(&thread_key(channel, thread_ts)).cloned()
    }

    pub async fn get_by_external_id(&self, external_id: &str) -> Option<Arc<LiveSession>> {
        self.sessions.read().await.get(external_id).cloned()
    }

    /// `CreateSession(ctx, channel, thread_ts, work_dir, initial_prompt)`
    /// (§4.6 algorithm a-e). `user_id` is carried through to the approval
    /// correlation so C5 knows who to address an approval prompt's ambient
    /// context to; it is not part of the durable `Session` row.
    pub async fn create_session(
        &self,
        channel: &str,
        thread_ts: &str,
        work_dir: &str,
        initial_prompt: &str,
        user_id: &str,
    ) -> Result<CreateSessionOutcome> {
        let (resumed, prior_id) =
            resume::should_resume(&self.store, &self.session_config, channel, thread_ts, Utc::now()).await?;

        let thread = self.store.create_thread(channel, thread_ts, work_dir).await?;
        sa_domain::trace::TraceEvent::ThreadCreated {
            channel: channel.to_owned(),
            thread_ts: thread_ts.to_owned(),
            work_dir: work_dir.to_owned(),
        }
        .emit();

        let temp_id = Session::temp_external_id();
        self.store
            .create_session(thread.id, &temp_id, work_dir, initial_prompt, None)
            .await?;

        let (base_url, mcp_task) = sa_mcp::serve_session(
            temp_id.clone(),
            self.claude.permission_prompt_tool.clone(),
            self.approvals.clone() as Arc<dyn sa_mcp::PermissionCore>,
        )
        .await
        .map_err(|e| Error::AgentSpawnFailed(format!("mcp server: {e}")))?;

        self.approvals.register_session(
            temp_id.clone(),
            SessionCorrelation {
                channel: channel.to_owned(),
                thread_ts: thread_ts.to_owned(),
                user_id: user_id.to_owned(),
            },
        );

        let mcp_config_file = tempfile::NamedTempFile::new()?;
        let doc = McpConfigDocument::single_server(&self.claude.permission_prompt_tool, &base_url);
        doc.write_to(mcp_config_file.path())?;

        let params = SpawnParams {
            temp_external_id: temp_id.clone(),
            work_dir: work_dir.into(),
            initial_prompt: initial_prompt.to_owned(),
            resume_external_id: prior_id.clone(),
            executable: self.claude.executable.clone(),
            default_options: self.claude.default_options.clone(),
            permission_prompt_tool: self.claude.permission_prompt_tool.clone(),
            mcp_config_path: mcp_config_file.path().to_path_buf(),
        };

        let (process, event_rx) = AgentProcess::spawn(params)
            .map_err(|e| Error::AgentSpawnFailed(e.to_string()))?;
        process
            .send_message(initial_prompt)
            .await
            .map_err(|e| Error::AgentSpawnFailed(e.to_string()))?;

        let live = Arc::new(LiveSession {
            channel: channel.to_owned(),
            thread_ts: thread_ts.to_owned(),
            process,
            last_active: Mutex::new(Utc::now()),
            temp_external_id: temp_id.clone(),
            _mcp_task: mcp_task,
            _mcp_config_file: mcp_config_file,
        });

        self.sessions.write().await.insert(temp_id.clone(), live);
        self.thread_index
            .write()
            .await
            .insert(thread_key(channel, thread_ts), temp_id.clone());

        crate::event_router::spawn(self.clone(), temp_id.clone(), resumed, prior_id.clone(), event_rx);

        sa_domain::trace::TraceEvent::SessionCreated {
            session_id: temp_id.clone(),
            channel: channel.to_owned(),
            thread_ts: thread_ts.to_owned(),
            resumed,
            prior_external_id: prior_id,
        }
        .emit();

        Ok(CreateSessionOutcome {
            external_id: temp_id,
            resumed,
        })
    }

    /// Atomically moves a live session from its temp id to the agent's real
    /// external id. A collision with an id already present is a programmer
    /// error (§4.6 invariants), not a recoverable condition.
    pub async fn rekey(&self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(new) {
            return Err(Error::Other(format!(
                "rekey collision: external id {new} already known"
            )));
        }
        let Some(live) = sessions.remove(old) else {
            return Err(Error::SessionNotFound(old.to_owned()));
        };
        let channel = live.channel.clone();
        let thread_ts = live.thread_ts.clone();
        sessions.insert(new.to_owned(), live);
        drop(sessions);

        self.thread_index
            .write()
            .await
            .insert(thread_key(&channel, &thread_ts), new.to_owned());

        sa_domain::trace::TraceEvent::SessionRekeyed {
            old_external_id: old.to_owned(),
            new_external_id: new.to_owned(),
        }
        .emit();

        self.store.update_session_external_id(old, new).await
    }

    pub async fn touch(&self, external_id: &str) {
        if let Some(live) = self.get_by_external_id(external_id).await {
            *live.last_active.lock().await = Utc::now();
        }
    }

    pub async fn send_message(&self, external_id: &str, text: &str) -> Result<()> {
        let live = self
            .get_by_external_id(external_id)
            .await
            .ok_or_else(|| Error::SessionNotFound(external_id.to_owned()))?;
        live.process
            .send_message(text)
            .await
            .map_err(|e| Error::AgentSpawnFailed(e.to_string()))?;
        self.touch(external_id).await;
        Ok(())
    }

    /// Closes C3 and drops the session from the in-memory maps. Persistence
    /// of the terminal state is the caller's responsibility (the event
    /// router persists from a result/error frame; `cleanup_idle` persists
    /// the timeout status itself before calling this). `reason` is logged
    /// only, not persisted — it is the event router's frame/error kind or
    /// `cleanup_idle`'s "timeout".
    pub async fn end_session(&self, external_id: &str, reason: &str) {
        let live = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(external_id)
        };
        let Some(live) = live else { return };

        self.thread_index
            .write()
            .await
            .remove(&thread_key(&live.channel, &live.thread_ts));

        live.process.close().await;
        self.approvals.cancel_session(&live.temp_external_id).await;

        sa_domain::trace::TraceEvent::SessionEnded {
            session_id: external_id.to_owned(),
            status: reason.to_owned(),
            reason: reason.to_owned(),
        }
        .emit();
    }

    /// `CleanupIdle(maxIdle)` (§4.6, §5): posts a timeout notice, persists
    /// status=timeout, and ends every session that has had no frame and no
    /// user input for longer than `max_idle`.
    pub async fn cleanup_idle(&self, max_idle: std::time::Duration) {
        let now = Utc::now();
        let idle: Vec<(String, Arc<LiveSession>)> = {
            let sessions = self.sessions.read().await;
            let mut out = Vec::new();
            for (id, live) in sessions.iter() {
                let last_active = *live.last_active.lock().await;
                if now.signed_duration_since(last_active)
                    > chrono::Duration::from_std(max_idle).unwrap_or_default()
                {
                    out.push((id.clone(), live.clone()));
                }
            }
            out
        };

        for (external_id, live) in idle {
            let _ = self
                .store
                .update_session_end_time(&external_id, sa_domain::model::SessionStatus::Timeout)
                .await;
            let _ = self
                .chat
                .post_text(
                    &live.channel,
                    &live.thread_ts,
                    "Session timed out due to inactivity.",
                    self.chat.default_persona(),
                )
                .await;
            self.end_session(&external_id, "timeout").await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_key_joins_channel_and_ts() {
        assert_eq!(thread_key("C1", "T1"), "C1:T1");
    }
}
