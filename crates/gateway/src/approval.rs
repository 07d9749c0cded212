//! Approval Rendezvous (C5 core, §4.5) — the synchronous half. The MCP
//! wire format lives in `sa_mcp`; this module only ever sees
//! `{tool_name, input}` in and an [`ApprovalDecisionPayload`] out.
//!
//! `correlations` is registered once per session, keyed by that session's
//! external id at the moment the in-process MCP server was constructed.
//! That id never changes for the life of the MCP server instance (each one
//! is dedicated to a single session, §4.5/§9), so unlike the session maps
//! in `session_manager`, this map is never rekeyed.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sa_domain::model::{ApprovalBehavior, ApprovalDecisionPayload};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::chat::ChatAdapter;

/// Where an approval prompt was posted and who it concerns — enough for
/// `request_permission` to render the prompt and for Front Door interactions
/// to be routed back to the right pending request.
#[derive(Debug, Clone)]
pub struct SessionCorrelation {
    pub channel: String,
    pub thread_ts: String,
    pub user_id: String,
}

struct PendingApproval {
    session_external_id: String,
    /// Channel and ts of the posted approval prompt, so a decision (or a
    /// cancellation/timeout) can edit it in place instead of leaving stale
    /// buttons behind.
    channel: String,
    message_ts: String,
    summary: String,
    respond: oneshot::Sender<ApprovalDecisionPayload>,
    created_at: DateTime<Utc>,
}

pub struct ApprovalRendezvous {
    chat: std::sync::Arc<ChatAdapter>,
    pending: RwLock<HashMap<String, PendingApproval>>,
    correlations: RwLock<HashMap<String, SessionCorrelation>>,
    timeout: Duration,
}

impl ApprovalRendezvous {
    pub fn new(chat: std::sync::Arc<ChatAdapter>, timeout: Duration) -> Self {
        Self {
            chat,
            pending: RwLock::new(HashMap::new()),
            correlations: RwLock::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Called once, right after the session's dedicated MCP server is
    /// spawned, before any permission request can arrive for it.
    pub fn register_session(&self, session_external_id: String, correlation: SessionCorrelation) {
        self.correlations
            .write()
            .insert(session_external_id, correlation);
    }

    /// Denies (and removes) any approval still pending for a session whose
    /// owning session just ended, and forgets its correlation entry. Edits
    /// each posted prompt so the buttons don't dangle after the session is gone.
    pub async fn cancel_session(&self, session_external_id: &str) {
        self.correlations.write().remove(session_external_id);

        let stale: Vec<PendingApproval> = {
            let mut pending = self.pending.write();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| p.session_external_id == session_external_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        for pending in stale {
            let _ = pending
                .respond
                .send(ApprovalDecisionPayload::deny("session ended"));
            self.edit_resolved(&pending, "Session ended before this request was decided.")
                .await;
        }
    }

    /// Resolves a pending approval by a human decision made via Front Door.
    /// `agent_message` is what the agent subprocess receives as the decision
    /// payload's message; `edit_text` replaces the prompt's action buttons in
    /// chat once posted. Returns `true` if a matching pending request was found.
    pub async fn decide(
        &self,
        request_id: &str,
        behavior: ApprovalBehavior,
        agent_message: impl Into<String>,
        edit_text: impl Into<String>,
    ) -> bool {
        let Some(pending) = self.pending.write().remove(request_id) else {
            return false;
        };
        let payload = match behavior {
            ApprovalBehavior::Allow => ApprovalDecisionPayload::allow(agent_message.into()),
            ApprovalBehavior::Deny => ApprovalDecisionPayload::deny(agent_message.into()),
        };
        let _ = pending.respond.send(payload);
        self.edit_resolved(&pending, &edit_text.into()).await;
        true
    }

    /// Drops pending approvals older than `timeout()`, denying each with a
    /// synthetic timeout decision. Call on a periodic tick.
    pub async fn sweep_expired(&self) {
        let now = Utc::now();
        let timeout = self.timeout;
        let expired: Vec<PendingApproval> = {
            let mut pending = self.pending.write();
            let ids: Vec<String> = pending
                .iter()
                .filter(|(_, p)| now - p.created_at > chrono::Duration::from_std(timeout).unwrap_or_default())
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| pending.remove(id)).collect()
        };
        for pending in expired {
            let _ = pending
                .respond
                .send(ApprovalDecisionPayload::deny("approval timed out"));
            self.edit_resolved(&pending, "Approval request timed out.").await;
        }
    }

    async fn edit_resolved(&self, pending: &PendingApproval, edit_text: &str) {
        let blocks = ChatAdapter::render_decided_blocks(&pending.summary, edit_text);
        if let Err(err) = self.chat.update_message(&pending.channel, &pending.message_ts, blocks).await {
            tracing::warn!(%err, "failed to edit approval prompt after decision");
        }
    }
}

#[async_trait::async_trait]
impl sa_mcp::PermissionCore for ApprovalRendezvous {
    async fn request_permission(
        &self,
        session_external_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> ApprovalDecisionPayload {
        let Some(correlation) = self.correlations.read().get(session_external_id).cloned() else {
            return ApprovalDecisionPayload::deny("session gone");
        };

        let request_id = Uuid::new_v4().to_string();
        sa_domain::trace::TraceEvent::ApprovalRequested {
            request_id: request_id.clone(),
            session_id: session_external_id.to_owned(),
            tool_name: tool_name.to_owned(),
        }
        .emit();

        let summary = format!(
            "`{tool_name}` wants to run with input:\n```\n{}\n```",
            serde_json::to_string_pretty(&input).unwrap_or_default()
        );
        let message_ts = match self
            .chat
            .post_approval_prompt(
                &correlation.channel,
                &correlation.thread_ts,
                &summary,
                &request_id,
                &correlation.user_id,
            )
            .await
        {
            Ok(ts) => ts,
            Err(_) => return ApprovalDecisionPayload::deny("failed to post approval prompt"),
        };

        let (tx, rx) = oneshot::channel();
        self.pending.write().insert(
            request_id.clone(),
            PendingApproval {
                session_external_id: session_external_id.to_owned(),
                channel: correlation.channel.clone(),
                message_ts,
                summary,
                respond: tx,
                created_at: Utc::now(),
            },
        );

        let outcome = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(_)) => ApprovalDecisionPayload::deny("approval cancelled"),
            Err(_) => {
                if let Some(pending) = self.pending.write().remove(&request_id) {
                    self.edit_resolved(&pending, "Approval request timed out.").await;
                }
                ApprovalDecisionPayload::deny("approval timed out")
            }
        };
        sa_domain::trace::TraceEvent::ApprovalResolved {
            request_id,
            outcome: match outcome.behavior {
                ApprovalBehavior::Allow => "allowed".to_owned(),
                ApprovalBehavior::Deny => "denied".to_owned(),
            },
        }
        .emit();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendezvous() -> ApprovalRendezvous {
        let chat = std::sync::Arc::new(ChatAdapter::new(
            "xoxb-test",
            crate::chat::Persona {
                username: "bot".into(),
                icon_emoji: None,
                icon_url: None,
            },
        ));
        ApprovalRendezvous::new(chat, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn decide_on_unknown_request_id_is_a_no_op() {
        let r = rendezvous();
        assert!(!r.decide("missing", ApprovalBehavior::Allow, "ok", "ok").await);
    }

    #[tokio::test]
    async fn cancel_session_removes_correlation() {
        let r = rendezvous();
        r.register_session(
            "temp_1".into(),
            SessionCorrelation {
                channel: "C1".into(),
                thread_ts: "T1".into(),
                user_id: "U1".into(),
            },
        );
        assert!(r.correlations.read().contains_key("temp_1"));
        r.cancel_session("temp_1").await;
        assert!(!r.correlations.read().contains_key("temp_1"));
    }
}
