//! The durable data model (§3): `Thread`, `Session`, and the in-memory-only
//! `PendingApproval`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable chat-side conversation container, unique on `(channel_id, thread_ts)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    pub channel_id: String,
    pub thread_ts: String,
    pub work_dir: String,
}

/// Status a [`Session`] passes through exactly once into a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
    Timeout,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Timeout => "timeout",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            "timeout" => Some(SessionStatus::Timeout),
            _ => None,
        }
    }
}

/// Terminal cost/turn metrics, populated from the agent's `result` frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_cost_usd: Option<f64>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub duration_ms: Option<i64>,
    pub num_turns: Option<i64>,
}

/// One run of the agent CLI, bound to a [`Thread`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub thread_id: i64,
    /// Starts as `temp_<nanos>`, rewritten once the agent's `init` frame arrives.
    pub external_id: String,
    pub work_dir: String,
    pub model: Option<String>,
    pub initial_prompt: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub metrics: SessionMetrics,
}

impl Session {
    pub const TEMP_PREFIX: &'static str = "temp_";

    /// A fresh placeholder external id, unique within this process's lifetime.
    pub fn temp_external_id() -> String {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        format!("{}{nanos}", Self::TEMP_PREFIX)
    }

    pub fn is_temp_external_id(id: &str) -> bool {
        id.starts_with(Self::TEMP_PREFIX)
    }
}

/// A fresh, unique request id for one [`PendingApproval`].
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The decision the user reached for a pending approval, relayed back to the
/// agent over the MCP channel in C5 step 6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalBehavior {
    Allow,
    Deny,
}

/// The JSON body the MCP permission-prompt tool returns to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecisionPayload {
    pub behavior: ApprovalBehavior,
    pub message: String,
    /// Required (and empty, meaning "unchanged") when `behavior == Allow`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<serde_json::Value>,
}

impl ApprovalDecisionPayload {
    pub fn allow(message: impl Into<String>) -> Self {
        Self {
            behavior: ApprovalBehavior::Allow,
            message: message.into(),
            updated_input: Some(serde_json::json!({})),
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            behavior: ApprovalBehavior::Deny,
            message: message.into(),
            updated_input: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_external_id_has_prefix() {
        let id = Session::temp_external_id();
        assert!(Session::is_temp_external_id(&id));
        assert!(id.starts_with("temp_"));
    }

    #[test]
    fn real_external_id_is_not_temp() {
        assert!(!Session::is_temp_external_id("abc123"));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            SessionStatus::Active,
            SessionStatus::Completed,
            SessionStatus::Failed,
            SessionStatus::Timeout,
        ] {
            assert_eq!(SessionStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn only_active_is_nonterminal() {
        assert!(!SessionStatus::Active.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Timeout.is_terminal());
    }

    #[test]
    fn allow_payload_carries_empty_updated_input() {
        let payload = ApprovalDecisionPayload::allow("Approved via Slack");
        assert_eq!(payload.updated_input, Some(serde_json::json!({})));
    }

    #[test]
    fn deny_payload_has_no_updated_input() {
        let payload = ApprovalDecisionPayload::deny("unsafe");
        assert!(payload.updated_input.is_none());
    }
}
