use serde::Serialize;

/// Structured trace events emitted across the gateway's components.
///
/// These are logged as a JSON blob on a `tracing::info!` line (`sa_event`
/// field) rather than forced into ad-hoc `tracing` field lists, so a
/// `grep sa_event` reconstructs the lifecycle of one session end to end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    ThreadCreated {
        channel: String,
        thread_ts: String,
        work_dir: String,
    },
    SessionCreated {
        session_id: String,
        channel: String,
        thread_ts: String,
        resumed: bool,
        prior_external_id: Option<String>,
    },
    SessionRekeyed {
        old_external_id: String,
        new_external_id: String,
    },
    SessionEnded {
        session_id: String,
        status: String,
        reason: String,
    },
    ApprovalRequested {
        request_id: String,
        session_id: String,
        tool_name: String,
    },
    ApprovalResolved {
        request_id: String,
        outcome: String,
    },
    FrameSkipped {
        session_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
