//! Event Router (C4, §4.4) — one reader task per session draining C3's
//! frame stream and rendering it to chat via C7, in the order frames were
//! parsed. Independent sessions run on independent tasks and never block
//! one another.

use sa_agent::process::{AgentEvent, AgentProcessError};
use sa_domain::frame::{ContentBlock, Frame};
use sa_domain::model::{SessionMetrics, SessionStatus};
use tokio::sync::mpsc;

use crate::session_manager::SessionManager;

/// Per-tool display name and emoji, keyed by the agent's tool name. Tools
/// not in the table fall back to a generic wrench.
fn tool_display(name: &str) -> (&'static str, &'static str) {
    match name {
        "Bash" => ("🖥️", "ran a shell command"),
        "Read" => ("📖", "read a file"),
        "Write" => ("📝", "wrote a file"),
        "Edit" => ("✏️", "edited a file"),
        "Glob" => ("🔍", "searched for files"),
        "Grep" => ("🔎", "searched file contents"),
        "WebFetch" => ("🌐", "fetched a URL"),
        "TodoWrite" => ("📋", "updated its task list"),
        _ => ("🔧", "used a tool"),
    }
}

fn format_duration(ms: i64) -> String {
    let total_secs = ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

fn format_cost(cost: f64) -> String {
    format!("${cost:.6}")
}

/// Spawns the reader task for one freshly-created session. `external_id` is
/// the temp id the session was registered under; the task rekeys it to the
/// agent's real id once the init frame arrives.
pub fn spawn(
    sessions: SessionManager,
    external_id: String,
    resumed: bool,
    prior_external_id: Option<String>,
    mut event_rx: mpsc::Receiver<AgentEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut current_id = external_id;

        while let Some(event) = event_rx.recv().await {
            sessions.touch(&current_id).await;

            match event {
                AgentEvent::Frame(Frame::System(sys)) if sys.is_init() => {
                    if let Some(real_id) = sys.session_id.clone() {
                        if real_id != current_id {
                            if let Err(err) = sessions.rekey(&current_id, &real_id).await {
                                tracing::warn!(%err, "failed to rekey session external id");
                            } else {
                                current_id = real_id;
                            }
                        }
                    }
                    if let Some(model) = &sys.model {
                        if let Err(err) = sessions.store().update_session_model(&current_id, model).await {
                            tracing::warn!(%err, "failed to persist session model");
                        }
                    }

                    let Some(live) = sessions.get_by_external_id(&current_id).await else {
                        continue;
                    };
                    let text = match (resumed, &prior_external_id) {
                        (true, Some(prior)) => format!("Resuming previous session `{prior}`…"),
                        (true, None) => "Resuming session.".to_string(),
                        (false, _) => "Session started.".to_string(),
                    };
                    let _ = sessions
                        .chat()
                        .post_text(&live.channel, &live.thread_ts, &text, sessions.chat().default_persona())
                        .await;
                }
                AgentEvent::Frame(Frame::Assistant(msg)) => {
                    let Some(live) = sessions.get_by_external_id(&current_id).await else {
                        continue;
                    };
                    for block in msg.message.content {
                        match block {
                            ContentBlock::Text { text } => {
                                let _ = sessions
                                    .chat()
                                    .post_text(&live.channel, &live.thread_ts, &text, sessions.chat().default_persona())
                                    .await;
                            }
                            ContentBlock::ToolUse { name, .. } => {
                                let (emoji, label) = tool_display(&name);
                                let text = format!("{emoji} {name}: {label}");
                                let _ = sessions
                                    .chat()
                                    .post_text(&live.channel, &live.thread_ts, &text, sessions.chat().default_persona())
                                    .await;
                            }
                            ContentBlock::Thinking { .. } => {
                                sa_domain::trace::TraceEvent::FrameSkipped {
                                    session_id: current_id.clone(),
                                    reason: "thinking block".to_owned(),
                                }
                                .emit();
                            }
                            ContentBlock::Unknown => {
                                sa_domain::trace::TraceEvent::FrameSkipped {
                                    session_id: current_id.clone(),
                                    reason: "unrecognized content block".to_owned(),
                                }
                                .emit();
                            }
                        }
                    }
                }
                AgentEvent::Frame(Frame::Result(result)) => {
                    let status = if result.is_error {
                        SessionStatus::Failed
                    } else {
                        SessionStatus::Completed
                    };
                    let metrics = SessionMetrics {
                        total_cost_usd: Some(result.total_cost_usd),
                        input_tokens: Some(result.usage.input_tokens),
                        output_tokens: Some(result.usage.output_tokens),
                        duration_ms: Some(result.duration_ms),
                        num_turns: Some(result.num_turns),
                    };
                    let _ = sessions
                        .store()
                        .update_session_status(&current_id, status, metrics)
                        .await;
                    let _ = sessions.store().update_session_end_time(&current_id, status).await;

                    if let Some(live) = sessions.get_by_external_id(&current_id).await {
                        let high_cost = result.total_cost_usd > 1.0;
                        let text = if result.is_error {
                            format!(
                                "❌ Session ended with an error after {} ({} turns, {})",
                                format_duration(result.duration_ms),
                                result.num_turns,
                                format_cost(result.total_cost_usd),
                            )
                        } else {
                            let flag = if high_cost { " ⚠️ high cost" } else { "" };
                            format!(
                                "✅ Session completed in {} ({} turns, {}){flag}",
                                format_duration(result.duration_ms),
                                result.num_turns,
                                format_cost(result.total_cost_usd),
                            )
                        };
                        let _ = sessions
                            .chat()
                            .post_text(&live.channel, &live.thread_ts, &text, sessions.chat().default_persona())
                            .await;
                    }

                    sessions.end_session(&current_id, if result.is_error { "failed" } else { "completed" }).await;
                    break;
                }
                AgentEvent::Frame(Frame::User(_)) | AgentEvent::Frame(Frame::Unknown) => {}
                AgentEvent::Error(err) => {
                    let _ = sessions
                        .store()
                        .update_session_end_time(&current_id, SessionStatus::Failed)
                        .await;

                    if let Some(live) = sessions.get_by_external_id(&current_id).await {
                        let text = match &err {
                            AgentProcessError::SpawnFailed(msg) => {
                                format!("❌ Failed to start agent: {msg}")
                            }
                            AgentProcessError::ExitedUnexpectedly { status } => {
                                format!("❌ Agent exited unexpectedly (status={status:?})")
                            }
                            AgentProcessError::StreamCorrupt(msg) => {
                                format!("❌ Agent output stream corrupted: {msg}")
                            }
                        };
                        let _ = sessions
                            .chat()
                            .post_text(&live.channel, &live.thread_ts, &text, sessions.chat().default_persona())
                            .await;
                    }

                    sessions.end_session(&current_id, "error").await;
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_under_a_minute_has_no_minute_part() {
        assert_eq!(format_duration(5_000), "5s");
    }

    #[test]
    fn format_duration_over_a_minute_includes_minutes() {
        assert_eq!(format_duration(65_000), "1m5s");
    }

    #[test]
    fn format_cost_uses_six_decimal_places() {
        assert_eq!(format_cost(0.05), "$0.050000");
    }

    #[test]
    fn unknown_tool_falls_back_to_generic_display() {
        assert_eq!(tool_display("SomeNewTool").0, "🔧");
    }
}
