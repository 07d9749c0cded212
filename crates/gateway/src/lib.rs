//! The gateway binary's modules, exposed as a library so `main.rs` can
//! depend on them the way any other internal crate does.

pub mod approval;
pub mod bootstrap;
pub mod chat;
pub mod cli;
pub mod event_router;
pub mod front_door;
pub mod resume;
pub mod session_manager;
pub mod state;

use state::AppState;

/// Bridges a normalized `MessageReceived` event (from C8) into C6: resumes
/// or creates a session for the thread, then forwards the text as either
/// the initial prompt or a follow-up message.
///
/// Lives here rather than in `front_door` because it is the one piece of
/// glue C8 and C6 share and neither module should depend on the other.
pub async fn handle_message(state: &AppState, channel: &str, thread_ts: &str, user: &str, text: &str) {
    if text.trim().is_empty() {
        return;
    }

    if let Some(external_id) = state.sessions.external_id_by_thread(channel, thread_ts).await {
        if let Err(err) = state.sessions.send_message(&external_id, text).await {
            tracing::warn!(%err, "failed to forward message to existing session");
        }
        return;
    }

    let work_dir = state
        .config
        .working_dirs
        .first()
        .map(|wd| wd.path.clone())
        .unwrap_or_else(|| ".".to_owned());

    match state
        .sessions
        .create_session(channel, thread_ts, &work_dir, text, user)
        .await
    {
        Ok(_) => {}
        Err(sa_domain::error::Error::ActiveSessionCollision { .. }) => {
            let _ = state
                .chat
                .post_text(
                    channel,
                    thread_ts,
                    "A session is already running in this thread.",
                    state.chat.default_persona(),
                )
                .await;
        }
        Err(err) => {
            tracing::error!(%err, "failed to create session");
            let _ = state
                .chat
                .post_text(
                    channel,
                    thread_ts,
                    "Failed to start a session for this thread.",
                    state.chat.default_persona(),
                )
                .await;
        }
    }
}
