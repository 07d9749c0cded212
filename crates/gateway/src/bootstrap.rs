//! `AppState` construction and background-task spawning extracted from
//! `main.rs`, the same split the teacher uses between `build_app_state` and
//! `spawn_background_tasks`.

use std::sync::Arc;

use anyhow::Context;
use sa_domain::config::Config;
use sa_store::Store;

use crate::approval::ApprovalRendezvous;
use crate::chat::{ChatAdapter, Persona};
use crate::front_door::DedupeStore;
use crate::session_manager::SessionManager;
use crate::state::AppState;

pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let store = Store::open(&config.database.path)
        .with_context(|| format!("opening database at {}", config.database.path.display()))?;

    let bot_token = config.slack.bot_token.clone().unwrap_or_default();
    let chat = Arc::new(ChatAdapter::new(bot_token, Persona::from(&config.slack.assistant)));

    let approvals = Arc::new(ApprovalRendezvous::new(
        chat.clone(),
        std::time::Duration::from_secs(15 * 60),
    ));

    let sessions = SessionManager::new(
        store,
        chat.clone(),
        approvals.clone(),
        config.claude.clone(),
        config.session.clone(),
    );

    let dedupe = Arc::new(DedupeStore::default());

    Ok(AppState {
        config,
        sessions,
        approvals,
        chat,
        dedupe,
    })
}

/// Spawns the one background task the core needs: the idle-session reaper
/// (§5 "Cancellation & timeouts"). Approval sweeping piggybacks on the same
/// tick since both are driven by the same cleanup interval.
pub fn spawn_background_tasks(state: &AppState) {
    let sessions = state.sessions.clone();
    let approvals = state.approvals.clone();
    let cleanup_interval = state.sessions.session_config().cleanup_interval();
    let timeout = state.sessions.session_config().timeout();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_interval);
        loop {
            ticker.tick().await;
            sessions.cleanup_idle(timeout).await;
            approvals.sweep_expired().await;
        }
    });
}
