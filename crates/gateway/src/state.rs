//! Shared application state, threaded through every axum handler.

use std::sync::Arc;

use sa_domain::config::Config;

use crate::approval::ApprovalRendezvous;
use crate::chat::ChatAdapter;
use crate::front_door::DedupeStore;
use crate::session_manager::SessionManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionManager,
    pub approvals: Arc<ApprovalRendezvous>,
    pub chat: Arc<ChatAdapter>,
    pub dedupe: Arc<DedupeStore>,
}
