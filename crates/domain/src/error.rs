use std::path::PathBuf;

/// The crate-wide error type. Every fallible operation below the HTTP layer
/// returns one of these; handlers map variants to status codes at the edge.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    #[error("config file not found: {0}")]
    ConfigFileNotFound(PathBuf),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("duplicate event: {0}")]
    DuplicateEvent(String),

    #[error("active session collision for thread {channel}:{thread_ts}")]
    ActiveSessionCollision { channel: String, thread_ts: String },

    #[error("agent spawn failed: {0}")]
    AgentSpawnFailed(String),

    #[error("agent stream corrupt: {0}")]
    AgentStreamCorrupt(String),

    #[error("agent exited unexpectedly: {0}")]
    AgentExitedUnexpectedly(String),

    #[error("approval timed out")]
    ApprovalTimeout,

    #[error("approval session gone")]
    ApprovalSessionGone,

    #[error("chat post failed: {0}")]
    ChatPostFailed(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
