use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle (C2 resume policy + C6 idle reaper)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle reap threshold. Default 30 minutes.
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    /// Reaper tick interval. Default 5 minutes.
    #[serde(default = "d_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Window after session end during which a new message in the same
    /// thread resumes the prior external session id. `0` disables resume.
    #[serde(default = "d_resume_window_secs")]
    pub resume_window_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: d_timeout_secs(),
            cleanup_interval_secs: d_cleanup_interval_secs(),
            resume_window_secs: d_resume_window_secs(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_secs)
    }
    pub fn resume_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.resume_window_secs as i64)
    }
}

fn d_timeout_secs() -> u64 {
    30 * 60
}
fn d_cleanup_interval_secs() -> u64 {
    5 * 60
}
fn d_resume_window_secs() -> u64 {
    60 * 60
}
