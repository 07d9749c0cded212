use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Externally visible URL, used to tell the agent child where the
    /// in-process MCP endpoint lives (e.g. `http://localhost:8085`).
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_log_format")]
    pub log_format: LogFormat,
    /// Overrides the default `tracing_subscriber::EnvFilter` directive.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            base_url: d_base_url(),
            log_format: d_log_format(),
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_port() -> u16 {
    8085
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_base_url() -> String {
    "http://localhost:8085".into()
}
fn d_log_format() -> LogFormat {
    LogFormat::Json
}
