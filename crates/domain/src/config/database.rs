use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Database (C1 — embedded SQL store)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_path")]
    pub path: PathBuf,
    /// Present for parity with the external-interfaces contract; this
    /// implementation embeds its migrations in the binary (see `sa-store`)
    /// rather than reading loose `.sql` files, so this is informational.
    #[serde(default)]
    pub migrations_path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: d_path(),
            migrations_path: None,
        }
    }
}

fn d_path() -> PathBuf {
    PathBuf::from("./data/cc-slack.db")
}
