use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slack (chat platform) config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`). Read from config or the `SLACK_BOT_TOKEN` env var.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// HMAC signing secret for `/slack/events` and `/slack/interactive`.
    #[serde(default)]
    pub signing_secret: Option<String>,

    /// App-level token (`xapp-...`); when set, the front door runs in
    /// persistent-socket mode instead of webhook mode.
    #[serde(default)]
    pub app_token: Option<String>,

    #[serde(default = "d_slash_command_name")]
    pub slash_command_name: String,

    #[serde(default)]
    pub message_filter: MessageFilterConfig,

    #[serde(default)]
    pub assistant: AssistantPersonaConfig,

    #[serde(default)]
    pub file_upload: FileUploadConfig,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            signing_secret: None,
            app_token: None,
            slash_command_name: d_slash_command_name(),
            message_filter: MessageFilterConfig::default(),
            assistant: AssistantPersonaConfig::default(),
            file_upload: FileUploadConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageFilterConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default)]
    pub require_mention: bool,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for MessageFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_mention: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantPersonaConfig {
    #[serde(default = "d_username")]
    pub username: String,
    #[serde(default = "d_icon_emoji")]
    pub icon_emoji: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl Default for AssistantPersonaConfig {
    fn default() -> Self {
        Self {
            username: d_username(),
            icon_emoji: d_icon_emoji(),
            icon_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileUploadConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_images_dir")]
    pub images_dir: String,
}

impl Default for FileUploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            images_dir: d_images_dir(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_slash_command_name() -> String {
    "/cc".into()
}
fn d_true() -> bool {
    true
}
fn d_username() -> String {
    "Claude Code".into()
}
fn d_icon_emoji() -> Option<String> {
    Some(":robot_face:".into())
}
fn d_images_dir() -> String {
    "./data/images".into()
}
