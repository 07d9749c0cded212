mod claude;
mod database;
mod server;
mod session;
mod slack;
mod working_dirs;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use claude::ClaudeConfig;
pub use database::DatabaseConfig;
pub use server::{LogFormat, ServerConfig};
pub use session::SessionConfig;
pub use slack::{AssistantPersonaConfig, FileUploadConfig, MessageFilterConfig, SlackConfig};
pub use working_dirs::{parse_cli_override, WorkingDir};

/// Top-level configuration, loaded from a TOML file and overlaid with
/// environment variables and CLI flags by the gateway's `cli` module.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub working_dirs: Vec<WorkingDir>,
}

impl Config {
    /// Load from a TOML file at `path`, falling back to defaults for any
    /// field the file omits. Missing file is not an error; an unparsable
    /// one is.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::error::Error::ConfigInvalid(format!("{}: {e}", path.display())))
    }

    /// Validate cross-field and environment-dependent invariants that
    /// serde defaults alone can't express. Does not fail on warnings.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.slack.bot_token.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "slack.bot_token is unset — chat posting will fail".into(),
            });
        }
        if self.slack.signing_secret.is_none() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "slack.signing_secret is unset — inbound webhooks cannot be verified"
                    .into(),
            });
        }
        if self.claude.permission_prompt_tool.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "claude.permission_prompt_tool must not be empty".into(),
            });
        }
        if self.working_dirs.is_empty() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "working_dirs is empty — slash command directory picker will have nothing to offer".into(),
            });
        }
        let mut seen_names = std::collections::HashSet::new();
        for wd in &self.working_dirs {
            if !seen_names.insert(wd.name.as_str()) {
                issues.push(ConfigIssue {
                    severity: ConfigSeverity::Error,
                    message: format!("working_dirs has duplicate name {:?}", wd.name),
                });
            }
        }
        if self.session.resume_window_secs > 0
            && self.session.resume_window_secs < self.session.cleanup_interval_secs
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message:
                    "session.resume_window is shorter than session.cleanup_interval — resumable \
                     sessions may be reaped before the resume window closes"
                        .into(),
            });
        }

        issues
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_flags_missing_signing_secret_as_error() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("signing_secret")));
    }

    #[test]
    fn duplicate_working_dir_names_are_an_error() {
        let mut config = Config::default();
        config.working_dirs = vec![
            WorkingDir { name: "a".into(), path: "/x".into(), description: None },
            WorkingDir { name: "a".into(), path: "/y".into(), description: None },
        ];
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("duplicate")));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/cc-slack.toml")).unwrap();
        assert_eq!(config.server.port, 8085);
    }
}
