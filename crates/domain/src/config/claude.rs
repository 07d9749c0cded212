use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent CLI ("claude") invocation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeConfig {
    #[serde(default = "d_executable")]
    pub executable: String,
    /// Extra CLI flags appended after the ones C3 always sets.
    #[serde(default)]
    pub default_options: Vec<String>,
    /// The tool name the agent is told to call for permission prompts;
    /// must match the single tool the MCP endpoint exposes (§4.5).
    #[serde(default = "d_permission_prompt_tool")]
    pub permission_prompt_tool: String,
}

impl Default for ClaudeConfig {
    fn default() -> Self {
        Self {
            executable: d_executable(),
            default_options: Vec::new(),
            permission_prompt_tool: d_permission_prompt_tool(),
        }
    }
}

fn d_executable() -> String {
    "claude".into()
}
fn d_permission_prompt_tool() -> String {
    "permission_prompt".into()
}
