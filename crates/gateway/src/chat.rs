//! Chat Adapter (C7, §4.7) — thin façade over the Slack Web API.
//!
//! Every method is a single HTTP call; none of them touch the session maps
//! or the approval map, so this type can be called freely while holding no
//! locks.

use std::sync::Arc;

use reqwest::Client;
use sa_domain::config::AssistantPersonaConfig;
use sa_domain::error::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};

const API_BASE: &str = "https://slack.com/api";

/// Username + icon shown on a posted message. Per-tool personas come from
/// the static display table in `event_router`; the default comes from
/// `slack.assistant` config.
#[derive(Debug, Clone)]
pub struct Persona {
    pub username: String,
    pub icon_emoji: Option<String>,
    pub icon_url: Option<String>,
}

impl From<&AssistantPersonaConfig> for Persona {
    fn from(cfg: &AssistantPersonaConfig) -> Self {
        Self {
            username: cfg.username.clone(),
            icon_emoji: cfg.icon_emoji.clone(),
            icon_url: cfg.icon_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatAdapter {
    http: Client,
    bot_token: String,
    default_persona: Persona,
}

#[derive(Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl ChatAdapter {
    pub fn new(bot_token: impl Into<String>, default_persona: Persona) -> Self {
        Self {
            http: Client::new(),
            bot_token: bot_token.into(),
            default_persona,
        }
    }

    pub fn default_persona(&self) -> &Persona {
        &self.default_persona
    }

    async fn call(&self, method: &str, body: Value) -> Result<SlackEnvelope> {
        let resp = self
            .http
            .post(format!("{API_BASE}/{method}"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ChatPostFailed(e.to_string()))?;

        let envelope: SlackEnvelope = resp
            .json()
            .await
            .map_err(|e| Error::ChatPostFailed(e.to_string()))?;

        if !envelope.ok {
            return Err(Error::ChatPostFailed(
                envelope.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(envelope)
    }

    fn persona_fields(persona: &Persona, body: &mut serde_json::Map<String, Value>) {
        body.insert("username".into(), json!(persona.username));
        if let Some(emoji) = &persona.icon_emoji {
            body.insert("icon_emoji".into(), json!(emoji));
        }
        if let Some(url) = &persona.icon_url {
            body.insert("icon_url".into(), json!(url));
        }
    }

    pub async fn post_text(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
        persona: &Persona,
    ) -> Result<String> {
        let mut body = serde_json::Map::new();
        body.insert("channel".into(), json!(channel));
        body.insert("thread_ts".into(), json!(thread_ts));
        body.insert("text".into(), json!(text));
        Self::persona_fields(persona, &mut body);
        let envelope = self.call("chat.postMessage", Value::Object(body)).await?;
        Ok(envelope.ts.unwrap_or_default())
    }

    pub async fn post_rich_text(
        &self,
        channel: &str,
        thread_ts: &str,
        blocks: Value,
        persona: &Persona,
    ) -> Result<String> {
        let mut body = serde_json::Map::new();
        body.insert("channel".into(), json!(channel));
        body.insert("thread_ts".into(), json!(thread_ts));
        body.insert("blocks".into(), blocks);
        Self::persona_fields(persona, &mut body);
        let envelope = self.call("chat.postMessage", Value::Object(body)).await?;
        Ok(envelope.ts.unwrap_or_default())
    }

    pub async fn update_message(&self, channel: &str, ts: &str, blocks: Value) -> Result<()> {
        self.call(
            "chat.update",
            json!({ "channel": channel, "ts": ts, "blocks": blocks }),
        )
        .await?;
        Ok(())
    }

    /// Posts an Approve / Deny / "Deny with reason" prompt and returns the
    /// posted message's ts, so the caller can later `update_message` it in
    /// place once a decision lands.
    pub async fn post_approval_prompt(
        &self,
        channel: &str,
        thread_ts: &str,
        summary: &str,
        request_id: &str,
        user_id: &str,
    ) -> Result<String> {
        let blocks = json!([
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": summary },
            },
            {
                "type": "actions",
                "block_id": format!("approval:{request_id}"),
                "elements": [
                    {
                        "type": "button",
                        "style": "primary",
                        "text": { "type": "plain_text", "text": "Approve" },
                        "action_id": format!("approve:{request_id}"),
                        "value": request_id,
                    },
                    {
                        "type": "button",
                        "style": "danger",
                        "text": { "type": "plain_text", "text": "Deny" },
                        "action_id": format!("deny:{request_id}"),
                        "value": request_id,
                    },
                    {
                        "type": "button",
                        "text": { "type": "plain_text", "text": "Deny with reason" },
                        "action_id": format!("deny_with_reason:{request_id}"),
                        "value": request_id,
                    },
                ],
            },
        ]);

        let envelope = self
            .call(
                "chat.postMessage",
                json!({
                    "channel": channel,
                    "thread_ts": thread_ts,
                    "text": summary,
                    "blocks": blocks,
                }),
            )
            .await?;
        let _ = user_id;
        Ok(envelope.ts.unwrap_or_default())
    }

    /// Rebuilds an approval prompt's blocks once it has been decided: the
    /// original summary stays, the action buttons are replaced by a single
    /// line of context naming the outcome and who decided it.
    pub(crate) fn render_decided_blocks(summary: &str, decision_text: &str) -> Value {
        json!([
            {
                "type": "section",
                "text": { "type": "mrkdwn", "text": summary },
            },
            {
                "type": "context",
                "elements": [{ "type": "mrkdwn", "text": decision_text }],
            },
        ])
    }

    pub async fn post_ephemeral(&self, channel: &str, user: &str, text: &str) -> Result<()> {
        self.call(
            "chat.postEphemeral",
            json!({ "channel": channel, "user": user, "text": text }),
        )
        .await?;
        Ok(())
    }

    pub async fn open_modal(&self, trigger_id: &str, view: Value) -> Result<()> {
        self.call(
            "views.open",
            json!({ "trigger_id": trigger_id, "view": view }),
        )
        .await?;
        Ok(())
    }

    pub async fn get_bot_user_id(&self) -> Result<String> {
        let envelope = self.call("auth.test", json!({})).await?;
        envelope
            .user_id
            .ok_or_else(|| Error::ChatPostFailed("auth.test missing user_id".into()))
    }
}

pub type SharedChatAdapter = Arc<ChatAdapter>;
