//! Front Door (C8, §4.8) — normalizes Slack's webhook transport into
//! typed in-memory events and dispatches them to C6/C5.
//!
//! Bot-mention stripping is applied only at the start of the message (a
//! leading `<@BOTID>` plus the whitespace after it); a mention elsewhere is
//! left untouched. `app_mention` and plain `message` events are both
//! normalized into the same `MessageReceived` shape before reaching C6, so
//! `message_filter` logic never has to know which wire event produced it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sa_domain::model::ApprovalBehavior;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

const DEDUPE_TTL: Duration = Duration::from_secs(5);
/// Requests timestamped further than this from now are rejected as replays.
const MAX_SIGNATURE_AGE: Duration = Duration::from_secs(60 * 5);

/// Suppresses duplicate delivery of the same `(channel, ts)` webhook within
/// a short TTL (§4.8), independent of the C6-level active-session guard.
pub struct DedupeStore {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn check_and_insert(&self, key: &str) -> bool {
        let mut map = self.seen.lock();
        let now = Instant::now();
        if map.len() > 10_000 {
            map.retain(|_, ts| now.duration_since(*ts) < self.ttl);
        }
        if let Some(ts) = map.get(key) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }
        map.insert(key.to_owned(), now);
        false
    }
}

impl Default for DedupeStore {
    fn default() -> Self {
        Self::new(DEDUPE_TTL)
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn verify_signature(signing_secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let timestamp = headers
        .get("x-slack-request-timestamp")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let signature = headers
        .get("x-slack-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let Ok(ts) = timestamp.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() as u64 > MAX_SIGNATURE_AGE.as_secs() {
        return false;
    }

    let base = format!("v0:{timestamp}:{}", String::from_utf8_lossy(body));
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(base.as_bytes());
    let computed = format!("v0={}", hex::encode(mac.finalize().into_bytes()));

    computed.as_bytes().ct_eq(signature.as_bytes()).unwrap_u8() == 1
}

/// Strips a single leading `<@BOTID>` mention (and the whitespace after it)
/// from the start of a message, per the Open Question resolution (§4.8).
fn strip_leading_mention(text: &str, bot_user_id: &str) -> String {
    let prefix = format!("<@{bot_user_id}>");
    if let Some(rest) = text.strip_prefix(&prefix) {
        rest.trim_start().to_owned()
    } else {
        text.to_owned()
    }
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

/// `POST /slack/events` — Events API: `message`/`app_mention` callbacks,
/// plus the one-time `url_verification` handshake.
pub async fn events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.config.slack.signing_secret {
        if !verify_signature(secret, &headers, &body) {
            return api_error(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid json"),
    };

    if payload.get("type").and_then(|v| v.as_str()) == Some("url_verification") {
        let challenge = payload.get("challenge").cloned().unwrap_or_default();
        return Json(serde_json::json!({ "challenge": challenge })).into_response();
    }

    let Some(event) = payload.get("event") else {
        return StatusCode::OK.into_response();
    };
    let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");
    if event_type != "message" && event_type != "app_mention" {
        return StatusCode::OK.into_response();
    }
    // Edits, deletes, and bot-authored echoes carry a `subtype` or `bot_id`;
    // none of those are a human message to engage with.
    if event.get("subtype").is_some() || event.get("bot_id").is_some() {
        return StatusCode::OK.into_response();
    }

    let channel = event.get("channel").and_then(|v| v.as_str()).unwrap_or("");
    let ts = event.get("ts").and_then(|v| v.as_str()).unwrap_or("");
    let dedupe_key = format!("{channel}:{ts}");
    if state.dedupe.check_and_insert(&dedupe_key) {
        return StatusCode::OK.into_response();
    }

    let user = event.get("user").and_then(|v| v.as_str()).unwrap_or("").to_owned();
    let thread_ts = event
        .get("thread_ts")
        .and_then(|v| v.as_str())
        .unwrap_or(ts)
        .to_owned();
    let raw_text = event.get("text").and_then(|v| v.as_str()).unwrap_or("");

    let bot_user_id = state
        .chat
        .get_bot_user_id()
        .await
        .unwrap_or_default();
    let text = strip_leading_mention(raw_text, &bot_user_id);

    let filter = &state.config.slack.message_filter;
    if filter.enabled {
        if filter.require_mention && event_type != "app_mention" {
            return StatusCode::OK.into_response();
        }
        if !filter.include_patterns.is_empty()
            && !filter.include_patterns.iter().any(|p| text.contains(p.as_str()))
        {
            return StatusCode::OK.into_response();
        }
        if filter.exclude_patterns.iter().any(|p| text.contains(p.as_str())) {
            return StatusCode::OK.into_response();
        }
    }

    let channel = channel.to_owned();
    tokio::spawn(async move {
        crate::handle_message(&state, &channel, &thread_ts, &user, &text).await;
    });

    StatusCode::OK.into_response()
}

/// `POST /slack/commands` — slash command invocation (`slack.slash_command_name`).
pub async fn commands(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.config.slack.signing_secret {
        if !verify_signature(secret, &headers, &body) {
            return api_error(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let form: HashMap<String, String> = match serde_urlencoded::from_bytes(&body) {
        Ok(v) => v,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid form body"),
    };

    let channel = form.get("channel_id").cloned().unwrap_or_default();
    let user = form.get("user_id").cloned().unwrap_or_default();
    let text = form.get("text").cloned().unwrap_or_default();
    let response_url = form.get("response_url").cloned().unwrap_or_default();
    let _ = response_url;

    let thread_ts = chrono::Utc::now().timestamp_micros().to_string();

    tokio::spawn(async move {
        crate::handle_message(&state, &channel, &thread_ts, &user, &text).await;
    });

    Json(serde_json::json!({
        "response_type": "ephemeral",
        "text": "Starting a session…",
    }))
    .into_response()
}

/// `POST /slack/interactive` — block actions (Approve/Deny buttons) and
/// view submissions (the "deny with reason" modal).
pub async fn interactive(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = &state.config.slack.signing_secret {
        if !verify_signature(secret, &headers, &body) {
            return api_error(StatusCode::UNAUTHORIZED, "invalid signature");
        }
    }

    let form: HashMap<String, String> = match serde_urlencoded::from_bytes(&body) {
        Ok(v) => v,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid form body"),
    };
    let Some(raw_payload) = form.get("payload") else {
        return api_error(StatusCode::BAD_REQUEST, "missing payload");
    };
    let payload: serde_json::Value = match serde_json::from_str(raw_payload) {
        Ok(v) => v,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid payload json"),
    };

    let interaction_type = payload.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let deciding_user = payload
        .get("user")
        .and_then(|u| u.get("id"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_owned();

    match interaction_type {
        "block_actions" => {
            let Some(action) = payload.get("actions").and_then(|a| a.get(0)) else {
                return StatusCode::OK.into_response();
            };
            let action_id = action.get("action_id").and_then(|v| v.as_str()).unwrap_or("");
            let (kind, request_id) = match action_id.split_once(':') {
                Some(pair) => pair,
                None => return StatusCode::OK.into_response(),
            };

            match kind {
                "approve" => {
                    state
                        .approvals
                        .decide(
                            request_id,
                            ApprovalBehavior::Allow,
                            "Approved via Slack",
                            format!("Approved by <@{deciding_user}>"),
                        )
                        .await;
                }
                "deny" => {
                    state
                        .approvals
                        .decide(
                            request_id,
                            ApprovalBehavior::Deny,
                            "Denied via Slack",
                            format!("Denied by <@{deciding_user}>"),
                        )
                        .await;
                }
                "deny_with_reason" => {
                    let trigger_id = payload.get("trigger_id").and_then(|v| v.as_str()).unwrap_or("");
                    if let Err(err) = state
                        .chat
                        .open_modal(trigger_id, deny_with_reason_modal_view(request_id))
                        .await
                    {
                        tracing::warn!(%err, "failed to open deny-with-reason modal");
                    }
                }
                _ => {}
            }
            StatusCode::OK.into_response()
        }
        "view_submission" => {
            let Some(view) = payload.get("view") else {
                return StatusCode::OK.into_response();
            };
            if view.get("callback_id").and_then(|v| v.as_str()) != Some(DENY_WITH_REASON_CALLBACK_ID) {
                return StatusCode::OK.into_response();
            }
            let Some(request_id) = view.get("private_metadata").and_then(|v| v.as_str()) else {
                return StatusCode::OK.into_response();
            };
            let reason = view
                .get("state")
                .and_then(|s| s.get("values"))
                .and_then(|v| v.get("reason_block"))
                .and_then(|b| b.get("reason_input"))
                .and_then(|i| i.get("value"))
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_owned();

            let edit_text = format!("Denied by <@{deciding_user}> — reason: {reason}");
            state
                .approvals
                .decide(request_id, ApprovalBehavior::Deny, reason, edit_text)
                .await;
            StatusCode::OK.into_response()
        }
        _ => StatusCode::OK.into_response(),
    }
}

const DENY_WITH_REASON_CALLBACK_ID: &str = "deny_with_reason";

/// The modal opened by the "Deny with reason" button; `private_metadata`
/// carries the request id back to `view_submission` with no extra map to keep.
fn deny_with_reason_modal_view(request_id: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "modal",
        "callback_id": DENY_WITH_REASON_CALLBACK_ID,
        "private_metadata": request_id,
        "title": { "type": "plain_text", "text": "Deny with reason" },
        "submit": { "type": "plain_text", "text": "Deny" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "blocks": [
            {
                "type": "input",
                "block_id": "reason_block",
                "label": { "type": "plain_text", "text": "Reason" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": "reason_input",
                    "multiline": true,
                },
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_leading_bot_mention_only() {
        let stripped = strip_leading_mention("<@U123> do the thing", "U123");
        assert_eq!(stripped, "do the thing");
    }

    #[test]
    fn leaves_mid_message_mention_untouched() {
        let stripped = strip_leading_mention("hey ask <@U123> about it", "U123");
        assert_eq!(stripped, "hey ask <@U123> about it");
    }

    #[test]
    fn dedupe_store_suppresses_repeat_within_ttl() {
        let store = DedupeStore::new(Duration::from_secs(5));
        assert!(!store.check_and_insert("C1:100"));
        assert!(store.check_and_insert("C1:100"));
    }
}
