//! The agent's JSON-Lines wire contract (§4.3, §9 "dynamic payloads").
//!
//! One stdout line is one JSON object, classified by `type` into a
//! [`Frame`]. Unknown `type` values deserialize into [`Frame::Unknown`]
//! rather than failing, matching "unknown types are logged and skipped,
//! never fatal".

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    System(SystemFrame),
    Assistant(AssistantFrame),
    User(UserFrame),
    Result(ResultFrame),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemFrame {
    pub subtype: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl SystemFrame {
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantFrame {
    pub message: AssistantMessage,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Thinking { thinking: String },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

/// Tool results echoed back by the agent; usually ignored at the chat surface.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserFrame {
    #[serde(default)]
    pub message: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultFrame {
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub num_turns: i64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
}

/// Build the single JSON-Lines line written to the agent's stdin for one
/// `SendMessage(text)` call (§4.3 "Input framing"). The trailing `\n` is
/// the caller's responsibility.
pub fn user_input_line(text: &str) -> String {
    serde_json::json!({
        "type": "user",
        "message": {
            "role": "user",
            "content": [{ "type": "text", "text": text }],
        },
    })
    .to_string()
}

/// Parse one stdout line into a [`Frame`].
///
/// Returns `Err` only for syntactically invalid JSON; a syntactically valid
/// object with an unrecognized `type` parses to `Frame::Unknown` instead of
/// erroring (see module docs).
pub fn parse_line(line: &str) -> serde_json::Result<Frame> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_init_system_frame() {
        let line = r#"{"type":"system","subtype":"init","session_id":"abc","model":"m1"}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::System(s) => {
                assert!(s.is_init());
                assert_eq!(s.session_id.as_deref(), Some("abc"));
                assert_eq!(s.model.as_deref(), Some("m1"));
            }
            _ => panic!("expected System frame"),
        }
    }

    #[test]
    fn parses_assistant_text_block() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"hi"}]}}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::Assistant(a) => {
                assert_eq!(a.message.content.len(), 1);
                match &a.message.content[0] {
                    ContentBlock::Text { text } => assert_eq!(text, "hi"),
                    _ => panic!("expected Text block"),
                }
            }
            _ => panic!("expected Assistant frame"),
        }
    }

    #[test]
    fn parses_tool_use_block() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls"}}
        ]}}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::Assistant(a) => match &a.message.content[0] {
                ContentBlock::ToolUse { id, name, input } => {
                    assert_eq!(id, "t1");
                    assert_eq!(name, "Bash");
                    assert_eq!(input["command"], "ls");
                }
                _ => panic!("expected ToolUse block"),
            },
            _ => panic!("expected Assistant frame"),
        }
    }

    #[test]
    fn thinking_block_parses_and_is_ignorable() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"thinking","thinking":"hmm"}]}}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::Assistant(a) => assert!(matches!(a.message.content[0], ContentBlock::Thinking { .. })),
            _ => panic!("expected Assistant frame"),
        }
    }

    #[test]
    fn parses_result_frame() {
        let line = r#"{"type":"result","is_error":false,"duration_ms":65000,"num_turns":7,
            "total_cost_usd":0.05,"usage":{"input_tokens":1000,"output_tokens":500}}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::Result(r) => {
                assert!(!r.is_error);
                assert_eq!(r.duration_ms, 65000);
                assert_eq!(r.num_turns, 7);
                assert!((r.total_cost_usd - 0.05).abs() < f64::EPSILON);
                assert_eq!(r.usage.input_tokens, 1000);
                assert_eq!(r.usage.output_tokens, 500);
            }
            _ => panic!("expected Result frame"),
        }
    }

    #[test]
    fn unknown_type_parses_to_unknown_variant() {
        let line = r#"{"type":"some_future_frame","foo":"bar"}"#;
        let frame = parse_line(line).unwrap();
        assert!(matches!(frame, Frame::Unknown));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let line = "not json at all";
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn user_input_line_round_trips_through_parse_line() {
        let line = user_input_line("hello there");
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["message"]["content"][0]["text"], "hello there");
    }

    #[test]
    fn unknown_content_block_type_is_unknown_variant() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"image_ref","url":"x"}]}}"#;
        let frame = parse_line(line).unwrap();
        match frame {
            Frame::Assistant(a) => assert!(matches!(a.message.content[0], ContentBlock::Unknown)),
            _ => panic!("expected Assistant frame"),
        }
    }
}
