use serde::Deserialize;

use crate::parser::RawFrame;

/// A decoded agent stream event, recognized types only. Any event
/// name not listed here is ignored by [`decode`].
#[derive(Debug, Clone)]
pub enum AgentStreamEvent {
    Delta { text: String },
    Done { final_message: Option<String>, usage: Option<serde_json::Value> },
    Error { code: String, message: String },
    State,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    text: String,
}

#[derive(Debug, Deserialize)]
struct DonePayload {
    #[serde(default)]
    final_message: Option<String>,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Match a raw `event:`/`data:` frame against the recognized agent event
/// types. Returns `None` for unrecognized event names or undecodable
/// payloads — both are silently dropped per the streaming loop contract.
pub fn decode(frame: &RawFrame) -> Option<AgentStreamEvent> {
    match frame.event.as_deref()? {
        "delta" => {
            let payload: DeltaPayload = serde_json::from_str(&frame.data).ok()?;
            Some(AgentStreamEvent::Delta { text: payload.text })
        }
        "done" => {
            let payload: DonePayload = serde_json::from_str(&frame.data).unwrap_or(DonePayload {
                final_message: None,
                usage: None,
            });
            Some(AgentStreamEvent::Done {
                final_message: payload.final_message,
                usage: payload.usage,
            })
        }
        "error" => {
            let payload: ErrorPayload = serde_json::from_str(&frame.data).unwrap_or(ErrorPayload {
                code: None,
                message: None,
            });
            Some(AgentStreamEvent::Error {
                code: payload.code.unwrap_or_else(|| "upstream_error".to_string()),
                message: payload.message.unwrap_or_else(|| "agent reported an error".to_string()),
            })
        }
        "state" => Some(AgentStreamEvent::State),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_delta() {
        let frame = RawFrame {
            event: Some("delta".to_string()),
            data: r#"{"text":"hi"}"#.to_string(),
        };
        match decode(&frame).unwrap() {
            AgentStreamEvent::Delta { text } => assert_eq!(text, "hi"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ignores_unrecognized_event_names() {
        let frame = RawFrame {
            event: Some("heartbeat".to_string()),
            data: "{}".to_string(),
        };
        assert!(decode(&frame).is_none());
    }

    #[test]
    fn done_without_final_message_is_fine() {
        let frame = RawFrame {
            event: Some("done".to_string()),
            data: "{}".to_string(),
        };
        match decode(&frame).unwrap() {
            AgentStreamEvent::Done { final_message, .. } => assert!(final_message.is_none()),
            _ => panic!("wrong variant"),
        }
    }
}
