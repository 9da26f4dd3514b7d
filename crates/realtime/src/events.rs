use serde::{Deserialize, Serialize};

/// Events we send to the speech service.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
}

/// The slice of a service event the orchestrator cares about: the event
/// type, and for function-call events the call name and raw arguments.
/// Everything else the service sends stays in `extra` untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// What the session's read loop broadcasts to subscribers.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Event(SessionEvent),
    Close { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_append_uses_the_dotted_type_tag() {
        let json = serde_json::to_value(ClientEvent::InputAudioBufferAppend {
            audio: "UklGRg==".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "input_audio_buffer.append");
        assert_eq!(json["audio"], "UklGRg==");
    }

    #[test]
    fn function_call_events_carry_name_and_arguments() {
        let event: SessionEvent = serde_json::from_str(
            r#"{"type":"response.done","name":"move","arguments":"{\"heading\":90}","event_id":"ev_1"}"#,
        )
        .unwrap();
        assert_eq!(event.kind, "response.done");
        assert_eq!(event.name.as_deref(), Some("move"));
        assert!(event.arguments.is_some());
        assert!(event.extra.contains_key("event_id"));
    }

    #[test]
    fn plain_service_events_deserialize_without_a_name() {
        let event: SessionEvent = serde_json::from_str(
            r#"{"type":"conversation.item.input_audio_transcription.delta","delta":"roll"}"#,
        )
        .unwrap();
        assert!(event.name.is_none());
        assert!(event.arguments.is_none());
    }
}
