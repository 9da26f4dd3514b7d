use crate::command::Command;
use crate::error::VoiceError;
use rand::Rng;
use serde_json::Value;

/// Structured event delivered by the realtime speech service (or forwarded
/// by a browser-held session): `{type, name?, arguments?}`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct VoiceEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// The closed vocabulary of recognized voice intents.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Move { heading: u16, speed: u16, duration: f32 },
    Spin { degrees: u16, duration: f32 },
    Dance,
    StartRandomMovement,
    Stop,
}

/// Maps one structured event to an intent.
///
/// `Ok(None)` means the event carries no intent (transcription chatter and
/// other service noise) and is simply ignored. Unrecognized intent names and
/// transport-level error events come back as errors for the caller to log or
/// escalate; they must never crash the session.
pub fn translate(event: &VoiceEvent) -> Result<Option<Intent>, VoiceError> {
    if event.kind == "error" {
        let detail = event
            .arguments
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        return Err(VoiceError::Transport(detail));
    }

    let Some(name) = event.name.as_deref() else {
        return Ok(None);
    };

    let args = parse_arguments(event.arguments.as_ref());
    match name {
        "move" => Ok(Some(Intent::Move {
            heading: arg_u16(&args, "heading", 0),
            speed: arg_u16(&args, "speed", 60),
            duration: arg_f32(&args, "duration", 1.0),
        })),
        "spin" => Ok(Some(Intent::Spin {
            degrees: arg_u16(&args, "degrees", 360),
            duration: arg_f32(&args, "duration", 1.0),
        })),
        "dance" => Ok(Some(Intent::Dance)),
        // The speech service announces this one under its tool name.
        "start_sphero_random_movement" | "start_random_movement" => {
            Ok(Some(Intent::StartRandomMovement))
        }
        "stop" => Ok(Some(Intent::Stop)),
        other => Err(VoiceError::UnrecognizedIntent(other.to_string())),
    }
}

/// Arguments arrive either as a JSON object or, per the speech service's
/// function-call convention, as a JSON-encoded string.
fn parse_arguments(arguments: Option<&Value>) -> Value {
    match arguments {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::Null),
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

fn arg_u16(args: &Value, key: &str, default: u16) -> u16 {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|v| v.min(u16::MAX as u64) as u16)
        .unwrap_or(default)
}

fn arg_f32(args: &Value, key: &str, default: f32) -> f32 {
    args.get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

/// Expands a dance into its command sequence: a color, a dart out, a full
/// spin, a dart back, and a resting color. Headings are randomized per
/// performance; the producer submits these one at a time with pacing.
pub fn dance_steps() -> Vec<Command> {
    let (heading, r, g, b) = {
        let mut rng = rand::thread_rng();
        (
            rng.gen_range(0u16..360),
            rng.gen_range(30u16..=120),
            rng.gen_range(30u16..=120),
            rng.gen_range(30u16..=120),
        )
    };
    vec![
        Command::SetColor { r, g, b },
        Command::Roll {
            heading,
            speed: 40,
            duration: 0.6,
        },
        Command::Spin {
            degrees: 360,
            duration: 1.5,
        },
        Command::Roll {
            heading: (heading + 180) % 360,
            speed: 40,
            duration: 0.6,
        },
        Command::SetColor { r: 20, g: 20, b: 40 },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(kind: &str, name: Option<&str>, arguments: Option<Value>) -> VoiceEvent {
        VoiceEvent {
            kind: kind.to_string(),
            name: name.map(str::to_string),
            arguments,
        }
    }

    #[test]
    fn move_with_object_arguments() {
        let ev = event(
            "response.done",
            Some("move"),
            Some(json!({"heading": 90, "speed": 100, "duration": 2.0})),
        );
        assert_eq!(
            translate(&ev).unwrap(),
            Some(Intent::Move {
                heading: 90,
                speed: 100,
                duration: 2.0
            })
        );
    }

    #[test]
    fn move_with_string_encoded_arguments() {
        let ev = event(
            "response.done",
            Some("move"),
            Some(json!("{\"heading\": 45}")),
        );
        assert_eq!(
            translate(&ev).unwrap(),
            Some(Intent::Move {
                heading: 45,
                speed: 60,
                duration: 1.0
            })
        );
    }

    #[test]
    fn missing_arguments_fall_back_to_defaults() {
        let ev = event("response.done", Some("spin"), None);
        assert_eq!(
            translate(&ev).unwrap(),
            Some(Intent::Spin {
                degrees: 360,
                duration: 1.0
            })
        );
    }

    #[test]
    fn events_without_a_name_are_ignored() {
        let ev = event("response.audio_transcript.done", None, None);
        assert_eq!(translate(&ev).unwrap(), None);
    }

    #[test]
    fn random_movement_tool_call_maps_to_an_intent() {
        let ev = event(
            "response.done",
            Some("start_sphero_random_movement"),
            None,
        );
        assert_eq!(translate(&ev).unwrap(), Some(Intent::StartRandomMovement));
    }

    #[test]
    fn unknown_intents_are_rejected_not_fatal() {
        let ev = event("response.done", Some("backflip"), None);
        assert_eq!(
            translate(&ev).unwrap_err(),
            VoiceError::UnrecognizedIntent("backflip".to_string())
        );
    }

    #[test]
    fn error_events_become_transport_errors() {
        let ev = event("error", None, Some(json!({"message": "session expired"})));
        assert!(matches!(
            translate(&ev).unwrap_err(),
            VoiceError::Transport(_)
        ));
    }

    #[test]
    fn dance_expands_to_an_ordered_sequence() {
        let steps = dance_steps();
        assert!(steps.len() >= 2);
        for step in &steps {
            step.validate().unwrap();
        }
        // The performance always ends at rest.
        assert!(matches!(steps.last(), Some(Command::SetColor { .. })));
    }
}
