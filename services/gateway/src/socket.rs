//! The WebSocket boundary: UI requests in, fanout events out.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sphero_core::{Command, Orchestrator};
use std::sync::Arc;

/// Requests a UI client sends over the socket. Tagged exactly like the
/// outbound events so both directions read the same on the wire.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiRequest {
    Scan,
    Connect {
        toy_index: usize,
    },
    Disconnect,
    CheckConnectionStatus,
    SetColor {
        r: u16,
        g: u16,
        b: u16,
    },
    Roll {
        heading: u16,
        speed: u16,
        #[serde(default = "default_roll_duration")]
        duration: f32,
    },
    Spin {
        degrees: u16,
        duration: f32,
    },
    StartRandomMovement,
    StopRandomMovement,
    StartVoiceSession,
    StopVoiceSession,
    ProcessVoiceEvent {
        event: serde_json::Value,
    },
    VoiceAudio {
        audio: String,
    },
    SetBrightnessLimit {
        limit: u8,
    },
}

fn default_roll_duration() -> f32 {
    1.0
}

/// Handles WebSocket upgrade requests.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(orchestrator): State<Arc<Orchestrator>>,
) -> Response {
    tracing::info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, orchestrator))
}

/// Manages one UI client: a forward task streams fanout events to the
/// client while this task parses and dispatches its requests.
async fn handle_socket(socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    tracing::info!("UI client connected");
    let (mut sender, mut receiver) = socket.split();

    let mut events = orchestrator.subscribe();
    let forward = tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                // A slow client that lags just misses old status lines.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("failed to serialize event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // A freshly attached client either learns we are connected or triggers
    // a scan-and-connect in the background.
    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.auto_connect().await });
    }

    while let Some(message) = receiver.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                tracing::info!("WebSocket error: {e}");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match serde_json::from_str::<UiRequest>(text.as_str()) {
            Ok(request) => dispatch(&orchestrator, request).await,
            Err(e) => {
                tracing::warn!("unparseable UI request: {e}");
                orchestrator
                    .events()
                    .status(format!("Unrecognized request: {e}"));
            }
        }
    }

    forward.abort();
    tracing::info!("UI client disconnected");
}

/// Routes one request. Anything that can stall on the device or the network
/// runs in its own task so this client's read loop stays responsive.
async fn dispatch(orchestrator: &Arc<Orchestrator>, request: UiRequest) {
    match request {
        UiRequest::Scan => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let _ = orchestrator.scan().await;
            });
        }
        UiRequest::Connect { toy_index } => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.connect(toy_index).await {
                    orchestrator
                        .events()
                        .status(format!("Connection error: {e}"));
                }
            });
        }
        UiRequest::Disconnect => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.disconnect().await });
        }
        UiRequest::CheckConnectionStatus => {
            if orchestrator.connected() {
                orchestrator.publish_connection_status();
            } else {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move { orchestrator.auto_connect().await });
            }
        }
        UiRequest::SetColor { r, g, b } => {
            submit(orchestrator, Command::SetColor { r, g, b });
        }
        UiRequest::Roll {
            heading,
            speed,
            duration,
        } => {
            submit(
                orchestrator,
                Command::Roll {
                    heading,
                    speed,
                    duration,
                },
            );
        }
        UiRequest::Spin { degrees, duration } => {
            submit(orchestrator, Command::Spin { degrees, duration });
        }
        UiRequest::StartRandomMovement => {
            orchestrator.start_random_movement();
        }
        UiRequest::StopRandomMovement => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.stop_random_movement().await });
        }
        UiRequest::StartVoiceSession => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let _ = orchestrator.start_voice_session().await;
            });
        }
        UiRequest::StopVoiceSession => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.stop_voice_session().await });
        }
        UiRequest::ProcessVoiceEvent { event } => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.process_voice_event(event).await {
                    tracing::warn!("forwarded voice event rejected: {e}");
                }
            });
        }
        UiRequest::VoiceAudio { audio } => {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.voice_audio(audio).await {
                    tracing::debug!("dropping audio chunk: {e}");
                }
            });
        }
        UiRequest::SetBrightnessLimit { limit } => {
            orchestrator.set_brightness_limit(limit);
        }
    }
}

/// Fire one direct command. Worker failures are mirrored by the dispatcher;
/// the fail-fast rejections are mirrored here so the UI always hears back.
fn submit(orchestrator: &Arc<Orchestrator>, command: Command) {
    let orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.submit(command).await {
            orchestrator.events().status(format!("Command failed: {e}"));
        }
    });
}
