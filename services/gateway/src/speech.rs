//! Adapters between the realtime client and the core voice bridge.

use async_trait::async_trait;
use secrecy::SecretString;
use sphero_core::voice::{SpeechConnector, SpeechSession};
use sphero_core::VoiceEvent;
use sphero_realtime::{CredentialBroker, RealtimeClient, ServerEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Opens server-side speech sessions: mints an ephemeral credential, dials
/// the realtime service with it, and hands the live connection to the voice
/// bridge.
pub struct OpenAiSpeechConnector {
    broker: Arc<CredentialBroker>,
}

impl OpenAiSpeechConnector {
    pub fn new(broker: Arc<CredentialBroker>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl SpeechConnector for OpenAiSpeechConnector {
    async fn open(&self) -> anyhow::Result<Box<dyn SpeechSession>> {
        let credential = self.broker.mint().await?;
        let secret = credential
            .client_secret()
            .ok_or_else(|| anyhow::anyhow!("credential response carried no client secret"))?;
        let client = RealtimeClient::connect(&SecretString::from(secret.to_string())).await?;
        let events = client.server_events();
        Ok(Box::new(OpenAiSpeechSession {
            client,
            events: Mutex::new(events),
        }))
    }
}

struct OpenAiSpeechSession {
    client: RealtimeClient,
    events: Mutex<broadcast::Receiver<ServerEvent>>,
}

#[async_trait]
impl SpeechSession for OpenAiSpeechSession {
    async fn next_event(&self) -> Option<VoiceEvent> {
        let mut events = self.events.lock().await;
        loop {
            match events.recv().await {
                Ok(ServerEvent::Event(event)) => {
                    return Some(VoiceEvent {
                        kind: event.kind,
                        name: event.name,
                        arguments: event.arguments,
                    });
                }
                Ok(ServerEvent::Close { reason }) => {
                    tracing::info!("speech session closed: {reason:?}");
                    return None;
                }
                // Falling behind loses status chatter, not the stream.
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("speech session lagged, skipped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    async fn append_audio(&self, audio: String) -> anyhow::Result<()> {
        self.client.append_audio(audio).await
    }

    async fn close(&self) {
        self.client.close().await;
    }
}

/// Connector used when no speech credentials are configured. Every open
/// fails with a clear message; the rest of the gateway works normally.
pub struct NullSpeechConnector;

#[async_trait]
impl SpeechConnector for NullSpeechConnector {
    async fn open(&self) -> anyhow::Result<Box<dyn SpeechSession>> {
        Err(anyhow::anyhow!(
            "voice is unavailable: OPENAI_API_KEY is not configured"
        ))
    }
}
