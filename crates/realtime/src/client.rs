use crate::events::{ClientEvent, ServerEvent, SessionEvent};
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

const DEFAULT_WS_URL: &str = "wss://api.openai.com/v1/realtime?intent=transcription";

enum Outbound {
    Event(ClientEvent),
    Close,
}

/// One live realtime connection. The socket is split on connect: a send task
/// drains the outbound queue onto the write half, and a read task broadcasts
/// every parsed service event. Dropping the client closes the socket.
pub struct RealtimeClient {
    out_tx: mpsc::Sender<Outbound>,
    server_tx: broadcast::Sender<ServerEvent>,
}

impl RealtimeClient {
    pub async fn connect(ephemeral_key: &SecretString) -> Result<Self> {
        Self::connect_to(DEFAULT_WS_URL, ephemeral_key).await
    }

    pub async fn connect_to(url: &str, ephemeral_key: &SecretString) -> Result<Self> {
        let mut request = url.into_client_request()?;
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", ephemeral_key.expose_secret()).parse()?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", "realtime=v1".parse()?);

        let (ws_stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Outbound>(256);
        let (server_tx, _) = broadcast::channel::<ServerEvent>(256);

        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Event(event) => match serde_json::to_string(&event) {
                        Ok(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                tracing::error!("failed to send message: {e}");
                                break;
                            }
                        }
                        Err(e) => tracing::error!("failed to serialize event: {e}"),
                    },
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        let broadcast_tx = server_tx.clone();
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        tracing::error!("failed to read message: {e}");
                        let _ = broadcast_tx.send(ServerEvent::Close {
                            reason: Some(e.to_string()),
                        });
                        return;
                    }
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<SessionEvent>(&text) {
                        Ok(event) => {
                            tracing::debug!(kind = %event.kind, "received service event");
                            let _ = broadcast_tx.send(ServerEvent::Event(event));
                        }
                        Err(e) => {
                            tracing::error!("failed to deserialize event: {e}, text=> {text:?}");
                        }
                    },
                    Message::Binary(bin) => {
                        tracing::warn!("unexpected binary message: {} bytes", bin.len());
                    }
                    Message::Close(reason) => {
                        tracing::info!("connection closed: {reason:?}");
                        let _ = broadcast_tx.send(ServerEvent::Close {
                            reason: reason.map(|v| format!("{v:?}")),
                        });
                        break;
                    }
                    _ => {}
                }
            }
            let _ = broadcast_tx.send(ServerEvent::Close { reason: None });
        });

        Ok(Self { out_tx, server_tx })
    }

    /// New subscription to the service event stream.
    pub fn server_events(&self) -> broadcast::Receiver<ServerEvent> {
        self.server_tx.subscribe()
    }

    /// Queues one base64 audio chunk for the service.
    pub async fn append_audio(&self, audio: String) -> Result<()> {
        self.out_tx
            .send(Outbound::Event(ClientEvent::InputAudioBufferAppend {
                audio,
            }))
            .await
            .map_err(|_| anyhow::anyhow!("realtime connection is closed"))
    }

    /// Asks the send task to close the socket cleanly. Best effort; the
    /// connection may already be gone.
    pub async fn close(&self) {
        let _ = self.out_tx.send(Outbound::Close).await;
    }
}
