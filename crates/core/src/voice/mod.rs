pub mod translator;

use crate::command::Command;
use crate::dispatcher::Dispatcher;
use crate::error::VoiceError;
use crate::events::EventBus;
use crate::wander::RandomMover;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use translator::{Intent, VoiceEvent, dance_steps, translate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceSessionState {
    Closed,
    Connecting,
    Open,
}

/// One live connection to the realtime speech service. Methods take `&self`
/// so the session loop can wait for events and forward audio concurrently;
/// implementations keep their receiver behind a lock.
#[async_trait]
pub trait SpeechSession: Send + Sync {
    /// Next structured event, or `None` once the service closes the stream.
    async fn next_event(&self) -> Option<VoiceEvent>;
    async fn append_audio(&self, audio: String) -> anyhow::Result<()>;
    async fn close(&self);
}

/// Opens speech sessions. The gateway supplies the real implementation.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait SpeechConnector: Send + Sync {
    async fn open(&self) -> anyhow::Result<Box<dyn SpeechSession>>;
}

struct Control {
    close_tx: watch::Sender<bool>,
    audio_tx: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

/// Bridges the speech service to the command queue. Holds at most one live
/// session; start and stop are both idempotent. Forwarded events from
/// browser-held sessions go through [`VoiceBridge::process_voice_event`] and
/// work whether or not a server-side session is open.
pub struct VoiceBridge {
    connector: Arc<dyn SpeechConnector>,
    dispatcher: Arc<Dispatcher>,
    wander: Arc<RandomMover>,
    events: EventBus,
    state: Arc<StdMutex<VoiceSessionState>>,
    control: Mutex<Option<Control>>,
}

impl VoiceBridge {
    pub fn new(
        connector: Arc<dyn SpeechConnector>,
        dispatcher: Arc<Dispatcher>,
        wander: Arc<RandomMover>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            connector,
            dispatcher,
            wander,
            events,
            state: Arc::new(StdMutex::new(VoiceSessionState::Closed)),
            control: Mutex::new(None),
        })
    }

    pub fn state(&self) -> VoiceSessionState {
        *self.state.lock().expect("voice state lock poisoned")
    }

    fn set_state(&self, next: VoiceSessionState) {
        *self.state.lock().expect("voice state lock poisoned") = next;
    }

    /// Opens a session and spawns its event loop. A second start while a
    /// session is connecting or open changes nothing.
    pub async fn start_session(self: &Arc<Self>) -> anyhow::Result<()> {
        let mut control = self.control.lock().await;
        if control.as_ref().is_some_and(|c| !c.task.is_finished()) {
            tracing::debug!("voice session already running, start is a no-op");
            return Ok(());
        }
        // A previous session that ended on its own leaves a finished task.
        *control = None;

        self.set_state(VoiceSessionState::Connecting);
        self.events.voice("Starting voice session");

        let session = match self.connector.open().await {
            Ok(session) => session,
            Err(e) => {
                self.set_state(VoiceSessionState::Closed);
                self.events.voice(format!("Voice session failed: {e}"));
                return Err(e);
            }
        };

        let (close_tx, close_rx) = watch::channel(false);
        let (audio_tx, audio_rx) = mpsc::channel(64);
        let bridge = self.clone();
        let task = tokio::spawn(async move {
            bridge.run_session(session, close_rx, audio_rx).await;
        });
        *control = Some(Control {
            close_tx,
            audio_tx,
            task,
        });

        self.set_state(VoiceSessionState::Open);
        self.events.voice("Voice session started");
        Ok(())
    }

    /// Closes the session if one is open. Safe to call any number of times.
    pub async fn stop_session(&self) {
        let control = self.control.lock().await.take();
        let Some(control) = control else {
            return;
        };
        let _ = control.close_tx.send(true);
        let _ = control.task.await;
        self.set_state(VoiceSessionState::Closed);
        self.events.voice("Voice session stopped");
    }

    /// Forwards a caller-captured audio chunk to the open session.
    pub async fn append_audio(&self, audio: String) -> Result<(), VoiceError> {
        let control = self.control.lock().await;
        let Some(control) = control.as_ref().filter(|c| !c.task.is_finished()) else {
            return Err(VoiceError::Transport("no voice session open".to_string()));
        };
        control
            .audio_tx
            .send(audio)
            .await
            .map_err(|_| VoiceError::Transport("voice session closing".to_string()))
    }

    async fn run_session(
        self: Arc<Self>,
        session: Box<dyn SpeechSession>,
        mut close_rx: watch::Receiver<bool>,
        mut audio_rx: mpsc::Receiver<String>,
    ) {
        tracing::info!("voice session loop started");
        loop {
            tokio::select! {
                _ = close_rx.changed() => {
                    session.close().await;
                    break;
                }
                chunk = audio_rx.recv() => {
                    let Some(chunk) = chunk else { continue };
                    if let Err(e) = session.append_audio(chunk).await {
                        tracing::warn!("voice session ending, audio send failed: {e}");
                        session.close().await;
                        self.set_state(VoiceSessionState::Closed);
                        self.events.voice(format!("Voice session error: {e}"));
                        break;
                    }
                }
                event = session.next_event() => {
                    let Some(event) = event else {
                        // Server closed the stream. The stale control entry
                        // is cleared by the next start or stop.
                        self.set_state(VoiceSessionState::Closed);
                        self.events.voice("Voice session closed by server");
                        break;
                    };
                    self.handle_event(&event).await;
                }
            }
        }
        tracing::info!("voice session loop finished");
    }

    async fn handle_event(&self, event: &VoiceEvent) {
        match translate(event) {
            Ok(Some(intent)) => self.run_intent(intent).await,
            Ok(None) => {}
            Err(VoiceError::UnrecognizedIntent(name)) => {
                tracing::warn!("ignoring unrecognized voice intent {name:?}");
                self.events.voice(format!("Unrecognized command: {name}"));
            }
            Err(VoiceError::Transport(detail)) => {
                tracing::warn!("voice service error event: {detail}");
                self.events.voice(format!("Voice service error: {detail}"));
            }
        }
    }

    /// Entry point for events forwarded verbatim by a UI client that holds
    /// its own speech connection.
    pub async fn process_voice_event(&self, raw: serde_json::Value) -> Result<(), VoiceError> {
        let event: VoiceEvent = serde_json::from_value(raw)
            .map_err(|e| VoiceError::Transport(format!("malformed voice event: {e}")))?;
        match translate(&event)? {
            Some(intent) => {
                self.run_intent(intent).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn run_intent(&self, intent: Intent) {
        match intent {
            Intent::Move {
                heading,
                speed,
                duration,
            } => {
                let result = self
                    .dispatcher
                    .submit(Command::Roll {
                        heading,
                        speed,
                        duration,
                    })
                    .await;
                if let Err(e) = result {
                    self.events.voice(format!("Move failed: {e}"));
                }
            }
            Intent::Spin { degrees, duration } => {
                let result = self
                    .dispatcher
                    .submit(Command::Spin { degrees, duration })
                    .await;
                if let Err(e) = result {
                    self.events.voice(format!("Spin failed: {e}"));
                }
            }
            Intent::Dance => {
                self.events.voice("Dancing!");
                for step in dance_steps() {
                    let pace = step.duration();
                    if let Err(e) = self.dispatcher.submit(step).await {
                        self.events.voice(format!("Dance cut short: {e}"));
                        return;
                    }
                    tokio::time::sleep(pace).await;
                }
            }
            Intent::StartRandomMovement => {
                if !self.wander.start() {
                    tracing::debug!("random movement already running");
                }
            }
            Intent::Stop => {
                self.wander.stop().await;
                let _ = self
                    .dispatcher
                    .submit(Command::Roll {
                        heading: 0,
                        speed: 0,
                        duration: 0.1,
                    })
                    .await;
                self.events.voice("Stopped");
            }
        }
    }
}
