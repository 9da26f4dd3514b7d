use crate::command::Command;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::device::{DeviceLink, ToyHandle};
use crate::dispatcher::{DispatchResult, Dispatcher, Limits};
use crate::error::ConnectError;
use crate::events::{Event, EventBus};
use crate::voice::{SpeechConnector, VoiceBridge, VoiceSessionState};
use crate::wander::{RandomMover, WanderConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub command_timeout: Duration,
    pub wander: WanderConfig,
    pub max_speed: u8,
    pub max_brightness: u8,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(10),
            wander: WanderConfig::default(),
            max_speed: 30,
            max_brightness: 50,
        }
    }
}

/// Top-level wiring of the session: one connection, one command queue, the
/// random movement producer and the voice bridge, all sharing a fanout bus.
/// The gateway talks only to this type.
pub struct Orchestrator {
    connection: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    wander: Arc<RandomMover>,
    voice: Arc<VoiceBridge>,
    events: EventBus,
}

impl Orchestrator {
    pub fn new(
        link: Arc<dyn DeviceLink>,
        connector: Arc<dyn SpeechConnector>,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let events = EventBus::new(64);
        let connection = ConnectionManager::new(link.clone(), events.clone());
        let limits = Arc::new(Limits::new(config.max_speed, config.max_brightness));
        let (dispatcher, mut loss_rx) = Dispatcher::spawn(
            link,
            connection.watch_connected(),
            limits,
            events.clone(),
            config.command_timeout,
        );
        let wander = RandomMover::new(dispatcher.clone(), events.clone(), config.wander);
        let voice = VoiceBridge::new(connector, dispatcher.clone(), wander.clone(), events.clone());

        // Link loss stops the autonomous producer and resets the connection.
        // The voice session stays open; only its device commands start
        // failing until a reconnect.
        {
            let connection = connection.clone();
            let wander = wander.clone();
            tokio::spawn(async move {
                while loss_rx.recv().await.is_some() {
                    if connection.on_link_lost() {
                        wander.stop().await;
                    }
                }
            });
        }

        Arc::new(Self {
            connection,
            dispatcher,
            wander,
            voice,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // Connection lifecycle.

    pub async fn scan(&self) -> Result<Vec<ToyHandle>, ConnectError> {
        self.connection.scan().await
    }

    pub async fn connect(&self, index: usize) -> Result<(), ConnectError> {
        self.connection.connect_index(index).await
    }

    /// Full teardown: the random movement loop is stopped before the link
    /// goes down so its tail commands fail fast instead of racing the
    /// disconnect.
    pub async fn disconnect(&self) {
        self.wander.stop().await;
        self.connection.disconnect().await;
    }

    pub async fn auto_connect(&self) {
        self.connection.auto_connect().await;
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn connected(&self) -> bool {
        self.connection.connected()
    }

    /// Re-publishes the current connection status on the fanout, for clients
    /// that ask explicitly instead of waiting for a transition.
    pub fn publish_connection_status(&self) {
        self.events.connection(self.connection.connected());
        if let Some(name) = self.connection.toy_name() {
            self.events.status(format!("Connected to {name}"));
        }
    }

    // Direct commands.

    pub async fn submit(&self, command: Command) -> DispatchResult {
        self.dispatcher.submit(command).await
    }

    // Random movement.

    pub fn start_random_movement(&self) -> bool {
        self.wander.start()
    }

    pub async fn stop_random_movement(&self) {
        self.wander.stop().await;
    }

    pub fn random_movement_active(&self) -> bool {
        self.wander.is_active()
    }

    // Voice.

    pub async fn start_voice_session(&self) -> anyhow::Result<()> {
        self.voice.start_session().await
    }

    pub async fn stop_voice_session(&self) {
        self.voice.stop_session().await;
    }

    pub fn voice_state(&self) -> VoiceSessionState {
        self.voice.state()
    }

    pub async fn process_voice_event(
        &self,
        raw: serde_json::Value,
    ) -> Result<(), crate::error::VoiceError> {
        self.voice.process_voice_event(raw).await
    }

    pub async fn voice_audio(&self, audio: String) -> Result<(), crate::error::VoiceError> {
        self.voice.append_audio(audio).await
    }

    // Safety caps.

    pub fn set_brightness_limit(&self, limit: u8) {
        self.dispatcher.limits().set_brightness_limit(limit);
        self.events
            .status(format!("Brightness limit set to {limit}"));
    }

    pub fn set_speed_limit(&self, limit: u8) {
        self.dispatcher.limits().set_max_speed(limit);
        self.events.status(format!("Speed limit set to {limit}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{LinkError, MockDeviceLink, SimulatedLink};
    use crate::error::CommandError;
    use crate::voice::MockSpeechConnector;

    fn toy(name: &str) -> ToyHandle {
        ToyHandle {
            id: format!("id-{name}"),
            name: name.to_string(),
        }
    }

    fn quick_config() -> OrchestratorConfig {
        OrchestratorConfig {
            command_timeout: Duration::from_millis(500),
            wander: WanderConfig {
                roll_secs: (0.001, 0.002),
                pause_extra_secs: (0.005, 0.01),
                color_chance: 0.0,
                spin_chance: 0.0,
                ..WanderConfig::default()
            },
            max_speed: 255,
            max_brightness: 255,
        }
    }

    #[tokio::test]
    async fn full_session_against_the_simulated_link() {
        let orch = Orchestrator::new(
            Arc::new(SimulatedLink::new()),
            Arc::new(MockSpeechConnector::new()),
            quick_config(),
        );

        let toys = orch.scan().await.unwrap();
        assert_eq!(toys.len(), 1);
        orch.connect(0).await.unwrap();
        assert!(orch.connected());

        orch.submit(Command::SetColor { r: 10, g: 20, b: 30 })
            .await
            .unwrap();
        orch.submit(Command::Roll {
            heading: 0,
            speed: 20,
            duration: 0.01,
        })
        .await
        .unwrap();

        orch.disconnect().await;
        assert!(!orch.connected());
        assert_eq!(
            orch.submit(Command::Spin {
                degrees: 90,
                duration: 0.01
            })
            .await,
            Err(CommandError::NotConnected)
        );
    }

    #[tokio::test]
    async fn link_loss_stops_random_movement_and_resets_connection() {
        let mut link = MockDeviceLink::new();
        link.expect_scan()
            .returning(|| Box::pin(async { Ok(vec![toy("SB-1")]) }));
        link.expect_connect()
            .returning(|_| Box::pin(async { Ok(()) }));
        link.expect_execute()
            .returning(|_| Box::pin(async { Err(LinkError::LinkLost) }));
        let orch = Orchestrator::new(
            Arc::new(link),
            Arc::new(MockSpeechConnector::new()),
            quick_config(),
        );

        orch.scan().await.unwrap();
        orch.connect(0).await.unwrap();
        orch.start_random_movement();

        // The first roll hits LinkLost; the watcher resets the connection
        // and winds the loop down.
        let mut rx = orch.subscribe();
        let mut saw_disconnect = false;
        for _ in 0..32 {
            match tokio::time::timeout(Duration::from_secs(1), rx.recv()).await {
                Ok(Ok(Event::ConnectionStatus { connected: false })) => {
                    saw_disconnect = true;
                    break;
                }
                Ok(Ok(_)) => {}
                _ => break,
            }
        }
        assert!(saw_disconnect, "link loss never surfaced");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!orch.connected());
        assert!(!orch.random_movement_active());
    }

    #[tokio::test]
    async fn disconnect_stops_the_wander_loop_first() {
        let orch = Orchestrator::new(
            Arc::new(SimulatedLink::new()),
            Arc::new(MockSpeechConnector::new()),
            quick_config(),
        );

        orch.scan().await.unwrap();
        orch.connect(0).await.unwrap();
        assert!(orch.start_random_movement());
        tokio::time::sleep(Duration::from_millis(30)).await;

        orch.disconnect().await;
        assert!(!orch.random_movement_active());
        assert!(!orch.connected());
    }

    #[tokio::test]
    async fn brightness_limit_applies_to_later_commands() {
        let orch = Orchestrator::new(
            Arc::new(SimulatedLink::new()),
            Arc::new(MockSpeechConnector::new()),
            quick_config(),
        );
        orch.scan().await.unwrap();
        orch.connect(0).await.unwrap();

        orch.set_brightness_limit(51);
        // 255 scaled by 51/255 = 51.
        let message = orch
            .submit(Command::SetColor { r: 255, g: 0, b: 0 })
            .await
            .unwrap();
        assert_eq!(message, "Color set to RGB(51,0,0)");
    }
}
