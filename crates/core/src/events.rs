use tokio::sync::broadcast;

/// Status events fanned out to every connected UI client.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Status { message: String },
    ConnectionStatus { connected: bool },
    ScanResults { toys: Vec<String> },
    RandomMovementStatus { active: bool },
    VoiceStatus { message: String },
}

/// Broadcast fanout for status events. Sending never fails from the
/// producer's point of view; with no UI clients attached the events are
/// simply dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: Event) {
        tracing::debug!(?event, "fanout");
        let _ = self.tx.send(event);
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(Event::Status {
            message: message.into(),
        });
    }

    pub fn connection(&self, connected: bool) {
        self.emit(Event::ConnectionStatus { connected });
    }

    pub fn scan_results(&self, toys: Vec<String>) {
        self.emit(Event::ScanResults { toys });
    }

    pub fn random_movement(&self, active: bool) {
        self.emit(Event::RandomMovementStatus { active });
    }

    pub fn voice(&self, message: impl Into<String>) {
        self.emit(Event::VoiceStatus {
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.connection(true);
        assert_eq!(rx.recv().await.unwrap(), Event::ConnectionStatus { connected: true });
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.status("nobody is listening");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(Event::RandomMovementStatus { active: false }).unwrap();
        assert_eq!(json["type"], "random_movement_status");
        assert_eq!(json["active"], false);
    }
}
