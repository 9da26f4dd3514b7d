use crate::device::{DeviceLink, ToyHandle};
use crate::error::ConnectError;
use crate::events::EventBus;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Connection lifecycle of the single physical toy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Scanning,
    Connecting,
    Connected,
    Disconnecting,
}

struct Inner {
    state: ConnectionState,
    candidates: Vec<ToyHandle>,
    toy: Option<ToyHandle>,
}

/// Owns the connection identity and all transitions. Commands are accepted
/// by the dispatcher iff this reports `Connected`, which it publishes on a
/// `watch` channel so the dispatcher can check without taking the lock.
pub struct ConnectionManager {
    link: Arc<dyn DeviceLink>,
    events: EventBus,
    inner: Mutex<Inner>,
    connected_tx: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(link: Arc<dyn DeviceLink>, events: EventBus) -> Arc<Self> {
        let (connected_tx, _) = watch::channel(false);
        Arc::new(Self {
            link,
            events,
            inner: Mutex::new(Inner {
                state: ConnectionState::Disconnected,
                candidates: Vec::new(),
                toy: None,
            }),
            connected_tx,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().expect("connection lock poisoned").state
    }

    pub fn connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn watch_connected(&self) -> watch::Receiver<bool> {
        self.connected_tx.subscribe()
    }

    pub fn toy_name(&self) -> Option<String> {
        self.inner
            .lock()
            .expect("connection lock poisoned")
            .toy
            .as_ref()
            .map(|t| t.name.clone())
    }

    /// Scan for toys. Populates the candidate list and always returns the
    /// state machine to `Disconnected`; a scan never changes whether we are
    /// connected.
    pub async fn scan(&self) -> Result<Vec<ToyHandle>, ConnectError> {
        {
            let mut inner = self.inner.lock().expect("connection lock poisoned");
            match inner.state {
                ConnectionState::Disconnected => inner.state = ConnectionState::Scanning,
                ConnectionState::Connecting => return Err(ConnectError::AlreadyConnecting),
                ConnectionState::Connected => return Err(ConnectError::AlreadyConnected),
                ConnectionState::Scanning | ConnectionState::Disconnecting => {
                    return Err(ConnectError::Busy);
                }
            }
        }

        self.events.status("Scanning for Sphero toys...");
        let result = self.link.scan().await;

        let mut inner = self.inner.lock().expect("connection lock poisoned");
        inner.state = ConnectionState::Disconnected;
        match result {
            Ok(toys) => {
                inner.candidates = toys.clone();
                drop(inner);
                self.events
                    .scan_results(toys.iter().map(|t| t.name.clone()).collect());
                if toys.is_empty() {
                    self.events.status("No Sphero toys found.");
                    self.events.connection(false);
                }
                Ok(toys)
            }
            Err(e) => {
                drop(inner);
                tracing::warn!("scan failed: {e}");
                self.events.status(format!("Scan failed: {e}"));
                Err(ConnectError::ScanFailed(e.to_string()))
            }
        }
    }

    /// Connect to a previously scanned candidate. Only one attempt may be in
    /// flight; requests made while connecting or connected are rejected.
    pub async fn connect_index(&self, index: usize) -> Result<(), ConnectError> {
        let toy = {
            let mut inner = self.inner.lock().expect("connection lock poisoned");
            match inner.state {
                ConnectionState::Disconnected => {}
                ConnectionState::Connecting => return Err(ConnectError::AlreadyConnecting),
                ConnectionState::Connected => return Err(ConnectError::AlreadyConnected),
                ConnectionState::Scanning | ConnectionState::Disconnecting => {
                    return Err(ConnectError::Busy);
                }
            }
            let toy = inner
                .candidates
                .get(index)
                .cloned()
                .ok_or(ConnectError::UnknownToy(index))?;
            inner.state = ConnectionState::Connecting;
            toy
        };

        self.events.status(format!("Found {}. Connecting...", toy.name));
        tracing::info!("attempting to connect to {}", toy.name);

        match self.link.connect(&toy).await {
            Ok(()) => {
                {
                    let mut inner = self.inner.lock().expect("connection lock poisoned");
                    inner.state = ConnectionState::Connected;
                    inner.toy = Some(toy.clone());
                }
                self.connected_tx.send_replace(true);
                self.events.connection(true);
                self.events.status(format!("Connected to {}!", toy.name));
                Ok(())
            }
            Err(e) => {
                self.inner.lock().expect("connection lock poisoned").state =
                    ConnectionState::Disconnected;
                self.connected_tx.send_replace(false);
                tracing::error!("connection to {} failed: {e}", toy.name);
                self.events.connection(false);
                self.events.status(format!("Connection error: {e}"));
                Err(ConnectError::Driver(e.to_string()))
            }
        }
    }

    /// Disconnect and reset local state. Always succeeds from the state
    /// machine's perspective, even if the driver call errors; local state
    /// must never get stuck in `Disconnecting`.
    pub async fn disconnect(&self) {
        {
            let mut inner = self.inner.lock().expect("connection lock poisoned");
            if inner.state == ConnectionState::Disconnected {
                drop(inner);
                self.events.status("Not connected to any Sphero");
                return;
            }
            inner.state = ConnectionState::Disconnecting;
        }

        if let Err(e) = self.link.disconnect().await {
            tracing::warn!("driver error while disconnecting (state reset anyway): {e}");
        }

        {
            let mut inner = self.inner.lock().expect("connection lock poisoned");
            inner.state = ConnectionState::Disconnected;
            inner.toy = None;
        }
        self.connected_tx.send_replace(false);
        self.events.connection(false);
        self.events.status("Disconnected from Sphero");
    }

    /// Unsolicited link loss reported by the adapter. Resets to
    /// `Disconnected` and returns whether a transition actually happened so
    /// the orchestrator can stop dependent producers exactly once.
    pub fn on_link_lost(&self) -> bool {
        let lost = {
            let mut inner = self.inner.lock().expect("connection lock poisoned");
            if inner.state == ConnectionState::Connected {
                inner.state = ConnectionState::Disconnected;
                inner.toy = None;
                true
            } else {
                false
            }
        };
        if lost {
            self.connected_tx.send_replace(false);
            tracing::warn!("link to the toy was lost");
            self.events.connection(false);
            self.events.status("Connection to Sphero lost");
        }
        lost
    }

    /// Scan and connect to the first toy found, unless already connected.
    /// Triggered when a UI client attaches, mirroring the original
    /// auto-connect behavior.
    pub async fn auto_connect(&self) {
        if self.connected() {
            self.events.connection(true);
            if let Some(name) = self.toy_name() {
                self.events.status(format!("Already connected to {name}"));
            }
            return;
        }

        let toys = match self.scan().await {
            Ok(toys) => toys,
            // Another attempt is already in progress, or the scan failed;
            // either way it has been reported.
            Err(_) => return,
        };
        if toys.is_empty() {
            return;
        }
        let _ = self.connect_index(0).await;
    }
}
