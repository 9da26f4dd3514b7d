use crate::command::Command;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

/// Identity of a toy discovered by a scan.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ToyHandle {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Error)]
pub enum LinkError {
    /// The underlying link to the toy dropped. The orchestrator reacts by
    /// resetting the connection state machine and stopping background
    /// producers that depend on the link.
    #[error("link to the toy was lost")]
    LinkLost,

    #[error("{0}")]
    Device(String),
}

// The `DeviceLink` trait is the boundary to the external BLE driver. The
// dispatcher is the only component allowed to call `execute`, and it wraps
// every call in a bounded timeout, so implementations may block for as long
// as the transport needs.
//
// `#[cfg_attr(test, automock)]` gives tests a `MockDeviceLink` so dispatcher
// and connection behavior can be verified without a physical toy.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait DeviceLink: Send + Sync {
    /// Scan for nearby toys. Does not change any connection state.
    async fn scan(&self) -> Result<Vec<ToyHandle>, LinkError>;

    /// Connect to a specific toy.
    async fn connect(&self, toy: &ToyHandle) -> Result<(), LinkError>;

    /// Tear down the link. Best effort; callers reset local state regardless.
    async fn disconnect(&self) -> Result<(), LinkError>;

    /// Execute one command against the toy and wait for its acknowledgment.
    async fn execute(&self, command: &Command) -> Result<(), LinkError>;
}

/// Stand-in for the external BLE driver: acknowledges every operation after
/// a realistic delay and logs what the toy would do. Lets the gateway run
/// end to end without hardware.
pub struct SimulatedLink {
    toy_name: String,
}

impl SimulatedLink {
    pub fn new() -> Self {
        Self {
            toy_name: "SB-SIM Sphero".to_string(),
        }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeviceLink for SimulatedLink {
    async fn scan(&self) -> Result<Vec<ToyHandle>, LinkError> {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        Ok(vec![ToyHandle {
            id: "sim-0".to_string(),
            name: self.toy_name.clone(),
        }])
    }

    async fn connect(&self, toy: &ToyHandle) -> Result<(), LinkError> {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        tracing::info!("simulated link connected to {}", toy.name);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LinkError> {
        tracing::info!("simulated link disconnected");
        Ok(())
    }

    async fn execute(&self, command: &Command) -> Result<(), LinkError> {
        tracing::info!("simulated toy executing: {}", command.describe());
        tokio::time::sleep(command.duration()).await;
        Ok(())
    }
}
