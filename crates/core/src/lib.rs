//! Session core for a single Sphero toy: connection state machine, the
//! serialized command dispatcher, the random movement producer, and the
//! voice intent bridge, all publishing status to one fanout bus.

pub mod command;
pub mod connection;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod voice;
pub mod wander;

pub use command::Command;
pub use connection::{ConnectionManager, ConnectionState};
pub use device::{DeviceLink, LinkError, SimulatedLink, ToyHandle};
pub use dispatcher::{DispatchResult, Dispatcher, Limits};
pub use error::{CommandError, ConnectError, VoiceError};
pub use events::{Event, EventBus};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use voice::{SpeechConnector, SpeechSession, VoiceBridge, VoiceSessionState};
pub use voice::translator::VoiceEvent;
pub use wander::{RandomMover, WanderConfig};
