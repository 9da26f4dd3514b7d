//! Thin client for the realtime speech service: an HTTP broker that mints
//! short-lived transcription-session credentials, and a WebSocket client
//! that streams structured service events.

mod broker;
mod client;
pub mod events;

pub use broker::{CredentialBroker, SessionCredential};
pub use client::RealtimeClient;
pub use events::{ClientEvent, ServerEvent, SessionEvent};
