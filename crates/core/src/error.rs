use thiserror::Error;

/// Failures a command submission can resolve to. Every submission resolves to
/// exactly one of these or to a success message, never to silence.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("not connected to any Sphero")]
    NotConnected,

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("device did not acknowledge in time")]
    DeviceTimeout,

    #[error("device error: {0}")]
    DeviceError(String),

    #[error("dispatcher is shut down")]
    QueueClosed,
}

/// Failures of the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("a connect attempt is already in progress")]
    AlreadyConnecting,

    #[error("already connected")]
    AlreadyConnected,

    #[error("another connection operation is in progress")]
    Busy,

    #[error("no toy at index {0}, scan first")]
    UnknownToy(usize),

    #[error("scan failed: {0}")]
    ScanFailed(String),

    #[error("connection error: {0}")]
    Driver(String),
}

/// Failures of the voice pipeline. `UnrecognizedIntent` is always non-fatal:
/// callers log it and drop the event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoiceError {
    #[error("voice transport error: {0}")]
    Transport(String),

    #[error("unrecognized voice intent: {0}")]
    UnrecognizedIntent(String),
}
