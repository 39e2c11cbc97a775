use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors produced by the live session core.
///
/// `Config` and `Device` abort activation before any resource survives the
/// attempt. `Transport` drives an active session into `Failed` and through the
/// full teardown path; there is no automatic reconnect. Out-of-range or
/// malformed tool-call fields never surface here at all — they are clamped or
/// skipped locally with a logged warning.
#[derive(Debug, Error)]
pub enum LiveError {
    /// Missing or invalid service credential. No network attempt is made.
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone or camera unavailable, or permission denied.
    #[error("capture device error: {0}")]
    Device(String),

    /// Connection-level failure: open, send or receive on the duplex link.
    #[error("transport error: {0}")]
    Transport(String),

    /// Audio or video payload could not be encoded for transport.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Bug-grade failure inside the crate, such as a message that cannot be
    /// serialized.
    #[error("internal error: {0}")]
    Internal(String),
}
