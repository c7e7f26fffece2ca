//! TraX client error types.
//!
//! Errors follow the failure taxonomy of the protocol:
//!
//! - **IOFault**: the underlying stream failed ([`TraxError::Io`])
//! - **ProtocolViolation**: the tracker sent the wrong frame, or none at all
//!   ([`TraxError::Handshake`], [`TraxError::Protocol`])
//! - **CapabilityMismatch**: no format both sides understand; nothing was sent
//! - **ConstructionError**: a region or image could not be built from its input
//! - **Misuse**: an operation was called in the wrong session state
//!
//! Malformed frames are never reported here. The parser drops them and
//! resynchronizes on the next line.

use thiserror::Error;

/// TraX client errors.
#[derive(Error, Debug)]
pub enum TraxError {
    /// Handshake frame missing or illegal.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Tracker violated the request/reply contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No mutually supported region or image format.
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// Region could not be constructed.
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// Property key outside `[A-Za-z0-9._]{1,16}`.
    #[error("Invalid property key: {0:?}")]
    InvalidProperty(String),

    /// Image could not be constructed.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// `frame` called before a successful `initialize`.
    #[error("Tracker not initialized")]
    NotInitialized,

    /// Operation attempted after `quit`.
    #[error("Session closed")]
    SessionClosed,

    /// An earlier protocol or I/O fault left the stream in an unknown position.
    #[error("Session faulted by an earlier error")]
    SessionFaulted,

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for TraX operations
pub type Result<T> = std::result::Result<T, TraxError>;

impl TraxError {
    /// Whether this error leaves the session stream in an unknown position.
    ///
    /// Such errors poison the session: the tracker may still be mid-reply.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraxError::Protocol(_) | TraxError::Io(_))
    }
}

impl From<toml::de::Error> for TraxError {
    fn from(err: toml::de::Error) -> Self {
        TraxError::Config(err.to_string())
    }
}
