use thiserror::Error;

use crate::protocol::RouterId;

/// Rejected startup parameters. Raised before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("router id {0} is outside the accepted range 0..=998")]
    InvalidRouterId(i64),

    #[error("update interval cannot be negative (got {0} ms)")]
    NegativeInterval(i64),

    #[error("relay address {host}:{port} could not be resolved")]
    UnresolvableRelay { host: String, port: u16 },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The relay handshake did not produce a usable topology snapshot.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("could not connect to relay: {0}")]
    Connect(#[source] std::io::Error),

    #[error("failed to send HELLO: {0}")]
    Send(#[source] TransportError),

    #[error("relay closed the connection before replying")]
    PrematureClose,

    #[error("unreadable handshake reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("unexpected handshake reply: {0}")]
    UnexpectedReply(String),

    #[error("transport failed during handshake: {0}")]
    Transport(#[source] TransportError),
}

/// A single frame could not be parsed into a packet.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("frame is not a valid packet: {0}")]
    Json(#[from] serde_json::Error),
}

/// The relay connection itself failed.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("relay closed the connection")]
    Closed,

    #[error("frame exceeds maximum length ({0} bytes)")]
    FrameTooLong(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode packet: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("no entry for destination {0}")]
    NotFound(RouterId),
}
