//! Domain-specific error types for the PARC receiver protocol.
//!
//! All fallible operations return `Result<T, ParcError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ParcError>;

/// The canonical error type for the PARC receiver protocol.
#[derive(Debug, Error)]
pub enum ParcError {
    // ── Protocol Errors (always fatal to a transport) ────────────
    /// Received bytes that do not carry the packet magic sequence.
    #[error("invalid magic bytes: expected 89 01")]
    InvalidMagic,

    /// The received frame is shorter than the 6-byte minimum.
    #[error("packet too short: {len} bytes (min {min})")]
    PacketTooShort { len: usize, min: usize },

    /// The received frame is longer than the 256-byte maximum.
    #[error("packet too long: {len} bytes (max {max})")]
    PacketTooLong { len: usize, max: usize },

    /// The final byte of the packet is not the end-of-packet marker.
    #[error("missing end-of-packet byte")]
    MissingTerminator,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// The peer sent something other than the expected handshake bytes.
    #[error("handshake mismatch: expected {expected}")]
    HandshakeMismatch { expected: &'static str },

    /// The receiver rejected our authentication (PJNAK).
    #[error("authentication rejected by receiver")]
    AuthenticationRejected,

    /// A response packet did not match the command that was sent.
    #[error("response mismatch: {0}")]
    ResponseMismatch(&'static str),

    /// A response payload had the wrong length for its command.
    #[error("bad response payload length for {command}: expected {expected}, got {actual}")]
    ResponsePayloadLength {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A response payload was not in the command's known-valid set.
    #[error("unrecognized response payload for {0}")]
    UnknownResponsePayload(&'static str),

    /// A packet violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Transport Errors ─────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The connect deadline expired before the receiver accepted us.
    #[error("could not connect within {0:?}")]
    ConnectTimeout(Duration),

    /// The transport has been shut down; no further interaction is possible.
    #[error("transport is shut down")]
    TransportShutDown,

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A failure stored as a transport's terminal status, observed by
    /// a later caller.
    #[error("{0}")]
    Shared(Arc<ParcError>),

    // ── Configuration Errors ─────────────────────────────────────
    /// A command name does not exist in the catalog.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// A receiver model name does not exist in the registry.
    #[error("unknown receiver model: {0}")]
    UnknownModel(String),

    /// A host specifier could not be parsed.
    #[error("invalid host specifier: {0}")]
    InvalidHostSpecifier(String),

    /// A configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    // ── Discovery Errors ─────────────────────────────────────────
    /// A discovery search finished without finding any receiver.
    #[error("no receiver found{}", .name.as_deref().map(|n| format!(" named '{n}'")).unwrap_or_default())]
    NoReceiverFound { name: Option<String> },

    /// An unnamed discovery search found more than one receiver.
    #[error("ambiguous discovery: {count} receivers answered; name one explicitly")]
    AmbiguousDiscovery { count: usize },

    /// A received datagram does not follow the discovery wire format.
    #[error("bad discovery datagram: {0}")]
    BadDatagram(&'static str),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl ParcError {
    /// Wrap a stored terminal status for delivery to an additional caller.
    pub fn shared(err: &Arc<ParcError>) -> Self {
        ParcError::Shared(Arc::clone(err))
    }

    /// Returns `true` for connection failures that the connect-retry
    /// loop may retry (the receiver accepts one client at a time, so
    /// refusal is expected and transient).
    pub fn is_transient_connect(&self) -> bool {
        match self {
            ParcError::Connection(e) => {
                matches!(e.kind(), std::io::ErrorKind::ConnectionRefused)
            }
            ParcError::Shared(inner) => inner.is_transient_connect(),
            _ => false,
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ParcError {
    fn from(s: String) -> Self {
        ParcError::Other(s)
    }
}

impl From<&str> for ParcError {
    fn from(s: &str) -> Self {
        ParcError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ParcError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ParcError::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for ParcError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ParcError::Timeout(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = ParcError::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = ParcError::PacketTooLong { len: 300, max: 256 };
        assert!(e.to_string().contains("300"));
        assert!(e.to_string().contains("256"));
    }

    #[test]
    fn discovery_error_names_the_device() {
        let e = ParcError::NoReceiverFound {
            name: Some("living-room".to_string()),
        };
        assert!(e.to_string().contains("living-room"));

        let e = ParcError::NoReceiverFound { name: None };
        assert_eq!(e.to_string(), "no receiver found");
    }

    #[test]
    fn from_string() {
        let e: ParcError = "something broke".into();
        assert!(matches!(e, ParcError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: ParcError = io_err.into();
        assert!(matches!(e, ParcError::Connection(_)));
    }

    #[test]
    fn transient_connect_detection() {
        let refused = ParcError::Connection(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(refused.is_transient_connect());

        let reset = ParcError::Connection(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(!reset.is_transient_connect());

        let shared = ParcError::shared(&Arc::new(refused));
        assert!(shared.is_transient_connect());
    }
}
