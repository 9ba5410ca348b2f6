//! Error taxonomy of the bridge.
//!
//! Per-event errors ([`BridgeError::MalformedJid`], [`BridgeError::ProvisioningFailed`])
//! are logged and the event is dropped. Session errors
//! ([`BridgeError::NetworkDisconnected`]) drive the reconnect loops, and
//! [`BridgeError::ConfigInvalid`] stops the process before it starts.

use std::fmt;

use thiserror::Error;

/// The network a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Xmpp,
    Matrix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Xmpp => write!(f, "xmpp"),
            Network::Matrix => write!(f, "matrix"),
        }
    }
}

/// Errors raised by the mapping and synchronization engine.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The input could not be parsed as `local@domain[/resource]`.
    #[error("malformed jid `{0}`")]
    MalformedJid(String),

    /// Room creation kept failing after every retry.
    #[error("failed to provision room `{topic}` after {attempts} attempts: {reason}")]
    ProvisioningFailed {
        topic: String,
        attempts: u32,
        reason: String,
    },

    /// A protocol session lost its connection.
    #[error("{0} session disconnected")]
    NetworkDisconnected(Network),

    /// The configuration cannot be used to start the bridge.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// A Matrix request failed.
    #[error("matrix request failed: {0}")]
    Matrix(String),

    /// An XMPP request failed.
    #[error("xmpp request failed: {0}")]
    Xmpp(String),
}
