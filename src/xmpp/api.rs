//! The operations the bridge needs from an XMPP account.

use std::fmt;

use async_trait::async_trait;
use mockall::automock;

use crate::error::BridgeError;

/// Type of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// One to one message
    Chat,
    /// Message to a multi-user chatroom
    Groupchat,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Chat => write!(f, "chat"),
            MessageKind::Groupchat => write!(f, "groupchat"),
        }
    }
}

/// XMPP side of the bridge.
///
/// JIDs are bare JIDs as produced by the identity normalizer.
#[automock]
#[async_trait]
pub trait XmppApi: Send + Sync {
    async fn send_message(&self, to: &str, body: &str, kind: MessageKind) -> Result<(), BridgeError>;

    /// Joins a groupchat under a nickname, without its history.
    async fn join_groupchat(&self, room: &str, nick: &str) -> Result<(), BridgeError>;

    async fn leave_groupchat(&self, room: &str, nick: &str) -> Result<(), BridgeError>;

    /// Accepts the subscription request of a contact.
    async fn accept_subscription(&self, jid: &str) -> Result<(), BridgeError>;

    /// Asks a contact for a subscription to their presence.
    async fn request_subscription(&self, jid: &str) -> Result<(), BridgeError>;

    async fn probe_presence(&self, jid: &str) -> Result<(), BridgeError>;

    /// Broadcasts the bridge's own availability.
    async fn send_presence(&self) -> Result<(), BridgeError>;

    async fn request_roster(&self) -> Result<(), BridgeError>;
}
