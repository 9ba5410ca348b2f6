//! Handle used by the bridge to talk to the XMPP session.

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;
use xmpp_parsers::Element;

use crate::{
    error::{BridgeError, Network},
    xmpp::{MessageKind, XmppApi, stanza},
};

/// Sends stanzas through the [`XmppSession`](crate::xmpp::XmppSession) owning the connection.
///
/// Stanzas given while the session is offline are queued by the session
/// and sent once it is back.
#[derive(Debug, Clone)]
pub struct XmppClient {
    outbound: mpsc::UnboundedSender<Element>,
}

impl XmppClient {
    pub fn new(outbound: mpsc::UnboundedSender<Element>) -> Self {
        XmppClient { outbound }
    }

    fn send(&self, stanza: Element) -> Result<(), BridgeError> {
        self.outbound
            .send(stanza)
            .map_err(|_| BridgeError::NetworkDisconnected(Network::Xmpp))
    }
}

#[async_trait]
impl XmppApi for XmppClient {
    async fn send_message(&self, to: &str, body: &str, kind: MessageKind) -> Result<(), BridgeError> {
        self.send(stanza::message(to, body, kind))
    }

    async fn join_groupchat(&self, room: &str, nick: &str) -> Result<(), BridgeError> {
        debug!("joining groupchat {} as {}", room, nick);
        self.send(stanza::join_groupchat(room, nick))
    }

    async fn leave_groupchat(&self, room: &str, nick: &str) -> Result<(), BridgeError> {
        debug!("leaving groupchat {}", room);
        self.send(stanza::leave_groupchat(room, nick))
    }

    async fn accept_subscription(&self, jid: &str) -> Result<(), BridgeError> {
        self.send(stanza::directed_presence(jid, "subscribed"))
    }

    async fn request_subscription(&self, jid: &str) -> Result<(), BridgeError> {
        self.send(stanza::directed_presence(jid, "subscribe"))
    }

    async fn probe_presence(&self, jid: &str) -> Result<(), BridgeError> {
        self.send(stanza::directed_presence(jid, "probe"))
    }

    async fn send_presence(&self) -> Result<(), BridgeError> {
        self.send(stanza::available())
    }

    async fn request_roster(&self) -> Result<(), BridgeError> {
        self.send(stanza::roster_request())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stanzas_are_forwarded() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let client = XmppClient::new(sender);

        client
            .send_message("alice@example.com", "hi", MessageKind::Chat)
            .await
            .unwrap();
        client.accept_subscription("bob@example.com").await.unwrap();

        let message = receiver.recv().await.unwrap();
        assert!(message.is("message", "jabber:client"));
        let presence = receiver.recv().await.unwrap();
        assert_eq!(presence.attr("type"), Some("subscribed"));
        assert_eq!(presence.attr("to"), Some("bob@example.com"));
    }

    #[tokio::test]
    async fn test_closed_session() {
        let (sender, receiver) = mpsc::unbounded_channel();
        drop(receiver);
        let client = XmppClient::new(sender);

        assert!(matches!(
            client.send_presence().await,
            Err(BridgeError::NetworkDisconnected(Network::Xmpp))
        ));
    }
}
