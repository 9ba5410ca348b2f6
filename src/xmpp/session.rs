//! The connection to the XMPP server and its reconnect loop.
//!
//! [`XmppSession::run`] owns the `tokio-xmpp` client. Incoming stanzas are
//! parsed and forwarded, in order, as [`XmppEvent`]s. Outgoing stanzas come
//! from the [`XmppClient`] handles through a channel and are written to the
//! connection when it is live, queued otherwise. A lost connection is
//! retried forever with an exponential backoff.

use std::time::Duration;

use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_xmpp::{AsyncClient, AsyncConfig, AsyncServerConfig, Event, Packet};
use xmpp_parsers::{Element, Jid};

use crate::{
    error::{BridgeError, Network},
    identity::jid::{self, NormalizedJid},
    session::{Backoff, OutboundQueue, SessionEvent, SessionMachine},
    xmpp::{XmppClient, XmppEvent, stanza},
};

/// Connection settings of the XMPP session.
#[derive(Debug, Clone)]
pub struct XmppSessionOptions {
    pub jid: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    /// Stanzas kept while offline
    pub queue_capacity: usize,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
}

/// Why a connection stopped being served.
#[derive(Debug, PartialEq, Eq)]
enum Disconnect {
    /// Connection lost, try again
    Lost,
    /// The bridge is stopping
    Shutdown,
}

/// Decides whether an outgoing stanza goes to the wire or to the queue.
#[derive(Debug)]
struct Outbox {
    machine: SessionMachine,
    queue: OutboundQueue<Element>,
}

impl Outbox {
    fn new(capacity: usize) -> Self {
        Outbox {
            machine: SessionMachine::new(Network::Xmpp),
            queue: OutboundQueue::new(capacity),
        }
    }

    /// Returns the stanza back when it can be sent right away.
    fn submit(&mut self, stanza: Element) -> Option<Element> {
        if self.machine.state().is_live() {
            return Some(stanza);
        }
        debug!("xmpp session {}, queueing stanza", self.machine.state());
        self.requeue(stanza);
        None
    }

    fn requeue(&mut self, stanza: Element) {
        if self.queue.push(stanza).is_some() {
            debug!(
                "{} stanzas dropped since the bridge started",
                self.queue.dropped()
            );
        }
    }

    fn on_connecting(&mut self) {
        self.machine.handle(SessionEvent::ConnectRequested);
    }

    /// Returns the queued stanzas to flush, oldest first.
    fn on_online(&mut self) -> Vec<Element> {
        self.machine.handle(SessionEvent::Online);
        self.queue.drain()
    }

    fn on_drained(&mut self) {
        self.machine.handle(SessionEvent::Drained);
    }

    fn on_lost(&mut self) {
        self.machine.handle(SessionEvent::Lost);
    }
}

/// Owner of the XMPP connection.
pub struct XmppSession {
    jid: Jid,
    /// Bare JID of the account, the only sender trusted with the roster
    account: NormalizedJid,
    options: XmppSessionOptions,
    outbox: Outbox,
    backoff: Backoff,
    outbound: mpsc::UnboundedReceiver<Element>,
    events: mpsc::Sender<XmppEvent>,
}

impl XmppSession {
    /// Creates the session and the client handle feeding it.
    ///
    /// Incoming events are sent to `events`. The session stops once every
    /// [`XmppClient`] is dropped, or once `events` is closed.
    pub fn new(
        options: XmppSessionOptions,
        events: mpsc::Sender<XmppEvent>,
    ) -> Result<(Self, XmppClient), BridgeError> {
        let jid: Jid = options
            .jid
            .parse()
            .map_err(|e| BridgeError::ConfigInvalid(format!("xmpp login jid: {}", e)))?;
        let account = jid::normalize(&options.jid)
            .map_err(|e| BridgeError::ConfigInvalid(format!("xmpp login jid: {}", e)))?;
        let (sender, outbound) = mpsc::unbounded_channel();

        let session = XmppSession {
            jid,
            account,
            outbox: Outbox::new(options.queue_capacity),
            backoff: Backoff::new(options.reconnect_delay, options.max_reconnect_delay),
            options,
            outbound,
            events,
        };
        Ok((session, XmppClient::new(sender)))
    }

    /// Connects, serves and reconnects until the bridge stops.
    pub async fn run(mut self) {
        loop {
            self.outbox.on_connecting();
            info!(
                "connecting to xmpp server {}:{} as {}",
                self.options.host, self.options.port, self.jid
            );

            let mut client = AsyncClient::new_with_config(AsyncConfig {
                jid: self.jid.clone(),
                password: self.options.password.clone(),
                server: AsyncServerConfig::Manual {
                    host: self.options.host.clone(),
                    port: self.options.port,
                },
            });
            client.set_reconnect(false);

            let disconnect = self.serve(&mut client).await;
            let was_live = self.outbox.machine.state().is_live();
            self.outbox.on_lost();

            if disconnect == Disconnect::Shutdown {
                info!("closing xmpp session");
                if was_live && let Err(e) = client.send(Packet::StreamEnd).await {
                    debug!("failed to close xmpp stream: {}", e);
                }
                return;
            }

            let delay = self.backoff.next_delay();
            warn!(
                "{}, reconnecting in {:?} (attempt {})",
                BridgeError::NetworkDisconnected(Network::Xmpp),
                delay,
                self.backoff.attempts()
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn serve<C>(&mut self, client: &mut C) -> Disconnect
    where
        C: Stream<Item = Event> + Sink<Packet, Error = tokio_xmpp::Error> + Unpin,
    {
        loop {
            tokio::select! {
                event = client.next() => match event {
                    Some(Event::Online { bound_jid, .. }) => {
                        info!("xmpp session online as {}", bound_jid);
                        self.backoff.reset();
                        if let Some(disconnect) = self.flush(client).await {
                            return disconnect;
                        }
                        if self.events.send(XmppEvent::Connected).await.is_err() {
                            return Disconnect::Shutdown;
                        }
                    }
                    Some(Event::Stanza(element)) => {
                        if stanza::is_foreign_roster(&element, &self.account) {
                            warn!("ignoring roster stanza from {:?}", element.attr("from"));
                            continue;
                        }
                        if let Some(ack) = stanza::roster_push_ack(&element)
                            && let Err(e) = client.send(Packet::Stanza(ack)).await
                        {
                            error!("failed to acknowledge roster push: {}", e);
                            return Disconnect::Lost;
                        }
                        if let Some(event) = stanza::parse(&element)
                            && self.events.send(event).await.is_err()
                        {
                            return Disconnect::Shutdown;
                        }
                    }
                    Some(Event::Disconnected(e)) => {
                        warn!("xmpp connection lost: {}", e);
                        return Disconnect::Lost;
                    }
                    None => return Disconnect::Lost,
                },
                element = self.outbound.recv() => match element {
                    Some(element) => {
                        let Some(element) = self.outbox.submit(element) else {
                            continue;
                        };
                        if let Err(e) = client.send(Packet::Stanza(element.clone())).await {
                            error!("failed to send stanza: {}", e);
                            self.outbox.requeue(element);
                            return Disconnect::Lost;
                        }
                    }
                    None => return Disconnect::Shutdown,
                },
            }
        }
    }

    /// Sends the stanzas queued while offline.
    ///
    /// On failure the unsent stanzas go back to the queue, in order.
    async fn flush<C>(&mut self, client: &mut C) -> Option<Disconnect>
    where
        C: Sink<Packet, Error = tokio_xmpp::Error> + Unpin,
    {
        let queued = self.outbox.on_online();
        if !queued.is_empty() {
            info!("sending {} stanzas queued while offline", queued.len());
        }

        let mut pending = queued.into_iter();
        while let Some(element) = pending.next() {
            if let Err(e) = client.send(Packet::Stanza(element.clone())).await {
                error!("failed to send queued stanza: {}", e);
                self.outbox.requeue(element);
                pending.for_each(|element| self.outbox.requeue(element));
                return Some(Disconnect::Lost);
            }
        }

        self.outbox.on_drained();
        None
    }
}

#[cfg(test)]
mod tests {
    use crate::{session::SessionState, xmpp::MessageKind};

    use super::*;

    fn create_test_stanza(body: &str) -> Element {
        stanza::message("alice@example.com", body, MessageKind::Chat)
    }

    fn create_test_options(jid: &str) -> XmppSessionOptions {
        XmppSessionOptions {
            jid: jid.to_string(),
            password: "secret".to_string(),
            host: "xmpp.example.com".to_string(),
            port: 5222,
            queue_capacity: 2,
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_outbox_queues_while_offline() {
        let mut outbox = Outbox::new(10);

        assert!(outbox.submit(create_test_stanza("one")).is_none());
        outbox.on_connecting();
        assert!(outbox.submit(create_test_stanza("two")).is_none());

        let queued = outbox.on_online();
        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0], create_test_stanza("one"));
        assert_eq!(outbox.machine.state(), SessionState::Draining);

        // Still draining, new stanzas wait their turn
        assert!(outbox.submit(create_test_stanza("three")).is_none());

        outbox.on_drained();
        assert_eq!(outbox.machine.state(), SessionState::Connected);
        assert!(outbox.submit(create_test_stanza("four")).is_some());
    }

    #[test]
    fn test_outbox_drops_oldest_when_full() {
        let mut outbox = Outbox::new(2);

        outbox.submit(create_test_stanza("one"));
        outbox.submit(create_test_stanza("two"));
        outbox.submit(create_test_stanza("three"));

        outbox.on_connecting();
        let queued = outbox.on_online();
        assert_eq!(
            queued,
            vec![create_test_stanza("two"), create_test_stanza("three")]
        );
    }

    #[test]
    fn test_outbox_lost_connection_queues_again() {
        let mut outbox = Outbox::new(10);
        outbox.on_connecting();
        outbox.on_online();
        outbox.on_drained();

        outbox.on_lost();

        assert_eq!(outbox.machine.state(), SessionState::Disconnected);
        assert!(outbox.submit(create_test_stanza("late")).is_none());
    }

    #[test]
    fn test_new_session() {
        let (events, _receiver) = mpsc::channel(8);

        let (session, _client) =
            XmppSession::new(create_test_options("bot@example.com"), events).unwrap();

        assert_eq!(session.jid.to_string(), "bot@example.com");
        assert_eq!(session.account.as_str(), "bot@example.com");
        assert_eq!(session.outbox.machine.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_new_session_invalid_jid() {
        let (events, _receiver) = mpsc::channel(8);

        assert!(matches!(
            XmppSession::new(create_test_options(""), events),
            Err(BridgeError::ConfigInvalid(_))
        ));
    }
}
