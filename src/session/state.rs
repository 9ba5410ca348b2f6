//! Connection lifecycle of a network session.

use std::fmt;

use log::{debug, info};

use crate::error::Network;

/// Where a session stands in its lifecycle.
///
/// ```text
/// Disconnected --ConnectRequested--> Connecting --Online--> Draining --Drained--> Connected
///      ^                                 |                     |                     |
///      +---------------Lost--------------+---------------------+---------------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no attempt in progress
    Disconnected,
    /// Waiting for the connection to come up
    Connecting,
    /// Connected, flushing queued items and resynchronizing
    Draining,
    /// Live, outbound items are sent directly
    Connected,
}

/// What happened to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    ConnectRequested,
    Online,
    Drained,
    Lost,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Draining => "draining",
            SessionState::Connected => "connected",
        };
        write!(f, "{}", name)
    }
}

impl SessionState {
    /// Returns the state reached after `event`.
    ///
    /// Events that make no sense in the current state leave it unchanged.
    pub fn on_event(self, event: SessionEvent) -> SessionState {
        match (self, event) {
            (SessionState::Disconnected, SessionEvent::ConnectRequested) => SessionState::Connecting,
            (SessionState::Connecting, SessionEvent::Online) => SessionState::Draining,
            (SessionState::Draining, SessionEvent::Drained) => SessionState::Connected,
            (_, SessionEvent::Lost) => SessionState::Disconnected,
            (state, _) => state,
        }
    }

    /// Whether outbound items can bypass the queue.
    pub fn is_live(self) -> bool {
        self == SessionState::Connected
    }
}

/// The state of one network session, with transitions logged.
#[derive(Debug)]
pub struct SessionMachine {
    network: Network,
    state: SessionState,
}

impl SessionMachine {
    pub fn new(network: Network) -> Self {
        SessionMachine {
            network,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Applies an event and returns the new state.
    pub fn handle(&mut self, event: SessionEvent) -> SessionState {
        let next = self.state.on_event(event);
        if next == self.state {
            debug!(
                "{} session ignores {:?} while {}",
                self.network, event, self.state
            );
        } else {
            info!("{} session {} -> {}", self.network, self.state, next);
            self.state = next;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nominal_lifecycle() {
        let mut machine = SessionMachine::new(Network::Xmpp);
        assert_eq!(machine.state(), SessionState::Disconnected);

        assert_eq!(
            machine.handle(SessionEvent::ConnectRequested),
            SessionState::Connecting
        );
        assert_eq!(machine.handle(SessionEvent::Online), SessionState::Draining);
        assert!(!machine.state().is_live());
        assert_eq!(machine.handle(SessionEvent::Drained), SessionState::Connected);
        assert!(machine.state().is_live());
    }

    #[test]
    fn test_lost_from_any_state() {
        for state in [
            SessionState::Disconnected,
            SessionState::Connecting,
            SessionState::Draining,
            SessionState::Connected,
        ] {
            assert_eq!(state.on_event(SessionEvent::Lost), SessionState::Disconnected);
        }
    }

    #[test]
    fn test_out_of_order_events_are_ignored() {
        assert_eq!(
            SessionState::Disconnected.on_event(SessionEvent::Online),
            SessionState::Disconnected
        );
        assert_eq!(
            SessionState::Connecting.on_event(SessionEvent::Drained),
            SessionState::Connecting
        );
        assert_eq!(
            SessionState::Connected.on_event(SessionEvent::ConnectRequested),
            SessionState::Connected
        );
    }

    #[test]
    fn test_reconnect_after_loss() {
        let mut machine = SessionMachine::new(Network::Matrix);
        machine.handle(SessionEvent::ConnectRequested);
        machine.handle(SessionEvent::Online);
        machine.handle(SessionEvent::Drained);
        machine.handle(SessionEvent::Lost);

        assert_eq!(
            machine.handle(SessionEvent::ConnectRequested),
            SessionState::Connecting
        );
    }
}
