//! Events delivered by the XMPP session.

/// Availability carried by a presence stanza.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Available,
    Unavailable,
}

/// One contact of the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterItem {
    /// Raw JID as sent by the server
    pub jid: String,
    /// Nickname given to the contact, if any
    pub name: Option<String>,
    /// Whether the server is removing the contact from the roster
    pub removed: bool,
}

/// Something that happened on the XMPP side.
///
/// Addresses are raw strings: they are normalized, and rejected when
/// malformed, by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmppEvent {
    /// The session is (again) online
    Connected,
    /// A one to one message
    Message { from: String, body: String },
    /// A message in a groupchat, `from` being `room@service/nick`
    GroupchatMessage { from: String, body: String },
    Presence { from: String, state: PresenceState },
    /// A contact asks to see the presence of the bridge account
    SubscriptionRequest { from: String },
    /// A roster result or push
    Roster(Vec<RosterItem>),
}
