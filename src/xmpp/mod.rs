//! XMPP side of the bridge.
//!
//! The [`XmppSession`] owns the connection to the server, the
//! [`XmppClient`] is the [`XmppApi`] handle the rest of the bridge uses to
//! send stanzas through it, and [`XmppEvent`]s carry what the server sends
//! back.

mod api;
mod client;
mod event;
mod session;
mod stanza;

pub use crate::xmpp::{
    api::{MessageKind, XmppApi},
    client::XmppClient,
    event::{PresenceState, RosterItem, XmppEvent},
    session::{XmppSession, XmppSessionOptions},
};

#[cfg(test)]
pub use crate::xmpp::api::MockXmppApi;
