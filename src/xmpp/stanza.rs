//! Building and reading the stanzas exchanged with the XMPP server.

use log::debug;
use xmpp_parsers::Element;

use crate::{
    identity::jid::{self, NormalizedJid},
    xmpp::{MessageKind, PresenceState, RosterItem, XmppEvent},
};

const NS_CLIENT: &str = "jabber:client";
const NS_ROSTER: &str = "jabber:iq:roster";
const NS_MUC: &str = "http://jabber.org/protocol/muc";

/// Id of the roster requests sent by the bridge.
pub const ROSTER_REQUEST_ID: &str = "mxpp-roster";

pub fn message(to: &str, body: &str, kind: MessageKind) -> Element {
    Element::builder("message", NS_CLIENT)
        .attr("to", to)
        .attr("type", kind.to_string())
        .append(Element::builder("body", NS_CLIENT).append(body).build())
        .build()
}

/// Presence without addressee, broadcast to the subscribed contacts.
pub fn available() -> Element {
    Element::builder("presence", NS_CLIENT).build()
}

/// Presence of a given type sent to a single entity (`subscribed`, `subscribe`, `probe`).
pub fn directed_presence(to: &str, presence_type: &str) -> Element {
    Element::builder("presence", NS_CLIENT)
        .attr("to", to)
        .attr("type", presence_type)
        .build()
}

/// Joins `room` as `nick`, asking for no history.
pub fn join_groupchat(room: &str, nick: &str) -> Element {
    let history = Element::builder("history", NS_MUC)
        .attr("maxstanzas", "0")
        .build();
    Element::builder("presence", NS_CLIENT)
        .attr("to", format!("{}/{}", room, nick))
        .append(Element::builder("x", NS_MUC).append(history).build())
        .build()
}

pub fn leave_groupchat(room: &str, nick: &str) -> Element {
    Element::builder("presence", NS_CLIENT)
        .attr("to", format!("{}/{}", room, nick))
        .attr("type", "unavailable")
        .build()
}

pub fn roster_request() -> Element {
    Element::builder("iq", NS_CLIENT)
        .attr("id", ROSTER_REQUEST_ID)
        .attr("type", "get")
        .append(Element::builder("query", NS_ROSTER).build())
        .build()
}

/// Returns the acknowledgement owed for a roster push, if `stanza` is one.
pub fn roster_push_ack(stanza: &Element) -> Option<Element> {
    if !stanza.is("iq", NS_CLIENT)
        || stanza.attr("type") != Some("set")
        || !stanza.has_child("query", NS_ROSTER)
    {
        return None;
    }

    let mut ack = Element::builder("iq", NS_CLIENT).attr("type", "result");
    if let Some(id) = stanza.attr("id") {
        ack = ack.attr("id", id);
    }
    Some(ack.build())
}

/// Whether `stanza` is a roster iq sent by someone else than the server of
/// `account`.
///
/// Only the server, which omits `from` or uses the bare JID of the account,
/// may push or return the roster.
pub fn is_foreign_roster(stanza: &Element, account: &NormalizedJid) -> bool {
    if !stanza.is("iq", NS_CLIENT) || !stanza.has_child("query", NS_ROSTER) {
        return false;
    }

    match stanza.attr("from") {
        None => false,
        Some(from) => jid::parse(from)
            .map(|from| from.resource.is_some() || &from.bare != account)
            .unwrap_or(true),
    }
}

/// Translates an incoming stanza into a bridge event.
///
/// Stanzas the bridge has no use for (errors, bodiless messages, other
/// queries) give `None`.
pub fn parse(stanza: &Element) -> Option<XmppEvent> {
    if stanza.is("message", NS_CLIENT) {
        parse_message(stanza)
    } else if stanza.is("presence", NS_CLIENT) {
        parse_presence(stanza)
    } else if stanza.is("iq", NS_CLIENT) {
        parse_roster(stanza)
    } else {
        debug!("ignoring stanza {}", stanza.name());
        None
    }
}

fn parse_message(stanza: &Element) -> Option<XmppEvent> {
    let from = stanza.attr("from")?.to_string();
    let body = stanza.get_child("body", NS_CLIENT)?.text();
    if body.is_empty() {
        return None;
    }

    match stanza.attr("type") {
        Some("groupchat") => Some(XmppEvent::GroupchatMessage { from, body }),
        Some("error") => {
            debug!("ignoring error message from {}", from);
            None
        }
        _ => Some(XmppEvent::Message { from, body }),
    }
}

fn parse_presence(stanza: &Element) -> Option<XmppEvent> {
    let from = stanza.attr("from")?.to_string();

    match stanza.attr("type") {
        None => Some(XmppEvent::Presence {
            from,
            state: PresenceState::Available,
        }),
        Some("unavailable") => Some(XmppEvent::Presence {
            from,
            state: PresenceState::Unavailable,
        }),
        Some("subscribe") => Some(XmppEvent::SubscriptionRequest { from }),
        Some(other) => {
            debug!("ignoring {} presence from {}", other, from);
            None
        }
    }
}

fn parse_roster(stanza: &Element) -> Option<XmppEvent> {
    match stanza.attr("type") {
        Some("result") | Some("set") => {}
        _ => return None,
    }
    let query = stanza.get_child("query", NS_ROSTER)?;

    let items = query
        .children()
        .filter(|child| child.is("item", NS_ROSTER))
        .filter_map(|item| {
            let jid = item.attr("jid")?.to_string();
            Some(RosterItem {
                jid,
                name: item
                    .attr("name")
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                removed: item.attr("subscription") == Some("remove"),
            })
        })
        .collect();

    Some(XmppEvent::Roster(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_stanza(xml: &str) -> Element {
        xml.parse().unwrap()
    }

    #[test]
    fn test_message() {
        let stanza = message("alice@example.com", "hi", MessageKind::Chat);

        assert!(stanza.is("message", NS_CLIENT));
        assert_eq!(stanza.attr("to"), Some("alice@example.com"));
        assert_eq!(stanza.attr("type"), Some("chat"));
        assert_eq!(stanza.get_child("body", NS_CLIENT).unwrap().text(), "hi");
    }

    #[test]
    fn test_groupchat_message() {
        let stanza = message("room@conf.example.com", "hi all", MessageKind::Groupchat);

        assert_eq!(stanza.attr("type"), Some("groupchat"));
    }

    #[test]
    fn test_join_groupchat() {
        let stanza = join_groupchat("room@conf.example.com", "bridge");

        assert_eq!(stanza.attr("to"), Some("room@conf.example.com/bridge"));
        assert_eq!(stanza.attr("type"), None);
        let history = stanza
            .get_child("x", NS_MUC)
            .unwrap()
            .get_child("history", NS_MUC)
            .unwrap();
        assert_eq!(history.attr("maxstanzas"), Some("0"));
    }

    #[test]
    fn test_leave_groupchat() {
        let stanza = leave_groupchat("room@conf.example.com", "bridge");

        assert_eq!(stanza.attr("to"), Some("room@conf.example.com/bridge"));
        assert_eq!(stanza.attr("type"), Some("unavailable"));
    }

    #[test]
    fn test_directed_presence() {
        let stanza = directed_presence("alice@example.com", "subscribed");

        assert_eq!(stanza.attr("to"), Some("alice@example.com"));
        assert_eq!(stanza.attr("type"), Some("subscribed"));
    }

    #[test]
    fn test_parse_chat_message() {
        let stanza = create_test_stanza(
            "<message xmlns='jabber:client' from='alice@example.com/phone' type='chat'><body>hello</body></message>",
        );

        assert_eq!(
            parse(&stanza),
            Some(XmppEvent::Message {
                from: "alice@example.com/phone".to_string(),
                body: "hello".to_string()
            })
        );
    }

    #[test]
    fn test_parse_message_without_type_is_chat() {
        let stanza = create_test_stanza(
            "<message xmlns='jabber:client' from='alice@example.com'><body>hello</body></message>",
        );

        assert!(matches!(parse(&stanza), Some(XmppEvent::Message { .. })));
    }

    #[test]
    fn test_parse_groupchat_message() {
        let stanza = create_test_stanza(
            "<message xmlns='jabber:client' from='room@conf.example.com/carol' type='groupchat'><body>hey</body></message>",
        );

        assert_eq!(
            parse(&stanza),
            Some(XmppEvent::GroupchatMessage {
                from: "room@conf.example.com/carol".to_string(),
                body: "hey".to_string()
            })
        );
    }

    #[test]
    fn test_parse_message_ignored() {
        // Chat state notification
        let no_body = create_test_stanza(
            "<message xmlns='jabber:client' from='alice@example.com' type='chat'><composing xmlns='http://jabber.org/protocol/chatstates'/></message>",
        );
        let error = create_test_stanza(
            "<message xmlns='jabber:client' from='alice@example.com' type='error'><body>hello</body></message>",
        );
        let no_from = create_test_stanza(
            "<message xmlns='jabber:client' type='chat'><body>hello</body></message>",
        );

        assert_eq!(parse(&no_body), None);
        assert_eq!(parse(&error), None);
        assert_eq!(parse(&no_from), None);
    }

    #[test]
    fn test_parse_presences() {
        let available =
            create_test_stanza("<presence xmlns='jabber:client' from='alice@example.com/phone'/>");
        let unavailable = create_test_stanza(
            "<presence xmlns='jabber:client' from='alice@example.com/phone' type='unavailable'/>",
        );
        let subscribe = create_test_stanza(
            "<presence xmlns='jabber:client' from='bob@example.com' type='subscribe'/>",
        );
        let subscribed = create_test_stanza(
            "<presence xmlns='jabber:client' from='bob@example.com' type='subscribed'/>",
        );

        assert_eq!(
            parse(&available),
            Some(XmppEvent::Presence {
                from: "alice@example.com/phone".to_string(),
                state: PresenceState::Available
            })
        );
        assert_eq!(
            parse(&unavailable),
            Some(XmppEvent::Presence {
                from: "alice@example.com/phone".to_string(),
                state: PresenceState::Unavailable
            })
        );
        assert_eq!(
            parse(&subscribe),
            Some(XmppEvent::SubscriptionRequest {
                from: "bob@example.com".to_string()
            })
        );
        assert_eq!(parse(&subscribed), None);
    }

    #[test]
    fn test_parse_roster_result() {
        let stanza = create_test_stanza(
            "<iq xmlns='jabber:client' id='mxpp-roster' type='result'>\
               <query xmlns='jabber:iq:roster'>\
                 <item jid='alice@example.com' name='Alice' subscription='both'/>\
                 <item jid='bob@example.com' name='' subscription='to'/>\
               </query>\
             </iq>",
        );

        assert_eq!(
            parse(&stanza),
            Some(XmppEvent::Roster(vec![
                RosterItem {
                    jid: "alice@example.com".to_string(),
                    name: Some("Alice".to_string()),
                    removed: false
                },
                RosterItem {
                    jid: "bob@example.com".to_string(),
                    name: None,
                    removed: false
                },
            ]))
        );
    }

    #[test]
    fn test_parse_roster_push_removal() {
        let stanza = create_test_stanza(
            "<iq xmlns='jabber:client' id='push1' type='set'>\
               <query xmlns='jabber:iq:roster'>\
                 <item jid='alice@example.com' subscription='remove'/>\
               </query>\
             </iq>",
        );

        assert_eq!(
            parse(&stanza),
            Some(XmppEvent::Roster(vec![RosterItem {
                jid: "alice@example.com".to_string(),
                name: None,
                removed: true
            }]))
        );

        let ack = roster_push_ack(&stanza).unwrap();
        assert_eq!(ack.attr("type"), Some("result"));
        assert_eq!(ack.attr("id"), Some("push1"));
    }

    #[test]
    fn test_roster_from_other_entities_is_foreign() {
        let account = jid::normalize("bot@x.com").unwrap();
        let push = |from: &str| {
            create_test_stanza(&format!(
                "<iq xmlns='jabber:client' id='push2' type='set'{}>\
                   <query xmlns='jabber:iq:roster'>\
                     <item jid='mallory@evil.com' name='Alice'/>\
                   </query>\
                 </iq>",
                from
            ))
        };

        assert!(!is_foreign_roster(&push(""), &account));
        assert!(!is_foreign_roster(&push(" from='bot@x.com'"), &account));
        assert!(is_foreign_roster(&push(" from='mallory@evil.com'"), &account));
        assert!(is_foreign_roster(&push(" from='bot@x.com/phone'"), &account));
        assert!(is_foreign_roster(&push(" from='not a jid'"), &account));

        let message = create_test_stanza(
            "<message xmlns='jabber:client' from='alice@example.com'><body>hi</body></message>",
        );
        assert!(!is_foreign_roster(&message, &account));
    }

    #[test]
    fn test_roster_push_ack_only_for_pushes() {
        let result = create_test_stanza(
            "<iq xmlns='jabber:client' id='mxpp-roster' type='result'><query xmlns='jabber:iq:roster'/></iq>",
        );
        let ping = create_test_stanza(
            "<iq xmlns='jabber:client' id='p' type='get'><ping xmlns='urn:xmpp:ping'/></iq>",
        );

        assert!(roster_push_ack(&result).is_none());
        assert!(roster_push_ack(&ping).is_none());
        assert_eq!(parse(&ping), None);
    }

    #[test]
    fn test_roster_request() {
        let stanza = roster_request();

        assert_eq!(stanza.attr("type"), Some("get"));
        assert_eq!(stanza.attr("id"), Some(ROSTER_REQUEST_ID));
        assert!(stanza.has_child("query", NS_ROSTER));
    }
}
