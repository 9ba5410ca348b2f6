//! The correspondence between one XMPP entity and one Matrix room.

use std::fmt;

use crate::identity::NormalizedJid;

/// What a managed Matrix room stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappingKind {
    /// A roster contact chatted with one to one
    DirectContact,
    /// A multi-user chatroom
    Groupchat,
    /// The singleton room for status notices and operator commands
    ControlRoom,
    /// The singleton room mirroring every relayed message
    AllChatRoom,
}

/// Identity of a mapping in the store.
///
/// A JID maps to exactly one room whatever its kind; the two special rooms
/// have no JID counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappingKey {
    Jid(NormalizedJid),
    Control,
    AllChat,
}

impl MappingKey {
    /// Returns the JID of the key, if any.
    pub fn jid(&self) -> Option<&NormalizedJid> {
        match self {
            MappingKey::Jid(jid) => Some(jid),
            _ => None,
        }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKey::Jid(jid) => write!(f, "{}", jid),
            MappingKey::Control => write!(f, "control room"),
            MappingKey::AllChat => write!(f, "all-chat room"),
        }
    }
}

/// A managed Matrix room and the entity it represents.
///
/// The topic is the durable anchor of the mapping: scanning the topics of the
/// joined rooms at startup rebuilds the same mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMapping {
    /// Identity of the mapping
    pub key: MappingKey,
    /// Matrix room ID representing the entity
    pub matrix_room_id: String,
    /// Kind of entity represented by the room
    pub kind: MappingKind,
    /// Canonical topic of the room
    pub topic: String,
    /// Nickname used by the bridge inside a groupchat
    pub nick: Option<String>,
    /// Last known room name
    pub name: Option<String>,
}

impl ContactMapping {
    /// Returns the JID of the mapping, if it has one.
    pub fn jid(&self) -> Option<&NormalizedJid> {
        self.key.jid()
    }

    /// Whether this mapping is one of the two singleton rooms.
    pub fn is_special(&self) -> bool {
        matches!(
            self.kind,
            MappingKind::ControlRoom | MappingKind::AllChatRoom
        )
    }

    /// Name to show for the entity in notices.
    ///
    /// Falls back to the JID, or the topic for special rooms, when the room
    /// has no name.
    pub fn display_name(&self) -> String {
        match (&self.name, self.jid()) {
            (Some(name), _) => name.clone(),
            (None, Some(jid)) => jid.to_string(),
            (None, None) => self.topic.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::jid::normalize;

    fn create_mapping(name: Option<&str>) -> ContactMapping {
        ContactMapping {
            key: MappingKey::Jid(normalize("alice@example.com").unwrap()),
            matrix_room_id: "!alice:matrix.org".to_string(),
            kind: MappingKind::DirectContact,
            topic: "alice@example.com".to_string(),
            nick: None,
            name: name.map(str::to_owned),
        }
    }

    #[test]
    fn test_display_name_prefers_name() {
        assert_eq!(create_mapping(Some("Alice")).display_name(), "Alice");
        assert_eq!(create_mapping(None).display_name(), "alice@example.com");
    }

    #[test]
    fn test_is_special() {
        assert!(!create_mapping(None).is_special());

        let control = ContactMapping {
            key: MappingKey::Control,
            matrix_room_id: "!control:matrix.org".to_string(),
            kind: MappingKind::ControlRoom,
            topic: "control".to_string(),
            nick: None,
            name: None,
        };
        assert!(control.is_special());
        assert!(control.jid().is_none());
        assert_eq!(control.display_name(), "control");
    }
}
