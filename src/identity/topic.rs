//! Room topic encoding.
//!
//! The topic of a managed room is its identity anchor: a raw JID for direct
//! contacts, the groupchat flag followed by the room JID for groupchats, and
//! a fixed sentinel for the control and all-chat rooms.

use crate::{
    identity::jid::{self, JID_ILLEGAL_CHARS, NormalizedJid},
    mapping::{MappingKey, MappingKind},
};

/// Encodes and decodes the topics of managed rooms.
#[derive(Debug, Clone)]
pub struct TopicCodec {
    /// Prefix of groupchat topics
    groupchat_flag: String,
    /// Topic of the control room
    control_topic: String,
    /// Topic of the all-chat room
    all_chat_topic: String,
}

impl TopicCodec {
    /// Creates a codec from the configured flag and sentinels.
    pub fn new(groupchat_flag: &str, control_topic: &str, all_chat_topic: &str) -> Self {
        TopicCodec {
            groupchat_flag: groupchat_flag.to_owned(),
            control_topic: control_topic.to_owned(),
            all_chat_topic: all_chat_topic.to_owned(),
        }
    }

    /// Whether the flag can be told apart from a JID.
    ///
    /// A flag that reads as the beginning of a bare JID, a local part
    /// optionally followed by `@` and the start of a domain, could be the
    /// beginning of a contact topic.
    pub fn is_unambiguous_flag(groupchat_flag: &str) -> bool {
        if groupchat_flag.is_empty() {
            return false;
        }

        let (local, domain) = groupchat_flag
            .split_once('@')
            .unwrap_or((groupchat_flag, ""));
        // Contact topics never start with `@`
        if local.is_empty() {
            return true;
        }

        local.contains(JID_ILLEGAL_CHARS)
            || local.chars().any(char::is_whitespace)
            || domain.contains(['@', '/'])
            || domain.chars().any(char::is_whitespace)
    }

    /// Returns the prefix of groupchat topics.
    pub fn groupchat_flag(&self) -> &str {
        &self.groupchat_flag
    }

    /// Whether the topic designates a groupchat room.
    pub fn is_groupchat_topic(&self, topic: &str) -> bool {
        topic.starts_with(&self.groupchat_flag)
    }

    /// Extracts the room JID of a groupchat topic.
    ///
    /// Returns `None` when the topic is not a groupchat topic or when the
    /// remainder is not a valid JID.
    pub fn jid_from_groupchat_topic(&self, topic: &str) -> Option<NormalizedJid> {
        let room_jid = topic.strip_prefix(&self.groupchat_flag)?;
        jid::normalize(room_jid).ok()
    }

    /// Returns the canonical topic of a mapping.
    pub fn topic_for(&self, key: &MappingKey, kind: MappingKind) -> String {
        match (key, kind) {
            (MappingKey::Control, _) => self.control_topic.clone(),
            (MappingKey::AllChat, _) => self.all_chat_topic.clone(),
            (MappingKey::Jid(jid), MappingKind::Groupchat) => {
                format!("{}{}", self.groupchat_flag, jid)
            }
            (MappingKey::Jid(jid), _) => jid.to_string(),
        }
    }

    /// Recognizes the mapping a topic stands for.
    ///
    /// Direct contact topics must be a bare canonical JID: a topic carrying a
    /// resource or a differently cased domain is not one the bridge wrote, so
    /// the room stays unmanaged.
    pub fn classify(&self, topic: &str) -> Option<(MappingKey, MappingKind)> {
        if topic == self.control_topic {
            return Some((MappingKey::Control, MappingKind::ControlRoom));
        }
        if topic == self.all_chat_topic {
            return Some((MappingKey::AllChat, MappingKind::AllChatRoom));
        }
        if self.is_groupchat_topic(topic) {
            let jid = self.jid_from_groupchat_topic(topic)?;
            if self.topic_for(&MappingKey::Jid(jid.clone()), MappingKind::Groupchat) != topic {
                return None;
            }
            return Some((MappingKey::Jid(jid), MappingKind::Groupchat));
        }

        let jid = jid::normalize(topic).ok()?;
        if jid.as_str() != topic {
            return None;
        }
        Some((MappingKey::Jid(jid), MappingKind::DirectContact))
    }
}
