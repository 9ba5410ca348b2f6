//! Reverse lookups of the mapping store.

use std::collections::HashMap;

use crate::mapping::{ContactMapping, MappingKey};

/// Reverse lookup from room topic and room ID to mapping key.
///
/// The index is a denormalized view of the mappings, kept in step with them
/// by the mapping store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RoomTopicIndex {
    /// Topic to key
    by_topic: HashMap<String, MappingKey>,
    /// Room ID to key
    by_room: HashMap<String, MappingKey>,
}

impl RoomTopicIndex {
    /// Indexes a mapping.
    pub fn insert(&mut self, mapping: &ContactMapping) {
        self.by_topic
            .insert(mapping.topic.clone(), mapping.key.clone());
        self.by_room
            .insert(mapping.matrix_room_id.clone(), mapping.key.clone());
    }

    /// Removes a mapping from the index.
    pub fn remove(&mut self, mapping: &ContactMapping) {
        self.by_topic.remove(&mapping.topic);
        self.by_room.remove(&mapping.matrix_room_id);
    }

    /// Key of the room with this topic.
    pub fn by_topic(&self, topic: &str) -> Option<&MappingKey> {
        self.by_topic.get(topic)
    }

    /// Key of the room with this ID.
    pub fn by_room(&self, room_id: &str) -> Option<&MappingKey> {
        self.by_room.get(room_id)
    }
}
