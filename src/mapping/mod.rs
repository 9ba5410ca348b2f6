//! Persistent correspondence between XMPP entities and Matrix rooms.
//!
//! - [`ContactMapping`]: one managed room and the entity it represents
//! - [`MappingStore`]: the shared table of mappings, single write path for new rooms
//! - [`RoomTopicIndex`]: reverse lookups by topic and room ID, derived from the store
//!
//! Mappings are not written to disk: the topic of each managed room is the
//! durable record, and the store is rebuilt from the joined rooms at startup.

mod contact_mapping;
mod mapping_store;
mod topic_index;

pub use crate::mapping::{
    contact_mapping::{ContactMapping, MappingKey, MappingKind},
    mapping_store::MappingStore,
    topic_index::RoomTopicIndex,
};
