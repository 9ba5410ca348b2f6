//! Identity normalization for XMPP addresses and Matrix room topics.
//!
//! - [`jid`] parses and canonicalizes JIDs into [`NormalizedJid`] keys
//! - [`topic`] encodes mappings into room topics and recognizes them back

pub mod jid;
pub mod topic;

pub use crate::identity::jid::{NormalizedJid, ParsedJid};
pub use crate::identity::topic::TopicCodec;
