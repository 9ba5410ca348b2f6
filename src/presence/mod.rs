//! Presence and roster synchronization.

mod presence_sync;
mod roster;

pub use crate::presence::{
    presence_sync::{PresenceOptions, PresenceSync},
    roster::RosterDirectory,
};
