//! Matrix room lifecycle of the bridge.
//!
//! - [`RoomProvisioner`]: creates, discovers and maintains managed rooms
//! - [`InviteRoster`]: the users that must be members of every managed room

mod invite_roster;
mod room_provisioner;

pub use crate::provisioner::{
    invite_roster::InviteRoster,
    room_provisioner::{ProvisionerOptions, RoomProvisioner},
};
