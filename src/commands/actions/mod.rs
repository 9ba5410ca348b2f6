//! Command action handlers.
//!
//! Each handler receives a [`CommandContext`](crate::commands::CommandContext),
//! acts on the networks and returns a [`CommandResult`](crate::commands::CommandResult)
//! holding the notice for the control room. Failures are reported in that
//! notice rather than returned.

mod help;
mod muc;
mod purge;
mod refresh;

pub use crate::commands::actions::{
    help::handle_help,
    muc::{handle_join_muc, handle_leave_muc},
    purge::handle_purge,
    refresh::handle_refresh,
};
