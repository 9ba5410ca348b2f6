//! Control room commands.
//!
//! Messages typed into the control room by anyone but the bridge are parsed
//! into commands and executed against both networks.
//!
//! # Flow
//!
//! ```text
//! Control room message
//!      │
//!      ▼
//! Commander::parse() ──► Command ──► Commander::parse_command() ──► CommandResult
//!                                            │
//!                                            ├── handle_help
//!                                            ├── handle_refresh
//!                                            ├── handle_purge
//!                                            ├── handle_join_muc
//!                                            └── handle_leave_muc
//! ```
//!
//! ## Available Commands
//!
//! | Command | Arguments | Description |
//! |---------|-----------|-------------|
//! | `help` | None | Display help information |
//! | `refresh` | None | Probe every contact and request the roster again |
//! | `purge` | None | Leave unmanaged rooms and rooms with less than two members |
//! | `joinmuc` | `<room_jid>` | Join a groupchat and bridge it |
//! | `leavemuc` | `<room_jid>` | Leave a groupchat and its room |
//!
//! Commands can be typed as bare words or prefixed with `!mxpp`.

mod actions;
mod command;
mod commander;
mod responses;

use crate::{filter::FilterPolicy, provisioner::RoomProvisioner, xmpp::XmppApi};

pub use crate::commands::commander::Commander;

/// Runtime context for command execution.
pub struct CommandContext<'a> {
    /// XMPP account of the bridge
    pub xmpp: &'a dyn XmppApi,
    /// Owner of the managed rooms
    pub provisioner: &'a RoomProvisioner,
    /// Gate for groupchats to join
    pub filter: &'a FilterPolicy,
    /// Nickname of the bridge in groupchats
    pub groupchat_nick: &'a str,
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Notice to post into the control room
    pub response: String,
}

/// Errors that can occur during command parsing.
///
/// * `NotForBot` - Message is not a command or is for a different bot.
///   Should be handled silently without responding to the user.
///
/// * `InvalidCommand` - Command syntax or arguments are invalid.
///   Contains a user-friendly error message to display.
#[derive(Debug)]
pub enum CommandParseError {
    /// Message is not for this bot (silent error)
    NotForBot,
    /// Invalid command syntax with error message
    InvalidCommand(String),
}
