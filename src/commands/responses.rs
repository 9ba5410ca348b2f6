//! Texts posted into the control room.

use crate::error::BridgeError;

/// Formats the help message showing the control commands.
pub fn format_help() -> String {
    "Commands (optionally prefixed with `!mxpp`):\n\
        - `refresh`: probe the presence of every contact and reload the roster\n\
        - `purge`: leave the rooms that are not bridged or have nobody left\n\
        - `joinmuc <room_jid>`: join a groupchat and bridge it into a new room\n\
        - `leavemuc <room_jid>`: leave a groupchat and its room\n\
        - `help`: show this help message"
        .to_owned()
}

pub fn format_unknown_command() -> String {
    "Unknown command. Type `help` for more information.".to_owned()
}

pub fn format_invalid_joinmuc() -> String {
    "Invalid joinmuc command. Usage: `joinmuc <room_jid>`".to_owned()
}

pub fn format_invalid_leavemuc() -> String {
    "Invalid leavemuc command. Usage: `leavemuc <room_jid>`".to_owned()
}

/// Formats the summary of a purge.
pub fn format_purged(left: usize) -> String {
    match left {
        0 => "Purging unused rooms: nothing to leave".to_owned(),
        1 => "Purging unused rooms: left 1 room".to_owned(),
        n => format!("Purging unused rooms: left {} rooms", n),
    }
}

pub fn format_refreshing() -> String {
    "Refreshing presences and roster".to_owned()
}

pub fn format_invalid_jid(jid: &str) -> String {
    format!("`{}` is not a valid room JID", jid)
}

pub fn format_disabled_jid(jid: &str) -> String {
    format!("`{}` is disabled", jid)
}

pub fn format_not_a_groupchat(jid: &str) -> String {
    format!("`{}` is bridged as a contact, not as a groupchat", jid)
}

pub fn format_joined(jid: &str) -> String {
    format!("Joined groupchat {}", jid)
}

pub fn format_left(jid: &str) -> String {
    format!("Left groupchat {}", jid)
}

pub fn format_command_failed(error: &BridgeError) -> String {
    format!("Command failed: {}", error)
}
