//! Command parsing.
//!
//! This module converts the body of a control room message into a structured
//! [`Command`]. Commands are written either as bare words (`purge`) or with
//! the bot prefix (`!mxpp purge`).

use command_parser::{Command as ParserCommand, Parser};
use log::debug;

use crate::commands::responses::{
    format_invalid_joinmuc, format_invalid_leavemuc, format_unknown_command,
};

/// Name of the bot in prefixed commands.
pub const COMMAND_NAME: &str = "mxpp";

/// Represents a parsed control command.
#[derive(Debug, Hash, PartialEq, Eq)]
pub enum Command {
    /// Display help information
    Help,
    /// Probe every contact, send our presence and request the roster again
    Refresh,
    /// Leave unmanaged and empty rooms
    Purge,
    /// Join a groupchat
    ///
    /// # Fields
    ///
    /// * `String` - Room JID
    JoinMuc(String),
    /// Leave a groupchat
    ///
    /// # Fields
    ///
    /// * `String` - Room JID
    LeaveMuc(String),
}

/// Errors that can occur during command parsing.
#[derive(Debug)]
pub enum CommandParsingError {
    /// The message could not be parsed as a command
    UnableToParse,
    /// The command is not for this bot (wrong prefix)
    NotMxpp,
    /// The command is not recognized
    Unknown,
    /// The joinmuc command has no room JID
    InvalidJoinMuc,
    /// The leavemuc command has no room JID
    InvalidLeaveMuc,
}

impl Command {
    /// Parses a message string into a Command.
    ///
    /// # Arguments
    ///
    /// * `parser` - The command parser instance
    /// * `body` - The message text to parse
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The message is empty - [`CommandParsingError::UnableToParse`]
    /// - The command is for a different bot - [`CommandParsingError::NotMxpp`]
    /// - The command is not recognized - [`CommandParsingError::Unknown`]
    /// - A groupchat command has no room JID - [`CommandParsingError::InvalidJoinMuc`]
    ///   or [`CommandParsingError::InvalidLeaveMuc`]
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let parser = Parser::new('!', '-');
    /// let result = Command::parse(&parser, "joinmuc room@conference.example.com");
    /// assert!(matches!(result, Ok(Command::JoinMuc(_))));
    /// ```
    pub fn parse(parser: &Parser, body: &str) -> Result<Self, CommandParsingError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(CommandParsingError::UnableToParse);
        }

        // Bare words are commands for us
        let body = if body.starts_with('!') {
            body.to_string()
        } else {
            format!("!{} {}", COMMAND_NAME, body)
        };
        // The parser ignores the last word
        let body = body + " dummy";

        let command = match parser.parse(&body) {
            Ok(cmd) => cmd,
            Err(_) => return Err(CommandParsingError::UnableToParse),
        };

        if command.name != COMMAND_NAME {
            return Err(CommandParsingError::NotMxpp);
        }

        debug!("parsing command: {:?}", command);

        if command.arguments.is_empty() {
            return Ok(Command::Help);
        }

        match command.arguments[0].to_lowercase().as_str() {
            "help" => Ok(Command::Help),
            "refresh" => Ok(Command::Refresh),
            "purge" => Ok(Command::Purge),
            "joinmuc" => Ok(Command::JoinMuc(
                Self::parse_room_jid(&command).ok_or(CommandParsingError::InvalidJoinMuc)?,
            )),
            "leavemuc" => Ok(Command::LeaveMuc(
                Self::parse_room_jid(&command).ok_or(CommandParsingError::InvalidLeaveMuc)?,
            )),
            _ => Err(CommandParsingError::Unknown),
        }
    }

    fn parse_room_jid(command: &ParserCommand) -> Option<String> {
        // 2 arguments: the command and the room jid
        command.arguments.get(1).cloned()
    }
}

/// Formats a command error into a user-friendly message.
///
/// Returns `None` for errors that must not produce a response.
pub fn format_command_error(error: CommandParsingError) -> Option<String> {
    match error {
        CommandParsingError::Unknown => Some(format_unknown_command()),
        CommandParsingError::InvalidJoinMuc => Some(format_invalid_joinmuc()),
        CommandParsingError::InvalidLeaveMuc => Some(format_invalid_leavemuc()),
        _ => None,
    }
}
