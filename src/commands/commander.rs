//! Command orchestration and execution.
//!
//! This module provides the [`Commander`] struct, the entry point for control
//! room messages: [`Commander::parse`] validates the text and
//! [`Commander::parse_command`] routes the parsed command to its handler.

use command_parser::Parser;

use crate::commands::{
    CommandContext, CommandParseError, CommandResult,
    actions::{handle_help, handle_join_muc, handle_leave_muc, handle_purge, handle_refresh},
    command::{Command, format_command_error},
};

/// Command orchestrator for parsing and executing control commands.
pub struct Commander {
    /// Command parser for processing user commands
    parser: Parser,
}

impl Default for Commander {
    fn default() -> Self {
        Self::new()
    }
}

impl Commander {
    /// Creates a new Commander with `!` as command prefix and `-` as option prefix.
    pub fn new() -> Self {
        let parser = Parser::new('!', '-');
        Commander { parser }
    }

    /// Parses a control room message into a command.
    ///
    /// # Returns
    ///
    /// * `Ok(Command)` - Successfully parsed and validated command
    /// * `Err(CommandParseError::NotForBot)` - Message is empty or for a different bot
    /// * `Err(CommandParseError::InvalidCommand)` - Command syntax is invalid
    pub fn parse(&self, body: &str) -> Result<Command, CommandParseError> {
        Command::parse(&self.parser, body).map_err(|error| match format_command_error(error) {
            // Send an error message only when the command was meant for us
            Some(message) => CommandParseError::InvalidCommand(message),
            None => CommandParseError::NotForBot,
        })
    }

    /// Executes a parsed command and returns the notice to post.
    ///
    /// # Command Handlers
    ///
    /// - [`Command::Help`] → [`handle_help`]
    /// - [`Command::Refresh`] → [`handle_refresh`]
    /// - [`Command::Purge`] → [`handle_purge`]
    /// - [`Command::JoinMuc`] → [`handle_join_muc`]
    /// - [`Command::LeaveMuc`] → [`handle_leave_muc`]
    pub async fn parse_command(
        &self,
        command: &Command,
        context: &CommandContext<'_>,
    ) -> CommandResult {
        match command {
            Command::Help => handle_help(),
            Command::Refresh => handle_refresh(context).await,
            Command::Purge => handle_purge(context).await,
            Command::JoinMuc(jid) => handle_join_muc(context, jid).await,
            Command::LeaveMuc(jid) => handle_leave_muc(context, jid).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_command() {
        let commander = Commander::new();
        assert!(matches!(commander.parse("purge"), Ok(Command::Purge)));
    }

    #[test]
    fn test_parse_invalid_command_has_message() {
        let commander = Commander::new();
        assert!(matches!(
            commander.parse("reboot now"),
            Err(CommandParseError::InvalidCommand(message)) if message.contains("Unknown command")
        ));
    }

    #[test]
    fn test_parse_other_bot_is_silent() {
        let commander = Commander::new();
        assert!(matches!(
            commander.parse("!other_bot help"),
            Err(CommandParseError::NotForBot)
        ));
    }
}
