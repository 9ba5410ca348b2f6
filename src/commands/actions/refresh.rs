//! Refresh command handler.
//!
//! Probes the presence of every bridged contact, re-sends the presence of
//! the bridge account and requests the roster again, so that the control
//! room catches up with presences missed while disconnected.

use log::{debug, warn};

use crate::{
    commands::{
        CommandContext, CommandResult,
        responses::{format_command_failed, format_refreshing},
    },
    error::BridgeError,
    mapping::MappingKind,
};

pub async fn handle_refresh(context: &CommandContext<'_>) -> CommandResult {
    debug!("handling refresh command");

    let response = match refresh(context).await {
        Ok(()) => format_refreshing(),
        Err(e) => {
            warn!("refresh failed: {}", e);
            format_command_failed(&e)
        }
    };

    CommandResult { response }
}

async fn refresh(context: &CommandContext<'_>) -> Result<(), BridgeError> {
    for mapping in context.provisioner.store().mappings().await {
        if mapping.kind != MappingKind::DirectContact {
            continue;
        }
        if let Some(jid) = mapping.jid() {
            context.xmpp.probe_presence(jid.as_str()).await?;
        }
    }

    context.xmpp.send_presence().await?;
    context.xmpp.request_roster().await
}
