//! Groupchat command handlers.
//!
//! `joinmuc` bridges a groupchat into a room (created on first join) and
//! joins it under the configured nickname. `leavemuc` leaves the groupchat,
//! leaves its room and forgets the mapping.

use log::{debug, info, warn};

use crate::{
    commands::{
        CommandContext, CommandResult,
        responses::{
            format_command_failed, format_disabled_jid, format_invalid_jid, format_joined,
            format_left, format_not_a_groupchat,
        },
    },
    error::BridgeError,
    identity::{NormalizedJid, jid},
    mapping::{MappingKey, MappingKind},
};

/// Validates the room JID of a groupchat command.
fn validate_room_jid(context: &CommandContext<'_>, room_jid: &str) -> Result<NormalizedJid, String> {
    let jid = jid::normalize(room_jid).map_err(|_| format_invalid_jid(room_jid))?;
    if !context.filter.is_allowed(&jid) {
        return Err(format_disabled_jid(room_jid));
    }
    Ok(jid)
}

pub async fn handle_join_muc(context: &CommandContext<'_>, room_jid: &str) -> CommandResult {
    debug!("handling joinmuc command for {}", room_jid);

    let jid = match validate_room_jid(context, room_jid) {
        Ok(jid) => jid,
        Err(response) => return CommandResult { response },
    };

    let response = match join(context, &jid).await {
        Ok(true) => format_joined(jid.as_str()),
        Ok(false) => format_not_a_groupchat(jid.as_str()),
        Err(e) => {
            warn!("failed to join {}: {}", jid, e);
            format_command_failed(&e)
        }
    };

    CommandResult { response }
}

async fn join(context: &CommandContext<'_>, jid: &NormalizedJid) -> Result<bool, BridgeError> {
    let key = MappingKey::Jid(jid.clone());
    let mapping = context
        .provisioner
        .ensure_room(&key, MappingKind::Groupchat, jid.as_str())
        .await?;
    if mapping.kind != MappingKind::Groupchat {
        return Ok(false);
    }

    info!("joining groupchat {}", jid);
    let nick = mapping.nick.as_deref().unwrap_or(context.groupchat_nick);
    context.xmpp.join_groupchat(jid.as_str(), nick).await?;
    Ok(true)
}

pub async fn handle_leave_muc(context: &CommandContext<'_>, room_jid: &str) -> CommandResult {
    debug!("handling leavemuc command for {}", room_jid);

    let jid = match jid::normalize(room_jid) {
        Ok(jid) => jid,
        Err(_) => {
            return CommandResult {
                response: format_invalid_jid(room_jid),
            };
        }
    };

    let response = match leave(context, &jid).await {
        Ok(true) => format_left(jid.as_str()),
        Ok(false) => format_not_a_groupchat(jid.as_str()),
        Err(e) => {
            warn!("failed to leave {}: {}", jid, e);
            format_command_failed(&e)
        }
    };

    CommandResult { response }
}

async fn leave(context: &CommandContext<'_>, jid: &NormalizedJid) -> Result<bool, BridgeError> {
    let mapping = context
        .provisioner
        .store()
        .resolve(&MappingKey::Jid(jid.clone()))
        .await;
    if mapping
        .as_ref()
        .is_some_and(|mapping| mapping.kind != MappingKind::Groupchat)
    {
        return Ok(false);
    }

    info!("leaving groupchat {}", jid);
    let nick = mapping
        .as_ref()
        .and_then(|mapping| mapping.nick.as_deref())
        .unwrap_or(context.groupchat_nick);
    context.xmpp.leave_groupchat(jid.as_str(), nick).await?;

    if let Some(mapping) = mapping {
        context
            .provisioner
            .leave_room(&mapping.matrix_room_id)
            .await?;
    }
    Ok(true)
}
