//! Purge command handler.
//!
//! Leaves every joined room that is either unmanaged or has less than two
//! members, the bridge included. Groupchats are left on the XMPP side before
//! their room. The control and all-chat rooms are never purged.

use log::{debug, info, warn};

use crate::{
    commands::{
        CommandContext, CommandResult,
        responses::{format_command_failed, format_purged},
    },
    error::BridgeError,
    mapping::{ContactMapping, MappingKind},
    matrix::JoinedRoom,
};

pub async fn handle_purge(context: &CommandContext<'_>) -> CommandResult {
    debug!("handling purge command");

    let response = match purge(context).await {
        Ok(left) => format_purged(left),
        Err(e) => {
            warn!("purge failed: {}", e);
            format_command_failed(&e)
        }
    };

    CommandResult { response }
}

async fn purge(context: &CommandContext<'_>) -> Result<usize, BridgeError> {
    let joined_rooms = context.provisioner.matrix().joined_rooms().await?;
    let mut left = 0;

    for room in joined_rooms {
        let mapping = context
            .provisioner
            .store()
            .resolve_by_room(&room.room_id)
            .await;

        match purge_room(context, &room, mapping).await {
            Ok(true) => left += 1,
            Ok(false) => {}
            Err(e) => warn!("failed to purge room {}: {}", room.room_id, e),
        }
    }

    Ok(left)
}

/// Leaves a room if it is unused, returning whether it was left.
async fn purge_room(
    context: &CommandContext<'_>,
    room: &JoinedRoom,
    mapping: Option<ContactMapping>,
) -> Result<bool, BridgeError> {
    if mapping.as_ref().is_some_and(ContactMapping::is_special) {
        return Ok(false);
    }
    if mapping.is_some() {
        let members = context.provisioner.matrix().members(&room.room_id).await?;
        if members.len() >= 2 {
            return Ok(false);
        }
    }

    info!(
        "leaving room {} ({:?}) [{:?}]",
        room.room_id, room.name, room.topic
    );

    // Unmanaged rooms may still be flagged as groupchats, by a previous run
    let groupchat = match &mapping {
        Some(mapping) if mapping.kind == MappingKind::Groupchat => mapping
            .jid()
            .map(|jid| (jid.clone(), mapping.nick.clone())),
        Some(_) => None,
        None => room
            .topic
            .as_deref()
            .and_then(|topic| context.provisioner.codec().jid_from_groupchat_topic(topic))
            .map(|jid| (jid, None)),
    };
    if let Some((jid, nick)) = groupchat {
        let nick = nick.as_deref().unwrap_or(context.groupchat_nick);
        context.xmpp.leave_groupchat(jid.as_str(), nick).await?;
    }

    context.provisioner.leave_room(&room.room_id).await?;
    Ok(true)
}
