//! Creation, discovery and upkeep of the managed Matrix rooms.
//!
//! The [`RoomProvisioner`] is the only component creating rooms. Every
//! creation goes through [`MappingStore::resolve_or_create`], so a contact
//! never gets two rooms even when events about it arrive in bursts.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::time::sleep;

use crate::{
    error::BridgeError,
    filter::FilterPolicy,
    identity::TopicCodec,
    mapping::{ContactMapping, MappingKey, MappingKind, MappingStore},
    matrix::MatrixApi,
    provisioner::InviteRoster,
    session::RetryPolicy,
};

/// Name of the control room.
pub const CONTROL_ROOM_NAME: &str = "XMPP Control Room";
/// Name of the all-chat room.
pub const ALL_CHAT_ROOM_NAME: &str = "XMPP All Chat";

/// Behaviour switches of the provisioner, taken from the configuration.
#[derive(Debug, Clone)]
pub struct ProvisionerOptions {
    /// Whether the all-chat room exists at all
    pub all_chat_enabled: bool,
    /// Whether foreign topic changes of managed rooms are reverted
    pub restore_room_topic: bool,
    /// Nickname of the bridge inside groupchats
    pub groupchat_nick: String,
    /// Retries of room creation
    pub retry: RetryPolicy,
}

/// Creates and maintains the Matrix rooms standing for XMPP entities.
pub struct RoomProvisioner {
    /// Matrix account of the bridge
    matrix: Arc<dyn MatrixApi>,
    /// Shared mapping table
    store: Arc<MappingStore>,
    /// Topic encoding of the mappings
    codec: TopicCodec,
    /// Users invited into every room
    invite_roster: InviteRoster,
    options: ProvisionerOptions,
}

impl RoomProvisioner {
    /// Creates a provisioner.
    ///
    /// # Arguments
    ///
    /// * `matrix` - Matrix account used to create and edit rooms
    /// * `store` - Mapping table shared with the event relay
    /// * `codec` - Topic encoding built from the configuration
    /// * `invite_roster` - Users to invite into every room
    /// * `options` - Behaviour switches
    pub fn new(
        matrix: Arc<dyn MatrixApi>,
        store: Arc<MappingStore>,
        codec: TopicCodec,
        invite_roster: InviteRoster,
        options: ProvisionerOptions,
    ) -> Self {
        RoomProvisioner {
            matrix,
            store,
            codec,
            invite_roster,
            options,
        }
    }

    pub fn matrix(&self) -> &Arc<dyn MatrixApi> {
        &self.matrix
    }

    pub fn codec(&self) -> &TopicCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<MappingStore> {
        &self.store
    }

    pub fn is_all_chat_enabled(&self) -> bool {
        self.options.all_chat_enabled
    }

    /// Returns the mapping of a key, creating its room if needed.
    ///
    /// # Arguments
    ///
    /// * `key` - The entity the room stands for
    /// * `kind` - The kind of the entity, used for new rooms only
    /// * `name` - The room name, used for new rooms only
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ProvisioningFailed`] when the room creation
    /// failed after every retry.
    pub async fn ensure_room(
        &self,
        key: &MappingKey,
        kind: MappingKind,
        name: &str,
    ) -> Result<ContactMapping, BridgeError> {
        self.store
            .resolve_or_create(key, || self.create_mapping(key, kind, name))
            .await
    }

    /// Returns the ID of the control room, creating it once if needed.
    pub async fn ensure_control_room(&self) -> Result<String, BridgeError> {
        let mapping = self
            .ensure_room(
                &MappingKey::Control,
                MappingKind::ControlRoom,
                CONTROL_ROOM_NAME,
            )
            .await?;
        Ok(mapping.matrix_room_id)
    }

    /// Returns the ID of the all-chat room, creating it once if needed.
    ///
    /// Returns `None` when the all-chat room is disabled; no room is created.
    pub async fn ensure_all_chat_room(&self) -> Result<Option<String>, BridgeError> {
        if !self.options.all_chat_enabled {
            return Ok(None);
        }

        let mapping = self
            .ensure_room(
                &MappingKey::AllChat,
                MappingKind::AllChatRoom,
                ALL_CHAT_ROOM_NAME,
            )
            .await?;
        Ok(Some(mapping.matrix_room_id))
    }

    /// Rebuilds the mappings from the topics of the joined rooms.
    ///
    /// Rooms with an unrecognized topic, and rooms of disabled JIDs, are left
    /// untouched. When two rooms claim the same mapping, the first one listed
    /// keeps it. The invites of every adopted room are repaired.
    ///
    /// # Returns
    ///
    /// The number of adopted rooms.
    pub async fn discover_rooms(&self, filter: &FilterPolicy) -> Result<usize, BridgeError> {
        let joined_rooms = self.matrix.joined_rooms().await?;
        let mut adopted = 0;

        for room in joined_rooms {
            let Some(topic) = room.topic.as_deref() else {
                debug!("room {} has no topic, leaving it unmanaged", room.room_id);
                continue;
            };
            let Some((key, kind)) = self.codec.classify(topic) else {
                debug!("room {} has a foreign topic, leaving it unmanaged", room.room_id);
                continue;
            };
            if key.jid().is_some_and(|jid| !filter.is_allowed(jid)) {
                continue;
            }
            if kind == MappingKind::AllChatRoom && !self.options.all_chat_enabled {
                debug!("all-chat room {} is disabled, not adopting it", room.room_id);
                continue;
            }

            let mapping = ContactMapping {
                key,
                matrix_room_id: room.room_id.clone(),
                kind,
                topic: topic.to_owned(),
                nick: self.nick_for(kind),
                name: room.name.clone(),
            };
            if self.store.adopt(mapping).await {
                adopted += 1;
                if let Err(e) = self.repair_invites(&room.room_id).await {
                    warn!("failed to repair invites of {}: {}", room.room_id, e);
                }
            }
        }

        info!("adopted {} managed rooms", adopted);
        Ok(adopted)
    }

    /// Invites the configured users missing from a room.
    pub async fn repair_invites(&self, room_id: &str) -> Result<usize, BridgeError> {
        self.invite_roster.repair(self.matrix.as_ref(), room_id).await
    }

    /// Repairs the invites of every managed room.
    pub async fn repair_all_invites(&self) {
        for mapping in self.store.mappings().await {
            if let Err(e) = self.repair_invites(&mapping.matrix_room_id).await {
                warn!(
                    "failed to repair invites of {}: {}",
                    mapping.matrix_room_id, e
                );
            }
        }
    }

    /// Whether a user ID belongs to the invite roster.
    pub fn is_invited_user(&self, user_id: &str) -> bool {
        self.invite_roster.users().iter().any(|user| user == user_id)
    }

    /// Reacts to the topic of a room being changed.
    ///
    /// When a managed room's topic is changed by someone other than the
    /// bridge and topic restoration is enabled, the canonical topic is set
    /// back.
    ///
    /// # Returns
    ///
    /// Whether the canonical topic was re-asserted.
    pub async fn on_topic_changed(
        &self,
        room_id: &str,
        sender: &str,
        topic: &str,
    ) -> Result<bool, BridgeError> {
        if sender == self.matrix.own_user_id() {
            return Ok(false);
        }
        let Some(mapping) = self.store.resolve_by_room(room_id).await else {
            return Ok(false);
        };
        if mapping.topic == topic {
            return Ok(false);
        }
        if !self.options.restore_room_topic {
            warn!(
                "topic of {} changed by {}, the mapping of {} will be lost on restart",
                room_id, sender, mapping.key
            );
            return Ok(false);
        }

        info!("restoring topic of {} changed by {}", room_id, sender);
        self.matrix.set_topic(room_id, &mapping.topic).await?;
        Ok(true)
    }

    /// Renames the room of a mapping when its name changed.
    ///
    /// # Returns
    ///
    /// Whether the room was renamed.
    pub async fn rename(&self, key: &MappingKey, name: &str) -> Result<bool, BridgeError> {
        let Some(mapping) = self.store.resolve(key).await else {
            return Ok(false);
        };
        if mapping.name.as_deref() == Some(name) {
            return Ok(false);
        }

        info!("renaming room of {} to `{}`", key, name);
        self.matrix.set_name(&mapping.matrix_room_id, name).await?;
        self.store.rename(key, name).await;
        Ok(true)
    }

    /// Leaves a room and forgets its mapping, if it had one.
    pub async fn leave_room(&self, room_id: &str) -> Result<Option<ContactMapping>, BridgeError> {
        self.matrix.leave_room(room_id).await?;
        Ok(self.store.forget(room_id).await)
    }

    /// Sends a notice into the control room.
    ///
    /// Failures are only logged, as the control room is where failures
    /// would be reported.
    pub async fn notify_control(&self, notice: &str) {
        let room_id = match self.ensure_control_room().await {
            Ok(room_id) => room_id,
            Err(e) => {
                error!("control room unreachable: {}", e);
                return;
            }
        };
        if let Err(e) = self.matrix.send_notice(&room_id, notice).await {
            error!("failed to send notice to the control room: {}", e);
        }
    }

    /// Logs an error and reports it into the control room.
    pub async fn report_failure(&self, error: &BridgeError) {
        error!("{}", error);
        self.notify_control(&format!("Error: {}", error)).await;
    }

    fn nick_for(&self, kind: MappingKind) -> Option<String> {
        match kind {
            MappingKind::Groupchat => Some(self.options.groupchat_nick.clone()),
            _ => None,
        }
    }

    /// Creates a room for a key, retrying with backoff, and invites the roster.
    async fn create_mapping(
        &self,
        key: &MappingKey,
        kind: MappingKind,
        name: &str,
    ) -> Result<ContactMapping, BridgeError> {
        let topic = self.codec.topic_for(key, kind);
        let retry = self.options.retry;
        let mut backoff = retry.backoff();
        let mut attempt = 1;

        let room_id = loop {
            match self.matrix.create_room(&topic, name).await {
                Ok(room_id) => break room_id,
                Err(e) if attempt >= retry.attempts => {
                    return Err(BridgeError::ProvisioningFailed {
                        topic,
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!(
                        "failed to create room `{}` (attempt {}/{}), retrying in {:?}: {}",
                        topic, attempt, retry.attempts, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        info!("created room {} for {}", room_id, key);
        self.invite_roster
            .invite_all(self.matrix.as_ref(), &room_id)
            .await;

        Ok(ContactMapping {
            key: key.clone(),
            matrix_room_id: room_id,
            kind,
            topic,
            nick: self.nick_for(kind),
            name: Some(name.to_owned()),
        })
    }
}
