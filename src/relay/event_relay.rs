//! The bidirectional forwarding pipeline.
//!
//! The [`EventRelay`] receives the events of both networks, one at a time
//! per network, and translates each of them into calls on the other
//! network:
//!
//! ```text
//! XmppEvent ──► filter ──► self-echo ──► resolve/create room ──► Matrix room ──► all-chat copy
//! MatrixEvent ──► own user ──► mapped room ──► XMPP chat/groupchat ──► all-chat copy
//! ```
//!
//! Per-event failures are logged, and room provisioning failures reported
//! into the control room; they never stop the relay.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::{
    commands::{CommandContext, CommandParseError, Commander},
    error::BridgeError,
    filter::FilterPolicy,
    identity::{NormalizedJid, ParsedJid, jid},
    mapping::{ContactMapping, MappingKey, MappingKind},
    matrix::{MatrixApi, MatrixEvent, Membership},
    presence::{PresenceSync, RosterDirectory},
    provisioner::RoomProvisioner,
    xmpp::{MessageKind, XmppApi, XmppEvent},
};

/// Reply to messages typed into the all-chat room.
pub const ALL_CHAT_WARNING: &str = "Don't talk in here! Nobody gets your messages.";

/// Relay switches, taken from the configuration.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Copy every relayed message into the all-chat room
    pub send_messages_to_all_chat: bool,
    /// Drop groupchat messages sent under our own nickname
    pub groupchat_mute_own_nick: bool,
    /// Nickname of the bridge in groupchats
    pub groupchat_nick: String,
    /// Bare JID of the bridge account
    pub login_jid: NormalizedJid,
}

/// Forwards events between XMPP and Matrix.
pub struct EventRelay {
    /// XMPP account of the bridge
    xmpp: Arc<dyn XmppApi>,
    /// Matrix account of the bridge
    matrix: Arc<dyn MatrixApi>,
    /// Owner of the managed rooms
    provisioner: Arc<RoomProvisioner>,
    /// Presence and roster side channel
    presence: PresenceSync,
    /// Roster names
    roster: Arc<RosterDirectory>,
    /// First gate of every JID-addressed event
    filter: Arc<FilterPolicy>,
    /// Control room commands
    commander: Commander,
    options: RelayOptions,
}

impl EventRelay {
    pub fn new(
        xmpp: Arc<dyn XmppApi>,
        provisioner: Arc<RoomProvisioner>,
        presence: PresenceSync,
        roster: Arc<RosterDirectory>,
        filter: Arc<FilterPolicy>,
        options: RelayOptions,
    ) -> Self {
        EventRelay {
            xmpp,
            matrix: Arc::clone(provisioner.matrix()),
            provisioner,
            presence,
            roster,
            filter,
            commander: Commander::new(),
            options,
        }
    }

    /// Relays an XMPP event into Matrix.
    pub async fn relay_xmpp(&self, event: XmppEvent) {
        let result = match event {
            XmppEvent::Connected => {
                self.on_xmpp_connected().await;
                Ok(())
            }
            XmppEvent::Message { from, body } => self.on_xmpp_message(&from, &body).await,
            XmppEvent::GroupchatMessage { from, body } => {
                self.on_xmpp_groupchat_message(&from, &body).await
            }
            XmppEvent::Presence { from, state } => match self.accept_sender(&from) {
                Some(sender) => self.presence.on_presence_change(&sender.bare, state).await,
                None => Ok(()),
            },
            XmppEvent::SubscriptionRequest { from } => match self.accept_sender(&from) {
                Some(sender) => self.presence.on_roster_request(&sender.bare).await,
                None => Ok(()),
            },
            XmppEvent::Roster(items) => self.presence.on_roster(items).await.map(|count| {
                debug!("roster update synchronized {} contacts", count);
            }),
        };

        self.handle_failure(result).await;
    }

    /// Relays a Matrix event into XMPP.
    pub async fn relay_matrix(&self, event: MatrixEvent) {
        let result = match event {
            MatrixEvent::Message {
                room_id,
                sender,
                body,
            } => self.on_matrix_message(&room_id, &sender, &body).await,
            MatrixEvent::TopicChanged {
                room_id,
                sender,
                topic,
            } => self
                .provisioner
                .on_topic_changed(&room_id, &sender, &topic)
                .await
                .map(|_| ()),
            MatrixEvent::MembershipChanged {
                room_id,
                user_id,
                membership,
            } => self.on_membership_changed(&room_id, &user_id, membership).await,
        };

        self.handle_failure(result).await;
    }

    async fn handle_failure(&self, result: Result<(), BridgeError>) {
        match result {
            Ok(()) => {}
            Err(e @ BridgeError::ProvisioningFailed { .. }) => {
                warn!("dropping event");
                self.provisioner.report_failure(&e).await;
            }
            Err(e) => error!("failed to relay event: {}", e),
        }
    }

    /// Parses the sender of an event and applies the filter and self-echo gates.
    ///
    /// Returns `None` when the event must be dropped.
    fn accept_sender(&self, from: &str) -> Option<ParsedJid> {
        let sender = match jid::parse(from) {
            Ok(sender) => sender,
            Err(e) => {
                warn!("dropping event: {}", e);
                return None;
            }
        };
        if !self.filter.is_allowed(&sender.bare) {
            return None;
        }
        if sender.bare == self.options.login_jid {
            debug!("dropping event from our own xmpp account");
            return None;
        }
        Some(sender)
    }

    /// Resynchronizes after every (re)connection: presence, roster and groupchats.
    async fn on_xmpp_connected(&self) {
        info!("xmpp session online, resynchronizing");

        if let Err(e) = self.xmpp.send_presence().await {
            error!("failed to send presence: {}", e);
        }
        if let Err(e) = self.xmpp.request_roster().await {
            error!("failed to request roster: {}", e);
        }

        for mapping in self.provisioner.store().mappings().await {
            if mapping.kind != MappingKind::Groupchat {
                continue;
            }
            let Some(room) = mapping.jid() else {
                continue;
            };
            let nick = mapping
                .nick
                .as_deref()
                .unwrap_or(&self.options.groupchat_nick);
            debug!("rejoining groupchat {}", room);
            if let Err(e) = self.xmpp.join_groupchat(room.as_str(), nick).await {
                error!("failed to rejoin groupchat {}: {}", room, e);
            }
        }
    }

    async fn on_xmpp_message(&self, from: &str, body: &str) -> Result<(), BridgeError> {
        let Some(sender) = self.accept_sender(from) else {
            return Ok(());
        };
        let jid = sender.bare;
        let key = MappingKey::Jid(jid.clone());

        if let Some(mapping) = self.provisioner.store().resolve(&key).await
            && mapping.kind == MappingKind::Groupchat
        {
            warn!("ignoring chat message from groupchat {}", jid);
            return Ok(());
        }

        debug!("xmpp message from {}: {}", jid, body);

        let name = self.roster.name_of(&jid).await;
        let mapping = self
            .provisioner
            .ensure_room(&key, MappingKind::DirectContact, &name)
            .await?;
        self.matrix.send_text(&mapping.matrix_room_id, body).await?;

        if self.options.send_messages_to_all_chat {
            self.copy_to_all_chat(&format!("From {}: {}", name, body), false)
                .await;
        }
        Ok(())
    }

    async fn on_xmpp_groupchat_message(&self, from: &str, body: &str) -> Result<(), BridgeError> {
        let sender = match jid::parse(from) {
            Ok(sender) => sender,
            Err(e) => {
                warn!("dropping groupchat message: {}", e);
                return Ok(());
            }
        };
        let room = sender.bare;
        if !self.filter.is_allowed(&room) {
            return Ok(());
        }

        let key = MappingKey::Jid(room.clone());
        let existing = self.provisioner.store().resolve(&key).await;
        if existing
            .as_ref()
            .is_some_and(|mapping| mapping.kind != MappingKind::Groupchat)
        {
            warn!("ignoring groupchat message from contact {}", room);
            return Ok(());
        }

        // Messages without a nickname come from the room itself
        let nick = sender.resource.unwrap_or_else(|| room.to_string());
        let own_nick = existing
            .as_ref()
            .and_then(|mapping| mapping.nick.as_deref())
            .unwrap_or(&self.options.groupchat_nick);
        if self.options.groupchat_mute_own_nick && nick == own_nick {
            debug!("muting our own message in {}", room);
            return Ok(());
        }

        let mapping = self
            .provisioner
            .ensure_room(&key, MappingKind::Groupchat, room.as_str())
            .await?;
        if mapping.kind != MappingKind::Groupchat {
            warn!("ignoring groupchat message from contact {}", room);
            return Ok(());
        }

        debug!("groupchat message in {} from {}: {}", room, nick, body);

        self.matrix
            .send_text(&mapping.matrix_room_id, &format!("{}: {}", nick, body))
            .await?;

        if self.options.send_messages_to_all_chat {
            self.copy_to_all_chat(&format!("Room {}, from {}: {}", room, nick, body), false)
                .await;
        }
        Ok(())
    }

    async fn on_matrix_message(
        &self,
        room_id: &str,
        sender: &str,
        body: &str,
    ) -> Result<(), BridgeError> {
        if sender == self.matrix.own_user_id() {
            return Ok(());
        }
        let Some(mapping) = self.provisioner.store().resolve_by_room(room_id).await else {
            debug!("ignoring message in unmanaged room {}", room_id);
            return Ok(());
        };

        match mapping.kind {
            MappingKind::ControlRoom => self.on_control_message(room_id, body).await,
            MappingKind::AllChatRoom => self.matrix.send_notice(room_id, ALL_CHAT_WARNING).await,
            MappingKind::DirectContact | MappingKind::Groupchat => {
                self.relay_to_xmpp(&mapping, body).await
            }
        }
    }

    async fn relay_to_xmpp(&self, mapping: &ContactMapping, body: &str) -> Result<(), BridgeError> {
        let Some(jid) = mapping.jid() else {
            return Ok(());
        };
        if !self.filter.is_allowed(jid) {
            return Ok(());
        }

        let (kind, name) = match mapping.kind {
            MappingKind::Groupchat => (MessageKind::Groupchat, jid.to_string()),
            _ => (MessageKind::Chat, self.roster.name_of(jid).await),
        };

        debug!("matrix message to {} ({}): {}", jid, kind, body);
        self.xmpp.send_message(jid.as_str(), body, kind).await?;

        if self.options.send_messages_to_all_chat {
            self.copy_to_all_chat(&format!("To {} : {}", name, body), true)
                .await;
        }
        Ok(())
    }

    async fn on_control_message(&self, room_id: &str, body: &str) -> Result<(), BridgeError> {
        debug!("control room command: {}", body);

        let response = match self.commander.parse(body) {
            Ok(command) => {
                let context = CommandContext {
                    xmpp: self.xmpp.as_ref(),
                    provisioner: &self.provisioner,
                    filter: &self.filter,
                    groupchat_nick: &self.options.groupchat_nick,
                };
                self.commander
                    .parse_command(&command, &context)
                    .await
                    .response
            }
            Err(CommandParseError::InvalidCommand(message)) => message,
            Err(CommandParseError::NotForBot) => return Ok(()),
        };

        self.matrix.send_notice(room_id, &response).await
    }

    /// Re-invites roster users leaving a managed room.
    async fn on_membership_changed(
        &self,
        room_id: &str,
        user_id: &str,
        membership: Membership,
    ) -> Result<(), BridgeError> {
        if membership != Membership::Leave || !self.provisioner.is_invited_user(user_id) {
            return Ok(());
        }
        if self.provisioner.store().resolve_by_room(room_id).await.is_none() {
            return Ok(());
        }

        info!("{} left managed room {}, inviting again", user_id, room_id);
        self.provisioner.repair_invites(room_id).await.map(|_| ())
    }

    /// Posts a copy into the all-chat room, if there is one.
    async fn copy_to_all_chat(&self, text: &str, as_notice: bool) {
        let room_id = match self.provisioner.ensure_all_chat_room().await {
            Ok(Some(room_id)) => room_id,
            Ok(None) => return,
            Err(e) => {
                self.provisioner.report_failure(&e).await;
                return;
            }
        };

        let result = if as_notice {
            self.matrix.send_notice(&room_id, text).await
        } else {
            self.matrix.send_text(&room_id, text).await
        };
        if let Err(e) = result {
            error!("failed to copy message to the all-chat room: {}", e);
        }
    }
}
