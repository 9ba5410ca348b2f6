//! Matrix synchronization and event handling.
//!
//! [`MatrixSync::catch_up`] performs the initial sync at startup: it
//! accepts pending invites and fills the room list the discovery scan reads,
//! without relaying past messages. [`MatrixSync::sync`] then registers the
//! event handlers and syncs forever, persisting the sync token after each
//! round so a restart resumes where the bridge stopped.

use std::{sync::Mutex, time::Duration};

use log::{debug, error, info, warn};
use matrix_sdk::{
    Client, LoopCtrl, Room, RoomState,
    config::SyncSettings,
    ruma::{
        api::client::filter::FilterDefinition,
        events::room::{
            member::{MembershipState, OriginalSyncRoomMemberEvent, StrippedRoomMemberEvent},
            message::{MessageType, OriginalSyncRoomMessageEvent},
            topic::OriginalSyncRoomTopicEvent,
        },
    },
};
use tokio::{sync::mpsc, time::sleep};

use crate::{
    error::{BridgeError, Network},
    matrix::{MatrixEvent, Membership, session::SessionStore},
    session::{Backoff, SessionEvent, SessionMachine, SessionState},
};

const INITIAL_RETRY_DELAY: Duration = Duration::from_secs(2);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

pub struct MatrixSync {
    client: Client,
    session_store: SessionStore,
    /// Users whose invites the bridge accepts
    trusted_inviters: Vec<String>,
}

impl MatrixSync {
    pub fn new(client: &Client, session_store: SessionStore, trusted_inviters: Vec<String>) -> Self {
        MatrixSync {
            client: client.to_owned(),
            session_store,
            trusted_inviters,
        }
    }

    fn settings(&self) -> SyncSettings {
        // See <https://spec.matrix.org/v1.6/client-server-api/#lazy-loading-room-members>.
        let filter = FilterDefinition::with_lazy_loading();
        let mut sync_settings = SyncSettings::default().filter(filter.into());
        if let Some(sync_token) = self.session_store.sync_token() {
            sync_settings = sync_settings.token(sync_token);
        }
        sync_settings
    }

    async fn persist_token(&self, sync_token: String) {
        if let Err(err) = self.session_store.save_sync_token(sync_token).await {
            error!("failed to persist sync token: {:?}", err);
        }
    }

    /// Syncs once, retrying until the homeserver answers, and returns the
    /// token to continue from.
    pub async fn catch_up(&self) -> String {
        // Invites received while the bridge was offline
        self.client.add_event_handler({
            let trusted_inviters = self.trusted_inviters.clone();
            move |room_member: StrippedRoomMemberEvent, client: Client, room: Room| {
                let trusted_inviters = trusted_inviters.clone();
                async move { auto_join_rooms(room_member, client, room, &trusted_inviters).await }
            }
        });

        let sync_settings = self.settings();
        let mut backoff = Backoff::new(INITIAL_RETRY_DELAY, MAX_RETRY_DELAY);
        loop {
            match self.client.sync_once(sync_settings.clone()).await {
                Ok(response) => {
                    self.persist_token(response.next_batch.clone()).await;
                    info!("matrix initial sync done");
                    return response.next_batch;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!("initial sync failed: {}, retrying in {:?}", e, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    /// Relays room events to `events` until it is closed.
    ///
    /// Sync failures are retried with an exponential backoff.
    pub async fn sync(&self, since: String, events: mpsc::Sender<MatrixEvent>) {
        info!("start syncing");

        // Registered after the initial sync so only new events are relayed
        self.client.add_event_handler({
            let events = events.clone();
            move |event: OriginalSyncRoomMessageEvent, room: Room| {
                let events = events.clone();
                async move { on_room_message(event, room, &events).await }
            }
        });
        self.client.add_event_handler({
            let events = events.clone();
            move |event: OriginalSyncRoomTopicEvent, room: Room| {
                let events = events.clone();
                async move { on_room_topic(event, room, &events).await }
            }
        });
        self.client.add_event_handler({
            let events = events.clone();
            move |event: OriginalSyncRoomMemberEvent, room: Room| {
                let events = events.clone();
                async move { on_room_member(event, room, &events).await }
            }
        });

        let machine = Mutex::new(SessionMachine::new(Network::Matrix));
        let mut backoff = Backoff::new(INITIAL_RETRY_DELAY, MAX_RETRY_DELAY);
        let latest_token = Mutex::new(since);

        while !events.is_closed() {
            update_session(&machine, &[SessionEvent::ConnectRequested]);

            let sync_settings = match latest_token.lock() {
                Ok(token) => self.settings().token(token.clone()),
                Err(_) => self.settings(),
            };
            let result = self
                .client
                .sync_with_result_callback(sync_settings, |sync_result| {
                    let events = events.clone();
                    let machine = &machine;
                    let latest_token = &latest_token;
                    async move {
                        let response = sync_result?;
                        // Nothing is queued on this side, going live is immediate
                        update_session(machine, &[SessionEvent::Online, SessionEvent::Drained]);

                        if let Ok(mut token) = latest_token.lock() {
                            token.clone_from(&response.next_batch);
                        }
                        // We persist the token each time to be able to restore our session
                        self.persist_token(response.next_batch).await;

                        if events.is_closed() {
                            return Ok(LoopCtrl::Break);
                        }
                        Ok(LoopCtrl::Continue)
                    }
                })
                .await;

            if update_session(&machine, &[]).is_live() {
                backoff.reset();
            }
            update_session(&machine, &[SessionEvent::Lost]);

            if let Err(e) = result {
                let delay = backoff.next_delay();
                warn!(
                    "{} ({}), retrying in {:?}",
                    BridgeError::NetworkDisconnected(Network::Matrix),
                    e,
                    delay
                );
                sleep(delay).await;
            }
        }

        info!("matrix sync stopped");
    }
}

/// Applies session events and returns the resulting state.
fn update_session(machine: &Mutex<SessionMachine>, session_events: &[SessionEvent]) -> SessionState {
    match machine.lock() {
        Ok(mut machine) => {
            for event in session_events {
                machine.handle(*event);
            }
            machine.state()
        }
        Err(_) => SessionState::Disconnected,
    }
}

/// Whether an invite sent by `sender` may be accepted.
///
/// A room joined on someone else's invite would be adopted at the next
/// start if its topic names a contact.
fn is_trusted_inviter(sender: &str, trusted_inviters: &[String]) -> bool {
    trusted_inviters.iter().any(|user_id| user_id == sender)
}

/// Joins the rooms the bridge account is invited to by a trusted user.
///
/// See <https://github.com/matrix-org/synapse/issues/4345> for why joining
/// is retried.
async fn auto_join_rooms(
    room_member: StrippedRoomMemberEvent,
    client: Client,
    room: Room,
    trusted_inviters: &[String],
) {
    let Some(user_id) = client.user_id() else {
        warn!("could not get user id from client");
        return;
    };

    if room_member.state_key != user_id {
        return;
    }
    if !is_trusted_inviter(room_member.sender.as_str(), trusted_inviters) {
        warn!(
            "ignoring invite to {} from {}",
            room.room_id(),
            room_member.sender
        );
        return;
    }

    tokio::spawn(async move {
        info!("auto joining room {}", room.room_id());
        let mut delay = 2;

        while let Err(err) = room.join().await {
            error!(
                "failed to join room {} ({err:?}), retrying in {delay}s",
                room.room_id()
            );

            sleep(Duration::from_secs(delay)).await;
            delay *= 2;

            if delay > 3600 {
                error!("can't join room {} ({err:?})", room.room_id());
                break;
            }
        }
        info!("joined room {}", room.room_id());
    });
}

async fn forward(event: MatrixEvent, events: &mpsc::Sender<MatrixEvent>) {
    if events.send(event).await.is_err() {
        debug!("relay stopped, dropping matrix event");
    }
}

async fn on_room_message(
    event: OriginalSyncRoomMessageEvent,
    room: Room,
    events: &mpsc::Sender<MatrixEvent>,
) {
    if room.state() != RoomState::Joined {
        return;
    }

    // Only text and emotes are relayed
    let body = match event.content.msgtype {
        MessageType::Text(content) => content.body,
        MessageType::Emote(content) => format!("/me {}", content.body),
        _ => return,
    };

    forward(
        MatrixEvent::Message {
            room_id: room.room_id().to_string(),
            sender: event.sender.to_string(),
            body,
        },
        events,
    )
    .await;
}

async fn on_room_topic(
    event: OriginalSyncRoomTopicEvent,
    room: Room,
    events: &mpsc::Sender<MatrixEvent>,
) {
    if room.state() != RoomState::Joined {
        return;
    }

    forward(
        MatrixEvent::TopicChanged {
            room_id: room.room_id().to_string(),
            sender: event.sender.to_string(),
            topic: event.content.topic,
        },
        events,
    )
    .await;
}

async fn on_room_member(
    event: OriginalSyncRoomMemberEvent,
    room: Room,
    events: &mpsc::Sender<MatrixEvent>,
) {
    let Some(membership) = to_membership(&event.content.membership) else {
        return;
    };

    forward(
        MatrixEvent::MembershipChanged {
            room_id: room.room_id().to_string(),
            user_id: event.state_key.to_string(),
            membership,
        },
        events,
    )
    .await;
}

fn to_membership(state: &MembershipState) -> Option<Membership> {
    match state {
        MembershipState::Join => Some(Membership::Join),
        MembershipState::Invite => Some(Membership::Invite),
        MembershipState::Leave => Some(Membership::Leave),
        MembershipState::Ban => Some(Membership::Ban),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_membership() {
        assert_eq!(to_membership(&MembershipState::Join), Some(Membership::Join));
        assert_eq!(
            to_membership(&MembershipState::Invite),
            Some(Membership::Invite)
        );
        assert_eq!(to_membership(&MembershipState::Leave), Some(Membership::Leave));
        assert_eq!(to_membership(&MembershipState::Ban), Some(Membership::Ban));
        assert_eq!(to_membership(&MembershipState::Knock), None);
    }

    #[test]
    fn test_only_trusted_invites_are_accepted() {
        let trusted_inviters = vec!["@me:matrix.org".to_string()];

        assert!(is_trusted_inviter("@me:matrix.org", &trusted_inviters));
        assert!(!is_trusted_inviter("@stranger:matrix.org", &trusted_inviters));
        assert!(!is_trusted_inviter("@me:matrix.org", &[]));
    }

    #[tokio::test]
    async fn test_forward_after_relay_stopped() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);

        // Must not panic nor block
        forward(
            MatrixEvent::Message {
                room_id: "!a:matrix.org".to_string(),
                sender: "@me:matrix.org".to_string(),
                body: "hi".to_string(),
            },
            &sender,
        )
        .await;
    }
}
