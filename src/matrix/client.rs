//! Matrix account of the bridge, on top of the Matrix SDK.

use async_trait::async_trait;
use log::{debug, info};
use matrix_sdk::{
    Client, Room, RoomMemberships,
    ruma::{
        OwnedRoomId, OwnedUserId, RoomId, UserId,
        api::client::room::{
            Visibility,
            create_room::v3::{Request as CreateRoomRequest, RoomPreset},
        },
        events::room::message::RoomMessageEventContent,
    },
};
use tokio::sync::mpsc;

use crate::{
    error::BridgeError,
    matrix::{
        JoinedRoom, MatrixApi, MatrixCredentials, MatrixEvent, session::SessionStore,
        sync::MatrixSync,
    },
};

/// Device name shown in the clients of the bridge account.
const DEVICE_NAME: &str = "mxpp bridge";

fn to_bridge_error(error: impl std::fmt::Display) -> BridgeError {
    BridgeError::Matrix(error.to_string())
}

/// Logged-in Matrix client.
pub struct MatrixClient {
    matrix_sync: MatrixSync,
    client: Client,
    user_id: OwnedUserId,
    /// Where the live sync starts, right after the initial sync
    since: String,
}

impl MatrixClient {
    /// Logs in, restoring the session saved in `session_store` when there is
    /// one, and performs the initial sync.
    ///
    /// A fresh login is saved to the store so the next start reuses it.
    /// Only the invites sent by `trusted_inviters` are accepted.
    pub async fn new(
        credentials: &MatrixCredentials,
        mut session_store: SessionStore,
        trusted_inviters: Vec<String>,
    ) -> Result<Self, anyhow::Error> {
        info!("setting up matrix client for {}", credentials.username);

        let mut builder = Client::builder()
            .homeserver_url(&credentials.base_url)
            .sqlite_store(session_store.sqlite_path(), None);
        if !credentials.valid_cert_check {
            builder = builder.disable_ssl_verification();
        }
        let client = builder.build().await?;

        if let Some(user_session) = session_store.user_session() {
            info!("restoring matrix session from disk");
            client.restore_session(user_session.clone()).await?;
        } else {
            client
                .matrix_auth()
                .login_username(&credentials.username, &credentials.password)
                .initial_device_display_name(DEVICE_NAME)
                .send()
                .await?;

            let Some(user_session) = client.matrix_auth().session() else {
                return Err(anyhow::anyhow!("no matrix session after login"));
            };
            session_store.save_user_session(&user_session).await?;
        }

        let Some(user_id) = client.user_id().map(ToOwned::to_owned) else {
            return Err(anyhow::anyhow!("matrix client is not logged in"));
        };
        info!("matrix client logged in as {}", user_id);

        let matrix_sync = MatrixSync::new(&client, session_store, trusted_inviters);
        let since = matrix_sync.catch_up().await;

        Ok(MatrixClient {
            matrix_sync,
            client,
            user_id,
            since,
        })
    }

    /// Runs the sync loop, sending every relevant room event to `events`.
    ///
    /// Returns once `events` is closed.
    pub async fn sync(&self, events: mpsc::Sender<MatrixEvent>) {
        self.matrix_sync.sync(self.since.clone(), events).await;
    }

    fn room(&self, room_id: &str) -> Result<Room, BridgeError> {
        let room_id: OwnedRoomId = RoomId::parse(room_id).map_err(to_bridge_error)?;
        self.client
            .get_room(&room_id)
            .ok_or_else(|| BridgeError::Matrix(format!("unknown room {}", room_id)))
    }
}

#[async_trait]
impl MatrixApi for MatrixClient {
    fn own_user_id(&self) -> String {
        self.user_id.to_string()
    }

    async fn create_room(&self, topic: &str, name: &str) -> Result<String, BridgeError> {
        let mut request = CreateRoomRequest::new();
        request.name = Some(name.to_owned());
        request.topic = Some(topic.to_owned());
        request.preset = Some(RoomPreset::PrivateChat);
        request.visibility = Visibility::Private;

        let room = self
            .client
            .create_room(request)
            .await
            .map_err(to_bridge_error)?;
        debug!("created matrix room {} ({})", room.room_id(), topic);
        Ok(room.room_id().to_string())
    }

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), BridgeError> {
        let user_id = UserId::parse(user_id).map_err(to_bridge_error)?;
        self.room(room_id)?
            .invite_user_by_id(&user_id)
            .await
            .map_err(to_bridge_error)
    }

    async fn members(&self, room_id: &str) -> Result<Vec<String>, BridgeError> {
        let members = self
            .room(room_id)?
            .members(RoomMemberships::JOIN | RoomMemberships::INVITE)
            .await
            .map_err(to_bridge_error)?;
        Ok(members
            .iter()
            .map(|member| member.user_id().to_string())
            .collect())
    }

    async fn set_topic(&self, room_id: &str, topic: &str) -> Result<(), BridgeError> {
        self.room(room_id)?
            .set_room_topic(topic)
            .await
            .map(|_| ())
            .map_err(to_bridge_error)
    }

    async fn set_name(&self, room_id: &str, name: &str) -> Result<(), BridgeError> {
        self.room(room_id)?
            .set_name(name.to_owned())
            .await
            .map(|_| ())
            .map_err(to_bridge_error)
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<(), BridgeError> {
        self.room(room_id)?
            .send(RoomMessageEventContent::text_plain(body))
            .await
            .map(|_| ())
            .map_err(to_bridge_error)
    }

    async fn send_notice(&self, room_id: &str, body: &str) -> Result<(), BridgeError> {
        self.room(room_id)?
            .send(RoomMessageEventContent::notice_plain(body))
            .await
            .map(|_| ())
            .map_err(to_bridge_error)
    }

    async fn joined_rooms(&self) -> Result<Vec<JoinedRoom>, BridgeError> {
        Ok(self
            .client
            .joined_rooms()
            .iter()
            .map(|room| JoinedRoom {
                room_id: room.room_id().to_string(),
                topic: room.topic(),
                name: room.name(),
            })
            .collect())
    }

    async fn leave_room(&self, room_id: &str) -> Result<(), BridgeError> {
        self.room(room_id)?.leave().await.map_err(to_bridge_error)
    }
}
