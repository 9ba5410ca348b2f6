//! The operations the bridge needs from a Matrix account.

use async_trait::async_trait;
use mockall::automock;

use crate::error::BridgeError;

/// A room the bridge account has joined, as seen by the startup scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRoom {
    pub room_id: String,
    pub topic: Option<String>,
    pub name: Option<String>,
}

/// Matrix side of the bridge.
///
/// Room and user IDs are passed as strings; the implementation validates them.
#[automock]
#[async_trait]
pub trait MatrixApi: Send + Sync {
    /// Returns the user ID of the bridge account.
    fn own_user_id(&self) -> String;

    /// Creates a private room with a topic and a name and returns its ID.
    async fn create_room(&self, topic: &str, name: &str) -> Result<String, BridgeError>;

    async fn invite(&self, room_id: &str, user_id: &str) -> Result<(), BridgeError>;

    /// Returns the user IDs of the joined and invited members of a room.
    async fn members(&self, room_id: &str) -> Result<Vec<String>, BridgeError>;

    async fn set_topic(&self, room_id: &str, topic: &str) -> Result<(), BridgeError>;

    async fn set_name(&self, room_id: &str, name: &str) -> Result<(), BridgeError>;

    async fn send_text(&self, room_id: &str, body: &str) -> Result<(), BridgeError>;

    async fn send_notice(&self, room_id: &str, body: &str) -> Result<(), BridgeError>;

    /// Lists every joined room with its current topic and name.
    async fn joined_rooms(&self) -> Result<Vec<JoinedRoom>, BridgeError>;

    async fn leave_room(&self, room_id: &str) -> Result<(), BridgeError>;
}
