//! Events delivered by the Matrix sync loop.

/// Membership transition of a room member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Join,
    Invite,
    Leave,
    Ban,
}

/// Something that happened in a room the bridge account has joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixEvent {
    /// A text message
    Message {
        room_id: String,
        sender: String,
        body: String,
    },
    /// The topic of a room changed
    TopicChanged {
        room_id: String,
        sender: String,
        topic: String,
    },
    /// The membership of a user changed
    MembershipChanged {
        room_id: String,
        user_id: String,
        membership: Membership,
    },
}
