use serde::{Deserialize, Serialize};

/// Sentinel id used for users/rooms that satisfy NOT NULL foreign keys on
/// messages with no real target.
pub const NONE_ID: &str = "NONE";

/// Name of the pinned default room every authenticated connection joins.
pub const LOBBY_NAME: &str = "Lobby";

/// Default number of most-recent messages returned on room join.
pub const DEFAULT_HISTORY_LIMIT: i64 = 30;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub author_id: String,
    pub room_id: String,
    pub target_user_id: String,
    pub body: String,
    pub created_at: String,
}

/// A single item of a `message_chat` envelope, denormalized with the
/// author's (and optionally the DM target's) username for display --
/// matches the `ChatItem` shape in the wire protocol.
#[derive(Debug, Clone)]
pub struct ChatMessageView {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    pub room_id: String,
    pub target_user_id: String,
    pub target_username: Option<String>,
    pub body: String,
    pub created_at: String,
}
