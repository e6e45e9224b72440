//! Newline-delimited JSON framing and the tagged message types for the
//! client/server protocol (spec §4.1, §6).
//!
//! The reference system this was distilled from assumed one socket write
//! equals one JSON frame, which raw TCP does not guarantee. This codec makes
//! the frame boundary explicit: one JSON object per line, rejecting any
//! frame over [`MAX_FRAME_SIZE`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use crate::error::ErrorToken;

pub const MAX_FRAME_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_SIZE)]
    TooLarge(usize),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read the next non-blank newline-delimited frame. Returns `Ok(None)` on
/// clean EOF (peer closed the socket with nothing left to read).
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<String>, FrameError>
where
    R: AsyncBufReadExt + Unpin,
{
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        if line.len() > MAX_FRAME_SIZE {
            return Err(FrameError::TooLarge(line.len()));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        return Ok(Some(trimmed.to_string()));
    }
}

pub fn decode(line: &str) -> Result<ClientMessage, FrameError> {
    serde_json::from_str(line).map_err(FrameError::from)
}

pub async fn write_frame<W>(writer: &mut W, message: &ServerMessage) -> Result<(), FrameError>
where
    W: AsyncWriteExt + Unpin,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "message_type")]
pub enum ClientMessage {
    #[serde(rename = "message_register")]
    Register { username: String, password: String },
    #[serde(rename = "message_login")]
    Login { username: String, password: String },
    #[serde(rename = "message_logout")]
    Logout {
        #[serde(default)]
        username: String,
        id: String,
    },
    #[serde(rename = "create_room")]
    CreateRoom { name: String },
    #[serde(rename = "join_room")]
    JoinRoom { userid: String, roomname: String },
    #[serde(rename = "list_rooms")]
    ListRooms {},
    #[serde(rename = "list_users")]
    ListUsers { roomid: String },
    #[serde(rename = "message_chat")]
    Chat { messages: Vec<ChatItemRequest> },
    #[serde(rename = "blacklist")]
    Blacklist {
        userid: String,
        blocked_username: String,
    },
    #[serde(rename = "unblock")]
    Unblock {
        userid: String,
        blocked_username: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatItemRequest {
    #[serde(default)]
    pub authorid: String,
    #[serde(default)]
    pub roomid: String,
    #[serde(default)]
    pub target_userid: String,
    #[serde(default)]
    pub target_username: String,
    #[serde(default)]
    pub message: String,
}

// ---------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message_type")]
pub enum ServerMessage {
    #[serde(rename = "message_register_response")]
    RegisterResponse { username: String, status: String },
    #[serde(rename = "message_login_response")]
    LoginResponse {
        username: String,
        id: String,
        roomid: String,
        roomname: String,
    },
    #[serde(rename = "create_room_response")]
    CreateRoomResponse { name: String },
    #[serde(rename = "join_room_response")]
    JoinRoomResponse {
        userid: String,
        roomname: String,
        roomid: String,
    },
    #[serde(rename = "list_rooms")]
    ListRooms { rooms: Vec<String> },
    #[serde(rename = "list_users")]
    ListUsers {
        roomid: String,
        roomname: String,
        users: Vec<String>,
    },
    #[serde(rename = "message_chat")]
    Chat { messages: Vec<ChatItemResponse> },
    #[serde(rename = "blacklist_response")]
    BlacklistResponse {
        userid: String,
        blocked_username: String,
    },
    #[serde(rename = "unblock_response")]
    UnblockResponse {
        userid: String,
        blocked_username: String,
    },
    #[serde(rename = "message_error")]
    Error {
        errortype: ErrorToken,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(token: ErrorToken) -> Self {
        ServerMessage::Error {
            errortype: token,
            message: token.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatItemResponse {
    pub id: String,
    pub authorname: String,
    pub authorid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_username: Option<String>,
    pub roomid: String,
    pub target_userid: String,
    pub message: String,
    pub createdate: String,
}

impl From<crate::models::ChatMessageView> for ChatItemResponse {
    fn from(m: crate::models::ChatMessageView) -> Self {
        ChatItemResponse {
            id: m.id,
            authorname: m.author_name,
            authorid: m.author_id,
            target_username: m.target_username,
            roomid: m.room_id,
            target_userid: m.target_user_id,
            message: m.body,
            createdate: m.created_at,
        }
    }
}
