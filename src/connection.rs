//! Per-socket connection state (spec §4.3's state machine).
//!
//! Each accepted socket gets one `Connection`. Its `outbox` is the write
//! half of a channel drained by a dedicated writer task, so handlers never
//! touch the socket directly -- they just push a `ServerMessage` and move
//! on. This mirrors the per-peer mpsc pattern used for fan-out broadcasts.

use tokio::sync::mpsc;

use crate::wire::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Authenticated,
    InRoom,
    Closed,
}

pub struct Connection {
    pub outbox: mpsc::UnboundedSender<ServerMessage>,
    pub state: ConnectionState,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub room_id: Option<String>,
}

impl Connection {
    pub fn new(outbox: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Connection {
            outbox,
            state: ConnectionState::Unbound,
            user_id: None,
            username: None,
            room_id: None,
        }
    }

    /// Best-effort send -- the writer task may already be gone if the peer
    /// hung up mid-broadcast, and that's not this caller's problem.
    pub fn send(&self, message: ServerMessage) {
        let _ = self.outbox.send(message);
    }

    pub fn authenticate(&mut self, user_id: String, username: String) {
        self.user_id = Some(user_id);
        self.username = Some(username);
        self.state = ConnectionState::Authenticated;
    }

    pub fn enter_room(&mut self, room_id: String) {
        self.room_id = Some(room_id);
        self.state = ConnectionState::InRoom;
    }

    pub fn leave_room(&mut self) {
        self.room_id = None;
        if self.state == ConnectionState::InRoom {
            self.state = ConnectionState::Authenticated;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Authenticated | ConnectionState::InRoom
        )
    }

    pub fn close(&mut self) {
        self.state = ConnectionState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }
}
