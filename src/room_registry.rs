//! In-memory fan-out tables layered on top of the durable room list in
//! [`crate::store`] (spec §4.3's room registry).
//!
//! Two tables: `online` maps every authenticated user to their outbox,
//! independent of room membership, so direct messages reach a user no
//! matter what room they're sitting in. `rooms` maps a room id to the
//! usernames of whoever currently has it joined, used for room broadcasts
//! and `list_users`. Rooms are materialized lazily on first join and swept
//! away on last leave, except the pinned Lobby.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;

use crate::wire::ServerMessage;

pub struct RoomRegistry {
    lobby_id: Mutex<Option<String>>,
    rooms: Mutex<HashMap<String, HashMap<String, String>>>,
    online: Mutex<HashMap<String, UnboundedSender<ServerMessage>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        RoomRegistry {
            lobby_id: Mutex::new(None),
            rooms: Mutex::new(HashMap::new()),
            online: Mutex::new(HashMap::new()),
        }
    }

    /// The Lobby's room entry is never evicted, even empty.
    pub fn pin_lobby(&self, lobby_id: &str) {
        *self.lobby_id.lock().unwrap() = Some(lobby_id.to_string());
        self.rooms
            .lock()
            .unwrap()
            .entry(lobby_id.to_string())
            .or_default();
    }

    fn is_pinned(&self, room_id: &str) -> bool {
        self.lobby_id.lock().unwrap().as_deref() == Some(room_id)
    }

    pub fn connect(&self, user_id: &str, outbox: UnboundedSender<ServerMessage>) {
        self.online.lock().unwrap().insert(user_id.to_string(), outbox);
    }

    /// Drop a user from every table. Call on logout or socket close.
    pub fn disconnect(&self, user_id: &str) {
        self.online.lock().unwrap().remove(user_id);
        let mut rooms = self.rooms.lock().unwrap();
        let mut emptied = Vec::new();
        for (room_id, members) in rooms.iter_mut() {
            members.remove(user_id);
            if members.is_empty() {
                emptied.push(room_id.clone());
            }
        }
        for room_id in emptied {
            if !self.is_pinned(&room_id) {
                rooms.remove(&room_id);
            }
        }
    }

    pub fn join_room(&self, room_id: &str, user_id: &str, username: &str) {
        self.rooms
            .lock()
            .unwrap()
            .entry(room_id.to_string())
            .or_default()
            .insert(user_id.to_string(), username.to_string());
    }

    pub fn leave_room(&self, room_id: &str, user_id: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(user_id);
            if members.is_empty() && !self.is_pinned(room_id) {
                rooms.remove(room_id);
            }
        }
    }

    /// Usernames currently joined to a room, sorted for stable output.
    pub fn room_usernames(&self, room_id: &str) -> Vec<String> {
        let rooms = self.rooms.lock().unwrap();
        let mut names: Vec<String> = rooms
            .get(room_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn room_member_count(&self, room_id: &str) -> usize {
        self.rooms.lock().unwrap().get(room_id).map_or(0, |m| m.len())
    }

    /// Send to every room member except `exclude_user_id` (typically the
    /// sender, who gets their own echo via the direct handler response).
    pub fn broadcast_room(&self, room_id: &str, message: ServerMessage, exclude_user_id: Option<&str>) {
        let member_ids: Vec<String> = {
            let rooms = self.rooms.lock().unwrap();
            match rooms.get(room_id) {
                Some(members) => members.keys().cloned().collect(),
                None => return,
            }
        };
        let online = self.online.lock().unwrap();
        for user_id in member_ids {
            if Some(user_id.as_str()) == exclude_user_id {
                continue;
            }
            if let Some(outbox) = online.get(&user_id) {
                let _ = outbox.send(message.clone());
            }
        }
    }

    /// Returns `true` if the user was online to receive it.
    pub fn send_to_user(&self, user_id: &str, message: ServerMessage) -> bool {
        let online = self.online.lock().unwrap();
        match online.get(user_id) {
            Some(outbox) => outbox.send(message).is_ok(),
            None => false,
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.online.lock().unwrap().contains_key(user_id)
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
