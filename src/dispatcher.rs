//! Accepts connections and routes decoded frames to handlers (spec §4.4).
//!
//! Each connection gets a reader task (socket -> inbox channel) and a
//! writer task (outbox channel -> socket); the connection's own task is the
//! single consumer draining the inbox, so two frames from the same peer are
//! always handled in arrival order even though reads, writes, and handler
//! bodies all suspend independently.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::BufReader;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::auth;
use crate::connection::Connection;
use crate::error::{map_store_error, ErrorToken};
use crate::models::NONE_ID;
use crate::room_registry::RoomRegistry;
use crate::store::{Store, StoreError};
use crate::wire::{self, ChatItemRequest, ClientMessage, FrameError, ServerMessage};

const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Dispatcher {
    store: Arc<Store>,
    rooms: RoomRegistry,
    lobby_id: String,
    lobby_name: String,
}

impl Dispatcher {
    /// Fails fast if the store wasn't able to seed `Lobby` -- the server has
    /// nothing useful to do without it.
    pub fn new(store: Arc<Store>) -> Arc<Self> {
        let lobby = store
            .get_room_by_name(crate::models::LOBBY_NAME)
            .expect("store error while loading Lobby")
            .expect("Lobby must exist after store migration");
        let rooms = RoomRegistry::new();
        rooms.pin_lobby(&lobby.id);
        Arc::new(Dispatcher {
            store,
            rooms,
            lobby_id: lobby.id,
            lobby_name: lobby.name,
        })
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    println!("accepted connection from {addr}");
                    let dispatcher = Arc::clone(&self);
                    tokio::spawn(async move {
                        dispatcher.handle_connection(socket).await;
                    });
                }
                Err(e) => eprintln!("accept failed: {e}"),
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream) {
        let peer = socket.peer_addr().ok();
        let (read_half, write_half) = socket.into_split();
        let mut reader = BufReader::new(read_half);

        let (out_tx, out_rx) = mpsc::unbounded_channel::<ServerMessage>();
        let writer_handle = tokio::spawn(write_loop(write_half, out_rx));

        let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Result<String, FrameError>>();
        let reader_handle = tokio::spawn(async move {
            loop {
                match wire::read_frame(&mut reader).await {
                    Ok(Some(line)) => {
                        if frame_tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = frame_tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        let mut conn = Connection::new(out_tx);
        let mut first_frame = true;

        loop {
            let received = if first_frame {
                match tokio::time::timeout(LOGIN_TIMEOUT, frame_rx.recv()).await {
                    Ok(inner) => inner,
                    Err(_) => {
                        println!("no frame received within the login window, closing connection");
                        break;
                    }
                }
            } else {
                frame_rx.recv().await
            };
            first_frame = false;

            let Some(frame_result) = received else {
                break;
            };
            let line = match frame_result {
                Ok(line) => line,
                Err(e) => {
                    eprintln!("frame error, closing connection: {e}");
                    break;
                }
            };
            match wire::decode(&line) {
                Ok(message) => self.dispatch(&mut conn, message).await,
                Err(e) => {
                    eprintln!("malformed frame, closing connection: {e}");
                    break;
                }
            }
            if conn.is_closed() {
                break;
            }
        }

        let user_id = conn.user_id.clone();
        conn.close();
        if let Some(uid) = user_id {
            self.rooms.disconnect(&uid);
        }
        reader_handle.abort();
        drop(conn);
        let _ = writer_handle.await;
        if let Some(addr) = peer {
            println!("connection closed: {addr}");
        }
    }

    async fn dispatch(&self, conn: &mut Connection, message: ClientMessage) {
        match message {
            ClientMessage::Register { username, password } => {
                self.handle_register(conn, username, password).await
            }
            ClientMessage::Login { username, password } => {
                self.handle_login(conn, username, password).await
            }
            ClientMessage::Logout { id, .. } => self.handle_logout(conn, id),
            ClientMessage::CreateRoom { name } => self.handle_create_room(conn, name),
            ClientMessage::JoinRoom { userid, roomname } => {
                self.handle_join_room(conn, userid, roomname)
            }
            ClientMessage::ListRooms {} => self.handle_list_rooms(conn),
            ClientMessage::ListUsers { roomid } => self.handle_list_users(conn, roomid),
            ClientMessage::Chat { messages } => self.handle_chat(conn, messages),
            ClientMessage::Blacklist {
                userid,
                blocked_username,
            } => self.handle_blacklist(conn, userid, blocked_username),
            ClientMessage::Unblock {
                userid,
                blocked_username,
            } => self.handle_unblock(conn, userid, blocked_username),
        }
    }

    async fn handle_register(&self, conn: &mut Connection, username: String, password: String) {
        if username.is_empty() || password.is_empty() {
            conn.send(ServerMessage::error(ErrorToken::InvalidUsernamePassword));
            return;
        }
        let hash = match tokio::task::spawn_blocking(move || auth::hash_password(&password)).await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                eprintln!("password hashing failed: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
            Err(e) => {
                eprintln!("hashing task panicked: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };
        match self.store.insert_user(&username, &hash) {
            Ok(_) => conn.send(ServerMessage::RegisterResponse {
                username,
                status: "registered".to_string(),
            }),
            Err(e) => {
                let err = map_store_error(e, ErrorToken::UsernameExists);
                conn.send(ServerMessage::error(err.token));
            }
        }
    }

    async fn handle_login(&self, conn: &mut Connection, username: String, password: String) {
        if username.is_empty() || password.is_empty() {
            conn.send(ServerMessage::error(ErrorToken::InvalidUsernamePassword));
            return;
        }
        let user = match self.store.get_user_by_username(&username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                conn.send(ServerMessage::error(ErrorToken::InvalidUsernamePassword));
                return;
            }
            Err(e) => {
                eprintln!("store error during login: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };

        let stored_hash = user.password_hash.clone();
        let verified =
            match tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored_hash))
                .await
            {
                Ok(ok) => ok,
                Err(e) => {
                    eprintln!("verify task panicked: {e}");
                    conn.send(ServerMessage::error(ErrorToken::ServerError));
                    return;
                }
            };
        if !verified {
            conn.send(ServerMessage::error(ErrorToken::InvalidUsernamePassword));
            return;
        }

        conn.authenticate(user.id.clone(), user.username.clone());
        conn.send(ServerMessage::LoginResponse {
            username: user.username.clone(),
            id: user.id.clone(),
            roomid: self.lobby_id.clone(),
            roomname: self.lobby_name.clone(),
        });

        self.rooms.connect(&user.id, conn.outbox.clone());
        self.move_to_room(conn, &self.lobby_id, &self.lobby_name);
        self.send_history(conn, &self.lobby_id);
    }

    fn handle_logout(&self, conn: &mut Connection, id: String) {
        if conn.user_id.as_deref() != Some(id.as_str()) {
            return; // inconsistent session state: silent drop
        }
        conn.close();
    }

    fn handle_create_room(&self, conn: &mut Connection, name: String) {
        if !conn.is_authenticated() {
            return;
        }
        if name.is_empty() {
            conn.send(ServerMessage::error(ErrorToken::InvalidRoom));
            return;
        }
        match self.store.insert_room(&name) {
            Ok(room) => {
                conn.send(ServerMessage::CreateRoomResponse {
                    name: room.name.clone(),
                });
                self.move_to_room(conn, &room.id, &room.name);
                conn.send(ServerMessage::JoinRoomResponse {
                    userid: conn.user_id.clone().unwrap_or_default(),
                    roomname: room.name.clone(),
                    roomid: room.id.clone(),
                });
                self.send_history(conn, &room.id);
            }
            Err(e) => {
                let err = map_store_error(e, ErrorToken::InvalidRoom);
                conn.send(ServerMessage::error(err.token));
            }
        }
    }

    fn handle_join_room(&self, conn: &mut Connection, userid: String, roomname: String) {
        if conn.user_id.as_deref() != Some(userid.as_str()) {
            return; // inconsistent session state: silent drop
        }
        if roomname.is_empty() {
            conn.send(ServerMessage::error(ErrorToken::InvalidRoom));
            return;
        }
        match self.store.get_room_by_name(&roomname) {
            Ok(Some(room)) => {
                self.move_to_room(conn, &room.id, &room.name);
                conn.send(ServerMessage::JoinRoomResponse {
                    userid,
                    roomname: room.name.clone(),
                    roomid: room.id.clone(),
                });
                self.send_history(conn, &room.id);
            }
            Ok(None) => conn.send(ServerMessage::error(ErrorToken::RoomNotFound)),
            Err(e) => {
                eprintln!("store error during join_room: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
            }
        }
    }

    fn handle_list_rooms(&self, conn: &mut Connection) {
        let mut names: Vec<String> = self
            .store
            .get_room_list()
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.name)
            .collect();
        if !names.iter().any(|n| n == &self.lobby_name) {
            names.push(self.lobby_name.clone());
            names.sort_by_key(|n| n.to_lowercase());
        }
        conn.send(ServerMessage::ListRooms { rooms: names });
    }

    fn handle_list_users(&self, conn: &mut Connection, roomid: String) {
        match self.store.get_room_by_id(&roomid) {
            Ok(Some(room)) => {
                let users = self.rooms.room_usernames(&room.id);
                conn.send(ServerMessage::ListUsers {
                    roomid: room.id,
                    roomname: room.name,
                    users,
                });
            }
            Ok(None) => conn.send(ServerMessage::error(ErrorToken::RoomNotFound)),
            Err(e) => {
                eprintln!("store error during list_users: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
            }
        }
    }

    fn handle_chat(&self, conn: &mut Connection, messages: Vec<ChatItemRequest>) {
        for item in messages {
            self.handle_chat_item(conn, item);
        }
    }

    /// Each item independently decides room-broadcast vs. direct message --
    /// a single `chat` frame may mix both kinds of item.
    fn handle_chat_item(&self, conn: &mut Connection, item: ChatItemRequest) {
        let (Some(author_id), Some(author_name)) = (conn.user_id.clone(), conn.username.clone())
        else {
            return; // unauthenticated: inconsistent session state, silent drop
        };
        let body = item.message.trim();
        if body.is_empty() {
            conn.send(ServerMessage::error(ErrorToken::InvalidMessageTarget));
            return;
        }

        let roomid = item.roomid.trim();
        let target_userid = item.target_userid.trim();
        let target_username = item.target_username.trim();

        if !roomid.is_empty() {
            self.handle_room_chat(conn, &author_id, &author_name, roomid, body);
        } else if !target_userid.is_empty() || !target_username.is_empty() {
            self.handle_dm_chat(conn, &author_id, &author_name, target_userid, target_username, body);
        } else {
            conn.send(ServerMessage::error(ErrorToken::InvalidMessageTarget));
        }
    }

    fn handle_room_chat(
        &self,
        conn: &mut Connection,
        author_id: &str,
        author_name: &str,
        roomid: &str,
        body: &str,
    ) {
        let room = match self.store.get_room_by_id(roomid) {
            Ok(Some(room)) => room,
            Ok(None) => {
                conn.send(ServerMessage::error(ErrorToken::RoomNotFound));
                return;
            }
            Err(e) => {
                eprintln!("store error during chat: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };
        match self.store.insert_message(author_id, Some(&room.id), None, body) {
            Ok(msg) => {
                let item = wire::ChatItemResponse {
                    id: msg.id,
                    authorname: author_name.to_string(),
                    authorid: msg.author_id,
                    target_username: None,
                    roomid: msg.room_id,
                    target_userid: NONE_ID.to_string(),
                    message: msg.body,
                    createdate: msg.created_at,
                };
                self.rooms
                    .broadcast_room(&room.id, ServerMessage::Chat { messages: vec![item] }, None);
            }
            Err(e) => {
                let err = map_store_error(e, ErrorToken::InvalidMessageTarget);
                conn.send(ServerMessage::error(err.token));
            }
        }
    }

    fn handle_dm_chat(
        &self,
        conn: &mut Connection,
        author_id: &str,
        author_name: &str,
        target_userid: &str,
        target_username: &str,
        body: &str,
    ) {
        let target = if !target_userid.is_empty() {
            self.store.get_user_by_id(target_userid)
        } else {
            self.store.get_user_by_username(target_username)
        };
        let target = match target {
            Ok(Some(user)) => user,
            Ok(None) => {
                conn.send(ServerMessage::error(ErrorToken::InvalidMessageTarget));
                return;
            }
            Err(e) => {
                eprintln!("store error during chat: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };

        match self.store.insert_message(author_id, None, Some(&target.id), body) {
            Ok(msg) => {
                let item = ServerMessage::Chat {
                    messages: vec![wire::ChatItemResponse {
                        id: msg.id,
                        authorname: author_name.to_string(),
                        authorid: msg.author_id,
                        target_username: Some(target.username.clone()),
                        roomid: NONE_ID.to_string(),
                        target_userid: msg.target_user_id,
                        message: msg.body,
                        createdate: msg.created_at,
                    }],
                };
                conn.send(item.clone());
                self.rooms.send_to_user(&target.id, item);
            }
            Err(StoreError::Constraint(_)) => {
                // The recipient has blocked the sender: spec mandates total
                // silence here, not an error frame (see scenario 4).
            }
            Err(e @ StoreError::Connection(_)) => {
                eprintln!("store error during chat: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
            }
        }
    }

    fn handle_blacklist(&self, conn: &mut Connection, userid: String, blocked_username: String) {
        if conn.user_id.as_deref() != Some(userid.as_str()) {
            return;
        }
        let target = match self.store.get_user_by_username(&blocked_username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                conn.send(ServerMessage::error(ErrorToken::InvalidBlacklist));
                return;
            }
            Err(e) => {
                eprintln!("store error during blacklist: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };
        match self.store.insert_blacklist(&userid, &target.id) {
            Ok(()) => conn.send(ServerMessage::BlacklistResponse {
                userid,
                blocked_username: target.username,
            }),
            Err(e) => {
                let err = map_store_error(e, ErrorToken::InvalidBlacklist);
                conn.send(ServerMessage::error(err.token));
            }
        }
    }

    fn handle_unblock(&self, conn: &mut Connection, userid: String, blocked_username: String) {
        if conn.user_id.as_deref() != Some(userid.as_str()) {
            return;
        }
        let target = match self.store.get_user_by_username(&blocked_username) {
            Ok(Some(user)) => user,
            Ok(None) => {
                conn.send(ServerMessage::error(ErrorToken::InvalidBlacklist));
                return;
            }
            Err(e) => {
                eprintln!("store error during unblock: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
                return;
            }
        };
        match self.store.delete_blacklist(&userid, &target.id) {
            Ok(true) => conn.send(ServerMessage::UnblockResponse {
                userid,
                blocked_username: target.username,
            }),
            Ok(false) => conn.send(ServerMessage::error(ErrorToken::InvalidBlacklist)),
            Err(e) => {
                eprintln!("store error during unblock: {e}");
                conn.send(ServerMessage::error(ErrorToken::ServerError));
            }
        }
    }

    /// Moves a connection into `room_id`, leaving its previous room first.
    /// Idempotent if already a member of the target room.
    fn move_to_room(&self, conn: &mut Connection, room_id: &str, _room_name: &str) {
        if let Some(old_room_id) = conn.room_id.clone() {
            if old_room_id != room_id {
                if let Some(uid) = &conn.user_id {
                    self.rooms.leave_room(&old_room_id, uid);
                }
            }
        }
        if let (Some(uid), Some(username)) = (conn.user_id.clone(), conn.username.clone()) {
            self.rooms.join_room(room_id, &uid, &username);
        }
        conn.enter_room(room_id.to_string());
    }

    fn send_history(&self, conn: &mut Connection, room_id: &str) {
        let limit = self.store.default_history_limit();
        match self.store.get_room_messages(room_id, limit) {
            Ok(history) => {
                let messages = history.into_iter().map(Into::into).collect();
                conn.send(ServerMessage::Chat { messages });
            }
            Err(e) => eprintln!("failed to load room history for {room_id}: {e}"),
        }
    }
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<ServerMessage>) {
    while let Some(message) = rx.recv().await {
        match tokio::time::timeout(WRITE_TIMEOUT, wire::write_frame(&mut write_half, &message)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("write failed, closing connection: {e}");
                break;
            }
            Err(_) => {
                eprintln!("write timed out, closing connection");
                break;
            }
        }
    }
}
