//! Durable persistence for users, rooms, messages, and the blacklist.
//!
//! Schema and trigger predicates are part of the protocol's semantic
//! contract, not an implementation detail — see spec §4.5. Column names are
//! preserved verbatim so the store stays wire-compatible.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{ChatMessageView, Message, Room, User, DEFAULT_HISTORY_LIMIT, LOBBY_NAME, NONE_ID};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or trigger ABORT predicate was violated (logical error).
    #[error("constraint violated: {0}")]
    Constraint(String),
    /// The underlying connection failed (operational error).
    #[error("database connection error: {0}")]
    Connection(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(sqlite_err, msg) = &e
            && sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation
        {
            return StoreError::Constraint(msg.clone().unwrap_or_else(|| sqlite_err.to_string()));
        }
        StoreError::Connection(e.to_string())
    }
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn new(path: &str) -> Self {
        let conn = Connection::open(path).expect("failed to open conchat database");
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.migrate();
        store
    }

    /// In-memory store for tests: same schema, backed by SQLite's `:memory:`.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let conn = Connection::open(":memory:").expect("failed to open in-memory database");
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .expect("failed to set pragmas");
        let store = Store {
            conn: Mutex::new(conn),
        };
        store.migrate();
        store
    }

    fn migrate(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rooms (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                room_id TEXT NOT NULL DEFAULT 'NONE' REFERENCES rooms(id) ON DELETE CASCADE,
                target_user_id TEXT NOT NULL DEFAULT 'NONE' REFERENCES users(id) ON DELETE CASCADE,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                seq INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_messages_room_created ON messages(room_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_messages_room_seq ON messages(room_id, seq);

            CREATE TABLE IF NOT EXISTS blacklisted_users (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                blocked_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                UNIQUE(user_id, blocked_user_id)
            );

            CREATE TRIGGER IF NOT EXISTS trigger_block_none_message
            BEFORE INSERT ON messages
            WHEN NEW.author_id = 'NONE'
                OR (NEW.room_id = 'NONE' AND NEW.target_user_id = 'NONE')
            BEGIN
                SELECT RAISE(ABORT, 'message must have a real author and a room or target');
            END;

            CREATE TRIGGER IF NOT EXISTS trigger_block_message_insert
            BEFORE INSERT ON messages
            WHEN EXISTS (
                SELECT 1 FROM blacklisted_users
                WHERE user_id = NEW.target_user_id AND blocked_user_id = NEW.author_id
            )
            BEGIN
                SELECT RAISE(ABORT, 'recipient has blocked this sender');
            END;",
        )
        .expect("failed to run migrations");

        let now = now_str();

        conn.execute(
            "INSERT OR IGNORE INTO users (id, username, password, created_at) VALUES (?1, ?1, ?1, ?2)",
            params![NONE_ID, &now],
        )
        .expect("failed to seed NONE user");

        conn.execute(
            "INSERT OR IGNORE INTO rooms (id, name, created_at) VALUES (?1, ?1, ?2)",
            params![NONE_ID, &now],
        )
        .expect("failed to seed NONE room");

        let lobby_exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM rooms WHERE name = ?1)",
                params![LOBBY_NAME],
                |row| row.get(0),
            )
            .expect("failed to check for Lobby");
        if !lobby_exists {
            conn.execute(
                "INSERT INTO rooms (id, name, created_at) VALUES (?1, ?2, ?3)",
                params![uuid::Uuid::new_v4().to_string(), LOBBY_NAME, &now],
            )
            .expect("failed to seed Lobby");
        }
    }

    pub fn insert_user(&self, username: &str, password_hash: &str) -> Result<User, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_str();
        conn.execute(
            "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![&id, username, password_hash, &now],
        )?;
        Ok(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
        })
    }

    pub fn insert_room(&self, name: &str) -> Result<Room, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_str();
        conn.execute(
            "INSERT INTO rooms (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![&id, name, &now],
        )?;
        Ok(Room {
            id,
            name: name.to_string(),
            created_at: now,
        })
    }

    /// Insert a chat message. Pass `None` for whichever of `room_id`/
    /// `target_user_id` doesn't apply; the sentinel is substituted.
    pub fn insert_message(
        &self,
        author_id: &str,
        room_id: Option<&str>,
        target_user_id: Option<&str>,
        body: &str,
    ) -> Result<Message, StoreError> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_str();
        let room_id = room_id.unwrap_or(NONE_ID);
        let target_user_id = target_user_id.unwrap_or(NONE_ID);
        let seq: i64 = conn.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages", [], |r| {
            r.get(0)
        })?;
        conn.execute(
            "INSERT INTO messages (id, author_id, room_id, target_user_id, body, created_at, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![&id, author_id, room_id, target_user_id, body, &now, seq],
        )?;
        Ok(Message {
            id,
            author_id: author_id.to_string(),
            room_id: room_id.to_string(),
            target_user_id: target_user_id.to_string(),
            body: body.to_string(),
            created_at: now,
        })
    }

    pub fn insert_blacklist(&self, user_id: &str, blocked_user_id: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        let now = now_str();
        conn.execute(
            "INSERT INTO blacklisted_users (user_id, blocked_user_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id, blocked_user_id, &now],
        )?;
        Ok(())
    }

    /// Returns `true` if a row was deleted, `false` if the pair didn't exist.
    pub fn delete_blacklist(&self, user_id: &str, blocked_user_id: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM blacklisted_users WHERE user_id = ?1 AND blocked_user_id = ?2",
            params![user_id, blocked_user_id],
        )?;
        Ok(affected > 0)
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, password, created_at FROM users WHERE username = ?1",
            params![username],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, username, password, created_at FROM users WHERE id = ?1",
            params![id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn get_room_by_name(&self, name: &str) -> Result<Option<Room>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, created_at FROM rooms WHERE name = ?1",
            params![name],
            |row| {
                Ok(Room {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn get_room_by_id(&self, id: &str) -> Result<Option<Room>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, created_at FROM rooms WHERE id = ?1",
            params![id],
            |row| {
                Ok(Room {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// All rooms except the `NONE` sentinel, sorted by name ascending.
    pub fn get_room_list(&self) -> Result<Vec<Room>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, name, created_at FROM rooms WHERE id != ?1 ORDER BY name COLLATE NOCASE ASC",
        )?;
        let rooms = stmt
            .query_map(params![NONE_ID], |row| {
                Ok(Room {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rooms)
    }

    /// Most recent `limit` messages in a room, oldest-first within the window.
    pub fn get_room_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageView>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT m.id, m.author_id, au.username, m.room_id, m.target_user_id, tu.username, m.body, m.created_at
             FROM messages m
             JOIN users au ON au.id = m.author_id
             LEFT JOIN users tu ON tu.id = m.target_user_id AND tu.id != ?2
             WHERE m.room_id = ?1
             ORDER BY m.seq DESC
             LIMIT ?3",
        )?;
        let mut rows: Vec<ChatMessageView> = stmt
            .query_map(params![room_id, NONE_ID, limit.max(0)], |row| {
                Ok(ChatMessageView {
                    id: row.get(0)?,
                    author_id: row.get(1)?,
                    author_name: row.get(2)?,
                    room_id: row.get(3)?,
                    target_user_id: row.get(4)?,
                    target_username: row.get(5)?,
                    body: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();
        Ok(rows)
    }

    pub fn default_history_limit(&self) -> i64 {
        DEFAULT_HISTORY_LIMIT
    }
}

fn now_str() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f+00:00").to_string()
}
