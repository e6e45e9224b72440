//! The wire-visible error taxonomy (spec §6, §7).
//!
//! `ErrorToken` is what actually goes on the wire in a `message_error`
//! frame. `ServerError` is the internal error type handlers deal with;
//! it carries enough information to pick the right token, but is never
//! itself serialized.

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorToken {
    UsernameExists,
    InvalidBlacklist,
    InvalidUsernamePassword,
    InvalidMessageTarget,
    InvalidRoom,
    ServerError,
    RoomNotFound,
}

impl ErrorToken {
    pub fn message(self) -> &'static str {
        match self {
            ErrorToken::UsernameExists => "username already exists",
            ErrorToken::InvalidBlacklist => "invalid blacklist target",
            ErrorToken::InvalidUsernamePassword => "invalid username or password",
            ErrorToken::InvalidMessageTarget => "room or user does not exist",
            ErrorToken::InvalidRoom => "invalid room",
            ErrorToken::ServerError => "server error",
            ErrorToken::RoomNotFound => "room_not_found",
        }
    }
}

/// Errors a handler can produce. `Fatal` closes the connection with no
/// response (spec §7 taxonomy item 1); everything else yields a
/// `message_error` frame to the source.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("malformed frame: {0}")]
    Fatal(String),
    #[error(transparent)]
    User(#[from] UserError),
}

/// A logical or operational error that maps to one wire error token.
#[derive(Debug, Error)]
#[error("{token:?}: {detail}")]
pub struct UserError {
    pub token: ErrorToken,
    pub detail: String,
}

impl UserError {
    pub fn new(token: ErrorToken, detail: impl Into<String>) -> Self {
        UserError {
            token,
            detail: detail.into(),
        }
    }
}

/// Store errors bubble up as either an operational `server_error` or the
/// caller-supplied logical token for a constraint violation (spec §4.4's
/// failure-semantics table).
pub fn map_store_error(err: StoreError, logical_token: ErrorToken) -> UserError {
    match err {
        StoreError::Constraint(detail) => UserError::new(logical_token, detail),
        StoreError::Connection(detail) => {
            eprintln!("store connection error: {detail}");
            UserError::new(ErrorToken::ServerError, detail)
        }
    }
}
