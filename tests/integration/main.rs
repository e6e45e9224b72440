
mod auth;
mod chat;
mod rooms;
mod wire;
