use serde_json::json;

use crate::support::{connect, recv_line, send_line, spawn_server};

#[tokio::test]
async fn register_then_login_returns_lobby_binding_and_history() {
    let server = spawn_server().await;
    let (mut r, mut w) = connect(server.addr).await;

    send_line(
        &mut w,
        &json!({"message_type": "message_register", "username": "alice", "password": "pw"}),
    )
    .await;
    let registered = recv_line(&mut r).await;
    assert_eq!(registered["message_type"], "message_register_response");
    assert_eq!(registered["username"], "alice");
    assert_eq!(registered["status"], "registered");

    send_line(
        &mut w,
        &json!({"message_type": "message_login", "username": "alice", "password": "pw"}),
    )
    .await;
    let login = recv_line(&mut r).await;
    assert_eq!(login["message_type"], "message_login_response");
    assert_eq!(login["username"], "alice");
    assert_eq!(login["roomname"], "Lobby");
    assert!(!login["id"].as_str().unwrap().is_empty());

    let history = recv_line(&mut r).await;
    assert_eq!(history["message_type"], "message_chat");
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_register_reports_username_exists() {
    let server = spawn_server().await;
    let (mut r1, mut w1) = connect(server.addr).await;
    send_line(
        &mut w1,
        &json!({"message_type": "message_register", "username": "bob", "password": "pw"}),
    )
    .await;
    let first = recv_line(&mut r1).await;
    assert_eq!(first["message_type"], "message_register_response");

    let (mut r2, mut w2) = connect(server.addr).await;
    send_line(
        &mut w2,
        &json!({"message_type": "message_register", "username": "bob", "password": "different"}),
    )
    .await;
    let err = recv_line(&mut r2).await;
    assert_eq!(err["message_type"], "message_error");
    assert_eq!(err["errortype"], "username_exists");
}

#[tokio::test]
async fn wrong_password_reports_invalid_username_password_without_disclosure() {
    let server = spawn_server().await;
    let (mut r, mut w) = connect(server.addr).await;
    send_line(
        &mut w,
        &json!({"message_type": "message_register", "username": "carol", "password": "pw"}),
    )
    .await;
    let _ = recv_line(&mut r).await;

    send_line(
        &mut w,
        &json!({"message_type": "message_login", "username": "carol", "password": "wrong"}),
    )
    .await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["message_type"], "message_error");
    assert_eq!(err["errortype"], "invalid_username_password");
}

#[tokio::test]
async fn login_for_unknown_user_reports_invalid_username_password() {
    let server = spawn_server().await;
    let (mut r, mut w) = connect(server.addr).await;
    send_line(
        &mut w,
        &json!({"message_type": "message_login", "username": "nobody", "password": "pw"}),
    )
    .await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["errortype"], "invalid_username_password");
}

#[tokio::test]
async fn empty_credentials_are_rejected() {
    let server = spawn_server().await;
    let (mut r, mut w) = connect(server.addr).await;
    send_line(
        &mut w,
        &json!({"message_type": "message_register", "username": "", "password": ""}),
    )
    .await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["errortype"], "invalid_username_password");
}
