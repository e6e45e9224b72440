use serde_json::json;

use crate::support::{recv_line, register_and_login, send_line, spawn_server};

#[tokio::test]
async fn create_room_then_join_round_trips_with_history() {
    let server = spawn_server().await;
    let (mut r, mut w, id, _lobby_id) = register_and_login(server.addr, "dana").await;

    send_line(&mut w, &json!({"message_type": "create_room", "name": "general"})).await;
    let created = recv_line(&mut r).await;
    assert_eq!(created["message_type"], "create_room_response");
    assert_eq!(created["name"], "general");

    let joined = recv_line(&mut r).await;
    assert_eq!(joined["message_type"], "join_room_response");
    assert_eq!(joined["roomname"], "general");
    assert_eq!(joined["userid"], id);

    let history = recv_line(&mut r).await;
    assert_eq!(history["message_type"], "message_chat");
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn creating_a_duplicate_room_name_is_invalid_room() {
    let server = spawn_server().await;
    let (mut r, mut w, _id, _lobby_id) = register_and_login(server.addr, "emma").await;
    send_line(&mut w, &json!({"message_type": "create_room", "name": "shared"})).await;
    let _ = recv_line(&mut r).await; // create_room_response
    let _ = recv_line(&mut r).await; // join_room_response
    let _ = recv_line(&mut r).await; // history

    send_line(&mut w, &json!({"message_type": "create_room", "name": "shared"})).await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["message_type"], "message_error");
    assert_eq!(err["errortype"], "invalid_room");
}

#[tokio::test]
async fn join_nonexistent_room_reports_room_not_found() {
    let server = spawn_server().await;
    let (mut r, mut w, id, _lobby_id) = register_and_login(server.addr, "erin").await;
    send_line(
        &mut w,
        &json!({"message_type": "join_room", "userid": id, "roomname": "ghosts"}),
    )
    .await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["message_type"], "message_error");
    assert_eq!(err["errortype"], "room_not_found");
}

#[tokio::test]
async fn list_rooms_always_includes_lobby() {
    let server = spawn_server().await;
    let (mut r, mut w, _id, _lobby_id) = register_and_login(server.addr, "frank").await;
    send_line(&mut w, &json!({"message_type": "list_rooms"})).await;
    let resp = recv_line(&mut r).await;
    let rooms: Vec<String> = resp["rooms"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(rooms.contains(&"Lobby".to_string()));
}

#[tokio::test]
async fn list_users_reports_room_members() {
    let server = spawn_server().await;
    let (mut r, mut w, _id, lobby_id) = register_and_login(server.addr, "gina").await;
    let (mut _r2, mut _w2, _id2, _lobby2) = register_and_login(server.addr, "harry").await;

    send_line(&mut w, &json!({"message_type": "list_users", "roomid": lobby_id})).await;
    let resp = recv_line(&mut r).await;
    assert_eq!(resp["message_type"], "list_users");
    assert_eq!(resp["roomname"], "Lobby");
    let users: Vec<String> = resp["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(users.contains(&"gina".to_string()));
    assert!(users.contains(&"harry".to_string()));
}

#[tokio::test]
async fn an_evicted_room_re_materializes_on_next_join() {
    let server = spawn_server().await;
    {
        let (mut r, mut w, _id, _lobby_id) = register_and_login(server.addr, "iris").await;
        send_line(&mut w, &json!({"message_type": "create_room", "name": "temp-room"})).await;
        let _ = recv_line(&mut r).await;
        let _ = recv_line(&mut r).await;
        let _ = recv_line(&mut r).await;
        // Connection drops here, taking `iris` with it -- `temp-room` should
        // be swept from the in-memory registry on the next cleanup pass.
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let (mut r2, mut w2, id2, _lobby_id2) = register_and_login(server.addr, "jack").await;
    send_line(
        &mut w2,
        &json!({"message_type": "join_room", "userid": id2, "roomname": "temp-room"}),
    )
    .await;
    let joined = recv_line(&mut r2).await;
    assert_eq!(joined["message_type"], "join_room_response");
    assert_eq!(joined["roomname"], "temp-room");
}
