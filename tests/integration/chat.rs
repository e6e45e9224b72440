use serde_json::json;

use crate::support::{recv_line, register_and_login, send_line, spawn_server};

#[tokio::test]
async fn room_chat_fans_out_to_every_member_including_the_sender() {
    let server = spawn_server().await;
    let (mut ra, mut wa, id_a, lobby_id) = register_and_login(server.addr, "alice_chat").await;
    let (mut rb, mut _wb, _id_b, _lobby_id_b) = register_and_login(server.addr, "bob_chat").await;

    send_line(
        &mut wa,
        &json!({
            "message_type": "message_chat",
            "messages": [{
                "authorid": id_a,
                "roomid": lobby_id,
                "target_userid": "",
                "message": "hi",
            }],
        }),
    )
    .await;

    let to_sender = recv_line(&mut ra).await;
    assert_eq!(to_sender["message_type"], "message_chat");
    assert_eq!(to_sender["messages"][0]["message"], "hi");
    assert_eq!(to_sender["messages"][0]["authorname"], "alice_chat");
    assert!(!to_sender["messages"][0]["id"].as_str().unwrap().is_empty());

    let to_other = recv_line(&mut rb).await;
    assert_eq!(to_other["message_type"], "message_chat");
    assert_eq!(to_other["messages"][0]["message"], "hi");
}

#[tokio::test]
async fn direct_message_delivers_to_sender_and_target_only() {
    let server = spawn_server().await;
    let (mut ra, mut wa, id_a, _room_a) = register_and_login(server.addr, "dm_alice").await;
    let (mut rb, mut _wb, _id_b, _room_b) = register_and_login(server.addr, "dm_bob").await;
    let (mut rc, mut _wc, _id_c, _room_c) = register_and_login(server.addr, "dm_carol").await;

    send_line(
        &mut wa,
        &json!({
            "message_type": "message_chat",
            "messages": [{
                "authorid": id_a,
                "roomid": "",
                "target_username": "dm_bob",
                "message": "hey",
            }],
        }),
    )
    .await;

    let to_sender = recv_line(&mut ra).await;
    assert_eq!(to_sender["messages"][0]["message"], "hey");
    assert_eq!(to_sender["messages"][0]["target_username"], "dm_bob");

    let to_target = recv_line(&mut rb).await;
    assert_eq!(to_target["messages"][0]["message"], "hey");

    let nothing_for_carol =
        tokio::time::timeout(std::time::Duration::from_millis(150), recv_line(&mut rc)).await;
    assert!(nothing_for_carol.is_err());
}

#[tokio::test]
async fn chat_item_with_no_target_is_invalid_message_target() {
    let server = spawn_server().await;
    let (mut r, mut w, id, _lobby_id) = register_and_login(server.addr, "kira").await;
    send_line(
        &mut w,
        &json!({
            "message_type": "message_chat",
            "messages": [{
                "authorid": id,
                "roomid": "",
                "target_userid": "",
                "target_username": "",
                "message": "nobody's listening",
            }],
        }),
    )
    .await;
    let err = recv_line(&mut r).await;
    assert_eq!(err["message_type"], "message_error");
    assert_eq!(err["errortype"], "invalid_message_target");
}

#[tokio::test]
async fn a_batch_may_mix_room_and_dm_items() {
    let server = spawn_server().await;
    let (mut ra, mut wa, id_a, lobby_id) = register_and_login(server.addr, "mixed_alice").await;
    let (mut rb, mut _wb, _id_b, _room_b) = register_and_login(server.addr, "mixed_bob").await;

    send_line(
        &mut wa,
        &json!({
            "message_type": "message_chat",
            "messages": [
                {"authorid": id_a, "roomid": lobby_id, "target_userid": "", "message": "room hi"},
                {"authorid": id_a, "roomid": "", "target_username": "mixed_bob", "message": "dm hi"},
            ],
        }),
    )
    .await;

    let room_echo = recv_line(&mut ra).await;
    assert_eq!(room_echo["messages"][0]["message"], "room hi");
    let dm_echo = recv_line(&mut ra).await;
    assert_eq!(dm_echo["messages"][0]["message"], "dm hi");

    let room_to_bob = recv_line(&mut rb).await;
    assert_eq!(room_to_bob["messages"][0]["message"], "room hi");
    let dm_to_bob = recv_line(&mut rb).await;
    assert_eq!(dm_to_bob["messages"][0]["message"], "dm hi");
}
