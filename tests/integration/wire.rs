use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::support::spawn_server;

#[tokio::test]
async fn non_json_frame_closes_the_connection_with_no_response() {
    let server = spawn_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"not json at all\n").await.unwrap();

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0, "a malformed frame must close the connection silently");
}

#[tokio::test]
async fn unknown_discriminator_closes_the_connection() {
    let server = spawn_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"{\"message_type\":\"not_a_real_type\"}\n")
        .await
        .unwrap();

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn oversized_frame_closes_the_connection() {
    let server = spawn_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let huge = "x".repeat(70 * 1024);
    stream.write_all(huge.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn blank_lines_between_frames_are_ignored() {
    let server = spawn_server().await;
    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"\n\n{\"message_type\":\"list_rooms\"}\n")
        .await
        .unwrap();

    let mut reader = tokio::io::BufReader::new(stream);
    let mut line = String::new();
    tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line)
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["message_type"], "list_rooms");
}
