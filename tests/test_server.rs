//! End-to-end tests over in-memory streams and real sockets.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier::http::connection::Connection;
use courier::router::Router;
use courier::server::listener::{Limits, serve};
use courier::storage::FileStore;
use flate2::read::GzDecoder;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

fn spawn_connection(limit: usize) -> (DuplexStream, JoinHandle<anyhow::Result<()>>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let router = Arc::new(Router::new(FileStore::new(dir.path())));
    let (client, server) = tokio::io::duplex(64 * 1024);

    let handle = tokio::spawn(async move {
        let mut conn = Connection::new(server, router).with_max_request_bytes(limit);
        conn.run().await
    });

    (client, handle, dir)
}

async fn start_server() -> (SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let router = Arc::new(Router::new(FileStore::new(dir.path())));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let limits = Limits {
        max_connections: Some(64),
        max_request_bytes: 1024 * 1024,
    };

    tokio::spawn(serve(listener, router, limits));
    (addr, dir)
}

/// Sends one request with `Connection: close` and returns everything the server wrote.
async fn exchange(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .unwrap()
        .unwrap();
    out
}

fn split_head(bytes: &[u8]) -> (String, Vec<u8>) {
    let end = bytes.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
    (
        String::from_utf8(bytes[..end + 4].to_vec()).unwrap(),
        bytes[end + 4..].to_vec(),
    )
}

async fn read_exact_len(client: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    buf
}

#[tokio::test]
async fn test_connection_serves_until_eof() {
    let (mut client, handle, _dir) = spawn_connection(1024 * 1024);

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").await.unwrap();
    let expected = b"HTTP/1.1 200 OK\r\n\r\n";
    assert_eq!(read_exact_len(&mut client, expected.len()).await, expected.to_vec());

    client.write_all(b"GET /missing HTTP/1.1\r\n\r\n").await.unwrap();
    let expected = b"HTTP/1.1 404 Not Found\r\n\r\n";
    assert_eq!(read_exact_len(&mut client, expected.len()).await, expected.to_vec());

    client.shutdown().await.unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_request_split_across_reads() {
    let (mut client, handle, _dir) = spawn_connection(1024 * 1024);

    client.write_all(b"GET /echo/split HTTP/1.1\r\nHo").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.write_all(b"st: localhost\r\n\r\n").await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert_eq!(
        out,
        b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\nContent-length: 5\r\n\r\nsplit".to_vec()
    );
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_pipelined_requests() {
    let (mut client, handle, _dir) = spawn_connection(1024 * 1024);

    client
        .write_all(
            b"POST /files/p HTTP/1.1\r\nContent-Length: 3\r\n\r\nabcGET /files/p HTTP/1.1\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    let created = b"HTTP/1.1 201 Created\r\n\r\n";
    assert!(out.starts_with(created));
    assert_eq!(
        &out[created.len()..],
        b"HTTP/1.1 200 OK\r\nContent-type: application/octet-stream\r\nContent-length: 3\r\n\r\nabc"
    );
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_recovers_from_malformed_request() {
    let (mut client, handle, _dir) = spawn_connection(1024 * 1024);

    client.write_all(b"NONSENSE\r\n\r\n").await.unwrap();
    let expected = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";
    assert_eq!(read_exact_len(&mut client, expected.len()).await, expected.to_vec());

    client.write_all(b"GET /echo/ok HTTP/1.1\r\nConnection: close\r\n\r\n").await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert!(out.starts_with(b"HTTP/1.1 200 OK\r\n"));
    assert!(out.ends_with(b"\r\n\r\nok"));
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_truncated_request_at_eof() {
    let (mut client, handle, _dir) = spawn_connection(1024 * 1024);

    client.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n").await.unwrap();
    client.shutdown().await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec());
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_connection_oversized_request_is_rejected() {
    let (mut client, handle, _dir) = spawn_connection(64);

    let mut request = b"GET / HTTP/1.1\r\nX-Padding: ".to_vec();
    request.extend(std::iter::repeat_n(b'a', 256));
    client.write_all(&request).await.unwrap();

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert_eq!(out, b"HTTP/1.1 500 Internal Server Error\r\n\r\n".to_vec());
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_tcp_root_and_not_found() {
    let (addr, _dir) = start_server().await;

    assert_eq!(
        exchange(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await,
        b"HTTP/1.1 200 OK\r\n\r\n".to_vec()
    );
    assert_eq!(
        exchange(
            addr,
            b"GET /nowhere HTTP/1.1\r\nAccept-Encoding: br\r\nConnection: close\r\n\r\n"
        )
        .await,
        b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec()
    );
}

#[tokio::test]
async fn test_tcp_user_agent_reflect() {
    let (addr, _dir) = start_server().await;

    let out = exchange(
        addr,
        b"GET /user-agent HTTP/1.1\r\nHost: localhost:4221\r\nUser-Agent: foobar/1.2.3\r\nConnection: close\r\n\r\n",
    )
    .await;
    let (head, body) = split_head(&out);

    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-type: text/plain\r\n"));
    assert!(head.contains("Content-length: 12\r\n"));
    assert_eq!(body, b"foobar/1.2.3".to_vec());
}

#[tokio::test]
async fn test_tcp_gzip_echo() {
    let (addr, _dir) = start_server().await;

    let out = exchange(
        addr,
        b"GET /echo/compress-me HTTP/1.1\r\nAccept-Encoding: invalid, gzip\r\nConnection: close\r\n\r\n",
    )
    .await;
    let (head, body) = split_head(&out);

    assert!(head.contains("Content-Encoding: gzip\r\n"));
    assert!(head.contains(&format!("Content-length: {}\r\n", body.len())));

    let mut decoded = String::new();
    GzDecoder::new(&body[..]).read_to_string(&mut decoded).unwrap();
    assert_eq!(decoded, "compress-me");
}

#[tokio::test]
async fn test_tcp_concurrent_file_posts() {
    let (addr, dir) = start_server().await;

    let mut handles = Vec::new();
    for i in 0..16 {
        handles.push(tokio::spawn(async move {
            let body = format!("payload number {i}");
            let request = format!(
                "POST /files/file-{i} HTTP/1.1\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            exchange(addr, request.as_bytes()).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), b"HTTP/1.1 201 Created\r\n\r\n".to_vec());
    }

    for i in 0..16 {
        let out = exchange(
            addr,
            format!("GET /files/file-{i} HTTP/1.1\r\nConnection: close\r\n\r\n").as_bytes(),
        )
        .await;
        let (head, body) = split_head(&out);
        assert!(head.contains("Content-type: application/octet-stream\r\n"));
        assert_eq!(body, format!("payload number {i}").into_bytes());
    }

    assert_eq!(
        std::fs::read_to_string(dir.path().join("file-3")).unwrap(),
        "payload number 3"
    );
}

#[tokio::test]
async fn test_tcp_keeps_accepting_after_aborted_clients() {
    let (addr, _dir) = start_server().await;

    for _ in 0..32 {
        let stream = TcpStream::connect(addr).await.unwrap();
        drop(stream);
    }

    assert_eq!(
        exchange(addr, b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await,
        b"HTTP/1.1 200 OK\r\n\r\n".to_vec()
    );
}

#[tokio::test]
async fn test_tcp_read_never_written_file() {
    let (addr, _dir) = start_server().await;

    assert_eq!(
        exchange(addr, b"GET /files/ghost HTTP/1.1\r\nConnection: close\r\n\r\n").await,
        b"HTTP/1.1 404 Not Found\r\n\r\n".to_vec()
    );
}
