//! Integration tests driving the client against a scripted in-process FTP
//! server. The mock speaks just enough of the control protocol to exercise
//! the operation queue, passive data connections, and the error paths.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use rax_ftp_client::socket::BufferedSocket;
use rax_ftp_client::{ClientConfig, ClientEvent, FtpClient, FtpError, OperationId};

#[derive(Debug, Clone, Default)]
struct MockOptions {
    reject_login: bool,
    retr_payload: Vec<u8>,
    list_payload: Vec<u8>,
    size_reply: Option<u64>,
    /// Paths answered with 550 on RETR/DELE.
    missing_files: Vec<String>,
}

struct MockServer {
    addr: SocketAddr,
    /// Bytes received through STOR transfers.
    stored: Arc<Mutex<Vec<u8>>>,
}

async fn spawn_mock(options: MockOptions) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let stored = Arc::new(Mutex::new(Vec::new()));
    let stored_accept = Arc::clone(&stored);

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            let options = options.clone();
            let stored = Arc::clone(&stored_accept);
            tokio::spawn(handle_control(stream, options, stored));
        }
    });

    MockServer { addr, stored }
}

async fn handle_control(stream: TcpStream, options: MockOptions, stored: Arc<Mutex<Vec<u8>>>) {
    let (read_half, mut w) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    w.write_all(b"220 rax mock server ready\r\n").await.unwrap();

    let mut data_listener: Option<TcpListener> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        let mut parts = line.trim().splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
        let arg = parts.next().unwrap_or("").to_string();

        match cmd.as_str() {
            "USER" => {
                if options.reject_login {
                    w.write_all(b"530 Login incorrect.\r\n").await.unwrap();
                } else {
                    w.write_all(b"331 Password required\r\n").await.unwrap();
                }
            }
            "PASS" => w.write_all(b"230 Login successful\r\n").await.unwrap(),
            "TYPE" => w.write_all(b"200 Type set\r\n").await.unwrap(),
            "SIZE" => match options.size_reply {
                Some(size) => w
                    .write_all(format!("213 {}\r\n", size).as_bytes())
                    .await
                    .unwrap(),
                None => w
                    .write_all(b"550 Could not get file size\r\n")
                    .await
                    .unwrap(),
            },
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let port = listener.local_addr().unwrap().port();
                data_listener = Some(listener);
                let reply = format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{}).\r\n",
                    port / 256,
                    port % 256
                );
                w.write_all(reply.as_bytes()).await.unwrap();
            }
            "LIST" => {
                let Some(listener) = data_listener.take() else {
                    w.write_all(b"425 Use PASV first\r\n").await.unwrap();
                    continue;
                };
                w.write_all(b"150 Opening data connection\r\n")
                    .await
                    .unwrap();
                let (mut data, _) = listener.accept().await.unwrap();
                data.write_all(&options.list_payload).await.unwrap();
                data.shutdown().await.unwrap();
                drop(data);
                w.write_all(b"226 Transfer complete\r\n").await.unwrap();
            }
            "RETR" => {
                if options.missing_files.contains(&arg) {
                    w.write_all(b"550 File not found\r\n").await.unwrap();
                    continue;
                }
                let Some(listener) = data_listener.take() else {
                    w.write_all(b"425 Use PASV first\r\n").await.unwrap();
                    continue;
                };
                w.write_all(b"150 Opening data connection\r\n")
                    .await
                    .unwrap();
                let (mut data, _) = listener.accept().await.unwrap();
                data.write_all(&options.retr_payload).await.unwrap();
                data.shutdown().await.unwrap();
                drop(data);
                w.write_all(b"226 Transfer complete\r\n").await.unwrap();
            }
            "STOR" => {
                let Some(listener) = data_listener.take() else {
                    w.write_all(b"425 Use PASV first\r\n").await.unwrap();
                    continue;
                };
                w.write_all(b"150 Ready to receive\r\n").await.unwrap();
                let (mut data, _) = listener.accept().await.unwrap();
                let mut received = Vec::new();
                data.read_to_end(&mut received).await.unwrap();
                stored.lock().await.extend_from_slice(&received);
                w.write_all(b"226 Transfer complete\r\n").await.unwrap();
            }
            "DELE" => {
                if options.missing_files.contains(&arg) {
                    w.write_all(b"550 File not found\r\n").await.unwrap();
                } else {
                    w.write_all(b"250 File deleted\r\n").await.unwrap();
                }
            }
            "MKD" => w
                .write_all(format!("257 \"{}\" created\r\n", arg).as_bytes())
                .await
                .unwrap(),
            "RNFR" => w.write_all(b"350 Ready for RNTO\r\n").await.unwrap(),
            "RNTO" => w.write_all(b"250 Rename successful\r\n").await.unwrap(),
            "CWD" => w
                .write_all(b"250 Requested file action okay, completed\r\n")
                .await
                .unwrap(),
            "QUIT" => {
                w.write_all(b"221 Goodbye\r\n").await.unwrap();
                break;
            }
            _ => w.write_all(b"500 Unknown command\r\n").await.unwrap(),
        }
    }
}

fn finished_ops(events: &[ClientEvent]) -> Vec<(OperationId, Option<FtpError>, Vec<u8>)> {
    events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::OperationFinished { id, error, data } => {
                Some((*id, error.clone(), data.clone()))
            }
            _ => None,
        })
        .collect()
}

fn result_of(
    finished: &[(OperationId, Option<FtpError>, Vec<u8>)],
    id: OperationId,
) -> (Option<FtpError>, Vec<u8>) {
    let entry = finished
        .iter()
        .find(|(fid, _, _)| *fid == id)
        .unwrap_or_else(|| panic!("operation {} never finished", id));
    (entry.1.clone(), entry.2.clone())
}

#[tokio::test]
async fn test_connect_login_and_simple_operations() {
    let server = spawn_mock(MockOptions::default()).await;

    let mut client = FtpClient::new(ClientConfig::default());
    let connect = client.connect_to_host("127.0.0.1", server.addr.port());
    let login = client.login("alice", "secret");
    let mkdir = client.mkdir("reports");
    let rename = client.rename("old.txt", "new.txt");
    let remove = client.remove("stale.txt");
    let cd = client.cd("reports");
    let close = client.close();

    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);

    assert_eq!(finished.len(), 7);
    for id in [connect, login, mkdir, rename, remove, cd, close] {
        let (error, _) = result_of(&finished, id);
        assert_eq!(error, None, "operation {} should succeed", id);
    }
    assert!(client.is_idle());
}

#[tokio::test]
async fn test_login_failure_clears_pending_queue() {
    let server = spawn_mock(MockOptions {
        reject_login: true,
        ..MockOptions::default()
    })
    .await;

    let mut client = FtpClient::new(ClientConfig::default());
    let connect = client.connect_to_host("127.0.0.1", server.addr.port());
    let login = client.login("mallory", "wrong");
    let mkdir = client.mkdir("a");
    let rename = client.rename("b", "c");
    let remove = client.remove("d");

    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);

    let (connect_error, _) = result_of(&finished, connect);
    assert_eq!(connect_error, None);

    // The 530 is fatal: the in-flight login and every queued operation fail
    // with login-incorrect, and the queue ends up empty.
    for id in [login, mkdir, rename, remove] {
        let (error, _) = result_of(&finished, id);
        assert!(
            matches!(error, Some(FtpError::LoginIncorrect(_))),
            "operation {} should fail with LoginIncorrect, got {:?}",
            id,
            error
        );
    }
    assert!(client.is_idle());
    assert_eq!(client.pending_operations(), 0);
}

#[tokio::test]
async fn test_non_fatal_error_fails_only_current_operation() {
    let server = spawn_mock(MockOptions {
        missing_files: vec!["ghost.txt".to_string()],
        ..MockOptions::default()
    })
    .await;

    let mut client = FtpClient::new(ClientConfig::default());
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    let remove = client.remove("ghost.txt");
    let mkdir = client.mkdir("survivor");
    let close = client.close();

    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);

    let (remove_error, _) = result_of(&finished, remove);
    assert!(matches!(remove_error, Some(FtpError::FileNotFound(_))));

    // File-not-found is per-operation: the queue keeps going.
    let (mkdir_error, _) = result_of(&finished, mkdir);
    assert_eq!(mkdir_error, None);
    let (close_error, _) = result_of(&finished, close);
    assert_eq!(close_error, None);
}

#[tokio::test]
async fn test_list_parses_directory_entries() {
    let listing = b"total 2\r\n\
drwxr-xr-x   2 alice users   4096 Mar 12  2019 archive\r\n\
-rw-r--r--   1 alice users   4096 Jan  5 12:30 report.txt\r\n";
    let server = spawn_mock(MockOptions {
        list_payload: listing.to_vec(),
        ..MockOptions::default()
    })
    .await;

    let mut client = FtpClient::new(ClientConfig::default());
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    let list = client.list(None);
    client.close();

    let events = client.run_until_idle().await;
    let entries: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            ClientEvent::ListEntry(entry) => Some(entry.clone()),
            _ => None,
        })
        .collect();

    // The "total" line has too few tokens and is skipped.
    assert_eq!(entries.len(), 2);
    assert!(entries[0].is_dir());
    assert_eq!(entries[0].name, "archive");
    assert_eq!(entries[0].size, 4096);
    assert!(entries[0].modified_time.is_none());
    assert!(entries[1].is_file());
    assert_eq!(entries[1].name, "report.txt");
    assert!(entries[1].modified_time.is_some());

    let (list_error, _) = result_of(&finished_ops(&events), list);
    assert_eq!(list_error, None);
}

async fn round_trip(payload: Vec<u8>) {
    let server = spawn_mock(MockOptions {
        retr_payload: payload.clone(),
        size_reply: Some(payload.len() as u64),
        ..MockOptions::default()
    })
    .await;

    let mut client = FtpClient::new(ClientConfig::default());
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    let get = client.get("blob.bin");

    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);
    let (get_error, downloaded) = result_of(&finished, get);
    assert_eq!(get_error, None);
    assert_eq!(downloaded, payload);

    // Progress is reported against the SIZE probe.
    let progressed = events.iter().any(|event| {
        matches!(
            event,
            ClientEvent::TransferProgress { id, total, .. }
                if *id == get && *total == Some(payload.len() as u64)
        )
    });
    assert!(progressed, "expected TransferProgress for the download");

    // Upload the exact bytes we received on the same session.
    let put = client.put("copy.bin", downloaded);
    let close = client.close();
    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);
    assert_eq!(result_of(&finished, put).0, None);
    assert_eq!(result_of(&finished, close).0, None);

    let stored = server.stored.lock().await.clone();
    assert_eq!(stored, payload);
}

#[tokio::test]
async fn test_get_put_round_trip_below_block_size() {
    let payload: Vec<u8> = (0..100u8).collect();
    round_trip(payload).await;
}

#[tokio::test]
async fn test_get_put_round_trip_above_block_size() {
    // Several 1024-byte blocks plus a ragged tail.
    let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    round_trip(payload).await;
}

#[tokio::test]
async fn test_get_without_size_support_still_downloads() {
    let payload = b"no size probe here".to_vec();
    let server = spawn_mock(MockOptions {
        retr_payload: payload.clone(),
        size_reply: None,
        ..MockOptions::default()
    })
    .await;

    let mut client = FtpClient::new(ClientConfig::default());
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    let get = client.get("blob.bin");
    client.close();

    let events = client.run_until_idle().await;
    let (error, downloaded) = result_of(&finished_ops(&events), get);
    assert_eq!(error, None);
    assert_eq!(downloaded, payload);
}

#[tokio::test]
async fn test_client_is_reusable_after_close() {
    let server = spawn_mock(MockOptions::default()).await;

    let mut client = FtpClient::new(ClientConfig::default());
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    client.close();
    let events = client.run_until_idle().await;
    assert!(finished_ops(&events).iter().all(|(_, e, _)| e.is_none()));

    // A fresh control socket lets the same instance reconnect.
    client.connect_to_host("127.0.0.1", server.addr.port());
    client.login("alice", "secret");
    let mkdir = client.mkdir("again");
    client.close();
    let events = client.run_until_idle().await;
    assert_eq!(result_of(&finished_ops(&events), mkdir).0, None);
}

#[tokio::test]
async fn test_connection_refused_fails_queue() {
    // Grab a port with no listener behind it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = FtpClient::new(ClientConfig::default());
    let connect = client.connect_to_host("127.0.0.1", port);
    let list = client.list(None);

    let events = client.run_until_idle().await;
    let finished = finished_ops(&events);
    assert!(matches!(
        result_of(&finished, connect).0,
        Some(FtpError::ConnectionRefused(_))
    ));
    // The control channel never came up, so queued work fails too.
    assert!(result_of(&finished, list).0.is_some());
    assert!(client.is_idle());
}

#[tokio::test]
async fn test_write_order_preserved_across_coalescing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let reader = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        received
    });

    // A small threshold exercises both the coalescing path and the
    // immediate-flush path.
    let mut sock = BufferedSocket::with_limits(64, 0);
    sock.connect_to_host("127.0.0.1", addr.port()).await;
    sock.take_events();
    assert!(sock.is_connected());

    let mut expected = Vec::new();
    let pieces: Vec<Vec<u8>> = vec![
        b"one ".to_vec(),
        b"two ".to_vec(),
        vec![b'x'; 200],
        b" three".to_vec(),
        vec![b'y'; 64],
        b"tail".to_vec(),
    ];
    for piece in &pieces {
        sock.write(piece);
        expected.extend_from_slice(piece);
    }
    while sock.bytes_to_write() > 0 {
        sock.process().await;
    }
    sock.close();

    let received = reader.await.unwrap();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_read_line_waits_for_complete_line() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"HELLO\r\nWOR").await.unwrap();
        rx.await.unwrap();
        stream.write_all(b"LD\n").await.unwrap();
        // Keep the socket open while the client drains.
        tokio::time::sleep(Duration::from_millis(100)).await;
    });

    let mut sock = BufferedSocket::new();
    sock.connect_to_host("127.0.0.1", addr.port()).await;
    assert!(sock.is_connected());

    while !sock.can_read_line() {
        sock.process().await;
    }
    assert_eq!(sock.read_line().unwrap(), b"HELLO\r\n");

    // Wait until the partial "WOR" is buffered, then confirm read_line
    // neither returns nor consumes it.
    while sock.bytes_available() < 3 {
        sock.process().await;
    }
    assert!(sock.read_line().is_none());
    assert_eq!(sock.bytes_available(), 3);

    tx.send(()).unwrap();
    while !sock.can_read_line() {
        sock.process().await;
    }
    assert_eq!(sock.read_line().unwrap(), b"WORLD\n");

    server.await.unwrap();
}
