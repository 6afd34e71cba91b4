//! Chunked write/read round trips through the dispatcher and the full
//! framed connection loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use lily::api;
use lily::server::connection;
use lily::Server;
use lily_api_types::Auth;
use lily_config::{DriveConfig, ServerConfig, SessionPolicy};
use lily_protocol::{
    wire, ChunkChannel, ChunkSink, ChunkSource, NullChunks, Request, Response, Value,
};

fn test_server(dir: &tempfile::TempDir) -> Arc<Server> {
    Server::new(ServerConfig {
        name: "test".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        users_file: dir.path().join("users.json"),
        drives: vec![DriveConfig {
            name: "d".to_string(),
            dir: dir.path().join("drives/d"),
            file: dir.path().join("drives/d.drive"),
        }],
        num_workers: 4,
        network_timeout_secs: 5,
        chunk_idle_timeout_secs: 1,
        session_sweep_interval_secs: 60,
        flush_interval_secs: 300,
        log_level: "info".to_string(),
        rate_limit_per_sec: 0,
        session: SessionPolicy::default(),
        admin_user: Some("root".to_string()),
        admin_password: Some("rootpw".to_string()),
    })
    .unwrap()
}

fn admin() -> Auth {
    Auth::Credential {
        username: "root".to_string(),
        password: "rootpw".to_string(),
    }
}

fn request(auth: Auth, command: &str, params: &[(&str, Value)]) -> Request {
    Request {
        auth,
        command: command.to_string(),
        params: params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<HashMap<_, _>>(),
    }
}

async fn call(server: &Arc<Server>, auth: Auth, command: &str, params: &[(&str, Value)]) -> Response {
    let mut chunks = NullChunks;
    api::handle_request(server, request(auth, command, params), &mut chunks)
        .await
        .response
}

fn str_list(items: &[&str]) -> Value {
    Value::List(items.iter().map(|s| Value::Str(s.to_string())).collect())
}

fn drive_params(paths: &[&str]) -> Vec<(&'static str, Value)> {
    vec![
        ("drive", Value::Str("d".into())),
        ("paths", str_list(paths)),
    ]
}

#[tokio::test]
async fn test_write_then_read_files() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir);

    assert_eq!(
        call(&server, admin(), "createdirs", &drive_params(&["/x"])).await.code,
        0
    );
    assert_eq!(
        call(&server, admin(), "createfiles", &drive_params(&["/x/f"])).await.code,
        0
    );

    // stream one 5 byte frame then the terminator into the file
    let (mut client, mut server_side) = tokio::io::duplex(64 * 1024);
    let feeder = tokio::spawn(async move {
        let mut chunks = ChunkChannel::new(&mut client, Duration::from_secs(1));
        chunks.send(b"hello").await.unwrap();
        chunks.finish().await.unwrap();
    });

    let mut params = drive_params(&["/x/f"]);
    params.push(("start", Value::List(vec![Value::Int(0)])));
    params.push(("clear", Value::List(vec![Value::Bool(true)])));
    let outcome = {
        let mut chunks = ChunkChannel::new(&mut server_side, Duration::from_secs(1));
        api::handle_request(&server, request(admin(), "writefiles", &params), &mut chunks).await
    };
    assert_eq!(outcome.response.code, 0, "{}", outcome.response.message);
    assert!(!outcome.close);
    feeder.await.unwrap();

    // stat sees the new length
    let response = call(&server, admin(), "stat", &drive_params(&["/x/f"])).await;
    assert_eq!(response.code, 0);
    match response.data.get("entries") {
        Some(Value::List(entries)) => match &entries[0] {
            Value::Map(entry) => {
                assert_eq!(entry.get("exists"), Some(&Value::Bool(true)));
                assert_eq!(entry.get("length"), Some(&Value::Int(5)));
            }
            other => panic!("expected map entry, got {:?}", other),
        },
        other => panic!("expected entries list, got {:?}", other),
    }

    // read the same bytes back
    let (mut client, mut server_side) = tokio::io::duplex(64 * 1024);
    let drain = tokio::spawn(async move {
        let mut chunks = ChunkChannel::new(&mut client, Duration::from_secs(1));
        let mut out = Vec::new();
        while let Some(frame) = chunks.recv().await.unwrap() {
            out.extend_from_slice(&frame);
        }
        out
    });

    let mut params = drive_params(&["/x/f"]);
    params.push(("start", Value::List(vec![Value::Int(0)])));
    params.push(("end", Value::List(vec![Value::Int(-1)])));
    params.push(("chunksize", Value::Int(4096)));
    let outcome = {
        let mut chunks = ChunkChannel::new(&mut server_side, Duration::from_secs(1));
        api::handle_request(&server, request(admin(), "readfiles", &params), &mut chunks).await
    };
    assert_eq!(outcome.response.code, 0, "{}", outcome.response.message);
    drop(server_side);

    assert_eq!(drain.await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_oversized_chunk_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir);

    call(&server, admin(), "createfiles", &drive_params(&["/f"])).await;

    let mut params = drive_params(&["/f"]);
    params.push(("chunksize", Value::Int(2_000_000)));
    let response = call(&server, admin(), "readfiles", &params).await;
    assert_eq!(response.code, 18);
}

#[tokio::test]
async fn test_failed_write_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir);

    // no such file: validation fails before any stream is consumed, and
    // the connection is marked for closing because the client's pending
    // frames can no longer be trusted
    let outcome = {
        let mut chunks = NullChunks;
        api::handle_request(
            &server,
            request(admin(), "writefiles", &drive_params(&["/ghost"])),
            &mut chunks,
        )
        .await
    };
    assert_eq!(outcome.response.code, 15);
    assert!(outcome.close);
}

#[tokio::test]
async fn test_full_connection_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir);

    let (mut client, mut server_side) = tokio::io::duplex(64 * 1024);

    let service = {
        let server = server.clone();
        tokio::spawn(async move { connection::handle_connection(&server, &mut server_side).await })
    };

    // ping, then an authenticated command, over the framed protocol
    wire::write_request(&mut client, &request(Auth::Anonymous, "ping", &[]))
        .await
        .unwrap();
    let response = wire::read_response(&mut client).await.unwrap();
    assert_eq!(response.code, 0);
    assert_eq!(response.message, "pong");

    wire::write_request(
        &mut client,
        &request(admin(), "createdirs", &drive_params(&["/over-the-wire"])),
    )
    .await
    .unwrap();
    let response = wire::read_response(&mut client).await.unwrap();
    assert_eq!(response.code, 0, "{}", response.message);

    // clean EOF ends the connection loop
    client.shutdown().await.unwrap();
    drop(client);
    service.await.unwrap().unwrap();

    let response = call(&server, admin(), "listdir", &[
        ("drive", Value::Str("d".into())),
        ("path", Value::Str("/".into())),
    ])
    .await;
    match response.data.get("entries") {
        Some(Value::List(entries)) => assert_eq!(entries.len(), 1),
        other => panic!("expected entries, got {:?}", other),
    }
}

#[tokio::test]
async fn test_shutdown_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let server = test_server(&dir);

    let (mut client, mut server_side) = tokio::io::duplex(64 * 1024);
    let service = {
        let server = server.clone();
        tokio::spawn(async move { connection::handle_connection(&server, &mut server_side).await })
    };

    wire::write_request(&mut client, &request(admin(), "shutdown", &[]))
        .await
        .unwrap();
    // the response arrives before the listener state flips
    let response = wire::read_response(&mut client).await.unwrap();
    assert_eq!(response.code, 0);

    service.await.unwrap().unwrap();
    assert!(server.state.is_shutdown());
}
