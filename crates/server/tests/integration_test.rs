use bytes::{Buf, Bytes, BytesMut};
use std::io::Cursor;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

use breezedb_common::ProtocolError;
use breezedb_protocol::Frame;
use breezedb_server::Server;

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Cliente RESP mínimo que guarda bytes sobrando entre leituras (pipelining).
struct TestClient {
    stream: TcpStream,
    buf: BytesMut,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> TestClient {
        TestClient {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: BytesMut::with_capacity(4096),
        }
    }

    async fn send_raw(&mut self, data: &[u8]) {
        self.stream.write_all(data).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    async fn send(&mut self, args: &[&str]) {
        let mut buf = BytesMut::new();
        Frame::array_from_strs(args).encode(&mut buf);
        self.send_raw(&buf).await;
    }

    async fn read_frame(&mut self) -> Frame {
        loop {
            let mut cursor = Cursor::new(&self.buf[..]);
            match Frame::parse(&mut cursor) {
                Ok(frame) => {
                    let n = cursor.position() as usize;
                    self.buf.advance(n);
                    return frame;
                }
                Err(ProtocolError::Incomplete) => {}
                Err(e) => panic!("invalid reply: {e}"),
            }

            let n = timeout(IO_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for reply")
                .unwrap();
            assert!(n > 0, "server closed connection unexpectedly");
        }
    }

    async fn command(&mut self, args: &[&str]) -> Frame {
        self.send(args).await;
        self.read_frame().await
    }

    /// Espera o servidor fechar a conexão sem enviar mais nada.
    async fn expect_closed(&mut self) {
        let res = timeout(IO_TIMEOUT, self.stream.read_buf(&mut self.buf))
            .await
            .expect("timed out waiting for close");
        match res {
            Ok(0) => {}
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
            Ok(_) => panic!("unexpected reply: {:?}", self.buf),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
}

async fn start_server() -> SocketAddr {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run(std::future::pending::<()>()));
    addr
}

fn bulk(s: &str) -> Frame {
    Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

#[tokio::test]
async fn test_ping_pong() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(client.command(&["PING"]).await, Frame::Simple("PONG".into()));
    assert_eq!(client.command(&["ping"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_reply_bytes_are_exact() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send(&["PING"]).await;
    client.send(&["GET", "missing"]).await;
    client.send(&["RPUSH", "l", "a"]).await;
    client.send(&["LRANGE", "l", "0", "-1"]).await;
    client.send(&["LRANGE", "l", "5", "9"]).await;
    client.send(&["NOPE"]).await;

    let expected: &[u8] =
        b"+PONG\r\n$-1\r\n:1\r\n*1\r\n$1\r\na\r\n*0\r\n-ERR unknown command 'NOPE'\r\n";
    let mut raw = Vec::new();
    while raw.len() < expected.len() {
        let mut chunk = [0u8; 256];
        let n = timeout(IO_TIMEOUT, client.stream.read(&mut chunk))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0);
        raw.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(raw, expected);
}

#[tokio::test]
async fn test_echo() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.command(&["ECHO", "Hello, BreezeDB!"]).await,
        bulk("Hello, BreezeDB!")
    );
    let response = client.command(&["ECHO"]).await;
    assert_eq!(
        response,
        Frame::Error("ERR wrong number of arguments for 'echo' command".into())
    );
}

#[tokio::test]
async fn test_set_get() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.command(&["SET", "mykey", "myvalue"]).await,
        Frame::Simple("OK".into())
    );
    assert_eq!(client.command(&["GET", "mykey"]).await, bulk("myvalue"));
    assert_eq!(client.command(&["GET", "missing"]).await, Frame::Null);
}

#[tokio::test]
async fn test_binary_safe_values() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    let value = "line1\r\nline2\0end";
    client.command(&["SET", "bin", value]).await;
    assert_eq!(client.command(&["GET", "bin"]).await, bulk(value));

    let big = "x".repeat(10_000);
    client.command(&["SET", "big", &big]).await;
    assert_eq!(client.command(&["GET", "big"]).await, bulk(&big));
}

#[tokio::test]
async fn test_set_with_px() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.command(&["SET", "temp", "val", "px", "100"]).await,
        Frame::Simple("OK".into())
    );
    assert_eq!(client.command(&["GET", "temp"]).await, bulk("val"));

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(client.command(&["GET", "temp"]).await, Frame::Null);
    assert_eq!(client.command(&["LLEN", "temp"]).await, Frame::Integer(0));
}

#[tokio::test]
async fn test_list_operations() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    assert_eq!(
        client.command(&["RPUSH", "list", "a", "b", "c"]).await,
        Frame::Integer(3)
    );
    assert_eq!(
        client.command(&["LRANGE", "list", "0", "-1"]).await,
        Frame::array_from_strs(&["a", "b", "c"])
    );
    assert_eq!(client.command(&["LPUSH", "list", "y", "z"]).await, Frame::Integer(5));
    assert_eq!(
        client.command(&["LRANGE", "list", "0", "1"]).await,
        Frame::array_from_strs(&["z", "y"])
    );
    assert_eq!(client.command(&["LLEN", "list"]).await, Frame::Integer(5));
    assert_eq!(client.command(&["LPOP", "list"]).await, bulk("z"));
    assert_eq!(client.command(&["LLEN", "list"]).await, Frame::Integer(4));
}

#[tokio::test]
async fn test_lrange_normalization() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.command(&["RPUSH", "k", "a", "b", "c", "d", "e"]).await;
    assert_eq!(
        client.command(&["LRANGE", "k", "-100", "2"]).await,
        Frame::array_from_strs(&["a", "b", "c"])
    );
    assert_eq!(
        client.command(&["LRANGE", "k", "3", "1"]).await,
        Frame::Array(vec![])
    );
    assert_eq!(
        client.command(&["LRANGE", "k", "0", "-1"]).await,
        Frame::array_from_strs(&["a", "b", "c", "d", "e"])
    );
    assert_eq!(
        client.command(&["LRANGE", "k", "one", "2"]).await,
        Frame::Error("ERR value is not an integer or out of range".into())
    );
}

#[tokio::test]
async fn test_list_emptiness() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.command(&["RPUSH", "k", "a"]).await;
    assert_eq!(client.command(&["LPOP", "k"]).await, bulk("a"));
    assert_eq!(client.command(&["LLEN", "k"]).await, Frame::Integer(0));
    assert_eq!(client.command(&["LPOP", "k"]).await, Frame::Null);
    // Lista vazia some do store.
    assert_eq!(client.command(&["GET", "k"]).await, Frame::Null);
}

#[tokio::test]
async fn test_type_mismatch_keeps_value() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.command(&["SET", "k", "v"]).await;
    match client.command(&["RPUSH", "k", "x"]).await {
        Frame::Error(msg) => assert!(msg.starts_with("ERR Operation against a key")),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(client.command(&["GET", "k"]).await, bulk("v"));

    client.command(&["LPUSH", "l", "x"]).await;
    assert!(matches!(
        client.command(&["GET", "l"]).await,
        Frame::Error(_)
    ));
}

#[tokio::test]
async fn test_unknown_command_keeps_connection() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    match client.command(&["FOOBAR"]).await {
        Frame::Error(msg) => assert!(msg.contains("unknown command")),
        other => panic!("expected error frame, got {other:?}"),
    }
    assert_eq!(client.command(&["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_unknown_command_cannot_inject_replies() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    let mut buf = BytesMut::new();
    Frame::array_from_strs(&["X\r\n+OK"]).encode(&mut buf);
    Frame::array_from_strs(&["PING"]).encode(&mut buf);
    client.send_raw(&buf).await;

    assert_eq!(
        client.read_frame().await,
        Frame::Error("ERR unknown command 'X\\r\\n+OK'".into())
    );
    assert_eq!(client.read_frame().await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_pipelining_order() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    let commands: [&[&str]; 3] = [&["PING"], &["PING"], &["ECHO", "hi"]];
    let mut buf = BytesMut::new();
    for args in commands {
        Frame::array_from_strs(args).encode(&mut buf);
    }
    client.send_raw(&buf).await;

    assert_eq!(client.read_frame().await, Frame::Simple("PONG".into()));
    assert_eq!(client.read_frame().await, Frame::Simple("PONG".into()));
    assert_eq!(client.read_frame().await, bulk("hi"));
}

#[tokio::test]
async fn test_split_frame_across_writes() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw(b"*2\r\n$4\r\nEC").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"HO\r\n$5\r\nhel").await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_raw(b"lo\r\n").await;

    assert_eq!(client.read_frame().await, bulk("hello"));
}

#[tokio::test]
async fn test_large_command_over_many_writes() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let db = server.db().clone();
    tokio::spawn(server.run(std::future::pending::<()>()));

    let items: Vec<String> = (0..20_000).map(|i| format!("item:{i}")).collect();
    let mut args = vec!["RPUSH", "big"];
    args.extend(items.iter().map(String::as_str));
    let mut buf = BytesMut::new();
    Frame::array_from_strs(&args).encode(&mut buf);

    let mut client = TestClient::connect(addr).await;
    for chunk in buf.chunks(1024) {
        client.send_raw(chunk).await;
    }

    assert_eq!(client.read_frame().await, Frame::Integer(20_000));
    assert_eq!(db.llen(&Bytes::from_static(b"big")).await, Ok(20_000));
    assert_eq!(
        client.command(&["LRANGE", "big", "-1", "-1"]).await,
        Frame::array_from_strs(&["item:19999"])
    );
}

#[tokio::test]
async fn test_server_shares_its_store() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let db = server.db().clone();
    db.set(Bytes::from_static(b"seeded"), Bytes::from_static(b"yes"), None)
        .await;
    tokio::spawn(server.run(std::future::pending::<()>()));

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.command(&["GET", "seeded"]).await, bulk("yes"));
    client.command(&["SET", "from_client", "1"]).await;
    assert!(db.exists(&Bytes::from_static(b"from_client")).await);
}

#[tokio::test]
async fn test_empty_command_gets_no_reply() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw(b"*0\r\n").await;
    assert_eq!(client.command(&["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_malformed_frame_closes_only_that_connection() {
    let addr = start_server().await;
    let mut bad = TestClient::connect(addr).await;
    let mut good = TestClient::connect(addr).await;

    assert_eq!(good.command(&["SET", "k", "v"]).await, Frame::Simple("OK".into()));

    bad.send_raw(b"*2\r\n$3\r\nabc\r\n$-5\r\n").await;
    bad.expect_closed().await;

    assert_eq!(good.command(&["GET", "k"]).await, bulk("v"));
    let mut fresh = TestClient::connect(addr).await;
    assert_eq!(fresh.command(&["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test]
async fn test_replies_before_malformed_frame_are_delivered() {
    let addr = start_server().await;
    let mut client = TestClient::connect(addr).await;

    client.send_raw(b"*1\r\n$4\r\nPING\r\n+garbage\r\n").await;
    assert_eq!(client.read_frame().await, Frame::Simple("PONG".into()));
    client.expect_closed().await;
}

#[tokio::test]
async fn test_short_read_is_silent() {
    let addr = start_server().await;

    {
        let mut client = TestClient::connect(addr).await;
        client.send_raw(b"*2\r\n$3\r\nGET\r\n$10\r\nabc").await;
        client.stream.shutdown().await.unwrap();
        client.expect_closed().await;
    }

    let mut other = TestClient::connect(addr).await;
    assert_eq!(other.command(&["PING"]).await, Frame::Simple("PONG".into()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rpush_same_key() {
    let addr = start_server().await;
    let n = 50;

    let handles: Vec<JoinHandle<()>> = (0..n)
        .map(|i| {
            tokio::spawn(async move {
                let mut client = TestClient::connect(addr).await;
                let item = format!("x{i}");
                match client.command(&["RPUSH", "shared", &item]).await {
                    Frame::Integer(len) => assert!((1..=n as i64).contains(&len)),
                    other => panic!("unexpected reply {other:?}"),
                }
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap();
    }

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.command(&["LLEN", "shared"]).await, Frame::Integer(n as i64));

    let Frame::Array(items) = client.command(&["LRANGE", "shared", "0", "-1"]).await else {
        panic!("expected array");
    };
    let mut items: Vec<Frame> = items;
    items.sort_by_key(|f| format!("{f:?}"));
    items.dedup();
    assert_eq!(items.len(), n);
}

#[tokio::test]
async fn test_graceful_shutdown_closes_idle_connections() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run(rx));

    let mut client = TestClient::connect(addr).await;
    assert_eq!(client.command(&["PING"]).await, Frame::Simple("PONG".into()));

    tx.send(()).unwrap();
    client.expect_closed().await;
    timeout(IO_TIMEOUT, handle).await.unwrap().unwrap();
}
