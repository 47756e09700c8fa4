mod common;

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use viewcounter_config::ServerConfig;
use viewcounter_server::ViewCounterServer;

use common::MemoryStore;

async fn post_over_tcp(addr: std::net::SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(
            b"POST /countView HTTP/1.1\r\n\
              Host: localhost\r\n\
              Content-Length: 0\r\n\
              Connection: close\r\n\r\n",
        )
        .await
        .unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

#[tokio::test]
async fn serves_view_counts_over_http() {
    let store = Arc::new(MemoryStore::default());
    let server = ViewCounterServer::new(ServerConfig::new(), store.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move { server.serve(listener).await });

    let first = post_over_tcp(addr).await;
    assert!(first.starts_with("HTTP/1.1 200 OK"));
    assert!(
        first
            .to_ascii_lowercase()
            .contains("access-control-allow-origin: https://coderodde.github.io")
    );

    let second = post_over_tcp(addr).await;
    let (_, body) = second.split_once("\r\n\r\n").unwrap();
    let json: Value = serde_json::from_str(body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["totalViews"], 2);
    // 루프백 주소가 방문자로 기록됨
    assert_eq!(json["visitorViews"], 2);
    assert!(json["visitorsMostRecentViewTime"].is_string());

    assert_eq!(store.len(), 2);
    handle.abort();
}
