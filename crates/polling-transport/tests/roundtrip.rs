//! End-to-end round-trip of the polling transport: a real `PollingServer` bound to a loopback
//! socket, driven by a real `PollingConduit` over actual HTTP requests.

use polling_transport::{PollingClientConfig, PollingConduit, PollingServer};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::TcpListener;

async fn spawn_server(path: &'static str) -> (std::net::SocketAddr, tokio::sync::mpsc::Receiver<polling_transport::PollingServerConduit>) {
    let (server, accepted_rx) = PollingServer::new();
    let app = server.router(path);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("loopback bind never fails");
    let addr = listener.local_addr().expect("bound socket has a local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server should not fail");
    });

    (addr, accepted_rx)
}

#[tokio::test]
async fn bytes_written_on_the_client_arrive_at_the_server_conduit() {
    let (addr, mut accepted_rx) = spawn_server("/poll").await;

    let config = PollingClientConfig {
        front_url: format!("http://{addr}/poll").parse().unwrap(),
        true_host: "front.example".to_owned(),
        client: reqwest::Client::new(),
    };
    let mut conduit = PollingConduit::connect(config);
    conduit.write_all(b"ping").await.unwrap();

    let mut server_conduit = accepted_rx.recv().await.expect("server accepts the session on first contact");
    let mut buf = [0u8; 4];
    server_conduit.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn bytes_written_on_the_server_arrive_at_the_client_conduit() {
    let (addr, mut accepted_rx) = spawn_server("/poll").await;

    let config = PollingClientConfig {
        front_url: format!("http://{addr}/poll").parse().unwrap(),
        true_host: "front.example".to_owned(),
        client: reqwest::Client::new(),
    };
    let mut conduit = PollingConduit::connect(config);

    // Nudge the client into its first request so the server has a session to reply on.
    conduit.write_all(b"hello").await.unwrap();
    let mut server_conduit = accepted_rx.recv().await.expect("server accepts the session");

    server_conduit.write_all(b"pong").await.unwrap();

    let mut buf = [0u8; 4];
    conduit.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"pong");
}
