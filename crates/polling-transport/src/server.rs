//! Server-side polling session table.
//!
//! Accepts the same request/response protocol the client driver speaks: a POST carrying bytes
//! or empty (a poll), addressed by a session cookie issued on first contact. Each session is
//! exposed to the caller as a [`PollingServerConduit`] implementing `AsyncRead`/`AsyncWrite`, so
//! a stream multiplexer can be built directly on top without knowing HTTP is involved at all.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex as SyncMutex;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, ReadBuf};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::time::Instant;

use crate::queue::{byte_queue, QueueReader, QueueWriter};

const LONG_POLL_WAIT: Duration = Duration::from_secs(30);
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const COOKIE_NAME: &str = "sid";
const MAX_FRAME_READ: usize = 64 * 1024;

struct Session {
    up_writer: QueueWriter,
    down_reader: AsyncMutex<QueueReader>,
    last_activity: SyncMutex<Instant>,
}

impl Session {
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }
}

/// A single accepted polling session, exposed as a byte-stream conduit.
pub struct PollingServerConduit {
    up_reader: QueueReader,
    down_writer: QueueWriter,
}

impl AsyncRead for PollingServerConduit {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.up_reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for PollingServerConduit {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.down_writer.push(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.down_writer.close();
        Poll::Ready(Ok(()))
    }
}

/// Owns the cookie → session table and hands freshly-accepted conduits to whoever is building
/// multiplex servers on top (the relay binary).
#[derive(Clone)]
pub struct PollingServer {
    sessions: Arc<SyncMutex<HashMap<String, Arc<Session>>>>,
    accepted_tx: mpsc::Sender<PollingServerConduit>,
}

impl PollingServer {
    /// Spawns the idle-session sweeper and returns the server plus the channel onto which newly
    /// accepted conduits are pushed.
    pub fn new() -> (Self, mpsc::Receiver<PollingServerConduit>) {
        let (accepted_tx, accepted_rx) = mpsc::channel(32);
        let sessions = Arc::new(SyncMutex::new(HashMap::new()));

        let server = Self { sessions, accepted_tx };

        tokio::spawn(sweep_loop(server.sessions.clone()));

        (server, accepted_rx)
    }

    /// The `axum` router answering polling-transport POSTs at `path`.
    pub fn router(&self, path: &str) -> Router {
        Router::new().route(path, post(handle_poll)).with_state(self.clone())
    }
}

async fn sweep_loop(sessions: Arc<SyncMutex<HashMap<String, Arc<Session>>>>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let expired: Vec<String> = {
            let table = sessions.lock();
            table
                .iter()
                .filter(|(_, session)| session.idle_for() > SESSION_IDLE_TIMEOUT)
                .map(|(cookie, _)| cookie.clone())
                .collect()
        };

        if expired.is_empty() {
            continue;
        }

        let mut table = sessions.lock();
        for cookie in expired {
            if let Some(session) = table.remove(&cookie) {
                debug!(cookie, "Polling session expired from inactivity");
                session.up_writer.close();
            }
        }
    }
}

async fn handle_poll(State(server): State<PollingServer>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let existing_cookie = headers
        .get(axum::http::header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| parse_cookie(raw, COOKIE_NAME));

    let (cookie, session, is_new) = match existing_cookie.and_then(|c| {
        let session = server.sessions.lock().get(&c).cloned();
        session.map(|s| (c, s))
    }) {
        Some((cookie, session)) => (cookie, session, false),
        None => {
            if existing_cookie.is_some() {
                // Client echoed a cookie we no longer recognize: fatal per the client contract,
                // but from the server's point of view this is simply a fresh session.
                debug!("Unknown session cookie presented, starting a new session");
            }

            let cookie = uuid::Uuid::new_v4().to_string();
            let (up_writer, up_reader) = byte_queue();
            let (down_writer, down_reader) = byte_queue();

            let session = Arc::new(Session {
                up_writer,
                down_reader: AsyncMutex::new(down_reader),
                last_activity: SyncMutex::new(Instant::now()),
            });

            server.sessions.lock().insert(cookie.clone(), session.clone());

            let conduit = PollingServerConduit { up_reader, down_writer };
            if server.accepted_tx.send(conduit).await.is_err() {
                warn!("No one is accepting polling-transport conduits anymore");
            }

            (cookie, session, true)
        }
    };

    session.touch();
    session.up_writer.push(&body);

    let is_poll = body.is_empty();
    let wait = if is_poll { LONG_POLL_WAIT } else { Duration::ZERO };

    let mut down_reader = session.down_reader.lock().await;
    let mut buf = vec![0u8; MAX_FRAME_READ];
    let n = match tokio::time::timeout(wait, down_reader.read(&mut buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(error)) => {
            warn!(%error, "Error reading polling session down queue");
            0
        }
        Err(_elapsed) => 0,
    };
    buf.truncate(n);
    drop(down_reader);

    let mut response = (StatusCode::OK, buf).into_response();
    if is_new {
        let set_cookie = format!("{COOKIE_NAME}={cookie}");
        if let Ok(value) = axum::http::HeaderValue::from_str(&set_cookie) {
            response.headers_mut().insert(axum::http::header::SET_COOKIE, value);
        }
    }

    response
}

fn parse_cookie(raw: &str, name: &str) -> Option<String> {
    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then(|| value.to_owned())
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "test code can panic on errors")]

    use super::*;
    use axum::body::Body;
    use axum::http::{self, Request, StatusCode as HttpStatusCode};
    use http_body_util::BodyExt as _;
    use tower::ServiceExt as _;

    #[test]
    fn parse_cookie_finds_named_value_among_siblings() {
        assert_eq!(parse_cookie("sid=abc", "sid"), Some("abc".to_owned()));
        assert_eq!(parse_cookie("foo=bar; sid=abc", "sid"), Some("abc".to_owned()));
        assert_eq!(parse_cookie("foo=bar", "sid"), None);
    }

    #[tokio::test]
    async fn first_poll_issues_a_session_cookie() {
        let (server, _accepted_rx) = PollingServer::new();
        let app = server.router("/poll");

        let response = app
            .oneshot(Request::builder().method(http::Method::POST).uri("/poll").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), HttpStatusCode::OK);
        let set_cookie = response.headers().get(axum::http::header::SET_COOKIE).unwrap();
        assert!(set_cookie.to_str().unwrap().starts_with("sid="));
    }

    #[tokio::test]
    async fn pushed_bytes_are_delivered_to_the_conduit() {
        let (server, mut accepted_rx) = PollingServer::new();
        let app = server.router("/poll");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/poll")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), HttpStatusCode::OK);

        let mut conduit = accepted_rx.recv().await.expect("conduit accepted on first contact");
        let mut buf = [0u8; 5];
        conduit.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
    }
}
