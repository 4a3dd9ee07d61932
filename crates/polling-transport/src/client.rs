//! Client-side polling conduit.
//!
//! Drives a single fronted peer over plain request/response HTTP, emulating a bidirectional
//! byte stream: bytes queued for send become POST bodies; an empty send-queue becomes a
//! long poll. A session cookie, once issued, is echoed on every subsequent request.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderValue, COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode, Url};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use crate::queue::{byte_queue, QueueReader, QueueWriter};

const LONG_POLL_WAIT: Duration = Duration::from_secs(30);

/// Everything needed to address one peer: the fronting URL actually dialed and the covert
/// `Host` header the origin behind the front dispatches on.
pub struct PollingClientConfig {
    pub front_url: Url,
    pub true_host: String,
    pub client: Client,
}

/// Dial cap used by a single probe request, independent of the long-poll wait used once a
/// session is established.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Confirms a peer is reachable before committing to a full conduit: one empty-body POST, no
/// session established. This is the unit of work the racing dialer's token bucket charges
/// against a single peer.
pub async fn probe(client: &Client, front_url: &Url, true_host: &str) -> anyhow::Result<()> {
    let response = client
        .post(front_url.clone())
        .header(reqwest::header::HOST, true_host.to_owned())
        .timeout(PROBE_TIMEOUT)
        .body(Bytes::new())
        .send()
        .await?;

    if response.status() != StatusCode::OK {
        anyhow::bail!("probe to {front_url} (host={true_host}) returned {}", response.status());
    }

    Ok(())
}

/// A byte-stream conduit to one relay peer. Implements [`AsyncRead`] and [`AsyncWrite`] so the
/// stream multiplexer can run directly on top of it, unaware of the HTTP request/response
/// machinery underneath.
pub struct PollingConduit {
    outbound_tx: mpsc::UnboundedSender<Bytes>,
    inbound: QueueReader,
    driver: tokio::task::JoinHandle<()>,
}

impl PollingConduit {
    /// Spawns the background request loop and returns the conduit immediately; the first
    /// request (carrying no cookie) is issued lazily, on first write or on first poll.
    pub fn connect(config: PollingClientConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_writer, inbound_reader) = byte_queue();

        let driver = tokio::spawn(drive(config, outbound_rx, inbound_writer));

        Self {
            outbound_tx,
            inbound: inbound_reader,
            driver,
        }
    }
}

impl AsyncRead for PollingConduit {
    fn poll_read(mut self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inbound).poll_read(cx, buf)
    }
}

impl AsyncWrite for PollingConduit {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.outbound_tx
            .send(Bytes::copy_from_slice(buf))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "polling transport driver has exited"))?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl Drop for PollingConduit {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// The request loop: one request in flight at a time, alternating between data pushes (when
/// bytes are queued) and long polls (when idle), re-arming immediately on every response.
async fn drive(config: PollingClientConfig, mut outbound_rx: mpsc::UnboundedReceiver<Bytes>, inbound: QueueWriter) {
    let PollingClientConfig {
        front_url,
        true_host,
        client,
    } = config;
    let mut cookie: Option<HeaderValue> = None;

    loop {
        let body = match outbound_rx.try_recv() {
            Ok(bytes) => bytes,
            Err(mpsc::error::TryRecvError::Empty) => Bytes::new(),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                debug!("Polling conduit write half dropped, stopping driver");
                inbound.close();
                return;
            }
        };

        let is_poll = body.is_empty();

        let mut request = client
            .post(front_url.clone())
            .header(reqwest::header::HOST, true_host.clone());
        if let Some(cookie_value) = &cookie {
            request = request.header(COOKIE, cookie_value.clone());
        }
        if is_poll {
            request = request.timeout(LONG_POLL_WAIT);
        }

        let response = match request.body(body).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(%error, "Polling transport request failed");
                inbound.close();
                return;
            }
        };

        if response.status() != StatusCode::OK {
            warn!(status = %response.status(), "Polling transport session is fatal: non-200 response");
            inbound.close();
            return;
        }

        if let Some(set_cookie) = response.headers().get(SET_COOKIE) {
            match &cookie {
                Some(existing) if existing != set_cookie => {
                    warn!("Polling transport session cookie changed mid-session");
                    inbound.close();
                    return;
                }
                None => cookie = Some(set_cookie.clone()),
                Some(_) => {}
            }
        }

        match response.bytes().await {
            Ok(bytes) => inbound.push(&bytes),
            Err(error) => {
                warn!(%error, "Polling transport failed reading response body");
                inbound.close();
                return;
            }
        }
    }
}
