//! Tunnel session manager.
//!
//! Owns at most one live multiplexed session to a relay peer at a time. Concurrent callers
//! needing a session while none exists all block on the same dial instead of each starting
//! their own; a channel open that turns out to ride a dead session is retried once, from a
//! fresh dial if need be.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use peer_registry::{rank_peers, Peer, PeerHealth, PeerStateStore};
use proxy_socks::Socks5Stream;
use proxy_types::ToDestAddr;
use racing_dialer::{race_dial, PeerDialer};
use reqwest::{Client, Url};
use stream_mux::{ApiRequestSender, MuxApiRequest, MuxApiResponse, MuxConfig, MuxSession, StreamId};
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

/// A session established with one peer, kept alive for as long as any [`TunnelChannel`] or the
/// manager itself still references it.
pub struct ActiveSession {
    pub peer: Peer,
    api_request_tx: ApiRequestSender,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A stream opened on some session, not yet bridged to anything.
pub struct TunnelChannel {
    pub id: StreamId,
    api_request_tx: ApiRequestSender,
}

impl TunnelChannel {
    /// Drives the inner SOCKS5 handshake that negotiates `dest` with the remote egress, over a
    /// fresh in-process duplex spliced in front of the multiplexed stream. The wire carries no
    /// destination of its own (see [`stream_mux`]'s module docs): the handshake happening here,
    /// on top of the already-open stream, is how the relay's egress learns where to dial.
    pub async fn connect(&self, dest: impl ToDestAddr) -> anyhow::Result<Socks5Stream<DuplexStream>> {
        let (local_half, remote_half) = tokio::io::duplex(8 * 1024);

        self.api_request_tx
            .send(MuxApiRequest::Start {
                id: self.id,
                stream: Box::new(remote_half),
                leftover: None,
            })
            .await
            .context("tunnel session has exited")?;

        Socks5Stream::connect(local_half, dest)
            .await
            .context("inner SOCKS5 handshake with egress failed")
    }
}

/// Dials one peer over the polling transport and, on success, stands up a full multiplexed
/// session on top of it. The dial's cost against the racing dialer's token bucket is the
/// reachability probe; everything after that is just local setup.
struct PollingPeerDialer {
    http_client: Client,
}

#[async_trait]
impl PeerDialer for PollingPeerDialer {
    type Conn = ActiveSession;

    async fn dial(&self, peer: &Peer) -> anyhow::Result<ActiveSession> {
        let front_url = Url::parse(&peer.front_url).context("invalid front URL")?;

        polling_transport::probe(&self.http_client, &front_url, &peer.true_host)
            .await
            .context("peer did not answer probe")?;

        let conduit = polling_transport::PollingConduit::connect(polling_transport::PollingClientConfig {
            front_url,
            true_host: peer.true_host.clone(),
            client: self.http_client.clone(),
        });

        let (reader, writer) = tokio::io::split(conduit);
        let (api_request_tx, api_request_rx) = mpsc::channel(32);

        let handle = MuxSession::new(Box::new(reader), Box::new(writer))
            .with_config(MuxConfig::client())
            .with_requester_api(api_request_rx)
            .spawn();

        Ok(ActiveSession {
            peer: peer.clone(),
            api_request_tx,
            handle,
        })
    }
}

struct TunnelState {
    current: Option<Arc<ActiveSession>>,
    health: PeerHealth,
    store_snapshot: serde_json::Map<String, serde_json::Value>,
}

pub struct TunnelSessionManager {
    peers: Vec<Peer>,
    store: PeerStateStore,
    dialer: Arc<PollingPeerDialer>,
    dial_timeout: Duration,
    state: Mutex<TunnelState>,
}

impl TunnelSessionManager {
    pub async fn new(peers: Vec<Peer>, store: PeerStateStore, http_client: Client, dial_timeout: Duration) -> anyhow::Result<Self> {
        let (health, store_snapshot) = store.load().await.context("couldn't load peer health state")?;

        Ok(Self {
            peers,
            store,
            dialer: Arc::new(PollingPeerDialer { http_client }),
            dial_timeout,
            state: Mutex::new(TunnelState {
                current: None,
                health,
                store_snapshot,
            }),
        })
    }

    /// Opens a new stream on the current session, dialing a fresh session first if none is
    /// live. Retried once, from the top, if the session the first attempt used turns out to be
    /// dead. The stream carries no destination yet: that is negotiated afterwards, over the
    /// stream itself, by [`TunnelChannel::connect`].
    pub async fn open_stream(&self) -> anyhow::Result<TunnelChannel> {
        for attempt in 0..2 {
            let session = self.current_session().await?;

            let (api_response_tx, api_response_rx) = oneshot::channel();
            let sent = session.api_request_tx.send(MuxApiRequest::OpenStream { api_response_tx }).await;

            if sent.is_err() {
                debug!(peer = %session.peer, attempt, "Session exited before open request was sent");
                self.invalidate(&session).await;
                continue;
            }

            match api_response_rx.await {
                Ok(MuxApiResponse::Success { id }) => {
                    return Ok(TunnelChannel {
                        id,
                        api_request_tx: session.api_request_tx.clone(),
                    });
                }
                Ok(MuxApiResponse::Failure { reason }) => {
                    warn!(peer = %session.peer, %reason, attempt, "Stream open refused");
                    self.invalidate(&session).await;
                }
                Err(_) => {
                    debug!(peer = %session.peer, attempt, "Session exited while open request was pending");
                    self.invalidate(&session).await;
                }
            }
        }

        anyhow::bail!("tunnel session unavailable after retrying")
    }

    /// Returns the currently live session, dialing a fresh one if none is available.
    /// Concurrent callers that arrive while a dial is already underway queue behind it instead
    /// of starting their own.
    async fn current_session(&self) -> anyhow::Result<Arc<ActiveSession>> {
        let mut state = self.state.lock().await;

        if let Some(session) = &state.current {
            return Ok(Arc::clone(session));
        }

        self.dial_new_session(&mut state).await
    }

    async fn dial_new_session(&self, state: &mut TunnelState) -> anyhow::Result<Arc<ActiveSession>> {
        let mut rng = rand::thread_rng();
        let ranked = rank_peers(&self.peers, &state.health, &mut rng);

        let outcome = race_dial(ranked, Arc::clone(&self.dialer), self.dial_timeout).await;

        let succeeded = outcome.winner.as_ref().map(|(peer, _)| peer);
        state.health.record_outcome(succeeded, &outcome.failed);

        if let Err(error) = self.store.persist(&state.health, state.store_snapshot.clone()).await {
            warn!(%error, "Couldn't persist peer health state");
        }

        let (peer, session) = outcome.winner.context("every candidate peer failed to dial")?;
        info!(%peer, "Established tunnel session");

        let session = Arc::new(session);
        state.current = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn invalidate(&self, dead: &Arc<ActiveSession>) {
        let mut state = self.state.lock().await;
        if let Some(current) = &state.current {
            if Arc::ptr_eq(current, dead) {
                state.current = None;
            }
        }
    }
}
