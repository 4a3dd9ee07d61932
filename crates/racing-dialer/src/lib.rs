//! Concurrent dial of a ranked peer set with bounded, adaptively-growing parallelism.
//!
//! Grounded on the token-bucket racing dial found in the original client's tunnel handler:
//! start with a handful of tokens, release one more every so often or on each failure, and
//! cancel everyone else the moment one dial produces a usable connection. This minimizes
//! time-to-first-connection without ever detonating the whole peer set in parallel, which
//! would be both wasteful and fingerprintable.

#[macro_use]
extern crate tracing;

use async_trait::async_trait;
use peer_registry::Peer;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{self, Instant};

/// Initial token count; never exceeds the number of candidate peers.
const INITIAL_TOKENS: usize = 5;
/// How often an additional token is released while no dial has succeeded yet.
const STAGGER_INTERVAL: Duration = Duration::from_millis(200);
/// Per-attempt dial cap; a peer that doesn't answer within this is abandoned by its waiter.
const PER_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// A type able to attempt a connection to a single peer.
#[async_trait]
pub trait PeerDialer: Send + Sync {
    type Conn: Send + 'static;

    async fn dial(&self, peer: &Peer) -> anyhow::Result<Self::Conn>;
}

/// Outcome of a full racing dial: at most one winning connection, plus every peer observed
/// to have failed (or been abandoned at the overall deadline) in this attempt.
pub struct RaceOutcome<C> {
    pub winner: Option<(Peer, C)>,
    pub failed: Vec<Peer>,
}

enum DialOutcome<C> {
    Success(Peer, C),
    Failure(Peer),
}

/// Races `ranked_peers` (in the order produced by [`peer_registry::rank_peers`]) against each
/// other, returning as soon as the first succeeds or `overall_timeout` elapses.
pub async fn race_dial<D>(ranked_peers: Vec<Peer>, dialer: Arc<D>, overall_timeout: Duration) -> RaceOutcome<D::Conn>
where
    D: PeerDialer + 'static,
{
    if ranked_peers.is_empty() {
        return RaceOutcome {
            winner: None,
            failed: Vec::new(),
        };
    }

    let initial_tokens = INITIAL_TOKENS.min(ranked_peers.len());
    let semaphore = Arc::new(Semaphore::new(initial_tokens));
    let started: Arc<Mutex<Vec<Peer>>> = Arc::new(Mutex::new(Vec::new()));
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<DialOutcome<D::Conn>>();

    let peer_count = ranked_peers.len();
    for peer in ranked_peers {
        let semaphore = Arc::clone(&semaphore);
        let started = Arc::clone(&started);
        let mut cancel_rx = cancel_rx.clone();
        let result_tx = result_tx.clone();
        let dialer = Arc::clone(&dialer);

        tokio::spawn(async move {
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
                _ = cancel_rx.changed() => return,
            };
            // One token authorizes exactly one dial; it is never returned to the bucket.
            permit.forget();

            if *cancel_rx.borrow() {
                return;
            }

            started.lock().expect("not poisoned").push(peer.clone());

            let dial_fut = time::timeout(PER_ATTEMPT_TIMEOUT, dialer.dial(&peer));

            let outcome = tokio::select! {
                res = dial_fut => res,
                _ = cancel_rx.changed() => {
                    trace!(%peer, "Waiter cancelled before attempt completed");
                    return;
                }
            };

            match outcome {
                Ok(Ok(conn)) => {
                    if *cancel_rx.borrow() {
                        debug!(%peer, "Late successful dial discarded after a winner was already chosen");
                        drop(conn);
                        return;
                    }
                    let _ = result_tx.send(DialOutcome::Success(peer, conn));
                }
                Ok(Err(error)) => {
                    debug!(%peer, %error, "Dial attempt failed");
                    let _ = result_tx.send(DialOutcome::Failure(peer));
                }
                Err(_elapsed) => {
                    debug!(%peer, "Dial attempt timed out");
                    let _ = result_tx.send(DialOutcome::Failure(peer));
                }
            }
        });
    }
    drop(result_tx);

    let deadline = Instant::now() + overall_timeout;
    let mut stagger = time::interval(STAGGER_INTERVAL);
    stagger.tick().await; // consume the immediate first tick

    let mut failed = Vec::new();
    let mut completed = 0usize;

    let outcome = loop {
        tokio::select! {
            biased;

            _ = time::sleep_until(deadline) => {
                break None;
            }
            maybe_outcome = result_rx.recv() => {
                match maybe_outcome {
                    Some(DialOutcome::Success(peer, conn)) => {
                        break Some((peer, conn));
                    }
                    Some(DialOutcome::Failure(peer)) => {
                        failed.push(peer);
                        completed += 1;
                        // Release a token immediately so another peer can be probed right away.
                        semaphore.add_permits(1);
                        if completed >= peer_count {
                            break None;
                        }
                    }
                    None => break None,
                }
            }
            _ = stagger.tick() => {
                // No success yet (we'd have broken out of the loop already): widen the probe.
                semaphore.add_permits(1);
            }
        }
    };

    let _ = cancel_tx.send(true);

    match outcome {
        Some((peer, conn)) => RaceOutcome {
            winner: Some((peer, conn)),
            failed,
        },
        None => RaceOutcome {
            winner: None,
            failed: started.lock().expect("not poisoned").clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedDialer {
        delays: HashMap<String, Duration>,
        fail: std::collections::HashSet<String>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl PeerDialer for ScriptedDialer {
        type Conn = &'static str;

        async fn dial(&self, peer: &Peer) -> anyhow::Result<Self::Conn> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.get(&peer.front_url).copied().unwrap_or_default();
            time::sleep(delay).await;
            if self.fail.contains(&peer.front_url) {
                anyhow::bail!("scripted failure for {}", peer.front_url);
            }
            Ok("connection")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn race_returns_first_winner_and_the_losers() {
        let p1 = Peer::new("p1", "p1", "g");
        let p2 = Peer::new("p2", "p2", "g");
        let p3 = Peer::new("p3", "p3", "g");

        let dialer = Arc::new(ScriptedDialer {
            delays: HashMap::from([
                ("p1".to_owned(), Duration::from_millis(50)),
                ("p2".to_owned(), Duration::from_millis(100)),
                ("p3".to_owned(), Duration::from_millis(250)),
            ]),
            fail: std::collections::HashSet::from(["p1".to_owned(), "p2".to_owned()]),
            attempts: AtomicUsize::new(0),
        });

        let outcome = race_dial(vec![p1.clone(), p2.clone(), p3.clone()], dialer, Duration::from_secs(2)).await;

        let (winner, _conn) = outcome.winner.expect("p3 should win");
        assert_eq!(winner, p3);
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome.failed.contains(&p1));
        assert!(outcome.failed.contains(&p2));
    }

    #[tokio::test(start_paused = true)]
    async fn overall_timeout_returns_started_peers_with_no_winner() {
        let p1 = Peer::new("p1", "p1", "g");
        let p2 = Peer::new("p2", "p2", "g");

        let dialer = Arc::new(ScriptedDialer {
            delays: HashMap::from([
                ("p1".to_owned(), Duration::from_secs(10)),
                ("p2".to_owned(), Duration::from_secs(10)),
            ]),
            fail: std::collections::HashSet::new(),
            attempts: AtomicUsize::new(0),
        });

        let outcome = race_dial(
            vec![p1.clone(), p2.clone()],
            dialer,
            Duration::from_millis(500),
        )
        .await;

        assert!(outcome.winner.is_none());
        assert_eq!(outcome.failed.len(), 2);
    }

    #[tokio::test]
    async fn empty_peer_list_returns_immediately() {
        struct NeverDialer;

        #[async_trait]
        impl PeerDialer for NeverDialer {
            type Conn = ();
            async fn dial(&self, _peer: &Peer) -> anyhow::Result<Self::Conn> {
                anyhow::bail!("should never be called")
            }
        }

        let outcome = race_dial(Vec::new(), Arc::new(NeverDialer), Duration::from_secs(1)).await;
        assert!(outcome.winner.is_none());
        assert!(outcome.failed.is_empty());
    }
}
