//! Edge-facing relay.
//!
//! Terminates the domain-fronted polling transport over HTTP(S) and, for every accepted
//! conduit, spins up a stream multiplexer that re-issues each tunneled channel through plain
//! SOCKS5 egress.

#[macro_use]
extern crate tracing;

pub mod listener;

use std::net::SocketAddr;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use polling_transport::{PollingServer, PollingServerConduit};
use proxy_log::StaticLogConfig;
use stream_mux::{MuxConfig, MuxSession};
use tokio::sync::mpsc;

pub struct RelayLogConfig;

impl StaticLogConfig for RelayLogConfig {
    const MAX_BYTES_PER_LOG_FILE: u64 = 10 * 1024 * 1024;
    const MAX_LOG_FILES: usize = 10;
    const LOG_FILE_PREFIX: &'static str = "tunnel-relay";
}

pub struct RelayCfg {
    pub http_bind: SocketAddr,
    pub https_bind: Option<SocketAddr>,
    pub tls_cert_path: Option<Utf8PathBuf>,
    pub tls_key_path: Option<Utf8PathBuf>,
    pub poll_path: String,
    pub egress_addr: SocketAddr,
}

pub async fn run_relay(cfg: RelayCfg) -> anyhow::Result<()> {
    let (server, accepted_rx) = PollingServer::new();

    let bridge_task = tokio::spawn(bridge_conduits(accepted_rx, cfg.egress_addr));

    let http_task = tokio::spawn(listener::serve_http(cfg.http_bind, server.clone(), cfg.poll_path.clone()));

    let https_task = match (cfg.https_bind, cfg.tls_cert_path, cfg.tls_key_path) {
        (Some(bind), Some(cert_path), Some(key_path)) => {
            let acceptor = listener::load_tls_acceptor(&cert_path, &key_path).context("couldn't load TLS certificate/key")?;
            Some(tokio::spawn(listener::serve_https(bind, server, cfg.poll_path, acceptor)))
        }
        (None, None, None) => None,
        _ => anyhow::bail!("--https-bind requires both --tls-cert and --tls-key"),
    };

    tokio::select! {
        res = bridge_task => {
            res.context("bridge task panicked")?;
            Ok(())
        }
        res = http_task => res.context("HTTP listener task panicked")?.context("HTTP listener task failed"),
        res = await_optional(https_task) => res,
    }
}

async fn await_optional(task: Option<tokio::task::JoinHandle<anyhow::Result<()>>>) -> anyhow::Result<()> {
    match task {
        Some(task) => task.await.context("HTTPS listener task panicked")?.context("HTTPS listener task failed"),
        None => std::future::pending().await,
    }
}

/// Hands every freshly accepted polling conduit to its own stream multiplexer, relaying every
/// channel it opens out through `egress_addr` via plain SOCKS5.
async fn bridge_conduits(mut accepted_rx: mpsc::Receiver<PollingServerConduit>, egress_addr: SocketAddr) {
    while let Some(conduit) = accepted_rx.recv().await {
        tokio::spawn(async move {
            let (reader, writer) = tokio::io::split(conduit);
            let result = MuxSession::new(Box::new(reader), Box::new(writer))
                .with_config(MuxConfig::relay(egress_addr))
                .run()
                .await;
            if let Err(error) = result {
                debug!(%error, "Mux session over polling conduit ended");
            }
        });
    }
}
