//! Local dispatch agent.
//!
//! Runs two listeners (SOCKS5 and HTTP/CONNECT) sharing one destination classifier and one
//! tunnel session manager, plus a loopback settings-UI for inspecting and hot-swapping the
//! classifier at runtime.

#[macro_use]
extern crate tracing;

pub mod classifier;
pub mod dispatch;
pub mod http_connect;
pub mod tunnel;
pub mod udp_associate;
pub mod ui;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use camino::Utf8PathBuf;
use glob::Pattern;
use proxy_log::StaticLogConfig;
use reqwest::Client;

use classifier::{parse_restricted_domains, Classifier, ClassifierSnapshot};
use peer_registry::{parse_peer_list, PeerStateStore};
use tunnel::TunnelSessionManager;

pub struct AgentLogConfig;

impl StaticLogConfig for AgentLogConfig {
    const MAX_BYTES_PER_LOG_FILE: u64 = 10 * 1024 * 1024;
    const MAX_LOG_FILES: usize = 10;
    const LOG_FILE_PREFIX: &'static str = "tunnel-agent";
}

pub struct AgentCfg {
    pub peers_path: Utf8PathBuf,
    pub restricted_domains_path: Option<Utf8PathBuf>,
    pub extra_globs: Vec<String>,
    pub tunnel_all: bool,
    pub store_path: Utf8PathBuf,
    pub socks5_bind: SocketAddr,
    pub http_bind: SocketAddr,
    pub ui_bind: SocketAddr,
    pub dial_timeout: Duration,
}

pub async fn run_agent(cfg: AgentCfg) -> anyhow::Result<()> {
    let peers_text = tokio::fs::read_to_string(&cfg.peers_path)
        .await
        .with_context(|| format!("couldn't read peer list at {}", cfg.peers_path))?;
    let peers = parse_peer_list(&peers_text);
    anyhow::ensure!(!peers.is_empty(), "peer list at {} is empty", cfg.peers_path);

    let restricted_domains = match &cfg.restricted_domains_path {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("couldn't read restricted-domains file at {path}"))?;
            parse_restricted_domains(&text)
        }
        None => Default::default(),
    };

    let globs = cfg
        .extra_globs
        .iter()
        .map(|pattern| Pattern::new(pattern).with_context(|| format!("invalid glob pattern: {pattern}")))
        .collect::<anyhow::Result<Vec<Pattern>>>()?;

    let classifier = Classifier::new(ClassifierSnapshot::new(cfg.tunnel_all, restricted_domains, globs));

    let store = PeerStateStore::new(cfg.store_path.clone());
    let http_client = Client::builder().build().context("couldn't build HTTP client")?;

    let tunnel = Arc::new(
        TunnelSessionManager::new(peers, store, http_client, cfg.dial_timeout)
            .await
            .context("couldn't initialize tunnel session manager")?,
    );

    let socks5_task = tokio::spawn(dispatch::socks5_listener_task(
        cfg.socks5_bind.to_string(),
        classifier.clone(),
        Arc::clone(&tunnel),
    ));
    let http_task = tokio::spawn(http_connect::http_listener_task(cfg.http_bind.to_string(), cfg.socks5_bind));
    let ui_task = tokio::spawn(ui::serve(
        cfg.ui_bind,
        classifier,
        cfg.restricted_domains_path,
        cfg.extra_globs,
    ));

    tokio::select! {
        res = socks5_task => res.context("SOCKS5 listener task panicked")?.context("SOCKS5 listener task failed"),
        res = http_task => res.context("HTTP listener task panicked")?.context("HTTP listener task failed"),
        res = ui_task => res.context("settings-UI task panicked")?.context("settings-UI task failed"),
    }
}
