//! Dispatch plane: a local SOCKS5 server that classifies every requested destination and
//! bridges it either straight out over TCP or through the tunnel session manager.
//!
//! Grounded on the upstream JMUX proxy's own SOCKS5 listener, extended with the classification
//! branch a pure tunneling tool doesn't need.

use std::sync::Arc;

use anyhow::Context as _;
use proxy_socks::{Socks5Acceptor, Socks5AcceptorConfig, Socks5FailureCode};
use proxy_types::DestAddr;
use tokio::net::{TcpListener, TcpStream};

use crate::classifier::{Classifier, Verdict};
use crate::tunnel::TunnelSessionManager;
use crate::udp_associate;

pub async fn socks5_listener_task(bind_addr: String, classifier: Classifier, tunnel: Arc<TunnelSessionManager>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("couldn't bind SOCKS5 listener to {bind_addr}"))?;

    info!(%bind_addr, "SOCKS5 dispatch plane listening");

    let conf = Arc::new(Socks5AcceptorConfig {
        no_auth_required: true,
        users: None,
    });

    loop {
        let (stream, addr) = listener.accept().await.context("couldn't accept next SOCKS5 connection")?;
        let classifier = classifier.clone();
        let tunnel = Arc::clone(&tunnel);
        let conf = Arc::clone(&conf);

        tokio::spawn(async move {
            if let Err(error) = process_socket(stream, conf, classifier, tunnel).await {
                debug!(%addr, %error, "SOCKS5 connection handling failed");
            }
        });
    }
}

async fn process_socket(
    incoming: TcpStream,
    conf: Arc<Socks5AcceptorConfig>,
    classifier: Classifier,
    tunnel: Arc<TunnelSessionManager>,
) -> anyhow::Result<()> {
    let acceptor = Socks5Acceptor::accept_with_config(incoming, &conf).await?;

    if acceptor.is_udp_associate_command() {
        return udp_associate::handle(acceptor).await;
    }

    if !acceptor.is_connect_command() {
        acceptor.failed(Socks5FailureCode::CommandNotSupported).await?;
        return Ok(());
    }

    let (host, port) = match acceptor.dest_addr() {
        DestAddr::Ip(addr) => (addr.ip().to_string(), addr.port()),
        DestAddr::Domain(domain, port) => (domain.clone(), *port),
    };

    let verdict = classifier.snapshot().classify(&host);
    debug!(%host, port, ?verdict, "Classified destination");

    match verdict {
        Verdict::Direct => handle_direct(acceptor, &host, port).await,
        Verdict::Tunnel => handle_tunnel(acceptor, tunnel, &host, port).await,
    }
}

async fn handle_direct(acceptor: Socks5Acceptor<TcpStream>, host: &str, port: u16) -> anyhow::Result<()> {
    let outbound = match TcpStream::connect((host, port)).await {
        Ok(stream) => stream,
        Err(error) => {
            acceptor.failed(Socks5FailureCode::from(&error)).await?;
            return Err(error).context("direct dial failed");
        }
    };

    let local_addr = outbound.local_addr().context("direct dial has no local address")?;
    let mut client_stream = acceptor.connected(local_addr).await?;
    let mut outbound = outbound;

    transport::forward_bidirectional(&mut client_stream, &mut outbound)
        .await
        .context("direct bridging failed")?;

    Ok(())
}

async fn handle_tunnel(acceptor: Socks5Acceptor<TcpStream>, tunnel: Arc<TunnelSessionManager>, host: &str, port: u16) -> anyhow::Result<()> {
    let channel = match tunnel.open_stream().await {
        Ok(channel) => channel,
        Err(error) => {
            acceptor.failed(Socks5FailureCode::GeneralSocksServerFailure).await?;
            return Err(error).context("tunnel stream open failed");
        }
    };

    let mut egress_stream = match channel.connect((host, port)).await {
        Ok(stream) => stream,
        Err(error) => {
            acceptor.failed(Socks5FailureCode::GeneralSocksServerFailure).await?;
            return Err(error).context("inner handshake with egress failed");
        }
    };

    // Dummy local address: the multiplexer's wire format carries no local bound address.
    let mut client_stream = acceptor.connected("0.0.0.0:0").await?;

    transport::forward_bidirectional(&mut client_stream, &mut egress_stream)
        .await
        .context("tunnel bridging failed")?;

    Ok(())
}
