//! HTTP(S) front-ends the relay exposes to accept polling-transport traffic.
//!
//! Structured like a typical gateway listener pair: one plain-HTTP loop and, when a certificate
//! is configured, one that wraps every accepted socket in a TLS handshake before handing it to
//! the same request handler.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use camino::Utf8Path;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use polling_transport::PollingServer;
use tokio::net::TcpListener;
use tokio_rustls::rustls;
use tokio_rustls::TlsAcceptor;

pub async fn serve_http(bind_addr: SocketAddr, server: PollingServer, poll_path: String) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("couldn't bind HTTP listener to {bind_addr}"))?;
    info!(%bind_addr, "Relay HTTP listener started");

    let app = server.router(&poll_path);

    loop {
        let (stream, peer_addr) = listener.accept().await.context("couldn't accept next HTTP connection")?;
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(error) = serve_connection(stream, app).await {
                debug!(%peer_addr, %error, "HTTP connection handling failed");
            }
        });
    }
}

pub async fn serve_https(bind_addr: SocketAddr, server: PollingServer, poll_path: String, acceptor: TlsAcceptor) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("couldn't bind HTTPS listener to {bind_addr}"))?;
    info!(%bind_addr, "Relay HTTPS listener started");

    let app = server.router(&poll_path);

    loop {
        let (stream, peer_addr) = listener.accept().await.context("couldn't accept next HTTPS connection")?;
        let app = app.clone();
        let acceptor = acceptor.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(error) => {
                    debug!(%peer_addr, %error, "TLS handshake failed");
                    return;
                }
            };
            if let Err(error) = serve_connection(tls_stream, app).await {
                debug!(%peer_addr, %error, "HTTPS connection handling failed");
            }
        });
    }
}

async fn serve_connection<I>(io: I, app: axum::Router) -> anyhow::Result<()>
where
    I: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
{
    hyper::server::conn::http1::Builder::new()
        .serve_connection(TokioIo::new(io), TowerToHyperService::new(app))
        .with_upgrades()
        .await
        .context("HTTP server")
}

/// Loads a TLS server identity from a PEM certificate chain and a PEM private key.
pub fn load_tls_acceptor(cert_path: &Utf8Path, key_path: &Utf8Path) -> anyhow::Result<TlsAcceptor> {
    let cert_file = std::fs::File::open(cert_path).with_context(|| format!("couldn't open certificate file at {cert_path}"))?;
    let mut cert_reader = std::io::BufReader::new(cert_file);
    let certificates = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .context("couldn't parse certificate file")?;

    let key_file = std::fs::File::open(key_path).with_context(|| format!("couldn't open private key file at {key_path}"))?;
    let mut key_reader = std::io::BufReader::new(key_file);
    let private_key = rustls_pemfile::private_key(&mut key_reader)
        .context("couldn't parse private key file")?
        .context("private key file contained no key")?;

    let server_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certificates, private_key)
        .context("failed to build TLS server config")?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}
