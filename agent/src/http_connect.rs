//! HTTP/CONNECT front-end: a second local listener speaking plain HTTP proxying instead of
//! SOCKS5, for clients that only know how to use an HTTP proxy.
//!
//! Rather than duplicating the SOCKS5 listener's classify-then-dial logic, every accepted
//! request is handed off as a SOCKS5 CONNECT against the dispatch plane's own loopback
//! listener: this front-end only translates protocols, it makes no dispatch decisions.

use std::net::SocketAddr;

use anyhow::Context as _;
use proxy_http::{ErrorCode, HttpProxyAcceptor};
use proxy_socks::Socks5Stream;
use tokio::net::{TcpListener, TcpStream};

pub async fn http_listener_task(bind_addr: String, socks5_addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("couldn't bind HTTP proxy listener to {bind_addr}"))?;

    info!(%bind_addr, "HTTP/CONNECT dispatch plane listening");

    loop {
        let (stream, addr) = listener
            .accept()
            .await
            .context("couldn't accept next HTTP proxy connection")?;

        tokio::spawn(async move {
            if let Err(error) = process_socket(stream, socks5_addr).await {
                debug!(%addr, %error, "HTTP proxy connection handling failed");
            }
        });
    }
}

async fn process_socket(stream: TcpStream, socks5_addr: SocketAddr) -> anyhow::Result<()> {
    let acceptor = HttpProxyAcceptor::accept(stream).await.context("couldn't parse HTTP proxy request")?;
    let dest_addr = acceptor.dest_addr().clone();

    let dispatch_stream = match TcpStream::connect(socks5_addr).await {
        Ok(stream) => stream,
        Err(error) => {
            acceptor.failure(ErrorCode::ServicesUnavailable).await?;
            return Err(error).context("couldn't reach dispatch plane's SOCKS5 listener");
        }
    };

    let mut socks5_stream = match Socks5Stream::connect(dispatch_stream, dest_addr).await {
        Ok(stream) => stream,
        Err(error) => {
            acceptor.failure(ErrorCode::BadGateway).await?;
            return Err(error).context("dispatch plane refused the CONNECT");
        }
    };

    let mut proxy_stream = match acceptor {
        HttpProxyAcceptor::RegularRequest(request) => request.success_with_rewrite()?,
        HttpProxyAcceptor::TunnelRequest(request) => request.success().await?,
    };

    transport::forward_bidirectional(&mut proxy_stream, &mut socks5_stream)
        .await
        .context("bridging failed")?;

    Ok(())
}
