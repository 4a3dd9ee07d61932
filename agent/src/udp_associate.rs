//! UDP-ASSOCIATE direct path.
//!
//! The tunnel only ever carries TCP streams (see [`crate::tunnel`]), so there is no tunneled
//! variant of this command: every UDP-ASSOCIATE is served directly, regardless of how the
//! classifier would have ranked the eventual per-datagram destinations. One relay association
//! serves every destination a client sends datagrams to, using a single outbound socket shared
//! across them; the control connection's lifetime bounds the association's lifetime, per RFC.

use std::net::{Ipv6Addr, SocketAddr};

use anyhow::Context as _;
use proxy_socks::{Socks5Acceptor, Socks5FailureCode};
use proxy_types::DestAddr;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpStream, UdpSocket};

const MAX_DATAGRAM_SIZE: usize = 65_536;

pub async fn handle(acceptor: Socks5Acceptor<TcpStream>) -> anyhow::Result<()> {
    let client_facing = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(error) => {
            acceptor.failed(Socks5FailureCode::from(&error)).await?;
            return Err(error).context("couldn't bind UDP relay socket");
        }
    };

    let egress = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(error) => {
            acceptor.failed(Socks5FailureCode::from(&error)).await?;
            return Err(error).context("couldn't bind UDP egress socket");
        }
    };

    let relay_addr = client_facing.local_addr().context("UDP relay socket has no local address")?;
    let mut control = acceptor.connected(relay_addr).await?;

    let mut client_addr = None;
    let mut control_probe = [0u8; 1];
    let mut client_buf = vec![0u8; MAX_DATAGRAM_SIZE];
    let mut egress_buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        tokio::select! {
            res = control.read(&mut control_probe) => {
                match res {
                    Ok(0) | Err(_) => return Ok(()),
                    // The control connection is only kept around to bound the association's
                    // lifetime; stray bytes on it otherwise mean nothing.
                    Ok(_) => {}
                }
            }
            res = client_facing.recv_from(&mut client_buf) => {
                let (len, from) = res.context("UDP relay recv failed")?;
                client_addr = Some(from);
                if let Err(error) = forward_to_egress(&egress, &client_buf[..len]).await {
                    debug!(%error, "Dropping malformed UDP-ASSOCIATE datagram");
                }
            }
            res = egress.recv_from(&mut egress_buf) => {
                let (len, from) = res.context("UDP egress recv failed")?;
                if let Some(client_addr) = client_addr {
                    if let Err(error) = forward_to_client(&client_facing, client_addr, from, &egress_buf[..len]).await {
                        debug!(%error, "Couldn't relay UDP-ASSOCIATE reply to client");
                    }
                }
            }
        }
    }
}

async fn forward_to_egress(egress: &UdpSocket, datagram: &[u8]) -> anyhow::Result<()> {
    let (dest, payload) = decode_udp_request(datagram)?;
    let dest = resolve(dest).await?;
    egress
        .send_to(payload, dest)
        .await
        .context("couldn't send datagram to destination")?;
    Ok(())
}

async fn forward_to_client(
    client_facing: &UdpSocket,
    client_addr: SocketAddr,
    from: SocketAddr,
    payload: &[u8],
) -> anyhow::Result<()> {
    let mut datagram = vec![0u8, 0u8, 0u8]; // RSV(2) + FRAG(1), always unfragmented
    encode_addr(&mut datagram, from);
    datagram.extend_from_slice(payload);

    client_facing
        .send_to(&datagram, client_addr)
        .await
        .context("couldn't send datagram to client")?;

    Ok(())
}

/// +----+------+------+----------+----------+----------+
/// |RSV |FRAG  | ATYP | DST.ADDR | DST.PORT |   DATA   |
/// +----+------+------+----------+----------+----------+
/// | 2  |  1   |  1   | Variable |    2     | Variable |
/// +----+------+------+----------+----------+----------+
fn decode_udp_request(datagram: &[u8]) -> anyhow::Result<(DestAddr, &[u8])> {
    anyhow::ensure!(datagram.len() >= 4, "UDP-ASSOCIATE datagram too short");
    anyhow::ensure!(datagram[2] == 0, "fragmented UDP-ASSOCIATE datagrams are not supported");

    let atyp = datagram[3];
    let rest = &datagram[4..];

    let (dest, rest) = match atyp {
        1 => {
            anyhow::ensure!(rest.len() >= 6, "truncated IPv4 DST.ADDR");
            let ip = std::net::Ipv4Addr::new(rest[0], rest[1], rest[2], rest[3]);
            let port = u16::from_be_bytes([rest[4], rest[5]]);
            (DestAddr::Ip(SocketAddr::from((ip, port))), &rest[6..])
        }
        3 => {
            anyhow::ensure!(!rest.is_empty(), "truncated domain DST.ADDR length");
            let len = rest[0] as usize;
            anyhow::ensure!(rest.len() >= 1 + len + 2, "truncated domain DST.ADDR");
            let domain = std::str::from_utf8(&rest[1..1 + len])
                .context("non-UTF8 domain in DST.ADDR")?
                .to_owned();
            let port = u16::from_be_bytes([rest[1 + len], rest[2 + len]]);
            (DestAddr::Domain(domain, port), &rest[3 + len..])
        }
        4 => {
            anyhow::ensure!(rest.len() >= 18, "truncated IPv6 DST.ADDR");
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&rest[..16]);
            let port = u16::from_be_bytes([rest[16], rest[17]]);
            (DestAddr::Ip(SocketAddr::from((Ipv6Addr::from(octets), port))), &rest[18..])
        }
        other => anyhow::bail!("unsupported address type {other} in DST.ADDR"),
    };

    Ok((dest, rest))
}

fn encode_addr(buf: &mut Vec<u8>, addr: SocketAddr) {
    match addr {
        SocketAddr::V4(addr) => {
            buf.push(1);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
        SocketAddr::V6(addr) => {
            buf.push(4);
            buf.extend_from_slice(&addr.ip().octets());
            buf.extend_from_slice(&addr.port().to_be_bytes());
        }
    }
}

async fn resolve(dest: DestAddr) -> anyhow::Result<SocketAddr> {
    match dest {
        DestAddr::Ip(addr) => Ok(addr),
        DestAddr::Domain(domain, port) => tokio::net::lookup_host((domain.as_str(), port))
            .await
            .context("DNS resolution failed")?
            .next()
            .context("DNS resolution returned no addresses"),
    }
}
