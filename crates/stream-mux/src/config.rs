use std::net::SocketAddr;

/// stream multiplexer configuration.
///
/// The multiplexer carries opaque byte streams and enforces no destination policy of its
/// own (destinations are negotiated by the endpoints, over the stream itself). The only
/// thing a session needs to know up front is whether it ever accepts an OPEN, and if so,
/// where accepted streams are bridged to.
#[derive(Debug, Default, Clone)]
pub struct MuxConfig {
    /// Local SOCKS5 egress every accepted stream is bridged to. `None` means this side
    /// never accepts an OPEN (the agent only ever initiates streams).
    pub egress_addr: Option<SocketAddr>,
}

impl MuxConfig {
    /// A safe default configuration: never accepts an OPEN.
    pub fn new() -> Self {
        Self::default()
    }

    /// A safe default for client only.
    ///
    /// This configuration effectively disables proxying abilities and reduces the session
    /// to a client-only role.
    pub fn client() -> Self {
        Self { egress_addr: None }
    }

    /// Configuration used by the relay: accept every OPEN and bridge the stream to a local
    /// SOCKS5 egress rather than dialing a destination directly.
    pub fn relay(egress_addr: SocketAddr) -> Self {
        Self {
            egress_addr: Some(egress_addr),
        }
    }
}
