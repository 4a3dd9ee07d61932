use std::fmt;

/// A single tunnel endpoint: the fronting URL actually dialed, the covert Host header the
/// origin behind the front dispatches on, and the fronting group it belongs to.
///
/// Equality and the persistence key used by [`crate::PeerHealth`] are both the full triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub front_url: String,
    pub true_host: String,
    pub group: String,
}

impl Peer {
    pub fn new(front_url: impl Into<String>, true_host: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            front_url: front_url.into(),
            true_host: true_host.into(),
            group: group.into(),
        }
    }

    /// Stable string key identifying this peer in the health map.
    pub fn key(&self) -> String {
        format!("{},{},{}", self.front_url, self.true_host, self.group)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (host={}, group={})", self.front_url, self.true_host, self.group)
    }
}

/// Parses the embedded peer list file.
///
/// One peer per line: `front-URL,true-Host,group-tag`. `#` introduces a comment, blank lines
/// are ignored, and lines with the wrong field count are skipped (not fatal).
pub fn parse_peer_list(text: &str) -> Vec<Peer> {
    let mut peers = Vec::new();

    for line in text.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(3, ',');
        let (Some(front_url), Some(true_host), Some(group)) = (fields.next(), fields.next(), fields.next()) else {
            warn!(line, "Skipping malformed peer list line");
            continue;
        };

        if fields.next().is_some() {
            warn!(line, "Skipping peer list line with too many fields");
            continue;
        }

        peers.push(Peer::new(front_url.trim(), true_host.trim(), group.trim()));
    }

    peers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let text = "\
            # fronting pool A\n\
            front-a.cdn.example,covert-a.example,group-a\n\
            front-b.cdn.example,covert-b.example,group-a\n\
            \n\
            front-c.cdn.example,covert-c.example,group-b\n";

        let peers = parse_peer_list(text);
        assert_eq!(peers.len(), 3);
        assert_eq!(peers[0], Peer::new("front-a.cdn.example", "covert-a.example", "group-a"));
        assert_eq!(peers[2].group, "group-b");
    }

    #[test]
    fn skips_malformed_lines() {
        let text = "front-a.cdn.example,covert-a.example\nfront-b.cdn.example\n,,,\n";
        assert!(parse_peer_list(text).is_empty());
    }

    #[test]
    fn key_includes_full_triple() {
        let peer = Peer::new("front", "host", "group");
        assert_eq!(peer.key(), "front,host,group");
    }
}
