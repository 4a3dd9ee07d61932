use crate::Peer;
use anyhow::Context as _;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use tokio::fs;

/// Key under which the peer-health map is stored in the agent's key-value store.
pub const STORE_KEY: &str = "tunnelPeerState";

/// A mapping from peer key to a signed success/failure score, persisted as JSON.
///
/// The store file may contain other keys owned by non-core collaborators (UI flags, UUID,
/// locale); only [`STORE_KEY`] is ever read or written here.
#[derive(Debug, Default, Clone)]
pub struct PeerHealth {
    scores: HashMap<String, i64>,
}

impl PeerHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score for a peer; peers missing from the map score 0.
    pub fn score(&self, peer: &Peer) -> i64 {
        self.scores.get(&peer.key()).copied().unwrap_or(0)
    }

    /// Records the outcome of one racing-dial attempt: the winner (if any) gets +1, every
    /// peer that failed gets -1.
    pub fn record_outcome(&mut self, succeeded: Option<&Peer>, failed: &[Peer]) {
        if let Some(peer) = succeeded {
            *self.scores.entry(peer.key()).or_insert(0) += 1;
        }

        for peer in failed {
            *self.scores.entry(peer.key()).or_insert(0) -= 1;
        }
    }

    pub fn load_from_store(store: &serde_json::Map<String, serde_json::Value>) -> Self {
        let scores = store
            .get(STORE_KEY)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        Self { scores }
    }

    pub fn save_into_store(&self, store: &mut serde_json::Map<String, serde_json::Value>) {
        store.insert(STORE_KEY.to_owned(), serde_json::json!(self.scores));
    }
}

/// Thin JSON-file-backed key-value store, read and rewritten whole on each persist.
///
/// Keys not owned by the tunnel core (UI flags, UUID, locale, ...) are preserved verbatim
/// across load/save cycles.
pub struct PeerStateStore {
    path: Utf8PathBuf,
}

impl PeerStateStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> anyhow::Result<(PeerHealth, serde_json::Map<String, serde_json::Value>)> {
        let map = match fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context("malformed key-value store file")?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(error) => return Err(error).context("couldn't read key-value store file"),
        };

        let health = PeerHealth::load_from_store(&map);

        Ok((health, map))
    }

    pub async fn persist(
        &self,
        health: &PeerHealth,
        mut store: serde_json::Map<String, serde_json::Value>,
    ) -> anyhow::Result<()> {
        health.save_into_store(&mut store);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.context("couldn't create store directory")?;
        }

        let bytes = serde_json::to_vec_pretty(&store).context("couldn't serialize key-value store")?;
        fs::write(&self.path, bytes).await.context("couldn't write key-value store file")?;

        Ok(())
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conservation_law() {
        let p1 = Peer::new("a", "a", "g");
        let p2 = Peer::new("b", "b", "g");
        let p3 = Peer::new("c", "c", "g");

        let mut health = PeerHealth::new();
        health.record_outcome(Some(&p3), &[p1.clone(), p2.clone()]);

        assert_eq!(health.score(&p1), -1);
        assert_eq!(health.score(&p2), -1);
        assert_eq!(health.score(&p3), 1);
        assert_eq!(health.score(&Peer::new("unknown", "unknown", "g")), 0);
    }

    #[test]
    fn round_trips_through_store_preserving_foreign_keys() {
        let mut store = serde_json::Map::new();
        store.insert("locale".to_owned(), serde_json::json!("en-US"));

        let mut health = PeerHealth::new();
        health.record_outcome(Some(&Peer::new("a", "a", "g")), &[Peer::new("b", "b", "g")]);
        health.save_into_store(&mut store);

        assert_eq!(store.get("locale").unwrap(), "en-US");

        let reloaded = PeerHealth::load_from_store(&store);
        assert_eq!(reloaded.score(&Peer::new("a", "a", "g")), 1);
        assert_eq!(reloaded.score(&Peer::new("b", "b", "g")), -1);
    }
}
