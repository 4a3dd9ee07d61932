use crate::{Peer, PeerHealth};
use rand::seq::SliceRandom;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

/// Produces the attempt order for a single racing dial.
///
/// A pure function of its inputs (peer list, score map, rng) so it can be tested without any
/// I/O: shuffle within each fronting group, stable-sort each group by descending persisted
/// score, then interleave groups round-robin. This guarantees inter-group diversity up front,
/// intra-group freshness via the shuffle, and exploitation of known-good peers via the score
/// sort; ties break by shuffle order.
pub fn rank_peers(peers: &[Peer], health: &PeerHealth, rng: &mut impl Rng) -> Vec<Peer> {
    let mut groups: BTreeMap<&str, Vec<Peer>> = BTreeMap::new();

    for peer in peers {
        groups.entry(peer.group.as_str()).or_default().push(peer.clone());
    }

    for group in groups.values_mut() {
        group.shuffle(rng);
        // Descending by score, directly: stable sort preserves the shuffle order of tied peers,
        // so ties are emitted in shuffle order rather than reversed.
        group.sort_by_key(|peer| Reverse(health.score(peer)));
    }

    let mut group_queues: Vec<VecDeque<Peer>> = groups.into_values().map(VecDeque::from).collect();
    let mut ranked = Vec::with_capacity(peers.len());

    loop {
        let mut emitted_any = false;

        for queue in &mut group_queues {
            if let Some(peer) = queue.pop_front() {
                ranked.push(peer);
                emitted_any = true;
            }
        }

        if !emitted_any {
            break;
        }
    }

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn interleaves_groups_round_robin() {
        let peers = vec![
            Peer::new("a1", "a1", "A"),
            Peer::new("a2", "a2", "A"),
            Peer::new("b1", "b1", "B"),
        ];
        let health = PeerHealth::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);

        let ranked = rank_peers(&peers, &health, &mut rng);

        assert_eq!(ranked.len(), 3);
        // group A and B alternate; B only has one peer so it's emitted first or second
        // depending on shuffle, but never comes after both A peers.
        let b_pos = ranked.iter().position(|p| p.group == "B").unwrap();
        assert!(b_pos <= 1);
    }

    #[test]
    fn sorts_by_descending_score_within_group() {
        let peers = vec![Peer::new("a1", "a1", "A"), Peer::new("a2", "a2", "A")];
        let mut health = PeerHealth::new();
        health.record_outcome(Some(&peers[1]), &[]);

        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let ranked = rank_peers(&peers, &health, &mut rng);

        assert_eq!(ranked[0], peers[1]);
    }

    #[test]
    fn ties_break_by_shuffle_order() {
        let peers = vec![
            Peer::new("a1", "a1", "A"),
            Peer::new("a2", "a2", "A"),
            Peer::new("a3", "a3", "A"),
        ];
        let health = PeerHealth::new();

        for seed in 0..20 {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let mut shuffled = peers.clone();
            shuffled.shuffle(&mut rng);

            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            let ranked = rank_peers(&peers, &health, &mut rng);

            // All peers score 0 (tied), so emission order must match shuffle order exactly.
            assert_eq!(ranked, shuffled);
        }
    }

    #[test]
    fn empty_input_yields_empty_order() {
        let health = PeerHealth::new();
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        assert!(rank_peers(&[], &health, &mut rng).is_empty());
    }
}
