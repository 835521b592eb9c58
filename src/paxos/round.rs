use super::{NodeId, Round};

/// Returns the round that follows `previous` for the given peer.
///
/// The first round for a peer is its own id and each subsequent round adds `num_nodes`.
/// Peer `a` therefore only ever uses rounds congruent to `a` modulo `num_nodes`, which
/// keeps the round sequences of distinct peers disjoint without any coordination.
pub fn next_round(node_id: NodeId, num_nodes: usize, previous: Option<Round>) -> Round {
    match previous {
        None => Round(node_id.0 as u64),
        Some(r) => Round(r.0 + num_nodes as u64)
    }
}

/// Returns the first round in this peer's sequence that is strictly greater than `floor`
pub fn next_round_above(node_id: NodeId, num_nodes: usize, previous: Option<Round>, floor: Round) -> Round {
    let mut round = next_round(node_id, num_nodes, previous);
    if round <= floor {
        let n = num_nodes as u64;
        let steps = (floor.0 - round.0) / n + 1;
        round = Round(round.0 + steps * n);
    }
    round
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn first_round_is_node_id() {
        assert_eq!(next_round(NodeId(1), 3, None), Round(1));
        assert_eq!(next_round(NodeId(3), 3, None), Round(3));
    }

    #[test]
    fn subsequent_rounds_step_by_cluster_size() {
        let r1 = next_round(NodeId(2), 3, None);
        let r2 = next_round(NodeId(2), 3, Some(r1));
        let r3 = next_round(NodeId(2), 3, Some(r2));
        assert_eq!((r1, r2, r3), (Round(2), Round(5), Round(8)));
    }

    #[test]
    fn sequences_are_disjoint() {
        for n in 1..=7usize {
            let mut seen: HashSet<Round> = HashSet::new();
            for id in 1..=n as u32 {
                let mut prev = None;
                for _ in 0..50 {
                    let r = next_round(NodeId(id), n, prev);
                    assert!(seen.insert(r), "round {} generated twice with {} nodes", r, n);
                    if let Some(p) = prev {
                        assert!(r > p);
                    }
                    prev = Some(r);
                }
            }
        }
    }

    #[test]
    fn skip_ahead_stays_in_sequence() {
        // node 1 of 3 has used round 1 and has seen round 8 from a peer
        let r = next_round_above(NodeId(1), 3, Some(Round(1)), Round(8));
        assert_eq!(r, Round(10));

        let r = next_round_above(NodeId(1), 3, Some(Round(1)), Round(2));
        assert_eq!(r, Round(4));

        let r = next_round_above(NodeId(2), 3, None, Round(0));
        assert_eq!(r, Round(2));

        let r = next_round_above(NodeId(2), 3, None, Round(2));
        assert_eq!(r, Round(5));
    }
}
