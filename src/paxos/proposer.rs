use std::collections::BTreeMap;

use super::*;
use super::quorum::{has_quorum, quorum_impossible};
use super::round::next_round_above;

/// Progress of a single decision attempt.
///
/// Retrying is the transition from `Preparing` or `Accepting` back into `Preparing` under a
/// fresh round. `Decided` is terminal.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Phase {
    Idle,
    Preparing,
    Accepting,
    Decided(Value)
}

pub struct Proposer {
    peer_id: NodeId,
    num_peers: usize,
    quorum_size: usize,
    phase: Phase,
    proposed_round: Option<Round>,
    proposed_value: Option<Value>,
    /// True when `proposed_value` came from a peer's previously accepted value
    value_adopted: bool,
    highest_round_seen: Round,
    promises: BTreeMap<NodeId, Option<Promise>>,
    accepts: BTreeMap<NodeId, Option<Accepted>>,
    rounds_started: u32
}

impl Proposer {
    pub fn new(peer_id: NodeId, num_peers: usize, quorum_size: usize) -> Proposer {
        assert!(peer_id.0 >= 1 && peer_id.0 as usize <= num_peers);
        assert!(quorum_size >= majority(num_peers) && quorum_size <= num_peers);
        Proposer {
            peer_id,
            num_peers,
            quorum_size,
            phase: Phase::Idle,
            proposed_round: None,
            proposed_value: None,
            value_adopted: false,
            highest_round_seen: Round(0),
            promises: BTreeMap::new(),
            accepts: BTreeMap::new(),
            rounds_started: 0
        }
    }

    pub fn phase(&self) -> Phase { self.phase }
    pub fn current_round(&self) -> Option<Round> { self.proposed_round }
    pub fn proposed_value(&self) -> Option<Value> { self.proposed_value }
    pub fn rounds_started(&self) -> u32 { self.rounds_started }
    pub fn quorum_size(&self) -> usize { self.quorum_size }

    /// Abandons the current round, if any, and begins the Prepare phase of the next one.
    ///
    /// The new round is the first in this peer's sequence that is higher than every round
    /// seen so far. Returns None once a value has been decided.
    pub fn start_round(&mut self) -> Option<Prepare> {
        if let Phase::Decided(_) = self.phase {
            return None;
        }
        let round = next_round_above(
            self.peer_id, self.num_peers, self.proposed_round, self.highest_round_seen);

        self.proposed_round = Some(round);
        self.update_highest_round(round);
        if !self.value_adopted {
            self.proposed_value = None;
        }
        self.promises.clear();
        self.accepts.clear();
        self.rounds_started += 1;
        self.phase = Phase::Preparing;

        Some(Prepare {
            from_peer: self.peer_id,
            round
        })
    }

    fn update_highest_round(&mut self, round: Round) {
        if round > self.highest_round_seen {
            self.highest_round_seen = round;
        }
    }

    fn is_current(&self, phase: Phase, round: Round) -> bool {
        self.phase == phase && self.proposed_round == Some(round)
    }

    pub fn receive_promise(&mut self, promise: Promise) {
        self.update_highest_round(promise.round);
        if self.is_current(Phase::Preparing, promise.round) {
            self.promises.entry(promise.from_peer).or_insert(Some(promise));
        }
    }

    /// Returns true if this Nack eliminates the possibility of a Prepare quorum for the
    /// current round.
    pub fn receive_prepare_nack(&mut self, nack: Nack) -> bool {
        self.update_highest_round(nack.promised_round);
        if self.is_current(Phase::Preparing, nack.round) {
            self.promises.entry(nack.from_peer).or_insert(None);
        }
        let rejections = self.promises.values().filter(|p| p.is_none()).count();
        quorum_impossible(rejections, self.num_peers, self.quorum_size)
    }

    pub fn prepare_quorum_reached(&self) -> bool {
        self.phase == Phase::Preparing && has_quorum(self.promises.values(), self.quorum_size)
    }

    /// True once every peer has answered the current phase
    pub fn all_responded(&self) -> bool {
        match self.phase {
            Phase::Preparing => self.promises.len() >= self.num_peers,
            Phase::Accepting => self.accepts.len() >= self.num_peers,
            _ => false
        }
    }

    /// Chooses the value to propose and moves into the Accept phase.
    ///
    /// If any promise reported a previously accepted value, the one from the highest round
    /// must be proposed. Otherwise a value adopted in an earlier round is kept, and failing
    /// that `own_value` is used. Returns None unless a Prepare quorum has been reached.
    pub fn accept_message(&mut self, own_value: Value) -> Option<Accept> {
        if !self.prepare_quorum_reached() {
            return None;
        }
        let round = self.proposed_round?;

        let highest_accepted = self.promises.values()
            .filter_map(|p| p.and_then(|p| p.last_accepted))
            .max_by_key(|(r, _)| *r);

        let value = match highest_accepted {
            Some((_, v)) => {
                self.value_adopted = true;
                v
            },
            None => match self.proposed_value {
                Some(v) => v,
                None => own_value
            }
        };

        self.proposed_value = Some(value);
        self.phase = Phase::Accepting;

        Some(Accept {
            from_peer: self.peer_id,
            round,
            value
        })
    }

    pub fn receive_accepted(&mut self, accepted: Accepted) {
        self.update_highest_round(accepted.round);
        if self.is_current(Phase::Accepting, accepted.round) {
            self.accepts.entry(accepted.from_peer).or_insert(Some(accepted));
        }
    }

    /// Returns true if this Nack eliminates the possibility of an Accept quorum for the
    /// current round.
    pub fn receive_accept_nack(&mut self, nack: Nack) -> bool {
        self.update_highest_round(nack.promised_round);
        if self.is_current(Phase::Accepting, nack.round) {
            self.accepts.entry(nack.from_peer).or_insert(None);
        }
        let rejections = self.accepts.values().filter(|a| a.is_none()).count();
        quorum_impossible(rejections, self.num_peers, self.quorum_size)
    }

    /// Records that `peer` could not be reached during the current phase. Returns true if
    /// this eliminates the possibility of a quorum.
    pub fn peer_unreachable(&mut self, peer: NodeId) -> bool {
        let rejections = match self.phase {
            Phase::Preparing => {
                self.promises.entry(peer).or_insert(None);
                self.promises.values().filter(|p| p.is_none()).count()
            },
            Phase::Accepting => {
                self.accepts.entry(peer).or_insert(None);
                self.accepts.values().filter(|a| a.is_none()).count()
            },
            _ => return false
        };
        quorum_impossible(rejections, self.num_peers, self.quorum_size)
    }

    pub fn accept_quorum_reached(&self) -> bool {
        self.phase == Phase::Accepting && has_quorum(self.accepts.values(), self.quorum_size)
    }

    /// Moves to `Decided` if a quorum of peers has accepted the current proposal
    pub fn decide(&mut self) -> Option<Value> {
        if !self.accept_quorum_reached() {
            return None;
        }
        let value = self.proposed_value?;
        self.phase = Phase::Decided(value);
        Some(value)
    }
}
