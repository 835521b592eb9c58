//! Implementation of the Paxos algorithm (single synod version)
//!
//! The types in this module are shared by the sans-IO acceptor and proposer state
//! machines and by the node threads that carry their messages between peers.

use std::fmt;

pub mod acceptor;
pub mod proposer;
pub mod quorum;
pub mod round;

pub use self::acceptor::Acceptor;
pub use self::proposer::{Phase, Proposer};

/// Identifies a peer within the cluster. Always in the range `1..=num_nodes`
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

/// Round number
///
/// Rounds generated by different peers never collide. See `round::next_round`
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub struct Round(pub u64);

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The value being agreed upon
pub type Value = i64;

/// Minimum number of peers needed for any two quorums to intersect
pub fn majority(num_nodes: usize) -> usize {
    num_nodes / 2 + 1
}

/// Snapshot of an acceptor's state. `accepted` holds the round and value together so
/// one can never be set without the other.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct AcceptorState {
    pub promised: Option<Round>,
    pub accepted: Option<(Round, Value)>
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Prepare {
    pub from_peer: NodeId,
    pub round: Round
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Promise {
    pub from_peer: NodeId,
    pub round: Round,
    pub last_accepted: Option<(Round, Value)>
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Accept {
    pub from_peer: NodeId,
    pub round: Round,
    pub value: Value
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Accepted {
    pub from_peer: NodeId,
    pub round: Round,
    pub value: Value
}

/// Rejection of a stale Prepare or Accept. This is a routine outcome rather than a fault.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Nack {
    pub from_peer: NodeId,
    pub round: Round,
    pub promised_round: Round
}
