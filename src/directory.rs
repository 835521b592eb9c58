//! Fixed mapping from node id to the channel that reaches that node
//!
//! A directory is built once every node exists and is then shared read-only, behind an
//! `Arc`, by all node threads.

use std::collections::BTreeMap;

use crossbeam_channel::Sender;

use crate::paxos::{self, Accept, Accepted, NodeId, Nack, Prepare, Promise};

/// Requests delivered to a node's inbox
pub enum Request {
    Prepare {
        prepare: Prepare,
        reply: Sender<Reply>
    },
    Accept {
        accept: Accept,
        reply: Sender<Reply>
    },
    Shutdown
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Reply {
    Prepare(Result<Promise, Nack>),
    Accept(Result<Accepted, Nack>)
}

#[derive(Clone)]
pub struct PeerHandle {
    id: NodeId,
    sender: Sender<Request>
}

impl PeerHandle {
    pub fn new(id: NodeId, sender: Sender<Request>) -> PeerHandle {
        PeerHandle { id, sender }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Delivers a request to the peer's inbox. Returns false if the peer is gone.
    pub fn send(&self, request: Request) -> bool {
        self.sender.send(request).is_ok()
    }
}

pub struct PeerDirectory {
    peers: BTreeMap<NodeId, PeerHandle>,
    majority: usize
}

impl PeerDirectory {
    pub fn new<I>(peers: I) -> PeerDirectory
        where I: IntoIterator<Item = PeerHandle>
    {
        let peers: BTreeMap<NodeId, PeerHandle> = peers.into_iter().map(|p| (p.id, p)).collect();
        let majority = paxos::majority(peers.len());
        PeerDirectory { peers, majority }
    }

    pub fn num_nodes(&self) -> usize {
        self.peers.len()
    }

    pub fn majority(&self) -> usize {
        self.majority
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.peers.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&PeerHandle> {
        self.peers.get(&id)
    }

    /// All peers, including the caller itself, in id order
    pub fn peers(&self) -> impl Iterator<Item = &PeerHandle> {
        self.peers.values()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;
    use crate::paxos::Round;

    #[test]
    fn cluster_parameters() {
        let (sender, _receiver) = unbounded();
        let d = PeerDirectory::new((1..=5).map(|i| PeerHandle::new(NodeId(i), sender.clone())));
        assert_eq!(d.num_nodes(), 5);
        assert_eq!(d.majority(), 3);
        assert!(d.contains(NodeId(5)));
        assert!(!d.contains(NodeId(6)));
        let ids: Vec<NodeId> = d.peers().map(|p| p.id()).collect();
        assert_eq!(ids, (1..=5).map(NodeId).collect::<Vec<_>>());
    }

    #[test]
    fn send_reports_dead_peers() {
        let (sender, receiver) = unbounded();
        let (reply, _replies) = unbounded();
        let d = PeerDirectory::new(vec![PeerHandle::new(NodeId(1), sender)]);
        let peer = d.get(NodeId(1)).unwrap();

        let prepare = Prepare { from_peer: NodeId(1), round: Round(1) };
        assert!(peer.send(Request::Prepare { prepare, reply: reply.clone() }));
        match receiver.try_recv() {
            Ok(Request::Prepare { prepare: p, .. }) => assert_eq!(p, prepare),
            _ => panic!("prepare not delivered")
        }

        drop(receiver);
        assert!(!peer.send(Request::Prepare { prepare, reply }));
    }
}
