//! A node combines one acceptor and one proposer on a dedicated thread
//!
//! Peers interact only by sending `Request`s to each other's inbox. The node thread handles
//! its inbox one request at a time, including while its own proposer is waiting for replies,
//! so the acceptor's check-then-set can never race and a node can always answer its own
//! Prepare and Accept requests.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{self, after, select, Receiver, Sender};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{BackoffConfig, Config};
use crate::decision::{DecisionLog, Entry};
use crate::directory::{PeerDirectory, PeerHandle, Reply, Request};
use crate::error::{Error, Result};
use crate::paxos::{Accept, Acceptor, AcceptorState, NodeId, Prepare, Proposer, Round, Value};

/// Per-node settings derived from the cluster configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Run a proposer cycle after start-up. Every node serves as an acceptor regardless.
    pub propose: bool,
    /// Value to propose when no peer reports an accepted one. Defaults to one more than
    /// the last decided value.
    pub value: Option<Value>,
    pub max_attempts: u32,
    pub phase_timeout: Duration,
    pub backoff: BackoffConfig
}

impl Settings {
    pub fn from_config(config: &Config, id: NodeId) -> Settings {
        Settings {
            propose: config.proposers.contains(&id),
            value: config.values.get(&id).cloned(),
            max_attempts: config.max_attempts,
            phase_timeout: config.phase_timeout,
            backoff: config.backoff.clone()
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Decision {
    pub value: Value,
    pub round: Round,
    /// Number of rounds this node started, including the successful one
    pub attempts: u32,
    pub entry: Entry
}

/// Result of a node's proposer cycle, sent when the cycle ends
#[derive(Debug)]
pub struct Outcome {
    pub node: NodeId,
    pub result: Result<Decision>
}

/// Final state of a node, returned when its thread exits
#[derive(Debug, Clone)]
pub struct Report {
    pub node: NodeId,
    pub acceptor: AcceptorState,
    pub log: DecisionLog,
    pub decision: Option<Decision>,
    pub rounds_started: u32
}

pub struct Node {
    id: NodeId,
    sender: Sender<Request>,
    inbox: Receiver<Request>
}

impl Node {
    pub fn new(id: NodeId) -> Node {
        let (sender, inbox) = crossbeam_channel::unbounded();
        Node { id, sender, inbox }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn handle(&self) -> PeerHandle {
        PeerHandle::new(self.id, self.sender.clone())
    }

    /// Starts the node thread.
    ///
    /// If `settings.propose` is set, the thread runs one decision cycle and sends its
    /// `Outcome` on `outcomes`. Either way it then keeps answering requests until it
    /// receives `Request::Shutdown`.
    pub fn start(
        self,
        directory: Arc<PeerDirectory>,
        settings: Settings,
        outcomes: Sender<Outcome>) -> Result<thread::JoinHandle<Report>> {

        if !directory.contains(self.id) {
            return Err(Error::Config(format!("{} is missing from the peer directory", self.id)));
        }
        let num_nodes = directory.num_nodes();
        if !(1..=num_nodes as u32).all(|i| directory.contains(NodeId(i))) {
            return Err(Error::Config(format!("peer ids must run from 1 to {}", num_nodes)));
        }

        let (reply_sender, replies) = crossbeam_channel::unbounded();

        let runner = Runner {
            id: self.id,
            inbox: self.inbox,
            reply_sender,
            replies,
            acceptor: Acceptor::new(self.id),
            proposer: Proposer::new(self.id, num_nodes, directory.majority()),
            log: DecisionLog::new(),
            directory,
            settings,
            rng: StdRng::from_entropy(),
            shutdown: false
        };

        let handle = thread::Builder::new()
            .name(format!("node-{}", self.id.0))
            .spawn(move || runner.run(outcomes))?;

        Ok(handle)
    }
}

struct Runner {
    id: NodeId,
    inbox: Receiver<Request>,
    reply_sender: Sender<Reply>,
    replies: Receiver<Reply>,
    acceptor: Acceptor,
    proposer: Proposer,
    log: DecisionLog,
    directory: Arc<PeerDirectory>,
    settings: Settings,
    rng: StdRng,
    shutdown: bool
}

impl Runner {
    fn run(mut self, outcomes: Sender<Outcome>) -> Report {
        let mut decision = None;

        if self.settings.propose {
            let result = self.propose();
            decision = result.as_ref().ok().cloned();
            // The cluster may already have stopped listening
            let _ = outcomes.send(Outcome { node: self.id, result });
        }

        self.serve();

        debug!("{}: shutting down, data store: {}", self.id, self.log);

        Report {
            node: self.id,
            acceptor: self.acceptor.state(),
            log: self.log,
            decision,
            rounds_started: self.proposer.rounds_started()
        }
    }

    fn serve(&mut self) {
        while !self.shutdown {
            match self.inbox.recv() {
                Ok(request) => self.handle_request(request),
                Err(_) => break
            }
        }
    }

    fn handle_request(&mut self, request: Request) {
        match request {
            Request::Prepare { prepare, reply } => {
                let response = self.acceptor.receive_prepare(prepare.round);
                let _ = reply.send(Reply::Prepare(response));
            },
            Request::Accept { accept, reply } => {
                let response = self.acceptor.receive_accept(accept.round, accept.value);
                let _ = reply.send(Reply::Accept(response));
            },
            Request::Shutdown => self.shutdown = true
        }
    }

    /// Waits for the next reply to arrive before `deadline`, serving the inbox meanwhile
    fn next_reply(&mut self, deadline: Instant) -> Option<Reply> {
        let inbox = self.inbox.clone();
        let replies = self.replies.clone();

        while !self.shutdown {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            select! {
                recv(inbox) -> msg => match msg {
                    Ok(request) => self.handle_request(request),
                    Err(_) => self.shutdown = true
                },
                recv(replies) -> msg => if let Ok(reply) = msg {
                    return Some(reply);
                },
                recv(after(deadline - now)) -> _ => return None
            }
        }
        None
    }

    fn propose(&mut self) -> Result<Decision> {
        let mut failures = 0;

        while self.proposer.rounds_started() < self.settings.max_attempts && !self.shutdown {
            if failures > 0 {
                self.back_off(failures);
            }

            let prepare = match self.proposer.start_round() {
                Some(p) => p,
                None => break
            };

            if !self.prepare_phase(prepare) {
                debug!("{}: no majority of promises for round {}, retrying", self.id, prepare.round);
                failures += 1;
                continue;
            }

            debug!("{}: majority of promises for round {}, sending accept-requests", self.id, prepare.round);

            let own_value = match self.settings.value {
                Some(v) => v,
                None => self.log.last_key() + 1
            };
            let accept = match self.proposer.accept_message(own_value) {
                Some(a) => a,
                None => {
                    failures += 1;
                    continue;
                }
            };

            if !self.accept_phase(accept) {
                debug!("{}: no majority of accepts for round {}, retrying", self.id, accept.round);
                failures += 1;
                continue;
            }

            if let Some(value) = self.proposer.decide() {
                let entry = self.log.record(value);
                info!("{}: consensus reached on value {} in round {}", self.id, value, accept.round);
                debug!("{}: current state of data store: {}", self.id, self.log);
                return Ok(Decision {
                    value,
                    round: accept.round,
                    attempts: self.proposer.rounds_started(),
                    entry
                });
            }
        }

        let attempts = self.proposer.rounds_started();
        warn!("{}: giving up after {} rounds without a decision", self.id, attempts);
        Err(Error::NoDecision { node: self.id, attempts })
    }

    /// Sends a request to every peer. Peers that cannot be reached count as rejections.
    /// Returns true if those alone make a quorum impossible for the current phase.
    fn broadcast<F>(&mut self, make_request: F) -> bool
        where F: Fn(Sender<Reply>) -> Request
    {
        let directory = self.directory.clone();
        let mut impossible = false;
        for peer in directory.peers() {
            if !peer.send(make_request(self.reply_sender.clone())) {
                debug!("{}: {} is unreachable", self.id, peer.id());
                impossible |= self.proposer.peer_unreachable(peer.id());
            }
        }
        impossible
    }

    /// Returns true if a majority promised the round
    fn prepare_phase(&mut self, prepare: Prepare) -> bool {
        debug!("{}: sending PREPARE(round {}) to {} peers",
            self.id, prepare.round, self.directory.num_nodes());

        let impossible = self.broadcast(|reply| Request::Prepare { prepare, reply });

        let deadline = Instant::now() + self.settings.phase_timeout;
        while !impossible && !self.proposer.all_responded() {
            match self.next_reply(deadline) {
                None => break,
                Some(Reply::Prepare(Ok(promise))) => self.proposer.receive_promise(promise),
                Some(Reply::Prepare(Err(nack))) => {
                    if self.proposer.receive_prepare_nack(nack) {
                        break;
                    }
                },
                // Left over from an abandoned round
                Some(Reply::Accept(_)) => ()
            }
        }

        self.proposer.prepare_quorum_reached()
    }

    /// Returns true if a majority accepted the proposal
    fn accept_phase(&mut self, accept: Accept) -> bool {
        debug!("{}: sending ACCEPT-REQUEST(round {}, value {}) to {} peers",
            self.id, accept.round, accept.value, self.directory.num_nodes());

        let impossible = self.broadcast(|reply| Request::Accept { accept, reply });

        let deadline = Instant::now() + self.settings.phase_timeout;
        while !impossible && !self.proposer.all_responded() {
            match self.next_reply(deadline) {
                None => break,
                Some(Reply::Accept(Ok(accepted))) => self.proposer.receive_accepted(accepted),
                Some(Reply::Accept(Err(nack))) => {
                    if self.proposer.receive_accept_nack(nack) {
                        break;
                    }
                },
                Some(Reply::Prepare(_)) => ()
            }
        }

        self.proposer.accept_quorum_reached()
    }

    /// Sleeps between rounds without ignoring the inbox
    fn back_off(&mut self, failures: u32) {
        let delay = self.settings.backoff.duration(failures, &mut self.rng);
        debug!("{}: backing off for {:?}", self.id, delay);
        let deadline = Instant::now() + delay;
        while self.next_reply(deadline).is_some() {}
    }
}
