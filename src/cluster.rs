//! Creates the nodes of a cluster, installs the shared peer directory and starts every node
//! thread.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{self, Receiver};
use log::{debug, warn};

use crate::config::Config;
use crate::directory::{PeerDirectory, Request};
use crate::error::{Error, Result};
use crate::node::{Decision, Node, Outcome, Report, Settings};
use crate::paxos::NodeId;

pub struct Cluster {
    directory: Arc<PeerDirectory>,
    threads: Vec<(NodeId, thread::JoinHandle<Report>)>,
    outcomes: Receiver<Outcome>,
    pending: usize
}

impl Cluster {
    pub fn start(config: &Config) -> Result<Cluster> {
        config.validate()?;

        let nodes: Vec<Node> = config.node_ids().map(Node::new).collect();

        // Every node must exist before the directory can be installed
        let directory = Arc::new(PeerDirectory::new(nodes.iter().map(Node::handle)));

        let (outcome_sender, outcomes) = crossbeam_channel::unbounded();
        let mut cluster = Cluster {
            directory: directory.clone(),
            threads: Vec::with_capacity(nodes.len()),
            outcomes,
            pending: 0
        };

        for node in nodes {
            let id = node.id();
            let settings = Settings::from_config(config, id);
            if settings.propose {
                cluster.pending += 1;
            }
            match node.start(directory.clone(), settings, outcome_sender.clone()) {
                Ok(handle) => cluster.threads.push((id, handle)),
                Err(e) => {
                    // Stop the nodes already running before reporting the failure
                    let _ = cluster.shutdown();
                    return Err(e);
                }
            }
        }

        debug!("started {} nodes, {} proposing", cluster.threads.len(), cluster.pending);

        Ok(cluster)
    }

    /// Blocks until every proposing node has finished its decision cycle
    pub fn wait(&mut self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.pending);
        while self.pending > 0 {
            match self.outcomes.recv() {
                Ok(outcome) => {
                    self.pending -= 1;
                    outcomes.push(outcome);
                },
                // Every node thread has exited
                Err(_) => break
            }
        }
        outcomes.sort_by_key(|o| o.node);
        outcomes
    }

    /// Stops every node and returns their final reports in node id order
    pub fn shutdown(mut self) -> Result<Vec<Report>> {
        for peer in self.directory.peers() {
            peer.send(Request::Shutdown);
        }

        let mut reports = Vec::with_capacity(self.threads.len());
        let mut failed = None;
        for (id, handle) in self.threads.drain(..) {
            match handle.join() {
                Ok(report) => reports.push(report),
                Err(_) => failed = failed.or(Some(id))
            }
        }

        match failed {
            Some(id) => Err(Error::NodeFailed(id)),
            None => Ok(reports)
        }
    }
}

/// Runs a single decision cycle across a fresh cluster and returns every node's report
pub fn run(config: &Config) -> Result<Vec<Report>> {
    let mut cluster = Cluster::start(config)?;
    cluster.wait();
    cluster.shutdown()
}

/// Collects the decisions from a cycle's outcomes.
///
/// Failed proposers are logged. If no proposer decided, the first failure is returned.
pub fn decisions(outcomes: Vec<Outcome>) -> Result<Vec<Decision>> {
    let mut decided = Vec::new();
    let mut first_failure = None;
    for outcome in outcomes {
        match outcome.result {
            Ok(d) => decided.push(d),
            Err(e) => {
                warn!("{}: {}", outcome.node, e);
                first_failure = first_failure.or(Some(e));
            }
        }
    }
    match first_failure {
        Some(e) if decided.is_empty() => Err(e),
        None if decided.is_empty() => Err(Error::Config("no node proposed a value".into())),
        _ => Ok(decided)
    }
}
