use log::trace;

use super::*;

pub struct Acceptor {
    peer_id: NodeId,
    state: AcceptorState
}

impl Acceptor {
    pub fn new(peer_id: NodeId) -> Acceptor {
        Acceptor {
            peer_id,
            state: AcceptorState::default()
        }
    }

    pub fn state(&self) -> AcceptorState {
        self.state
    }

    /// Promises not to accept anything below `round` if it is newer than any round promised so far.
    pub fn receive_prepare(&mut self, round: Round) -> Result<Promise, Nack> {
        match self.state.promised {
            Some(promised) if round <= promised => {
                trace!("{}: rejecting PREPARE({}), already promised {}", self.peer_id, round, promised);
                Err(Nack {
                    from_peer: self.peer_id,
                    round,
                    promised_round: promised
                })
            },
            _ => {
                self.state.promised = Some(round);
                trace!("{}: promised {}, last accepted {:?}", self.peer_id, round, self.state.accepted);
                Ok(Promise {
                    from_peer: self.peer_id,
                    round,
                    last_accepted: self.state.accepted
                })
            }
        }
    }

    /// Accepts `value` unless a strictly higher round has been promised.
    ///
    /// A round equal to the current promise is accepted; that is how the proposer that won
    /// the promise goes on to win the accept. Accepting also raises the promise to `round`
    /// so neither the promise nor the accepted round can ever move backwards.
    pub fn receive_accept(&mut self, round: Round, value: Value) -> Result<Accepted, Nack> {
        match self.state.promised {
            Some(promised) if round < promised => {
                trace!("{}: rejecting ACCEPT({}, {}), already promised {}", self.peer_id, round, value, promised);
                Err(Nack {
                    from_peer: self.peer_id,
                    round,
                    promised_round: promised
                })
            },
            _ => {
                self.state = AcceptorState {
                    promised: Some(round),
                    accepted: Some((round, value))
                };
                trace!("{}: accepted ({}, {})", self.peer_id, round, value);
                Ok(Accepted {
                    from_peer: self.peer_id,
                    round,
                    value
                })
            }
        }
    }
}
