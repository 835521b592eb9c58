use std::error;
use std::fmt;
use std::io;

use crate::paxos::NodeId;

#[derive(Debug)]
pub enum Error {
    /// The proposer on `node` started `attempts` rounds without reaching a decision
    NoDecision {
        node: NodeId,
        attempts: u32
    },
    Config(String),
    Io(io::Error),
    /// The thread running this node panicked
    NodeFailed(NodeId)
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoDecision { node, attempts } => {
                write!(f, "{} reached no decision after {} attempts", node, attempts)
            },
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::NodeFailed(node) => write!(f, "{} failed", node)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
