pub mod cluster;
pub mod config;
pub mod decision;
pub mod directory;
pub mod error;
pub mod node;
pub mod paxos;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
