//! Per-node record of decided values
//!
//! The log always begins with a genesis entry so that `last_key()` has a defined base value
//! before anything is decided. Each new entry's sequence number is derived from the entry
//! before it. Sequence numbers only order entries and carry no other meaning.

use std::fmt;

use crate::paxos::Value;

/// Distance between the sequence numbers of consecutive entries
pub const SEQUENCE_STEP: u64 = 1;

/// First entry of every log
pub const GENESIS: Entry = Entry { value: 0, sequence: 0 };

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Entry {
    pub value: Value,
    pub sequence: u64
}

#[derive(PartialEq, Eq, Clone, Debug)]
pub struct DecisionLog {
    entries: Vec<Entry>
}

impl DecisionLog {
    pub fn new() -> DecisionLog {
        DecisionLog {
            entries: vec![GENESIS]
        }
    }

    fn last(&self) -> Entry {
        self.entries.last().copied().unwrap_or(GENESIS)
    }

    /// Value of the most recent entry
    pub fn last_key(&self) -> Value {
        self.last().value
    }

    /// Appends a decided value and returns the new entry
    pub fn record(&mut self, value: Value) -> Entry {
        let entry = Entry {
            value,
            sequence: self.last().sequence + SEQUENCE_STEP
        };
        self.entries.push(entry);
        entry
    }

    /// Entries following the genesis entry, oldest first
    pub fn decided(&self) -> &[Entry] {
        &self.entries[1..]
    }

    pub fn len(&self) -> usize {
        self.decided().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decided().is_empty()
    }
}

impl Default for DecisionLog {
    fn default() -> Self {
        DecisionLog::new()
    }
}

impl fmt::Display for DecisionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, e) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: #{}", e.value, e.sequence)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_genesis() {
        let log = DecisionLog::new();
        assert_eq!(log.last_key(), GENESIS.value);
        assert!(log.is_empty());
        assert_eq!(log.clone().record(4).sequence, GENESIS.sequence + SEQUENCE_STEP);
        assert_eq!(log.to_string(), "{0: #0}");
    }

    #[test]
    fn sequence_increases() {
        let mut log = DecisionLog::new();
        let a = log.record(1);
        let b = log.record(5);
        assert!(b.sequence > a.sequence);
        assert_eq!(a.sequence, SEQUENCE_STEP);
        assert_eq!(log.last_key(), 5);
        assert_eq!(log.len(), 2);
        assert_eq!(log.decided(), &[a, b]);
    }
}
