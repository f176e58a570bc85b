//! # Events
//!
//! Every component keeps an append-only [`EventLog`]. Records get sequential
//! ids starting at 1 and are never rewritten, so a consumer can poll with
//! [`EventLog::since`] and resume where it left off.

use serde::{Deserialize, Serialize};

use vouch_protocol::clock::Timestamp;
use vouch_protocol::identity::Address;
use vouch_protocol::vault::{Amount, Unit};

/// Something observable happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pledge was created.
    NewPledge { pledge_id: u64 },

    /// A judge voted on a pledge.
    Judgement {
        judge: Address,
        pledge_id: u64,
        passed: bool,
    },

    /// An expired pledge's balance was credited back to its creator.
    PledgeSettled {
        pledge_id: u64,
        creator: Address,
        amount: Amount,
        unit: Unit,
    },

    /// The bank realized its profit in a unit.
    Profit { amount: Amount, unit: Unit },

    /// A component's logic module was replaced.
    Upgraded {
        implementation: Address,
        version: String,
    },
}

/// A logged event with its id and the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub timestamp: Timestamp,
    pub event: Event,
}

/// Append-only event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its id.
    pub fn emit(&mut self, timestamp: Timestamp, event: Event) -> u64 {
        let id = self.records.len() as u64 + 1;
        self.records.push(EventRecord {
            id,
            timestamp,
            event,
        });
        id
    }

    pub fn all(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with an id strictly greater than `id`.
    pub fn since(&self, id: u64) -> &[EventRecord] {
        let start = (id as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
