//! Lamport vector clock and operation identifiers.
//!
//! Every mutation of the tree is stamped with an [`OpId`]. The total order
//! over ids — `clock` first, then `origin`, then `idx` — is what every
//! replica uses to break ties, so it is implemented explicitly rather than
//! derived from field order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Identifier of an independent operation-producing actor.
pub type SiteId = String;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    /// The id is not strictly greater than the last id seen from its origin.
    #[error("stale operation {id}: already saw {seen} from this origin")]
    StaleOperation { id: OpId, seen: OpId },
}

/// Globally unique identifier of a single operation.
///
/// `idx` addresses sub-operations produced under one clock tick; ids
/// allocated by [`VectorClock::new_id`] always carry `idx = 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId {
    origin: SiteId,
    clock: i64,
    idx: i32,
}

impl OpId {
    pub fn new(origin: impl Into<SiteId>, clock: i64, idx: i32) -> Self {
        Self {
            origin: origin.into(),
            clock,
            idx,
        }
    }

    /// The zero id. As a causal anchor it names the head of a list.
    pub fn list_start() -> Self {
        Self::default()
    }

    /// Anchor that resolves to the last position of a list.
    pub fn list_end() -> Self {
        Self {
            origin: SiteId::new(),
            clock: i64::MAX,
            idx: 0,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn clock(&self) -> i64 {
        self.clock
    }

    pub fn idx(&self) -> i32 {
        self.idx
    }

    pub fn is_list_start(&self) -> bool {
        self.clock == 0 && self.idx == 0 && self.origin.is_empty()
    }

    pub fn is_list_end(&self) -> bool {
        self.clock == i64::MAX && self.idx == 0 && self.origin.is_empty()
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.clock
            .cmp(&other.clock)
            .then_with(|| self.origin.cmp(&other.origin))
            .then_with(|| self.idx.cmp(&other.idx))
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}.{}", self.origin, self.clock, self.idx)
    }
}

/// Per-site Lamport counters.
///
/// `last_seen` per site is monotonically non-decreasing: [`VectorClock::track`]
/// only ever moves it forward.
#[derive(Debug, Clone, Default)]
pub struct VectorClock {
    max_clock: i64,
    last_seen: HashMap<SiteId, OpId>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next id for `site`. Pure: nothing is recorded until the
    /// id is [`track`](Self::track)ed.
    pub fn new_id(&self, site: &str) -> OpId {
        OpId::new(site, self.max_clock + 1, 0)
    }

    /// Records `id` as seen. Fails if `id` is not strictly greater than the
    /// last id seen from the same origin.
    pub fn track(&mut self, id: &OpId) -> Result<(), ClockError> {
        if let Some(seen) = self.last_seen.get(&id.origin) {
            if id <= seen {
                return Err(ClockError::StaleOperation {
                    id: id.clone(),
                    seen: seen.clone(),
                });
            }
        }
        self.last_seen.insert(id.origin.clone(), id.clone());
        self.max_clock = self.max_clock.max(id.clock);
        Ok(())
    }

    pub fn max_clock(&self) -> i64 {
        self.max_clock
    }

    pub fn last_seen(&self, site: &str) -> Option<&OpId> {
        self.last_seen.get(site)
    }
}
