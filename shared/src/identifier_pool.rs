use std::{
    collections::VecDeque,
    ops::Range,
    time::{Duration, Instant},
};

use crate::{world::SpawnError, NetworkId};

/// Hands out network ids for runtime spawns. Released ids are only reissued
/// once `recycle_delay` has passed since their release, so a late message
/// addressed to a despawned object can never land on its successor.
pub struct IdentifierPool {
    range: Range<NetworkId>,
    next_id: NetworkId,
    recycling: bool,
    recycle_delay: Duration,
    recycled_ids: VecDeque<(Instant, NetworkId)>,
}

impl IdentifierPool {
    pub fn new(range: Range<NetworkId>, recycling: bool, recycle_delay: Duration) -> Self {
        Self {
            next_id: range.start,
            range,
            recycling,
            recycle_delay,
            recycled_ids: VecDeque::new(),
        }
    }

    pub fn generate(&mut self, now: Instant) -> Result<NetworkId, SpawnError> {
        if self.recycling {
            if let Some((released_at, _)) = self.recycled_ids.front() {
                if now.saturating_duration_since(*released_at) >= self.recycle_delay {
                    if let Some((_, id)) = self.recycled_ids.pop_front() {
                        return Ok(id);
                    }
                }
            }
        }

        if self.next_id >= self.range.end {
            return Err(SpawnError::IdentifierExhausted {
                start: self.range.start,
                end: self.range.end,
            });
        }
        let id = self.next_id;
        self.next_id += 1;
        Ok(id)
    }

    /// Returns an id to the pool. Without recycling the id is retired.
    pub fn release(&mut self, id: NetworkId, now: Instant) {
        if !self.recycling || !self.range.contains(&id) {
            return;
        }
        self.recycled_ids.push_back((now, id));
    }

    pub fn contains(&self, id: &NetworkId) -> bool {
        self.range.contains(id)
    }

    pub fn recycle_delay(&self) -> Duration {
        self.recycle_delay
    }

    pub fn waiting_count(&self) -> usize {
        self.recycled_ids.len()
    }
}
