//! FIFO eviction for the bounded ring-buffer tiers

use std::collections::VecDeque;

use tracing::debug;

use crate::record::MemoryRecord;

/// Bounded insertion-order eviction shared by the working and episodic tiers.
///
/// Strictly FIFO: the oldest-inserted records are removed first, and access
/// patterns never influence the order.
#[derive(Debug, Clone, Copy)]
pub struct FifoEviction {
    max_size: usize,
}

impl FifoEviction {
    /// Create a policy with the given capacity
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }

    /// Get the capacity
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append a record, then evict from the front until the queue fits.
    ///
    /// The bound is enforced before the insert is considered complete.
    pub fn push(&self, queue: &mut VecDeque<MemoryRecord>, record: MemoryRecord) {
        queue.push_back(record);
        while queue.len() > self.max_size {
            if let Some(evicted) = queue.pop_front() {
                debug!(record_id = %evicted.id, tier = %evicted.tier, "Evicted oldest record");
            }
        }
    }
}
