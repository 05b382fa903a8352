use serde::{Deserialize, Serialize};

/// queue の件数のスナップショット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub failed: u64,
}

impl QueueCounts {
    /// pending も running も空
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.running == 0
    }
}
