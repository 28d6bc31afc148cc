//! Cursor and tick outcomes - Sync Engine state contracts

use serde::{Deserialize, Serialize};

/// Progress cursor of one stitched output
///
/// `current_idx` is the highest confirmed unique id, which for a sequential
/// acquisition is also the number of scan points stitched so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// Highest scan-point id confirmed across all modules
    pub current_idx: u64,
    /// Stop once `current_idx` reaches this value
    pub target_idx: u64,
    /// Non-advancing observations in the current tick since the cursor last
    /// moved
    pub missed_count: u32,
}

impl Cursor {
    /// Cursor positioned after `completed_steps` with `steps_to_do` remaining
    pub fn new(completed_steps: u64, steps_to_do: u64) -> Self {
        Self {
            current_idx: completed_steps,
            target_idx: completed_steps + steps_to_do,
            missed_count: 0,
        }
    }

    /// Whether the configured target has been reached
    pub fn is_complete(&self) -> bool {
        self.current_idx >= self.target_idx
    }

    /// Scan-point indices still to be confirmed
    pub fn remaining(&self) -> std::ops::Range<u64> {
        self.current_idx..self.target_idx.max(self.current_idx)
    }

    /// Record a confirmed id
    ///
    /// Returns false and leaves the cursor untouched if `min_id` would not
    /// move it forward.
    pub fn advance(&mut self, min_id: u64) -> bool {
        if min_id <= self.current_idx {
            return false;
        }
        self.current_idx = min_id;
        self.missed_count = 0;
        true
    }

    /// Start a new tick with no missed observations
    pub fn clear_missed(&mut self) {
        self.missed_count = 0;
    }

    /// Record a non-advancing observation, returning the new count
    pub fn miss(&mut self) -> u32 {
        self.missed_count = self.missed_count.saturating_add(1);
        self.missed_count
    }
}

/// Result of one synchronization tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Target reached, nothing left to do
    Complete,
    /// Every index of the remaining range was examined
    Advanced { from: u64, to: u64 },
    /// Some module has not extended its arrays to `index` yet
    NotReady { from: u64, to: u64, index: u64 },
    /// Too many non-advancing observations this tick
    Stalled { from: u64, to: u64, index: u64 },
}

impl TickOutcome {
    /// Number of ids confirmed during the tick
    pub fn advanced_by(&self) -> u64 {
        match *self {
            Self::Complete => 0,
            Self::Advanced { from, to }
            | Self::NotReady { from, to, .. }
            | Self::Stalled { from, to, .. } => to - from,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Advanced { .. } => "advanced",
            Self::NotReady { .. } => "not_ready",
            Self::Stalled { .. } => "stalled",
        }
    }
}
