//! Synchronization metrics
//!
//! Records cursor progress and tick outcomes to the global `metrics`
//! recorder, and aggregates them in memory for end-of-run summaries.

use contracts::{Cursor, TickOutcome};
use metrics::{counter, gauge, histogram};

/// Record the result of one synchronization tick
pub fn record_tick(outcome: &TickOutcome, cursor: &Cursor) {
    counter!("vds_sync_ticks_total", "outcome" => outcome.label()).increment(1);

    let advanced = outcome.advanced_by();
    if advanced > 0 {
        counter!("vds_sync_points_confirmed_total").increment(advanced);
    }
    gauge!("vds_sync_current_idx").set(cursor.current_idx as f64);
}

/// Record the configured target
pub fn record_target(cursor: &Cursor) {
    gauge!("vds_sync_target_idx").set(cursor.target_idx as f64);
    gauge!("vds_sync_current_idx").set(cursor.current_idx as f64);
}

/// Record a non-advancing observation
pub fn record_missed_observation() {
    counter!("vds_sync_missed_observations_total").increment(1);
}

/// Record how long attaching to the raw files took
pub fn record_attach_wait_ms(wait_ms: f64) {
    histogram!("vds_sync_attach_wait_ms").record(wait_ms);
}

/// Record handles released by a teardown
pub fn record_handles_closed(count: usize) {
    if count > 0 {
        counter!("vds_sync_handles_closed_total").increment(count as u64);
    }
}

/// Run progress aggregator
///
/// Aggregates tick outcomes in memory for summaries.
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    /// Total ticks
    pub ticks: u64,

    /// Ticks that examined the whole remaining range
    pub advanced_ticks: u64,

    /// Ticks ended because some module had not extended its arrays
    pub not_ready_ticks: u64,

    /// Ticks ended by the missed-observation tolerance
    pub stalled_ticks: u64,

    /// Points confirmed across all ticks
    pub points_confirmed: u64,

    /// Points confirmed per tick
    pub advance_stats: RunningStats,

    /// Last cursor position seen
    pub current_idx: u64,

    /// Target of the last cursor seen
    pub target_idx: u64,
}

impl ProgressAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in one tick
    pub fn update(&mut self, outcome: &TickOutcome, cursor: &Cursor) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Complete => {}
            TickOutcome::Advanced { .. } => self.advanced_ticks += 1,
            TickOutcome::NotReady { .. } => self.not_ready_ticks += 1,
            TickOutcome::Stalled { .. } => self.stalled_ticks += 1,
        }

        let advanced = outcome.advanced_by();
        self.points_confirmed += advanced;
        self.advance_stats.push(advanced as f64);
        self.current_idx = cursor.current_idx;
        self.target_idx = cursor.target_idx;
    }

    /// Summary report
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            ticks: self.ticks,
            points_confirmed: self.points_confirmed,
            not_ready_ticks: self.not_ready_ticks,
            stalled_ticks: self.stalled_ticks,
            current_idx: self.current_idx,
            target_idx: self.target_idx,
            completion: if self.target_idx > 0 {
                self.current_idx as f64 / self.target_idx as f64 * 100.0
            } else {
                100.0
            },
            points_per_tick: StatsSummary::from(&self.advance_stats),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Progress summary
#[derive(Debug, Clone, Default)]
pub struct ProgressSummary {
    pub ticks: u64,
    pub points_confirmed: u64,
    pub not_ready_ticks: u64,
    pub stalled_ticks: u64,
    pub current_idx: u64,
    pub target_idx: u64,
    pub completion: f64,
    pub points_per_tick: StatsSummary,
}

impl std::fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Synchronization Summary ===")?;
        writeln!(
            f,
            "Progress: {}/{} ({:.2}%)",
            self.current_idx, self.target_idx, self.completion
        )?;
        writeln!(f, "Ticks: {}", self.ticks)?;
        writeln!(f, "Points confirmed: {}", self.points_confirmed)?;
        writeln!(f, "Not-ready ticks: {}", self.not_ready_ticks)?;
        writeln!(f, "Stalled ticks: {}", self.stalled_ticks)?;
        writeln!(f, "Points per tick: {}", self.points_per_tick)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            self.m2 += delta * (value - self.mean);
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}
