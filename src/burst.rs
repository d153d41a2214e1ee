//! # Burst Estimator
//!
//! Predicts the length of a thread's next CPU burst for Level-1
//! (shortest-job-first) ordering. The prediction is a first-order
//! exponential average with smoothing factor 0.5:
//!
//! ```text
//! next = (actual + previous) / 2
//! ```
//!
//! A burst ends when the thread blocks. Time slices cut short by
//! preemption or a voluntary yield are partial bursts: they accumulate
//! and the sum feeds `actual` at the next completion.

use crate::arch::Tick;
use crate::config::MAX_BURST_ESTIMATE;
use crate::error::{Result, SchedError};

/// Smoothing factor between the last observation and the prior estimate.
pub const BURST_ALPHA: f64 = 0.5;

/// Compute the next burst estimate.
///
/// Degenerate results are clamped into `0.0..=MAX_BURST_ESTIMATE` so a
/// NaN or infinity never reaches the Level-1 comparator.
pub fn next_estimate(actual: Tick, previous: f64) -> f64 {
    let next = BURST_ALPHA * actual as f64 + (1.0 - BURST_ALPHA) * previous;
    if next.is_finite() {
        next.clamp(0.0, MAX_BURST_ESTIMATE)
    } else if next > 0.0 {
        MAX_BURST_ESTIMATE
    } else {
        // NaN or -inf
        0.0
    }
}

/// Per-thread burst bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstEstimator {
    /// Prediction used for Level-1 ordering.
    estimate: f64,
    /// Prediction before the last completed burst.
    previous: f64,
    /// Ticks run since the last completed burst.
    accumulated: Tick,
}

impl BurstEstimator {
    /// Estimator seeded with `initial`. Rejects negative or non-finite
    /// values.
    pub fn new(initial: f64) -> Result<Self> {
        if !initial.is_finite() || initial < 0.0 {
            return Err(SchedError::InvalidBurstEstimate);
        }
        let initial = initial.min(MAX_BURST_ESTIMATE);
        Ok(Self {
            estimate: initial,
            previous: initial,
            accumulated: 0,
        })
    }

    #[inline]
    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    #[inline]
    pub fn previous(&self) -> f64 {
        self.previous
    }

    #[inline]
    pub fn accumulated(&self) -> Tick {
        self.accumulated
    }

    /// Fold a partial burst (preempted or yielded slice) into the
    /// running total.
    pub fn accumulate(&mut self, ticks: Tick) {
        self.accumulated = self.accumulated.saturating_add(ticks);
    }

    /// Close the current burst whose final segment lasted `last_segment`
    /// ticks. Returns the new estimate.
    pub fn complete(&mut self, last_segment: Tick) -> f64 {
        let actual = self.accumulated.saturating_add(last_segment);
        self.previous = self.estimate;
        self.estimate = next_estimate(actual, self.previous);
        self.accumulated = 0;
        self.estimate
    }
}

impl Default for BurstEstimator {
    fn default() -> Self {
        Self {
            estimate: crate::config::DEFAULT_BURST_ESTIMATE,
            previous: crate::config::DEFAULT_BURST_ESTIMATE,
            accumulated: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
