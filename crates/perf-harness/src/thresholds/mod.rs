//! Threshold resolution and the pure bound calculator
//!
//! Configured thresholds are two-tier (`base` plus an optional `ci` profile)
//! and carry a per-metric buffer percentage to absorb measurement noise.
//! Resolution merges the tiers, validates every value, and bakes the buffers
//! into absolute pass/fail bounds exactly once per test run.
//!
//! The metric-direction distinction matters: fps is a "must not fall below"
//! metric and buffers by *subtracting* its percentage, while durations, heap
//! growth, vitals and long tasks buffer by *adding*. Treating all metrics
//! uniformly would silently invert pass/fail outcomes for fps.

pub mod calculator;
pub mod resolve;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use calculator::{effective_min_threshold, effective_threshold};
pub use resolve::{resolve, ResolvedBound, ResolvedThresholds};

/// Well-known metric names used for threshold lookup and aggregation keys.
/// Custom user-timing measures are keyed by their own names.
pub mod metric {
    /// Wall-clock duration of one iteration body, in milliseconds.
    pub const DURATION: &str = "duration";
    /// Total committed render time per iteration, in milliseconds.
    pub const RENDER_DURATION: &str = "render_duration";
    /// Number of profiler commits per iteration.
    pub const RENDER_COUNT: &str = "render_count";
    /// Frames per second (min-style).
    pub const FPS: &str = "fps";
    /// Heap growth per iteration, in bytes.
    pub const HEAP_GROWTH: &str = "heap_growth";
    pub const LCP: &str = "lcp";
    pub const CLS: &str = "cls";
    pub const INP: &str = "inp";
    /// Total long-task blocking time per iteration, in milliseconds.
    pub const LONG_TASKS: &str = "long_tasks";
    /// Number of long tasks per iteration.
    pub const LONG_TASK_COUNT: &str = "long_task_count";
}

/// Which statistic of a metric's sample set a bound applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Avg,
    P50,
    P95,
    P99,
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stat::Avg => "avg",
            Stat::P50 => "p50",
            Stat::P95 => "p95",
            Stat::P99 => "p99",
        };
        f.write_str(s)
    }
}

/// Comparison direction of a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Measured value must not exceed the bound (`<=`).
    Max,
    /// Measured value must not fall below the bound (`>=`).
    Min,
}

impl Direction {
    /// The operator shown in assertion failure messages.
    pub fn operator(self) -> &'static str {
        match self {
            Direction::Max => "<=",
            Direction::Min => ">=",
        }
    }
}

/// Comparison direction for a metric name. Fps is the only min-style metric;
/// everything else, custom measures included, is max-style.
pub fn direction_for(metric: &str) -> Direction {
    if metric == metric::FPS {
        Direction::Min
    } else {
        Direction::Max
    }
}

/// Whether a metric counts discrete events, in which case its buffered bound
/// is rounded to a whole number (outward, per direction).
pub fn is_integer_metric(metric: &str) -> bool {
    matches!(metric, metric::RENDER_COUNT | metric::LONG_TASK_COUNT)
}
