//! Threshold assertions
//!
//! Compares resolved aggregates against resolved bounds. The engine never
//! short-circuits: every violated metric is accumulated and surfaced in a
//! single failure, so one CI run reports every regression at once.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::runner::RunAggregates;
use crate::stats::SampleSummary;
use crate::thresholds::{Direction, ResolvedThresholds, Stat};

/// A single violated bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub metric: String,
    pub stat: Stat,
    pub direction: Direction,
    pub bound: f64,
    pub actual: f64,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: Expected: {} {:.2}, Actual: {:.2}",
            self.metric,
            self.stat,
            self.direction.operator(),
            self.bound,
            self.actual
        )
    }
}

/// Everything that failed, formatted one line per violated metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationReport {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ViolationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} performance threshold(s) violated:",
            self.violations.len()
        )?;
        for violation in &self.violations {
            writeln!(f, "  {violation}")?;
        }
        Ok(())
    }
}

fn measured(summary: &SampleSummary, stat: Stat) -> f64 {
    match stat {
        Stat::Avg => summary.avg,
        Stat::P50 => summary.p50,
        Stat::P95 => summary.p95,
        Stat::P99 => summary.p99,
    }
}

/// Assert every resolved bound against the matching aggregate.
///
/// Skipped, never failed: bounds whose metric was never observed (no
/// samples, feature disabled) and bounds whose configured base is exactly
/// zero. Both mean "tracked, not enforced".
///
/// # Errors
///
/// Returns [`HarnessError::ThresholdViolation`] listing *all* violated
/// bounds when at least one comparison fails.
pub fn check_thresholds(
    aggregates: &RunAggregates,
    resolved: &ResolvedThresholds,
) -> Result<()> {
    let mut violations = Vec::new();

    for bound in resolved.iter() {
        // Resolution already drops zero bases; guard anyway for callers
        // that construct bounds by hand.
        if bound.base == 0.0 {
            continue;
        }

        let Some(summary) = aggregates.get(&bound.metric) else {
            debug!(metric = %bound.metric, "no samples observed, skipping bound");
            continue;
        };

        let actual = measured(summary, bound.stat);
        let passed = match bound.direction {
            Direction::Max => actual <= bound.bound,
            Direction::Min => actual >= bound.bound,
        };

        if !passed {
            violations.push(Violation {
                metric: bound.metric.clone(),
                stat: bound.stat,
                direction: bound.direction,
                bound: bound.bound,
                actual,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::ThresholdViolation(ViolationReport {
            violations,
        }))
    }
}
