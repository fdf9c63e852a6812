//! Nearest-rank percentiles and per-metric sample summaries.

use serde::{Deserialize, Serialize};

/// Calculate the p-th percentile of a sample set using the nearest-rank
/// method: sort ascending, take the value at index `ceil(p/100 * N) - 1`,
/// clamped to `[0, N-1]`.
///
/// Returns `None` when `samples` is empty or `p` is outside `[0, 100]`:
/// an undefined percentile must be omitted, never reported as zero.
///
/// # Examples
///
/// ```
/// use perf_harness::stats::percentile;
///
/// let data = vec![10.0, 20.0, 30.0, 40.0];
/// assert_eq!(percentile(&data, 50.0), Some(20.0));
/// assert_eq!(percentile(&data, 100.0), Some(40.0));
/// assert_eq!(percentile(&[], 50.0), None);
/// ```
pub fn percentile(samples: &[f64], p: f64) -> Option<f64> {
    if samples.is_empty() || !(0.0..=100.0).contains(&p) {
        return None;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let rank = ((p / 100.0) * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    Some(sorted[index])
}

/// Summary statistics for one metric across counted iterations.
///
/// Built only from non-empty sample sets, so every field is a real number
/// derived from at least one observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSummary {
    /// Arithmetic mean.
    pub avg: f64,
    /// Median (nearest-rank).
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    /// Number of samples that went into this summary.
    pub count: usize,
}

impl SampleSummary {
    /// Compute a summary, or `None` for an empty sample set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();

        Some(SampleSummary {
            avg: sum / count as f64,
            p50: percentile(&sorted, 50.0)?,
            p95: percentile(&sorted, 95.0)?,
            p99: percentile(&sorted, 99.0)?,
            min: sorted[0],
            max: sorted[count - 1],
            count,
        })
    }
}
