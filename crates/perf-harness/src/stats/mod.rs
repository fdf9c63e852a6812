//! Statistical helpers for aggregated measurements
//!
//! Percentiles use the nearest-rank method so that a reported value is
//! always an actual observed sample, never an interpolated one. An empty
//! sample set has no percentile and no summary; it is omitted rather than
//! reported as zero.
//!
//! ```
//! use perf_harness::stats::{percentile, SampleSummary};
//!
//! let samples = vec![100.0, 200.0];
//! assert_eq!(percentile(&samples, 99.0), Some(200.0));
//!
//! let summary = SampleSummary::from_samples(&samples).unwrap();
//! assert_eq!(summary.avg, 150.0);
//! ```

pub mod percentiles;

pub use percentiles::{percentile, SampleSummary};
