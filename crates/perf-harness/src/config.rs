//! Test-run configuration
//!
//! Runs are configured from TOML (or built in code), with serde defaults for
//! everything except the thresholds a test actually wants to gate on.
//!
//! ```toml
//! warmup = true
//! iterations = 10
//! throttle_rate = 4.0
//! network_throttling = "Fast3G"
//! export_trace = true
//!
//! [thresholds.base]
//! render_duration = 16.0                  # bare number = avg bound
//! fps = { avg = 30.0, p95 = 25.0 }
//!
//! [thresholds.ci]
//! render_duration = { avg = 24.0 }
//!
//! [buffers]
//! default_pct = 10.0
//!
//! [buffers.overrides]
//! fps = 20.0
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::thresholds::metric;

/// Top-level configuration for one performance test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// When set, the first pass runs the full capture pipeline but its
    /// result is discarded before aggregation.
    #[serde(default)]
    pub warmup: bool,
    /// Total number of test-body invocations, warmup pass included.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// CPU slowdown multiplier (1.0 = no throttling).
    #[serde(default = "default_throttle_rate")]
    pub throttle_rate: f64,
    /// Network conditions to emulate for the run.
    #[serde(default)]
    pub network_throttling: NetworkProfile,
    /// Capture a browser trace for the run and attach it to the report.
    #[serde(default)]
    pub export_trace: bool,
    /// Which instrumentation features to start.
    #[serde(default)]
    pub features: FeatureToggles,
    /// Pass/fail bounds, two-tier.
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    /// Noise buffers applied when resolving thresholds.
    #[serde(default)]
    pub buffers: BufferConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            warmup: false,
            iterations: default_iterations(),
            throttle_rate: default_throttle_rate(),
            network_throttling: NetworkProfile::default(),
            export_trace: false,
            features: FeatureToggles::default(),
            thresholds: ThresholdConfig::default(),
            buffers: BufferConfig::default(),
        }
    }
}

impl RunConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed,
    /// or the parsed values fail [`RunConfig::validate`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(s)
            .map_err(|e| HarnessError::config(format!("failed to parse TOML configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants that serde cannot express.
    ///
    /// Fails fast, before any iteration runs.
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(HarnessError::config("iterations must be at least 1"));
        }
        if self.warmup && self.iterations < 2 {
            return Err(HarnessError::config(
                "warmup discards the first pass; configure at least 2 iterations",
            ));
        }
        if !self.throttle_rate.is_finite() || self.throttle_rate < 1.0 {
            return Err(HarnessError::config(format!(
                "throttle_rate must be >= 1.0, got {}",
                self.throttle_rate
            )));
        }
        Ok(())
    }

    /// Number of iterations that contribute to aggregation.
    pub fn counted_iterations(&self) -> u32 {
        if self.warmup {
            self.iterations - 1
        } else {
            self.iterations
        }
    }
}

fn default_iterations() -> u32 {
    10
}

fn default_throttle_rate() -> f64 {
    1.0
}

/// Per-feature on/off switches. Tracing is controlled separately through
/// [`RunConfig::export_trace`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureToggles {
    #[serde(default = "default_true")]
    pub fps: bool,
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub web_vitals: bool,
    #[serde(default = "default_true")]
    pub long_tasks: bool,
    #[serde(default = "default_true")]
    pub custom_metrics: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            fps: true,
            memory: true,
            web_vitals: true,
            long_tasks: true,
            custom_metrics: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Predefined network emulation profiles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum NetworkProfile {
    /// 1.6 Mbps down, 750 Kbps up, 562ms RTT.
    Fast3G,
    /// 4 Mbps down, 3 Mbps up, 20ms RTT.
    Slow4G,
    Offline,
    /// No emulation.
    #[default]
    None,
}

/// Concrete conditions a profile maps to, in the units the devtools
/// protocol expects (bytes per second, milliseconds).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkConditions {
    pub offline: bool,
    pub latency_ms: f64,
    pub download_bps: f64,
    pub upload_bps: f64,
}

impl NetworkProfile {
    /// Conditions to emulate, or `None` when the profile applies no
    /// throttling at all.
    pub fn conditions(&self) -> Option<NetworkConditions> {
        match self {
            NetworkProfile::Fast3G => Some(NetworkConditions {
                offline: false,
                latency_ms: 562.0,
                download_bps: 1_600_000.0 / 8.0,
                upload_bps: 750_000.0 / 8.0,
            }),
            NetworkProfile::Slow4G => Some(NetworkConditions {
                offline: false,
                latency_ms: 20.0,
                download_bps: 4_000_000.0 / 8.0,
                upload_bps: 3_000_000.0 / 8.0,
            }),
            NetworkProfile::Offline => Some(NetworkConditions {
                offline: true,
                latency_ms: 0.0,
                download_bps: 0.0,
                upload_bps: 0.0,
            }),
            NetworkProfile::None => None,
        }
    }
}

/// Execution environment, threaded explicitly into threshold resolution.
/// Business logic never reads the process environment on its own.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Environment {
    /// Whether the run executes under CI; selects the `ci` threshold tier.
    pub is_ci: bool,
}

impl Environment {
    pub fn new(is_ci: bool) -> Self {
        Self { is_ci }
    }

    /// Edge constructor reading the conventional `CI` environment variable.
    /// Call this once where the harness is constructed, not from resolution
    /// logic.
    pub fn from_process() -> Self {
        Self {
            is_ci: std::env::var_os("CI").is_some(),
        }
    }
}

/// Two-tier threshold configuration: `base` always applies, `ci` replaces
/// base entries per metric when the run executes under CI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub base: MetricThresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<MetricThresholds>,
}

/// Thresholds for the built-in metric families, plus custom user-timing
/// measures keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub duration: Option<ThresholdSpec>,
    pub render_duration: Option<ThresholdSpec>,
    pub render_count: Option<ThresholdSpec>,
    pub fps: Option<ThresholdSpec>,
    pub heap_growth: Option<ThresholdSpec>,
    pub lcp: Option<ThresholdSpec>,
    pub cls: Option<ThresholdSpec>,
    pub inp: Option<ThresholdSpec>,
    pub long_tasks: Option<ThresholdSpec>,
    #[serde(default)]
    pub custom: BTreeMap<String, ThresholdSpec>,
}

impl MetricThresholds {
    /// All configured entries as `(metric name, spec)` pairs.
    pub fn entries(&self) -> BTreeMap<String, ThresholdSpec> {
        let mut map = BTreeMap::new();
        let named = [
            (metric::DURATION, &self.duration),
            (metric::RENDER_DURATION, &self.render_duration),
            (metric::RENDER_COUNT, &self.render_count),
            (metric::FPS, &self.fps),
            (metric::HEAP_GROWTH, &self.heap_growth),
            (metric::LCP, &self.lcp),
            (metric::CLS, &self.cls),
            (metric::INP, &self.inp),
            (metric::LONG_TASKS, &self.long_tasks),
        ];
        for (name, spec) in named {
            if let Some(spec) = spec {
                map.insert(name.to_string(), spec.clone());
            }
        }
        for (name, spec) in &self.custom {
            map.insert(name.clone(), spec.clone());
        }
        map
    }
}

/// One metric's configured bound: a bare number gates the average, an
/// object gates individual statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    /// Shorthand for `{ avg = <value> }`.
    Scalar(f64),
    Stats(ThresholdStats),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdStats {
    pub avg: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

impl ThresholdSpec {
    /// The per-stat base values this spec configures.
    pub fn stats(&self) -> ThresholdStats {
        match self {
            ThresholdSpec::Scalar(v) => ThresholdStats {
                avg: Some(*v),
                ..ThresholdStats::default()
            },
            ThresholdSpec::Stats(stats) => stats.clone(),
        }
    }
}

/// Buffer percentages applied when resolving thresholds. The default
/// applies to every metric unless overridden by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_pct")]
    pub default_pct: f64,
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            default_pct: default_buffer_pct(),
            overrides: BTreeMap::new(),
        }
    }
}

impl BufferConfig {
    /// Buffer percentage for a metric name.
    pub fn pct_for(&self, metric: &str) -> f64 {
        self.overrides
            .get(metric)
            .copied()
            .unwrap_or(self.default_pct)
    }
}

fn default_buffer_pct() -> f64 {
    10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert!(!config.warmup);
        assert_eq!(config.iterations, 10);
        assert_eq!(config.throttle_rate, 1.0);
        assert_eq!(config.network_throttling, NetworkProfile::None);
        assert!(!config.export_trace);
        assert!(config.features.fps);
        assert!(config.thresholds.base.entries().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            warmup = true
            iterations = 5
            throttle_rate = 4.0
            network_throttling = "Fast3G"
            export_trace = true

            [features]
            memory = false

            [thresholds.base]
            render_duration = 16.0
            fps = { avg = 30.0, p95 = 25.0 }

            [thresholds.base.custom]
            checkout-flow = 250.0

            [thresholds.ci]
            render_duration = { avg = 24.0 }

            [buffers]
            default_pct = 10.0

            [buffers.overrides]
            fps = 20.0
        "#;

        let config = RunConfig::from_toml_str(toml).unwrap();
        assert!(config.warmup);
        assert_eq!(config.iterations, 5);
        assert_eq!(config.counted_iterations(), 4);
        assert_eq!(config.throttle_rate, 4.0);
        assert_eq!(config.network_throttling, NetworkProfile::Fast3G);
        assert!(config.export_trace);
        assert!(!config.features.memory);
        assert!(config.features.fps);

        let base = config.thresholds.base.entries();
        assert_eq!(
            base.get(metric::RENDER_DURATION),
            Some(&ThresholdSpec::Scalar(16.0))
        );
        assert_eq!(
            base.get(metric::FPS).unwrap().stats(),
            ThresholdStats {
                avg: Some(30.0),
                p95: Some(25.0),
                ..ThresholdStats::default()
            }
        );
        assert_eq!(
            base.get("checkout-flow"),
            Some(&ThresholdSpec::Scalar(250.0))
        );

        let ci = config.thresholds.ci.as_ref().unwrap().entries();
        assert_eq!(ci.len(), 1);
        assert!(ci.contains_key(metric::RENDER_DURATION));

        assert_eq!(config.buffers.pct_for(metric::FPS), 20.0);
        assert_eq!(config.buffers.pct_for(metric::RENDER_DURATION), 10.0);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let config = RunConfig {
            iterations: 0,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_warmup_with_single_iteration() {
        let config = RunConfig {
            warmup: true,
            iterations: 1,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_sub_unit_throttle_rate() {
        let config = RunConfig {
            throttle_rate: 0.5,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_counted_iterations_without_warmup() {
        let config = RunConfig {
            iterations: 3,
            ..RunConfig::default()
        };
        assert_eq!(config.counted_iterations(), 3);
    }

    #[test]
    fn test_network_profile_conditions() {
        let fast3g = NetworkProfile::Fast3G.conditions().unwrap();
        assert_eq!(fast3g.download_bps, 200_000.0);
        assert_eq!(fast3g.upload_bps, 93_750.0);
        assert_eq!(fast3g.latency_ms, 562.0);
        assert!(!fast3g.offline);

        assert!(NetworkProfile::Offline.conditions().unwrap().offline);
        assert!(NetworkProfile::None.conditions().is_none());
    }

    #[test]
    fn test_threshold_spec_scalar_means_avg() {
        let spec = ThresholdSpec::Scalar(42.0);
        let stats = spec.stats();
        assert_eq!(stats.avg, Some(42.0));
        assert_eq!(stats.p50, None);
        assert_eq!(stats.p95, None);
        assert_eq!(stats.p99, None);
    }
}
