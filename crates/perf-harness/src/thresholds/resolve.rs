//! Threshold resolution: merge tiers, validate, bake buffers.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{BufferConfig, Environment, ThresholdConfig};
use crate::error::{HarnessError, Result};
use crate::thresholds::{
    calculator, direction_for, is_integer_metric, Direction, Stat,
};

/// One fully materialized pass/fail bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBound {
    pub metric: String,
    pub stat: Stat,
    pub direction: Direction,
    /// Configured base value, before buffering.
    pub base: f64,
    pub buffer_pct: f64,
    /// The effective bound compared against measurements.
    pub bound: f64,
}

/// All enforced bounds for a run. Computed once, immutable afterwards,
/// and guaranteed to never contain a negative bound.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolvedThresholds {
    bounds: Vec<ResolvedBound>,
}

impl ResolvedThresholds {
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedBound> {
        self.bounds.iter()
    }

    /// Look up the bound for a metric/stat pair.
    pub fn get(&self, metric: &str, stat: Stat) -> Option<&ResolvedBound> {
        self.bounds
            .iter()
            .find(|b| b.metric == metric && b.stat == stat)
    }
}

/// Resolve the effective thresholds for a run.
///
/// When `env.is_ci` is set, entries from the `ci` tier replace the base
/// entry for the same metric (per-metric, not per-stat). Buffers are then
/// baked in direction-aware: max-style metrics widen upward, fps narrows
/// downward, and integer metrics are rounded outward. A base of exactly `0`
/// means "track but do not enforce" and produces no bound.
///
/// # Errors
///
/// Fails with [`HarnessError::Config`] on any negative base or out-of-range
/// buffer percentage, before any iteration runs.
pub fn resolve(
    config: &ThresholdConfig,
    buffers: &BufferConfig,
    env: &Environment,
) -> Result<ResolvedThresholds> {
    let mut merged = config.base.entries();
    if env.is_ci {
        if let Some(ci) = &config.ci {
            for (metric, spec) in ci.entries() {
                merged.insert(metric, spec);
            }
        }
    }

    let mut bounds = Vec::new();
    for (metric, spec) in merged {
        let stats = spec.stats();
        let per_stat = [
            (Stat::Avg, stats.avg),
            (Stat::P50, stats.p50),
            (Stat::P95, stats.p95),
            (Stat::P99, stats.p99),
        ];

        let direction = direction_for(&metric);
        let buffer_pct = buffers.pct_for(&metric);
        let round = is_integer_metric(&metric);

        for (stat, base) in per_stat {
            let Some(base) = base else { continue };
            if base == 0.0 {
                debug!(metric = %metric, %stat, "zero threshold, tracking only");
                continue;
            }

            let bound = match direction {
                Direction::Max => calculator::effective_threshold(base, buffer_pct, round),
                Direction::Min => calculator::effective_min_threshold(base, buffer_pct, round),
            }
            .map_err(|e| annotate(&metric, stat, e))?;

            debug_assert!(bound >= 0.0);
            bounds.push(ResolvedBound {
                metric: metric.clone(),
                stat,
                direction,
                base,
                buffer_pct,
                bound,
            });
        }
    }

    debug!(bounds = bounds.len(), is_ci = env.is_ci, "thresholds resolved");
    Ok(ResolvedThresholds { bounds })
}

fn annotate(metric: &str, stat: Stat, err: HarnessError) -> HarnessError {
    match err {
        HarnessError::Config(msg) => {
            HarnessError::Config(format!("threshold `{metric}` {stat}: {msg}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricThresholds, ThresholdSpec, ThresholdStats};
    use crate::thresholds::metric;

    fn base_only(thresholds: MetricThresholds) -> ThresholdConfig {
        ThresholdConfig {
            base: thresholds,
            ci: None,
        }
    }

    #[test]
    fn test_scalar_resolves_to_buffered_avg_bound() {
        let config = base_only(MetricThresholds {
            render_duration: Some(ThresholdSpec::Scalar(100.0)),
            ..MetricThresholds::default()
        });
        let buffers = BufferConfig::default(); // 10%

        let resolved = resolve(&config, &buffers, &Environment::new(false)).unwrap();
        assert_eq!(resolved.len(), 1);

        let bound = resolved.get(metric::RENDER_DURATION, Stat::Avg).unwrap();
        assert_eq!(bound.direction, Direction::Max);
        assert_eq!(bound.base, 100.0);
        assert!((bound.bound - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_fps_buffers_downward() {
        let config = base_only(MetricThresholds {
            fps: Some(ThresholdSpec::Scalar(30.0)),
            ..MetricThresholds::default()
        });
        let mut buffers = BufferConfig::default();
        buffers.overrides.insert(metric::FPS.to_string(), 20.0);

        let resolved = resolve(&config, &buffers, &Environment::new(false)).unwrap();
        let bound = resolved.get(metric::FPS, Stat::Avg).unwrap();
        assert_eq!(bound.direction, Direction::Min);
        assert_eq!(bound.bound, 24.0);
    }

    #[test]
    fn test_ci_tier_replaces_base_per_metric() {
        let config = ThresholdConfig {
            base: MetricThresholds {
                render_duration: Some(ThresholdSpec::Scalar(100.0)),
                fps: Some(ThresholdSpec::Scalar(30.0)),
                ..MetricThresholds::default()
            },
            ci: Some(MetricThresholds {
                render_duration: Some(ThresholdSpec::Scalar(200.0)),
                ..MetricThresholds::default()
            }),
        };
        let buffers = BufferConfig {
            default_pct: 0.0,
            overrides: Default::default(),
        };

        // Local run: base applies untouched.
        let local = resolve(&config, &buffers, &Environment::new(false)).unwrap();
        assert_eq!(
            local.get(metric::RENDER_DURATION, Stat::Avg).unwrap().bound,
            100.0
        );

        // CI run: the ci entry replaces render_duration, fps falls through.
        let ci = resolve(&config, &buffers, &Environment::new(true)).unwrap();
        assert_eq!(
            ci.get(metric::RENDER_DURATION, Stat::Avg).unwrap().bound,
            200.0
        );
        assert_eq!(ci.get(metric::FPS, Stat::Avg).unwrap().bound, 30.0);
    }

    #[test]
    fn test_zero_base_is_tracking_only() {
        let config = base_only(MetricThresholds {
            lcp: Some(ThresholdSpec::Scalar(0.0)),
            ..MetricThresholds::default()
        });
        let resolved =
            resolve(&config, &BufferConfig::default(), &Environment::new(false)).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn test_per_stat_bounds() {
        let config = base_only(MetricThresholds {
            lcp: Some(ThresholdSpec::Stats(ThresholdStats {
                avg: Some(2000.0),
                p95: Some(2500.0),
                ..ThresholdStats::default()
            })),
            ..MetricThresholds::default()
        });
        let buffers = BufferConfig {
            default_pct: 0.0,
            overrides: Default::default(),
        };

        let resolved = resolve(&config, &buffers, &Environment::new(false)).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved.get(metric::LCP, Stat::Avg).unwrap().bound, 2000.0);
        assert_eq!(resolved.get(metric::LCP, Stat::P95).unwrap().bound, 2500.0);
        assert!(resolved.get(metric::LCP, Stat::P50).is_none());
    }

    #[test]
    fn test_integer_metric_bound_is_rounded() {
        let config = base_only(MetricThresholds {
            render_count: Some(ThresholdSpec::Scalar(3.0)),
            ..MetricThresholds::default()
        });
        let resolved =
            resolve(&config, &BufferConfig::default(), &Environment::new(false)).unwrap();
        // 3 * 1.1 = 3.3, rounded up to a whole commit count.
        assert_eq!(
            resolved.get(metric::RENDER_COUNT, Stat::Avg).unwrap().bound,
            4.0
        );
    }

    #[test]
    fn test_negative_base_fails_with_metric_context() {
        let config = base_only(MetricThresholds {
            cls: Some(ThresholdSpec::Scalar(-0.1)),
            ..MetricThresholds::default()
        });
        let err = resolve(&config, &BufferConfig::default(), &Environment::new(false))
            .unwrap_err();
        match err {
            HarnessError::Config(msg) => assert!(msg.contains("cls"), "{msg}"),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_custom_measure_threshold_resolves() {
        let mut custom = std::collections::BTreeMap::new();
        custom.insert("checkout-flow".to_string(), ThresholdSpec::Scalar(250.0));
        let config = base_only(MetricThresholds {
            custom,
            ..MetricThresholds::default()
        });
        let resolved =
            resolve(&config, &BufferConfig::default(), &Environment::new(false)).unwrap();
        let bound = resolved.get("checkout-flow", Stat::Avg).unwrap();
        assert_eq!(bound.direction, Direction::Max);
        assert!((bound.bound - 275.0).abs() < 1e-9);
    }
}
