//! Iteration execution and aggregation
//!
//! The runner drives the user's test body N times, strictly sequentially:
//! instrumentation such as CPU throttling and trace capture is global per
//! page, so overlapping iterations would corrupt each other's samples. The
//! expensive capture machinery is started once and *reset* between passes
//! instead of being rebuilt; reusing the same browser session per
//! iteration is the design's key optimization.
//!
//! When warmup is configured the first pass runs the full capture pipeline
//! but its result is discarded before aggregation, so cold-start effects
//! never skew the statistics.

use std::collections::BTreeMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::config::RunConfig;
use crate::error::Result;
use crate::features::coordination::FeatureCoordinator;
use crate::features::FeatureSample;
use crate::page_state::RenderProbe;
use crate::stats::SampleSummary;
use crate::thresholds::metric;

/// Where the runner currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Idle,
    Warmup,
    /// Counted pass, 1-based.
    Measured(u32),
    Aggregating,
    Done,
}

/// Metrics captured for one counted iteration. Immutable once the
/// iteration completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationResult {
    /// 1-based index among counted iterations (0 marks the warmup pass,
    /// which never reaches aggregation).
    pub index: u32,
    /// Wall-clock duration of the test body, milliseconds.
    pub duration_ms: f64,
    pub render_count: Option<f64>,
    pub render_duration_ms: Option<f64>,
    pub fps: Option<f64>,
    pub heap_growth_bytes: Option<f64>,
    pub lcp_ms: Option<f64>,
    pub cls: Option<f64>,
    pub inp_ms: Option<f64>,
    pub long_task_ms: Option<f64>,
    pub long_task_count: Option<f64>,
    /// Custom user-timing measures, name to duration in milliseconds.
    pub custom: BTreeMap<String, f64>,
}

impl IterationResult {
    fn new(index: u32, duration_ms: f64) -> Self {
        Self {
            index,
            duration_ms,
            ..Self::default()
        }
    }

    fn merge(&mut self, sample: FeatureSample) {
        match sample {
            FeatureSample::Fps { fps } => self.fps = fps,
            FeatureSample::Memory { heap_growth_bytes } => {
                self.heap_growth_bytes = heap_growth_bytes;
            }
            FeatureSample::WebVitals(vitals) => {
                self.lcp_ms = vitals.lcp;
                self.cls = vitals.cls;
                self.inp_ms = vitals.inp;
            }
            FeatureSample::LongTasks(long_tasks) => {
                self.long_task_ms = Some(long_tasks.total_ms);
                self.long_task_count = Some(long_tasks.count as f64);
            }
            FeatureSample::Custom { measures } => {
                self.custom.extend(measures);
            }
        }
    }
}

/// Per-metric summaries across all counted iterations. Metrics that were
/// never observed are absent, not zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAggregates {
    metrics: BTreeMap<String, SampleSummary>,
}

impl RunAggregates {
    pub fn get(&self, metric: &str) -> Option<&SampleSummary> {
        self.metrics.get(metric)
    }

    pub fn insert(&mut self, metric: &str, summary: SampleSummary) {
        self.metrics.insert(metric.to_string(), summary);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SampleSummary)> {
        self.metrics.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Merge counted iteration snapshots into summary statistics.
pub fn aggregate(results: &[IterationResult]) -> RunAggregates {
    let mut samples: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut push = |name: &str, value: Option<f64>| {
        if let Some(value) = value {
            samples.entry(name.to_string()).or_default().push(value);
        }
    };

    for result in results {
        push(metric::DURATION, Some(result.duration_ms));
        push(metric::RENDER_COUNT, result.render_count);
        push(metric::RENDER_DURATION, result.render_duration_ms);
        push(metric::FPS, result.fps);
        push(metric::HEAP_GROWTH, result.heap_growth_bytes);
        push(metric::LCP, result.lcp_ms);
        push(metric::CLS, result.cls);
        push(metric::INP, result.inp_ms);
        push(metric::LONG_TASKS, result.long_task_ms);
        push(metric::LONG_TASK_COUNT, result.long_task_count);
        for (name, value) in &result.custom {
            push(name, Some(*value));
        }
    }

    let mut aggregates = RunAggregates::default();
    for (name, values) in samples {
        if let Some(summary) = SampleSummary::from_samples(&values) {
            aggregates.metrics.insert(name, summary);
        }
    }
    aggregates
}

/// What a completed run hands back to the orchestrator.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Counted iterations only; the warmup pass is already discarded.
    pub iterations: Vec<IterationResult>,
    pub aggregates: RunAggregates,
}

/// Drives warmup and measured passes over a set of live feature handles.
#[derive(Debug)]
pub struct IterationRunner {
    warmup: bool,
    iterations: u32,
    phase: RunnerPhase,
}

impl IterationRunner {
    /// Build a runner from a validated configuration.
    pub fn new(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            warmup: config.warmup,
            iterations: config.iterations,
            phase: RunnerPhase::Idle,
        })
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Execute all passes of the test body and aggregate the counted ones.
    ///
    /// The body receives the iteration index: `0` for the warmup pass,
    /// `1..` for counted passes. Between passes (never before the first,
    /// never after the last) every active resettable handle (and the
    /// render probe, when present) is reset, and the reset completes fully
    /// before the next body starts. Body and transport errors propagate
    /// immediately; teardown of the handles is the orchestrator's job.
    #[instrument(skip_all, fields(iterations = self.iterations, warmup = self.warmup))]
    pub async fn run<F, Fut>(
        &mut self,
        coordinator: &mut FeatureCoordinator,
        render: Option<&RenderProbe>,
        mut body: F,
    ) -> Result<RunOutcome>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut results = Vec::with_capacity(self.iterations as usize);

        for pass in 0..self.iterations {
            let is_warmup = self.warmup && pass == 0;
            let index = if self.warmup { pass } else { pass + 1 };

            if pass > 0 {
                let carried = coordinator.reset_all_active().await?;
                if let Some(probe) = render {
                    probe.reset().await?;
                }
                debug!(
                    reset = ?carried,
                    "instrumentation reset, sessions carried over into next pass"
                );
            }

            self.phase = if is_warmup {
                RunnerPhase::Warmup
            } else {
                RunnerPhase::Measured(index)
            };
            debug!(pass, index, warmup = is_warmup, "starting iteration");

            let started = Instant::now();
            body(index).await?;
            let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

            let mut result = IterationResult::new(index, duration_ms);
            for handle in coordinator.handles_mut() {
                if !handle.is_active() {
                    continue;
                }
                if let Some(sample) = handle.sample().await? {
                    result.merge(sample);
                }
            }
            if let Some(probe) = render {
                if let Some(stats) = probe.sample().await? {
                    result.render_count = Some(stats.commit_count as f64);
                    result.render_duration_ms = Some(stats.total_duration_ms);
                }
            }

            if is_warmup {
                debug!(duration_ms, "discarding warmup iteration");
            } else {
                results.push(result);
            }
        }

        self.phase = RunnerPhase::Aggregating;
        let aggregates = aggregate(&results);
        self.phase = RunnerPhase::Done;
        debug!(counted = results.len(), "run complete");

        Ok(RunOutcome {
            iterations: results,
            aggregates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::mock::MockHandle;
    use crate::features::{ActiveFeature, FeatureKind, LongTasksSnapshot};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn runner(warmup: bool, iterations: u32) -> IterationRunner {
        IterationRunner::new(&RunConfig {
            warmup,
            iterations,
            ..RunConfig::default()
        })
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_pass_is_executed_but_discarded() {
        let mut coordinator = FeatureCoordinator::new();
        let invocations = Arc::new(AtomicU32::new(0));
        let seen = invocations.clone();

        let mut runner = runner(true, 3);
        let outcome = runner
            .run(&mut coordinator, None, move |index| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    // Warmup pass 0 is slow; counted passes are fast.
                    let ms = match index {
                        0 => 1000,
                        1 => 100,
                        _ => 200,
                    };
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(())
                }
            })
            .await
            .unwrap();

        // Exactly 3 body invocations, 2 counted results.
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.iterations.len(), 2);
        assert_eq!(outcome.iterations[0].index, 1);
        assert_eq!(outcome.iterations[1].index, 2);

        // The 1000ms warmup must not influence the aggregate.
        let duration = outcome.aggregates.get(metric::DURATION).unwrap();
        assert!(
            (duration.avg - 150.0).abs() < 5.0,
            "avg was {}",
            duration.avg
        );
        assert_eq!(runner.phase(), RunnerPhase::Done);
    }

    #[tokio::test]
    async fn test_counted_indices_start_at_one_without_warmup() {
        let mut coordinator = FeatureCoordinator::new();
        let indices = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = indices.clone();

        let mut runner = runner(false, 3);
        let outcome = runner
            .run(&mut coordinator, None, move |index| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(index);
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(*indices.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(outcome.iterations.len(), 3);
    }

    #[tokio::test]
    async fn test_resets_happen_between_passes_only() {
        let mut coordinator = FeatureCoordinator::new();
        let handle = MockHandle::new(FeatureKind::Fps);
        let resets = handle.reset_counter();
        coordinator.set_handle(FeatureKind::Fps, Some(ActiveFeature::Mock(handle)));

        let mut runner = runner(false, 4);
        runner
            .run(&mut coordinator, None, |_| async { Ok(()) })
            .await
            .unwrap();

        // 4 passes -> 3 between-pass resets: none before the first, none
        // after the last.
        assert_eq!(resets.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_samples_merge_into_results() {
        let mut coordinator = FeatureCoordinator::new();
        coordinator.set_handle(
            FeatureKind::Fps,
            Some(ActiveFeature::Mock(
                MockHandle::new(FeatureKind::Fps)
                    .with_sample(FeatureSample::Fps { fps: Some(58.0) }),
            )),
        );
        coordinator.set_handle(
            FeatureKind::LongTasks,
            Some(ActiveFeature::Mock(
                MockHandle::new(FeatureKind::LongTasks).with_sample(
                    FeatureSample::LongTasks(LongTasksSnapshot {
                        total_ms: 120.0,
                        count: 2,
                    }),
                ),
            )),
        );

        let mut runner = runner(false, 2);
        let outcome = runner
            .run(&mut coordinator, None, |_| async { Ok(()) })
            .await
            .unwrap();

        for result in &outcome.iterations {
            assert_eq!(result.fps, Some(58.0));
            assert_eq!(result.long_task_ms, Some(120.0));
            assert_eq!(result.long_task_count, Some(2.0));
        }
        assert_eq!(outcome.aggregates.get(metric::FPS).unwrap().avg, 58.0);
        assert_eq!(
            outcome.aggregates.get(metric::LONG_TASKS).unwrap().count,
            2
        );
    }

    #[tokio::test]
    async fn test_body_error_propagates() {
        let mut coordinator = FeatureCoordinator::new();
        let mut runner = runner(false, 3);
        let result = runner
            .run(&mut coordinator, None, |index| async move {
                if index == 2 {
                    Err(crate::error::HarnessError::config("boom"))
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_inactive_handles_are_not_sampled() {
        let mut coordinator = FeatureCoordinator::new();
        coordinator.set_handle(
            FeatureKind::Fps,
            Some(ActiveFeature::Mock(
                MockHandle::new(FeatureKind::Fps)
                    .with_sample(FeatureSample::Fps { fps: Some(60.0) })
                    .inactive(),
            )),
        );

        let mut runner = runner(false, 1);
        let outcome = runner
            .run(&mut coordinator, None, |_| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome.iterations[0].fps, None);
        assert!(outcome.aggregates.get(metric::FPS).is_none());
    }

    #[test]
    fn test_aggregate_exact_warmup_example() {
        // Durations [1000 (discarded before this call), 100, 200] -> 150.
        let results = vec![
            IterationResult {
                index: 1,
                duration_ms: 100.0,
                ..IterationResult::default()
            },
            IterationResult {
                index: 2,
                duration_ms: 200.0,
                ..IterationResult::default()
            },
        ];
        let aggregates = aggregate(&results);
        assert_eq!(aggregates.get(metric::DURATION).unwrap().avg, 150.0);
    }

    #[test]
    fn test_aggregate_skips_unobserved_metrics() {
        let results = vec![IterationResult {
            index: 1,
            duration_ms: 10.0,
            fps: Some(60.0),
            ..IterationResult::default()
        }];
        let aggregates = aggregate(&results);
        assert!(aggregates.get(metric::LCP).is_none());
        assert!(aggregates.get(metric::HEAP_GROWTH).is_none());
        assert_eq!(aggregates.get(metric::FPS).unwrap().avg, 60.0);
    }

    #[test]
    fn test_aggregate_custom_measures() {
        let mut custom = BTreeMap::new();
        custom.insert("checkout-flow".to_string(), 250.0);
        let results = vec![
            IterationResult {
                index: 1,
                duration_ms: 10.0,
                custom: custom.clone(),
                ..IterationResult::default()
            },
            IterationResult {
                index: 2,
                duration_ms: 10.0,
                custom: {
                    let mut second = BTreeMap::new();
                    second.insert("checkout-flow".to_string(), 350.0);
                    second
                },
                ..IterationResult::default()
            },
        ];
        let aggregates = aggregate(&results);
        assert_eq!(aggregates.get("checkout-flow").unwrap().avg, 300.0);
    }
}
