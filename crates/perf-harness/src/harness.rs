//! Run orchestration
//!
//! [`PerfHarness`] ties the pieces together for one test run: resolve
//! thresholds (failing fast on bad configuration), apply throttling, start
//! the configured features through the registry, drive the iteration
//! runner, stop everything (on success and on error alike), and hand back
//! a report. [`PerfHarness::run_and_assert`] additionally gates the run on
//! the resolved thresholds.

use chrono::Utc;
use serde::Serialize;
use std::future::Future;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::assertions::check_thresholds;
use crate::config::{Environment, RunConfig};
use crate::error::Result;
use crate::features::coordination::FeatureCoordinator;
use crate::features::registry::{default_registry, FeatureRegistry};
use crate::features::{
    FeatureKind, FeatureOptions, FeatureReport, PageContext, TraceDocument, TraceOptions,
};
use crate::page_state::{self, RenderProbe};
use crate::runner::{IterationResult, IterationRunner, RunAggregates};
use crate::thresholds::{resolve, ResolvedThresholds};
use crate::throttling;

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub test_name: String,
    /// ISO-8601 timestamp of when the run started.
    pub started_at: String,
    pub total_duration_ms: u64,
    /// Counted iterations, in order.
    pub iterations: Vec<IterationResult>,
    pub aggregates: RunAggregates,
    pub resolved_thresholds: ResolvedThresholds,
    /// Final per-feature results; `None` marks a feature whose stop failed
    /// or that was already inactive.
    pub feature_reports: Vec<(FeatureKind, Option<FeatureReport>)>,
    /// Captured trace, when the run was configured to export one.
    pub trace: Option<TraceDocument>,
}

/// Orchestrates measurement runs against a live page.
pub struct PerfHarness {
    registry: FeatureRegistry,
    config: RunConfig,
    env: Environment,
}

impl PerfHarness {
    /// Harness with the built-in feature registry.
    ///
    /// # Errors
    ///
    /// Fails on an invalid [`RunConfig`].
    pub fn new(config: RunConfig, env: Environment) -> Result<Self> {
        Self::with_registry(default_registry(), config, env)
    }

    /// Harness with a caller-supplied registry (custom features, or a
    /// subset of the built-ins).
    pub fn with_registry(
        registry: FeatureRegistry,
        config: RunConfig,
        env: Environment,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            env,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Execute a full measurement run.
    ///
    /// All requested features are started before the first body invocation;
    /// teardown happens on every exit path, so a failing body never leaks
    /// live instrumentation sessions.
    #[instrument(skip(self, ctx, body), fields(test = %test_name))]
    pub async fn run<F, Fut>(
        &self,
        ctx: &PageContext,
        test_name: &str,
        body: F,
    ) -> Result<RunReport>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        // Bad thresholds must fail before any iteration runs.
        let resolved = resolve(&self.config.thresholds, &self.config.buffers, &self.env)?;

        let started_at = Utc::now().to_rfc3339();
        let started = Instant::now();
        info!(
            iterations = self.config.iterations,
            warmup = self.config.warmup,
            "starting performance run"
        );

        let mut coordinator = FeatureCoordinator::new();
        let run_result = self
            .drive(ctx, test_name, &mut coordinator, body)
            .await;

        // Teardown runs regardless of how the passes went.
        let mut handles = coordinator.drain();
        let feature_reports = self.registry.stop_all(&mut handles).await;
        coordinator.clear();
        if let Err(e) = throttling::clear(&ctx.page).await {
            warn!(error = %e, "failed to clear throttling during teardown");
        }

        let outcome = run_result?;
        let trace = feature_reports.iter().find_map(|(_, report)| match report {
            Some(FeatureReport::Trace(document)) => Some(document.clone()),
            _ => None,
        });

        let report = RunReport {
            test_name: test_name.to_string(),
            started_at,
            total_duration_ms: started.elapsed().as_millis() as u64,
            iterations: outcome.iterations,
            aggregates: outcome.aggregates,
            resolved_thresholds: resolved,
            feature_reports,
            trace,
        };
        info!(
            duration_ms = report.total_duration_ms,
            counted = report.iterations.len(),
            "performance run finished"
        );
        Ok(report)
    }

    /// [`PerfHarness::run`], then assert the aggregates against the
    /// resolved thresholds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::HarnessError::ThresholdViolation`] listing
    /// every violated bound when the run regressed.
    pub async fn run_and_assert<F, Fut>(
        &self,
        ctx: &PageContext,
        test_name: &str,
        body: F,
    ) -> Result<RunReport>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let report = self.run(ctx, test_name, body).await?;
        check_thresholds(&report.aggregates, &report.resolved_thresholds)?;
        Ok(report)
    }

    /// Start instrumentation and execute the passes. Errors leave started
    /// handles in the coordinator for the caller to tear down.
    async fn drive<F, Fut>(
        &self,
        ctx: &PageContext,
        test_name: &str,
        coordinator: &mut FeatureCoordinator,
        body: F,
    ) -> Result<crate::runner::RunOutcome>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        throttling::apply(&ctx.page, &self.config).await?;
        page_state::install_render_store(&ctx.page).await?;

        for (name, options) in self.enabled_features(test_name) {
            match self.registry.start_feature(name, ctx, &options).await? {
                Some(handle) => {
                    coordinator.set_handle(handle.kind(), Some(handle));
                }
                None => {
                    warn!(feature = name, "feature disabled for this run");
                }
            }
        }

        let render_probe = RenderProbe::new(ctx.page.clone());
        let mut runner = IterationRunner::new(&self.config)?;
        runner.run(coordinator, Some(&render_probe), body).await
    }

    fn enabled_features(&self, test_name: &str) -> Vec<(&'static str, FeatureOptions)> {
        let toggles = &self.config.features;
        let mut features = Vec::new();
        if toggles.fps {
            features.push(("fps", FeatureOptions::Fps));
        }
        if toggles.memory {
            features.push(("memory", FeatureOptions::Memory));
        }
        if toggles.web_vitals {
            features.push(("web-vitals", FeatureOptions::WebVitals));
        }
        if toggles.long_tasks {
            features.push(("long-tasks", FeatureOptions::LongTasks));
        }
        if toggles.custom_metrics {
            features.push(("custom-metrics", FeatureOptions::Custom));
        }
        if self.config.export_trace {
            features.push((
                "trace",
                FeatureOptions::Trace(TraceOptions {
                    test_name: test_name.to_string(),
                    ..TraceOptions::default()
                }),
            ));
        }
        features
    }
}
