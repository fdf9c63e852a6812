//! Performance-regression harness for browser workloads
//!
//! Runs a test body multiple times against a live page, collects
//! heterogeneous runtime metrics (render samples, frame rate, heap growth,
//! web vitals, long tasks, custom user timings, traces), aggregates them
//! across iterations, and asserts the aggregates against configurable
//! pass/fail thresholds: deterministic gates fit for CI.
//!
//! # Architecture
//!
//! - **Features** ([`features`]): pluggable instrumentation with a uniform
//!   start/sample/reset/stop lifecycle, cataloged by a registry and tracked
//!   per run by a coordinator.
//! - **Runner** ([`runner`]): warmup plus N strictly-sequential measured
//!   passes; stateful instrumentation is reset between passes instead of
//!   being rebuilt.
//! - **Thresholds** ([`thresholds`], [`assertions`]): base/CI tiers with
//!   direction-aware noise buffers, resolved once per run and asserted
//!   all-violations-at-once.
//!
//! # Example
//!
//! ```no_run
//! use perf_harness::{Environment, PageContext, PerfHarness, RunConfig};
//!
//! # async fn example(page: chromiumoxide::Page) -> perf_harness::Result<()> {
//! let config = RunConfig::from_toml_str(r#"
//!     warmup = true
//!     iterations = 6
//!
//!     [thresholds.base]
//!     fps = 30.0
//!     render_duration = 16.0
//! "#)?;
//!
//! let harness = PerfHarness::new(config, Environment::from_process())?;
//! let ctx = PageContext::new(page);
//!
//! let report = harness
//!     .run_and_assert(&ctx, "list-scroll", |iteration| {
//!         let page = ctx.page.clone();
//!         async move {
//!             page.evaluate(format!("window.scrollTo(0, {} * 500)", iteration)).await?;
//!             Ok(())
//!         }
//!     })
//!     .await?;
//!
//! println!("counted {} iterations", report.iterations.len());
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod config;
pub mod error;
pub mod features;
pub mod harness;
pub mod page_state;
pub mod runner;
pub mod stats;
pub mod thresholds;
pub mod throttling;

// Re-export the main types for convenience
pub use assertions::{check_thresholds, Violation, ViolationReport};
pub use config::{BufferConfig, Environment, NetworkProfile, RunConfig, ThresholdConfig};
pub use error::{HarnessError, Result};
pub use features::coordination::FeatureCoordinator;
pub use features::registry::{default_registry, FeatureRegistry};
pub use features::{ActiveFeature, Feature, FeatureKind, PageContext, TraceDocument};
pub use harness::{PerfHarness, RunReport};
pub use runner::{aggregate, IterationResult, IterationRunner, RunAggregates};
pub use thresholds::{resolve, ResolvedThresholds};
