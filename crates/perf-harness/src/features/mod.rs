//! Pluggable browser-instrumentation features
//!
//! Every capability the harness can switch on (fps counting, heap
//! sampling, web-vitals observation, long-task tracking, trace capture,
//! user-timing collection) implements the same lifecycle: `start` yields a
//! live handle that owns exactly one instrumentation session, the handle is
//! sampled once per iteration, optionally `reset` between iterations, and
//! `stop`ped exactly once at the end of the run.
//!
//! Heterogeneous per-feature options and results are modeled as closed sets
//! of tagged variants ([`FeatureOptions`], [`FeatureSample`],
//! [`FeatureReport`]): the registry stays type-erased at its boundary while
//! every call site recovers the concrete shape it asked for.

pub mod coordination;
pub mod custom;
pub mod fps;
pub mod long_tasks;
pub mod memory;
pub mod registry;
pub mod trace;
pub mod web_vitals;

#[cfg(test)]
pub(crate) mod mock;

use std::collections::BTreeMap;
use std::fmt;

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

pub use custom::{CustomMetricsHandle, CustomReport};
pub use fps::{FpsHandle, FpsReport};
pub use long_tasks::{LongTasksHandle, LongTasksSnapshot};
pub use memory::{MemoryHandle, MemoryReport};
pub use trace::{TraceDocument, TraceHandle, TraceOptions};
pub use web_vitals::{VitalsSnapshot, WebVitalsHandle};

/// The browser engine behind the debugging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrowserEngine {
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserEngine::Chromium => "chromium",
            BrowserEngine::Firefox => "firefox",
            BrowserEngine::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a feature structurally needs from the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Works on any engine the harness can drive.
    Any,
    /// Needs devtools-protocol domains only Chromium exposes.
    ChromiumOnly,
}

impl Capability {
    pub fn supported_by(&self, engine: BrowserEngine) -> bool {
        match self {
            Capability::Any => true,
            Capability::ChromiumOnly => engine == BrowserEngine::Chromium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Any => "any",
            Capability::ChromiumOnly => "chromium-only",
        }
    }
}

/// The page a test runs against, plus the engine driving it.
#[derive(Clone)]
pub struct PageContext {
    pub page: Page,
    pub engine: BrowserEngine,
}

impl PageContext {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            engine: BrowserEngine::Chromium,
        }
    }

    pub fn with_engine(page: Page, engine: BrowserEngine) -> Self {
        Self { page, engine }
    }
}

/// Identity of a built-in feature.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureKind {
    Fps,
    Memory,
    WebVitals,
    LongTasks,
    Trace,
    CustomMetrics,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Fps => "fps",
            FeatureKind::Memory => "memory",
            FeatureKind::WebVitals => "web-vitals",
            FeatureKind::LongTasks => "long-tasks",
            FeatureKind::Trace => "trace",
            FeatureKind::CustomMetrics => "custom-metrics",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Start options, one variant per feature.
#[derive(Debug, Clone)]
pub enum FeatureOptions {
    Fps,
    Memory,
    WebVitals,
    LongTasks,
    Trace(TraceOptions),
    Custom,
}

impl FeatureOptions {
    pub fn kind(&self) -> FeatureKind {
        match self {
            FeatureOptions::Fps => FeatureKind::Fps,
            FeatureOptions::Memory => FeatureKind::Memory,
            FeatureOptions::WebVitals => FeatureKind::WebVitals,
            FeatureOptions::LongTasks => FeatureKind::LongTasks,
            FeatureOptions::Trace(_) => FeatureKind::Trace,
            FeatureOptions::Custom => FeatureKind::CustomMetrics,
        }
    }
}

/// Per-iteration snapshot contributed by one active feature.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureSample {
    Fps { fps: Option<f64> },
    Memory { heap_growth_bytes: Option<f64> },
    WebVitals(VitalsSnapshot),
    LongTasks(LongTasksSnapshot),
    Custom { measures: BTreeMap<String, f64> },
}

/// Final result a feature hands back when stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeatureReport {
    Fps(FpsReport),
    Memory(MemoryReport),
    WebVitals(VitalsSnapshot),
    LongTasks(LongTasksSnapshot),
    Trace(TraceDocument),
    Custom(CustomReport),
}

/// A registered, startable feature.
///
/// Registered once per process; the registry owns it for the process
/// lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Feature {
    name: &'static str,
    kind: FeatureKind,
    requires: Capability,
}

impl Feature {
    pub const fn new(name: &'static str, kind: FeatureKind, requires: Capability) -> Self {
        Self {
            name,
            kind,
            requires,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    pub fn requires(&self) -> Capability {
        self.requires
    }

    /// Start the feature against a page.
    ///
    /// Returns `Ok(None)`, not an error, when the engine structurally
    /// lacks the required capability; the feature is simply disabled for
    /// this run.
    pub async fn start(
        &self,
        ctx: &PageContext,
        options: &FeatureOptions,
    ) -> Result<Option<ActiveFeature>> {
        if options.kind() != self.kind {
            return Err(crate::error::HarnessError::config(format!(
                "feature `{}` started with options for `{}`",
                self.name,
                options.kind()
            )));
        }
        if !self.requires.supported_by(ctx.engine) {
            warn!(
                feature = self.name,
                engine = %ctx.engine,
                capability = self.requires.as_str(),
                "capability unsupported, feature disabled for this run"
            );
            return Ok(None);
        }

        let handle = match options {
            FeatureOptions::Fps => ActiveFeature::Fps(FpsHandle::start(ctx).await?),
            FeatureOptions::Memory => ActiveFeature::Memory(MemoryHandle::start(ctx).await?),
            FeatureOptions::WebVitals => {
                ActiveFeature::WebVitals(WebVitalsHandle::start(ctx).await?)
            }
            FeatureOptions::LongTasks => {
                ActiveFeature::LongTasks(LongTasksHandle::start(ctx).await?)
            }
            FeatureOptions::Trace(trace_options) => {
                ActiveFeature::Trace(TraceHandle::start(ctx, trace_options.clone()).await?)
            }
            FeatureOptions::Custom => {
                ActiveFeature::Custom(CustomMetricsHandle::start(ctx).await?)
            }
        };
        Ok(Some(handle))
    }
}

/// A live handle to a started feature. Owns exactly one instrumentation
/// session; its `active` flag transitions `true -> false` exactly once, and
/// stop/reset after deactivation are no-ops.
pub enum ActiveFeature {
    Fps(FpsHandle),
    Memory(MemoryHandle),
    WebVitals(WebVitalsHandle),
    LongTasks(LongTasksHandle),
    Trace(TraceHandle),
    Custom(CustomMetricsHandle),
    #[cfg(test)]
    Mock(mock::MockHandle),
}

impl ActiveFeature {
    pub fn kind(&self) -> FeatureKind {
        match self {
            ActiveFeature::Fps(_) => FeatureKind::Fps,
            ActiveFeature::Memory(_) => FeatureKind::Memory,
            ActiveFeature::WebVitals(_) => FeatureKind::WebVitals,
            ActiveFeature::LongTasks(_) => FeatureKind::LongTasks,
            ActiveFeature::Trace(_) => FeatureKind::Trace,
            ActiveFeature::Custom(_) => FeatureKind::CustomMetrics,
            #[cfg(test)]
            ActiveFeature::Mock(handle) => handle.kind,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            ActiveFeature::Fps(h) => h.is_active(),
            ActiveFeature::Memory(h) => h.is_active(),
            ActiveFeature::WebVitals(h) => h.is_active(),
            ActiveFeature::LongTasks(h) => h.is_active(),
            ActiveFeature::Trace(h) => h.is_active(),
            ActiveFeature::Custom(h) => h.is_active(),
            #[cfg(test)]
            ActiveFeature::Mock(h) => h.active,
        }
    }

    /// Whether the handle can be reinitialized between iterations without
    /// tearing down its session.
    pub fn is_resettable(&self) -> bool {
        match self {
            ActiveFeature::Trace(_) => false,
            #[cfg(test)]
            ActiveFeature::Mock(h) => h.resettable,
            _ => true,
        }
    }

    /// Reinitialize for the next iteration. No-op on an inactive handle.
    pub async fn reset(&mut self) -> Result<()> {
        match self {
            ActiveFeature::Fps(h) => h.reset().await,
            ActiveFeature::Memory(h) => h.reset().await,
            ActiveFeature::WebVitals(h) => h.reset().await,
            ActiveFeature::LongTasks(h) => h.reset().await,
            ActiveFeature::Trace(_) => Ok(()),
            ActiveFeature::Custom(h) => h.reset().await,
            #[cfg(test)]
            ActiveFeature::Mock(h) => h.reset(),
        }
    }

    /// Per-iteration snapshot. Features without per-iteration data (trace)
    /// return `Ok(None)`.
    pub async fn sample(&mut self) -> Result<Option<FeatureSample>> {
        match self {
            ActiveFeature::Fps(h) => Ok(h.sample().await?.map(|fps| FeatureSample::Fps {
                fps: Some(fps),
            })),
            ActiveFeature::Memory(h) => Ok(Some(FeatureSample::Memory {
                heap_growth_bytes: h.sample().await?,
            })),
            ActiveFeature::WebVitals(h) => {
                Ok(Some(FeatureSample::WebVitals(h.sample().await?)))
            }
            ActiveFeature::LongTasks(h) => {
                Ok(Some(FeatureSample::LongTasks(h.sample().await?)))
            }
            ActiveFeature::Trace(_) => Ok(None),
            ActiveFeature::Custom(h) => Ok(Some(FeatureSample::Custom {
                measures: h.sample().await?,
            })),
            #[cfg(test)]
            ActiveFeature::Mock(h) => h.sample(),
        }
    }

    /// Stop the feature and collect its final report.
    ///
    /// Deactivates the handle on every exit path; stopping an already
    /// inactive handle returns `Ok(None)`.
    pub async fn stop(&mut self) -> Result<Option<FeatureReport>> {
        match self {
            ActiveFeature::Fps(h) => Ok(h.stop().await?.map(FeatureReport::Fps)),
            ActiveFeature::Memory(h) => Ok(h.stop().await?.map(FeatureReport::Memory)),
            ActiveFeature::WebVitals(h) => {
                Ok(h.stop().await?.map(FeatureReport::WebVitals))
            }
            ActiveFeature::LongTasks(h) => {
                Ok(h.stop().await?.map(FeatureReport::LongTasks))
            }
            ActiveFeature::Trace(h) => Ok(h.stop().await?.map(FeatureReport::Trace)),
            ActiveFeature::Custom(h) => Ok(h.stop().await?.map(FeatureReport::Custom)),
            #[cfg(test)]
            ActiveFeature::Mock(h) => h.stop(),
        }
    }
}
