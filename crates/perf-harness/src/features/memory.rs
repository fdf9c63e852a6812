//! Heap sampling via the devtools Performance domain.
//!
//! Records a heap baseline at start (and at every reset) and reports the
//! growth relative to that baseline when sampled, so each counted iteration
//! measures only its own allocations. Chromium-only: relies on
//! `Performance.getMetrics`.

use chromiumoxide::cdp::browser_protocol::performance::{
    DisableParams, EnableParams, GetMetricsParams,
};
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::features::PageContext;

const HEAP_METRIC: &str = "JSHeapUsedSize";

/// Final memory report for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryReport {
    /// Heap size recorded when the feature started, in bytes.
    pub baseline_bytes: f64,
    /// Heap size at stop time, in bytes.
    pub final_bytes: f64,
    /// Growth over the whole run (may be negative after a collection).
    pub growth_bytes: f64,
}

/// Live heap sampler on one page.
pub struct MemoryHandle {
    page: Page,
    start_bytes: f64,
    baseline_bytes: f64,
    active: bool,
}

impl MemoryHandle {
    pub(crate) async fn start(ctx: &PageContext) -> Result<Self> {
        ctx.page.execute(EnableParams::default()).await?;
        let baseline = read_heap(&ctx.page).await?.unwrap_or(0.0);
        debug!(baseline_bytes = baseline, "heap sampling started");
        Ok(Self {
            page: ctx.page.clone(),
            start_bytes: baseline,
            baseline_bytes: baseline,
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Heap growth since the last reset, in bytes. `None` when the metric
    /// is unavailable.
    pub(crate) async fn sample(&mut self) -> Result<Option<f64>> {
        if !self.active {
            return Ok(None);
        }
        let Some(current) = read_heap(&self.page).await? else {
            return Ok(None);
        };
        Ok(Some(current - self.baseline_bytes))
    }

    /// Re-baseline so the next iteration measures only its own growth.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        if let Some(current) = read_heap(&self.page).await? {
            self.baseline_bytes = current;
        }
        Ok(())
    }

    pub(crate) async fn stop(&mut self) -> Result<Option<MemoryReport>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;

        let final_bytes = read_heap(&self.page).await?.unwrap_or(self.start_bytes);
        self.page.execute(DisableParams::default()).await?;

        Ok(Some(MemoryReport {
            baseline_bytes: self.start_bytes,
            final_bytes,
            growth_bytes: final_bytes - self.start_bytes,
        }))
    }
}

async fn read_heap(page: &Page) -> Result<Option<f64>> {
    let response = page.execute(GetMetricsParams::default()).await?;
    let value = response
        .result
        .metrics
        .iter()
        .find(|m| m.name == HEAP_METRIC)
        .map(|m| m.value);
    if value.is_none() {
        warn!(metric = HEAP_METRIC, "heap metric missing from Performance.getMetrics");
    }
    Ok(value)
}
