//! Browser trace capture.
//!
//! Starts devtools tracing when the feature starts and drains the
//! `dataCollected`/`tracingComplete` event stream when it stops. The drain
//! runs under a hard wall-clock deadline: on expiry the wait is abandoned
//! and [`crate::error::HarnessError::Timeout`] is raised, but the event
//! subscriptions are dropped and the handle deactivated on every exit path.
//! The resulting document is compatible with generic trace-viewer tooling.
//!
//! Tracing is global per page, so this feature is not resettable; it spans
//! the whole run.

use std::path::Path;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::tracing::{
    EndParams, EventDataCollected, EventTracingComplete, StartParams, TraceConfig,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{HarnessError, Result};
use crate::features::PageContext;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for a trace capture.
#[derive(Debug, Clone)]
pub struct TraceOptions {
    /// Trace categories passed to the browser.
    pub categories: Vec<String>,
    /// Hard deadline for draining collected trace data after `Tracing.end`.
    pub timeout: Duration,
    /// Test name stamped into the export metadata.
    pub test_name: String,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            categories: vec![
                "devtools.timeline".to_string(),
                "disabled-by-default-devtools.timeline".to_string(),
                "blink.user_timing".to_string(),
                "v8.execute".to_string(),
            ],
            timeout: DEFAULT_TIMEOUT,
            test_name: String::new(),
        }
    }
}

/// One event in the exported trace, in the standard trace-event format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cat: String,
    #[serde(default)]
    pub ph: String,
    /// Timestamp, microseconds.
    #[serde(default)]
    pub ts: f64,
    /// Duration, microseconds; absent for instant events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub tid: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMetadata {
    /// ISO-8601 capture timestamp.
    pub captured_at: String,
    pub test_name: String,
    pub source: String,
}

/// Exportable trace document: `traceEvents` plus capture metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceDocument {
    pub trace_events: Vec<TraceEvent>,
    pub metadata: TraceMetadata,
}

impl TraceDocument {
    /// Write the document as JSON, loadable by trace-viewer tooling.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| HarnessError::Decode(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Live trace capture on one page.
pub struct TraceHandle {
    page: Page,
    options: TraceOptions,
    active: bool,
}

impl TraceHandle {
    pub(crate) async fn start(ctx: &PageContext, options: TraceOptions) -> Result<Self> {
        let params = StartParams {
            trace_config: Some(TraceConfig {
                included_categories: Some(options.categories.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };
        ctx.page.execute(params).await?;
        debug!(categories = options.categories.len(), "trace capture started");
        Ok(Self {
            page: ctx.page.clone(),
            options,
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// End tracing and drain collected events into a document.
    pub(crate) async fn stop(&mut self) -> Result<Option<TraceDocument>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;

        // Subscribe before ending so no chunk is missed.
        let mut data = self.page.event_listener::<EventDataCollected>().await?;
        let mut complete = self.page.event_listener::<EventTracingComplete>().await?;
        self.page.execute(EndParams::default()).await?;

        let deadline = self.options.timeout;
        let drained = timeout(deadline, async {
            let mut raw: Vec<serde_json::Value> = Vec::new();
            loop {
                tokio::select! {
                    chunk = data.next() => match chunk {
                        Some(chunk) => raw.extend(chunk.value.iter().cloned()),
                        None => break,
                    },
                    done = complete.next() => {
                        if done.is_some() {
                            debug!(events = raw.len(), "trace collection complete");
                        }
                        break;
                    }
                }
            }
            raw
        })
        .await;
        // Both subscriptions drop here, on success and on timeout alike.

        let raw = match drained {
            Ok(raw) => raw,
            Err(_) => {
                return Err(HarnessError::Timeout {
                    what: "trace data collection".to_string(),
                    after: deadline,
                });
            }
        };

        let mut events = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<TraceEvent>(value) {
                Ok(event) => events.push(event),
                Err(e) => trace!(error = %e, "skipping malformed trace event"),
            }
        }
        if events.is_empty() {
            warn!("trace capture produced no events");
        }

        Ok(Some(TraceDocument {
            trace_events: events,
            metadata: TraceMetadata {
                captured_at: chrono::Utc::now().to_rfc3339(),
                test_name: self.options.test_name.clone(),
                source: "perf-harness".to_string(),
            },
        }))
    }
}
