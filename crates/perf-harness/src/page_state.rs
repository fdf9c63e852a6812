//! Browser-side shared state
//!
//! Two well-known globals make collected data introspectable from
//! assertions and end-to-end tests:
//!
//! - [`RENDER_STORE_KEY`] holds render-profiler commit samples. They are
//!   *produced* by application-side instrumentation (a profiler wrapper
//!   mounted in the page); the harness only installs the store and reads
//!   from it.
//! - [`VITALS_STORE_KEY`] holds observed web-vitals values, written by the
//!   observers the web-vitals feature injects.
//!
//! Both installers are idempotent (initializing twice never duplicates
//! observers or drops collected data) and both stores support a reset that
//! clears values while leaving the machinery in place.

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Global key under which render-profiler samples are collected.
pub const RENDER_STORE_KEY: &str = "__PERF_HARNESS_RENDER__";

/// Global key under which observed web-vitals are exposed.
pub const VITALS_STORE_KEY: &str = "__PERF_HARNESS_VITALS__";

fn render_store_script() -> String {
    format!(
        r#"
(() => {{
    const key = '{RENDER_STORE_KEY}';
    if (window[key] && window[key].installed) {{
        return;
    }}
    window[key] = {{ installed: true, samples: [] }};
}})();
"#
    )
}

/// Install the render-sample store on the page, both for the current
/// document and for every future navigation.
///
/// Application-side instrumentation pushes
/// `{ id, phase, actualDuration, baseDuration }` objects into
/// `window[RENDER_STORE_KEY].samples`; calling this twice is harmless.
pub async fn install_render_store(page: &Page) -> Result<()> {
    let script = render_store_script();
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
        .await?;
    page.evaluate(script).await?;
    debug!(key = RENDER_STORE_KEY, "render store installed");
    Ok(())
}

/// Per-iteration view of the render store.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderStats {
    /// Number of profiler commits recorded since the last reset.
    pub commit_count: u64,
    /// Sum of committed render durations, in milliseconds.
    pub total_duration_ms: f64,
}

/// Reads render-profiler samples out of the shared store.
///
/// The probe is not a registry feature: the sample producer lives in the
/// application under test, so there is no session to start or stop, only
/// a store to read and clear.
#[derive(Clone)]
pub struct RenderProbe {
    page: Page,
}

impl RenderProbe {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// Snapshot of the samples collected since the last reset, or `None`
    /// when the store was never installed on the current document.
    pub async fn sample(&self) -> Result<Option<RenderStats>> {
        let script = format!(
            r#"
(() => {{
    const store = window['{RENDER_STORE_KEY}'];
    if (!store) {{
        return null;
    }}
    let total = 0;
    for (const sample of store.samples) {{
        total += sample.actualDuration || 0;
    }}
    return {{ commitCount: store.samples.length, totalDurationMs: total }};
}})()
"#
        );
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<Option<RenderStats>>()
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    /// Drop collected samples without reinstalling the store.
    pub async fn reset(&self) -> Result<()> {
        let script = format!(
            r#"
(() => {{
    const store = window['{RENDER_STORE_KEY}'];
    if (store) {{
        store.samples.length = 0;
    }}
}})();
"#
        );
        self.page.evaluate(script).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_store_script_guards_reinit() {
        let script = render_store_script();
        assert!(script.contains(RENDER_STORE_KEY));
        assert!(script.contains("installed"));
        // The guard has to run before the store is re-created.
        let guard = script.find("installed").unwrap();
        let init = script.find("samples: []").unwrap();
        assert!(guard < init);
    }

    #[test]
    fn test_render_stats_deserializes_from_page_shape() {
        let json = r#"{"commitCount": 4, "totalDurationMs": 12.5}"#;
        let stats: RenderStats = serde_json::from_str(json).unwrap();
        assert_eq!(stats.commit_count, 4);
        assert_eq!(stats.total_duration_ms, 12.5);
    }

    #[test]
    fn test_store_keys_are_distinct() {
        assert_ne!(RENDER_STORE_KEY, VITALS_STORE_KEY);
    }
}
