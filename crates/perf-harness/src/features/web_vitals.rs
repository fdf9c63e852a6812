//! Web-vitals observation.
//!
//! Injects `PerformanceObserver`s for LCP, CLS and INP that write into the
//! shared vitals store ([`crate::page_state::VITALS_STORE_KEY`]), where
//! assertions and end-to-end tests can also inspect them. The installer is
//! guarded so a second injection never duplicates observers; reset clears
//! the observed values but leaves the observers in place.

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::features::PageContext;
use crate::page_state::VITALS_STORE_KEY;

/// Observed vitals at one point in time. A vital that never fired is
/// `None` and is skipped by aggregation rather than treated as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsSnapshot {
    /// Largest contentful paint, milliseconds.
    pub lcp: Option<f64>,
    /// Cumulative layout shift, unitless.
    pub cls: Option<f64>,
    /// Interaction to next paint, milliseconds.
    pub inp: Option<f64>,
}

fn observer_script() -> String {
    format!(
        r#"
(() => {{
    const key = '{VITALS_STORE_KEY}';
    if (window[key] && window[key].installed) {{
        return;
    }}
    const store = {{ installed: true, lcp: null, cls: null, inp: null }};
    window[key] = store;

    try {{
        new PerformanceObserver((list) => {{
            const entries = list.getEntries();
            const last = entries[entries.length - 1];
            if (last) {{
                store.lcp = last.renderTime || last.loadTime;
            }}
        }}).observe({{ type: 'largest-contentful-paint', buffered: true }});
    }} catch (e) {{}}

    try {{
        new PerformanceObserver((list) => {{
            for (const entry of list.getEntries()) {{
                if (!entry.hadRecentInput) {{
                    store.cls = (store.cls || 0) + entry.value;
                }}
            }}
        }}).observe({{ type: 'layout-shift', buffered: true }});
    }} catch (e) {{}}

    try {{
        new PerformanceObserver((list) => {{
            for (const entry of list.getEntries()) {{
                if (entry.interactionId) {{
                    store.inp = Math.max(store.inp || 0, entry.duration);
                }}
            }}
        }}).observe({{ type: 'event', buffered: true, durationThreshold: 16 }});
    }} catch (e) {{}}
}})();
"#
    )
}

/// Live vitals observers on one page.
pub struct WebVitalsHandle {
    page: Page,
    active: bool,
}

impl WebVitalsHandle {
    pub(crate) async fn start(ctx: &PageContext) -> Result<Self> {
        let script = observer_script();
        // Install for future navigations and for the current document; the
        // guard makes the double installation harmless.
        ctx.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
            .await?;
        ctx.page.evaluate(script).await?;
        debug!("web-vitals observers installed");
        Ok(Self {
            page: ctx.page.clone(),
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    async fn read(&self) -> Result<VitalsSnapshot> {
        let script = format!(
            r#"
(() => {{
    const store = window['{VITALS_STORE_KEY}'];
    if (!store) {{
        return {{ lcp: null, cls: null, inp: null }};
    }}
    return {{ lcp: store.lcp, cls: store.cls, inp: store.inp }};
}})()
"#
        );
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<VitalsSnapshot>()
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    pub(crate) async fn sample(&mut self) -> Result<VitalsSnapshot> {
        if !self.active {
            return Ok(VitalsSnapshot::default());
        }
        self.read().await
    }

    /// Clear observed values; observers stay installed.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let script = format!(
            r#"
(() => {{
    const store = window['{VITALS_STORE_KEY}'];
    if (store) {{
        store.lcp = null;
        store.cls = null;
        store.inp = null;
    }}
}})();
"#
        );
        self.page.evaluate(script).await?;
        Ok(())
    }

    pub(crate) async fn stop(&mut self) -> Result<Option<VitalsSnapshot>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;
        Ok(Some(self.read().await?))
    }
}
