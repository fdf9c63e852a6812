//! Long-task tracking.
//!
//! A `PerformanceObserver` on the `longtask` entry type accumulates total
//! blocked time and a task count into a page-global store. Resettable:
//! zeroing the accumulators between iterations keeps the observer alive.

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::features::PageContext;

const LONG_TASKS_STORE_KEY: &str = "__PERF_HARNESS_LONGTASKS__";

/// Accumulated long-task totals since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTasksSnapshot {
    /// Total blocked time, milliseconds.
    pub total_ms: f64,
    pub count: u64,
}

fn observer_script() -> String {
    format!(
        r#"
(() => {{
    const key = '{LONG_TASKS_STORE_KEY}';
    if (window[key] && window[key].installed) {{
        return;
    }}
    const store = {{ installed: true, totalMs: 0, count: 0 }};
    window[key] = store;
    try {{
        new PerformanceObserver((list) => {{
            for (const entry of list.getEntries()) {{
                store.totalMs += entry.duration;
                store.count += 1;
            }}
        }}).observe({{ type: 'longtask', buffered: true }});
    }} catch (e) {{}}
}})();
"#
    )
}

/// Live long-task observer on one page.
pub struct LongTasksHandle {
    page: Page,
    active: bool,
}

impl LongTasksHandle {
    pub(crate) async fn start(ctx: &PageContext) -> Result<Self> {
        ctx.page.evaluate(observer_script()).await?;
        debug!("long-task observer installed");
        Ok(Self {
            page: ctx.page.clone(),
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    async fn read(&self) -> Result<LongTasksSnapshot> {
        let script = format!(
            r#"
(() => {{
    const store = window['{LONG_TASKS_STORE_KEY}'];
    if (!store) {{
        return {{ totalMs: 0, count: 0 }};
    }}
    return {{ totalMs: store.totalMs, count: store.count }};
}})()
"#
        );
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<LongTasksSnapshot>()
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    pub(crate) async fn sample(&mut self) -> Result<LongTasksSnapshot> {
        if !self.active {
            return Ok(LongTasksSnapshot::default());
        }
        self.read().await
    }

    /// Zero the accumulators; the observer stays installed.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let script = format!(
            r#"
(() => {{
    const store = window['{LONG_TASKS_STORE_KEY}'];
    if (store) {{
        store.totalMs = 0;
        store.count = 0;
    }}
}})();
"#
        );
        self.page.evaluate(script).await?;
        Ok(())
    }

    pub(crate) async fn stop(&mut self) -> Result<Option<LongTasksSnapshot>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;
        Ok(Some(self.read().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_script_is_guarded() {
        let script = observer_script();
        assert!(script.contains(LONG_TASKS_STORE_KEY));
        let guard = script.find("installed").unwrap();
        let observer = script.find("longtask").unwrap();
        assert!(guard < observer);
    }

    #[test]
    fn test_snapshot_deserializes_from_page_shape() {
        let json = r#"{"totalMs": 312.5, "count": 3}"#;
        let snapshot: LongTasksSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.total_ms, 312.5);
        assert_eq!(snapshot.count, 3);
    }
}
