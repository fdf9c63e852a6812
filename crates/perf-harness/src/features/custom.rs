//! User-timing collection.
//!
//! Reads `performance.measure()` entries out of the page so test bodies
//! (or the application itself) can define custom metrics. Repeated
//! measures with the same name within one iteration keep the most recent
//! duration. Reset clears marks and measures so each iteration only sees
//! its own entries.

use std::collections::BTreeMap;

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::features::PageContext;

/// Final user-timing report for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomReport {
    /// Measure name to duration in milliseconds (last occurrence wins).
    pub measures: BTreeMap<String, f64>,
    /// Names of marks present when the feature stopped.
    pub marks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MeasureEntry {
    name: String,
    duration: f64,
}

/// Live user-timing reader on one page.
pub struct CustomMetricsHandle {
    page: Page,
    active: bool,
}

impl CustomMetricsHandle {
    pub(crate) async fn start(ctx: &PageContext) -> Result<Self> {
        // Entries from before the run would leak into the first iteration.
        let handle = Self {
            page: ctx.page.clone(),
            active: true,
        };
        handle.clear_entries().await?;
        debug!("user-timing collection started");
        Ok(handle)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    async fn read_measures(&self) -> Result<BTreeMap<String, f64>> {
        let script = r#"
(() => {
    return performance.getEntriesByType('measure').map((entry) => ({
        name: entry.name,
        duration: entry.duration,
    }));
})()
"#;
        let result = self.page.evaluate(script).await?;
        let entries = result
            .into_value::<Vec<MeasureEntry>>()
            .map_err(|e| HarnessError::Decode(e.to_string()))?;

        let mut measures = BTreeMap::new();
        for entry in entries {
            measures.insert(entry.name, entry.duration);
        }
        Ok(measures)
    }

    async fn clear_entries(&self) -> Result<()> {
        self.page
            .evaluate("performance.clearMarks(); performance.clearMeasures();")
            .await?;
        Ok(())
    }

    pub(crate) async fn sample(&mut self) -> Result<BTreeMap<String, f64>> {
        if !self.active {
            return Ok(BTreeMap::new());
        }
        self.read_measures().await
    }

    pub(crate) async fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.clear_entries().await
    }

    pub(crate) async fn stop(&mut self) -> Result<Option<CustomReport>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;

        let measures = self.read_measures().await?;
        let result = self
            .page
            .evaluate("performance.getEntriesByType('mark').map((entry) => entry.name)")
            .await?;
        let marks = result
            .into_value::<Vec<String>>()
            .map_err(|e| HarnessError::Decode(e.to_string()))?;

        Ok(Some(CustomReport { measures, marks }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_entry_deserializes() {
        let json = r#"[{"name": "checkout-flow", "duration": 182.4}]"#;
        let entries: Vec<MeasureEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].name, "checkout-flow");
        assert_eq!(entries[0].duration, 182.4);
    }

    #[test]
    fn test_report_serializes() {
        let mut measures = BTreeMap::new();
        measures.insert("render-settle".to_string(), 42.0);
        let report = CustomReport {
            measures,
            marks: vec!["render-settle-start".to_string()],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("render-settle"));
    }
}
