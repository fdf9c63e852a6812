//! Frame-rate instrumentation.
//!
//! Injects a `requestAnimationFrame` counter into the page and derives fps
//! from frames counted over elapsed wall time. The counter is the canonical
//! resettable feature: between iterations the counts are zeroed without
//! tearing down the rAF loop, so every counted iteration starts from a
//! clean baseline on the same session.

use chromiumoxide::Page;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::features::PageContext;

const FPS_STORE_KEY: &str = "__PERF_HARNESS_FPS__";

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FpsReading {
    frames: u64,
    elapsed_ms: f64,
}

/// Final fps report for a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FpsReport {
    /// Frames observed since the last reset.
    pub frames: u64,
    pub elapsed_ms: f64,
    pub avg_fps: f64,
}

/// Live fps counter on one page.
pub struct FpsHandle {
    page: Page,
    active: bool,
}

impl FpsHandle {
    pub(crate) async fn start(ctx: &PageContext) -> Result<Self> {
        let script = format!(
            r#"
(() => {{
    const key = '{FPS_STORE_KEY}';
    if (window[key] && window[key].running) {{
        return;
    }}
    const state = {{ frames: 0, start: performance.now(), running: true }};
    window[key] = state;
    const tick = () => {{
        if (!state.running) {{
            return;
        }}
        state.frames += 1;
        requestAnimationFrame(tick);
    }};
    requestAnimationFrame(tick);
}})();
"#
        );
        ctx.page.evaluate(script).await?;
        debug!("fps counter started");
        Ok(Self {
            page: ctx.page.clone(),
            active: true,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    async fn read(&self) -> Result<Option<FpsReading>> {
        let script = format!(
            r#"
(() => {{
    const state = window['{FPS_STORE_KEY}'];
    if (!state) {{
        return null;
    }}
    return {{ frames: state.frames, elapsedMs: performance.now() - state.start }};
}})()
"#
        );
        let result = self.page.evaluate(script).await?;
        result
            .into_value::<Option<FpsReading>>()
            .map_err(|e| HarnessError::Decode(e.to_string()))
    }

    /// Frames per second since the last reset, or `None` when the counter
    /// has not observed a meaningful interval yet.
    pub(crate) async fn sample(&mut self) -> Result<Option<f64>> {
        if !self.active {
            return Ok(None);
        }
        let Some(reading) = self.read().await? else {
            return Ok(None);
        };
        if reading.elapsed_ms <= 0.0 {
            return Ok(None);
        }
        Ok(Some(reading.frames as f64 / (reading.elapsed_ms / 1000.0)))
    }

    /// Zero the counters without touching the rAF loop.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        let script = format!(
            r#"
(() => {{
    const state = window['{FPS_STORE_KEY}'];
    if (state) {{
        state.frames = 0;
        state.start = performance.now();
    }}
}})();
"#
        );
        self.page.evaluate(script).await?;
        Ok(())
    }

    /// Take a final reading and halt the rAF loop.
    pub(crate) async fn stop(&mut self) -> Result<Option<FpsReport>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;

        let reading = self.read().await?;
        let script = format!(
            r#"
(() => {{
    const state = window['{FPS_STORE_KEY}'];
    if (state) {{
        state.running = false;
    }}
}})();
"#
        );
        self.page.evaluate(script).await?;

        Ok(reading.map(|r| FpsReport {
            frames: r.frames,
            elapsed_ms: r.elapsed_ms,
            avg_fps: if r.elapsed_ms > 0.0 {
                r.frames as f64 / (r.elapsed_ms / 1000.0)
            } else {
                0.0
            },
        }))
    }
}
