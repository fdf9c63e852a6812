//! Smoke test against a real browser.
//!
//! Ignored by default: needs a local Chromium that chromiumoxide can
//! launch. Run with:
//!
//!   cargo test -p perf-harness --test browser_smoke -- --ignored

use anyhow::Result;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;

use perf_harness::config::{Environment, RunConfig};
use perf_harness::thresholds::metric;
use perf_harness::{PageContext, PerfHarness};

async fn launch() -> Result<Browser> {
    let config = BrowserConfig::builder()
        .build()
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let (browser, mut handler) = Browser::launch(config).await?;
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if event.is_err() {
                break;
            }
        }
    });
    Ok(browser)
}

#[tokio::test]
#[ignore = "requires a local Chromium binary"]
async fn harness_collects_metrics_from_a_blank_page() -> Result<()> {
    let browser = launch().await?;
    let page = browser.new_page("about:blank").await?;

    let config = RunConfig::from_toml_str(
        r#"
        warmup = true
        iterations = 3
        export_trace = false
    "#,
    )?;
    let harness = PerfHarness::new(config, Environment::new(false))?;
    let ctx = PageContext::new(page.clone());

    let report = harness
        .run_and_assert(&ctx, "blank-page-smoke", |iteration| {
            let page = page.clone();
            async move {
                page.evaluate(format!(
                    "performance.mark('pass-{iteration}'); document.title = 'pass {iteration}';"
                ))
                .await?;
                Ok(())
            }
        })
        .await?;

    // Two counted iterations (warmup discarded), each with a duration.
    assert_eq!(report.iterations.len(), 2);
    let duration = report.aggregates.get(metric::DURATION).unwrap();
    assert_eq!(duration.count, 2);
    assert!(duration.avg > 0.0);

    Ok(())
}
