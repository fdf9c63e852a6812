//! CPU and network throttling via devtools emulation commands.
//!
//! The harness applies throttling once before the first pass and clears it
//! during teardown; iterations never touch it, since emulation state is
//! global per page and must stay constant across passes for samples to be
//! comparable.

#![allow(deprecated)] // EmulateNetworkConditionsParams is deprecated upstream but still functional

use chromiumoxide::cdp::browser_protocol::emulation::SetCpuThrottlingRateParams;
use chromiumoxide::cdp::browser_protocol::network::{
    ConnectionType, EmulateNetworkConditionsParams,
};
use chromiumoxide::Page;
use tracing::debug;

use crate::config::{NetworkProfile, RunConfig};
use crate::error::{HarnessError, Result};

/// Apply the throttling a run configuration asks for.
pub async fn apply(page: &Page, config: &RunConfig) -> Result<()> {
    if config.throttle_rate > 1.0 {
        apply_cpu(page, config.throttle_rate).await?;
    }
    if config.network_throttling != NetworkProfile::None {
        apply_network(page, config.network_throttling).await?;
    }
    Ok(())
}

/// Undo whatever [`apply`] set up. Safe to call when nothing was applied.
pub async fn clear(page: &Page) -> Result<()> {
    clear_cpu(page).await?;
    clear_network(page).await?;
    Ok(())
}

/// Slow the CPU down by `rate` (1.0 = full speed, 4.0 = typical mid-tier
/// mobile device).
pub async fn apply_cpu(page: &Page, rate: f64) -> Result<()> {
    if !rate.is_finite() || rate < 1.0 {
        return Err(HarnessError::config(format!(
            "CPU throttle rate must be >= 1.0, got {rate}"
        )));
    }
    let params = SetCpuThrottlingRateParams::builder()
        .rate(rate)
        .build()
        .map_err(|e| HarnessError::config(format!("failed to build CPU throttle params: {e}")))?;
    page.execute(params).await?;
    debug!(rate, "CPU throttling applied");
    Ok(())
}

pub async fn clear_cpu(page: &Page) -> Result<()> {
    let params = SetCpuThrottlingRateParams::builder()
        .rate(1.0)
        .build()
        .map_err(|e| HarnessError::config(format!("failed to build CPU throttle params: {e}")))?;
    page.execute(params).await?;
    debug!("CPU throttling cleared");
    Ok(())
}

/// Emulate the network conditions of a profile.
pub async fn apply_network(page: &Page, profile: NetworkProfile) -> Result<()> {
    let Some(conditions) = profile.conditions() else {
        return Ok(());
    };

    let params = EmulateNetworkConditionsParams::builder()
        .offline(conditions.offline)
        .latency(conditions.latency_ms)
        .download_throughput(conditions.download_bps)
        .upload_throughput(conditions.upload_bps)
        .connection_type(ConnectionType::Cellular4g)
        .build()
        .map_err(|e| HarnessError::config(format!("failed to build network params: {e}")))?;
    page.execute(params).await?;
    debug!(
        ?profile,
        latency_ms = conditions.latency_ms,
        "network throttling applied"
    );
    Ok(())
}

pub async fn clear_network(page: &Page) -> Result<()> {
    // -1 disables throughput throttling in the devtools protocol.
    let params = EmulateNetworkConditionsParams::builder()
        .offline(false)
        .latency(0.0)
        .download_throughput(-1.0)
        .upload_throughput(-1.0)
        .connection_type(ConnectionType::None)
        .build()
        .map_err(|e| HarnessError::config(format!("failed to build network params: {e}")))?;
    page.execute(params).await?;
    debug!("network throttling cleared");
    Ok(())
}
