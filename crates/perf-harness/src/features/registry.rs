//! Process-scoped feature catalog.

use std::collections::HashMap;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{HarnessError, Result};
use crate::features::{
    ActiveFeature, Capability, Feature, FeatureKind, FeatureOptions, FeatureReport, PageContext,
};

/// Catalog of available features, keyed by their unique names.
///
/// Registration happens once per process; starting and stopping happens
/// once per test run.
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    features: HashMap<&'static str, Feature>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a feature to the catalog.
    ///
    /// # Errors
    ///
    /// Fails with [`HarnessError::DuplicateFeature`] when the name is taken.
    /// Silent overwrite would hide a programming error, so it is rejected.
    pub fn register(&mut self, feature: Feature) -> Result<()> {
        let name = feature.name();
        if self.features.contains_key(name) {
            return Err(HarnessError::DuplicateFeature(name));
        }
        debug!(feature = name, "feature registered");
        self.features.insert(name, feature);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Start a registered feature by name.
    ///
    /// Returns `Ok(None)` when the feature declined to start because the
    /// engine lacks its capability; callers log and continue without it.
    ///
    /// # Errors
    ///
    /// Fails with [`HarnessError::UnknownFeature`] for unregistered names;
    /// transport errors from the feature's own start propagate unchanged.
    pub async fn start_feature(
        &self,
        name: &str,
        ctx: &PageContext,
        options: &FeatureOptions,
    ) -> Result<Option<ActiveFeature>> {
        let feature = self
            .features
            .get(name)
            .ok_or_else(|| HarnessError::UnknownFeature(name.to_string()))?;
        feature.start(ctx, options).await
    }

    /// Stop every handle, concurrently, tolerating individual failures.
    ///
    /// A handle whose stop fails contributes `None` and a warning instead
    /// of aborting the teardown of the others. The input collection is
    /// drained: handles must not be reused after a stop-all.
    pub async fn stop_all(
        &self,
        handles: &mut Vec<ActiveFeature>,
    ) -> Vec<(FeatureKind, Option<FeatureReport>)> {
        let drained: Vec<ActiveFeature> = handles.drain(..).collect();
        let stops = drained.into_iter().map(|mut handle| async move {
            let kind = handle.kind();
            match handle.stop().await {
                Ok(report) => (kind, report),
                Err(e) => {
                    warn!(feature = %kind, error = %e, "feature stop failed, recording no result");
                    (kind, None)
                }
            }
        });
        join_all(stops).await
    }
}

/// Registry with the six built-in features.
pub fn default_registry() -> FeatureRegistry {
    let mut registry = FeatureRegistry::new();
    let built_ins = [
        Feature::new("fps", FeatureKind::Fps, Capability::Any),
        Feature::new("memory", FeatureKind::Memory, Capability::ChromiumOnly),
        Feature::new("web-vitals", FeatureKind::WebVitals, Capability::Any),
        Feature::new("long-tasks", FeatureKind::LongTasks, Capability::Any),
        Feature::new("trace", FeatureKind::Trace, Capability::ChromiumOnly),
        Feature::new("custom-metrics", FeatureKind::CustomMetrics, Capability::Any),
    ];
    for feature in built_ins {
        // Names are distinct literals; registration cannot collide.
        let _ = registry.register(feature);
    }
    registry
}
