//! Per-run tracking of live feature handles.
//!
//! The coordinator is the single shared mutable structure of a test run and
//! is only ever touched from the orchestrating task, so it needs no lock
//! under the crate's cooperative model. It never starts or stops anything
//! itself: the registry starts handles, the coordinator tracks them and
//! drives resets between iterations, and the registry's stop-all tears them
//! down at the end.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::features::{ActiveFeature, FeatureKind};

/// Per-run map of feature kind to live handle.
#[derive(Default)]
pub struct FeatureCoordinator {
    handles: BTreeMap<FeatureKind, ActiveFeature>,
}

impl FeatureCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a handle, replacing any previous one for the same kind.
    /// Passing `None` removes the entry without touching the handle.
    pub fn set_handle(&mut self, kind: FeatureKind, handle: Option<ActiveFeature>) {
        match handle {
            Some(handle) => {
                self.handles.insert(kind, handle);
            }
            None => {
                self.handles.remove(&kind);
            }
        }
    }

    pub fn get_handle(&self, kind: FeatureKind) -> Option<&ActiveFeature> {
        self.handles.get(&kind)
    }

    pub fn get_handle_mut(&mut self, kind: FeatureKind) -> Option<&mut ActiveFeature> {
        self.handles.get_mut(&kind)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Mutable iteration over tracked handles, in stable kind order.
    pub fn handles_mut(&mut self) -> impl Iterator<Item = &mut ActiveFeature> {
        self.handles.values_mut()
    }

    /// Reset one feature, but only if it is tracked, active and resettable.
    ///
    /// Returns whether a reset actually happened. Unregistered or inactive
    /// kinds return `false` with no side effects.
    pub async fn reset_if_active(&mut self, kind: FeatureKind) -> Result<bool> {
        let Some(handle) = self.handles.get_mut(&kind) else {
            return Ok(false);
        };
        if !handle.is_active() || !handle.is_resettable() {
            return Ok(false);
        }
        handle.reset().await?;
        Ok(true)
    }

    /// Reset every active resettable handle.
    ///
    /// Returns the kinds that were actually reset; the iteration runner
    /// logs this to show which instrumentation carried over into the next
    /// pass.
    pub async fn reset_all_active(&mut self) -> Result<Vec<FeatureKind>> {
        let mut reset = Vec::new();
        for (kind, handle) in self.handles.iter_mut() {
            if handle.is_active() && handle.is_resettable() {
                handle.reset().await?;
                reset.push(*kind);
            }
        }
        Ok(reset)
    }

    /// Hand every tracked handle to the caller (for stop-all), leaving the
    /// coordinator empty.
    pub fn drain(&mut self) -> Vec<ActiveFeature> {
        let handles = std::mem::take(&mut self.handles);
        handles.into_values().collect()
    }

    /// Drop all registrations without stopping or resetting anything. Used
    /// at the end of a run, after stop-all has already torn everything down.
    pub fn clear(&mut self) {
        if !self.handles.is_empty() {
            debug!(count = self.handles.len(), "clearing feature coordination");
        }
        self.handles.clear();
    }
}
