//! Test double for the feature lifecycle. Only compiled for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{HarnessError, Result};
use crate::features::{CustomReport, FeatureKind, FeatureReport, FeatureSample};

/// Scriptable stand-in for a live feature handle.
#[derive(Debug)]
pub(crate) struct MockHandle {
    pub kind: FeatureKind,
    pub active: bool,
    pub resettable: bool,
    /// When set, `stop` fails instead of producing a report.
    pub fail_stop: bool,
    pub reset_count: Arc<AtomicUsize>,
    pub sample: Option<FeatureSample>,
}

impl MockHandle {
    pub fn new(kind: FeatureKind) -> Self {
        Self {
            kind,
            active: true,
            resettable: true,
            fail_stop: false,
            reset_count: Arc::new(AtomicUsize::new(0)),
            sample: None,
        }
    }

    pub fn with_sample(mut self, sample: FeatureSample) -> Self {
        self.sample = Some(sample);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn non_resettable(mut self) -> Self {
        self.resettable = false;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn reset_counter(&self) -> Arc<AtomicUsize> {
        self.reset_count.clone()
    }

    pub fn reset(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.reset_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn sample(&mut self) -> Result<Option<FeatureSample>> {
        Ok(self.sample.clone())
    }

    pub fn stop(&mut self) -> Result<Option<FeatureReport>> {
        if !self.active {
            return Ok(None);
        }
        self.active = false;
        if self.fail_stop {
            return Err(HarnessError::config("mock stop failure"));
        }
        Ok(Some(FeatureReport::Custom(CustomReport::default())))
    }
}
