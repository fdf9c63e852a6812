//! Error taxonomy for the harness
//!
//! Errors fall into a few distinct classes with different handling rules:
//! capability gaps are recovered locally (the feature is disabled for the
//! run), transport failures propagate, bounded waits raise [`HarnessError::Timeout`]
//! while still releasing their resources, configuration problems fail fast
//! before any iteration runs, and threshold violations are expected test
//! failures carrying full diagnostic detail.

use std::time::Duration;

use chromiumoxide::error::CdpError;
use thiserror::Error;

use crate::assertions::ViolationReport;

/// Convenience alias used throughout the crate.
pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum HarnessError {
    /// A feature with the same name is already in the registry. Duplicate
    /// registration is a programming error, not a runtime condition.
    #[error("feature `{0}` is already registered")]
    DuplicateFeature(&'static str),

    /// `start_feature` was called with a name nobody registered.
    #[error("feature `{0}` is not registered")]
    UnknownFeature(String),

    /// The current browser engine structurally lacks a capability a feature
    /// needs. Recovered at the registry boundary: the feature is disabled
    /// for the run and a warning is logged.
    #[error("feature `{feature}` requires a {capability} browser, got {engine}")]
    CapabilityUnsupported {
        feature: &'static str,
        capability: &'static str,
        engine: &'static str,
    },

    /// The debugging session failed for reasons other than a missing
    /// capability. Never swallowed.
    #[error("browser transport error: {0}")]
    Transport(#[from] CdpError),

    /// Could not decode a value evaluated in the page.
    #[error("failed to decode browser result: {0}")]
    Decode(String),

    /// A bounded wait exceeded its deadline. Resources held by the wait are
    /// released before this is raised.
    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    /// Invalid run or threshold configuration. Raised at resolution time,
    /// before any iteration runs.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// One or more resolved aggregates violated their resolved bounds. This
    /// is an expected, structured test failure, not a system error.
    #[error("{0}")]
    ThresholdViolation(ViolationReport),
}

impl HarnessError {
    /// Shorthand for [`HarnessError::Config`].
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        HarnessError::Config(msg.into())
    }
}
