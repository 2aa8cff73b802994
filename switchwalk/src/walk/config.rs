//! Walk configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a failed unit inside a batch does to the walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFailurePolicy {
    /// Log the failure and proceed to the next step.
    #[default]
    Continue,

    /// Fail the walk once the batch has drained.
    Abort,
}

/// Per-walk settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkConfig {
    /// Upper bound on each remote command.
    pub command_timeout: Duration,

    pub failure_policy: BatchFailurePolicy,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            failure_policy: BatchFailurePolicy::Continue,
        }
    }
}
