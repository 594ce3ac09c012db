use serde::{Deserialize, Serialize};
use std::fmt;

/// One transition of the resource lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStep {
    Create,
    Read,
    Update,
    Delete,
    VerifyGone,
}

impl LifecycleStep {
    pub const ALL: [LifecycleStep; 5] = [
        Self::Create,
        Self::Read,
        Self::Update,
        Self::Delete,
        Self::VerifyGone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::VerifyGone => "verify-gone",
        }
    }

    /// State reached when this step succeeds
    pub fn target_state(&self) -> LifecycleState {
        match self {
            Self::Create => LifecycleState::Created,
            Self::Read => LifecycleState::Read,
            Self::Update => LifecycleState::Updated,
            Self::Delete => LifecycleState::Deleted,
            Self::VerifyGone => LifecycleState::VerifiedGone,
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single resource instance under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum LifecycleState {
    Unstarted,
    Created,
    Read,
    Updated,
    Deleted,
    VerifiedGone,
    /// Absorbing: the named step did not meet its expectation
    Failed(LifecycleStep),
}

impl LifecycleState {
    /// Step that leaves this state, `None` for terminal and failed states
    pub fn next_step(&self) -> Option<LifecycleStep> {
        match self {
            Self::Unstarted => Some(LifecycleStep::Create),
            Self::Created => Some(LifecycleStep::Read),
            Self::Read => Some(LifecycleStep::Update),
            Self::Updated => Some(LifecycleStep::Delete),
            Self::Deleted => Some(LifecycleStep::VerifyGone),
            Self::VerifiedGone | Self::Failed(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_step().is_none()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unstarted => "unstarted",
            Self::Created => "created",
            Self::Read => "read",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::VerifiedGone => "verified_gone",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(step) => write!(f, "failed({})", step),
            other => f.write_str(other.as_str()),
        }
    }
}
