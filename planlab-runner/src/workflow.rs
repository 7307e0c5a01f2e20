//! Rebalance request lifecycle.
//!
//! ```text
//!            ┌──► Approved
//!  Pending ──┼──► Rejected
//!     ▲      └──► Deferred
//!     └───────────────┘
//! ```
//!
//! Approved and Rejected close a request. A Deferred request is reopened by
//! the next scheduled cycle.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStatus {
    /// Check in progress.
    Pending,
    /// Drift exceeded the threshold and the target allocation was saved.
    Approved,
    /// Drift within threshold.
    Rejected,
    /// Market data unusable or the store refused the write; retried next cycle.
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("invalid rebalance transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: RebalanceStatus,
        to: RebalanceStatus,
    },
}

impl RebalanceStatus {
    pub fn can_transition_to(self, next: RebalanceStatus) -> bool {
        use RebalanceStatus::*;
        matches!(
            (self, next),
            (Pending, Approved) | (Pending, Rejected) | (Pending, Deferred) | (Deferred, Pending)
        )
    }

    pub fn transition(self, next: RebalanceStatus) -> Result<RebalanceStatus, WorkflowError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WorkflowError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Approved and Rejected close the request.
    pub fn is_closed(self) -> bool {
        matches!(self, RebalanceStatus::Approved | RebalanceStatus::Rejected)
    }
}

impl std::fmt::Display for RebalanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RebalanceStatus::Pending => "pending",
            RebalanceStatus::Approved => "approved",
            RebalanceStatus::Rejected => "rejected",
            RebalanceStatus::Deferred => "deferred",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::RebalanceStatus::*;
    use super::*;

    #[test]
    fn pending_resolves_three_ways() {
        assert_eq!(Pending.transition(Approved), Ok(Approved));
        assert_eq!(Pending.transition(Rejected), Ok(Rejected));
        assert_eq!(Pending.transition(Deferred), Ok(Deferred));
    }

    #[test]
    fn deferred_reopens() {
        assert_eq!(Deferred.transition(Pending), Ok(Pending));
    }

    #[test]
    fn closed_states_are_final() {
        for closed in [Approved, Rejected] {
            assert!(closed.is_closed());
            for next in [Pending, Approved, Rejected, Deferred] {
                assert_eq!(
                    closed.transition(next),
                    Err(WorkflowError::InvalidTransition { from: closed, to: next })
                );
            }
        }
    }

    #[test]
    fn deferred_cannot_skip_pending() {
        assert!(Deferred.transition(Approved).is_err());
        assert!(Deferred.transition(Rejected).is_err());
        assert!(!Deferred.is_closed());
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Deferred).unwrap(), "\"deferred\"");
    }
}
