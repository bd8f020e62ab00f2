//! Requeue policy for the OpenSearchCluster controller.
//!
//! Pipeline units and phase handlers report a [`ReconcileResult`]; this module
//! decides how that maps onto the controller runtime's [`Action`].

use std::time::Duration;

use kube::runtime::controller::Action;

/// Periodic resync interval, used even when everything converged
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Delay used for "requeue now" requests
pub const IMMEDIATE_REQUEUE: Duration = Duration::from_secs(1);

/// Delay before retrying a failed reconciliation
pub const ERROR_REQUEUE: Duration = Duration::from_secs(5);

/// Outcome of one reconcile step: whether and when to run again
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Run again for the same object
    pub requeue: bool,
    /// Delay before running again; `None` means as soon as possible
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    /// Nothing more to do until the object changes
    pub const fn done() -> Self {
        Self {
            requeue: false,
            requeue_after: None,
        }
    }

    /// Run again immediately
    pub const fn requeue() -> Self {
        Self {
            requeue: true,
            requeue_after: None,
        }
    }

    /// Run again after `delay`
    pub const fn requeue_after(delay: Duration) -> Self {
        Self {
            requeue: true,
            requeue_after: Some(delay),
        }
    }

    /// The steady-state resync result
    pub const fn resync() -> Self {
        Self::requeue_after(RESYNC_INTERVAL)
    }

    /// Convert into the controller runtime's action
    pub fn to_action(self) -> Action {
        match self.requeue_after {
            Some(delay) if !delay.is_zero() => Action::requeue(delay),
            _ if self.requeue => Action::requeue(IMMEDIATE_REQUEUE),
            _ => Action::await_change(),
        }
    }
}
