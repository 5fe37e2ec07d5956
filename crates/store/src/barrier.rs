//! Read barrier: the consistency gate for auth reads.
//!
//! A barrier captures the group's commit index once, at entry, through a
//! quorum read, then waits until this node's apply index reaches that
//! captured value. The target is fixed — commands committing while the
//! barrier waits do not extend the wait — so a barrier taken after a
//! client's write always observes that write, and concurrent barriers make
//! independent progress.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, trace};

use ferrodb_auth_log::GroupZero;
use ferrodb_auth_types::{AuthError, Result};

/// Per-node read barrier over the group-zero commit index.
pub struct ReadBarrier {
    group: std::sync::Arc<GroupZero>,
    applied: watch::Receiver<u64>,
}

impl ReadBarrier {
    /// Creates a barrier for one node from its apply-index watch.
    #[must_use]
    pub fn new(group: std::sync::Arc<GroupZero>, applied: watch::Receiver<u64>) -> Self {
        Self { group, applied }
    }

    /// Waits until the local apply index reaches the commit index observed
    /// at entry. Returns the index waited for.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoQuorum`] when the commit index cannot be captured
    ///   (quorum lost); local reads without a barrier keep working
    /// - [`AuthError::BarrierTimeout`] when the deadline expires first
    pub async fn wait(&self, timeout: Duration) -> Result<u64> {
        // The target is captured once; later commits never move it.
        let target = self.group.read_index()?;
        let mut applied = self.applied.clone();
        if *applied.borrow() >= target {
            trace!(target, "Barrier satisfied immediately");
            return Ok(target);
        }

        debug!(target, applied = *applied.borrow(), "Barrier waiting");
        let reached_target = matches!(
            tokio::time::timeout(timeout, applied.wait_for(|&index| index >= target)).await,
            Ok(Ok(_))
        );
        if reached_target {
            Ok(target)
        } else {
            // Deadline expired, or the watch sender dropped during shutdown.
            Err(AuthError::BarrierTimeout {
                waited_for: target,
                reached: *applied.borrow(),
            })
        }
    }
}
