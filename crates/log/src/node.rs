//! Per-node apply loop over the group-zero log.
//!
//! Each node runs exactly one apply task: committed commands are applied to
//! the node's [`StateMachine`] strictly in commit order, never concurrently
//! with each other. When the node lags past log retention (its next entry
//! was compacted), the latest snapshot is installed atomically and applying
//! resumes from the snapshot index.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use ferrodb_auth_types::{LogError, NodeId};

use crate::group::GroupZero;
use crate::snapshot::decode_snapshot;

/// The apply-side contract of the replicated auth store.
///
/// `apply` is invoked exactly once per committed command, strictly in commit
/// order, on every node — including nodes that joined via snapshot.
/// Implementations must be deterministic: the same command sequence produces
/// identical state on every node.
pub trait StateMachine: Send + Sync + 'static {
    /// Applies one committed command. Must be mutually exclusive with itself
    /// (single writer); reads may run concurrently.
    fn apply(&self, index: u64, command: &[u8]) -> Result<(), LogError>;

    /// Highest log index applied so far.
    fn applied_index(&self) -> u64;

    /// Serializes the full applied state for a snapshot, returning the apply
    /// index the payload reflects. The pair must be captured atomically with
    /// respect to `apply`, so the payload always contains every effect up to
    /// and including the returned index.
    fn build_snapshot(&self) -> Result<(u64, Vec<u8>), LogError>;

    /// Replaces all local state with the snapshot payload and sets the apply
    /// index to `last_index`. Must be atomic from a reader's perspective.
    fn install_snapshot(&self, last_index: u64, payload: &[u8]) -> Result<(), LogError>;
}

/// Handle to one node's running apply loop.
pub struct NodeHandle {
    node: NodeId,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl NodeHandle {
    /// Starts the apply loop for `node` against `group`, driving `sm`.
    ///
    /// A node that starts with an empty state machine while the log is
    /// already compacted will bootstrap itself from the latest snapshot.
    #[must_use]
    pub fn start(node: NodeId, group: Arc<GroupZero>, sm: Arc<dyn StateMachine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(apply_loop(node, group, sm, shutdown_rx));
        Self { node, shutdown_tx, task }
    }

    /// Node this handle belongs to.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Signals the apply loop to stop and waits for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }

    /// Aborts the apply loop without waiting. Used by tests simulating a
    /// hard node failure.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[instrument(skip(group, sm, shutdown_rx), fields(node))]
async fn apply_loop(
    node: NodeId,
    group: Arc<GroupZero>,
    sm: Arc<dyn StateMachine>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut commits = group.subscribe_commits();
    info!(node, "Apply loop started");

    loop {
        // Drain everything currently committed before waiting again.
        loop {
            let next = sm.applied_index() + 1;
            match group.entry(next) {
                Ok(Some(command)) => {
                    if let Err(error) = sm.apply(next, &command) {
                        warn!(node, index = next, %error, "Apply failed, halting node");
                        return;
                    }
                },
                Ok(None) => break,
                Err(LogError::Compacted { requested, first_available }) => {
                    debug!(node, requested, first_available, "Lagging past retention");
                    if !install_latest_snapshot(node, &group, sm.as_ref()) {
                        return;
                    }
                },
                Err(LogError::Shutdown) => {
                    info!(node, "Group shut down, apply loop exiting");
                    return;
                },
                Err(error) => {
                    warn!(node, %error, "Unexpected log error, halting node");
                    return;
                },
            }
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(node, "Apply loop stopped");
                    return;
                }
            },
            changed = commits.changed() => {
                if changed.is_err() {
                    return;
                }
            },
        }
    }
}

/// Installs the group's latest snapshot into `sm`. Returns `false` when no
/// usable snapshot exists or installation fails, halting the node.
fn install_latest_snapshot(node: NodeId, group: &GroupZero, sm: &dyn StateMachine) -> bool {
    let Some((last_index, encoded)) = group.latest_snapshot() else {
        warn!(node, "Log compacted but no snapshot available");
        return false;
    };
    let snapshot = match decode_snapshot(&encoded) {
        Ok(snapshot) => snapshot,
        Err(error) => {
            warn!(node, %error, "Snapshot failed verification");
            return false;
        },
    };
    if let Err(error) = sm.install_snapshot(snapshot.last_index, &snapshot.payload) {
        warn!(node, %error, "Snapshot install failed");
        return false;
    }
    info!(node, last_index, "Snapshot installed");
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use parking_lot::Mutex;
    use tokio::sync::watch;

    use super::*;

    /// Toy state machine: concatenates applied command bytes.
    struct RecordingMachine {
        state: Mutex<Vec<u8>>,
        applied: watch::Sender<u64>,
    }

    impl RecordingMachine {
        fn new() -> Arc<Self> {
            let (applied, _) = watch::channel(0);
            Arc::new(Self { state: Mutex::new(Vec::new()), applied })
        }

        fn bytes(&self) -> Vec<u8> {
            self.state.lock().clone()
        }
    }

    impl StateMachine for RecordingMachine {
        fn apply(&self, index: u64, command: &[u8]) -> Result<(), LogError> {
            let mut state = self.state.lock();
            state.extend_from_slice(command);
            self.applied.send_replace(index);
            Ok(())
        }

        fn applied_index(&self) -> u64 {
            *self.applied.borrow()
        }

        fn build_snapshot(&self) -> Result<(u64, Vec<u8>), LogError> {
            // State lock held across both reads so the pair is consistent.
            let state = self.state.lock();
            Ok((*self.applied.borrow(), state.clone()))
        }

        fn install_snapshot(&self, last_index: u64, payload: &[u8]) -> Result<(), LogError> {
            *self.state.lock() = payload.to_vec();
            self.applied.send_replace(last_index);
            Ok(())
        }
    }

    async fn wait_applied(sm: &RecordingMachine, index: u64) {
        let mut rx = sm.applied.subscribe();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|&v| v >= index))
            .await
            .expect("apply loop should catch up")
            .expect("watch should stay open");
    }

    #[tokio::test]
    async fn test_apply_loop_applies_in_order() {
        let group = GroupZero::new(0, 1024);
        group.add_voter(1);
        let sm = RecordingMachine::new();
        let handle = NodeHandle::start(1, group.clone(), sm.clone());

        group.propose(1, vec![b'a']).unwrap();
        group.propose(1, vec![b'b']).unwrap();
        group.propose(1, vec![b'c']).unwrap();

        wait_applied(&sm, 3).await;
        assert_eq!(sm.bytes(), b"abc");
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_two_nodes_converge_to_identical_state() {
        let group = GroupZero::new(0, 1024);
        group.add_voter(1);
        group.add_voter(2);
        let sm1 = RecordingMachine::new();
        let sm2 = RecordingMachine::new();
        let h1 = NodeHandle::start(1, group.clone(), sm1.clone());
        let h2 = NodeHandle::start(2, group.clone(), sm2.clone());

        for byte in b"hello" {
            group.propose(1, vec![*byte]).unwrap();
        }

        wait_applied(&sm1, 5).await;
        wait_applied(&sm2, 5).await;
        assert_eq!(sm1.bytes(), sm2.bytes());
        h1.stop().await;
        h2.stop().await;
    }

    #[tokio::test]
    async fn test_late_joiner_bootstraps_from_snapshot() {
        let group = GroupZero::new(0, 1024);
        group.add_voter(1);
        let sm1 = RecordingMachine::new();
        let h1 = NodeHandle::start(1, group.clone(), sm1.clone());

        for byte in b"xyz" {
            group.propose(1, vec![*byte]).unwrap();
        }
        wait_applied(&sm1, 3).await;

        // Snapshot from node 1 and compact; the log now starts past index 3.
        let snapshot_index = group.trigger_snapshot(sm1.as_ref()).unwrap();
        assert_eq!(snapshot_index, 3);
        assert!(matches!(group.entry(1).unwrap_err(), LogError::Compacted { .. }));

        // A fresh node must reach identical state via the snapshot alone.
        group.add_voter(2);
        let sm2 = RecordingMachine::new();
        let h2 = NodeHandle::start(2, group.clone(), sm2.clone());
        wait_applied(&sm2, 3).await;
        assert_eq!(sm2.bytes(), sm1.bytes());

        // And keep applying entries committed after the snapshot.
        group.propose(1, vec![b'!']).unwrap();
        wait_applied(&sm2, 4).await;
        assert_eq!(sm2.bytes(), b"xyz!");
        h1.stop().await;
        h2.stop().await;
    }

    #[tokio::test]
    async fn test_stopped_node_stops_applying() {
        let group = GroupZero::new(0, 1024);
        group.add_voter(1);
        group.add_voter(2);
        let sm1 = RecordingMachine::new();
        let sm2 = RecordingMachine::new();
        let h1 = NodeHandle::start(1, group.clone(), sm1.clone());
        let h2 = NodeHandle::start(2, group.clone(), sm2.clone());

        group.propose(1, vec![b'a']).unwrap();
        wait_applied(&sm2, 1).await;
        h2.stop().await;

        group.propose(1, vec![b'b']).unwrap();
        wait_applied(&sm1, 2).await;
        // Node 2's machine retains only what it applied before stopping.
        assert_eq!(sm2.bytes(), b"a");
        h1.stop().await;
    }

    #[tokio::test]
    async fn test_snapshot_noop_when_already_current() {
        let group = GroupZero::new(0, 1024);
        group.add_voter(1);
        let sm = RecordingMachine::new();
        let handle = NodeHandle::start(1, group.clone(), sm.clone());
        group.propose(1, vec![b'a']).unwrap();
        wait_applied(&sm, 1).await;

        assert_eq!(group.trigger_snapshot(sm.as_ref()).unwrap(), 1);
        // Re-triggering without new commits keeps the existing snapshot.
        assert_eq!(group.trigger_snapshot(sm.as_ref()).unwrap(), 1);
        handle.stop().await;
    }
}
