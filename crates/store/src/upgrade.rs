//! The legacy-to-consensus upgrade coordinator.
//!
//! Upgrade state lives in the replicated `auth_version` row and moves
//! `NotStarted -> InProgress -> Done`, strictly forward. Triggering proposes
//! the `InProgress` transition together with the voter set captured at that
//! moment; each node then drains its legacy rows through the splitter and
//! proposes its own migration mark. The `Done` transition is not proposed by
//! anyone — the state machine applies it deterministically when the last
//! voter's mark lands, so every node flips at the same log index.
//!
//! Upgrade proposals are forwarded to the current leader, unlike role
//! mutations, which surface `NotLeader` to the caller: migration marks must
//! originate from every node, not only the leader.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use ferrodb_auth_log::GroupZero;
use ferrodb_auth_types::{
    AuthError, CommitReceipt, NodeId, Result, RowOp, UpgradeState, UpgradeStatus,
};

use crate::legacy::LegacyBackend;
use crate::splitter::propose_logical_mutation;
use crate::state_machine::AuthStateMachine;

/// Result of an upgrade trigger. Re-triggering is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The `InProgress` transition was proposed by this call.
    Started,
    /// The upgrade was already running.
    AlreadyInProgress,
    /// The upgrade already finished.
    AlreadyDone,
}

/// Drives the upgrade for one node.
pub struct UpgradeCoordinator {
    node: NodeId,
    group: Arc<GroupZero>,
    sm: Arc<AuthStateMachine>,
    legacy: Arc<LegacyBackend>,
    proposal_timeout: Duration,
    /// Set when this node's migration failed; cleared on a successful retry.
    migration_failed: AtomicBool,
}

impl UpgradeCoordinator {
    /// Creates a coordinator for `node`.
    #[must_use]
    pub fn new(
        node: NodeId,
        group: Arc<GroupZero>,
        sm: Arc<AuthStateMachine>,
        legacy: Arc<LegacyBackend>,
        proposal_timeout: Duration,
    ) -> Self {
        Self {
            node,
            group,
            sm,
            legacy,
            proposal_timeout,
            migration_failed: AtomicBool::new(false),
        }
    }

    /// Starts the cluster-wide upgrade, or reports that it already ran.
    ///
    /// Concurrent triggers may both propose the transition; the state
    /// machine's monotonic apply makes the second a no-op.
    ///
    /// # Errors
    ///
    /// Propagates proposal failures (leadership, quorum, timeout).
    pub async fn trigger(&self) -> Result<TriggerOutcome> {
        match self.sm.read(|t| t.version().upgrade_state) {
            UpgradeState::Done => return Ok(TriggerOutcome::AlreadyDone),
            UpgradeState::InProgress => return Ok(TriggerOutcome::AlreadyInProgress),
            UpgradeState::NotStarted => {},
        }

        let voters = self.group.voters();
        info!(node = self.node, voters = voters.len(), "Triggering auth upgrade");
        self.forward(vec![RowOp::SetUpgradeState {
            state: UpgradeState::InProgress,
            voters,
        }])
        .await?;
        Ok(TriggerOutcome::Started)
    }

    /// Migrates this node's legacy rows into group zero, ending with the
    /// node's migration mark. A node with no legacy rows (a fresh joiner)
    /// proposes only the mark.
    ///
    /// On failure the node reports `NotUpgraded` until a retry succeeds;
    /// committed migration commands stay committed and re-running is safe
    /// because every emitted operation is idempotent.
    ///
    /// # Errors
    ///
    /// Propagates proposal failures, including [`AuthError::PartialFailure`].
    pub async fn run_local_migration(&self) -> Result<CommitReceipt> {
        let rows = self.legacy.export();
        let mut ops = Vec::new();
        for (name, record) in &rows.roles {
            for role in &record.member_of {
                ops.push(RowOp::PutMember { role: role.clone(), member: name.clone() });
            }
            ops.push(RowOp::PutRole { name: name.clone(), record: record.clone() });
        }
        for ((grantee, resource), permissions) in &rows.grants {
            ops.push(RowOp::PutGrant {
                grantee: grantee.clone(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            });
        }
        ops.push(RowOp::MarkNodeMigrated { node: self.node });

        info!(node = self.node, ops = ops.len(), "Migrating legacy auth rows");
        match self.forward(ops).await {
            Ok(receipt) => {
                self.migration_failed.store(false, Ordering::Relaxed);
                Ok(receipt)
            },
            Err(error) => {
                warn!(node = self.node, %error, "Legacy migration failed");
                self.migration_failed.store(true, Ordering::Relaxed);
                Err(error)
            },
        }
    }

    /// This node's view of the upgrade.
    #[must_use]
    pub fn status(&self) -> UpgradeStatus {
        if self.migration_failed.load(Ordering::Relaxed) {
            return UpgradeStatus::NotUpgraded;
        }
        match self.sm.read(|t| t.version().upgrade_state) {
            UpgradeState::NotStarted => UpgradeStatus::NotUpgraded,
            UpgradeState::InProgress => UpgradeStatus::InProgress,
            UpgradeState::Done => UpgradeStatus::Upgraded,
        }
    }

    /// Proposes on behalf of this node through the current leader. Upgrade
    /// traffic is forwarded; there is no leadership requirement on the node
    /// that migrates.
    async fn forward(&self, ops: Vec<RowOp>) -> Result<CommitReceipt> {
        let leader = self
            .group
            .leader()
            .ok_or(AuthError::NotLeader { leader: None })?;
        propose_logical_mutation(&self.group, leader, ops, self.proposal_timeout).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use ferrodb_auth_log::NodeHandle;
    use ferrodb_auth_types::{ResourceId, RoleRecord, all_permissions};

    use super::*;

    struct Node {
        sm: Arc<AuthStateMachine>,
        handle: NodeHandle,
        coordinator: UpgradeCoordinator,
    }

    fn spawn_node(group: &Arc<GroupZero>, id: NodeId, legacy: LegacyBackend) -> Node {
        group.add_voter(id);
        let sm = Arc::new(AuthStateMachine::new());
        let handle = NodeHandle::start(id, group.clone(), sm.clone());
        let coordinator = UpgradeCoordinator::new(
            id,
            group.clone(),
            sm.clone(),
            Arc::new(legacy),
            Duration::from_secs(2),
        );
        Node { sm, handle, coordinator }
    }

    async fn wait_applied(node: &Node, index: u64) {
        let mut rx = node.sm.subscribe_applied();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|&v| v >= index))
            .await
            .expect("node should catch up")
            .expect("watch open");
    }

    fn legacy_with_role(name: &str) -> LegacyBackend {
        let legacy = LegacyBackend::new();
        legacy.upsert_role(name, RoleRecord { can_login: true, ..RoleRecord::default() });
        legacy.upsert_grant(name, ResourceId::data("ks", "t"), all_permissions());
        legacy
    }

    #[tokio::test]
    async fn test_full_upgrade_reaches_done() {
        let group = GroupZero::new(0, 1024 * 1024);
        let n1 = spawn_node(&group, 1, legacy_with_role("alice"));
        let n2 = spawn_node(&group, 2, legacy_with_role("bob"));

        assert_eq!(n1.coordinator.trigger().await.unwrap(), TriggerOutcome::Started);
        wait_applied(&n1, 1).await;
        wait_applied(&n2, 1).await;
        assert_eq!(n1.coordinator.status(), UpgradeStatus::InProgress);

        let r1 = n1.coordinator.run_local_migration().await.unwrap();
        let r2 = n2.coordinator.run_local_migration().await.unwrap();
        let last = r1.last_index.max(r2.last_index);
        wait_applied(&n1, last).await;
        wait_applied(&n2, last).await;

        assert_eq!(n1.coordinator.status(), UpgradeStatus::Upgraded);
        assert_eq!(n2.coordinator.status(), UpgradeStatus::Upgraded);
        // Both nodes' legacy rows merged into the replicated tables.
        assert!(n1.sm.read(|t| t.role("alice").is_some() && t.role("bob").is_some()));
        assert_eq!(
            n1.sm.read(|t| t.to_snapshot_bytes().unwrap()),
            n2.sm.read(|t| t.to_snapshot_bytes().unwrap())
        );
        n1.handle.stop().await;
        n2.handle.stop().await;
    }

    #[tokio::test]
    async fn test_retrigger_is_idempotent() {
        let group = GroupZero::new(0, 1024 * 1024);
        let n1 = spawn_node(&group, 1, LegacyBackend::new());

        assert_eq!(n1.coordinator.trigger().await.unwrap(), TriggerOutcome::Started);
        wait_applied(&n1, 1).await;
        let commit_before = group.commit_index();
        assert_eq!(
            n1.coordinator.trigger().await.unwrap(),
            TriggerOutcome::AlreadyInProgress
        );
        // No second transition was proposed.
        assert_eq!(group.commit_index(), commit_before);

        let receipt = n1.coordinator.run_local_migration().await.unwrap();
        wait_applied(&n1, receipt.last_index).await;
        assert_eq!(n1.coordinator.trigger().await.unwrap(), TriggerOutcome::AlreadyDone);
        n1.handle.stop().await;
    }

    #[tokio::test]
    async fn test_empty_legacy_marks_immediately() {
        let group = GroupZero::new(0, 1024 * 1024);
        let n1 = spawn_node(&group, 1, LegacyBackend::new());
        n1.coordinator.trigger().await.unwrap();
        let receipt = n1.coordinator.run_local_migration().await.unwrap();
        assert_eq!(receipt.commands, 1);
        wait_applied(&n1, receipt.last_index).await;
        assert_eq!(n1.coordinator.status(), UpgradeStatus::Upgraded);
        n1.handle.stop().await;
    }

    #[tokio::test]
    async fn test_failed_migration_surfaces_not_upgraded() {
        let group = GroupZero::new(0, 1024 * 1024);
        let n1 = spawn_node(&group, 1, legacy_with_role("alice"));
        let n2 = spawn_node(&group, 2, LegacyBackend::new());
        let n3 = spawn_node(&group, 3, LegacyBackend::new());

        n1.coordinator.trigger().await.unwrap();
        wait_applied(&n1, 1).await;

        // Quorum loss fails the migration proposal.
        group.set_alive(2, false);
        group.set_alive(3, false);
        assert!(n1.coordinator.run_local_migration().await.is_err());
        assert_eq!(n1.coordinator.status(), UpgradeStatus::NotUpgraded);

        // Restoring quorum and retrying recovers; ops are idempotent.
        group.set_alive(2, true);
        group.set_alive(3, true);
        let receipt = n1.coordinator.run_local_migration().await.unwrap();
        wait_applied(&n1, receipt.last_index).await;
        assert_eq!(n1.coordinator.status(), UpgradeStatus::InProgress);
        n1.handle.stop().await;
        n2.handle.stop().await;
        n3.handle.stop().await;
    }
}
