//! In-process cluster harness for auth store integration tests.
//!
//! Nodes share nothing but the group-zero log: each has its own state
//! machine, apply loop, legacy table, and service. Stopping a node halts
//! its apply loop and marks it unreachable for quorum accounting.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ferrodb_auth_log::{GroupZero, NodeHandle, StateMachine};
use ferrodb_auth_store::{AuthService, AuthStateMachine, LegacyBackend};
use ferrodb_auth_types::{AuthConfig, LegacyRows, NodeId};

/// One node of the test cluster.
pub struct TestNode {
    pub id: NodeId,
    pub sm: Arc<AuthStateMachine>,
    pub legacy: Arc<LegacyBackend>,
    pub service: Arc<AuthService>,
    handle: Option<NodeHandle>,
}

impl TestNode {
    /// Whether the node's apply loop is running.
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

/// A cluster of auth nodes over one shared group-zero log.
pub struct TestCluster {
    pub group: Arc<GroupZero>,
    pub nodes: BTreeMap<NodeId, TestNode>,
    config: AuthConfig,
}

impl TestCluster {
    /// Builds a cluster of `n` voters with empty legacy tables, not yet
    /// upgraded.
    pub fn new(n: usize, config: AuthConfig) -> Self {
        Self::with_legacy((1..=n as NodeId).map(|id| (id, LegacyRows::default())).collect(), config)
    }

    /// Builds a cluster where each node starts with the given legacy rows.
    pub fn with_legacy(seeds: Vec<(NodeId, LegacyRows)>, config: AuthConfig) -> Self {
        ferrodb_auth_test_utils::init_test_logging();
        let group = GroupZero::new(0, config.max_command_size);
        let mut cluster = Self { group, nodes: BTreeMap::new(), config };
        for (id, rows) in seeds {
            cluster.add_node_with_legacy(id, rows);
        }
        cluster
    }

    /// Builds a cluster of `n` voters and runs the upgrade to completion,
    /// including the default superuser. Most tests start here.
    pub async fn upgraded(n: usize, config: AuthConfig) -> Self {
        let cluster = Self::new(n, config);
        cluster.run_upgrade().await;
        cluster
    }

    /// Adds a fresh voter with an empty legacy table and starts its apply
    /// loop. A joiner that lags past retention bootstraps from the latest
    /// snapshot.
    pub fn add_node(&mut self, id: NodeId) -> &TestNode {
        self.add_node_with_legacy(id, LegacyRows::default())
    }

    fn add_node_with_legacy(&mut self, id: NodeId, rows: LegacyRows) -> &TestNode {
        self.group.add_voter(id);
        let sm = Arc::new(AuthStateMachine::new());
        let legacy = Arc::new(LegacyBackend::with_rows(rows));
        let handle = NodeHandle::start(id, self.group.clone(), sm.clone());
        let service = Arc::new(AuthService::new(
            id,
            self.group.clone(),
            sm.clone(),
            legacy.clone(),
            self.config.clone(),
        ));
        self.nodes.insert(id, TestNode { id, sm, legacy, service, handle: Some(handle) });
        &self.nodes[&id]
    }

    /// Stops a node: halts its apply loop and marks it unreachable.
    pub async fn stop_node(&mut self, id: NodeId) {
        self.group.set_alive(id, false);
        if let Some(node) = self.nodes.get_mut(&id) {
            if let Some(handle) = node.handle.take() {
                handle.stop().await;
            }
        }
    }

    /// Restarts a stopped node's apply loop with its existing state and
    /// marks it reachable again.
    pub fn restart_node(&mut self, id: NodeId) {
        self.group.set_alive(id, true);
        if let Some(node) = self.nodes.get_mut(&id) {
            if node.handle.is_none() {
                node.handle =
                    Some(NodeHandle::start(id, self.group.clone(), node.sm.clone()));
            }
        }
    }

    /// The current leader's node.
    pub fn leader(&self) -> &TestNode {
        let id = self.group.leader().expect("cluster has a leader");
        &self.nodes[&id]
    }

    /// A specific node.
    pub fn node(&self, id: NodeId) -> &TestNode {
        &self.nodes[&id]
    }

    /// Waits until every running node has applied everything committed.
    pub async fn settle(&self) {
        let target = self.group.commit_index();
        for node in self.nodes.values().filter(|n| n.is_running()) {
            let mut applied = node.sm.subscribe_applied();
            tokio::time::timeout(
                Duration::from_secs(5),
                applied.wait_for(|&index| index >= target),
            )
            .await
            .unwrap_or_else(|_| panic!("node {} stuck below index {target}", node.id))
            .expect("applied watch open");
        }
    }

    /// Runs the full upgrade: trigger, per-node migration, default
    /// superuser. Ends with every node settled at `Done`.
    pub async fn run_upgrade(&self) {
        let leader = self.leader();
        leader.service.upgrade_trigger().await.expect("trigger upgrade");
        self.settle().await;
        for node in self.nodes.values().filter(|n| n.is_running()) {
            node.service.run_local_migration().await.expect("migrate node");
        }
        self.settle().await;
        leader.service.ensure_default_superuser().await.expect("default superuser");
        self.settle().await;
    }

    /// Captures a snapshot from `id`'s state machine and compacts the log.
    pub fn trigger_snapshot_from(&self, id: NodeId) -> u64 {
        self.group
            .trigger_snapshot(self.nodes[&id].sm.as_ref() as &dyn StateMachine)
            .expect("trigger snapshot")
    }
}
