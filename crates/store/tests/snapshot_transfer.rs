//! Snapshot transfer integration tests: joiners bootstrapping from a
//! snapshot, lagging nodes crossing compacted history, and equivalence of
//! snapshot-installed state with fully replayed state.

mod common;

use ferrodb_auth_store::RoleOptions;
use ferrodb_auth_test_utils::test_auth_config;
use ferrodb_auth_types::ResourceId;

use common::TestCluster;

async fn commit_roles(cluster: &TestCluster, n: usize) {
    let leader = &cluster.leader().service;
    for i in 0..n {
        leader
            .create_role(&format!("snap_{i:02}"), RoleOptions::login_with_password("pw"))
            .await
            .expect("create role");
    }
}

fn table_image(cluster: &TestCluster, id: u64) -> Vec<u8> {
    cluster
        .node(id)
        .sm
        .read(|t| t.to_snapshot_bytes().expect("encode tables"))
}

#[tokio::test]
async fn test_joiner_bootstraps_from_snapshot() {
    let mut cluster = TestCluster::upgraded(1, test_auth_config()).await;
    commit_roles(&cluster, 17).await;
    cluster.settle().await;

    let snapshot_index = cluster.trigger_snapshot_from(1);
    assert_eq!(snapshot_index, cluster.group.commit_index());

    // History below the snapshot is gone; the joiner must come up through
    // the snapshot alone and match the source byte for byte.
    cluster.add_node(2);
    cluster.settle().await;
    assert_eq!(table_image(&cluster, 2), table_image(&cluster, 1));
    cluster.node(2).service.authenticate("snap_00", "pw").expect("login on joiner");
}

#[tokio::test]
async fn test_snapshot_with_zero_mutations() {
    let mut cluster = TestCluster::upgraded(1, test_auth_config()).await;
    // No mutations beyond the upgrade itself.
    cluster.trigger_snapshot_from(1);
    cluster.add_node(2);
    cluster.settle().await;
    assert_eq!(table_image(&cluster, 2), table_image(&cluster, 1));
    assert_eq!(
        cluster.node(2).service.list_roles(),
        vec!["cassandra".to_string()]
    );
}

#[tokio::test]
async fn test_lagging_node_crosses_compaction() {
    let mut cluster = TestCluster::upgraded(3, test_auth_config()).await;
    commit_roles(&cluster, 5).await;
    cluster.settle().await;

    cluster.stop_node(3).await;
    commit_roles(&cluster, 5).await;
    cluster.trigger_snapshot_from(1);

    // Node 3 wakes up behind the retention horizon and must install the
    // snapshot before resuming ordered apply.
    cluster.restart_node(3);
    commit_roles(&cluster, 2).await;
    cluster.settle().await;
    assert_eq!(table_image(&cluster, 3), table_image(&cluster, 1));
}

#[tokio::test]
async fn test_snapshot_state_equals_replayed_state() {
    let mut cluster = TestCluster::upgraded(1, test_auth_config()).await;
    commit_roles(&cluster, 8).await;
    let leader = &cluster.leader().service;
    leader
        .grant_permissions(
            "snap_00",
            &ResourceId::data("ks", "t"),
            &ferrodb_auth_types::all_permissions(),
        )
        .await
        .expect("grant");
    cluster.settle().await;

    // Node 2 replays the full log (no compaction yet), node 3 joins after
    // compaction and installs the snapshot. Same state either way.
    cluster.add_node(2);
    cluster.settle().await;
    cluster.trigger_snapshot_from(1);
    cluster.add_node(3);
    cluster.settle().await;

    assert_eq!(table_image(&cluster, 2), table_image(&cluster, 1));
    assert_eq!(table_image(&cluster, 3), table_image(&cluster, 2));
}

#[tokio::test]
async fn test_retriggered_snapshot_without_new_commits_is_stable() {
    let mut cluster = TestCluster::upgraded(1, test_auth_config()).await;
    commit_roles(&cluster, 3).await;
    cluster.settle().await;
    let first = cluster.trigger_snapshot_from(1);
    let second = cluster.trigger_snapshot_from(1);
    assert_eq!(first, second);

    cluster.add_node(2);
    cluster.settle().await;
    assert_eq!(table_image(&cluster, 2), table_image(&cluster, 1));
}
