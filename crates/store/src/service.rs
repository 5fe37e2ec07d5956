//! The per-node auth service facade.
//!
//! [`AuthService`] is what query execution talks to on each node: role and
//! permission mutations, local reads with or without a barrier, login
//! checks, and the upgrade surface. Until the upgrade reaches `Done` the
//! service reads and writes the node's legacy table; afterwards every
//! mutation becomes a logical mutation through the splitter and every read
//! comes from the replicated tables.
//!
//! Role mutations are accepted only on the leader and surface `NotLeader`
//! elsewhere. Reads and login checks never touch the log, so they keep
//! working on a node cut off from quorum.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use ferrodb_auth_log::GroupZero;
use ferrodb_auth_types::{
    AuthConfig, AuthError, CommitReceipt, DEFAULT_SUPERUSER_NAME, NodeId,
    PermissionSet, ResourceId, Result, RoleName, RoleRecord, RowOp, UpgradeState,
    UpgradeStatus,
};

use crate::barrier::ReadBarrier;
use crate::cache::PermissionsCache;
use crate::legacy::{AuthBackend, LegacyBackend};
use crate::passwords;
use crate::splitter::propose_logical_mutation;
use crate::state_machine::AuthStateMachine;
use crate::tables::AuthTables;
use crate::upgrade::{TriggerOutcome, UpgradeCoordinator};

/// Options for role creation and alteration. `None` leaves the current
/// value (or the default, on create) untouched.
#[derive(Debug, Clone, Default)]
pub struct RoleOptions {
    /// Whether the role may log in.
    pub can_login: Option<bool>,
    /// Whether the role is a superuser.
    pub is_superuser: Option<bool>,
    /// Plaintext password to hash and store; `None` keeps the credential.
    pub password: Option<String>,
}

impl RoleOptions {
    /// Options for a plain login role with a password.
    #[must_use]
    pub fn login_with_password(password: &str) -> Self {
        Self {
            can_login: Some(true),
            is_superuser: None,
            password: Some(password.to_string()),
        }
    }

    fn apply_to(&self, record: &mut RoleRecord) {
        if let Some(can_login) = self.can_login {
            record.can_login = can_login;
        }
        if let Some(is_superuser) = self.is_superuser {
            record.is_superuser = is_superuser;
        }
        if let Some(password) = &self.password {
            record.salted_credential = Some(passwords::hash_password(password));
        }
    }
}

/// One node's auth service.
pub struct AuthService {
    node: NodeId,
    config: AuthConfig,
    group: Arc<GroupZero>,
    sm: Arc<AuthStateMachine>,
    legacy: Arc<LegacyBackend>,
    cache: PermissionsCache,
    barrier: ReadBarrier,
    upgrade: UpgradeCoordinator,
}

impl AuthService {
    /// Creates the service for `node`.
    #[must_use]
    pub fn new(
        node: NodeId,
        group: Arc<GroupZero>,
        sm: Arc<AuthStateMachine>,
        legacy: Arc<LegacyBackend>,
        config: AuthConfig,
    ) -> Self {
        let cache = PermissionsCache::new(config.permissions_validity());
        let barrier = ReadBarrier::new(group.clone(), sm.subscribe_applied());
        let upgrade = UpgradeCoordinator::new(
            node,
            group.clone(),
            sm.clone(),
            legacy.clone(),
            config.proposal_timeout(),
        );
        Self { node, config, group, sm, legacy, cache, barrier, upgrade }
    }

    /// Node this service runs on.
    #[must_use]
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Whether reads are served from the replicated tables.
    fn upgraded(&self) -> bool {
        self.sm.read(|t| t.version().upgrade_state) == UpgradeState::Done
    }

    fn active_backend(&self) -> &dyn AuthBackend {
        if self.upgraded() {
            self.sm.as_ref()
        } else {
            self.legacy.as_ref()
        }
    }

    // ========================================================================
    // Role mutations
    // ========================================================================

    /// Creates a role.
    ///
    /// # Errors
    ///
    /// [`AuthError::RoleAlreadyExists`], plus proposal failures
    /// (`NotLeader`, `NoQuorum`, timeouts) on the replicated path.
    pub async fn create_role(&self, name: &str, options: RoleOptions) -> Result<()> {
        if self.active_backend().role(name).is_some() {
            return Err(AuthError::RoleAlreadyExists { name: name.to_string() });
        }
        let mut record = RoleRecord::default();
        options.apply_to(&mut record);

        if self.upgraded() {
            self.propose(vec![RowOp::PutRole { name: name.to_string(), record }])
                .await?;
        } else {
            self.legacy.upsert_role(name, record);
        }
        info!(node = self.node, role = name, "Role created");
        Ok(())
    }

    /// Alters an existing role.
    ///
    /// # Errors
    ///
    /// [`AuthError::RoleNotFound`], plus proposal failures on the
    /// replicated path.
    pub async fn alter_role(&self, name: &str, options: RoleOptions) -> Result<()> {
        let mut record = self
            .active_backend()
            .role(name)
            .ok_or_else(|| AuthError::RoleNotFound { name: name.to_string() })?;
        options.apply_to(&mut record);

        if self.upgraded() {
            self.propose(vec![RowOp::PutRole { name: name.to_string(), record }])
                .await?;
        } else {
            self.legacy.upsert_role(name, record);
        }
        Ok(())
    }

    /// Drops a role and everything referencing it: grants held by the role,
    /// grants on the role as a resource, and memberships in both directions.
    ///
    /// The cascade is one logical mutation; when it exceeds the command size
    /// it is split, with referencing rows deleted before the role row so no
    /// intermediate state carries a grant pointing at a missing role.
    ///
    /// # Errors
    ///
    /// [`AuthError::RoleNotFound`], [`AuthError::PartialFailure`] if a split
    /// cascade fails midway (safe to retry), plus other proposal failures.
    pub async fn drop_role(&self, name: &str) -> Result<()> {
        if self.active_backend().role(name).is_none() {
            return Err(AuthError::RoleNotFound { name: name.to_string() });
        }

        if !self.upgraded() {
            self.legacy.remove_role(name);
            return Ok(());
        }

        let mut ops = Vec::new();
        self.sm.read(|tables| {
            for (grantee, resource) in tables.grants_referencing(name) {
                ops.push(RowOp::DeleteGrant { grantee, resource });
            }
            for (role, member) in tables.memberships_referencing(name) {
                ops.push(RowOp::DeleteMember { role, member });
            }
        });
        ops.push(RowOp::DeleteRole { name: name.to_string() });

        let receipt = self.propose(ops).await?;
        debug!(
            node = self.node,
            role = name,
            commands = receipt.commands,
            "Role dropped with cascade"
        );
        Ok(())
    }

    /// Grants `role` to `member`.
    ///
    /// # Errors
    ///
    /// [`AuthError::RoleNotFound`] when either role is missing, plus
    /// proposal failures on the replicated path.
    pub async fn grant_role(&self, role: &str, member: &str) -> Result<()> {
        for name in [role, member] {
            if self.active_backend().role(name).is_none() {
                return Err(AuthError::RoleNotFound { name: name.to_string() });
            }
        }
        if self.upgraded() {
            self.propose(vec![RowOp::PutMember {
                role: role.to_string(),
                member: member.to_string(),
            }])
            .await?;
        } else {
            self.legacy.grant_role(role, member);
        }
        Ok(())
    }

    /// Revokes `role` from `member`.
    ///
    /// # Errors
    ///
    /// Proposal failures on the replicated path.
    pub async fn revoke_role(&self, role: &str, member: &str) -> Result<()> {
        if self.upgraded() {
            self.propose(vec![RowOp::DeleteMember {
                role: role.to_string(),
                member: member.to_string(),
            }])
            .await?;
        } else {
            self.legacy.revoke_role(role, member);
        }
        Ok(())
    }

    /// Grants permissions on a resource, merging with any existing grant.
    ///
    /// The merge is resolved at apply time against the current row, so
    /// concurrent grants to the same `(grantee, resource)` commute and never
    /// overwrite each other.
    ///
    /// # Errors
    ///
    /// [`AuthError::RoleNotFound`], plus proposal failures on the
    /// replicated path.
    pub async fn grant_permissions(
        &self,
        grantee: &str,
        resource: &ResourceId,
        permissions: &PermissionSet,
    ) -> Result<()> {
        if self.active_backend().role(grantee).is_none() {
            return Err(AuthError::RoleNotFound { name: grantee.to_string() });
        }
        if self.upgraded() {
            self.propose(vec![RowOp::MergeGrant {
                grantee: grantee.to_string(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            }])
            .await?;
        } else {
            self.legacy.merge_grant(grantee, resource.clone(), permissions);
        }
        Ok(())
    }

    /// Revokes permissions on a resource; the grant row is deleted when
    /// nothing remains. Like grants, the subtraction is resolved at apply
    /// time, element-wise.
    ///
    /// # Errors
    ///
    /// Proposal failures on the replicated path.
    pub async fn revoke_permissions(
        &self,
        grantee: &str,
        resource: &ResourceId,
        permissions: &PermissionSet,
    ) -> Result<()> {
        if self.upgraded() {
            self.propose(vec![RowOp::SubtractGrant {
                grantee: grantee.to_string(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            }])
            .await?;
        } else {
            self.legacy.subtract_grant(grantee, resource, permissions);
        }
        Ok(())
    }

    /// Creates the default superuser if it does not exist yet. Called once
    /// on the leader after the consensus-backed tables become authoritative.
    ///
    /// # Errors
    ///
    /// Proposal failures.
    pub async fn ensure_default_superuser(&self) -> Result<()> {
        if !self.upgraded() || self.active_backend().role(DEFAULT_SUPERUSER_NAME).is_some() {
            return Ok(());
        }
        let record = RoleRecord {
            can_login: true,
            is_superuser: true,
            salted_credential: Some(passwords::hash_password(DEFAULT_SUPERUSER_NAME)),
            ..RoleRecord::default()
        };
        self.propose(vec![RowOp::PutRole {
            name: DEFAULT_SUPERUSER_NAME.to_string(),
            record,
        }])
        .await?;
        info!(node = self.node, "Default superuser created");
        Ok(())
    }

    // ========================================================================
    // Reads and login
    // ========================================================================

    /// Looks up a role from the local tables, no barrier.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<RoleRecord> {
        self.active_backend().role(name)
    }

    /// All role names from the local tables, no barrier.
    #[must_use]
    pub fn list_roles(&self) -> Vec<RoleName> {
        self.active_backend().list_roles()
    }

    /// Checks a login attempt against the local tables. Works without
    /// quorum; the error is uniform across unknown role, login disabled,
    /// and bad credential.
    ///
    /// # Errors
    ///
    /// [`AuthError::AuthenticationFailed`].
    pub fn authenticate(&self, name: &str, password: &str) -> Result<()> {
        let failed = || AuthError::AuthenticationFailed { name: name.to_string() };
        let record = self.active_backend().role(name).ok_or_else(failed)?;
        if !record.can_login {
            return Err(failed());
        }
        let credential = record.salted_credential.as_ref().ok_or_else(failed)?;
        if !passwords::verify_password(password, credential) {
            return Err(failed());
        }
        Ok(())
    }

    /// Effective permissions of `grantee` on `resource`, served from the
    /// per-node cache when fresh.
    #[must_use]
    pub fn permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        let applied_index = self.applied_index();
        let key = (grantee.to_string(), resource.clone());
        if let Some(cached) = self.cache.get(&key, applied_index) {
            return cached;
        }
        let computed = self.active_backend().effective_permissions(grantee, resource);
        self.cache.insert(key, computed.clone(), applied_index);
        computed
    }

    /// Waits for the read barrier, then runs a read against the replicated
    /// tables. The closure sees every command committed before this call.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoQuorum`] or [`AuthError::BarrierTimeout`].
    pub async fn read_with_barrier<T>(
        &self,
        read: impl FnOnce(&AuthTables) -> T,
    ) -> Result<T> {
        self.barrier.wait(self.config.barrier_timeout()).await?;
        Ok(self.sm.read(read))
    }

    /// Waits for the read barrier with the configured deadline.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoQuorum`] or [`AuthError::BarrierTimeout`].
    pub async fn barrier(&self) -> Result<u64> {
        self.barrier.wait(self.config.barrier_timeout()).await
    }

    /// Highest log index applied locally.
    #[must_use]
    pub fn applied_index(&self) -> u64 {
        use ferrodb_auth_log::StateMachine as _;
        self.sm.applied_index()
    }

    // ========================================================================
    // Upgrade surface
    // ========================================================================

    /// Starts the cluster-wide upgrade, or reports that it already ran.
    ///
    /// # Errors
    ///
    /// Proposal failures.
    pub async fn upgrade_trigger(&self) -> Result<TriggerOutcome> {
        self.upgrade.trigger().await
    }

    /// Migrates this node's legacy rows into group zero.
    ///
    /// # Errors
    ///
    /// Proposal failures, including [`AuthError::PartialFailure`].
    pub async fn run_local_migration(&self) -> Result<CommitReceipt> {
        self.upgrade.run_local_migration().await
    }

    /// This node's view of the upgrade.
    #[must_use]
    pub fn upgrade_status(&self) -> UpgradeStatus {
        self.upgrade.status()
    }

    // ========================================================================
    // Background refresh
    // ========================================================================

    /// Spawns the periodic cache refresh task, or returns `None` when
    /// refresh is disabled. The task runs until aborted by the caller.
    #[must_use]
    pub fn spawn_cache_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let interval = self.config.permissions_update_interval()?;
        let service = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let applied_index = service.applied_index();
                service.cache.refresh_all(applied_index, |grantee, resource| {
                    service.active_backend().effective_permissions(grantee, resource)
                });
            }
        }))
    }

    async fn propose(&self, ops: Vec<RowOp>) -> Result<CommitReceipt> {
        let receipt = propose_logical_mutation(
            &self.group,
            self.node,
            ops,
            self.config.proposal_timeout(),
        )
        .await?;
        self.wait_local_apply(receipt.last_index, self.config.proposal_timeout())
            .await;
        Ok(receipt)
    }

    /// Best-effort wait for this node's apply loop to catch up to its own
    /// mutation, giving same-node read-your-writes without a barrier.
    async fn wait_local_apply(&self, index: u64, timeout: Duration) {
        let mut applied = self.sm.subscribe_applied();
        let _ = tokio::time::timeout(timeout, applied.wait_for(|&v| v >= index)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use ferrodb_auth_log::NodeHandle;
    use ferrodb_auth_types::{Permission, all_permissions};

    use super::*;

    async fn upgraded_service() -> (Arc<GroupZero>, Arc<AuthService>, NodeHandle) {
        let config = AuthConfig::default();
        let group = GroupZero::new(0, config.max_command_size);
        group.add_voter(1);
        let sm = Arc::new(AuthStateMachine::new());
        let handle = NodeHandle::start(1, group.clone(), sm.clone());
        let service = Arc::new(AuthService::new(
            1,
            group.clone(),
            sm,
            Arc::new(LegacyBackend::new()),
            config,
        ));
        service.upgrade_trigger().await.unwrap();
        service.barrier().await.unwrap();
        service.run_local_migration().await.unwrap();
        service.barrier().await.unwrap();
        service.ensure_default_superuser().await.unwrap();
        (group, service, handle)
    }

    #[tokio::test]
    async fn test_create_and_authenticate() {
        let (_group, service, handle) = upgraded_service().await;
        service
            .create_role("alice", RoleOptions::login_with_password("pw"))
            .await
            .unwrap();
        service.authenticate("alice", "pw").unwrap();
        assert!(service.authenticate("alice", "wrong").is_err());
        assert_eq!(service.list_roles(), vec!["alice".to_string(), "cassandra".to_string()]);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_default_superuser_can_log_in() {
        let (_group, service, handle) = upgraded_service().await;
        service.authenticate("cassandra", "cassandra").unwrap();
        let record = service.role("cassandra").unwrap();
        assert!(record.is_superuser);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("alice", RoleOptions::default()).await.unwrap();
        let err = service.create_role("alice", RoleOptions::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::RoleAlreadyExists { .. }));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_alter_changes_password() {
        let (_group, service, handle) = upgraded_service().await;
        service
            .create_role("alice", RoleOptions::login_with_password("old"))
            .await
            .unwrap();
        service
            .alter_role("alice", RoleOptions { password: Some("new".to_string()), ..RoleOptions::default() })
            .await
            .unwrap();
        assert!(service.authenticate("alice", "old").is_err());
        service.authenticate("alice", "new").unwrap();

        let err = service.alter_role("ghost", RoleOptions::default()).await.unwrap_err();
        assert!(matches!(err, AuthError::RoleNotFound { .. }));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_authentication_failure_is_uniform() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("nologin", RoleOptions::default()).await.unwrap();
        let missing = service.authenticate("ghost", "pw").unwrap_err().to_string();
        let disabled = service.authenticate("nologin", "pw").unwrap_err().to_string();
        assert_eq!(missing.replace("ghost", "x"), disabled.replace("nologin", "x"));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_drop_role_cascades() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("shared", RoleOptions::default()).await.unwrap();
        service.create_role("reader", RoleOptions::default()).await.unwrap();
        service.grant_role("shared", "reader").await.unwrap();
        service
            .grant_permissions("reader", &ResourceId::role("shared"), &all_permissions())
            .await
            .unwrap();
        service
            .grant_permissions("shared", &ResourceId::data("ks", "t"), &all_permissions())
            .await
            .unwrap();

        service.drop_role("shared").await.unwrap();
        let dangling = service.read_with_barrier(|t| t.dangling_grants()).await.unwrap();
        assert!(dangling.is_empty());
        assert!(service.role("reader").unwrap().member_of.is_empty());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_grant_and_revoke_permissions_merge() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("alice", RoleOptions::default()).await.unwrap();
        let res = ResourceId::data("ks", "t");
        let select: PermissionSet = [Permission::Select].into_iter().collect();
        let modify: PermissionSet = [Permission::Modify].into_iter().collect();

        service.grant_permissions("alice", &res, &select).await.unwrap();
        service.grant_permissions("alice", &res, &modify).await.unwrap();
        let both = service.permissions("alice", &res);
        assert!(both.contains(&Permission::Select) && both.contains(&Permission::Modify));

        service.revoke_permissions("alice", &res, &select).await.unwrap();
        assert_eq!(service.permissions("alice", &res), modify);
        service.revoke_permissions("alice", &res, &modify).await.unwrap();
        assert!(service.permissions("alice", &res).is_empty());
        // The empty grant row was deleted, not stored empty.
        assert!(service.read_with_barrier(|t| t.list_grants()).await.unwrap().is_empty());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_grants_to_same_row_both_survive() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("alice", RoleOptions::default()).await.unwrap();
        let res = ResourceId::data("ks", "t");

        // Two tasks granting disjoint permissions to the same row at the
        // same time: whichever order the proposals land in, the apply-time
        // merge must keep both.
        let select_task = {
            let service = Arc::clone(&service);
            let res = res.clone();
            tokio::spawn(async move {
                let select: PermissionSet = [Permission::Select].into_iter().collect();
                service.grant_permissions("alice", &res, &select).await
            })
        };
        let modify_task = {
            let service = Arc::clone(&service);
            let res = res.clone();
            tokio::spawn(async move {
                let modify: PermissionSet = [Permission::Modify].into_iter().collect();
                service.grant_permissions("alice", &res, &modify).await
            })
        };
        select_task.await.unwrap().unwrap();
        modify_task.await.unwrap().unwrap();

        let both = service
            .read_with_barrier(|t| t.direct_permissions("alice", &res))
            .await
            .unwrap();
        assert!(both.contains(&Permission::Select), "lost the Select grant");
        assert!(both.contains(&Permission::Modify), "lost the Modify grant");
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_cached_permissions_invalidate_on_apply() {
        let (_group, service, handle) = upgraded_service().await;
        service.create_role("alice", RoleOptions::default()).await.unwrap();
        let res = ResourceId::data("ks", "t");
        let select: PermissionSet = [Permission::Select].into_iter().collect();
        service.grant_permissions("alice", &res, &select).await.unwrap();
        assert_eq!(service.permissions("alice", &res), select);

        // A later mutation moves the apply index, so the cached entry is
        // bypassed and the fresh grant is visible immediately.
        let modify: PermissionSet = [Permission::Modify].into_iter().collect();
        service.grant_permissions("alice", &res, &modify).await.unwrap();
        assert_eq!(service.permissions("alice", &res).len(), 2);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_mutation_on_follower_is_rejected() {
        let (group, _leader_service, handle) = upgraded_service().await;
        group.add_voter(2);
        let sm = Arc::new(AuthStateMachine::new());
        let follower_handle = NodeHandle::start(2, group.clone(), sm.clone());
        let follower = AuthService::new(
            2,
            group.clone(),
            sm,
            Arc::new(LegacyBackend::new()),
            AuthConfig::default(),
        );
        follower.barrier().await.unwrap();
        let err = follower
            .create_role("alice", RoleOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NotLeader { leader: Some(1) }));
        follower_handle.stop().await;
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_cache_refresh_task_lifecycle() {
        let (_group, service, handle) = upgraded_service().await;
        // Default config has refresh enabled.
        let task = service.spawn_cache_refresh().expect("refresh task");
        service.create_role("alice", RoleOptions::default()).await.unwrap();
        let res = ResourceId::data("ks", "t");
        let select: PermissionSet = [Permission::Select].into_iter().collect();
        service.grant_permissions("alice", &res, &select).await.unwrap();
        // Served values stay correct while the refresh task runs.
        assert_eq!(service.permissions("alice", &res), select);
        task.abort();
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_refresh_disabled_spawns_nothing() {
        let config = AuthConfig {
            permissions_update_interval_in_ms: 0,
            ..AuthConfig::default()
        };
        let group = GroupZero::new(0, config.max_command_size);
        group.add_voter(1);
        let sm = Arc::new(AuthStateMachine::new());
        let handle = NodeHandle::start(1, group.clone(), sm.clone());
        let service = Arc::new(AuthService::new(
            1,
            group,
            sm,
            Arc::new(LegacyBackend::new()),
            config,
        ));
        assert!(service.spawn_cache_refresh().is_none());
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_pre_upgrade_mutations_stay_local() {
        let config = AuthConfig::default();
        let group = GroupZero::new(0, config.max_command_size);
        group.add_voter(1);
        let sm = Arc::new(AuthStateMachine::new());
        let handle = NodeHandle::start(1, group.clone(), sm.clone());
        let service = AuthService::new(
            1,
            group.clone(),
            sm,
            Arc::new(LegacyBackend::new()),
            config,
        );
        service
            .create_role("alice", RoleOptions::login_with_password("pw"))
            .await
            .unwrap();
        service.authenticate("alice", "pw").unwrap();
        // Nothing was proposed: the legacy path never touches the log.
        assert_eq!(group.commit_index(), 0);
        handle.stop().await;
    }
}
