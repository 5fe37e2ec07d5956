//! The auth tables and their deterministic apply semantics.
//!
//! [`AuthTables`] holds the materialized contents of the replicated auth
//! tables: `roles`, `role_members`, `role_permissions`, and the single-row
//! `auth_version`. Applying the same command sequence to two empty instances
//! yields equal instances, and the postcard encoding of equal instances is
//! byte-identical (all collections are ordered), which is what snapshot
//! equivalence rests on.
//!
//! Row operations are idempotent: puts overwrite, deletes are
//! delete-if-exists, and upgrade-state transitions that do not move forward
//! are ignored.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::info;

use ferrodb_auth_types::codec::{self, CodecError};
use ferrodb_auth_types::{
    GrantKey, GrantRow, PermissionSet, ResourceId, RoleName, RoleRecord, RowOp,
    UpgradeState, VersionRow,
};

/// Materialized auth tables, the state behind the group-zero state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTables {
    roles: BTreeMap<RoleName, RoleRecord>,
    /// `(role, member)` pairs: `member` was granted `role`.
    role_members: BTreeSet<(RoleName, RoleName)>,
    role_permissions: BTreeMap<GrantKey, PermissionSet>,
    version: VersionRow,
}

impl AuthTables {
    /// Applies one row operation in place.
    ///
    /// Membership rows are mirrored into the member's `member_of` set so that
    /// role lookups carry direct memberships without a join.
    pub fn apply_op(&mut self, op: &RowOp) {
        match op {
            RowOp::PutRole { name, record } => {
                self.roles.insert(name.clone(), record.clone());
            },
            RowOp::DeleteRole { name } => {
                self.roles.remove(name);
            },
            RowOp::PutMember { role, member } => {
                self.role_members.insert((role.clone(), member.clone()));
                if let Some(record) = self.roles.get_mut(member) {
                    record.member_of.insert(role.clone());
                }
            },
            RowOp::DeleteMember { role, member } => {
                self.role_members.remove(&(role.clone(), member.clone()));
                if let Some(record) = self.roles.get_mut(member) {
                    record.member_of.remove(role);
                }
            },
            RowOp::PutGrant { grantee, resource, permissions } => {
                self.role_permissions
                    .insert((grantee.clone(), resource.clone()), permissions.clone());
            },
            RowOp::MergeGrant { grantee, resource, permissions } => {
                self.role_permissions
                    .entry((grantee.clone(), resource.clone()))
                    .or_default()
                    .extend(permissions.iter().copied());
            },
            RowOp::SubtractGrant { grantee, resource, permissions } => {
                let key = (grantee.clone(), resource.clone());
                if let Some(existing) = self.role_permissions.get_mut(&key) {
                    existing.retain(|p| !permissions.contains(p));
                    if existing.is_empty() {
                        self.role_permissions.remove(&key);
                    }
                }
            },
            RowOp::DeleteGrant { grantee, resource } => {
                self.role_permissions.remove(&(grantee.clone(), resource.clone()));
            },
            RowOp::SetUpgradeState { state, voters } => {
                // Transitions are monotonic; replays and re-triggers are no-ops.
                if *state > self.version.upgrade_state {
                    info!(from = %self.version.upgrade_state, to = %state, "Upgrade state advanced");
                    self.version.upgrade_state = *state;
                    if *state == UpgradeState::InProgress {
                        self.version.voters = voters.clone();
                    }
                }
            },
            RowOp::MarkNodeMigrated { node } => {
                self.version.migrated_nodes.insert(*node);
                self.maybe_finish_upgrade();
            },
        }
    }

    /// Advances the upgrade to `Done` when every voter captured at trigger
    /// time has migrated. Runs inside apply, so the transition lands at the
    /// same log index on every node.
    fn maybe_finish_upgrade(&mut self) {
        if self.version.upgrade_state == UpgradeState::InProgress
            && !self.version.voters.is_empty()
            && self.version.voters.iter().all(|n| self.version.migrated_nodes.contains(n))
        {
            info!(voters = self.version.voters.len(), "All voters migrated, upgrade done");
            self.version.upgrade_state = UpgradeState::Done;
        }
    }

    /// Looks up a role row.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&RoleRecord> {
        self.roles.get(name)
    }

    /// All role names, sorted.
    #[must_use]
    pub fn list_roles(&self) -> Vec<RoleName> {
        self.roles.keys().cloned().collect()
    }

    /// Number of role rows.
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// The single `auth_version` row.
    #[must_use]
    pub fn version(&self) -> &VersionRow {
        &self.version
    }

    /// Permissions granted directly to `grantee` on `resource`.
    #[must_use]
    pub fn direct_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        self.role_permissions
            .get(&(grantee.to_string(), resource.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Permissions `grantee` holds on `resource`, including permissions
    /// inherited through role membership. The membership graph may contain
    /// cycles; each role is visited once.
    #[must_use]
    pub fn effective_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        let mut effective = PermissionSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([grantee.to_string()]);
        while let Some(role) = queue.pop_front() {
            if !visited.insert(role.clone()) {
                continue;
            }
            effective.extend(self.direct_permissions(&role, resource));
            if let Some(record) = self.roles.get(&role) {
                queue.extend(record.member_of.iter().cloned());
            }
        }
        effective
    }

    /// All grant rows, sorted by `(grantee, resource)`.
    #[must_use]
    pub fn list_grants(&self) -> Vec<GrantRow> {
        self.role_permissions
            .iter()
            .map(|((grantee, resource), permissions)| GrantRow {
                grantee: grantee.clone(),
                resource: resource.clone(),
                permissions: permissions.clone(),
            })
            .collect()
    }

    /// Grant rows referencing `name` as grantee or as a role resource.
    /// These are the rows a cascading role drop must delete.
    #[must_use]
    pub fn grants_referencing(&self, name: &str) -> Vec<GrantKey> {
        self.role_permissions
            .keys()
            .filter(|(grantee, resource)| {
                grantee == name || resource.role_name() == Some(name)
            })
            .cloned()
            .collect()
    }

    /// Membership rows referencing `name` as role or member.
    #[must_use]
    pub fn memberships_referencing(&self, name: &str) -> Vec<(RoleName, RoleName)> {
        self.role_members
            .iter()
            .filter(|(role, member)| role == name || member == name)
            .cloned()
            .collect()
    }

    /// Grant rows whose grantee or role resource no longer exists in `roles`.
    /// Empty after any fully-committed logical mutation.
    #[must_use]
    pub fn dangling_grants(&self) -> Vec<GrantKey> {
        self.role_permissions
            .keys()
            .filter(|(grantee, resource)| {
                !self.roles.contains_key(grantee)
                    || resource
                        .role_name()
                        .is_some_and(|role| !self.roles.contains_key(role))
            })
            .cloned()
            .collect()
    }

    /// Encodes the full table contents for a snapshot payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if postcard encoding fails.
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Decodes table contents from a snapshot payload.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the payload is not a valid encoding.
    pub fn from_snapshot_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        codec::decode(bytes)
    }
}
