//! The legacy (pre-upgrade) auth backend.
//!
//! Before the upgrade, auth rows live in a per-node, eventually-consistent
//! table written locally and reconciled out-of-band; nothing about it is
//! ordered or quorum-gated. [`LegacyBackend`] models that table for one
//! node. The service reads through the [`AuthBackend`] trait so the
//! consensus-backed store and the legacy table are interchangeable, and the
//! migration drains the legacy rows through the splitter into group zero.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::Mutex;

use ferrodb_auth_types::{
    LegacyRows, PermissionSet, ResourceId, RoleName, RoleRecord,
};

use crate::state_machine::AuthStateMachine;

/// Read surface shared by the legacy table and the consensus-backed store.
pub trait AuthBackend: Send + Sync {
    /// Looks up a role row.
    fn role(&self, name: &str) -> Option<RoleRecord>;

    /// All role names, sorted.
    fn list_roles(&self) -> Vec<RoleName>;

    /// Permissions `grantee` holds on `resource`, membership included.
    fn effective_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet;
}

/// One node's legacy auth table.
#[derive(Default)]
pub struct LegacyBackend {
    rows: Mutex<LegacyRows>,
}

impl LegacyBackend {
    /// Creates an empty legacy table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a legacy table pre-populated with rows.
    #[must_use]
    pub fn with_rows(rows: LegacyRows) -> Self {
        Self { rows: Mutex::new(rows) }
    }

    /// Inserts or overwrites a role row.
    pub fn upsert_role(&self, name: &str, record: RoleRecord) {
        self.rows.lock().roles.insert(name.to_string(), record);
    }

    /// Deletes a role row and every grant referencing it.
    pub fn remove_role(&self, name: &str) {
        let mut rows = self.rows.lock();
        rows.roles.remove(name);
        rows.grants.retain(|(grantee, resource), _| {
            grantee != name && resource.role_name() != Some(name)
        });
        for record in rows.roles.values_mut() {
            record.member_of.remove(name);
        }
    }

    /// Inserts or overwrites a grant row.
    pub fn upsert_grant(&self, grantee: &str, resource: ResourceId, permissions: PermissionSet) {
        self.rows.lock().grants.insert((grantee.to_string(), resource), permissions);
    }

    /// Unions permissions into a grant row under the table lock, creating
    /// the row if absent.
    pub fn merge_grant(&self, grantee: &str, resource: ResourceId, permissions: &PermissionSet) {
        self.rows
            .lock()
            .grants
            .entry((grantee.to_string(), resource))
            .or_default()
            .extend(permissions.iter().copied());
    }

    /// Removes permissions from a grant row under the table lock, deleting
    /// the row once nothing remains.
    pub fn subtract_grant(&self, grantee: &str, resource: &ResourceId, permissions: &PermissionSet) {
        let mut rows = self.rows.lock();
        let key = (grantee.to_string(), resource.clone());
        if let Some(existing) = rows.grants.get_mut(&key) {
            existing.retain(|p| !permissions.contains(p));
            if existing.is_empty() {
                rows.grants.remove(&key);
            }
        }
    }

    /// Records that `member` is a member of `role`.
    pub fn grant_role(&self, role: &str, member: &str) {
        if let Some(record) = self.rows.lock().roles.get_mut(member) {
            record.member_of.insert(role.to_string());
        }
    }

    /// Removes `member`'s membership of `role` if present.
    pub fn revoke_role(&self, role: &str, member: &str) {
        if let Some(record) = self.rows.lock().roles.get_mut(member) {
            record.member_of.remove(role);
        }
    }

    /// Permissions granted directly to `grantee` on `resource`.
    #[must_use]
    pub fn direct_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        self.rows
            .lock()
            .grants
            .get(&(grantee.to_string(), resource.clone()))
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the table holds no rows. Joiners with an empty legacy table
    /// mark themselves migrated immediately.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let rows = self.rows.lock();
        rows.roles.is_empty() && rows.grants.is_empty()
    }

    /// A copy of every row, in the shape the migration consumes.
    #[must_use]
    pub fn export(&self) -> LegacyRows {
        self.rows.lock().clone()
    }
}

impl AuthBackend for LegacyBackend {
    fn role(&self, name: &str) -> Option<RoleRecord> {
        self.rows.lock().roles.get(name).cloned()
    }

    fn list_roles(&self) -> Vec<RoleName> {
        self.rows.lock().roles.keys().cloned().collect()
    }

    fn effective_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        let rows = self.rows.lock();
        let mut effective = PermissionSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::from([grantee.to_string()]);
        while let Some(role) = queue.pop_front() {
            if !visited.insert(role.clone()) {
                continue;
            }
            if let Some(permissions) = rows.grants.get(&(role.clone(), resource.clone())) {
                effective.extend(permissions.iter().copied());
            }
            if let Some(record) = rows.roles.get(&role) {
                queue.extend(record.member_of.iter().cloned());
            }
        }
        effective
    }
}

impl AuthBackend for AuthStateMachine {
    fn role(&self, name: &str) -> Option<RoleRecord> {
        self.read(|tables| tables.role(name).cloned())
    }

    fn list_roles(&self) -> Vec<RoleName> {
        self.read(|tables| tables.list_roles())
    }

    fn effective_permissions(&self, grantee: &str, resource: &ResourceId) -> PermissionSet {
        self.read(|tables| tables.effective_permissions(grantee, resource))
    }
}
