//! Domain types for the replicated auth store.
//!
//! Roles, permission grants, and the elementary row operations that commands
//! carry through group zero. Collections use `BTreeMap`/`BTreeSet` so that
//! iteration order, and therefore the postcard encoding of snapshots, is
//! deterministic across nodes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Node identifier within the cluster.
pub type NodeId = u64;

/// Identifier of a consensus group. Auth data lives in group zero.
pub type GroupId = u64;

/// Role name, the unique key of a role.
pub type RoleName = String;

/// Name of the default superuser created when the auth tables are bootstrapped.
pub const DEFAULT_SUPERUSER_NAME: &str = "cassandra";

/// Prefix for role resources.
const ROLE_RESOURCE_PREFIX: &str = "role/";

/// Identifier of a resource a permission can be granted on.
///
/// Role resources use the `role/<name>` convention; data resources use
/// `data/<keyspace>/<table>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

impl ResourceId {
    /// Creates a resource identifier for a role.
    #[must_use]
    pub fn role(name: &str) -> Self {
        Self(format!("{ROLE_RESOURCE_PREFIX}{name}"))
    }

    /// Creates a resource identifier for a data resource (keyspace/table).
    #[must_use]
    pub fn data(keyspace: &str, table: &str) -> Self {
        Self(format!("data/{keyspace}/{table}"))
    }

    /// Returns the raw resource string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// If this is a role resource, returns the role name it refers to.
    #[must_use]
    pub fn role_name(&self) -> Option<&str> {
        self.0.strip_prefix(ROLE_RESOURCE_PREFIX)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kind of permission that can be granted on a resource.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Permission {
    /// Create objects under the resource.
    Create,
    /// Alter the resource.
    Alter,
    /// Drop the resource.
    Drop,
    /// Read data from the resource.
    Select,
    /// Write data to the resource.
    Modify,
    /// Grant or revoke permissions on the resource.
    Authorize,
    /// Describe the resource.
    Describe,
}

impl Permission {
    /// All permission kinds, as granted by `GRANT ALL`.
    pub const ALL: [Permission; 7] = [
        Permission::Create,
        Permission::Alter,
        Permission::Drop,
        Permission::Select,
        Permission::Modify,
        Permission::Authorize,
        Permission::Describe,
    ];
}

/// A set of permissions attached to one grant row.
pub type PermissionSet = BTreeSet<Permission>;

/// Returns the full permission set (`GRANT ALL`).
#[must_use]
pub fn all_permissions() -> PermissionSet {
    Permission::ALL.into_iter().collect()
}

/// A role row in the `roles` table.
///
/// Role membership lives in the `role_members` table, not here; `member_of`
/// is maintained alongside it for direct lookup, mirroring the original
/// system's auth cache record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Whether the role may be used to log in.
    pub can_login: bool,
    /// Whether the role is a superuser.
    pub is_superuser: bool,
    /// Roles this role is a member of.
    pub member_of: BTreeSet<RoleName>,
    /// Salted credential blob, present for roles with a password.
    pub salted_credential: Option<Vec<u8>>,
}

/// Cluster-wide state of the legacy-to-consensus auth migration.
///
/// Transitions are monotonic: `NotStarted -> InProgress -> Done`. Applying a
/// transition that does not move forward is a no-op, which makes re-triggering
/// the upgrade idempotent.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum UpgradeState {
    /// Auth data is still served by the legacy replication path.
    #[default]
    NotStarted,
    /// Migration is running; nodes are copying legacy rows into group zero.
    InProgress,
    /// All voting members migrated; the consensus-backed tables are
    /// authoritative.
    Done,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradeState::NotStarted => "not_started",
            UpgradeState::InProgress => "in_progress",
            UpgradeState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Node-level view of the upgrade, polled by operators and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpgradeStatus {
    /// This node has not migrated (upgrade not started, or migration failed).
    NotUpgraded,
    /// The cluster upgrade is running and this node has not finished.
    InProgress,
    /// This node's data is served from the consensus-backed tables.
    Upgraded,
}

impl fmt::Display for UpgradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UpgradeStatus::NotUpgraded => "not_upgraded",
            UpgradeStatus::InProgress => "in_progress",
            UpgradeStatus::Upgraded => "upgraded",
        };
        f.write_str(s)
    }
}

/// An elementary row write or delete against the auth tables.
///
/// Row operations are idempotent: puts overwrite, deletes are
/// delete-if-exists, merges and subtracts are element-wise set updates. A
/// logical mutation that fails partway can therefore be retried wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOp {
    /// Insert or overwrite a role row.
    PutRole {
        /// Role name (unique key).
        name: RoleName,
        /// Full role record.
        record: RoleRecord,
    },
    /// Delete a role row if it exists.
    DeleteRole {
        /// Role name.
        name: RoleName,
    },
    /// Record that `member` is a member of `role`.
    PutMember {
        /// The role granted.
        role: RoleName,
        /// The member receiving it.
        member: RoleName,
    },
    /// Remove a membership row if it exists.
    DeleteMember {
        /// The role.
        role: RoleName,
        /// The member.
        member: RoleName,
    },
    /// Insert or overwrite a permission grant row.
    PutGrant {
        /// Role holding the permissions.
        grantee: RoleName,
        /// Resource the permissions apply to.
        resource: ResourceId,
        /// Permissions granted.
        permissions: PermissionSet,
    },
    /// Union permissions into a grant row, creating the row if absent.
    ///
    /// Merging happens at apply time against the current row, so concurrent
    /// grants to the same `(grantee, resource)` commute instead of
    /// overwriting each other.
    MergeGrant {
        /// Role holding the permissions.
        grantee: RoleName,
        /// Resource the permissions apply to.
        resource: ResourceId,
        /// Permissions to add.
        permissions: PermissionSet,
    },
    /// Remove permissions from a grant row. The row is deleted once nothing
    /// remains. Commutes with concurrent `MergeGrant`s of other permissions.
    SubtractGrant {
        /// Role holding the permissions.
        grantee: RoleName,
        /// Resource the permissions apply to.
        resource: ResourceId,
        /// Permissions to remove.
        permissions: PermissionSet,
    },
    /// Delete a permission grant row if it exists.
    DeleteGrant {
        /// Role holding the permissions.
        grantee: RoleName,
        /// Resource the permissions apply to.
        resource: ResourceId,
    },
    /// Advance the cluster-wide upgrade state. Regressions are ignored.
    SetUpgradeState {
        /// Target state.
        state: UpgradeState,
        /// Voting members at the time the upgrade started. Used to decide
        /// when every voter has migrated.
        voters: BTreeSet<NodeId>,
    },
    /// Record that a node finished migrating its legacy rows.
    MarkNodeMigrated {
        /// The node that finished.
        node: NodeId,
    },
}

/// One consensus command: an atomic batch of row operations.
///
/// The postcard encoding of a command must not exceed the group's
/// `max_command_size` at propose time. A logical mutation larger than that is
/// split into an ordered sequence of commands by the splitter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Row operations applied atomically, in order.
    pub ops: Vec<RowOp>,
}

impl Command {
    /// Creates a command from a list of row operations.
    #[must_use]
    pub fn new(ops: Vec<RowOp>) -> Self {
        Self { ops }
    }
}

/// Receipt returned when a logical mutation fully commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Log index of the first command of the mutation.
    pub first_index: u64,
    /// Log index of the last command of the mutation.
    pub last_index: u64,
    /// Number of commands the mutation was split into.
    pub commands: usize,
}

/// The single row of the `auth_version` table: upgrade progress plus the
/// identifier of the group that replicates auth data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRow {
    /// Group replicating the auth tables.
    pub group: GroupId,
    /// Cluster-wide upgrade state.
    pub upgrade_state: UpgradeState,
    /// Voting members captured when the upgrade started.
    pub voters: BTreeSet<NodeId>,
    /// Nodes that completed their local migration.
    pub migrated_nodes: BTreeSet<NodeId>,
}

/// A permission grant row, as returned by read queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRow {
    /// Role holding the permissions.
    pub grantee: RoleName,
    /// Resource the permissions apply to.
    pub resource: ResourceId,
    /// Permissions granted.
    pub permissions: PermissionSet,
}

/// Convenience alias for the grants table key.
pub type GrantKey = (RoleName, ResourceId);

/// Legacy auth rows carried by a node before the upgrade, in the shape the
/// migration consumes them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRows {
    /// Role rows.
    pub roles: BTreeMap<RoleName, RoleRecord>,
    /// Grant rows.
    pub grants: BTreeMap<GrantKey, PermissionSet>,
}
