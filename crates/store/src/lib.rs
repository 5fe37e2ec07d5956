//! The replicated auth store for FerroDB.
//!
//! Auth metadata (roles, role membership, permission grants) is replicated
//! through the group-zero command log and materialized into deterministic
//! per-node tables. This crate provides everything above the log:
//!
//! - [`tables`] — the materialized auth tables and their apply semantics
//! - [`state_machine`] — the per-node state machine behind the apply loop
//! - [`splitter`] — logical mutations packed into size-limited commands
//! - [`barrier`] — the read barrier for read-your-writes consistency
//! - [`cache`] — the per-node TTL'd permissions cache
//! - [`legacy`] — the pre-upgrade backend and the shared read trait
//! - [`upgrade`] — the legacy-to-consensus upgrade coordinator
//! - [`passwords`] — salted credential hashing for login checks
//! - [`service`] — the per-node [`AuthService`] facade

#![deny(unsafe_code)]

pub mod barrier;
pub mod cache;
pub mod legacy;
pub mod passwords;
pub mod service;
pub mod splitter;
pub mod state_machine;
pub mod tables;
pub mod upgrade;

pub use barrier::ReadBarrier;
pub use cache::PermissionsCache;
pub use legacy::{AuthBackend, LegacyBackend};
pub use service::{AuthService, RoleOptions};
pub use splitter::propose_logical_mutation;
pub use state_machine::AuthStateMachine;
pub use tables::AuthTables;
pub use upgrade::{TriggerOutcome, UpgradeCoordinator};
