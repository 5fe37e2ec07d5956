//! Group-zero consensus log abstraction for FerroDB Auth.
//!
//! Auth mutations are replicated through a single ordered command log
//! ("group zero"). This crate provides that log at the level the auth store
//! needs it:
//!
//! - [`GroupZero`] — propose a command and it commits in total order, or
//!   fails with a typed error (`NotLeader`, `SizeExceeded`, `NoQuorum`);
//!   plus a lightweight `read_index` for read barriers
//! - [`StateMachine`] — the apply-side contract: committed commands are
//!   applied exactly once, strictly in commit order, per node
//! - [`NodeHandle`] — the per-node apply loop, including snapshot install
//!   when a node lags past log retention
//! - [`snapshot`] — the checksummed snapshot wire format used for state
//!   transfer to lagging or joining nodes
//!
//! Consensus internals (elections, replication RPCs) are below this
//! abstraction and not modeled; the log presents a single global commit
//! order and quorum-gated liveness.

#![deny(unsafe_code)]

pub mod group;
pub mod node;
pub mod snapshot;

pub use group::{GroupZero, Member};
pub use node::{NodeHandle, StateMachine};
pub use snapshot::{SnapshotData, SnapshotError, decode_snapshot, encode_snapshot};
