//! The group-zero replicated command log.
//!
//! [`GroupZero`] is the single coordination point between nodes: an ordered
//! log of opaque commands with one global commit index, a known leader, and
//! quorum-gated liveness. Nodes never share memory with each other — each
//! node observes the log through its own [`crate::NodeHandle`] and applies
//! committed entries to its own state machine.
//!
//! Proposals are rejected with a typed error when the proposer is not the
//! leader, the command exceeds `max_command_size`, or a majority of voting
//! members is unreachable. `read_index` returns the current commit index
//! through the same quorum gate without appending anything, which is what
//! read barriers use.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use ferrodb_auth_types::{GroupId, LogError, NodeId};

use crate::node::StateMachine;
use crate::snapshot::{SnapshotData, encode_snapshot};

/// A member of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    /// Whether the member votes towards quorum.
    pub voter: bool,
    /// Whether the member is currently reachable.
    pub alive: bool,
}

struct GroupInner {
    /// Committed entries; `entries[0]` has index `first_index`.
    entries: VecDeque<Arc<Vec<u8>>>,
    /// Index of the first retained entry. Log indexes start at 1.
    first_index: u64,
    /// Highest committed index.
    commit_index: u64,
    /// Current leader, if any.
    leader: Option<NodeId>,
    /// Group membership.
    members: BTreeMap<NodeId, Member>,
    /// Maximum serialized command size accepted at propose time.
    max_command_size: usize,
    /// Latest snapshot, encoded in wire format, with its last index.
    snapshot: Option<(u64, Arc<Vec<u8>>)>,
    /// Error injection: reject the next propose as oversized regardless of
    /// actual size. Mirrors the command-is-too-big path where size must be
    /// discovered empirically.
    reject_oversize_once: bool,
    /// Whether the group has been shut down.
    shutdown: bool,
}

/// The replicated auth command log ("Raft group zero").
pub struct GroupZero {
    id: GroupId,
    inner: Mutex<GroupInner>,
    commit_tx: watch::Sender<u64>,
}

impl GroupZero {
    /// Creates an empty group with no members and no leader.
    #[must_use]
    pub fn new(id: GroupId, max_command_size: usize) -> Arc<Self> {
        let (commit_tx, _) = watch::channel(0);
        Arc::new(Self {
            id,
            inner: Mutex::new(GroupInner {
                entries: VecDeque::new(),
                first_index: 1,
                commit_index: 0,
                leader: None,
                members: BTreeMap::new(),
                max_command_size,
                snapshot: None,
                reject_oversize_once: false,
                shutdown: false,
            }),
            commit_tx,
        })
    }

    /// Group identifier.
    #[must_use]
    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Adds a voting member. The first voter added becomes leader.
    pub fn add_voter(&self, node: NodeId) {
        let mut inner = self.inner.lock();
        inner.members.insert(node, Member { voter: true, alive: true });
        if inner.leader.is_none() {
            inner.leader = Some(node);
            info!(group = self.id, node, "Initial leader elected");
        }
    }

    /// Marks a member reachable or unreachable. Stopping the leader leaves
    /// the group leaderless until [`set_leader`](Self::set_leader) is called.
    pub fn set_alive(&self, node: NodeId, alive: bool) {
        let mut inner = self.inner.lock();
        if let Some(member) = inner.members.get_mut(&node) {
            member.alive = alive;
        }
        if !alive && inner.leader == Some(node) {
            inner.leader = None;
            warn!(group = self.id, node, "Leader became unreachable");
        }
    }

    /// Sets the current leader.
    pub fn set_leader(&self, node: Option<NodeId>) {
        self.inner.lock().leader = node;
    }

    /// Current leader, if any.
    #[must_use]
    pub fn leader(&self) -> Option<NodeId> {
        self.inner.lock().leader
    }

    /// Voting members of the group.
    #[must_use]
    pub fn voters(&self) -> BTreeSet<NodeId> {
        self.inner
            .lock()
            .members
            .iter()
            .filter(|(_, m)| m.voter)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Current maximum serialized command size.
    #[must_use]
    pub fn max_command_size(&self) -> usize {
        self.inner.lock().max_command_size
    }

    /// Changes the maximum command size at runtime. Proposals already packed
    /// against the old limit are rejected at propose time and re-split.
    pub fn set_max_command_size(&self, max: usize) {
        self.inner.lock().max_command_size = max;
    }

    /// Makes the next propose fail with `SizeExceeded` regardless of the
    /// command's actual size. Test hook for the empirical-rejection path.
    pub fn inject_command_too_big_once(&self) {
        self.inner.lock().reject_oversize_once = true;
    }

    /// Proposes a command. On success the command is committed in total
    /// order and its log index is returned.
    ///
    /// # Errors
    ///
    /// - [`LogError::NotLeader`] if `origin` is not the current leader
    /// - [`LogError::SizeExceeded`] if the command exceeds `max_command_size`
    /// - [`LogError::NoQuorum`] if a majority of voters is unreachable
    /// - [`LogError::Shutdown`] if the group was shut down
    pub fn propose(&self, origin: NodeId, command: Vec<u8>) -> Result<u64, LogError> {
        let index = {
            let mut inner = self.inner.lock();
            if inner.shutdown {
                return Err(LogError::Shutdown);
            }
            if inner.leader != Some(origin) {
                return Err(LogError::NotLeader { leader: inner.leader });
            }
            if inner.reject_oversize_once {
                inner.reject_oversize_once = false;
                debug!(group = self.id, size = command.len(), "Injected oversize rejection");
                return Err(LogError::SizeExceeded {
                    size: command.len(),
                    max: inner.max_command_size,
                });
            }
            if command.len() > inner.max_command_size {
                return Err(LogError::SizeExceeded {
                    size: command.len(),
                    max: inner.max_command_size,
                });
            }
            Self::check_quorum(&inner)?;

            inner.entries.push_back(Arc::new(command));
            inner.commit_index += 1;
            inner.commit_index
        };

        // Send outside the lock; receivers only coalesce on the latest
        // value, and `send_replace` stores it even with no receiver yet.
        self.commit_tx.send_replace(index);
        debug!(group = self.id, index, "Command committed");
        Ok(index)
    }

    /// Returns the current commit index through the quorum gate, without
    /// appending a log entry. Used by read barriers.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NoQuorum`] when a majority of voters is
    /// unreachable, or [`LogError::Shutdown`] after shutdown.
    pub fn read_index(&self) -> Result<u64, LogError> {
        let inner = self.inner.lock();
        if inner.shutdown {
            return Err(LogError::Shutdown);
        }
        Self::check_quorum(&inner)?;
        Ok(inner.commit_index)
    }

    /// Local view of the commit index, without the quorum gate.
    #[must_use]
    pub fn commit_index(&self) -> u64 {
        self.inner.lock().commit_index
    }

    /// Fetches a committed entry by index.
    ///
    /// Returns `Ok(None)` when `index` is beyond the commit index.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Compacted`] when the entry was compacted into a
    /// snapshot, or [`LogError::Shutdown`] after shutdown.
    pub fn entry(&self, index: u64) -> Result<Option<Arc<Vec<u8>>>, LogError> {
        let inner = self.inner.lock();
        if inner.shutdown {
            return Err(LogError::Shutdown);
        }
        if index < inner.first_index {
            return Err(LogError::Compacted {
                requested: index,
                first_available: inner.first_index,
            });
        }
        if index > inner.commit_index {
            return Ok(None);
        }
        let offset = (index - inner.first_index) as usize;
        Ok(inner.entries.get(offset).cloned())
    }

    /// Subscribes to commit-index updates.
    #[must_use]
    pub fn subscribe_commits(&self) -> watch::Receiver<u64> {
        self.commit_tx.subscribe()
    }

    /// Captures a point-in-time snapshot from `source`'s state machine and
    /// compacts the log up to the snapshot index.
    ///
    /// The snapshot reflects everything `source` has applied; entries at or
    /// below that index are dropped from the log, so nodes lagging past it
    /// are served the snapshot instead of replay.
    ///
    /// # Errors
    ///
    /// Propagates state-machine snapshot failures and returns
    /// [`LogError::Shutdown`] after shutdown.
    pub fn trigger_snapshot(&self, source: &dyn StateMachine) -> Result<u64, LogError> {
        // The state machine captures payload and index as one atomic pair;
        // reading the index separately here would race with apply.
        let (last_index, payload) = source.build_snapshot()?;

        let mut inner = self.inner.lock();
        if inner.shutdown {
            return Err(LogError::Shutdown);
        }
        if let Some((existing, _)) = inner.snapshot {
            if existing >= last_index {
                debug!(group = self.id, existing, last_index, "Snapshot already current");
                return Ok(existing);
            }
        }

        let encoded = encode_snapshot(&SnapshotData {
            group: self.id,
            last_index,
            payload,
        });
        inner.snapshot = Some((last_index, Arc::new(encoded)));

        while inner.first_index <= last_index {
            inner.entries.pop_front();
            inner.first_index += 1;
        }
        info!(group = self.id, last_index, "Snapshot captured, log compacted");
        Ok(last_index)
    }

    /// Latest snapshot in wire format, with its last index.
    #[must_use]
    pub fn latest_snapshot(&self) -> Option<(u64, Arc<Vec<u8>>)> {
        self.inner.lock().snapshot.clone()
    }

    /// Shuts the group down. Subsequent operations fail with
    /// [`LogError::Shutdown`]; apply loops observe it and exit.
    pub fn shutdown(&self) {
        self.inner.lock().shutdown = true;
        // Wake apply loops so they observe the shutdown.
        self.commit_tx.send_modify(|_| {});
    }

    fn check_quorum(inner: &GroupInner) -> Result<(), LogError> {
        let voters = inner.members.values().filter(|m| m.voter).count();
        let alive = inner.members.values().filter(|m| m.voter && m.alive).count();
        if voters == 0 || alive * 2 <= voters {
            return Err(LogError::NoQuorum { alive, voters });
        }
        Ok(())
    }
}
