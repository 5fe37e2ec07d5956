//! The auth state machine driven by the group-zero apply loop.
//!
//! One [`AuthStateMachine`] per node. Apply is single-writer (commands from
//! the log, strictly in commit order); reads take a shared lock and may run
//! concurrently with apply, observing between-command state whose staleness
//! the read barrier bounds. The apply index is published through a
//! `tokio::sync::watch` so barriers can wait without polling.

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::debug;

use ferrodb_auth_log::StateMachine;
use ferrodb_auth_types::codec;
use ferrodb_auth_types::{Command, LogError};

use crate::tables::AuthTables;

/// Per-node materialized auth state plus apply-index publication.
pub struct AuthStateMachine {
    tables: RwLock<AuthTables>,
    /// Serializes apply and snapshot install against each other.
    apply_lock: Mutex<()>,
    applied_tx: watch::Sender<u64>,
}

impl Default for AuthStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateMachine {
    /// Creates an empty state machine at apply index 0.
    #[must_use]
    pub fn new() -> Self {
        let (applied_tx, _) = watch::channel(0);
        Self {
            tables: RwLock::new(AuthTables::default()),
            apply_lock: Mutex::new(()),
            applied_tx,
        }
    }

    /// Runs a read closure against the current tables.
    pub fn read<T>(&self, f: impl FnOnce(&AuthTables) -> T) -> T {
        f(&self.tables.read())
    }

    /// Subscribes to apply-index updates. Read barriers wait on this.
    #[must_use]
    pub fn subscribe_applied(&self) -> watch::Receiver<u64> {
        self.applied_tx.subscribe()
    }
}

impl StateMachine for AuthStateMachine {
    fn apply(&self, index: u64, command: &[u8]) -> Result<(), LogError> {
        let command: Command = codec::decode(command)
            .map_err(|e| LogError::StateMachine { message: e.to_string() })?;

        let _guard = self.apply_lock.lock();
        {
            let mut tables = self.tables.write();
            for op in &command.ops {
                tables.apply_op(op);
            }
        }
        // Publish after the write lock drops: a reader woken by the watch
        // always sees the applied state. `send_replace` stores the index
        // even when no barrier is currently subscribed.
        self.applied_tx.send_replace(index);
        debug!(index, ops = command.ops.len(), "Command applied");
        Ok(())
    }

    fn applied_index(&self) -> u64 {
        *self.applied_tx.borrow()
    }

    fn build_snapshot(&self) -> Result<(u64, Vec<u8>), LogError> {
        // Hold the apply lock so the payload and the apply index agree:
        // an apply landing concurrently is either fully in both or in
        // neither.
        let _guard = self.apply_lock.lock();
        let payload = self
            .tables
            .read()
            .to_snapshot_bytes()
            .map_err(|e| LogError::StateMachine { message: e.to_string() })?;
        Ok((*self.applied_tx.borrow(), payload))
    }

    fn install_snapshot(&self, last_index: u64, payload: &[u8]) -> Result<(), LogError> {
        let restored = AuthTables::from_snapshot_bytes(payload)
            .map_err(|e| LogError::StateMachine { message: e.to_string() })?;

        let _guard = self.apply_lock.lock();
        *self.tables.write() = restored;
        self.applied_tx.send_replace(last_index);
        Ok(())
    }
}
