//! Command encoder and splitter.
//!
//! A logical mutation (one role create, one cascading drop, one migration
//! batch) is a list of row operations that may exceed `max_command_size`
//! when encoded. The splitter packs operations greedily into commands
//! against a working threshold of `max_command_size * 3/4` — the margin
//! absorbs the command envelope — and proposes them sequentially, each
//! awaiting commit.
//!
//! The size limit is also enforced at propose time, and the effective limit
//! can change under the splitter's feet. A `SizeExceeded` rejection is
//! recovered internally: halve the working threshold, re-split everything
//! not yet committed, resume. Only a single row operation too large for the
//! limit is unrecoverable.
//!
//! Commands that committed before a failure are never rolled back. The
//! caller gets `PartialFailure { committed, total }`; because row operations
//! are idempotent, retrying the whole logical mutation is safe.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use ferrodb_auth_log::GroupZero;
use ferrodb_auth_types::codec;
use ferrodb_auth_types::error::InternalSnafu;
use ferrodb_auth_types::{
    AuthError, Command, CommitReceipt, LogError, NodeId, Result, RowOp,
};

/// Proposes a logical mutation through group zero, splitting it into as many
/// commands as the size limit requires.
///
/// Commands commit sequentially and in order. The returned receipt spans the
/// first and last committed index.
///
/// # Errors
///
/// - [`AuthError::InvalidArgument`] for an empty mutation
/// - [`AuthError::NotLeader`] / [`AuthError::NoQuorum`] /
///   [`AuthError::ProposalTimeout`] when nothing committed
/// - [`AuthError::PartialFailure`] when some commands committed and a later
///   one failed; retrying the whole mutation is safe
/// - [`AuthError::Internal`] when a single row operation exceeds the limit
#[instrument(skip(group, ops), fields(group = group.id(), op_count = ops.len()))]
pub async fn propose_logical_mutation(
    group: &GroupZero,
    origin: NodeId,
    ops: Vec<RowOp>,
    timeout: Duration,
) -> Result<CommitReceipt> {
    if ops.is_empty() {
        return Err(AuthError::InvalidArgument {
            message: "logical mutation carries no row operations".to_string(),
        });
    }

    let mut threshold = split_threshold(group.max_command_size());
    let mut queue = split_ops(ops, threshold)?;
    let started = Instant::now();
    let deadline = started + timeout;

    let mut first_index = 0u64;
    let mut last_index = 0u64;
    let mut committed = 0usize;

    while let Some(command) = queue.pop_front() {
        if Instant::now() >= deadline {
            return Err(sequence_failure(
                committed,
                committed + queue.len() + 1,
                LogError::Timeout,
                started,
            ));
        }

        let bytes = codec::encode(&command)?;
        match group.propose(origin, bytes) {
            Ok(index) => {
                if committed == 0 {
                    first_index = index;
                }
                last_index = index;
                committed += 1;
            },
            Err(LogError::SizeExceeded { size, max }) if command.ops.len() > 1 => {
                // The limit is smaller than we assumed. Halve the working
                // threshold and re-split everything not yet committed.
                threshold = (threshold / 2).max(1);
                warn!(size, max, threshold, "Command rejected as oversized, re-splitting");
                let mut remainder = command.ops;
                for pending in queue.drain(..) {
                    remainder.extend(pending.ops);
                }
                queue = split_ops(remainder, threshold)?;
            },
            Err(LogError::SizeExceeded { size, max }) => {
                // One row operation alone exceeds the limit; no split helps.
                let error = InternalSnafu {
                    message: format!(
                        "single row operation of {size} bytes exceeds max_command_size {max}"
                    ),
                }
                .build();
                if committed == 0 {
                    return Err(error);
                }
                return Err(AuthError::PartialFailure {
                    committed,
                    total: committed + queue.len() + 1,
                    message: error.to_string(),
                });
            },
            Err(error) => {
                return Err(sequence_failure(
                    committed,
                    committed + queue.len() + 1,
                    error,
                    started,
                ));
            },
        }
        // Let apply loops drain between sub-commands.
        tokio::task::yield_now().await;
    }

    debug!(first_index, last_index, commands = committed, "Logical mutation committed");
    Ok(CommitReceipt { first_index, last_index, commands: committed })
}

/// Working threshold for greedy packing: three quarters of the limit, the
/// rest left for the command envelope.
fn split_threshold(max_command_size: usize) -> usize {
    (max_command_size * 3 / 4).max(1)
}

/// Packs row operations greedily into commands whose summed per-op encoded
/// size stays at or under `threshold`. An operation that alone exceeds the
/// threshold gets its own command and is left for propose-time rejection.
fn split_ops(ops: Vec<RowOp>, threshold: usize) -> Result<VecDeque<Command>> {
    let mut commands = VecDeque::new();
    let mut current = Vec::new();
    let mut current_size = 0usize;

    for op in ops {
        let size = codec::encoded_size(&op)?;
        if !current.is_empty() && current_size + size > threshold {
            commands.push_back(Command::new(std::mem::take(&mut current)));
            current_size = 0;
        }
        current_size += size;
        current.push(op);
    }
    if !current.is_empty() {
        commands.push_back(Command::new(current));
    }
    Ok(commands)
}

fn sequence_failure(
    committed: usize,
    total: usize,
    error: LogError,
    started: Instant,
) -> AuthError {
    if committed == 0 {
        return match error {
            LogError::Timeout => AuthError::ProposalTimeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
            other => other.into(),
        };
    }
    AuthError::PartialFailure { committed, total, message: error.to_string() }
}
