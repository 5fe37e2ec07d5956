//! Error types for FerroDB Auth using snafu.
//!
//! Defines a unified error hierarchy covering:
//! - Consensus-log errors (leadership, quorum, command size, compaction)
//! - Application errors (partial failure, barrier timeout, role lookup)
//! - Serialization and configuration errors
//!
//! Each variant maps to an [`ErrorCode`] with a unique numeric identifier and
//! a retryability classification. Low-level log errors are translated into
//! the application taxonomy at the store/splitter boundary; `SizeExceeded` is
//! the one condition recovered internally (by re-splitting) and never reaches
//! callers of the mutation API.

use core::fmt;

use snafu::{Location, Snafu};

use crate::types::NodeId;

/// Unified result type for auth operations.
pub type Result<T, E = AuthError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// Codes are organized into ranges:
///
/// | Range     | Domain      | Examples                                  |
/// |-----------|-------------|-------------------------------------------|
/// | 1000–1199 | Storage     | Snapshot encoding, checksum mismatch      |
/// | 2000–2199 | Consensus   | Leadership, quorum, command size, lag     |
/// | 3000–3299 | Application | Partial failure, barrier timeout, lookups |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // --- Storage errors (1000–1199) ---
    /// Snapshot encoding or decoding failed.
    StorageSnapshot = 1100,
    /// Snapshot checksum did not match its contents.
    StorageSnapshotChecksum = 1101,

    // --- Consensus errors (2000–2199) ---
    /// Current node is not the group leader.
    ConsensusNotLeader = 2000,
    /// A majority of voting members is not reachable.
    ConsensusNoQuorum = 2001,
    /// A proposal did not commit before its deadline.
    ConsensusTimeout = 2002,
    /// A proposed command exceeded the maximum command size.
    ConsensusSizeExceeded = 2003,
    /// A requested log entry was compacted away; a snapshot is required.
    ConsensusCompacted = 2100,
    /// Error applying a committed command to the state machine.
    ConsensusStateMachine = 2101,
    /// The group or a node handle was shut down.
    ConsensusShutdown = 2102,

    // --- Application errors (3000–3299) ---
    /// Some commands of a split mutation committed, later ones did not.
    AppPartialFailure = 3000,
    /// A read barrier did not catch up before its deadline.
    AppBarrierTimeout = 3001,
    /// Role not found.
    AppRoleNotFound = 3100,
    /// Role already exists.
    AppRoleAlreadyExists = 3101,
    /// Login check failed (unknown role, login disabled, or bad credential).
    AppAuthenticationFailed = 3102,
    /// Serialization or deserialization error.
    AppSerialization = 3200,
    /// Configuration error.
    AppConfig = 3201,
    /// Invalid request argument.
    AppInvalidArgument = 3202,
    /// Internal error (unexpected state, invariant violation).
    AppInternal = 3203,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for
    /// unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1100 => Some(Self::StorageSnapshot),
            1101 => Some(Self::StorageSnapshotChecksum),
            2000 => Some(Self::ConsensusNotLeader),
            2001 => Some(Self::ConsensusNoQuorum),
            2002 => Some(Self::ConsensusTimeout),
            2003 => Some(Self::ConsensusSizeExceeded),
            2100 => Some(Self::ConsensusCompacted),
            2101 => Some(Self::ConsensusStateMachine),
            2102 => Some(Self::ConsensusShutdown),
            3000 => Some(Self::AppPartialFailure),
            3001 => Some(Self::AppBarrierTimeout),
            3100 => Some(Self::AppRoleNotFound),
            3101 => Some(Self::AppRoleAlreadyExists),
            3102 => Some(Self::AppAuthenticationFailed),
            3200 => Some(Self::AppSerialization),
            3201 => Some(Self::AppConfig),
            3202 => Some(Self::AppInvalidArgument),
            3203 => Some(Self::AppInternal),
            _ => None,
        }
    }

    /// Whether this error is retryable.
    ///
    /// Retryable errors may succeed on a subsequent attempt. `PartialFailure`
    /// is retryable because all row operations are idempotent; repeating the
    /// logical mutation is safe.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConsensusNotLeader
                | Self::ConsensusNoQuorum
                | Self::ConsensusTimeout
                | Self::AppPartialFailure
                | Self::AppBarrierTimeout
        )
    }

    /// Suggested recovery action for this error code.
    #[must_use]
    pub const fn suggested_action(self) -> &'static str {
        match self {
            Self::StorageSnapshot => {
                "Re-trigger the snapshot. Check the snapshot source for corruption."
            },
            Self::StorageSnapshotChecksum => {
                "Discard the snapshot and request a fresh transfer from the leader."
            },
            Self::ConsensusNotLeader => {
                "Retry the operation against the current leader."
            },
            Self::ConsensusNoQuorum => {
                "Restore a majority of voting members, then retry. Local reads keep working."
            },
            Self::ConsensusTimeout => {
                "Retry with backoff. The group may be electing a new leader."
            },
            Self::ConsensusSizeExceeded => {
                "Recovered internally by re-splitting. If surfaced, a single row operation exceeds max_command_size."
            },
            Self::ConsensusCompacted => {
                "Install the latest snapshot, then resume applying from its index."
            },
            Self::ConsensusStateMachine => {
                "Check state machine health. This indicates an error applying a committed command."
            },
            Self::ConsensusShutdown => "The node is shutting down. Do not retry on this handle.",
            Self::AppPartialFailure => {
                "Retry the whole logical mutation. Row operations are idempotent; committed commands stay applied."
            },
            Self::AppBarrierTimeout => {
                "Retry the barrier with a longer deadline, or read without a barrier accepting staleness."
            },
            Self::AppRoleNotFound => "Verify the role exists, or create it first.",
            Self::AppRoleAlreadyExists => "Use IF NOT EXISTS semantics or pick another name.",
            Self::AppAuthenticationFailed => {
                "Check the role name, password, and that the role has LOGIN enabled."
            },
            Self::AppSerialization => {
                "Codec bug or data corruption. Report as an issue with the serialized data context."
            },
            Self::AppConfig => "Fix the configuration value and restart the node.",
            Self::AppInvalidArgument => "Fix the request parameters and resubmit.",
            Self::AppInternal => {
                "Unexpected state or invariant violation. Collect context and report as an issue."
            },
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Top-level error type for auth operations.
///
/// Callers see either full success, a typed failure requiring retry, or a
/// timeout — never a silent partial success. `PartialFailure` carries how far
/// a split mutation got; already-committed commands are never rolled back.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AuthError {
    /// This node is not the group leader; the mutation must be retried
    /// against the leader.
    #[snafu(display("Not the leader, current leader: {leader:?}"))]
    NotLeader {
        /// Current leader node, if known.
        leader: Option<NodeId>,
    },

    /// A majority of voting members is unreachable; no new commands can
    /// commit. Already-applied local state is unaffected.
    #[snafu(display("No quorum of voting members is reachable"))]
    NoQuorum,

    /// A proposal did not commit before the caller's deadline.
    #[snafu(display("Proposal timed out after {elapsed_ms}ms"))]
    ProposalTimeout {
        /// Time spent before giving up.
        elapsed_ms: u64,
    },

    /// Some commands of a split logical mutation committed, later ones did
    /// not. The mutation is "maybe partially applied"; retrying it wholesale
    /// is safe because row operations are idempotent.
    #[snafu(display(
        "Logical mutation partially applied: {committed}/{total} commands committed: {message}"
    ))]
    PartialFailure {
        /// Commands that committed before the failure.
        committed: usize,
        /// Commands the mutation was split into at failure time.
        total: usize,
        /// Description of the underlying failure.
        message: String,
    },

    /// A read barrier did not observe the captured commit index in time.
    /// No data corruption is implied.
    #[snafu(display(
        "Read barrier timed out waiting for index {waited_for} (applied {reached})"
    ))]
    BarrierTimeout {
        /// Commit index captured at barrier entry.
        waited_for: u64,
        /// Apply index reached when the deadline expired.
        reached: u64,
    },

    /// Role not found.
    #[snafu(display("Role {name} does not exist"))]
    RoleNotFound {
        /// Role name.
        name: String,
    },

    /// Role already exists.
    #[snafu(display("Role {name} already exists"))]
    RoleAlreadyExists {
        /// Role name.
        name: String,
    },

    /// Login check failed. The message is deliberately uniform across
    /// unknown-role, login-disabled, and bad-credential cases.
    #[snafu(display("Authentication failed for role {name}"))]
    AuthenticationFailed {
        /// Role name presented at login.
        name: String,
    },

    /// Serialization or deserialization error (postcard codec failure).
    #[snafu(display("Serialization error at {location}: {message}"))]
    Serialization {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Configuration error (invalid value or constraint violation).
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// Invalid argument (malformed request parameter).
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// Error description.
        message: String,
    },

    /// Consensus-layer error that has no more specific application mapping.
    #[snafu(display("Consensus error at {location}: {message}"))]
    Consensus {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Internal error (unexpected state, invariant violation).
    #[snafu(display("Internal error at {location}: {message}"))]
    Internal {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl AuthError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotLeader { .. } => ErrorCode::ConsensusNotLeader,
            Self::NoQuorum => ErrorCode::ConsensusNoQuorum,
            Self::ProposalTimeout { .. } => ErrorCode::ConsensusTimeout,
            Self::PartialFailure { .. } => ErrorCode::AppPartialFailure,
            Self::BarrierTimeout { .. } => ErrorCode::AppBarrierTimeout,
            Self::RoleNotFound { .. } => ErrorCode::AppRoleNotFound,
            Self::RoleAlreadyExists { .. } => ErrorCode::AppRoleAlreadyExists,
            Self::AuthenticationFailed { .. } => ErrorCode::AppAuthenticationFailed,
            Self::Serialization { .. } => ErrorCode::AppSerialization,
            Self::Config { .. } => ErrorCode::AppConfig,
            Self::InvalidArgument { .. } => ErrorCode::AppInvalidArgument,
            Self::Consensus { .. } => ErrorCode::ConsensusStateMachine,
            Self::Internal { .. } => ErrorCode::AppInternal,
        }
    }

    /// Whether this error is retryable. Delegates to
    /// [`ErrorCode::is_retryable`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Suggested recovery action. Delegates to
    /// [`ErrorCode::suggested_action`].
    #[must_use]
    pub const fn suggested_action(&self) -> &'static str {
        self.code().suggested_action()
    }
}

/// Errors from the group-zero consensus log.
///
/// These originate in the `log` crate and are translated into [`AuthError`]
/// at the store/splitter boundary. `SizeExceeded` is special: the splitter
/// recovers it internally by re-splitting and it never reaches callers.
///
/// Context selectors live in their own `log_error` module; the variant names
/// overlap with [`AuthError`]'s on purpose (`NotLeader`, `NoQuorum`).
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub), module)]
pub enum LogError {
    /// The proposing node is not the group leader.
    #[snafu(display("Not the leader, current leader: {leader:?}"))]
    NotLeader {
        /// Current leader, if known.
        leader: Option<NodeId>,
    },

    /// The proposed command exceeds the maximum command size.
    #[snafu(display("Command of {size} bytes exceeds max command size {max}"))]
    SizeExceeded {
        /// Serialized command size.
        size: usize,
        /// Configured limit at propose time.
        max: usize,
    },

    /// A majority of voting members is not reachable.
    #[snafu(display("No quorum: {alive} of {voters} voting members reachable"))]
    NoQuorum {
        /// Reachable voting members.
        alive: usize,
        /// Total voting members.
        voters: usize,
    },

    /// The proposal did not commit in time.
    #[snafu(display("Proposal timed out"))]
    Timeout,

    /// The requested entry was compacted into a snapshot.
    #[snafu(display(
        "Log entry {requested} compacted; first available is {first_available}"
    ))]
    Compacted {
        /// Index requested.
        requested: u64,
        /// First index still in the log.
        first_available: u64,
    },

    /// Error applying a committed command to the state machine.
    #[snafu(display("State machine error: {message}"))]
    StateMachine {
        /// Error description.
        message: String,
    },

    /// The group or node handle was shut down.
    #[snafu(display("Group is shut down"))]
    Shutdown,
}

impl LogError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotLeader { .. } => ErrorCode::ConsensusNotLeader,
            Self::SizeExceeded { .. } => ErrorCode::ConsensusSizeExceeded,
            Self::NoQuorum { .. } => ErrorCode::ConsensusNoQuorum,
            Self::Timeout => ErrorCode::ConsensusTimeout,
            Self::Compacted { .. } => ErrorCode::ConsensusCompacted,
            Self::StateMachine { .. } => ErrorCode::ConsensusStateMachine,
            Self::Shutdown => ErrorCode::ConsensusShutdown,
        }
    }
}

impl From<LogError> for AuthError {
    #[track_caller]
    fn from(err: LogError) -> Self {
        let loc = std::panic::Location::caller();
        match err {
            LogError::NotLeader { leader } => AuthError::NotLeader { leader },
            LogError::NoQuorum { .. } => AuthError::NoQuorum,
            LogError::Timeout => AuthError::ProposalTimeout { elapsed_ms: 0 },
            other => AuthError::Consensus {
                message: other.to_string(),
                location: snafu::Location::new(loc.file(), loc.line(), loc.column()),
            },
        }
    }
}

impl From<crate::codec::CodecError> for AuthError {
    #[track_caller]
    fn from(err: crate::codec::CodecError) -> Self {
        let loc = std::panic::Location::caller();
        AuthError::Serialization {
            message: err.to_string(),
            location: snafu::Location::new(loc.file(), loc.line(), loc.column()),
        }
    }
}
