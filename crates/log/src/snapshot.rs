//! Snapshot wire format with SHA-256 integrity.
//!
//! A snapshot carries the full committed auth-store state at one log index,
//! shipped to lagging or joining nodes so they can skip log replay.
//!
//! ## Format
//!
//! ```text
//! [header]
//!   magic: [u8; 4]          = b"FASN"
//!   version: u8              = 1
//!   group: u64le
//!   last_index: u64le
//!   payload_len: u32le
//!   payload: [u8; payload_len]   = postcard(AuthTables)
//! [footer]
//!   checksum: [u8; 32]       = SHA-256 of all preceding bytes
//! ```
//!
//! The payload is opaque to this crate; the state machine decides its
//! encoding. A node installing a snapshot verifies the checksum before
//! replacing any local state.

use sha2::{Digest, Sha256};
use snafu::Snafu;

use ferrodb_auth_types::GroupId;

/// Snapshot magic bytes.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"FASN";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u8 = 1;

/// Size of the SHA-256 checksum footer.
pub const CHECKSUM_SIZE: usize = 32;

/// Fixed header size before the payload.
const HEADER_SIZE: usize = 4 + 1 + 8 + 8 + 4;

/// Errors that can occur decoding a snapshot.
#[derive(Debug, Snafu)]
pub enum SnapshotError {
    /// Invalid snapshot magic bytes.
    #[snafu(display("Invalid snapshot magic: expected FASN, got {found:?}"))]
    BadMagic {
        /// Magic bytes found.
        found: [u8; 4],
    },

    /// Unsupported snapshot version.
    #[snafu(display("Unsupported snapshot version: {version} (expected <= {SNAPSHOT_VERSION})"))]
    UnsupportedVersion {
        /// Version byte found.
        version: u8,
    },

    /// SHA-256 checksum mismatch.
    #[snafu(display("Snapshot checksum mismatch: expected {expected}, got {actual}"))]
    ChecksumMismatch {
        /// Hex of the checksum in the footer.
        expected: String,
        /// Hex of the checksum recomputed over the contents.
        actual: String,
    },

    /// Snapshot is truncated (too short for the expected data).
    #[snafu(display("Snapshot truncated: {reason}"))]
    Truncated {
        /// What was missing.
        reason: String,
    },
}

/// A decoded snapshot: point-in-time state at `last_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotData {
    /// Group this snapshot belongs to.
    pub group: GroupId,
    /// Log index the state reflects; the installer's apply index is set to
    /// this value.
    pub last_index: u64,
    /// Opaque state-machine payload.
    pub payload: Vec<u8>,
}

/// Encodes a snapshot into its wire format, appending the SHA-256 footer.
#[must_use]
pub fn encode_snapshot(snapshot: &SnapshotData) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + snapshot.payload.len() + CHECKSUM_SIZE);
    buf.extend_from_slice(SNAPSHOT_MAGIC);
    buf.push(SNAPSHOT_VERSION);
    buf.extend_from_slice(&snapshot.group.to_le_bytes());
    buf.extend_from_slice(&snapshot.last_index.to_le_bytes());
    buf.extend_from_slice(&(snapshot.payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&snapshot.payload);

    let checksum = Sha256::digest(&buf);
    buf.extend_from_slice(&checksum);
    buf
}

/// Decodes and verifies a snapshot from its wire format.
///
/// # Errors
///
/// Returns a [`SnapshotError`] if the buffer is truncated, carries an
/// unknown magic or version, or fails checksum verification.
pub fn decode_snapshot(bytes: &[u8]) -> Result<SnapshotData, SnapshotError> {
    if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(SnapshotError::Truncated {
            reason: format!(
                "{} bytes, need at least {}",
                bytes.len(),
                HEADER_SIZE + CHECKSUM_SIZE
            ),
        });
    }

    let (contents, footer) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let actual = Sha256::digest(contents);
    if actual.as_slice() != footer {
        return Err(SnapshotError::ChecksumMismatch {
            expected: hex(footer),
            actual: hex(&actual),
        });
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&contents[0..4]);
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::BadMagic { found: magic });
    }

    let version = contents[4];
    if version > SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion { version });
    }

    let group = u64::from_le_bytes(
        contents[5..13].try_into().map_err(|_| SnapshotError::Truncated {
            reason: "group field".to_string(),
        })?,
    );
    let last_index = u64::from_le_bytes(
        contents[13..21].try_into().map_err(|_| SnapshotError::Truncated {
            reason: "last_index field".to_string(),
        })?,
    );
    let payload_len = u32::from_le_bytes(
        contents[21..25].try_into().map_err(|_| SnapshotError::Truncated {
            reason: "payload_len field".to_string(),
        })?,
    ) as usize;

    let payload_bytes = &contents[HEADER_SIZE..];
    if payload_bytes.len() != payload_len {
        return Err(SnapshotError::Truncated {
            reason: format!(
                "payload: header says {payload_len} bytes, found {}",
                payload_bytes.len()
            ),
        });
    }

    Ok(SnapshotData { group, last_index, payload: payload_bytes.to_vec() })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
