//! Centralized serialization and deserialization functions.
//!
//! All replicated data — commands, snapshots, table contents — is encoded
//! with postcard through this module, so command sizing and snapshot
//! equivalence are measured against a single canonical encoding.

use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value to bytes using postcard serialization.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes bytes to a value using postcard deserialization.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

/// Returns the postcard-encoded size of a value, in bytes.
///
/// Used by the command splitter to pack row operations against the
/// `max_command_size` threshold.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encoded_size<T: Serialize>(value: &T) -> Result<usize, CodecError> {
    encode(value).map(|bytes| bytes.len())
}
