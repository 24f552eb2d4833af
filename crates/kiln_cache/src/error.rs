//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during persistent-store operations.
///
/// Reads are fail-safe: the store logs these and reports a miss. Writes
/// return them to the caller, which logs them and carries on without
/// persisting.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while reading or writing a record.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A record file has an invalid or missing header.
    #[error("invalid record header in {path}: {reason}")]
    InvalidHeader {
        /// The record file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The record file path.
        path: PathBuf,
        /// The checksum recorded in the header.
        expected: String,
        /// The checksum computed from the payload.
        actual: String,
    },

    /// The record layout version differs from the one this build writes.
    #[error("record format mismatch in {path}: expected {expected}, got {actual}")]
    FormatMismatch {
        /// The record file path.
        path: PathBuf,
        /// The format version this build understands.
        expected: u32,
        /// The format version found in the file.
        actual: u32,
    },

    /// The record was written by a different runtime version.
    #[error("runtime version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The record file path.
        path: PathBuf,
        /// The running version.
        expected: String,
        /// The version that wrote the record.
        actual: String,
    },

    /// The record belongs to a different optimization profile.
    #[error("optimization profile mismatch in {path}: expected {expected}, got {actual}")]
    ProfileMismatch {
        /// The record file path.
        path: PathBuf,
        /// The profile of the reading store.
        expected: String,
        /// The profile found in the file.
        actual: String,
    },

    /// The record was stored for a different source or cache key.
    #[error("record in {path} belongs to a different source")]
    SourceMismatch {
        /// The record file path.
        path: PathBuf,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CacheError {
    /// Returns `true` for errors caused by a legitimately outdated record
    /// rather than by corruption.
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            CacheError::VersionMismatch { .. }
                | CacheError::ProfileMismatch { .. }
                | CacheError::FormatMismatch { .. }
        )
    }
}
