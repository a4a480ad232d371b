//! Error types for metpipe
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

use crate::config::{MatcherId, MetricId};

/// Result type alias for metpipe operations
pub type Result<T> = std::result::Result<T, MetpipeError>;

/// Main error type for metpipe operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetpipeError {
    /// Activation snapshot persistence error
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// Configuration definition error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors while encoding, decoding, or transferring activation snapshots
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    /// Buffer too short
    #[error("Buffer too short: need at least {needed} bytes, got {available}")]
    BufferTooShort { needed: usize, available: usize },

    /// Magic bytes did not match
    #[error("Invalid snapshot magic bytes")]
    BadMagic,

    /// Snapshot was written by an unknown format version
    #[error("Unsupported snapshot format version: {0}")]
    UnsupportedVersion(u32),

    /// Invalid checksum
    #[error("Invalid checksum: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// Unknown activation kind byte in a record
    #[error("Unknown activation kind: 0x{0:02x}")]
    UnknownActivationKind(u8),

    /// File read/write failure
    ///
    /// Carried as a string so errors stay `Clone + PartialEq`.
    #[error("Snapshot I/O failed: {reason}")]
    Io { reason: String },
}

/// Errors in a configuration definition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Two metrics declared the same id
    #[error("Duplicate metric id: {0}")]
    DuplicateMetricId(MetricId),

    /// A metric declared the same triggering matcher twice
    #[error("Duplicate activation trigger: metric {metric_id}, matcher {matcher_id}")]
    DuplicateTrigger {
        metric_id: MetricId,
        matcher_id: MatcherId,
    },
}
