//! Error types for the caching engine
//!
//! Provides unified error handling using thiserror.
//!
//! Two categories live side by side in [`CacheError`]: recoverable outcomes
//! that occur under normal load (admission rejection, unmeasurable values,
//! copy failures) and pool accounting violations, which mean a shared pool
//! can no longer be trusted.

use thiserror::Error;

use crate::pool::SizeOfError;

// == Cache Error Enum ==
/// Unified error type for pools and stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The pool is over budget and eviction could not free enough space
    #[error("admission rejected: requested {requested} units, {available} available")]
    Rejected { requested: u64, available: u64 },

    /// The entry could not be measured
    #[error("unable to size entry: {0}")]
    SizeOf(#[from] SizeOfError),

    /// Pool bookkeeping no longer matches what the stores hold
    #[error("pool accounting violated: {0}")]
    Accounting(String),

    /// Invalid or frozen configuration change
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The store (or its manager) has been disposed
    #[error("store has been disposed")]
    Disposed,

    /// Copy-on-read or copy-on-write failed
    #[error("copy failed: {0}")]
    Copy(String),
}

impl CacheError {
    // == Recoverability ==
    /// Returns true if the caller may skip, retry or bypass.
    ///
    /// Only accounting violations are unrecoverable: they break the pool
    /// invariant for every other store sharing the pool.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CacheError::Accounting(_))
    }

    /// Returns true if this is an admission outcome (rejected or unmeasurable).
    pub fn is_admission_failure(&self) -> bool {
        matches!(self, CacheError::Rejected { .. } | CacheError::SizeOf(_))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching engine.
pub type Result<T> = std::result::Result<T, CacheError>;
