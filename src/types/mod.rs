#![forbid(unsafe_code)]
//! Identifiers and the error type shared by every layer of the crate.

use std::fmt;

/// Identifier of a page managed by the buffer pool.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageId(pub u64);

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by the buffer pool, the tree and the persistent cursor.
#[derive(thiserror::Error, Debug)]
pub enum PcursorError {
    /// Underlying I/O failure (configuration files).
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    /// On-page or in-record data does not have the expected shape.
    #[error("corruption: {0}")]
    Corruption(&'static str),
    /// Caller supplied an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
    /// Caller broke the cursor or mini-transaction protocol. Not recoverable:
    /// the cursor must be reopened.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),
    /// The requested operation is not implemented.
    #[error("unimplemented: {0}")]
    Unimplemented(&'static str),
    /// Waiting for a page latch exceeded the configured timeout. Retryable.
    #[error("timed out waiting for latch on page {page}")]
    LatchTimeout {
        /// Page whose latch could not be acquired.
        page: PageId,
    },
    /// A shared latch held by this mini-transaction cannot be upgraded.
    #[error("cannot upgrade shared latch on page {page}")]
    LatchUpgrade {
        /// Page already latched in shared mode.
        page: PageId,
    },
    /// The page is not resident in the buffer pool.
    #[error("page {0} not found")]
    PageNotFound(PageId),
    /// Every frame in the buffer pool is in use.
    #[error("buffer pool exhausted ({capacity} frames)")]
    PoolExhausted {
        /// Configured frame capacity.
        capacity: usize,
    },
    /// The leaf has no room left and page splits are not supported.
    #[error("page {0} is full")]
    PageFull(PageId),
    /// Configuration could not be parsed or failed validation.
    #[error("config: {0}")]
    Config(String),
}

impl PcursorError {
    /// Returns true when the failed operation may simply be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PcursorError::LatchTimeout { .. })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PcursorError>;
