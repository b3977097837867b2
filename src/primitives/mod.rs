//! Low-level primitives underneath the B-tree.
//!
//! Latch modes, the buffer pool handing out page latches, and the
//! mini-transaction that owns latches between commit points.

/// Latch modes and intention flags.
pub mod latch;

/// Mini-transactions: the latch memo released at commit.
pub mod mtr;

/// Buffer pool, frames, and page latches.
///
/// Pages are resident in frames whose `RwLock` doubles as the page latch.
pub mod pager;
