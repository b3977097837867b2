//! Persistent B-tree cursors over a latched in-memory buffer pool.
//!
//! A [`PersistentCursor`] is positioned by a tree descent, can store its
//! position, let its mini-transaction release every latch, and later be
//! restored to the same logical place. Forward traversal couples latches
//! across leaves; backward traversal goes through a store and restore.

#![warn(missing_docs)]

pub mod config;
pub mod primitives;
pub mod storage;
pub mod types;

pub use config::EngineConfig;
pub use primitives::latch::{LatchIntent, LatchMode, LatchRequest, RwMode};
pub use primitives::mtr::{LatchEvent, MiniTransaction};
pub use primitives::pager::{
    BlockRef, BufferPool, BufferPoolOptions, PageMut, PageRef, PoolStats,
};
pub use storage::btree::page::{Page, PagePos, SearchMode};
pub use storage::btree::{
    BTree, BTreeOptions, CursorOptions, CursorStats, CursorStatsSnapshot, Index, PersistentCursor,
    PositionState, RelativePosition, Side,
};
pub use storage::record::{Record, Tuple};
pub use types::{PageId, PcursorError, Result};
