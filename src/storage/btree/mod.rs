#![forbid(unsafe_code)]

//! B-tree index with persistent cursors.

/// B-tree page layout and in-page search.
pub mod page;

mod cursor;
mod pcur;
mod snapshot;
mod stats;
mod tree;

pub use cursor::TreeCursor;
pub use pcur::{CursorOptions, PersistentCursor};
pub use snapshot::{PositionState, RecordSnapshot, RelativePosition, StoredPosition, Witnesses};
pub use stats::{CursorStats, CursorStatsSnapshot};
pub use tree::{BTree, BTreeOptions, Index, OptimisticLatch, Side};
