//! Index storage: records and the B-tree with its persistent cursors.

/// B-tree pages, descents and persistent cursors.
pub mod btree;

/// Record encoding, search tuples and key comparison.
pub mod record;
