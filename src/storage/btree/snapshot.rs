//! Stored cursor positions.
//!
//! A stored position is the key prefix of the record the cursor was on (or
//! next to), where the cursor sat relative to it, and the witnesses used to
//! decide whether the stored page can be trusted again.

use std::ops::Range;

use crate::primitives::pager::BlockRef;
use crate::storage::record::{build_search_tuple, compare_prefix, copy_key_prefix, Record, Tuple};
use crate::types::{PcursorError, Result};

use super::page::SearchMode;

/// Latch state of a persistent cursor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PositionState {
    /// Never positioned, or reset.
    #[default]
    NotPositioned,
    /// Positioned with the page latched.
    Positioned,
    /// Restored optimistically onto a user record while the stored position
    /// was before or after it. The caller decides whether to step and then
    /// settles the position before storing or moving.
    PositionedOptimistic,
    /// Position stored and the latch scope committed.
    WasPositioned,
}

impl PositionState {
    /// Whether the cursor page is latched.
    pub fn is_latched(self) -> bool {
        matches!(
            self,
            PositionState::Positioned | PositionState::PositionedOptimistic
        )
    }

    /// States from which a stored position may be restored.
    pub fn is_restorable(self) -> bool {
        self != PositionState::NotPositioned
    }
}

/// Where the cursor was relative to the stored record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RelativePosition {
    /// On the record.
    On,
    /// On the infimum just before it.
    Before,
    /// On the supremum just after it.
    After,
    /// In an empty tree, before everything.
    BeforeFirstInTree,
    /// In an empty tree, after everything.
    AfterLastInTree,
}

impl RelativePosition {
    /// Positions recorded without a key.
    pub fn is_tree_boundary(self) -> bool {
        matches!(
            self,
            RelativePosition::BeforeFirstInTree | RelativePosition::AfterLastInTree
        )
    }

    /// Search mode that lands a re-descent on the stored spot.
    pub fn restore_search_mode(self) -> Option<SearchMode> {
        match self {
            RelativePosition::On => Some(SearchMode::LessOrEqual),
            RelativePosition::After => Some(SearchMode::Greater),
            RelativePosition::Before => Some(SearchMode::Less),
            RelativePosition::BeforeFirstInTree | RelativePosition::AfterLastInTree => None,
        }
    }
}

/// Owned copy of a record's key prefix.
///
/// The buffer survives re-stores; only its contents and span change.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordSnapshot {
    buf: Vec<u8>,
    span: Range<usize>,
    n_fields: usize,
}

impl Clone for RecordSnapshot {
    fn clone(&self) -> Self {
        Self {
            buf: self.buf.clone(),
            span: self.span.clone(),
            n_fields: self.n_fields,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.buf.clone_from(&source.buf);
        self.span = source.span.clone();
        self.n_fields = source.n_fields;
    }
}

impl RecordSnapshot {
    pub(crate) fn capture(&mut self, rec: &Record, n_fields: usize) -> Result<()> {
        copy_key_prefix(rec, n_fields, &mut self.buf)?;
        self.span = 0..self.buf.len();
        self.n_fields = n_fields;
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.buf.clear();
        self.span = 0..0;
        self.n_fields = 0;
    }

    /// Whether a key is held.
    pub fn is_keyed(&self) -> bool {
        self.n_fields > 0
    }

    /// Number of key fields held.
    pub fn n_fields(&self) -> usize {
        self.n_fields
    }

    /// Encoded key prefix.
    pub fn key_bytes(&self) -> &[u8] {
        &self.buf[self.span.clone()]
    }

    /// Allocated size of the owned buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Search tuple equal to the stored key.
    pub fn to_search_tuple(&self) -> Result<Tuple> {
        if !self.is_keyed() {
            return Err(PcursorError::ProtocolViolation(
                "keyless snapshot has no search tuple",
            ));
        }
        build_search_tuple(self.key_bytes(), self.n_fields)
    }

    /// Whether `rec` starts with the stored key.
    pub fn matches_prefix(&self, rec: &Record) -> Result<bool> {
        if !self.is_keyed() {
            return Ok(false);
        }
        Ok(compare_prefix(self.key_bytes(), rec.as_bytes(), self.n_fields)?.is_eq())
    }
}

/// Staleness witnesses captured with a keyed position.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Witnesses {
    /// Frame the page was in. A hint, revalidated before use.
    pub block: BlockRef,
    /// Page modify clock at store time.
    pub modify_clock: u64,
    /// Pool recycle epoch at store time.
    pub recycle_epoch: u64,
}

/// Relative position and witnesses of the last store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoredPosition {
    /// Where the cursor was relative to the snapshot record.
    pub rel_pos: RelativePosition,
    /// Absent for tree-boundary positions, which always re-descend.
    pub witnesses: Option<Witnesses>,
}
