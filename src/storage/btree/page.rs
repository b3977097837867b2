//! In-memory B-tree page and the positions a page cursor can take on it.
//!
//! Every page carries two implicit sentinels: the infimum sorts before all
//! user records and the supremum after them. They are never stored; a page
//! cursor simply points at one of them.

use std::cmp::Ordering;

use crate::storage::record::{compare_tuple_rec, Record, Tuple};
use crate::types::{PageId, PcursorError, Result};

/// Comparison mode for positioning a cursor relative to a search tuple.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SearchMode {
    /// First record strictly greater than the tuple.
    Greater,
    /// First record greater than or equal to the tuple.
    GreaterOrEqual,
    /// Last record strictly less than the tuple.
    Less,
    /// Last record less than or equal to the tuple.
    LessOrEqual,
}

impl SearchMode {
    /// Ascending modes land on the first qualifying record.
    pub fn is_ascending(self) -> bool {
        matches!(self, SearchMode::Greater | SearchMode::GreaterOrEqual)
    }

    /// Mode used inside node-pointer pages. Ascending searches pick the child
    /// holding the records just below the tuple so the leaf cursor can step
    /// forward onto the answer.
    fn node_ptr_mode(self) -> SearchMode {
        match self {
            SearchMode::GreaterOrEqual | SearchMode::Less => SearchMode::Less,
            SearchMode::Greater | SearchMode::LessOrEqual => SearchMode::LessOrEqual,
        }
    }
}

/// Position of a page cursor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum PagePos {
    /// The low sentinel, before the first user record.
    #[default]
    Infimum,
    /// User record at this slot.
    Rec(usize),
    /// The high sentinel, after the last user record.
    Supremum,
}

/// A B-tree page: sibling links and its ordered records.
#[derive(Clone, Debug)]
pub struct Page {
    id: PageId,
    level: u16,
    prev: Option<PageId>,
    next: Option<PageId>,
    records: Vec<Record>,
}

impl Page {
    /// Creates an empty page at `level` (0 is the leaf level).
    pub fn new(id: PageId, level: u16) -> Self {
        Self {
            id,
            level,
            prev: None,
            next: None,
            records: Vec::new(),
        }
    }

    /// Page identifier.
    pub fn id(&self) -> PageId {
        self.id
    }

    /// Height above the leaf level.
    pub fn level(&self) -> u16 {
        self.level
    }

    /// Whether this is a leaf page.
    pub fn is_leaf(&self) -> bool {
        self.level == 0
    }

    /// Left sibling.
    pub fn prev(&self) -> Option<PageId> {
        self.prev
    }

    /// Right sibling.
    pub fn next(&self) -> Option<PageId> {
        self.next
    }

    /// Whether the page holds no user records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of user records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// User records in key order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Record under `pos`, `None` on a sentinel or a stale slot.
    pub fn record_at(&self, pos: PagePos) -> Option<&Record> {
        match pos {
            PagePos::Rec(idx) => self.records.get(idx),
            PagePos::Infimum | PagePos::Supremum => None,
        }
    }

    /// First user record.
    pub fn first_record(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Last user record.
    pub fn last_record(&self) -> Option<&Record> {
        self.records.last()
    }

    pub(crate) fn set_prev(&mut self, prev: Option<PageId>) {
        self.prev = prev;
    }

    pub(crate) fn set_next(&mut self, next: Option<PageId>) {
        self.next = next;
    }

    pub(crate) fn push_record(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Position one step forward. The supremum stays put.
    pub fn next_pos(&self, pos: PagePos) -> PagePos {
        match pos {
            PagePos::Infimum if self.records.is_empty() => PagePos::Supremum,
            PagePos::Infimum => PagePos::Rec(0),
            PagePos::Rec(idx) if idx + 1 < self.records.len() => PagePos::Rec(idx + 1),
            PagePos::Rec(_) | PagePos::Supremum => PagePos::Supremum,
        }
    }

    /// Position one step backward. The infimum stays put.
    pub fn prev_pos(&self, pos: PagePos) -> PagePos {
        match pos {
            PagePos::Supremum if self.records.is_empty() => PagePos::Infimum,
            PagePos::Supremum => PagePos::Rec(self.records.len() - 1),
            PagePos::Rec(0) | PagePos::Infimum => PagePos::Infimum,
            PagePos::Rec(idx) => PagePos::Rec(idx - 1),
        }
    }

    /// Number of leading records for which `keep(cmp(tuple, rec))` holds.
    /// `keep` must be monotone over the page order.
    fn partition(&self, tuple: &Tuple, keep: impl Fn(Ordering) -> bool) -> Result<usize> {
        let mut lo = 0usize;
        let mut hi = self.records.len();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if keep(compare_tuple_rec(tuple, &self.records[mid])?) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Positions a cursor on this page according to `mode`. Ascending modes
    /// may land on the supremum, descending modes on the infimum.
    pub fn search(&self, tuple: &Tuple, mode: SearchMode) -> Result<PagePos> {
        let below = |ord: Ordering| ord == Ordering::Greater;
        let not_above = |ord: Ordering| ord != Ordering::Less;
        let pos = match mode {
            SearchMode::GreaterOrEqual => {
                let idx = self.partition(tuple, below)?;
                self.slot_or(idx, PagePos::Supremum)
            }
            SearchMode::Greater => {
                let idx = self.partition(tuple, not_above)?;
                self.slot_or(idx, PagePos::Supremum)
            }
            SearchMode::Less => match self.partition(tuple, below)? {
                0 => PagePos::Infimum,
                idx => PagePos::Rec(idx - 1),
            },
            SearchMode::LessOrEqual => match self.partition(tuple, not_above)? {
                0 => PagePos::Infimum,
                idx => PagePos::Rec(idx - 1),
            },
        };
        Ok(pos)
    }

    fn slot_or(&self, idx: usize, past_end: PagePos) -> PagePos {
        if idx < self.records.len() {
            PagePos::Rec(idx)
        } else {
            past_end
        }
    }

    /// Slot of the node pointer to follow for `tuple`. The first node pointer
    /// bounds everything below it, so a slot always exists.
    pub fn node_ptr_slot(&self, tuple: &Tuple, mode: SearchMode) -> Result<usize> {
        if self.is_leaf() {
            return Err(PcursorError::Corruption("node pointer search on a leaf"));
        }
        if self.records.is_empty() {
            return Err(PcursorError::Corruption("internal page without node pointers"));
        }
        let count = match mode.node_ptr_mode() {
            SearchMode::Less => self.partition(tuple, |ord| ord == Ordering::Greater)?,
            _ => self.partition(tuple, |ord| ord != Ordering::Less)?,
        };
        Ok(count.saturating_sub(1))
    }

    /// Child page referenced by the node pointer at `slot`.
    pub fn child_at(&self, slot: usize) -> Result<PageId> {
        self.records
            .get(slot)
            .and_then(Record::child)
            .ok_or(PcursorError::Corruption("node pointer without child"))
    }

    /// Inserts `record` keeping key order on the first `n_unique` fields.
    pub(crate) fn insert(&mut self, record: Record, n_unique: usize, capacity: usize) -> Result<usize> {
        if self.records.len() >= capacity {
            return Err(PcursorError::PageFull(self.id));
        }
        let key = key_tuple(&record, n_unique)?;
        let idx = self.partition(&key, |ord| ord == Ordering::Greater)?;
        if let Some(existing) = self.records.get(idx) {
            if compare_tuple_rec(&key, existing)? == Ordering::Equal {
                return Err(PcursorError::Invalid("duplicate key"));
            }
        }
        self.records.insert(idx, record);
        Ok(idx)
    }

    /// Removes the record whose key equals `key`.
    pub(crate) fn remove(&mut self, key: &Tuple) -> Result<Option<Record>> {
        let idx = self.partition(key, |ord| ord == Ordering::Greater)?;
        match self.records.get(idx) {
            Some(rec) if compare_tuple_rec(key, rec)? == Ordering::Equal => {
                Ok(Some(self.records.remove(idx)))
            }
            _ => Ok(None),
        }
    }
}

fn key_tuple(record: &Record, n_unique: usize) -> Result<Tuple> {
    let mut fields = Vec::with_capacity(n_unique);
    for idx in 0..n_unique {
        fields.push(record.field(idx)?);
    }
    Ok(Tuple::from_fields(fields))
}
