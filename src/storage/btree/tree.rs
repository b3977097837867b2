use std::cmp::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, trace};

use super::cursor::TreeCursor;
use super::page::{Page, SearchMode};
use super::stats::{CursorStats, CursorStatsSnapshot};
use crate::primitives::latch::{LatchMode, RwMode};
use crate::primitives::mtr::MiniTransaction;
use crate::primitives::pager::BufferPool;
use crate::storage::record::{compare_prefix, compare_tuple_rec, Record, Tuple};
use crate::types::{PageId, PcursorError, Result};

mod descend;

pub use descend::{OptimisticLatch, Side};

/// Index metadata consulted by descents and cursors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Index {
    name: String,
    n_unique: usize,
    intrinsic: bool,
}

impl Index {
    /// Describes an index whose first `n_unique` fields identify a record.
    pub fn new(name: impl Into<String>, n_unique: usize) -> Result<Self> {
        if n_unique == 0 {
            return Err(PcursorError::Invalid("index needs at least one unique field"));
        }
        Ok(Self {
            name: name.into(),
            n_unique,
            intrinsic: false,
        })
    }

    /// Marks the index as belonging to an intrinsic table: accessed by a
    /// single thread, buffer-fixed instead of latched.
    pub fn intrinsic(mut self) -> Self {
        self.intrinsic = true;
        self
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of leading fields that identify a record.
    pub fn n_unique(&self) -> usize {
        self.n_unique
    }

    /// Whether the index belongs to an intrinsic table.
    pub fn is_intrinsic(&self) -> bool {
        self.intrinsic
    }
}

/// Configuration knobs for the B-tree.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BTreeOptions {
    /// Maximum records per leaf page
    pub leaf_capacity: usize,
    /// Maximum node pointers per internal page
    pub internal_capacity: usize,
    /// Target fill percentage for bulk-loaded pages (1-100)
    pub page_fill_target: u8,
}

impl Default for BTreeOptions {
    fn default() -> Self {
        Self {
            leaf_capacity: 64,
            internal_capacity: 64,
            page_fill_target: 85,
        }
    }
}

impl BTreeOptions {
    /// Rejects unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.leaf_capacity == 0 {
            return Err(PcursorError::Config("leaf capacity must be positive".into()));
        }
        if self.internal_capacity < 2 {
            return Err(PcursorError::Config(
                "internal capacity must be at least two".into(),
            ));
        }
        if !(1..=100).contains(&self.page_fill_target) {
            return Err(PcursorError::Config(format!(
                "page fill target {} outside 1..=100",
                self.page_fill_target
            )));
        }
        Ok(())
    }

    fn fill(capacity: usize, target: u8) -> usize {
        (capacity * target as usize / 100).max(1)
    }

    fn leaf_fill(&self) -> usize {
        Self::fill(self.leaf_capacity, self.page_fill_target)
    }

    fn internal_fill(&self) -> usize {
        Self::fill(self.internal_capacity, self.page_fill_target).max(2)
    }
}

/// B-tree index resident in a [`BufferPool`].
///
/// The shape is fixed once built: records can be inserted into and deleted
/// from leaves with room, but pages never split or merge.
pub struct BTree {
    index: Index,
    pool: Arc<BufferPool>,
    root: PageId,
    height: u16,
    options: BTreeOptions,
    stats: Arc<CursorStats>,
}

impl BTree {
    /// Creates a tree consisting of one empty root leaf.
    pub fn create(pool: &Arc<BufferPool>, index: Index, options: BTreeOptions) -> Result<Self> {
        Self::bulk_load(pool, index, options, std::iter::empty())
    }

    /// Builds a tree bottom-up from records in strictly ascending key order.
    pub fn bulk_load<I>(
        pool: &Arc<BufferPool>,
        index: Index,
        options: BTreeOptions,
        records: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        options.validate()?;
        let n_unique = index.n_unique();
        let per_leaf = options.leaf_fill();
        let mut leaves: Vec<Vec<Record>> = Vec::new();
        let mut chunk: Vec<Record> = Vec::with_capacity(per_leaf);
        for rec in records {
            if rec.n_fields()? < n_unique {
                return Err(PcursorError::Invalid("record shorter than the unique key"));
            }
            let last = chunk
                .last()
                .or_else(|| leaves.last().and_then(|leaf| leaf.last()));
            if let Some(last) = last {
                if compare_prefix(last.as_bytes(), rec.as_bytes(), n_unique)? != Ordering::Less {
                    return Err(PcursorError::Invalid(
                        "bulk load input is not strictly ascending",
                    ));
                }
            }
            chunk.push(rec);
            if chunk.len() == per_leaf {
                leaves.push(std::mem::take(&mut chunk));
            }
        }
        if !chunk.is_empty() || leaves.is_empty() {
            leaves.push(chunk);
        }

        let mut level = 0u16;
        let mut children = install_level(pool, level, leaves)?;
        while children.len() > 1 {
            level += 1;
            let mut nodes = Vec::new();
            for group in children.chunks(options.internal_fill()) {
                let ptrs = group
                    .iter()
                    .map(|(child, first)| match first {
                        Some(first) => Record::node_ptr(first, n_unique, *child),
                        None => Err(PcursorError::Corruption("empty page below the root")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                nodes.push(ptrs);
            }
            children = install_level(pool, level, nodes)?;
        }
        let root = children
            .first()
            .map(|(id, _)| *id)
            .ok_or(PcursorError::Corruption("bulk load produced no root"))?;
        debug!(
            target: "pcursor::btree",
            index = index.name(),
            root = root.0,
            height = level + 1,
            "tree built"
        );
        Ok(Self {
            index,
            pool: Arc::clone(pool),
            root,
            height: level + 1,
            options,
            stats: Arc::new(CursorStats::default()),
        })
    }

    /// Index metadata.
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Pool the tree's pages live in.
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Return the root page identifier.
    pub fn root_page(&self) -> PageId {
        self.root
    }

    /// Number of levels, leaves included.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Active configuration.
    pub fn options(&self) -> &BTreeOptions {
        &self.options
    }

    /// Access the live statistics counters for this tree.
    pub fn stats(&self) -> Arc<CursorStats> {
        Arc::clone(&self.stats)
    }

    /// Snapshot the current statistics counters.
    pub fn stats_snapshot(&self) -> CursorStatsSnapshot {
        self.stats.snapshot()
    }

    /// Starts a mini-transaction on the tree's pool.
    pub fn start_mtr(&self) -> MiniTransaction<'_> {
        MiniTransaction::start(&self.pool)
    }

    pub(crate) fn stats_ref(&self) -> &CursorStats {
        &self.stats
    }

    /// Latch strength for leaves under `mode`; intrinsic trees only fix.
    pub(crate) fn leaf_rw(&self, mode: LatchMode) -> RwMode {
        if self.index.is_intrinsic() {
            RwMode::Fix
        } else {
            mode.leaf_rw()
        }
    }

    pub(crate) fn upper_rw(&self, mode: LatchMode) -> RwMode {
        if self.index.is_intrinsic() {
            RwMode::Fix
        } else {
            mode.upper_rw()
        }
    }

    /// Unique-key prefix of `record` as a search tuple.
    pub fn key_of(&self, record: &Record) -> Result<Tuple> {
        let mut fields = Vec::with_capacity(self.index.n_unique());
        for idx in 0..self.index.n_unique() {
            fields.push(record.field(idx)?);
        }
        Ok(Tuple::from_fields(fields))
    }

    /// Inserts `record` into its leaf. The leaf stays X-latched in `mtr`.
    pub fn insert(&self, record: Record, mtr: &mut MiniTransaction<'_>) -> Result<()> {
        let key = self.key_of(&record)?;
        let mut cursor = TreeCursor::default();
        self.descend(
            &key,
            SearchMode::LessOrEqual,
            LatchMode::ModifyLeaf.into(),
            &mut cursor,
            mtr,
        )?;
        let leaf = cursor.page_id()?;
        if mtr.page(leaf)?.len() >= self.options.leaf_capacity {
            return Err(PcursorError::PageFull(leaf));
        }
        let slot =
            mtr.page_mut(leaf)?
                .insert(record, self.index.n_unique(), self.options.leaf_capacity)?;
        trace!(target: "pcursor::btree", page = leaf.0, slot, "record inserted");
        Ok(())
    }

    /// Deletes the record whose unique key equals `key`. Returns false when
    /// no such record exists. The leaf stays X-latched in `mtr`.
    pub fn delete(&self, key: &Tuple, mtr: &mut MiniTransaction<'_>) -> Result<bool> {
        if key.n_fields() != self.index.n_unique() {
            return Err(PcursorError::Invalid("delete key must cover the unique fields"));
        }
        let mut cursor = TreeCursor::default();
        self.descend(
            key,
            SearchMode::LessOrEqual,
            LatchMode::ModifyLeaf.into(),
            &mut cursor,
            mtr,
        )?;
        let leaf = cursor.page_id()?;
        let (found, last_on_page) = {
            let page = mtr.page(leaf)?;
            let found = match page.record_at(cursor.pos()) {
                Some(rec) => compare_tuple_rec(key, rec)? == Ordering::Equal,
                None => false,
            };
            (found, page.len() == 1)
        };
        if !found {
            return Ok(false);
        }
        if last_on_page && leaf != self.root {
            return Err(PcursorError::Invalid("delete would empty a non-root leaf"));
        }
        let removed = mtr.page_mut(leaf)?.remove(key)?.is_some();
        trace!(target: "pcursor::btree", page = leaf.0, removed, "record deleted");
        Ok(removed)
    }
}

impl std::fmt::Debug for BTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("index", &self.index)
            .field("root", &self.root)
            .field("height", &self.height)
            .finish()
    }
}

/// Installs one level of sibling-linked pages, returning each page id with
/// its first record.
fn install_level(
    pool: &BufferPool,
    level: u16,
    pages: Vec<Vec<Record>>,
) -> Result<Vec<(PageId, Option<Record>)>> {
    let ids: Vec<PageId> = pages.iter().map(|_| pool.reserve_page_id()).collect();
    let mut out = Vec::with_capacity(pages.len());
    for (idx, records) in pages.into_iter().enumerate() {
        let id = ids[idx];
        let mut page = Page::new(id, level);
        page.set_prev(idx.checked_sub(1).map(|prev| ids[prev]));
        page.set_next(ids.get(idx + 1).copied());
        let first = records.first().cloned();
        for rec in records {
            page.push_record(rec);
        }
        pool.install(page)?;
        out.push((id, first));
    }
    Ok(out)
}
