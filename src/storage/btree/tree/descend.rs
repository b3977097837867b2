use tracing::trace;

use super::BTree;
use crate::primitives::latch::{LatchMode, LatchRequest, RwMode};
use crate::primitives::mtr::MiniTransaction;
use crate::primitives::pager::BlockRef;
use crate::storage::btree::cursor::TreeCursor;
use crate::storage::btree::page::{PagePos, SearchMode};
use crate::storage::record::Tuple;
use crate::types::{PageId, PcursorError, Result};

/// End of the tree reached by [`BTree::descend_to_extreme`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Side {
    /// Before the first record.
    Left,
    /// After the last record.
    Right,
}

/// Outcome of [`BTree::optimistic_latch_leaves`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptimisticLatch {
    /// The stored page changed or moved; nothing is latched.
    Failed,
    /// The stored page is latched again, together with its left sibling for
    /// `*Prev` modes.
    Latched {
        /// Left sibling, when latched.
        left: Option<BlockRef>,
    },
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Key(&'a Tuple, SearchMode),
    Side(Side),
}

impl BTree {
    /// Descends from the root to the leaf covering `tuple` and positions
    /// `cursor` on it according to `mode`.
    ///
    /// Leaf modes couple latches on the way down and end up holding only the
    /// leaf (and its left sibling for `*Prev` modes). Tree modes keep every
    /// page on the path latched; modify-tree also latches the leaf's
    /// siblings.
    pub fn descend(
        &self,
        tuple: &Tuple,
        mode: SearchMode,
        request: LatchRequest,
        cursor: &mut TreeCursor,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        self.walk_down(Target::Key(tuple, mode), request, cursor, mtr)
    }

    /// Descends along the leftmost or rightmost edge, leaving `cursor` on
    /// the infimum of the first leaf or the supremum of the last one.
    pub fn descend_to_extreme(
        &self,
        side: Side,
        request: LatchRequest,
        cursor: &mut TreeCursor,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        self.walk_down(Target::Side(side), request, cursor, mtr)
    }

    fn walk_down(
        &self,
        target: Target<'_>,
        request: LatchRequest,
        cursor: &mut TreeCursor,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        let mode = request.mode;
        let upper_rw = self.upper_rw(mode);
        cursor.reset();

        let mut parent: Option<PageId> = None;
        let mut page_id = self.root_page();
        let mut level = self.height().saturating_sub(1);
        while level > 0 {
            mtr.latch(page_id, upper_rw)?;
            if let Some(above) = parent {
                if !mode.retains_path() {
                    mtr.release_page(above)?;
                }
            }
            let page = mtr.page(page_id)?;
            if page.level() != level {
                return Err(PcursorError::Corruption("page level does not match its depth"));
            }
            let slot = match target {
                Target::Key(tuple, search) => page.node_ptr_slot(tuple, search)?,
                Target::Side(Side::Left) => 0,
                Target::Side(Side::Right) => page
                    .len()
                    .checked_sub(1)
                    .ok_or(PcursorError::Corruption("internal page without node pointers"))?,
            };
            let child = page.child_at(slot)?;
            self.stats_ref().inc_internal_searches();
            trace!(
                target: "pcursor::search",
                page = page_id.0,
                level,
                slot,
                child = child.0,
                "node pointer chosen"
            );
            parent = Some(page_id);
            page_id = child;
            level -= 1;
        }

        let (block, left) = self.latch_target(page_id, request, mtr)?;
        if let Some(above) = parent {
            if !mode.retains_path() {
                mtr.release_page(above)?;
            }
        }

        let page = mtr.page(page_id)?;
        if !page.is_leaf() {
            return Err(PcursorError::Corruption("descent ended above the leaf level"));
        }
        let pos = match target {
            Target::Key(tuple, search) => page.search(tuple, search)?,
            Target::Side(Side::Left) => PagePos::Infimum,
            Target::Side(Side::Right) => PagePos::Supremum,
        };
        cursor.set(block, pos);
        cursor.set_left_block(left);
        self.stats_ref().inc_leaf_descents();
        trace!(
            target: "pcursor::search",
            page = page_id.0,
            ?pos,
            ?mode,
            left = left.map(|b| b.page_id.0),
            "leaf reached"
        );
        Ok(())
    }

    /// Latches the target leaf the way `request` asks. The left sibling, when
    /// wanted, is latched before the leaf: the leaf is peeked for its `prev`
    /// link, released, and re-latched after its sibling, retrying if the
    /// link moved in between.
    fn latch_target(
        &self,
        page_id: PageId,
        request: LatchRequest,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<(BlockRef, Option<BlockRef>)> {
        let mode = request.mode;
        let rw = self.leaf_rw(mode);
        let (block, left) = if request.wants_left_sibling() {
            let peek_rw = if self.index().is_intrinsic() {
                RwMode::Fix
            } else {
                RwMode::Shared
            };
            loop {
                mtr.latch(page_id, peek_rw)?;
                let prev = mtr.page(page_id)?.prev();
                mtr.release_page(page_id)?;
                let left = match prev {
                    Some(prev_id) => Some(mtr.latch(prev_id, rw)?),
                    None => None,
                };
                let block = mtr.latch(page_id, rw)?;
                if mtr.page(page_id)?.prev() == prev {
                    if let Some(left) = left {
                        if mtr.page(left.page_id)?.next() != Some(page_id) {
                            return Err(PcursorError::Corruption("sibling links disagree"));
                        }
                    }
                    break (block, left);
                }
                mtr.release_page(page_id)?;
                if let Some(left) = left {
                    mtr.release_page(left.page_id)?;
                }
                trace!(target: "pcursor::search", page = page_id.0, "left sibling changed; retrying");
            }
        } else {
            (mtr.latch(page_id, rw)?, None)
        };
        if mode == LatchMode::ModifyTree {
            let next = mtr.page(page_id)?.next();
            if let Some(next) = next {
                mtr.latch(next, rw)?;
            }
        }
        let left = if mode.latches_left_sibling() { left } else { None };
        Ok((block, left))
    }

    /// Re-latches a stored leaf if its frame still holds it at
    /// `modify_clock`. For `*Prev` modes the left sibling is latched first.
    pub fn optimistic_latch_leaves(
        &self,
        block: BlockRef,
        modify_clock: u64,
        mode: LatchMode,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<OptimisticLatch> {
        if !mode.is_single_page() {
            return Err(PcursorError::ProtocolViolation(
                "optimistic latching needs a single-page latch mode",
            ));
        }
        let rw = self.leaf_rw(mode);
        if !mode.latches_left_sibling() {
            return Ok(if mtr.latch_if_unchanged(block, rw, modify_clock)? {
                OptimisticLatch::Latched { left: None }
            } else {
                OptimisticLatch::Failed
            });
        }

        if !mtr.latch_if_unchanged(block, RwMode::Shared, modify_clock)? {
            return Ok(OptimisticLatch::Failed);
        }
        let prev = mtr.page(block.page_id)?.prev();
        mtr.release_page(block.page_id)?;
        let left = match prev {
            Some(prev_id) => Some(mtr.latch(prev_id, rw)?),
            None => None,
        };
        if !mtr.latch_if_unchanged(block, rw, modify_clock)? {
            if let Some(left) = left {
                mtr.release_page(left.page_id)?;
            }
            return Ok(OptimisticLatch::Failed);
        }
        if let Some(left) = left {
            if mtr.page(left.page_id)?.next() != Some(block.page_id) {
                mtr.release_page(block.page_id)?;
                mtr.release_page(left.page_id)?;
                return Ok(OptimisticLatch::Failed);
            }
        }
        Ok(OptimisticLatch::Latched { left })
    }
}
