//! Persistent cursors.
//!
//! A [`PersistentCursor`] can be stored, have its latches released with the
//! mini-transaction that owned them, and later be restored to the logically
//! same place. Restoration re-latches the stored page directly when its
//! witnesses prove nothing moved, and searches the tree again otherwise.
//! Callers learn only whether they are back on the very same record.

use std::cmp::Ordering;
use std::ptr;

use serde::Deserialize;
use tracing::{debug, trace};

use super::cursor::TreeCursor;
use super::page::{PagePos, SearchMode};
use super::snapshot::{
    PositionState, RecordSnapshot, RelativePosition, StoredPosition, Witnesses,
};
use super::tree::{BTree, OptimisticLatch, Side};
use crate::primitives::latch::{LatchMode, LatchRequest};
use crate::primitives::mtr::MiniTransaction;
use crate::primitives::pager::{BlockRef, PageRef};
use crate::storage::record::{compare_tuple_rec, Record, Tuple};
use crate::types::{PageId, PcursorError, Result};

/// Cursor behaviour switches.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CursorOptions {
    /// After an optimistic restore onto the stored record, check that the
    /// record under the cursor still carries the stored key.
    pub verify_restores: bool,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            verify_restores: cfg!(debug_assertions),
        }
    }
}

/// Cursor that survives releasing its latches.
#[derive(Clone)]
pub struct PersistentCursor<'t> {
    tree: &'t BTree,
    btr: TreeCursor,
    snapshot: RecordSnapshot,
    stored: Option<StoredPosition>,
    pos_state: PositionState,
    latch_mode: LatchMode,
    search_mode: SearchMode,
    options: CursorOptions,
}

impl<'t> PersistentCursor<'t> {
    /// Creates an unpositioned cursor on `tree`.
    pub fn new(tree: &'t BTree) -> Self {
        Self::with_options(tree, CursorOptions::default())
    }

    /// Creates an unpositioned cursor with explicit options.
    pub fn with_options(tree: &'t BTree, options: CursorOptions) -> Self {
        Self {
            tree,
            btr: TreeCursor::default(),
            snapshot: RecordSnapshot::default(),
            stored: None,
            pos_state: PositionState::NotPositioned,
            latch_mode: LatchMode::NoLatches,
            search_mode: SearchMode::GreaterOrEqual,
            options,
        }
    }

    /// Tree the cursor walks.
    pub fn tree(&self) -> &'t BTree {
        self.tree
    }

    /// Underlying tree-search cursor.
    pub fn tree_cursor(&self) -> &TreeCursor {
        &self.btr
    }

    /// Latch state.
    pub fn position_state(&self) -> PositionState {
        self.pos_state
    }

    /// Relative position of the last store, if one is held.
    pub fn rel_pos(&self) -> Option<RelativePosition> {
        self.stored.map(|stored| stored.rel_pos)
    }

    /// Witnesses of the last store, if one is held and keyed.
    pub fn witnesses(&self) -> Option<Witnesses> {
        self.stored.and_then(|stored| stored.witnesses)
    }

    /// Key prefix of the last store.
    pub fn stored_key(&self) -> Option<&RecordSnapshot> {
        match self.stored {
            Some(_) if self.snapshot.is_keyed() => Some(&self.snapshot),
            _ => None,
        }
    }

    /// Latch mode the cursor holds its page with.
    pub fn latch_mode(&self) -> LatchMode {
        self.latch_mode
    }

    /// Search mode the cursor was opened with.
    pub fn search_mode(&self) -> SearchMode {
        self.search_mode
    }

    /// Page the cursor is on.
    pub fn page_id(&self) -> Result<PageId> {
        self.btr.page_id()
    }

    /// Block the cursor is on.
    pub fn block(&self) -> Option<BlockRef> {
        self.btr.block()
    }

    /// Slot on the current page.
    pub fn page_pos(&self) -> PagePos {
        self.btr.pos()
    }

    /// Current page, read through the latch or fix held by `mtr`.
    pub fn current_page<'m>(&self, mtr: &'m MiniTransaction<'_>) -> Result<PageRef<'m>> {
        mtr.page(self.btr.page_id()?)
    }

    /// Record under the cursor, `None` on a sentinel.
    pub fn current_record<'m>(
        &self,
        mtr: &'m MiniTransaction<'_>,
    ) -> Result<Option<PageRef<'m, Record>>> {
        let page = self.current_page(mtr)?;
        match self.btr.pos() {
            PagePos::Rec(idx) => page
                .try_map(|page| page.records().get(idx))
                .map(Some)
                .ok_or(PcursorError::Corruption("cursor slot past page end")),
            PagePos::Infimum | PagePos::Supremum => Ok(None),
        }
    }

    /// Whether the cursor is on a user record.
    pub fn is_on_user_rec(&self) -> bool {
        matches!(self.btr.pos(), PagePos::Rec(_))
    }

    /// Whether the cursor is on the page infimum.
    pub fn is_before_first_on_page(&self) -> bool {
        self.btr.pos() == PagePos::Infimum
    }

    /// Whether the cursor is on the page supremum.
    pub fn is_after_last_on_page(&self) -> bool {
        self.btr.pos() == PagePos::Supremum
    }

    /// Whether the cursor is on the infimum of the first leaf.
    pub fn is_before_first_in_tree(&self, mtr: &MiniTransaction<'_>) -> Result<bool> {
        if self.current_page(mtr)?.prev().is_some() {
            return Ok(false);
        }
        Ok(self.is_before_first_on_page())
    }

    /// Whether the cursor is on the supremum of the last leaf.
    pub fn is_after_last_in_tree(&self, mtr: &MiniTransaction<'_>) -> Result<bool> {
        if self.current_page(mtr)?.next().is_some() {
            return Ok(false);
        }
        Ok(self.is_after_last_on_page())
    }

    fn ensure_latched(&self, what: &'static str) -> Result<()> {
        if self.pos_state.is_latched() {
            Ok(())
        } else {
            Err(PcursorError::ProtocolViolation(what))
        }
    }

    fn ensure_positioned(&self, what: &'static str) -> Result<()> {
        if self.pos_state == PositionState::Positioned {
            Ok(())
        } else {
            Err(PcursorError::ProtocolViolation(what))
        }
    }

    fn ensure_traversable(&self) -> Result<()> {
        self.ensure_positioned("cursor movement requires a positioned cursor")?;
        if self.latch_mode == LatchMode::NoLatches {
            return Err(PcursorError::ProtocolViolation(
                "cursor movement requires a latch mode",
            ));
        }
        Ok(())
    }

    /// Accepts the record an optimistic restore left the cursor on.
    ///
    /// A restore from a `Before` or `After` position that lands on a user
    /// record leaves the cursor [`PositionState::PositionedOptimistic`];
    /// storing and moving are refused until the caller settles it here.
    pub fn settle_position(&mut self) -> Result<()> {
        match self.pos_state {
            PositionState::Positioned => Ok(()),
            PositionState::PositionedOptimistic => {
                self.pos_state = PositionState::Positioned;
                Ok(())
            }
            PositionState::WasPositioned | PositionState::NotPositioned => Err(
                PcursorError::ProtocolViolation("only a latched cursor can settle its position"),
            ),
        }
    }

    /// Forgets position, stored key and latch mode.
    pub fn reset(&mut self) {
        self.btr.reset();
        self.snapshot = RecordSnapshot::default();
        self.stored = None;
        self.pos_state = PositionState::NotPositioned;
        self.latch_mode = LatchMode::NoLatches;
    }

    /// Positions the cursor on `tuple` without resetting what was stored.
    pub fn open_no_init(
        &mut self,
        tuple: &Tuple,
        mode: SearchMode,
        request: impl Into<LatchRequest>,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        let request = request.into();
        self.latch_mode = request.without_intention();
        self.search_mode = mode;
        self.tree.descend(tuple, mode, request, &mut self.btr, mtr)?;
        self.pos_state = PositionState::Positioned;
        Ok(())
    }

    /// Positions a fresh cursor on `tuple`.
    pub fn open(
        &mut self,
        tuple: &Tuple,
        mode: SearchMode,
        request: impl Into<LatchRequest>,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        self.stored = None;
        self.snapshot.clear();
        self.open_no_init(tuple, mode, request, mtr)
    }

    /// Positions the cursor on the infimum of the first leaf (`Side::Left`)
    /// or the supremum of the last one (`Side::Right`).
    pub fn open_at_side(
        &mut self,
        side: Side,
        request: impl Into<LatchRequest>,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        let request = request.into();
        self.stored = None;
        self.snapshot.clear();
        self.latch_mode = request.without_intention();
        self.search_mode = match side {
            Side::Left => SearchMode::GreaterOrEqual,
            Side::Right => SearchMode::LessOrEqual,
        };
        self.tree
            .descend_to_extreme(side, request, &mut self.btr, mtr)?;
        self.pos_state = PositionState::Positioned;
        Ok(())
    }

    /// Opens on the first user record satisfying an ascending `mode`.
    /// Descending modes are not supported and fail before any latching.
    pub fn open_on_user_rec(
        &mut self,
        tuple: &Tuple,
        mode: SearchMode,
        request: impl Into<LatchRequest>,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<()> {
        if !mode.is_ascending() {
            return Err(PcursorError::Unimplemented(
                "opening on a user record with a descending search mode",
            ));
        }
        self.open(tuple, mode, request, mtr)?;
        if self.is_after_last_on_page() {
            self.move_to_next_user_rec(mtr)?;
        }
        Ok(())
    }

    /// Records the current position so it can be restored after the latches
    /// are released. Releases nothing.
    pub fn store(&mut self, mtr: &MiniTransaction<'_>) -> Result<()> {
        self.ensure_positioned("store requires a positioned cursor")?;
        let page_id = self.btr.page_id()?;
        if !mtr.holds(page_id) {
            return Err(PcursorError::ProtocolViolation(
                "store requires the cursor page to be latched",
            ));
        }
        let page = mtr.page(page_id)?;
        let pos = self.btr.pos();
        if page.is_empty() {
            if page.prev().is_some() || page.next().is_some() {
                return Err(PcursorError::Corruption("empty leaf with siblings"));
            }
            let rel_pos = if pos == PagePos::Supremum {
                RelativePosition::AfterLastInTree
            } else {
                RelativePosition::BeforeFirstInTree
            };
            self.snapshot.clear();
            self.stored = Some(StoredPosition {
                rel_pos,
                witnesses: None,
            });
            self.tree.stats_ref().inc_stores();
            trace!(target: "pcursor::store", page = page_id.0, ?rel_pos, "stored empty-tree position");
            return Ok(());
        }

        let (rec, rel_pos) = match pos {
            PagePos::Supremum => (page.last_record(), RelativePosition::After),
            PagePos::Infimum => (page.first_record(), RelativePosition::Before),
            PagePos::Rec(idx) => (page.records().get(idx), RelativePosition::On),
        };
        let rec = rec.ok_or(PcursorError::Corruption("cursor slot past page end"))?;
        self.snapshot.capture(rec, self.tree.index().n_unique())?;
        drop(page);
        let witnesses = Witnesses {
            block: mtr.block(page_id)?,
            modify_clock: mtr.modify_clock(page_id)?,
            recycle_epoch: mtr.pool().recycle_epoch(),
        };
        self.stored = Some(StoredPosition {
            rel_pos,
            witnesses: Some(witnesses),
        });
        self.tree.stats_ref().inc_stores();
        trace!(
            target: "pcursor::store",
            page = page_id.0,
            ?pos,
            ?rel_pos,
            modify_clock = witnesses.modify_clock,
            recycle_epoch = witnesses.recycle_epoch,
            "stored position"
        );
        Ok(())
    }

    /// Copies the stored position, position state and key of `src` into
    /// this cursor, replacing whatever it held.
    pub fn copy_stored_position(&mut self, src: &PersistentCursor<'t>) -> Result<()> {
        if !ptr::eq(self.tree, src.tree) {
            return Err(PcursorError::Invalid(
                "stored positions can only be copied between cursors on the same tree",
            ));
        }
        self.btr = src.btr;
        self.snapshot.clone_from(&src.snapshot);
        self.stored = src.stored;
        self.pos_state = src.pos_state;
        self.latch_mode = src.latch_mode;
        self.search_mode = src.search_mode;
        Ok(())
    }

    /// Restores the stored position under `request`.
    ///
    /// Returns true only when the cursor is back on a record equal to the
    /// stored one and the stored position was on it. Tree-boundary positions
    /// always search and return false. Otherwise the stored page is
    /// re-latched when single-page latching is requested and its witnesses
    /// are still valid; failing that, the tree is searched again and the
    /// position re-stored.
    pub fn restore(
        &mut self,
        request: impl Into<LatchRequest>,
        mtr: &mut MiniTransaction<'_>,
    ) -> Result<bool> {
        let request = request.into();
        if !mtr.is_active() {
            return Err(PcursorError::ProtocolViolation(
                "restore requires an active mini-transaction",
            ));
        }
        let stored = self.stored.ok_or(PcursorError::ProtocolViolation(
            "restore without a stored position",
        ))?;
        if !self.pos_state.is_restorable() {
            return Err(PcursorError::ProtocolViolation(
                "restore of a cursor that was never positioned",
            ));
        }
        let mode = request.without_intention();
        let tree = self.tree;
        let stats = tree.stats_ref();

        if stored.rel_pos.is_tree_boundary() {
            let side = match stored.rel_pos {
                RelativePosition::BeforeFirstInTree => Side::Left,
                _ => Side::Right,
            };
            tree.descend_to_extreme(side, request, &mut self.btr, mtr)?;
            self.latch_mode = mode;
            self.pos_state = PositionState::Positioned;
            stats.inc_boundary_restores();
            trace!(target: "pcursor::restore", ?side, "restored empty-tree position");
            return Ok(false);
        }

        if !self.snapshot.is_keyed() {
            return Err(PcursorError::ProtocolViolation(
                "stored position has no key",
            ));
        }

        if mode.is_single_page() && !tree.index().is_intrinsic() {
            if let Some(witnesses) = stored.witnesses {
                if mtr.pool().is_epoch_obsolete(witnesses.recycle_epoch) {
                    stats.inc_epoch_rejections();
                    trace!(
                        target: "pcursor::restore",
                        stored_epoch = witnesses.recycle_epoch,
                        "recycle epoch moved; searching"
                    );
                } else {
                    match tree.optimistic_latch_leaves(
                        witnesses.block,
                        witnesses.modify_clock,
                        mode,
                        mtr,
                    )? {
                        OptimisticLatch::Latched { left } => {
                            return self.finish_optimistic(
                                stored.rel_pos,
                                witnesses.block,
                                left,
                                mode,
                                mtr,
                            );
                        }
                        OptimisticLatch::Failed => {
                            stats.inc_clock_mismatches();
                            trace!(
                                target: "pcursor::restore",
                                page = witnesses.block.page_id.0,
                                stored_clock = witnesses.modify_clock,
                                "stored page changed; searching"
                            );
                        }
                    }
                }
            }
        }

        let tuple = self.snapshot.to_search_tuple()?;
        let search = stored
            .rel_pos
            .restore_search_mode()
            .ok_or(PcursorError::ProtocolViolation("boundary position reached the search path"))?;
        let old_mode = self.search_mode;
        self.open_no_init(&tuple, search, request, mtr)?;
        self.search_mode = old_mode;
        stats.inc_pessimistic_restores();

        if stored.rel_pos == RelativePosition::On {
            let exact = match self.current_record(mtr)? {
                Some(rec) => compare_tuple_rec(&tuple, &rec)? == Ordering::Equal,
                None => false,
            };
            if exact {
                let page_id = self.btr.page_id()?;
                self.stored = Some(StoredPosition {
                    rel_pos: RelativePosition::On,
                    witnesses: Some(Witnesses {
                        block: mtr.block(page_id)?,
                        modify_clock: mtr.modify_clock(page_id)?,
                        recycle_epoch: mtr.pool().recycle_epoch(),
                    }),
                });
                stats.inc_pessimistic_exact_hits();
                debug!(target: "pcursor::restore", page = page_id.0, "searched back onto the stored record");
                return Ok(true);
            }
        }

        self.store(mtr)?;
        debug!(
            target: "pcursor::restore",
            page = self.btr.page_id()?.0,
            pos = ?self.btr.pos(),
            "searched near the stored record"
        );
        Ok(false)
    }

    fn finish_optimistic(
        &mut self,
        rel_pos: RelativePosition,
        block: BlockRef,
        left: Option<BlockRef>,
        mode: LatchMode,
        mtr: &MiniTransaction<'_>,
    ) -> Result<bool> {
        self.btr.set(block, self.btr.pos());
        self.btr.set_left_block(left);
        self.pos_state = PositionState::Positioned;
        self.latch_mode = mode;
        self.tree.stats_ref().inc_optimistic_restores();
        trace!(target: "pcursor::restore", page = block.page_id.0, ?rel_pos, "restored optimistically");

        if rel_pos == RelativePosition::On {
            if self.options.verify_restores {
                let same = match self.current_record(mtr)? {
                    Some(rec) => self.snapshot.matches_prefix(&rec)?,
                    None => false,
                };
                if !same {
                    return Err(PcursorError::ProtocolViolation(
                        "optimistic restore landed on a different record",
                    ));
                }
            }
            return Ok(true);
        }
        if self.is_on_user_rec() {
            self.pos_state = PositionState::PositionedOptimistic;
        }
        Ok(false)
    }

    /// Stores the position and commits `mtr`, leaving the cursor
    /// restorable.
    pub fn commit_specify_mtr(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<()> {
        self.ensure_latched("commit requires a positioned cursor")?;
        self.pos_state = PositionState::WasPositioned;
        self.latch_mode = LatchMode::NoLatches;
        mtr.commit();
        Ok(())
    }

    /// Steps forward within the page. Stays on the supremum.
    pub fn move_to_next_on_page(&mut self, mtr: &MiniTransaction<'_>) -> Result<()> {
        self.ensure_positioned("cursor movement requires a positioned cursor")?;
        let next = self.current_page(mtr)?.next_pos(self.btr.pos());
        self.btr.set_pos(next);
        self.pos_state = PositionState::Positioned;
        self.stored = None;
        Ok(())
    }

    /// Steps backward within the page. Stays on the infimum.
    pub fn move_to_prev_on_page(&mut self, mtr: &MiniTransaction<'_>) -> Result<()> {
        self.ensure_positioned("cursor movement requires a positioned cursor")?;
        let prev = self.current_page(mtr)?.prev_pos(self.btr.pos());
        self.btr.set_pos(prev);
        self.pos_state = PositionState::Positioned;
        self.stored = None;
        Ok(())
    }

    /// Moves to the last user record of the page, or the infimum when the
    /// page is empty.
    pub fn move_to_last_on_page(&mut self, mtr: &MiniTransaction<'_>) -> Result<()> {
        self.ensure_positioned("cursor movement requires a positioned cursor")?;
        let last = self.current_page(mtr)?.prev_pos(PagePos::Supremum);
        self.btr.set_pos(last);
        self.pos_state = PositionState::Positioned;
        self.stored = None;
        Ok(())
    }

    /// Moves from the supremum onto the infimum of the right sibling. The
    /// sibling is latched before the current page is released.
    pub fn move_to_next_page(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<()> {
        self.ensure_traversable()?;
        if !self.is_after_last_on_page() {
            return Err(PcursorError::ProtocolViolation(
                "next page move requires the cursor on the supremum",
            ));
        }
        self.stored = None;
        let current = self.btr.page_id()?;
        let next = self
            .current_page(mtr)?
            .next()
            .ok_or(PcursorError::ProtocolViolation("no page after the last leaf"))?;

        if let Some(left) = self.btr.take_left_block() {
            mtr.release_page(left.page_id)?;
        }
        let mode = self.latch_mode.to_leaf_only();
        let next_block = mtr.latch(next, self.tree.leaf_rw(mode))?;
        if mtr.page(next)?.prev() != Some(current) {
            return Err(PcursorError::Corruption("sibling links disagree"));
        }
        mtr.release_page(current)?;

        self.btr.set(next_block, PagePos::Infimum);
        self.latch_mode = mode;
        self.pos_state = PositionState::Positioned;
        self.tree.stats_ref().inc_forward_page_moves();
        trace!(target: "pcursor::traverse", from = current.0, to = next.0, ?mode, "moved to next page");
        Ok(())
    }

    /// Moves from the infimum onto the last record of the left sibling.
    ///
    /// Latches are only ever taken left to right, so the position is stored,
    /// the scope committed and restarted, and the position restored with the
    /// `*Prev` variant of the latch mode, which latches the left sibling
    /// first.
    pub fn move_backward_from_page(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<()> {
        self.ensure_traversable()?;
        if !self.is_before_first_on_page() {
            return Err(PcursorError::ProtocolViolation(
                "backward page move requires the cursor on the infimum",
            ));
        }
        if self.is_before_first_in_tree(mtr)? {
            return Err(PcursorError::ProtocolViolation(
                "backward page move from the first leaf",
            ));
        }
        let old_mode = self.latch_mode;
        let prev_mode = old_mode.prev_variant().ok_or(PcursorError::ProtocolViolation(
            "backward page move needs a plain leaf latch mode",
        ))?;
        let from = self.btr.page_id()?;

        self.store(mtr)?;
        mtr.commit();
        mtr.begin()?;
        self.restore(prev_mode, mtr)?;

        let current = self.btr.page_id()?;
        if self.current_page(mtr)?.prev().is_some() {
            if self.is_before_first_on_page() {
                let left = self.btr.take_left_block().ok_or(PcursorError::ProtocolViolation(
                    "left sibling not latched after restore",
                ))?;
                mtr.release_page(current)?;
                self.btr.set(left, PagePos::Supremum);
                let last = self.current_page(mtr)?.prev_pos(PagePos::Supremum);
                self.btr.set_pos(last);
            } else if let Some(left) = self.btr.take_left_block() {
                mtr.release_page(left.page_id)?;
            }
        }

        self.latch_mode = old_mode;
        self.pos_state = PositionState::Positioned;
        self.stored = None;
        self.tree.stats_ref().inc_backward_page_moves();
        trace!(
            target: "pcursor::traverse",
            from = from.0,
            to = self.btr.page_id()?.0,
            pos = ?self.btr.pos(),
            "moved backward from page"
        );
        Ok(())
    }

    /// Steps one position forward, crossing to the next page from the
    /// supremum. Returns false on the supremum of the last leaf.
    pub fn move_to_next(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<bool> {
        self.ensure_traversable()?;
        self.stored = None;
        if self.is_after_last_on_page() {
            if self.is_after_last_in_tree(mtr)? {
                return Ok(false);
            }
            self.move_to_next_page(mtr)?;
            return Ok(true);
        }
        self.move_to_next_on_page(mtr)?;
        Ok(true)
    }

    /// Steps forward until the cursor is on a user record. Returns false
    /// when the tree has no further record.
    pub fn move_to_next_user_rec(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<bool> {
        self.ensure_traversable()?;
        self.stored = None;
        loop {
            if self.is_after_last_on_page() {
                if self.is_after_last_in_tree(mtr)? {
                    return Ok(false);
                }
                self.move_to_next_page(mtr)?;
            } else {
                self.move_to_next_on_page(mtr)?;
            }
            if self.is_on_user_rec() {
                return Ok(true);
            }
        }
    }

    /// Steps one position backward. From the infimum this crosses onto the
    /// last record of the left sibling. Returns false, without moving, on
    /// the infimum of the first leaf.
    pub fn move_to_prev(&mut self, mtr: &mut MiniTransaction<'_>) -> Result<bool> {
        self.ensure_traversable()?;
        self.stored = None;
        if self.is_before_first_on_page() {
            if self.is_before_first_in_tree(mtr)? {
                return Ok(false);
            }
            self.move_backward_from_page(mtr)?;
            return Ok(true);
        }
        self.move_to_prev_on_page(mtr)?;
        Ok(true)
    }
}

impl std::fmt::Debug for PersistentCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentCursor")
            .field("index", &self.tree.index().name())
            .field("btr", &self.btr)
            .field("stored", &self.stored)
            .field("key", &hex::encode(self.snapshot.key_bytes()))
            .field("pos_state", &self.pos_state)
            .field("latch_mode", &self.latch_mode)
            .field("search_mode", &self.search_mode)
            .finish()
    }
}
