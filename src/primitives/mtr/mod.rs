#![forbid(unsafe_code)]
//! Mini-transactions.
//!
//! A [`MiniTransaction`] owns every page latch taken on its behalf and
//! releases them all, newest first, on [`MiniTransaction::commit`] or drop.
//! Latching a page that is already held only bumps a hold count, so one
//! thread never waits on a latch it already owns.

use smallvec::SmallVec;
use tracing::trace;

use crate::primitives::latch::RwMode;
use crate::primitives::pager::{BlockRef, BufferPool, PageLatch, PageMut, PageRef};
use crate::types::{PageId, PcursorError, Result};

/// Latch traffic recorded by a traced mini-transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LatchEvent {
    /// A latch was taken; `latched` pages are held afterwards.
    Acquired {
        /// Page latched.
        page: PageId,
        /// Strength of the latch.
        rw: RwMode,
        /// Pages held after the event.
        latched: usize,
    },
    /// A latch was dropped; `latched` pages are held afterwards.
    Released {
        /// Page released.
        page: PageId,
        /// Pages held after the event.
        latched: usize,
    },
}

impl LatchEvent {
    /// Pages held right after this event.
    pub fn latched(&self) -> usize {
        match *self {
            LatchEvent::Acquired { latched, .. } | LatchEvent::Released { latched, .. } => latched,
        }
    }

    /// Page the event is about.
    pub fn page(&self) -> PageId {
        match *self {
            LatchEvent::Acquired { page, .. } | LatchEvent::Released { page, .. } => page,
        }
    }
}

struct MemoSlot {
    latch: PageLatch,
    holds: u32,
}

/// Scope owning page latches between two commit points.
pub struct MiniTransaction<'p> {
    pool: &'p BufferPool,
    memo: SmallVec<[MemoSlot; 8]>,
    active: bool,
    trace: Option<Vec<LatchEvent>>,
}

impl<'p> MiniTransaction<'p> {
    /// Starts an active mini-transaction against `pool`.
    pub fn start(pool: &'p BufferPool) -> Self {
        Self {
            pool,
            memo: SmallVec::new(),
            active: true,
            trace: None,
        }
    }

    /// Starts a mini-transaction that records every latch event.
    pub fn with_trace(pool: &'p BufferPool) -> Self {
        let mut mtr = Self::start(pool);
        mtr.trace = Some(Vec::new());
        mtr
    }

    /// Pool this mini-transaction latches pages from.
    pub fn pool(&self) -> &'p BufferPool {
        self.pool
    }

    /// Whether latches may currently be taken.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Reopens a committed mini-transaction.
    pub fn begin(&mut self) -> Result<()> {
        if self.active {
            return Err(PcursorError::ProtocolViolation(
                "mini-transaction already active",
            ));
        }
        self.active = true;
        Ok(())
    }

    /// Releases every latch, newest first, and deactivates the scope.
    pub fn commit(&mut self) {
        while let Some(slot) = self.memo.pop() {
            let page = slot.latch.block().page_id;
            drop(slot);
            self.record(LatchEvent::Released {
                page,
                latched: self.memo.len(),
            });
        }
        self.active = false;
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(PcursorError::ProtocolViolation(
                "mini-transaction is not active",
            ))
        }
    }

    fn record(&mut self, event: LatchEvent) {
        if let Some(events) = self.trace.as_mut() {
            events.push(event);
        }
    }

    fn slot_index(&self, page_id: PageId) -> Option<usize> {
        self.memo
            .iter()
            .rposition(|slot| slot.latch.block().page_id == page_id)
    }

    fn slot(&self, page_id: PageId) -> Result<&MemoSlot> {
        self.slot_index(page_id)
            .map(|idx| &self.memo[idx])
            .ok_or(PcursorError::ProtocolViolation(
                "page not latched by this mini-transaction",
            ))
    }

    fn push(&mut self, latch: PageLatch) -> BlockRef {
        let block = latch.block();
        let rw = latch.rw();
        self.memo.push(MemoSlot { latch, holds: 1 });
        trace!(target: "pcursor::mtr", page = block.page_id.0, ?rw, held = self.memo.len(), "latched");
        self.record(LatchEvent::Acquired {
            page: block.page_id,
            rw,
            latched: self.memo.len(),
        });
        block
    }

    /// Latches `page_id` in `rw`, or takes another hold on a latch this
    /// scope already owns.
    pub fn latch(&mut self, page_id: PageId, rw: RwMode) -> Result<BlockRef> {
        self.ensure_active()?;
        if let Some(idx) = self.slot_index(page_id) {
            let slot = &mut self.memo[idx];
            if !slot.latch.rw().covers(rw) {
                return Err(PcursorError::LatchUpgrade { page: page_id });
            }
            slot.holds += 1;
            return Ok(slot.latch.block());
        }
        let latch = self.pool.acquire(page_id, rw)?;
        Ok(self.push(latch))
    }

    /// Latches the frame named by `block` only when it still holds the same
    /// page at `modify_clock`. Returns false, latching nothing, otherwise.
    pub fn latch_if_unchanged(
        &mut self,
        block: BlockRef,
        rw: RwMode,
        modify_clock: u64,
    ) -> Result<bool> {
        self.ensure_active()?;
        if let Some(idx) = self.slot_index(block.page_id) {
            let slot = &mut self.memo[idx];
            let unchanged = slot.latch.block() == block
                && slot.latch.frame()?.modify_clock == modify_clock;
            if !unchanged {
                return Ok(false);
            }
            if !slot.latch.rw().covers(rw) {
                return Err(PcursorError::LatchUpgrade {
                    page: block.page_id,
                });
            }
            slot.holds += 1;
            return Ok(true);
        }
        match self.pool.acquire_if_unchanged(block, rw, modify_clock)? {
            Some(latch) => {
                self.push(latch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drops one hold on `page_id`, releasing the latch with the last hold.
    pub fn release_page(&mut self, page_id: PageId) -> Result<()> {
        let idx = self.slot_index(page_id).ok_or(PcursorError::ProtocolViolation(
            "released a page this mini-transaction does not hold",
        ))?;
        let slot = &mut self.memo[idx];
        slot.holds -= 1;
        if slot.holds == 0 {
            drop(self.memo.remove(idx));
            trace!(target: "pcursor::mtr", page = page_id.0, held = self.memo.len(), "released");
            self.record(LatchEvent::Released {
                page: page_id,
                latched: self.memo.len(),
            });
        }
        Ok(())
    }

    /// Read access to a latched or fixed page.
    pub fn page(&self, page_id: PageId) -> Result<PageRef<'_>> {
        Ok(self.slot(page_id)?.latch.frame()?.map(|frame| &frame.page))
    }

    /// Write access to a page held exclusively or fixed. Advances its modify
    /// clock.
    pub fn page_mut(&mut self, page_id: PageId) -> Result<PageMut<'_>> {
        let idx = self.slot_index(page_id).ok_or(PcursorError::ProtocolViolation(
            "page not latched by this mini-transaction",
        ))?;
        let latch = &mut self.memo[idx].latch;
        if !latch.rw().allows_write() {
            return Err(PcursorError::ProtocolViolation(
                "page modification requires an exclusive latch",
            ));
        }
        latch.page_mut()
    }

    /// Handle of a latched page.
    pub fn block(&self, page_id: PageId) -> Result<BlockRef> {
        Ok(self.slot(page_id)?.latch.block())
    }

    /// Current modify clock of a latched page.
    pub fn modify_clock(&self, page_id: PageId) -> Result<u64> {
        Ok(self.slot(page_id)?.latch.frame()?.modify_clock)
    }

    /// Strength a page is held with, if held.
    pub fn held_rw(&self, page_id: PageId) -> Option<RwMode> {
        self.slot_index(page_id).map(|idx| self.memo[idx].latch.rw())
    }

    /// Whether `page_id` is latched by this scope.
    pub fn holds(&self, page_id: PageId) -> bool {
        self.slot_index(page_id).is_some()
    }

    /// Number of distinct pages latched.
    pub fn latched_pages(&self) -> usize {
        self.memo.len()
    }

    /// Recorded latch events; empty unless started with
    /// [`MiniTransaction::with_trace`].
    pub fn latch_events(&self) -> &[LatchEvent] {
        self.trace.as_deref().unwrap_or(&[])
    }

    /// Clears the recorded latch events.
    pub fn clear_latch_events(&mut self) {
        if let Some(events) = self.trace.as_mut() {
            events.clear();
        }
    }
}

impl Drop for MiniTransaction<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

impl std::fmt::Debug for MiniTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiniTransaction")
            .field("active", &self.active)
            .field(
                "latched",
                &self
                    .memo
                    .iter()
                    .map(|slot| (slot.latch.block().page_id, slot.latch.rw(), slot.holds))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::pager::BufferPoolOptions;
    use crate::storage::btree::page::Page;
    use crate::storage::record::Record;

    fn pool_with_pages(n: usize) -> Result<(BufferPool, Vec<PageId>)> {
        let pool = BufferPool::new(BufferPoolOptions::default())?;
        let mut ids = Vec::new();
        for i in 0..n {
            let id = pool.reserve_page_id();
            let mut page = Page::new(id, 0);
            page.push_record(Record::from_u64s(&[i as u64]));
            pool.install(page)?;
            ids.push(id);
        }
        Ok((pool, ids))
    }

    #[test]
    fn relatching_is_reentrant() -> Result<()> {
        let (pool, ids) = pool_with_pages(1)?;
        let mut mtr = MiniTransaction::start(&pool);
        mtr.latch(ids[0], RwMode::Exclusive)?;
        mtr.latch(ids[0], RwMode::Shared)?;
        assert_eq!(mtr.latched_pages(), 1);
        mtr.release_page(ids[0])?;
        assert!(mtr.holds(ids[0]));
        mtr.release_page(ids[0])?;
        assert!(!mtr.holds(ids[0]));
        assert!(matches!(
            mtr.release_page(ids[0]),
            Err(PcursorError::ProtocolViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn shared_hold_cannot_be_upgraded() -> Result<()> {
        let (pool, ids) = pool_with_pages(1)?;
        let mut mtr = MiniTransaction::start(&pool);
        mtr.latch(ids[0], RwMode::Shared)?;
        assert!(matches!(
            mtr.latch(ids[0], RwMode::Exclusive),
            Err(PcursorError::LatchUpgrade { .. })
        ));
        assert!(matches!(
            mtr.page_mut(ids[0]),
            Err(PcursorError::ProtocolViolation(_))
        ));
        Ok(())
    }

    #[test]
    fn page_mut_bumps_modify_clock() -> Result<()> {
        let (pool, ids) = pool_with_pages(1)?;
        let mut mtr = MiniTransaction::start(&pool);
        mtr.latch(ids[0], RwMode::Exclusive)?;
        let before = mtr.modify_clock(ids[0])?;
        mtr.page_mut(ids[0])?.push_record(Record::from_u64s(&[99]));
        assert_eq!(mtr.modify_clock(ids[0])?, before + 1);
        assert_eq!(mtr.page(ids[0])?.len(), 2);
        Ok(())
    }

    #[test]
    fn fixes_from_two_scopes_coexist() -> Result<()> {
        let (pool, ids) = pool_with_pages(1)?;
        let mut reader = MiniTransaction::start(&pool);
        let mut writer = MiniTransaction::start(&pool);
        reader.latch(ids[0], RwMode::Fix)?;
        writer.latch(ids[0], RwMode::Fix)?;
        writer.page_mut(ids[0])?.push_record(Record::from_u64s(&[5]));
        assert_eq!(reader.page(ids[0])?.len(), 2);
        assert_eq!(reader.modify_clock(ids[0])?, 1);
        Ok(())
    }

    #[test]
    fn commit_releases_in_reverse_order_and_deactivates() -> Result<()> {
        let (pool, ids) = pool_with_pages(3)?;
        let mut mtr = MiniTransaction::with_trace(&pool);
        for id in &ids {
            mtr.latch(*id, RwMode::Shared)?;
        }
        mtr.clear_latch_events();
        mtr.commit();
        let released: Vec<PageId> = mtr.latch_events().iter().map(LatchEvent::page).collect();
        assert_eq!(released, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(mtr.latch_events().last().map(LatchEvent::latched), Some(0));
        assert!(!mtr.is_active());
        assert!(matches!(
            mtr.latch(ids[0], RwMode::Shared),
            Err(PcursorError::ProtocolViolation(_))
        ));
        mtr.begin()?;
        assert!(mtr.begin().is_err());
        mtr.latch(ids[0], RwMode::Exclusive)?;
        Ok(())
    }

    #[test]
    fn conditional_latch_checks_clock() -> Result<()> {
        let (pool, ids) = pool_with_pages(1)?;
        let block = {
            let mut mtr = MiniTransaction::start(&pool);
            let block = mtr.latch(ids[0], RwMode::Exclusive)?;
            mtr.page_mut(ids[0])?;
            block
        };
        let mut mtr = MiniTransaction::start(&pool);
        assert!(!mtr.latch_if_unchanged(block, RwMode::Shared, 0)?);
        assert_eq!(mtr.latched_pages(), 0);
        assert!(mtr.latch_if_unchanged(block, RwMode::Shared, 1)?);
        assert!(mtr.latch_if_unchanged(block, RwMode::Shared, 1)?);
        assert_eq!(mtr.latched_pages(), 1);
        Ok(())
    }
}
