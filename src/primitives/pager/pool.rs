use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use super::frame::{BlockRef, FixPin, Frame, LatchGuard, PageLatch};
use crate::primitives::latch::RwMode;
use crate::storage::btree::page::Page;
use crate::types::{PageId, PcursorError, Result};

/// Configuration for the buffer pool.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct BufferPoolOptions {
    /// Maximum number of frames, vacated frames included.
    pub capacity_pages: usize,
    /// Give up on a latch wait after this many milliseconds. `None` blocks.
    pub latch_timeout_ms: Option<u64>,
}

impl Default for BufferPoolOptions {
    fn default() -> Self {
        Self {
            capacity_pages: 4096,
            latch_timeout_ms: None,
        }
    }
}

impl BufferPoolOptions {
    /// Latch wait limit as a [`Duration`].
    pub fn latch_timeout(&self) -> Option<Duration> {
        self.latch_timeout_ms.map(Duration::from_millis)
    }

    /// Rejects unusable settings.
    pub fn validate(&self) -> Result<()> {
        if self.capacity_pages == 0 {
            return Err(PcursorError::Config(
                "buffer pool capacity must be at least one page".into(),
            ));
        }
        if self.latch_timeout_ms == Some(0) {
            return Err(PcursorError::Config(
                "latch timeout must be positive when set".into(),
            ));
        }
        Ok(())
    }
}

/// Counters describing latch traffic through the pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Shared latches granted.
    pub shared_latches: u64,
    /// Exclusive latches granted.
    pub exclusive_latches: u64,
    /// Buffer fixes granted.
    pub fixes: u64,
    /// Optimistic re-latches that found the page unchanged.
    pub optimistic_hits: u64,
    /// Optimistic re-latches rejected because the frame or clock moved.
    pub optimistic_misses: u64,
    /// Pages moved to another frame.
    pub relocations: u64,
    /// Latch waits that hit the configured timeout.
    pub latch_timeouts: u64,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s={} x={} fix={} opt_hit={} opt_miss={} relocated={} timeouts={}",
            self.shared_latches,
            self.exclusive_latches,
            self.fixes,
            self.optimistic_hits,
            self.optimistic_misses,
            self.relocations,
            self.latch_timeouts
        )
    }
}

#[derive(Default)]
struct PoolCounters {
    shared_latches: AtomicU64,
    exclusive_latches: AtomicU64,
    fixes: AtomicU64,
    optimistic_hits: AtomicU64,
    optimistic_misses: AtomicU64,
    relocations: AtomicU64,
    latch_timeouts: AtomicU64,
}

impl PoolCounters {
    fn granted(&self, rw: RwMode) {
        let counter = match rw {
            RwMode::Shared => &self.shared_latches,
            RwMode::Exclusive => &self.exclusive_latches,
            RwMode::Fix => &self.fixes,
        };
        counter.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

#[derive(Clone)]
struct FrameSlot {
    latch: Arc<RwLock<Frame>>,
    pins: Arc<AtomicU32>,
}

impl FrameSlot {
    fn new(frame: Frame) -> Self {
        Self {
            latch: Arc::new(RwLock::new(frame)),
            pins: Arc::new(AtomicU32::new(0)),
        }
    }

    fn is_fixed(&self) -> bool {
        self.pins.load(AtomicOrdering::Acquire) > 0
    }
}

struct PoolInner {
    frames: Vec<FrameSlot>,
    page_table: HashMap<PageId, usize>,
    free_frames: Vec<usize>,
    next_page: u64,
}

/// In-memory page cache handing out page latches.
///
/// Each frame's `RwLock` is the page latch. The recycle epoch advances every
/// time a frame is vacated so stale [`BlockRef`]s can be rejected without
/// touching the frame they name. Buffer fixes take no latch: they pin the
/// frame so it cannot be vacated, and any number of them coexist.
pub struct BufferPool {
    options: BufferPoolOptions,
    inner: Mutex<PoolInner>,
    recycle_epoch: AtomicU64,
    counters: PoolCounters,
}

impl BufferPool {
    /// Creates an empty pool.
    pub fn new(options: BufferPoolOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            inner: Mutex::new(PoolInner {
                frames: Vec::new(),
                page_table: HashMap::new(),
                free_frames: Vec::new(),
                next_page: 1,
            }),
            recycle_epoch: AtomicU64::new(0),
            counters: PoolCounters::default(),
        })
    }

    /// Active configuration.
    pub fn options(&self) -> &BufferPoolOptions {
        &self.options
    }

    /// Hands out a fresh page identifier.
    pub fn reserve_page_id(&self) -> PageId {
        let mut inner = self.inner.lock();
        let id = PageId(inner.next_page);
        inner.next_page += 1;
        id
    }

    /// Makes `page` resident in a frame.
    pub fn install(&self, page: Page) -> Result<BlockRef> {
        let page_id = page.id();
        let mut inner = self.inner.lock();
        if inner.page_table.contains_key(&page_id) {
            return Err(PcursorError::Invalid("page already resident"));
        }
        let frame = Frame::new(page);
        let idx = match inner.free_frames.pop() {
            Some(idx) => {
                *inner.frames[idx].latch.write() = frame;
                idx
            }
            None => {
                if inner.frames.len() >= self.options.capacity_pages {
                    return Err(PcursorError::PoolExhausted {
                        capacity: self.options.capacity_pages,
                    });
                }
                inner.frames.push(FrameSlot::new(frame));
                inner.frames.len() - 1
            }
        };
        inner.page_table.insert(page_id, idx);
        trace!(target: "pcursor::pool", page = page_id.0, frame = idx, "page installed");
        Ok(BlockRef {
            frame: idx,
            page_id,
        })
    }

    fn lookup(&self, page_id: PageId) -> Result<(usize, FrameSlot)> {
        let inner = self.inner.lock();
        let idx = *inner
            .page_table
            .get(&page_id)
            .ok_or(PcursorError::PageNotFound(page_id))?;
        Ok((idx, inner.frames[idx].clone()))
    }

    fn lock_frame(&self, slot: &FrameSlot, page_id: PageId, rw: RwMode) -> Result<LatchGuard> {
        let latch = &slot.latch;
        let guard = match (rw, self.options.latch_timeout()) {
            (RwMode::Shared, None) => Some(LatchGuard::Shared(latch.read_arc())),
            (RwMode::Shared, Some(limit)) => latch.try_read_arc_for(limit).map(LatchGuard::Shared),
            (RwMode::Exclusive, None) => Some(LatchGuard::Exclusive(latch.write_arc())),
            (RwMode::Exclusive, Some(limit)) => {
                latch.try_write_arc_for(limit).map(LatchGuard::Exclusive)
            }
            (RwMode::Fix, _) => {
                return Ok(LatchGuard::Fixed(FixPin::new(
                    Arc::clone(latch),
                    Arc::clone(&slot.pins),
                )));
            }
        };
        guard.ok_or_else(|| {
            self.counters
                .latch_timeouts
                .fetch_add(1, AtomicOrdering::Relaxed);
            warn!(target: "pcursor::pool", page = page_id.0, ?rw, "latch wait timed out");
            PcursorError::LatchTimeout { page: page_id }
        })
    }

    /// Latches `page_id`, blocking (or timing out) while it is held
    /// incompatibly elsewhere.
    pub fn acquire(&self, page_id: PageId, rw: RwMode) -> Result<PageLatch> {
        loop {
            let (idx, slot) = self.lookup(page_id)?;
            let guard = self.lock_frame(&slot, page_id, rw)?;
            let latched = PageLatch::new(
                BlockRef {
                    frame: idx,
                    page_id,
                },
                rw,
                guard,
            );
            if latched.frame()?.holds(page_id) {
                self.counters.granted(rw);
                return Ok(latched);
            }
            trace!(target: "pcursor::pool", page = page_id.0, frame = idx, "page moved while waiting; retrying");
        }
    }

    /// Latches the frame named by `block` only if it still holds the same
    /// page with the same modify clock.
    pub fn acquire_if_unchanged(
        &self,
        block: BlockRef,
        rw: RwMode,
        modify_clock: u64,
    ) -> Result<Option<PageLatch>> {
        let slot = {
            let inner = self.inner.lock();
            match inner.frames.get(block.frame) {
                Some(slot) => slot.clone(),
                None => return Ok(None),
            }
        };
        let guard = self.lock_frame(&slot, block.page_id, rw)?;
        let latched = PageLatch::new(block, rw, guard);
        let frame = latched.frame()?;
        if !frame.holds(block.page_id) || frame.modify_clock != modify_clock {
            self.counters
                .optimistic_misses
                .fetch_add(1, AtomicOrdering::Relaxed);
            trace!(
                target: "pcursor::pool",
                page = block.page_id.0,
                frame = block.frame,
                stored_clock = modify_clock,
                current_clock = frame.modify_clock,
                vacated = frame.vacated,
                "optimistic latch rejected"
            );
            return Ok(None);
        }
        drop(frame);
        self.counters.granted(rw);
        self.counters
            .optimistic_hits
            .fetch_add(1, AtomicOrdering::Relaxed);
        Ok(Some(latched))
    }

    /// Current recycle epoch.
    pub fn recycle_epoch(&self) -> u64 {
        self.recycle_epoch.load(AtomicOrdering::Acquire)
    }

    /// Whether any frame has been vacated since `captured` was read.
    pub fn is_epoch_obsolete(&self, captured: u64) -> bool {
        self.recycle_epoch() != captured
    }

    /// Moves `page_id` into another frame, vacating the old one and advancing
    /// the recycle epoch. Buffer-fixed pages stay where they are.
    pub fn relocate(&self, page_id: PageId) -> Result<BlockRef> {
        loop {
            let (old_idx, slot) = self.lookup(page_id)?;
            let mut old = slot.latch.write();
            if !old.holds(page_id) {
                continue;
            }
            if slot.is_fixed() {
                return Err(PcursorError::Invalid("cannot relocate a buffer-fixed page"));
            }
            let mut inner = self.inner.lock();
            let new_idx = match inner.free_frames.pop() {
                Some(idx) => idx,
                None => {
                    if inner.frames.len() >= self.options.capacity_pages {
                        return Err(PcursorError::PoolExhausted {
                            capacity: self.options.capacity_pages,
                        });
                    }
                    let level = old.page.level();
                    inner
                        .frames
                        .push(FrameSlot::new(Frame::new(Page::new(page_id, level))));
                    inner.frames.len() - 1
                }
            };
            let level = old.page.level();
            let moved = Frame {
                page_id,
                modify_clock: old.modify_clock,
                vacated: false,
                page: std::mem::replace(&mut old.page, Page::new(page_id, level)),
            };
            *inner.frames[new_idx].latch.write() = moved;
            old.vacated = true;
            inner.page_table.insert(page_id, new_idx);
            inner.free_frames.push(old_idx);
            let epoch = self.recycle_epoch.fetch_add(1, AtomicOrdering::AcqRel) + 1;
            self.counters
                .relocations
                .fetch_add(1, AtomicOrdering::Relaxed);
            debug!(
                target: "pcursor::pool",
                page = page_id.0,
                from = old_idx,
                to = new_idx,
                epoch,
                "page relocated"
            );
            return Ok(BlockRef {
                frame: new_idx,
                page_id,
            });
        }
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.inner.lock().page_table.len()
    }

    /// Snapshot of the latch counters.
    pub fn stats(&self) -> PoolStats {
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        PoolStats {
            shared_latches: load(&self.counters.shared_latches),
            exclusive_latches: load(&self.counters.exclusive_latches),
            fixes: load(&self.counters.fixes),
            optimistic_hits: load(&self.counters.optimistic_hits),
            optimistic_misses: load(&self.counters.optimistic_misses),
            relocations: load(&self.counters.relocations),
            latch_timeouts: load(&self.counters.latch_timeouts),
        }
    }
}
