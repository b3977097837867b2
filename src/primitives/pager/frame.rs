use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RawRwLock, RwLock, RwLockReadGuard,
    RwLockWriteGuard,
};

use crate::primitives::latch::RwMode;
use crate::storage::btree::page::Page;
use crate::types::{PageId, PcursorError, Result};

/// Contents of one buffer pool frame, protected by the frame's page latch.
#[derive(Debug)]
pub struct Frame {
    pub page_id: PageId,
    pub modify_clock: u64,
    pub vacated: bool,
    pub page: Page,
}

impl Frame {
    pub fn new(page: Page) -> Self {
        Self {
            page_id: page.id(),
            modify_clock: 0,
            vacated: false,
            page,
        }
    }

    /// Whether this frame currently holds `page_id`.
    pub fn holds(&self, page_id: PageId) -> bool {
        !self.vacated && self.page_id == page_id
    }
}

/// Stored page handle: the frame a page lived in and the page it held.
///
/// Only a hint. It is revalidated under the frame latch before any use.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockRef {
    /// Frame index inside the pool.
    pub frame: usize,
    /// Page the frame held when the handle was taken.
    pub page_id: PageId,
}

/// Buffer fix on a frame. Holds no latch; it only keeps the frame from
/// being vacated while any fix is outstanding.
pub(crate) struct FixPin {
    frame: Arc<RwLock<Frame>>,
    pins: Arc<AtomicU32>,
}

impl FixPin {
    pub(crate) fn new(frame: Arc<RwLock<Frame>>, pins: Arc<AtomicU32>) -> Self {
        pins.fetch_add(1, Ordering::AcqRel);
        Self { frame, pins }
    }
}

impl Drop for FixPin {
    fn drop(&mut self) {
        self.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(crate) enum LatchGuard {
    Shared(ArcRwLockReadGuard<RawRwLock, Frame>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, Frame>),
    Fixed(FixPin),
}

enum RefInner<'a, T: ?Sized> {
    Latched(&'a T),
    Fixed(MappedRwLockReadGuard<'a, T>),
}

/// Read access to a page (or a part of it) held by a mini-transaction.
///
/// Latched pages are borrowed straight from the latch. Fixed pages are read
/// under a short frame lock that lasts as long as this value.
pub struct PageRef<'a, T: ?Sized = Page>(RefInner<'a, T>);

impl<'a, T: ?Sized> PageRef<'a, T> {
    /// Narrows the view to a part of the page.
    pub fn map<U: ?Sized>(self, f: impl FnOnce(&T) -> &U) -> PageRef<'a, U> {
        match self.0 {
            RefInner::Latched(value) => PageRef(RefInner::Latched(f(value))),
            RefInner::Fixed(guard) => PageRef(RefInner::Fixed(MappedRwLockReadGuard::map(guard, f))),
        }
    }

    /// Narrows the view to a part that may be missing.
    pub fn try_map<U: ?Sized>(self, f: impl FnOnce(&T) -> Option<&U>) -> Option<PageRef<'a, U>> {
        match self.0 {
            RefInner::Latched(value) => f(value).map(|part| PageRef(RefInner::Latched(part))),
            RefInner::Fixed(guard) => MappedRwLockReadGuard::try_map(guard, f)
                .ok()
                .map(|part| PageRef(RefInner::Fixed(part))),
        }
    }
}

impl<T: ?Sized> Deref for PageRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.0 {
            RefInner::Latched(value) => *value,
            RefInner::Fixed(guard) => &**guard,
        }
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for PageRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

enum MutInner<'a> {
    Latched(&'a mut Page),
    Fixed(MappedRwLockWriteGuard<'a, Page>),
}

/// Write access to a page held exclusively or fixed.
pub struct PageMut<'a>(MutInner<'a>);

impl Deref for PageMut<'_> {
    type Target = Page;

    fn deref(&self) -> &Page {
        match &self.0 {
            MutInner::Latched(page) => &**page,
            MutInner::Fixed(guard) => &**guard,
        }
    }
}

impl DerefMut for PageMut<'_> {
    fn deref_mut(&mut self) -> &mut Page {
        match &mut self.0 {
            MutInner::Latched(page) => &mut **page,
            MutInner::Fixed(guard) => &mut **guard,
        }
    }
}

/// A latched (or fixed) page. Dropping it releases the latch or the fix.
pub struct PageLatch {
    block: BlockRef,
    rw: RwMode,
    guard: LatchGuard,
}

impl PageLatch {
    pub(crate) fn new(block: BlockRef, rw: RwMode, guard: LatchGuard) -> Self {
        Self { block, rw, guard }
    }

    /// Handle of the latched page.
    pub fn block(&self) -> BlockRef {
        self.block
    }

    /// How the page is held.
    pub fn rw(&self) -> RwMode {
        self.rw
    }

    /// Frame contents. A fixed frame is read under a short lock, which fails
    /// while another holder of the fix is modifying the page.
    pub(crate) fn frame(&self) -> Result<PageRef<'_, Frame>> {
        match &self.guard {
            LatchGuard::Shared(guard) => Ok(PageRef(RefInner::Latched(&**guard))),
            LatchGuard::Exclusive(guard) => Ok(PageRef(RefInner::Latched(&**guard))),
            LatchGuard::Fixed(pin) => pin
                .frame
                .try_read()
                .map(|guard| PageRef(RefInner::Fixed(RwLockReadGuard::map(guard, |frame| frame))))
                .ok_or(PcursorError::ProtocolViolation(
                    "fixed page is being modified through another fix",
                )),
        }
    }

    /// Write access to the page. Advances the frame's modify clock.
    pub(crate) fn page_mut(&mut self) -> Result<PageMut<'_>> {
        match &mut self.guard {
            LatchGuard::Exclusive(guard) => {
                guard.modify_clock += 1;
                Ok(PageMut(MutInner::Latched(&mut guard.page)))
            }
            LatchGuard::Fixed(pin) => {
                let mut frame = pin.frame.try_write().ok_or(PcursorError::ProtocolViolation(
                    "fixed page is being read through another fix",
                ))?;
                frame.modify_clock += 1;
                Ok(PageMut(MutInner::Fixed(RwLockWriteGuard::map(frame, |frame| {
                    &mut frame.page
                }))))
            }
            LatchGuard::Shared(_) => Err(PcursorError::ProtocolViolation(
                "page modification requires an exclusive latch",
            )),
        }
    }
}

impl fmt::Debug for PageLatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageLatch")
            .field("block", &self.block)
            .field("rw", &self.rw)
            .finish()
    }
}
