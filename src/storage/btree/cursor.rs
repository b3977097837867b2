use crate::primitives::pager::BlockRef;
use crate::types::{PageId, PcursorError, Result};

use super::page::PagePos;

/// Position produced by a tree descent: the leaf block, the slot on it, and
/// the left sibling when the descent latched one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TreeCursor {
    block: Option<BlockRef>,
    pos: PagePos,
    left_block: Option<BlockRef>,
}

impl TreeCursor {
    /// Block the cursor is on.
    pub fn block(&self) -> Option<BlockRef> {
        self.block
    }

    /// Page the cursor is on.
    pub fn page_id(&self) -> Result<PageId> {
        self.block
            .map(|block| block.page_id)
            .ok_or(PcursorError::ProtocolViolation("tree cursor is not positioned"))
    }

    /// Slot on the page.
    pub fn pos(&self) -> PagePos {
        self.pos
    }

    /// Left sibling latched by a `*Prev` descent.
    pub fn left_block(&self) -> Option<BlockRef> {
        self.left_block
    }

    pub(crate) fn set(&mut self, block: BlockRef, pos: PagePos) {
        self.block = Some(block);
        self.pos = pos;
    }

    pub(crate) fn set_pos(&mut self, pos: PagePos) {
        self.pos = pos;
    }

    pub(crate) fn set_left_block(&mut self, left: Option<BlockRef>) {
        self.left_block = left;
    }

    pub(crate) fn take_left_block(&mut self) -> Option<BlockRef> {
        self.left_block.take()
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
