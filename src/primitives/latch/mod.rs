#![forbid(unsafe_code)]
//! Latch modes requested by tree descents and persistent cursors.
//!
//! Single-page modes latch only the leaf the cursor ends up on (plus the left
//! sibling for the `*Prev` variants). Tree-spanning modes keep the whole
//! descent path latched. [`LatchMode::to_leaf_only`] is the one place where a
//! tree-spanning mode is demoted to its single-page equivalent.

/// How a single page is held by a mini-transaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RwMode {
    /// Shared latch; other readers may proceed.
    Shared,
    /// Exclusive latch; required for any modification.
    Exclusive,
    /// Buffer fix without a latch, used for intrinsic (single-threaded) trees.
    /// Fixes never wait on each other; the holder may still modify the page.
    Fix,
}

impl RwMode {
    /// Returns true when holding `self` already grants `wanted`.
    pub fn covers(self, wanted: RwMode) -> bool {
        match self {
            RwMode::Exclusive | RwMode::Fix => true,
            RwMode::Shared => wanted == RwMode::Shared,
        }
    }

    /// Returns true when the holder may modify the page.
    pub fn allows_write(self) -> bool {
        matches!(self, RwMode::Exclusive | RwMode::Fix)
    }
}

/// Latch mode for a descent or a positioned cursor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum LatchMode {
    /// Shared latch on the target leaf only.
    SearchLeaf,
    /// Exclusive latch on the target leaf only.
    ModifyLeaf,
    /// Like [`LatchMode::SearchLeaf`], additionally latching the left sibling.
    SearchPrev,
    /// Like [`LatchMode::ModifyLeaf`], additionally latching the left sibling.
    ModifyPrev,
    /// Shared latches on the whole descent path.
    SearchTree,
    /// Exclusive latches on the whole path and the leaf's siblings.
    ModifyTree,
    /// Shared path latches held while a parallel scan partitions the tree.
    ParallelReadInit,
    /// Pages are buffer-fixed but never latched.
    NoLatches,
}

impl LatchMode {
    /// Maps the mode onto the plain single-page mode with the same access
    /// strength. Single-page leaf modes and [`LatchMode::NoLatches`] map to
    /// themselves.
    pub const fn to_leaf_only(self) -> LatchMode {
        match self {
            LatchMode::SearchTree | LatchMode::ParallelReadInit | LatchMode::SearchPrev => {
                LatchMode::SearchLeaf
            }
            LatchMode::ModifyTree | LatchMode::ModifyPrev => LatchMode::ModifyLeaf,
            other => other,
        }
    }

    /// Modes that latch nothing above the leaf level once the descent is done.
    /// Only these are eligible for optimistic restoration.
    pub const fn is_single_page(self) -> bool {
        matches!(
            self,
            LatchMode::SearchLeaf
                | LatchMode::ModifyLeaf
                | LatchMode::SearchPrev
                | LatchMode::ModifyPrev
        )
    }

    /// Modes that keep every page on the descent path latched.
    pub const fn retains_path(self) -> bool {
        matches!(
            self,
            LatchMode::SearchTree | LatchMode::ModifyTree | LatchMode::ParallelReadInit
        )
    }

    /// Modes that latch the left sibling of the target leaf.
    pub const fn latches_left_sibling(self) -> bool {
        matches!(self, LatchMode::SearchPrev | LatchMode::ModifyPrev)
    }

    /// The `*Prev` variant used when stepping backward out of a page.
    pub const fn prev_variant(self) -> Option<LatchMode> {
        match self {
            LatchMode::SearchLeaf => Some(LatchMode::SearchPrev),
            LatchMode::ModifyLeaf => Some(LatchMode::ModifyPrev),
            _ => None,
        }
    }

    /// Latch strength taken on the target leaf.
    pub const fn leaf_rw(self) -> RwMode {
        match self {
            LatchMode::SearchLeaf
            | LatchMode::SearchPrev
            | LatchMode::SearchTree
            | LatchMode::ParallelReadInit => RwMode::Shared,
            LatchMode::ModifyLeaf | LatchMode::ModifyPrev | LatchMode::ModifyTree => {
                RwMode::Exclusive
            }
            LatchMode::NoLatches => RwMode::Fix,
        }
    }

    /// Latch strength taken on internal pages while descending.
    pub const fn upper_rw(self) -> RwMode {
        match self {
            LatchMode::ModifyTree => RwMode::Exclusive,
            LatchMode::NoLatches => RwMode::Fix,
            _ => RwMode::Shared,
        }
    }
}

/// Why a tree-modifying descent is being made.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum LatchIntent {
    /// No structural intention.
    #[default]
    None,
    /// The caller is going to insert; only right siblings can be affected.
    Insert,
    /// The caller is going to delete; both siblings can be affected.
    Delete,
}

/// A latch mode together with an optional intention flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LatchRequest {
    /// Requested mode.
    pub mode: LatchMode,
    /// Intention flag; only meaningful for [`LatchMode::ModifyTree`].
    pub intent: LatchIntent,
}

impl LatchRequest {
    /// Builds a request carrying an intention flag.
    pub const fn with_intent(mode: LatchMode, intent: LatchIntent) -> Self {
        Self { mode, intent }
    }

    /// Drops the intention flag, leaving the mode a cursor remembers.
    pub const fn without_intention(self) -> LatchMode {
        self.mode
    }

    /// Whether a modify-tree descent should also latch the left sibling.
    pub(crate) fn wants_left_sibling(self) -> bool {
        match self.mode {
            LatchMode::ModifyTree => self.intent != LatchIntent::Insert,
            mode => mode.latches_left_sibling(),
        }
    }
}

impl From<LatchMode> for LatchRequest {
    fn from(mode: LatchMode) -> Self {
        Self {
            mode,
            intent: LatchIntent::None,
        }
    }
}
