use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Snapshot of cursor and descent statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorStatsSnapshot {
    /// Positions stored
    pub stores: u64,
    /// Restores satisfied by re-latching the stored page
    pub optimistic_restores: u64,
    /// Optimistic attempts skipped because the recycle epoch moved
    pub epoch_rejections: u64,
    /// Optimistic attempts rejected by the frame or modify clock check
    pub clock_mismatches: u64,
    /// Restores that searched the tree again
    pub pessimistic_restores: u64,
    /// Pessimistic restores that found the stored record again
    pub pessimistic_exact_hits: u64,
    /// Restores of empty-tree positions
    pub boundary_restores: u64,
    /// Latch-coupled moves onto the right sibling
    pub forward_page_moves: u64,
    /// Moves onto the left sibling through a store and restore
    pub backward_page_moves: u64,
    /// Descents that reached a leaf
    pub leaf_descents: u64,
    /// Node-pointer pages searched while descending
    pub internal_searches: u64,
}

/// Thread-safe counters shared by a tree and every cursor opened on it.
#[derive(Default)]
pub struct CursorStats {
    stores: AtomicU64,
    optimistic_restores: AtomicU64,
    epoch_rejections: AtomicU64,
    clock_mismatches: AtomicU64,
    pessimistic_restores: AtomicU64,
    pessimistic_exact_hits: AtomicU64,
    boundary_restores: AtomicU64,
    forward_page_moves: AtomicU64,
    backward_page_moves: AtomicU64,
    leaf_descents: AtomicU64,
    internal_searches: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, AtomicOrdering::Relaxed);
}

impl CursorStats {
    /// Returns the number of stored positions.
    pub fn stores(&self) -> u64 {
        self.stores.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of optimistic restores.
    pub fn optimistic_restores(&self) -> u64 {
        self.optimistic_restores.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of pessimistic restores.
    pub fn pessimistic_restores(&self) -> u64 {
        self.pessimistic_restores.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_stores(&self) {
        bump(&self.stores);
    }

    pub(crate) fn inc_optimistic_restores(&self) {
        bump(&self.optimistic_restores);
    }

    pub(crate) fn inc_epoch_rejections(&self) {
        bump(&self.epoch_rejections);
    }

    pub(crate) fn inc_clock_mismatches(&self) {
        bump(&self.clock_mismatches);
    }

    pub(crate) fn inc_pessimistic_restores(&self) {
        bump(&self.pessimistic_restores);
    }

    pub(crate) fn inc_pessimistic_exact_hits(&self) {
        bump(&self.pessimistic_exact_hits);
    }

    pub(crate) fn inc_boundary_restores(&self) {
        bump(&self.boundary_restores);
    }

    pub(crate) fn inc_forward_page_moves(&self) {
        bump(&self.forward_page_moves);
    }

    pub(crate) fn inc_backward_page_moves(&self) {
        bump(&self.backward_page_moves);
    }

    pub(crate) fn inc_leaf_descents(&self) {
        bump(&self.leaf_descents);
    }

    pub(crate) fn inc_internal_searches(&self) {
        bump(&self.internal_searches);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> CursorStatsSnapshot {
        let load = |c: &AtomicU64| c.load(AtomicOrdering::Relaxed);
        CursorStatsSnapshot {
            stores: load(&self.stores),
            optimistic_restores: load(&self.optimistic_restores),
            epoch_rejections: load(&self.epoch_rejections),
            clock_mismatches: load(&self.clock_mismatches),
            pessimistic_restores: load(&self.pessimistic_restores),
            pessimistic_exact_hits: load(&self.pessimistic_exact_hits),
            boundary_restores: load(&self.boundary_restores),
            forward_page_moves: load(&self.forward_page_moves),
            backward_page_moves: load(&self.backward_page_moves),
            leaf_descents: load(&self.leaf_descents),
            internal_searches: load(&self.internal_searches),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "pcursor::stats",
            stores = snapshot.stores,
            optimistic_restores = snapshot.optimistic_restores,
            epoch_rejections = snapshot.epoch_rejections,
            clock_mismatches = snapshot.clock_mismatches,
            pessimistic_restores = snapshot.pessimistic_restores,
            pessimistic_exact_hits = snapshot.pessimistic_exact_hits,
            boundary_restores = snapshot.boundary_restores,
            forward_page_moves = snapshot.forward_page_moves,
            backward_page_moves = snapshot.backward_page_moves,
            leaf_descents = snapshot.leaf_descents,
            internal_searches = snapshot.internal_searches,
            "cursor stats snapshot"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = CursorStats::default();
        stats.inc_stores();
        stats.inc_stores();
        stats.inc_optimistic_restores();
        stats.inc_clock_mismatches();
        stats.inc_pessimistic_restores();
        let snap = stats.snapshot();
        assert_eq!(snap.stores, 2);
        assert_eq!(stats.stores(), 2);
        assert_eq!(snap.optimistic_restores, 1);
        assert_eq!(snap.clock_mismatches, 1);
        assert_eq!(stats.pessimistic_restores(), 1);
        assert_eq!(snap.backward_page_moves, 0);
        stats.emit_tracing();
    }
}
