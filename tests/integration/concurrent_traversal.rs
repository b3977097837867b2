#![allow(missing_docs)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;

use pcursor::{
    BTree, BTreeOptions, BufferPool, BufferPoolOptions, Index, LatchMode, MiniTransaction,
    PcursorError, PersistentCursor, Record, Result, SearchMode, Side, Tuple,
};

const BASE_KEYS: u64 = 400;
const STRIDE: u64 = 8;
const WRITERS: u64 = 3;
const READERS: usize = 3;

fn shared_tree(pool_options: BufferPoolOptions) -> Result<BTree> {
    let pool = Arc::new(BufferPool::new(pool_options)?);
    let options = BTreeOptions {
        leaf_capacity: 64,
        internal_capacity: 8,
        page_fill_target: 50,
    };
    let records = (0..BASE_KEYS).map(|k| Record::from_u64s(&[k * STRIDE]));
    BTree::bulk_load(&pool, Index::new("shared", 1)?, options, records)
}

fn key_under(cur: &PersistentCursor<'_>, mtr: &MiniTransaction<'_>) -> Result<Option<u64>> {
    cur.current_record(mtr)?
        .map(|rec| rec.u64_field(0))
        .transpose()
}

/// Forward scan that parks the cursor every `every` records.
fn forward_scan(tree: &BTree, every: usize) -> Result<Vec<u64>> {
    let mut mtr = tree.start_mtr();
    let mut cur = PersistentCursor::new(tree);
    cur.open_at_side(Side::Left, LatchMode::SearchLeaf, &mut mtr)?;
    let mut seen = Vec::new();
    while cur.move_to_next_user_rec(&mut mtr)? {
        if let Some(k) = key_under(&cur, &mtr)? {
            seen.push(k);
        }
        if seen.len() % every == 0 {
            cur.store(&mtr)?;
            cur.commit_specify_mtr(&mut mtr)?;
            thread::yield_now();
            mtr.begin()?;
            if !cur.restore(LatchMode::SearchLeaf, &mut mtr)? {
                return Err(PcursorError::Corruption("undeleted record lost on restore"));
            }
        }
    }
    Ok(seen)
}

fn backward_scan(tree: &BTree) -> Result<Vec<u64>> {
    let mut mtr = tree.start_mtr();
    let mut cur = PersistentCursor::new(tree);
    cur.open_at_side(Side::Right, LatchMode::SearchLeaf, &mut mtr)?;
    let mut seen = Vec::new();
    while cur.move_to_prev(&mut mtr)? {
        if let Some(k) = key_under(&cur, &mtr)? {
            seen.push(k);
        }
    }
    Ok(seen)
}

fn assert_complete(seen: &[u64], ascending: bool) {
    let ordered = seen
        .windows(2)
        .all(|w| if ascending { w[0] < w[1] } else { w[0] > w[1] });
    assert!(ordered, "scan out of order");
    let seen: BTreeSet<u64> = seen.iter().copied().collect();
    for k in (0..BASE_KEYS).map(|k| k * STRIDE) {
        assert!(seen.contains(&k), "scan skipped {k}");
    }
}

#[test]
fn scans_see_every_base_key_while_writers_insert() -> Result<()> {
    let tree = shared_tree(BufferPoolOptions::default())?;
    let done = AtomicBool::new(false);
    let barrier = Barrier::new(READERS + 1 + WRITERS as usize);

    let (tree, done, barrier) = (&tree, &done, &barrier);
    thread::scope(|scope| -> Result<()> {
        let writers: Vec<_> = (1..=WRITERS)
            .map(move |offset| {
                scope.spawn(move || -> Result<usize> {
                    barrier.wait();
                    let mut inserted = 0;
                    for k in 0..BASE_KEYS {
                        if done.load(Ordering::Relaxed) {
                            break;
                        }
                        let mut mtr = tree.start_mtr();
                        match tree.insert(Record::from_u64s(&[k * STRIDE + offset]), &mut mtr) {
                            Ok(()) => inserted += 1,
                            Err(PcursorError::PageFull(_)) => {}
                            Err(err) => return Err(err),
                        }
                    }
                    Ok(inserted)
                })
            })
            .collect();

        let readers: Vec<_> = (0..READERS)
            .map(move |i| {
                scope.spawn(move || -> Result<Vec<u64>> {
                    barrier.wait();
                    forward_scan(tree, 3 + i * 4)
                })
            })
            .collect();

        let backward = scope.spawn(move || -> Result<Vec<u64>> {
            barrier.wait();
            backward_scan(tree)
        });

        for reader in readers {
            let seen = reader.join().expect("reader panicked")?;
            assert_complete(&seen, true);
        }
        assert_complete(&backward.join().expect("backward reader panicked")?, false);
        done.store(true, Ordering::Relaxed);
        for writer in writers {
            writer.join().expect("writer panicked")?;
        }
        Ok(())
    })?;

    let final_scan = forward_scan(tree, usize::MAX)?;
    assert_complete(&final_scan, true);
    let stats = tree.stats_snapshot();
    assert!(stats.stores > 0);
    assert!(stats.optimistic_restores + stats.pessimistic_restores > 0);
    assert!(stats.backward_page_moves > 0);
    Ok(())
}

#[test]
fn latch_wait_times_out_and_retry_succeeds() -> Result<()> {
    let tree = shared_tree(BufferPoolOptions {
        latch_timeout_ms: Some(20),
        ..BufferPoolOptions::default()
    })?;
    let probe = Tuple::from_u64s(&[40 * STRIDE]);
    let (latched_tx, latched_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let (tree, probe) = (&tree, &probe);
    thread::scope(|scope| -> Result<()> {
        let release_tx = release_tx;
        let holder = scope.spawn(move || -> Result<()> {
            let mut mtr = tree.start_mtr();
            let mut cur = PersistentCursor::new(tree);
            cur.open(probe, SearchMode::LessOrEqual, LatchMode::ModifyLeaf, &mut mtr)?;
            latched_tx.send(cur.page_id()?).expect("receiver alive");
            release_rx.recv().expect("sender alive");
            mtr.commit();
            Ok(())
        });

        let held = latched_rx.recv().expect("holder latched");
        let mut mtr = tree.start_mtr();
        let mut cur = PersistentCursor::new(tree);
        let err = cur
            .open(probe, SearchMode::LessOrEqual, LatchMode::SearchLeaf, &mut mtr)
            .unwrap_err();
        assert!(matches!(err, PcursorError::LatchTimeout { page } if page == held));
        assert!(err.is_retryable());
        mtr.commit();

        release_tx.send(()).expect("holder alive");
        holder.join().expect("holder panicked")?;

        mtr.begin()?;
        cur.open(probe, SearchMode::LessOrEqual, LatchMode::SearchLeaf, &mut mtr)?;
        assert_eq!(key_under(&cur, &mtr)?, Some(40 * STRIDE));
        Ok(())
    })?;

    assert!(tree.pool().stats().latch_timeouts >= 1);
    Ok(())
}
