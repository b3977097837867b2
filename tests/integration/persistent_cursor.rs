#![allow(missing_docs)]

use std::io::Write;

use pcursor::{
    BTree, EngineConfig, Index, LatchMode, MiniTransaction, PcursorError, PersistentCursor,
    Record, RelativePosition, Result, SearchMode, Side, Tuple,
};
use tempfile::NamedTempFile;

const USERS: u64 = 6;
const EVENTS_PER_USER: u64 = 25;

fn engine_config() -> Result<EngineConfig> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "[pool]\ncapacity_pages = 256\n\n[btree]\nleaf_capacity = 12\ninternal_capacity = 6\npage_fill_target = 50\n\n[cursor]\nverify_restores = true"
    )?;
    EngineConfig::load(file.path())
}

/// (user, seq) keyed events, with a payload field outside the unique key.
fn events_tree(config: &EngineConfig) -> Result<BTree> {
    let pool = config.open_pool()?;
    let records = (0..USERS).flat_map(|user| {
        (0..EVENTS_PER_USER).map(move |seq| Record::from_u64s(&[user, seq, user * 1000 + seq]))
    });
    BTree::bulk_load(&pool, Index::new("events", 2)?, config.btree.clone(), records)
}

fn event_key(cur: &PersistentCursor<'_>, mtr: &MiniTransaction<'_>) -> Result<Option<(u64, u64)>> {
    match cur.current_record(mtr)? {
        Some(rec) => Ok(Some((rec.u64_field(0)?, rec.u64_field(1)?))),
        None => Ok(None),
    }
}

/// Reads every event of `user` in batches of `batch`, releasing all latches
/// between batches. `between` runs while nothing is latched.
fn fetch_user_events(
    tree: &BTree,
    config: &EngineConfig,
    user: u64,
    batch: usize,
    mut between: impl FnMut(&BTree, &[(u64, u64)]) -> Result<()>,
) -> Result<Vec<u64>> {
    let mut mtr = tree.start_mtr();
    let mut cur = PersistentCursor::with_options(tree, config.cursor.clone());
    cur.open_on_user_rec(
        &Tuple::from_u64s(&[user]),
        SearchMode::GreaterOrEqual,
        LatchMode::SearchLeaf,
        &mut mtr,
    )?;

    let mut seqs = Vec::new();
    let mut pending = Vec::new();
    loop {
        match event_key(&cur, &mtr)? {
            Some((u, seq)) if u == user => {
                seqs.push(seq);
                pending.push((u, seq));
            }
            _ => break,
        }
        if pending.len() == batch {
            cur.store(&mtr)?;
            cur.commit_specify_mtr(&mut mtr)?;
            between(tree, &pending)?;
            pending.clear();
            mtr.begin()?;
            cur.restore(LatchMode::SearchLeaf, &mut mtr)?;
        }
        if !cur.move_to_next_user_rec(&mut mtr)? {
            break;
        }
    }
    Ok(seqs)
}

#[test]
fn config_file_drives_pool_tree_and_cursor() -> Result<()> {
    let config = engine_config()?;
    assert_eq!(config.pool.capacity_pages, 256);
    assert_eq!(config.btree.leaf_capacity, 12);
    assert!(config.cursor.verify_restores);

    let tree = events_tree(&config)?;
    assert!(tree.height() >= 3);
    assert!(tree.pool().resident_pages() > (USERS * EVENTS_PER_USER / 6) as usize);
    Ok(())
}

#[test]
fn prefix_scan_in_batches_sees_every_event_once() -> Result<()> {
    let config = engine_config()?;
    let tree = events_tree(&config)?;

    let seqs = fetch_user_events(&tree, &config, 3, 4, |_, _| Ok(()))?;
    assert_eq!(seqs, (0..EVENTS_PER_USER).collect::<Vec<_>>());

    let stats = tree.stats_snapshot();
    assert_eq!(stats.optimistic_restores, 6);
    assert_eq!(stats.pessimistic_restores, 0);
    Ok(())
}

#[test]
fn batches_survive_deleting_what_was_already_read() -> Result<()> {
    let config = engine_config()?;
    let tree = events_tree(&config)?;

    let seqs = fetch_user_events(&tree, &config, 2, 3, |tree, done| {
        for (user, seq) in done {
            let mut mtr = tree.start_mtr();
            match tree.delete(&Tuple::from_u64s(&[*user, *seq]), &mut mtr) {
                Ok(_) | Err(PcursorError::Invalid(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    })?;
    assert_eq!(seqs, (0..EVENTS_PER_USER).collect::<Vec<_>>());
    assert!(tree.stats_snapshot().pessimistic_restores > 0);
    Ok(())
}

#[test]
fn backward_scan_over_composite_keys() -> Result<()> {
    let config = engine_config()?;
    let tree = events_tree(&config)?;
    let mut mtr = tree.start_mtr();
    let mut cur = PersistentCursor::new(&tree);

    cur.open(
        &Tuple::from_u64s(&[4, 0]),
        SearchMode::Less,
        LatchMode::SearchLeaf,
        &mut mtr,
    )?;
    let mut seen = Vec::new();
    loop {
        if let Some(key) = event_key(&cur, &mtr)? {
            if key.0 < 2 {
                break;
            }
            seen.push(key);
        }
        if !cur.move_to_prev(&mut mtr)? {
            break;
        }
    }
    let expected: Vec<_> = (2..4u64)
        .rev()
        .flat_map(|user| (0..EVENTS_PER_USER).rev().map(move |seq| (user, seq)))
        .collect();
    assert_eq!(seen, expected);
    assert!(tree.stats_snapshot().backward_page_moves > 0);
    Ok(())
}

#[test]
fn end_of_tree_store_restores_to_the_last_leaf() -> Result<()> {
    let config = engine_config()?;
    let tree = events_tree(&config)?;
    let mut mtr = tree.start_mtr();
    let mut cur = PersistentCursor::new(&tree);

    cur.open_at_side(Side::Right, LatchMode::SearchLeaf, &mut mtr)?;
    assert!(cur.is_after_last_in_tree(&mtr)?);
    cur.store(&mtr)?;
    assert_eq!(cur.rel_pos(), Some(RelativePosition::After));
    let stored = cur.stored_key().expect("keyed").to_search_tuple()?;
    assert_eq!(stored, Tuple::from_u64s(&[USERS - 1, EVENTS_PER_USER - 1]));
    cur.commit_specify_mtr(&mut mtr)?;

    let mut writer = tree.start_mtr();
    tree.insert(Record::from_u64s(&[USERS, 0, 0]), &mut writer)?;
    writer.commit();

    mtr.begin()?;
    assert!(!cur.restore(LatchMode::SearchLeaf, &mut mtr)?);
    assert_eq!(event_key(&cur, &mtr)?, Some((USERS, 0)));
    assert_eq!(cur.rel_pos(), Some(RelativePosition::On));
    assert!(!cur.move_to_next_user_rec(&mut mtr)?);
    Ok(())
}

#[test]
fn unknown_config_keys_name_the_file() -> Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "[btree]\nleaf_capacity = 8\nsplit_ratio = 3")?;
    let err = EngineConfig::load(file.path()).unwrap_err();
    match err {
        PcursorError::Config(msg) => {
            assert!(msg.contains(&file.path().display().to_string()), "{msg}");
            assert!(msg.contains("split_ratio"), "{msg}");
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}
