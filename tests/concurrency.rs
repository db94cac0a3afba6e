//! Concurrent writers against a shared block store.

use std::sync::atomic::{AtomicU64, Ordering};
use tierstore::{
    BlockId, BlockStoreLocation, BlockStoreMeta, EvictorConfig, EvictorKind, SessionId, TierSpec,
    TieredBlockStore,
};

const THREADS: u64 = 8;
const BLOCKS_PER_THREAD: u64 = 200;
const BLOCK_SIZE: u64 = 100;

fn tiers() -> Vec<TierSpec> {
    vec![
        TierSpec::new(1, 0).with_dir("/ramdisk", 5_000),
        TierSpec::new(2, 1)
            .with_dir("/ssd0", 10_000)
            .with_dir("/ssd1", 10_000),
    ]
}

fn assert_within_capacity(meta: &BlockStoreMeta) {
    for dir in &meta.dirs {
        assert!(
            dir.used_bytes <= dir.capacity_bytes,
            "{} overfilled: {} > {}",
            dir.location,
            dir.used_bytes,
            dir.capacity_bytes
        );
    }
}

fn block_id(thread: u64, i: u64) -> BlockId {
    thread * BLOCKS_PER_THREAD + i
}

// =============================================================================
// Writers
// =============================================================================

#[test]
fn test_concurrent_writes_without_eviction() {
    let store = TieredBlockStore::builder(tiers()).build().unwrap();
    let created = AtomicU64::new(0);

    std::thread::scope(|s| {
        for thread in 0..THREADS {
            let store = &store;
            let created = &created;
            s.spawn(move || {
                let session = thread as SessionId;
                // 25 blocks per thread fit in 25_000 bytes total
                for i in 0..25 {
                    let id = block_id(thread, i);
                    if store
                        .create_block_meta(session, id, &BlockStoreLocation::any_tier(), BLOCK_SIZE)
                        .is_ok()
                    {
                        store.commit_block(session, id).unwrap();
                        created.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    let meta = store.block_store_meta();
    assert_within_capacity(&meta);
    assert_eq!(created.load(Ordering::Relaxed), THREADS * 25);
    assert_eq!(meta.used_bytes(), THREADS * 25 * BLOCK_SIZE);
    assert_eq!(meta.block_count() as u64, THREADS * 25);
}

#[test]
fn test_concurrent_writes_with_eviction() {
    for config in [
        EvictorConfig::new(EvictorKind::Lru),
        EvictorConfig::new(EvictorKind::Lru).with_cascading(true),
        EvictorConfig::new(EvictorKind::Lrfu),
        EvictorConfig::new(EvictorKind::Greedy),
    ] {
        let store = TieredBlockStore::builder(tiers())
            .evictor(config)
            .build()
            .unwrap();
        let committed = AtomicU64::new(0);

        std::thread::scope(|s| {
            for thread in 0..THREADS {
                let store = &store;
                let committed = &committed;
                s.spawn(move || {
                    let session = thread as SessionId;
                    let mem = BlockStoreLocation::any_dir_in_tier(1);
                    for i in 0..BLOCKS_PER_THREAD {
                        let id = block_id(thread, i);
                        let Ok(temp) = store.create_block_meta(session, id, &mem, BLOCK_SIZE / 2)
                        else {
                            continue;
                        };
                        if store.request_space(session, id, BLOCK_SIZE / 2).is_err() {
                            store.abort_block(session, temp.block_id()).unwrap();
                            continue;
                        }
                        store.commit_block(session, id).unwrap();
                        committed.fetch_add(1, Ordering::Relaxed);
                        if i % 3 == 0 {
                            // may already be evicted by another writer
                            let _ = store.access_block(session, id);
                        }
                    }
                });
            }
        });

        let meta = store.block_store_meta();
        assert_within_capacity(&meta);
        assert!(committed.load(Ordering::Relaxed) > 0, "{config:?}");
        assert!(meta.block_count() as u64 <= committed.load(Ordering::Relaxed));
        assert_eq!(meta.used_bytes(), meta.block_count() as u64 * BLOCK_SIZE);
        for thread in 0..THREADS {
            assert!(
                store
                    .manager()
                    .session_temp_blocks(thread as SessionId)
                    .is_empty()
            );
        }
    }
}

// =============================================================================
// Session cleanup
// =============================================================================

#[test]
fn test_concurrent_cleanup_and_commit() {
    let store = TieredBlockStore::builder(tiers()).build().unwrap();
    let any = BlockStoreLocation::any_tier();

    for i in 0..50 {
        store.create_block_meta(1, i, &any, BLOCK_SIZE).unwrap();
    }

    std::thread::scope(|s| {
        s.spawn(|| store.cleanup_session(1));
        s.spawn(|| {
            for i in 50..100 {
                store.create_block_meta(2, i, &any, BLOCK_SIZE).unwrap();
                store.commit_block(2, i).unwrap();
            }
        });
    });

    let meta = store.block_store_meta();
    assert_within_capacity(&meta);
    assert!(store.manager().session_temp_blocks(1).is_empty());
    assert_eq!(meta.block_count(), 50);
    assert_eq!(meta.used_bytes(), 50 * BLOCK_SIZE);
}
