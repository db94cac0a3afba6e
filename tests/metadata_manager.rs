//! Integration tests for the block metadata manager.
//!
//! Layout: tier alias 1 (level 0) with one 1000-byte dir, tier alias 3
//! (level 1) with dirs of 3000 and 5000 bytes.

use tierstore::{
    BlockId, BlockMetadataManager, BlockStoreError, BlockStoreLocation, SessionId, TempBlockMeta,
    TierSpec,
};

const TEST_SESSION_ID: SessionId = 2;
const TEST_BLOCK_ID: BlockId = 9;
const TEST_TEMP_BLOCK_ID: BlockId = 10;
const TEST_BLOCK_SIZE: u64 = 20;

fn manager() -> BlockMetadataManager {
    BlockMetadataManager::new(vec![
        TierSpec::new(1, 0).with_dir("/ramdisk", 1000),
        TierSpec::new(3, 1)
            .with_dir("/disk1", 3000)
            .with_dir("/disk2", 5000),
    ])
    .unwrap()
}

fn temp_in(
    manager: &BlockMetadataManager,
    session_id: SessionId,
    block_id: BlockId,
    size: u64,
    loc: BlockStoreLocation,
) -> TempBlockMeta {
    TempBlockMeta::new(session_id, block_id, size, manager.dir(&loc).unwrap())
}

// =============================================================================
// Layout
// =============================================================================

#[test]
fn test_get_tier() {
    let manager = manager();
    let tier = manager.tier(1).unwrap();
    assert_eq!(tier.alias(), 1);
    assert_eq!(tier.level(), 0);
    let tier = manager.tier(3).unwrap();
    assert_eq!(tier.alias(), 3);
    assert_eq!(tier.level(), 1);
}

#[test]
fn test_get_tier_not_existing() {
    let manager = manager();
    let err = manager.tier(2).unwrap_err();
    assert_eq!(err, BlockStoreError::TierNotFound(2));
    assert!(err.is_not_found());
}

#[test]
fn test_get_tiers() {
    let manager = manager();
    let tiers = manager.tiers();
    assert_eq!(tiers.len(), 2);
    assert_eq!((tiers[0].alias(), tiers[0].level()), (1, 0));
    assert_eq!((tiers[1].alias(), tiers[1].level()), (3, 1));
}

#[test]
fn test_get_tiers_below() {
    let manager = manager();
    let below = manager.tiers_below(0);
    assert_eq!(below.len(), 1);
    assert_eq!(below[0].alias(), 3);
    assert_eq!(below[0].level(), 1);
    assert!(manager.tiers_below(1).is_empty());
}

#[test]
fn test_get_dir() {
    let manager = manager();
    for loc in [
        BlockStoreLocation::dir(1, 0, 0),
        BlockStoreLocation::dir(3, 1, 1),
    ] {
        let dir = manager.dir(&loc).unwrap();
        assert_eq!(Some(dir.tier_alias()), loc.tier_alias());
        assert_eq!(Some(dir.index()), loc.dir_index());
        assert_eq!(dir.location(), loc);
    }
}

#[test]
fn test_get_available_bytes() {
    let manager = manager();
    let cases = [
        (BlockStoreLocation::any_tier(), 9000),
        (BlockStoreLocation::any_dir_in_tier(1), 1000),
        (BlockStoreLocation::any_dir_in_tier(3), 8000),
        (BlockStoreLocation::dir(1, 0, 0), 1000),
        (BlockStoreLocation::dir(3, 1, 0), 3000),
        (BlockStoreLocation::dir(3, 1, 1), 5000),
    ];
    for (loc, expected) in cases {
        assert_eq!(manager.available_bytes(&loc).unwrap(), expected, "{}", loc);
    }
    assert_eq!(
        manager.available_bytes(&BlockStoreLocation::any_dir_in_tier(2)),
        Err(BlockStoreError::TierNotFound(2))
    );
}

// =============================================================================
// Block lifecycle
// =============================================================================

#[test]
fn test_block_meta_lifecycle() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_TEMP_BLOCK_ID,
        TEST_BLOCK_SIZE,
        BlockStoreLocation::dir(3, 1, 0),
    );

    // empty storage
    assert!(!manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
    assert!(!manager.has_block_meta(TEST_TEMP_BLOCK_ID));

    // add temp block
    manager.add_temp_block_meta(&temp).unwrap();
    assert!(manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
    assert!(!manager.has_block_meta(TEST_TEMP_BLOCK_ID));
    assert_eq!(manager.temp_block_meta(TEST_TEMP_BLOCK_ID).unwrap(), temp);

    // abort restores the space
    manager.abort_temp_block_meta(&temp).unwrap();
    assert!(!manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
    assert!(!manager.has_block_meta(TEST_TEMP_BLOCK_ID));
    assert_eq!(
        manager
            .available_bytes(&BlockStoreLocation::dir(3, 1, 0))
            .unwrap(),
        3000
    );

    // add again with the same id, then commit
    manager.add_temp_block_meta(&temp).unwrap();
    let used_before = manager.block_store_meta().used_bytes();
    let block = manager.commit_temp_block_meta(&temp).unwrap();
    assert!(!manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
    assert!(manager.has_block_meta(TEST_TEMP_BLOCK_ID));
    assert_eq!(manager.block_store_meta().used_bytes(), used_before);

    let fetched = manager.block_meta(TEST_TEMP_BLOCK_ID).unwrap();
    assert_eq!(fetched, block);
    assert_eq!(fetched.block_id(), TEST_TEMP_BLOCK_ID);
    assert_eq!(fetched.size(), TEST_BLOCK_SIZE);

    // remove
    manager.remove_block_meta(&fetched).unwrap();
    assert!(!manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
    assert!(!manager.has_block_meta(TEST_TEMP_BLOCK_ID));
    assert_eq!(
        manager
            .available_bytes(&BlockStoreLocation::any_tier())
            .unwrap(),
        9000
    );
}

#[test]
fn test_get_block_meta_not_existing() {
    let manager = manager();
    assert_eq!(
        manager.block_meta(TEST_BLOCK_ID),
        Err(BlockStoreError::BlockNotFound(TEST_BLOCK_ID))
    );
}

#[test]
fn test_get_temp_block_meta_not_existing() {
    let manager = manager();
    assert_eq!(
        manager.temp_block_meta(TEST_TEMP_BLOCK_ID),
        Err(BlockStoreError::TempBlockNotFound(TEST_TEMP_BLOCK_ID))
    );
}

#[test]
fn test_commit_and_abort_unknown_temp_block() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_TEMP_BLOCK_ID,
        TEST_BLOCK_SIZE,
        BlockStoreLocation::dir(1, 0, 0),
    );
    assert!(manager.commit_temp_block_meta(&temp).unwrap_err().is_not_found());
    assert!(manager.abort_temp_block_meta(&temp).unwrap_err().is_not_found());
}

#[test]
fn test_add_temp_block_out_of_space() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_TEMP_BLOCK_ID,
        1001,
        BlockStoreLocation::dir(1, 0, 0),
    );
    let err = manager.add_temp_block_meta(&temp).unwrap_err();
    assert!(err.is_out_of_space());
    assert!(!manager.has_temp_block_meta(TEST_TEMP_BLOCK_ID));
}

#[test]
fn test_cache_into_dir() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_BLOCK_ID,
        2000,
        BlockStoreLocation::dir(3, 1, 0),
    );
    manager.add_temp_block_meta(&temp).unwrap();
    manager.commit_temp_block_meta(&temp).unwrap();
    assert_eq!(
        manager
            .available_bytes(&BlockStoreLocation::dir(3, 1, 0))
            .unwrap(),
        1000
    );
}

// =============================================================================
// Move and resize
// =============================================================================

#[test]
fn test_move_block_meta() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_TEMP_BLOCK_ID,
        TEST_BLOCK_SIZE,
        BlockStoreLocation::dir(1, 0, 0),
    );
    manager.add_temp_block_meta(&temp).unwrap();
    manager.commit_temp_block_meta(&temp).unwrap();
    let block = manager.block_meta(TEST_TEMP_BLOCK_ID).unwrap();

    // move to anywhere
    let block = manager
        .move_block_meta(&block, &BlockStoreLocation::any_tier())
        .unwrap();

    // move to the HDD tier
    let block = manager
        .move_block_meta(&block, &BlockStoreLocation::any_dir_in_tier(3))
        .unwrap();
    assert_eq!(block.location().tier_alias(), Some(3));

    // move to MEM dir 0
    let block = manager
        .move_block_meta(&block, &BlockStoreLocation::dir(1, 0, 0))
        .unwrap();
    assert_eq!(block.location().tier_alias(), Some(1));
    assert_eq!(block.location().dir_index(), Some(0));
    assert_eq!(
        manager
            .available_bytes(&BlockStoreLocation::any_dir_in_tier(3))
            .unwrap(),
        8000
    );
}

#[test]
fn test_move_block_meta_exceed_capacity() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_BLOCK_ID,
        2000,
        BlockStoreLocation::dir(3, 1, 0),
    );
    manager.add_temp_block_meta(&temp).unwrap();
    let block = manager.commit_temp_block_meta(&temp).unwrap();

    let err = manager
        .move_block_meta(&block, &BlockStoreLocation::dir(1, 0, 0))
        .unwrap_err();
    assert!(err.is_out_of_space());
    assert!(err.to_string().contains("does not have enough space"));

    // source untouched
    assert_eq!(
        manager.block_meta(TEST_BLOCK_ID).unwrap().location(),
        BlockStoreLocation::dir(3, 1, 0)
    );
}

#[test]
fn test_resize_temp_block_meta() {
    let manager = manager();
    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_TEMP_BLOCK_ID,
        TEST_BLOCK_SIZE,
        BlockStoreLocation::dir(1, 0, 0),
    );
    manager.add_temp_block_meta(&temp).unwrap();

    let resized = manager
        .resize_temp_block_meta(&temp, TEST_BLOCK_SIZE + 1)
        .unwrap();
    assert_eq!(resized.size(), TEST_BLOCK_SIZE + 1);
    assert_eq!(
        manager.temp_block_meta(TEST_TEMP_BLOCK_ID).unwrap().size(),
        TEST_BLOCK_SIZE + 1
    );
    assert_eq!(
        manager
            .available_bytes(&BlockStoreLocation::dir(1, 0, 0))
            .unwrap(),
        1000 - TEST_BLOCK_SIZE - 1
    );
}

// =============================================================================
// Session cleanup
// =============================================================================

#[test]
fn test_cleanup_session() {
    let manager = manager();
    let mem = BlockStoreLocation::dir(1, 0, 0);
    let session1 = 100;
    let session2 = 200;

    let temp1 = temp_in(&manager, session1, 1, TEST_BLOCK_SIZE, mem);
    let temp2 = temp_in(&manager, session1, 2, TEST_BLOCK_SIZE, mem);
    let temp3 = temp_in(&manager, session2, 3, TEST_BLOCK_SIZE, mem);
    let block = temp_in(&manager, session2, TEST_BLOCK_ID, TEST_BLOCK_SIZE, mem);
    for temp in [&temp1, &temp2, &temp3, &block] {
        manager.add_temp_block_meta(temp).unwrap();
    }
    manager.commit_temp_block_meta(&block).unwrap();

    let ids_of = |session| -> Vec<BlockId> {
        let mut ids: Vec<_> = manager
            .session_temp_blocks(session)
            .iter()
            .map(|t| t.block_id())
            .collect();
        ids.sort_unstable();
        ids
    };

    // session 1 owns temp blocks 1 and 2
    let to_remove = ids_of(session1);
    assert_eq!(to_remove, vec![1, 2]);

    let removed = manager.cleanup_session_temp_blocks(session1, &to_remove);
    assert_eq!(removed.len(), 2);
    assert!(!manager.has_temp_block_meta(1));
    assert!(!manager.has_temp_block_meta(2));
    assert!(manager.has_temp_block_meta(3));
    assert!(manager.has_block_meta(TEST_BLOCK_ID));

    // cleaning up again is a no-op
    assert!(ids_of(session1).is_empty());
    let available = manager.available_bytes(&mem).unwrap();
    assert!(manager
        .cleanup_session_temp_blocks(session1, &to_remove)
        .is_empty());
    assert_eq!(manager.available_bytes(&mem).unwrap(), available);
    assert!(manager.has_temp_block_meta(3));

    // another session's ids are skipped
    assert!(manager.cleanup_session_temp_blocks(session1, &[3]).is_empty());
    assert!(manager.has_temp_block_meta(3));

    // session 2 owns temp block 3
    let to_remove = ids_of(session2);
    assert_eq!(to_remove, vec![3]);
    manager.cleanup_session_temp_blocks(session2, &to_remove);
    assert!(!manager.has_temp_block_meta(3));
    assert!(manager.has_block_meta(TEST_BLOCK_ID));
    assert_eq!(manager.available_bytes(&mem).unwrap(), 1000 - TEST_BLOCK_SIZE);
}

// =============================================================================
// Store meta
// =============================================================================

#[test]
fn test_get_block_store_meta() {
    let manager = manager();
    let meta = manager.block_store_meta();
    assert_eq!(meta.capacity_bytes_on_tiers.get(&1), Some(&1000));
    assert_eq!(meta.capacity_bytes_on_tiers.get(&3), Some(&8000));
    assert_eq!(meta.used_bytes_on_tiers.get(&1), Some(&0));
    assert_eq!(meta.used_bytes_on_tiers.get(&3), Some(&0));
    assert_eq!(meta.capacity_bytes(), 9000);
    assert_eq!(meta.dirs.len(), 3);

    let temp = temp_in(
        &manager,
        TEST_SESSION_ID,
        TEST_BLOCK_ID,
        500,
        BlockStoreLocation::dir(3, 1, 1),
    );
    manager.add_temp_block_meta(&temp).unwrap();
    manager.commit_temp_block_meta(&temp).unwrap();

    let meta = manager.block_store_meta();
    assert_eq!(meta.used_bytes_on_tiers.get(&3), Some(&500));
    assert_eq!(meta.block_count_on_tiers.get(&3), Some(&1));
    assert_eq!(meta.dirs[2].used_bytes, 500);
    assert_eq!(meta.dirs[2].available_bytes(), 4500);
}
