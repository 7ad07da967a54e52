//! Bytecode Storage Tests
//!
//! Tests for:
//! - StageCache: concurrent find_or_create hands out one entry, one dispatch
//! - LinearDiskCache: on-disk record layout, header mismatch reset
//! - UidChecker: both collision directions

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use bytemuck::{Pod, Zeroable};
use myth_shader_cache::shader::{LinearDiskCache, StageCache, UidChecker};
use myth_shader_cache::{ShaderCacheError, ShaderStage, ShaderUid};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Pod, Zeroable)]
struct TestUid {
    bits: u32,
}

impl ShaderUid for TestUid {}

const HEADER_LEN: usize = 28;

// ============================================================================
// StageCache Concurrency
// ============================================================================

#[test]
fn concurrent_find_or_create_dispatches_once() {
    let cache = StageCache::<TestUid>::new();
    let uid = TestUid { bits: 42 };
    let winners = AtomicUsize::new(0);

    let entries: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                scope.spawn(|| {
                    let entry = cache.find_or_create(&uid);
                    if !entry.test_and_mark_initialized() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                    entry
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
    assert!(entries.iter().all(|e| Arc::ptr_eq(e, &entries[0])));
}

#[test]
fn concurrent_inserts_of_distinct_uids() {
    let cache = StageCache::<TestUid>::new();
    thread::scope(|scope| {
        for t in 0..8 {
            let cache = &cache;
            scope.spawn(move || {
                for i in 0..100 {
                    cache.find_or_create(&TestUid { bits: t * 100 + i });
                }
            });
        }
    });
    assert_eq!(cache.len(), 800);
    assert_eq!(cache.compiled_count(), 0);
}

// ============================================================================
// LinearDiskCache Layout
// ============================================================================

#[test]
fn disk_records_use_key_length_payload_layout() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("IDX11-TEST-ps.cache");

    let mut cache = LinearDiskCache::<TestUid>::open_and_load(&path, "v1", |_, _| {})?;
    cache.append(&TestUid { bits: 0x0102_0304 }, b"DXBC")?;
    cache.close()?;

    let bytes = std::fs::read(&path)?;
    assert_eq!(&bytes[..4], b"DCAC");
    assert_eq!(bytes.len(), HEADER_LEN + 4 + 4 + 4);

    let record = &bytes[HEADER_LEN..];
    assert_eq!(&record[..4], &0x0102_0304u32.to_le_bytes());
    assert_eq!(&record[4..8], &4u32.to_le_bytes());
    assert_eq!(&record[8..], b"DXBC");
    Ok(())
}

#[test]
fn garbage_file_is_reset() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("garbage.cache");
    std::fs::write(&path, b"this is not a shader cache at all, not even close")?;

    let mut visited = 0;
    let cache = LinearDiskCache::<TestUid>::open_and_load(&path, "v1", |_, _| visited += 1)?;
    assert_eq!(visited, 0);
    assert_eq!(cache.num_entries(), 0);
    drop(cache);

    assert_eq!(std::fs::metadata(&path)?.len(), HEADER_LEN as u64);
    Ok(())
}

#[test]
fn oversized_length_stops_replay() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("oversized.cache");

    let mut cache = LinearDiskCache::<TestUid>::open_and_load(&path, "v1", |_, _| {})?;
    cache.append(&TestUid { bits: 1 }, b"ok")?;
    cache.close()?;

    let mut bytes = std::fs::read(&path)?;
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&u32::MAX.to_le_bytes());
    std::fs::write(&path, &bytes)?;

    let mut records = Vec::new();
    let cache = LinearDiskCache::<TestUid>::open_and_load(&path, "v1", |uid, payload| {
        records.push((uid, payload.to_vec()));
    })?;
    assert_eq!(records, vec![(TestUid { bits: 1 }, b"ok".to_vec())]);
    assert_eq!(cache.num_entries(), 1);
    Ok(())
}

// ============================================================================
// UidChecker
// ============================================================================

#[test]
fn checker_detects_both_collision_directions() {
    let mut checker = UidChecker::<TestUid>::new(ShaderStage::Pixel);
    let a = TestUid { bits: 1 };
    let b = TestUid { bits: 2 };

    assert!(checker.add_to_index_and_check(&a, "source a").is_ok());
    assert!(checker.add_to_index_and_check(&a, "source a").is_ok());

    // One UID, two sources.
    let err = checker.add_to_index_and_check(&a, "source a'").unwrap_err();
    assert!(matches!(
        err,
        ShaderCacheError::UidCollision {
            stage: ShaderStage::Pixel,
            ..
        }
    ));

    // Two UIDs, one source.
    assert!(checker.add_to_index_and_check(&b, "source a").is_err());
    assert_eq!(checker.violations(), 2);

    checker.invalidate();
    assert!(checker.is_empty());
}
