//! Integration tests for the sled frame store and diff cache

use edgetrail::cancel::NeverCancel;
use edgetrail::store::{codec, DiffCache, FrameFilter, FrameStore, SledFrameStore};
use edgetrail::{FrameIndex, PlanePoint, StorageError};
use proptest::prelude::*;
use std::sync::Arc;
use tempfile::TempDir;

fn line(n: usize) -> Vec<PlanePoint> {
    (0..n).map(|i| PlanePoint::new(i as f64 * 0.1, -0.5)).collect()
}

#[test]
fn test_frames_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let store = SledFrameStore::new(temp_dir.path()).unwrap();
        store.load_trail(&line(4)).unwrap();
        store.store_escape_map(1, b"map").unwrap();
        store.mark_unused(2).unwrap();
        store.flush().unwrap();
    }

    let store = SledFrameStore::new(temp_dir.path()).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.with_data, 1);
    assert_eq!(store.escape_map(1).unwrap(), Some(b"map".to_vec()));
    assert!(!store.get(2).unwrap().unwrap().use_frame);
    assert!(!store.load_trail(&line(4)).unwrap(), "same length keeps existing rows");
}

#[test]
fn test_frame_lifecycle_is_one_way() {
    let temp_dir = TempDir::new().unwrap();
    let store = SledFrameStore::new(temp_dir.path()).unwrap();
    store.create(0, PlanePoint::new(0.25, 0.0)).unwrap();
    assert!(matches!(
        store.create(0, PlanePoint::ORIGIN),
        Err(StorageError::DuplicateFrame(0))
    ));

    assert!(store.store_escape_map(0, b"first").unwrap());
    assert!(!store.store_escape_map(0, b"second").unwrap());
    assert_eq!(store.escape_map(0).unwrap(), Some(b"first".to_vec()));

    store.mark_unused(0).unwrap();
    store.mark_unused(0).unwrap();
    assert!(store.iterate(FrameFilter::LIVE).unwrap().is_empty());
    assert_eq!(store.iterate(FrameFilter::RENDERED).unwrap().len(), 1);

    assert!(matches!(
        store.store_escape_map(9, b"x"),
        Err(StorageError::FrameNotFound(9))
    ));
}

#[test]
fn test_reload_with_new_length_drops_everything() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path()).unwrap());
    store.load_trail(&line(3)).unwrap();
    for index in 0..3 {
        store
            .store_escape_map(index, &codec::compress(&[index as u8; 8]).unwrap())
            .unwrap();
    }
    let mut cache = DiffCache::open(store.clone()).unwrap();
    cache.precompute_adjacent(10, &NeverCancel).unwrap();
    assert_eq!(store.stats().unwrap().diffs, 2);

    assert!(store.load_trail(&line(5)).unwrap());
    let stats = store.stats().unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.with_data, 0);
    assert_eq!(stats.diffs, 0);
}

#[test]
fn test_reset_use_and_diffs() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path()).unwrap());
    store.load_trail(&line(4)).unwrap();
    for index in 0..4 {
        store
            .store_escape_map(index, &codec::compress(&[index as u8; 4]).unwrap())
            .unwrap();
    }
    store.mark_unused_batch(&[1, 2]).unwrap();
    assert_eq!(store.stats().unwrap().in_use, 2);
    assert_eq!(store.reset_use().unwrap(), 2);
    assert_eq!(store.stats().unwrap().in_use, 4);

    let mut cache = DiffCache::open(store.clone()).unwrap();
    assert_eq!(cache.precompute_adjacent(10, &NeverCancel).unwrap().computed, 3);
    assert_eq!(store.reset_diffs().unwrap(), 3);
    assert!(DiffCache::open(store).unwrap().is_empty());
}

#[test]
fn test_conflicting_diff_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path()).unwrap());
    store.load_trail(&line(2)).unwrap();
    let mut cache = DiffCache::open(store).unwrap();
    cache.insert(0, 1, 12).unwrap();
    cache.insert(1, 0, 12).unwrap();
    assert!(matches!(
        cache.insert(1, 0, 13),
        Err(StorageError::DiffConflict { stored: 12, new: 13, .. })
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn diff_is_symmetric(
        maps in prop::collection::vec(prop::collection::vec(any::<u8>(), 16), 2..6),
        a in 0usize..6,
        b in 0usize..6,
    ) {
        let a = (a % maps.len()) as FrameIndex;
        let b = (b % maps.len()) as FrameIndex;
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(SledFrameStore::new(temp_dir.path()).unwrap());
        store.load_trail(&line(maps.len())).unwrap();
        for (index, map) in maps.iter().enumerate() {
            store.store_escape_map(index as FrameIndex, &codec::compress(map).unwrap()).unwrap();
        }

        let mut forward = DiffCache::open(store.clone()).unwrap();
        let ab = forward.get_diff(a, b).unwrap();
        let mut backward = DiffCache::open(store).unwrap();
        let ba = backward.get_diff(b, a).unwrap();
        prop_assert_eq!(ab, ba);

        let expected: u64 = maps[a as usize]
            .iter()
            .zip(&maps[b as usize])
            .map(|(x, y)| u64::from(x.abs_diff(*y)))
            .sum();
        prop_assert_eq!(ab, expected);
    }
}
