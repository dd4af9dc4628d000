//! Greedy thinning over a real frame store

use edgetrail::cancel::NeverCancel;
use edgetrail::config::ThinConfig;
use edgetrail::store::{codec, DiffCache, FrameFilter, FrameRecord, FrameStore, SledFrameStore};
use edgetrail::thin::{DiffSource, GreedyThinner, ThinStep};
use edgetrail::{FrameIndex, PlanePoint, StorageError};
use std::sync::Arc;
use tempfile::TempDir;

/// Diff equals the index gap
struct IndexGap;

impl DiffSource for IndexGap {
    fn diff(&mut self, a: FrameIndex, b: FrameIndex) -> Result<u64, StorageError> {
        Ok(a.abs_diff(b))
    }

    fn distance(&mut self, a: &FrameRecord, b: &FrameRecord) -> f64 {
        a.coordinate.distance(&b.coordinate)
    }

    fn flush(&mut self) -> Result<usize, StorageError> {
        Ok(0)
    }
}

fn rendered_store(points: &[PlanePoint]) -> (TempDir, SledFrameStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = SledFrameStore::new(temp_dir.path()).unwrap();
    store.load_trail(points).unwrap();
    for index in 0..points.len() as FrameIndex {
        store.store_escape_map(index, &[0]).unwrap();
    }
    (temp_dir, store)
}

fn live_indices(store: &SledFrameStore) -> Vec<FrameIndex> {
    store
        .iterate(FrameFilter::LIVE)
        .unwrap()
        .iter()
        .map(|frame| frame.index)
        .collect()
}

#[test]
fn test_ten_frames_thin_to_five() {
    let points: Vec<PlanePoint> = (0..10).map(|i| PlanePoint::new(i as f64, 0.0)).collect();
    let (_dir, store) = rendered_store(&points);
    let config = ThinConfig {
        target_frames: 5,
        spacing_threshold: 10.0,
        ..ThinConfig::default()
    };

    let mut diffs = IndexGap;
    let mut thinner = GreedyThinner::new(&store, &mut diffs, &config).unwrap();
    let mut removed = Vec::new();
    let report = loop {
        match thinner.step().unwrap() {
            ThinStep::Removed { index, live, .. } => {
                assert_eq!(live, 10 - removed.len() - 1);
                removed.push(index);
            }
            ThinStep::Completed(report) => break report,
        }
    };

    assert_eq!(removed, vec![1, 2, 3, 4, 5]);
    assert_eq!(report.live, 5);
    assert_eq!(report.shortfall, 0);
    assert_eq!(live_indices(&store), vec![0, 6, 7, 8, 9]);
}

#[test]
fn test_thinning_is_deterministic() {
    let points: Vec<PlanePoint> = (0..40)
        .map(|i| {
            let t = i as f64 / 40.0 * std::f64::consts::TAU;
            PlanePoint::new(t.cos(), t.sin())
        })
        .collect();
    let config = ThinConfig {
        target_frames: 15,
        spacing_threshold: 1.0,
        ..ThinConfig::default()
    };

    let run = || {
        let (_dir, store) = rendered_store(&points);
        let report = GreedyThinner::new(&store, &mut IndexGap, &config)
            .unwrap()
            .run(&NeverCancel)
            .unwrap();
        (report, live_indices(&store))
    };
    let (first_report, first) = run();
    let (_, second) = run();
    assert_eq!(first, second);
    assert_eq!(first_report.live, 15);
    for protected in [0, 10, 20, 30, 39] {
        assert!(first.contains(&protected), "frame {} was removed", protected);
    }
}

#[test]
fn test_thinning_with_pixel_diffs() {
    // Frames 0..6 along a line; frames 2 and 3 render identically
    let points: Vec<PlanePoint> = (0..6).map(|i| PlanePoint::new(i as f64 * 0.01, 0.0)).collect();
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SledFrameStore::new(temp_dir.path()).unwrap());
    store.load_trail(&points).unwrap();
    let pixels: [[u8; 4]; 6] = [
        [0, 0, 0, 0],
        [9, 9, 9, 9],
        [3, 3, 3, 3],
        [3, 3, 3, 3],
        [7, 0, 7, 0],
        [1, 2, 3, 4],
    ];
    for (index, map) in pixels.iter().enumerate() {
        store
            .store_escape_map(index as FrameIndex, &codec::compress(map).unwrap())
            .unwrap();
    }

    let mut cache = DiffCache::open(store.clone()).unwrap();
    let precomputed = cache.precompute_adjacent(100, &NeverCancel).unwrap();
    assert_eq!(precomputed.computed, 5);

    let config = ThinConfig {
        target_frames: 5,
        spacing_threshold: 0.05,
        ..ThinConfig::default()
    };
    let report = GreedyThinner::new(store.as_ref(), &mut cache, &config)
        .unwrap()
        .run(&NeverCancel)
        .unwrap();
    assert_eq!(report.removed, 1);
    // Frame 2 has a zero diff to its next neighbour
    assert_eq!(live_indices(&store), vec![0, 1, 3, 4, 5]);

    // The recomputed neighbour diff was persisted
    drop(cache);
    let reopened = DiffCache::open(store.clone()).unwrap();
    assert_eq!(reopened.cached(1, 3), Some(6 * 4));
}
