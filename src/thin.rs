//! Greedy frame thinning.
//!
//! Repeatedly drops the live frame whose removal disturbs the animation least, measured by the
//! pixel diff to its next live neighbour, until the live count reaches the target. A frame is
//! only a candidate while its two live neighbours lie within `spacing_threshold` of each other,
//! so thinning never opens a visible jump. The first and last frames and the frames at the
//! extreme x and y coordinates are never removed.

use crate::cancel::CancelToken;
use crate::config::ThinConfig;
use crate::error::StorageError;
use crate::progress::ProgressThrottle;
use crate::store::{DiffCache, FrameFilter, FrameRecord, FrameStore};
use crate::types::FrameIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Where the thinner gets frame diffs and distances from
pub trait DiffSource {
    fn diff(&mut self, a: FrameIndex, b: FrameIndex) -> Result<u64, StorageError>;

    fn distance(&mut self, a: &FrameRecord, b: &FrameRecord) -> f64;

    /// Persist computed diffs
    fn flush(&mut self) -> Result<usize, StorageError>;
}

impl DiffSource for DiffCache {
    fn diff(&mut self, a: FrameIndex, b: FrameIndex) -> Result<u64, StorageError> {
        self.get_diff(a, b)
    }

    fn distance(&mut self, a: &FrameRecord, b: &FrameRecord) -> f64 {
        self.get_distance(a, b)
    }

    fn flush(&mut self) -> Result<usize, StorageError> {
        DiffCache::flush(self)
    }
}

/// Summary of a thinning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ThinReport {
    pub starting: usize,
    pub removed: usize,
    pub live: usize,
    pub target: usize,
    /// Frames still above target when no candidate was left
    pub shortfall: usize,
    pub cancelled: bool,
}

/// Min, max, mean and sample standard deviation of a set of values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl Spread {
    pub fn of(values: &[f64]) -> Option<Spread> {
        let (&first, rest) = values.split_first()?;
        let (mut min, mut max, mut sum) = (first, first, first);
        for &value in rest {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        let n = values.len() as f64;
        let mean = sum / n;
        let stddev = if values.len() < 2 {
            0.0
        } else {
            (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        Some(Spread {
            min,
            max,
            mean,
            stddev,
        })
    }
}

/// Candidate diffs and neighbour distances ahead of one removal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinHistoryRow {
    pub live: usize,
    pub candidates: usize,
    pub diff: Option<Spread>,
    pub distance: Option<Spread>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThinStep {
    Removed {
        index: FrameIndex,
        diff: u64,
        live: usize,
    },
    Completed(ThinReport),
}

/// Positions of the frames that must survive thinning.
///
/// Ties on an extreme coordinate go to the earliest frame.
fn protected_positions(frames: &[FrameRecord]) -> Vec<bool> {
    let mut protected = vec![false; frames.len()];
    if frames.is_empty() {
        return protected;
    }

    let (mut min_x, mut max_x, mut min_y, mut max_y) = (0, 0, 0, 0);
    for (pos, frame) in frames.iter().enumerate() {
        let c = frame.coordinate;
        if c.x < frames[min_x].coordinate.x {
            min_x = pos;
        }
        if c.x > frames[max_x].coordinate.x {
            max_x = pos;
        }
        if c.y < frames[min_y].coordinate.y {
            min_y = pos;
        }
        if c.y > frames[max_y].coordinate.y {
            max_y = pos;
        }
    }

    for pos in [0, frames.len() - 1, min_x, max_x, min_y, max_y] {
        protected[pos] = true;
    }
    protected
}

/// Greedy thinning state over the live frames, linked in trail order.
pub struct GreedyThinner<'a, S: FrameStore + ?Sized, D: DiffSource> {
    store: &'a S,
    diffs: &'a mut D,
    frames: Vec<FrameRecord>,
    prev: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
    protected: Vec<bool>,
    keys: Vec<Option<(u64, usize)>>,
    /// Neighbour distance of every frame that has two live neighbours
    dists: Vec<Option<f64>>,
    candidates: BTreeSet<(u64, usize)>,
    threshold: f64,
    flush_every: usize,
    unflushed: Vec<FrameIndex>,
    starting: usize,
    live: usize,
    target: usize,
    finished: Option<ThinReport>,
    history: Option<BufWriter<File>>,
}

impl<'a, S: FrameStore + ?Sized, D: DiffSource> GreedyThinner<'a, S, D> {
    /// Load the live frames and score every removable one.
    pub fn new(store: &'a S, diffs: &'a mut D, config: &ThinConfig) -> Result<Self, StorageError> {
        let frames = store.iterate(FrameFilter::LIVE)?;
        let count = frames.len();
        let prev = (0..count).map(|pos| pos.checked_sub(1)).collect();
        let next = (0..count)
            .map(|pos| (pos + 1 < count).then_some(pos + 1))
            .collect();

        let mut thinner = Self {
            store,
            diffs,
            protected: protected_positions(&frames),
            frames,
            prev,
            next,
            keys: vec![None; count],
            dists: vec![None; count],
            candidates: BTreeSet::new(),
            threshold: config.spacing_threshold,
            flush_every: config.flush_every.max(1),
            unflushed: Vec::new(),
            starting: count,
            live: count,
            target: config.effective_target(),
            finished: None,
            history: None,
        };

        if thinner.live > thinner.target {
            for pos in 0..count {
                thinner.rescore(pos)?;
            }
        }
        debug!(
            frames = count,
            candidates = thinner.candidates.len(),
            target = thinner.target,
            "Thinner ready"
        );
        Ok(thinner)
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Indices of the frames still live, in trail order
    pub fn live_indices(&self) -> Vec<FrameIndex> {
        let mut out = Vec::with_capacity(self.live);
        let mut cursor = (!self.frames.is_empty()).then_some(0);
        while let Some(pos) = cursor {
            out.push(self.frames[pos].index);
            cursor = self.next[pos];
        }
        out
    }

    /// Write a [`ThinHistoryRow`] as one JSON line before every removal
    pub fn record_history_to(&mut self, path: &Path) -> Result<(), StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.history = Some(BufWriter::new(File::create(path)?));
        info!(path = %path.display(), "Recording thinning history");
        Ok(())
    }

    pub fn history_row(&self) -> ThinHistoryRow {
        let diffs: Vec<f64> = self.candidates.iter().map(|&(diff, _)| diff as f64).collect();
        let dists: Vec<f64> = self.dists.iter().flatten().copied().collect();
        ThinHistoryRow {
            live: self.live,
            candidates: self.candidates.len(),
            diff: Spread::of(&diffs),
            distance: Spread::of(&dists),
        }
    }

    /// Remove one frame, or finish.
    pub fn step(&mut self) -> Result<ThinStep, StorageError> {
        if let Some(report) = self.finished {
            return Ok(ThinStep::Completed(report));
        }
        if self.live <= self.target {
            return self.finish(false).map(ThinStep::Completed);
        }

        if self.history.is_some() {
            let row = self.history_row();
            if let Some(writer) = self.history.as_mut() {
                serde_json::to_writer(&mut *writer, &row).map_err(std::io::Error::from)?;
                writer.write_all(b"\n")?;
            }
        }

        let Some((diff, pos)) = self.candidates.pop_first() else {
            warn!(
                live = self.live,
                target = self.target,
                shortfall = self.live - self.target,
                "No frame left within the spacing threshold"
            );
            return self.finish(false).map(ThinStep::Completed);
        };
        self.keys[pos] = None;
        self.dists[pos] = None;

        let (before, after) = (self.prev[pos], self.next[pos]);
        if let Some(a) = before {
            self.next[a] = after;
        }
        if let Some(b) = after {
            self.prev[b] = before;
        }
        self.prev[pos] = None;
        self.next[pos] = None;
        self.live -= 1;

        let index = self.frames[pos].index;
        self.frames[pos].use_frame = false;
        self.unflushed.push(index);
        if self.unflushed.len() >= self.flush_every {
            self.flush()?;
        }

        if let Some(a) = before {
            self.rescore(a)?;
        }
        if let Some(b) = after {
            self.rescore(b)?;
        }

        Ok(ThinStep::Removed {
            index,
            diff,
            live: self.live,
        })
    }

    /// Step until finished or cancelled
    pub fn run(&mut self, cancel: &dyn CancelToken) -> Result<ThinReport, StorageError> {
        let mut throttle = ProgressThrottle::new();
        info!(
            frames = self.live,
            target = self.target,
            candidates = self.candidates.len(),
            "Smoothing frames"
        );
        loop {
            match self.step()? {
                ThinStep::Completed(report) => return Ok(report),
                ThinStep::Removed { index, diff, live } => {
                    if throttle.ready() {
                        let done = self.starting - live;
                        let todo = self.starting.saturating_sub(self.target).max(1);
                        info!(
                            removed = done,
                            left = live - self.target.min(live),
                            percent = done as f64 / todo as f64 * 100.0,
                            last = index,
                            diff,
                            "Smoothing frames"
                        );
                        if cancel.is_cancelled() {
                            warn!(live, "Thinning cancelled");
                            return self.finish(true);
                        }
                    }
                }
            }
        }
    }

    /// Recompute a frame's diff and neighbour distance and update its candidacy
    fn rescore(&mut self, pos: usize) -> Result<(), StorageError> {
        if let Some(key) = self.keys[pos].take() {
            self.candidates.remove(&key);
        }
        self.dists[pos] = None;
        if self.protected[pos] || !self.frames[pos].use_frame {
            return Ok(());
        }
        let (Some(before), Some(after)) = (self.prev[pos], self.next[pos]) else {
            return Ok(());
        };

        let distance = self
            .diffs
            .distance(&self.frames[before], &self.frames[after]);
        self.dists[pos] = Some(distance);
        if distance > self.threshold {
            return Ok(());
        }
        let diff = self
            .diffs
            .diff(self.frames[pos].index, self.frames[after].index)?;
        self.keys[pos] = Some((diff, pos));
        self.candidates.insert((diff, pos));
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if !self.unflushed.is_empty() {
            self.store.mark_unused_batch(&self.unflushed)?;
            self.unflushed.clear();
        }
        self.diffs.flush()?;
        if let Some(writer) = self.history.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self, cancelled: bool) -> Result<ThinReport, StorageError> {
        self.flush()?;
        let report = ThinReport {
            starting: self.starting,
            removed: self.starting - self.live,
            live: self.live,
            target: self.target,
            shortfall: self.live.saturating_sub(self.target),
            cancelled,
        };
        if !cancelled {
            self.finished = Some(report);
        }
        info!(
            removed = report.removed,
            live = report.live,
            shortfall = report.shortfall,
            "Smoothing done"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SledFrameStore;
    use crate::types::PlanePoint;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Diff is the index gap, counting lookups
    #[derive(Default)]
    struct IndexGap {
        lookups: HashMap<(FrameIndex, FrameIndex), usize>,
        flushes: usize,
    }

    impl DiffSource for IndexGap {
        fn diff(&mut self, a: FrameIndex, b: FrameIndex) -> Result<u64, StorageError> {
            *self.lookups.entry((a.min(b), a.max(b))).or_default() += 1;
            Ok(a.abs_diff(b))
        }

        fn distance(&mut self, a: &FrameRecord, b: &FrameRecord) -> f64 {
            a.coordinate.distance(&b.coordinate)
        }

        fn flush(&mut self) -> Result<usize, StorageError> {
            self.flushes += 1;
            Ok(0)
        }
    }

    fn store_with(points: &[PlanePoint]) -> (TempDir, SledFrameStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledFrameStore::new(temp_dir.path()).unwrap();
        store.load_trail(points).unwrap();
        for index in 0..points.len() as u64 {
            store.store_escape_map(index, &[1]).unwrap();
        }
        (temp_dir, store)
    }

    fn config(target: usize, threshold: f64) -> ThinConfig {
        ThinConfig {
            target_frames: target,
            spacing_threshold: threshold,
            ..ThinConfig::default()
        }
    }

    #[test]
    fn test_protected_positions_first_wins_ties() {
        let frames: Vec<FrameRecord> = [(0.0, 0.0), (1.0, 2.0), (3.0, 2.0), (-1.0, 0.0), (0.5, 0.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| FrameRecord::new(i as u64, PlanePoint::new(x, y)))
            .collect();
        let protected = protected_positions(&frames);
        assert_eq!(protected, vec![true, true, true, true, true]);

        let flat: Vec<FrameRecord> = (0..6)
            .map(|i| FrameRecord::new(i, PlanePoint::new(i as f64, 0.0)))
            .collect();
        assert_eq!(
            protected_positions(&flat),
            vec![true, false, false, false, false, true]
        );
    }

    #[test]
    fn test_removes_one_frame_per_step() {
        let points: Vec<PlanePoint> = (0..8).map(|i| PlanePoint::new(i as f64, 0.0)).collect();
        let (_dir, store) = store_with(&points);
        let mut diffs = IndexGap::default();
        let mut thinner = GreedyThinner::new(&store, &mut diffs, &config(4, 10.0)).unwrap();

        let mut live = thinner.live();
        while let ThinStep::Removed { live: now, .. } = thinner.step().unwrap() {
            assert_eq!(now, live - 1);
            live = now;
        }
        assert_eq!(thinner.live(), 4);
        assert_eq!(thinner.live_indices(), vec![0, 5, 6, 7]);
    }

    #[test]
    fn test_spacing_floor_causes_shortfall() {
        // Frame 2 sits between neighbours 1.9 apart, frame 1 between neighbours 0.2 apart
        let points = vec![
            PlanePoint::new(0.0, 0.0),
            PlanePoint::new(0.1, 0.0),
            PlanePoint::new(0.2, 0.0),
            PlanePoint::new(2.0, 0.0),
        ];
        let (_dir, store) = store_with(&points);
        let mut diffs = IndexGap::default();
        let mut thinner = GreedyThinner::new(&store, &mut diffs, &config(2, 0.5)).unwrap();
        let report = thinner.run(&crate::cancel::NeverCancel).unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.live, 3);
        assert_eq!(report.shortfall, 1);
        assert_eq!(thinner.live_indices(), vec![0, 2, 3]);
    }

    #[test]
    fn test_flags_are_persisted() {
        let points: Vec<PlanePoint> = (0..6).map(|i| PlanePoint::new(i as f64, 0.0)).collect();
        let (_dir, store) = store_with(&points);
        let mut diffs = IndexGap::default();
        let mut conf = config(3, 10.0);
        conf.flush_every = 2;
        let report = GreedyThinner::new(&store, &mut diffs, &conf)
            .unwrap()
            .run(&crate::cancel::NeverCancel)
            .unwrap();

        assert_eq!(report.live, 3);
        let live: Vec<u64> = store
            .iterate(FrameFilter::LIVE)
            .unwrap()
            .iter()
            .map(|f| f.index)
            .collect();
        assert_eq!(live, vec![0, 4, 5]);
        assert!(diffs.flushes >= 2);
    }

    #[test]
    fn test_spread_matches_sample_statistics() {
        assert_eq!(Spread::of(&[]), None);
        let single = Spread::of(&[4.0]).unwrap();
        assert_eq!((single.min, single.max, single.mean, single.stddev), (4.0, 4.0, 4.0, 0.0));

        let spread = Spread::of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(spread.min, 2.0);
        assert_eq!(spread.max, 9.0);
        assert_eq!(spread.mean, 5.0);
        assert!((spread.stddev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_history_has_one_row_per_removal() {
        let points: Vec<PlanePoint> = (0..8).map(|i| PlanePoint::new(i as f64, 0.0)).collect();
        let (dir, store) = store_with(&points);
        let mut diffs = IndexGap::default();
        let mut thinner = GreedyThinner::new(&store, &mut diffs, &config(4, 10.0)).unwrap();
        let path = dir.path().join("history").join("thin.jsonl");
        thinner.record_history_to(&path).unwrap();
        let report = thinner.run(&crate::cancel::NeverCancel).unwrap();
        assert_eq!(report.removed, 4);

        let rows: Vec<ThinHistoryRow> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        let live: Vec<usize> = rows.iter().map(|row| row.live).collect();
        assert_eq!(live, vec![8, 7, 6, 5]);

        // Interior frames 1..=6 all sit one index from their successor, two units between neighbours
        let first = rows[0];
        assert_eq!(first.candidates, 6);
        let diff = first.diff.unwrap();
        assert_eq!((diff.min, diff.max, diff.stddev), (1.0, 1.0, 0.0));
        let distance = first.distance.unwrap();
        assert_eq!((distance.min, distance.max), (2.0, 2.0));
    }

    #[test]
    fn test_already_at_target_does_nothing() {
        let points: Vec<PlanePoint> = (0..3).map(|i| PlanePoint::new(i as f64, 0.0)).collect();
        let (_dir, store) = store_with(&points);
        let mut diffs = IndexGap::default();
        let mut thinner = GreedyThinner::new(&store, &mut diffs, &config(5, 10.0)).unwrap();
        match thinner.step().unwrap() {
            ThinStep::Completed(report) => {
                assert_eq!(report.removed, 0);
                assert_eq!(report.shortfall, 0);
            }
            other => panic!("unexpected step {:?}", other),
        }
        assert!(diffs.lookups.is_empty());
    }
}
