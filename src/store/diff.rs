//! Diff Cache
//!
//! Pairwise frame diffs, persisted in the `diffs` tree and mirrored in memory. Pair keys are
//! normalized to `(min, max)`, so a diff and its reverse are one row. Geometric distances
//! between frames are cached in memory only.

use crate::cancel::CancelToken;
use crate::error::StorageError;
use crate::progress::ProgressThrottle;
use crate::store::codec;
use crate::store::persistence::DIFFS_TREE;
use crate::store::{FrameFilter, FrameRecord, FrameStore, SledFrameStore};
use crate::types::FrameIndex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Frames per parallel diff task
const CHUNK_FRAMES: usize = 50;

/// Parallel tasks collected before results are merged
const CHUNKS_PER_WAVE: usize = 64;

type PairKey = (FrameIndex, FrameIndex);

fn pair_key(a: FrameIndex, b: FrameIndex) -> PairKey {
    (a.min(b), a.max(b))
}

fn encode_key(key: PairKey) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&key.0.to_be_bytes());
    bytes[8..].copy_from_slice(&key.1.to_be_bytes());
    bytes
}

fn decode_key(bytes: &[u8]) -> Option<PairKey> {
    let a = u64::from_be_bytes(bytes.get(..8)?.try_into().ok()?);
    let b = u64::from_be_bytes(bytes.get(8..16)?.try_into().ok()?);
    Some((a, b))
}

fn decode_diff(bytes: &[u8]) -> Option<u64> {
    Some(u64::from_be_bytes(bytes.try_into().ok()?))
}

/// Load and inflate a frame's escape map
fn load_pixels(store: &SledFrameStore, index: FrameIndex) -> Result<Vec<u8>, StorageError> {
    let data = store
        .escape_map(index)?
        .ok_or(StorageError::MissingEscapeMap(index))?;
    codec::decompress(&data)
}

/// Compute the diff between two rendered frames straight from the store
pub fn compute_diff(
    store: &SledFrameStore,
    a: FrameIndex,
    b: FrameIndex,
) -> Result<u64, StorageError> {
    codec::diff_pixels(&load_pixels(store, a)?, &load_pixels(store, b)?)
}

/// Outcome of [`DiffCache::precompute_adjacent`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrecomputeReport {
    /// Adjacent rendered pairs considered
    pub pairs: usize,
    /// Pairs that were already cached
    pub cached: usize,
    pub computed: usize,
    pub cancelled: bool,
}

pub struct DiffCache {
    store: Arc<SledFrameStore>,
    tree: sled::Tree,
    diffs: HashMap<PairKey, u64>,
    dists: HashMap<PairKey, f64>,
    pending: Vec<(PairKey, u64)>,
}

impl DiffCache {
    /// Open the cache, loading every persisted diff into memory
    pub fn open(store: Arc<SledFrameStore>) -> Result<Self, StorageError> {
        let tree = store.db().open_tree(DIFFS_TREE)?;
        let mut diffs = HashMap::with_capacity(tree.len());
        for item in tree.iter() {
            let (key, value) = item?;
            match (decode_key(&key), decode_diff(&value)) {
                (Some(key), Some(diff)) => {
                    diffs.insert(key, diff);
                }
                _ => {
                    return Err(StorageError::IoError(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "Malformed diff row",
                    )))
                }
            }
        }
        info!(diffs = diffs.len(), "Loaded diff cache");

        Ok(Self {
            store,
            tree,
            diffs,
            dists: HashMap::new(),
            pending: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.diffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffs.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn cached(&self, a: FrameIndex, b: FrameIndex) -> Option<u64> {
        self.diffs.get(&pair_key(a, b)).copied()
    }

    /// Cached diff, or compute, cache and return it
    pub fn get_diff(&mut self, a: FrameIndex, b: FrameIndex) -> Result<u64, StorageError> {
        if let Some(diff) = self.cached(a, b) {
            return Ok(diff);
        }
        let diff = compute_diff(&self.store, a, b)?;
        self.insert(a, b, diff)?;
        Ok(diff)
    }

    /// Euclidean distance between two frames' coordinates, memoized in memory
    pub fn get_distance(&mut self, a: &FrameRecord, b: &FrameRecord) -> f64 {
        *self
            .dists
            .entry(pair_key(a.index, b.index))
            .or_insert_with(|| a.coordinate.distance(&b.coordinate))
    }

    /// Record a computed diff. Re-inserting the same value is a no-op; a different value for a
    /// known pair is a [`StorageError::DiffConflict`].
    pub fn insert(&mut self, a: FrameIndex, b: FrameIndex, diff: u64) -> Result<(), StorageError> {
        let key = pair_key(a, b);
        match self.diffs.get(&key) {
            Some(&stored) if stored == diff => Ok(()),
            Some(&stored) => Err(StorageError::DiffConflict {
                a: key.0,
                b: key.1,
                stored,
                new: diff,
            }),
            None => {
                self.diffs.insert(key, diff);
                self.pending.push((key, diff));
                Ok(())
            }
        }
    }

    /// Write pending rows; returns how many were written
    pub fn flush(&mut self) -> Result<usize, StorageError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let mut batch = sled::Batch::default();
        for (key, diff) in &self.pending {
            batch.insert(encode_key(*key).to_vec(), diff.to_be_bytes().to_vec());
        }
        self.tree.apply_batch(batch)?;
        let written = self.pending.len();
        self.pending.clear();
        Ok(written)
    }

    /// Compute diffs for every index-adjacent pair of rendered frames not yet cached.
    ///
    /// Pairs are split into chunks of consecutive frames computed in parallel; results are
    /// merged here and flushed every `flush_rows` rows.
    pub fn precompute_adjacent(
        &mut self,
        flush_rows: usize,
        cancel: &dyn CancelToken,
    ) -> Result<PrecomputeReport, StorageError> {
        let rendered: Vec<FrameIndex> = self
            .store
            .iterate(FrameFilter::RENDERED)?
            .iter()
            .map(|record| record.index)
            .collect();

        let mut report = PrecomputeReport {
            pairs: rendered.len().saturating_sub(1),
            ..PrecomputeReport::default()
        };
        let missing: Vec<PairKey> = rendered
            .windows(2)
            .map(|pair| (pair[0], pair[1]))
            .filter(|&(a, b)| self.cached(a, b).is_none())
            .collect();
        report.cached = report.pairs - missing.len();

        if missing.is_empty() {
            info!(pairs = report.pairs, "All adjacent diffs already cached");
            return Ok(report);
        }
        info!(missing = missing.len(), "Finding initial diffs");

        let flush_rows = flush_rows.max(1);
        let mut throttle = ProgressThrottle::new();
        let chunks: Vec<&[PairKey]> = missing.chunks(CHUNK_FRAMES).collect();

        for wave in chunks.chunks(CHUNKS_PER_WAVE) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let store = &self.store;
            let results: Vec<Option<Vec<(PairKey, u64)>>> = wave
                .par_iter()
                .map(|chunk| diff_chunk(store, chunk, cancel))
                .collect::<Result<_, StorageError>>()?;

            for rows in results {
                let Some(rows) = rows else {
                    report.cancelled = true;
                    continue;
                };
                for ((a, b), diff) in rows {
                    self.insert(a, b, diff)?;
                    report.computed += 1;
                }
                if self.pending.len() >= flush_rows {
                    self.flush()?;
                }
            }

            if throttle.ready() {
                let done = report.cached + report.computed;
                info!(
                    done,
                    left = report.pairs - done,
                    percent = done as f64 / report.pairs as f64 * 100.0,
                    "Diffs"
                );
            }
            if report.cancelled {
                break;
            }
        }

        self.flush()?;
        Ok(report)
    }
}

/// Diff one chunk of pairs, reusing the previous frame when pairs are consecutive.
/// Returns `None` when cancellation was requested before the chunk started.
fn diff_chunk(
    store: &SledFrameStore,
    chunk: &[PairKey],
    cancel: &dyn CancelToken,
) -> Result<Option<Vec<(PairKey, u64)>>, StorageError> {
    if cancel.is_cancelled() {
        return Ok(None);
    }
    let mut rows = Vec::with_capacity(chunk.len());
    let mut last: Option<(FrameIndex, Vec<u8>)> = None;
    for &(a, b) in chunk {
        let pixels_a = match last.take() {
            Some((index, pixels)) if index == a => pixels,
            _ => load_pixels(store, a)?,
        };
        let pixels_b = load_pixels(store, b)?;
        rows.push(((a, b), codec::diff_pixels(&pixels_a, &pixels_b)?));
        last = Some((b, pixels_b));
    }
    Ok(Some(rows))
}
