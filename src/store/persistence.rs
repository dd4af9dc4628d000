//! Persistence layer for the Frame Store

use crate::error::StorageError;
use crate::store::{FrameFilter, FrameRecord, FrameStore, StoreStats};
use crate::types::{FrameIndex, PlanePoint};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

const FRAMES_TREE: &str = "frames";
const FRAME_DATA_TREE: &str = "frame_data";
pub(crate) const DIFFS_TREE: &str = "diffs";

pub(crate) fn frame_key(index: FrameIndex) -> [u8; 8] {
    index.to_be_bytes()
}

/// Sled-based implementation of FrameStore
///
/// Keys are big-endian frame indices, so tree iteration is index order.
pub struct SledFrameStore {
    db: sled::Db,
    frames: sled::Tree,
    frame_data: sled::Tree,
}

impl SledFrameStore {
    /// Open (or create) the store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            ))
        })?;
        let frames = db.open_tree(FRAMES_TREE)?;
        let frame_data = db.open_tree(FRAME_DATA_TREE)?;
        Ok(Self {
            db,
            frames,
            frame_data,
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    fn diffs(&self) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(DIFFS_TREE)?)
    }

    fn put_record(&self, record: &FrameRecord) -> Result<(), StorageError> {
        self.frames
            .insert(frame_key(record.index), bincode::serialize(record)?)?;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.frames.len()
    }

    /// Materialize frames from a trail.
    ///
    /// Existing rows are kept when their count matches the trail; otherwise every frame, escape
    /// map and diff is dropped and the trail is loaded fresh. Returns whether a reload happened.
    pub fn load_trail(&self, trail: &[PlanePoint]) -> Result<bool, StorageError> {
        if self.count() == trail.len() {
            info!(frames = trail.len(), "Store already has frame data");
            return Ok(false);
        }

        self.frames.clear()?;
        self.frame_data.clear()?;
        self.diffs()?.clear()?;

        let mut batch = sled::Batch::default();
        for (i, &coordinate) in trail.iter().enumerate() {
            let record = FrameRecord::new(i as FrameIndex, coordinate);
            batch.insert(frame_key(record.index).to_vec(), bincode::serialize(&record)?);
        }
        self.frames.apply_batch(batch)?;
        self.flush()?;

        info!(frames = trail.len(), "Store populated from trail");
        Ok(true)
    }

    /// Re-enable every frame; returns how many flags flipped back
    pub fn reset_use(&self) -> Result<usize, StorageError> {
        let mut batch = sled::Batch::default();
        let mut flipped = 0;
        for mut record in self.iterate(FrameFilter {
            use_frame: Some(false),
            has_data: None,
        })? {
            record.use_frame = true;
            batch.insert(frame_key(record.index).to_vec(), bincode::serialize(&record)?);
            flipped += 1;
        }
        self.frames.apply_batch(batch)?;
        Ok(flipped)
    }

    /// Drop every cached diff; returns how many rows were removed
    pub fn reset_diffs(&self) -> Result<usize, StorageError> {
        let diffs = self.diffs()?;
        let removed = diffs.len();
        diffs.clear()?;
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats, StorageError> {
        let mut stats = StoreStats {
            diffs: self.diffs()?.len(),
            ..StoreStats::default()
        };
        for record in self.iterate(FrameFilter::ALL)? {
            stats.total += 1;
            if record.has_data {
                stats.with_data += 1;
                if record.use_frame {
                    stats.in_use += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush().map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            ))
        })?;
        Ok(())
    }
}

impl FrameStore for SledFrameStore {
    fn create(&self, index: FrameIndex, coordinate: PlanePoint) -> Result<(), StorageError> {
        let record = FrameRecord::new(index, coordinate);
        let swapped = self.frames.compare_and_swap(
            frame_key(index),
            None as Option<&[u8]>,
            Some(bincode::serialize(&record)?),
        )?;
        swapped.map_err(|_| StorageError::DuplicateFrame(index))
    }

    fn get(&self, index: FrameIndex) -> Result<Option<FrameRecord>, StorageError> {
        match self.frames.get(frame_key(index))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn store_escape_map(&self, index: FrameIndex, compressed: &[u8]) -> Result<bool, StorageError> {
        let mut record = self.get(index)?.ok_or(StorageError::FrameNotFound(index))?;
        if record.has_data {
            return Ok(false);
        }
        // Data first, so has_data never points at a missing map
        self.frame_data.insert(frame_key(index), compressed)?;
        record.has_data = true;
        self.put_record(&record)?;
        Ok(true)
    }

    fn store_escape_maps(&self, frames: &[(FrameIndex, Vec<u8>)]) -> Result<usize, StorageError> {
        let mut data_batch = sled::Batch::default();
        let mut record_batch = sled::Batch::default();
        let mut batched = HashSet::new();

        for (index, data) in frames {
            // At-least-once delivery can repeat a frame inside one batch
            if batched.contains(index) {
                continue;
            }
            let mut record = self
                .get(*index)?
                .ok_or(StorageError::FrameNotFound(*index))?;
            if record.has_data {
                continue;
            }
            record.has_data = true;
            data_batch.insert(frame_key(*index).to_vec(), data.as_slice());
            record_batch.insert(frame_key(*index).to_vec(), bincode::serialize(&record)?);
            batched.insert(*index);
        }

        self.frame_data.apply_batch(data_batch)?;
        self.frames.apply_batch(record_batch)?;
        Ok(batched.len())
    }

    fn escape_map(&self, index: FrameIndex) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.frame_data.get(frame_key(index))?.map(|v| v.to_vec()))
    }

    fn mark_unused(&self, index: FrameIndex) -> Result<(), StorageError> {
        let mut record = self.get(index)?.ok_or(StorageError::FrameNotFound(index))?;
        if record.use_frame {
            record.use_frame = false;
            self.put_record(&record)?;
        }
        Ok(())
    }

    fn mark_unused_batch(&self, indices: &[FrameIndex]) -> Result<(), StorageError> {
        let mut batch = sled::Batch::default();
        for &index in indices {
            let mut record = self.get(index)?.ok_or(StorageError::FrameNotFound(index))?;
            record.use_frame = false;
            batch.insert(frame_key(index).to_vec(), bincode::serialize(&record)?);
        }
        self.frames.apply_batch(batch)?;
        Ok(())
    }

    fn iterate(&self, filter: FrameFilter) -> Result<Vec<FrameRecord>, StorageError> {
        let mut records = Vec::new();
        for item in self.frames.iter() {
            let (_, value) = item?;
            let record: FrameRecord = bincode::deserialize(&value)?;
            if filter.matches(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }
}
