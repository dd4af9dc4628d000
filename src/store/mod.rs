//! Frame Store
//!
//! Durable per-frame rows (trail coordinate, rendered escape map, inclusion flag) and the
//! cache of pairwise frame diffs built on top of them.

pub mod codec;
pub mod diff;
pub mod persistence;

pub use diff::{DiffCache, PrecomputeReport};
pub use persistence::SledFrameStore;

use crate::error::StorageError;
use crate::types::{FrameIndex, PlanePoint};
use serde::{Deserialize, Serialize};

/// One frame row. The escape map itself lives in a separate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub index: FrameIndex,
    pub coordinate: PlanePoint,
    pub has_data: bool,
    pub use_frame: bool,
}

impl FrameRecord {
    pub fn new(index: FrameIndex, coordinate: PlanePoint) -> Self {
        Self {
            index,
            coordinate,
            has_data: false,
            use_frame: true,
        }
    }
}

/// Row filter for [`FrameStore::iterate`]; `None` matches either value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFilter {
    pub use_frame: Option<bool>,
    pub has_data: Option<bool>,
}

impl FrameFilter {
    pub const ALL: FrameFilter = FrameFilter {
        use_frame: None,
        has_data: None,
    };

    /// Frames still waiting for an escape map
    pub const UNRENDERED: FrameFilter = FrameFilter {
        use_frame: None,
        has_data: Some(false),
    };

    pub const RENDERED: FrameFilter = FrameFilter {
        use_frame: None,
        has_data: Some(true),
    };

    /// Rendered frames still in use
    pub const LIVE: FrameFilter = FrameFilter {
        use_frame: Some(true),
        has_data: Some(true),
    };

    pub fn matches(&self, record: &FrameRecord) -> bool {
        self.use_frame.map_or(true, |v| v == record.use_frame)
            && self.has_data.map_or(true, |v| v == record.has_data)
    }
}

/// Row counts reported by `stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub with_data: usize,
    pub in_use: usize,
    pub diffs: usize,
}

/// Frame Store interface
///
/// Mutation is additive except for the one-way `use_frame` flag.
pub trait FrameStore: Send + Sync {
    /// Insert a new frame; an existing index is a [`StorageError::DuplicateFrame`]
    fn create(&self, index: FrameIndex, coordinate: PlanePoint) -> Result<(), StorageError>;

    fn get(&self, index: FrameIndex) -> Result<Option<FrameRecord>, StorageError>;

    fn has_data(&self, index: FrameIndex) -> Result<bool, StorageError> {
        Ok(self.get(index)?.map_or(false, |record| record.has_data))
    }

    /// Store a compressed escape map. Returns false when the frame already had one.
    fn store_escape_map(&self, index: FrameIndex, compressed: &[u8]) -> Result<bool, StorageError>;

    /// Store several escape maps; returns how many were newly stored.
    fn store_escape_maps(&self, frames: &[(FrameIndex, Vec<u8>)]) -> Result<usize, StorageError> {
        let mut stored = 0;
        for (index, data) in frames {
            if self.store_escape_map(*index, data)? {
                stored += 1;
            }
        }
        Ok(stored)
    }

    /// Compressed escape map of a frame, if rendered
    fn escape_map(&self, index: FrameIndex) -> Result<Option<Vec<u8>>, StorageError>;

    fn mark_unused(&self, index: FrameIndex) -> Result<(), StorageError>;

    fn mark_unused_batch(&self, indices: &[FrameIndex]) -> Result<(), StorageError> {
        for &index in indices {
            self.mark_unused(index)?;
        }
        Ok(())
    }

    /// Matching frames ordered by index
    fn iterate(&self, filter: FrameFilter) -> Result<Vec<FrameRecord>, StorageError>;
}
