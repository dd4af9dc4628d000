//! Wire types exchanged between the render server and its workers.
//!
//! Request and response bodies are bincode. An empty `/get` body means the job list is
//! exhausted.

use crate::error::WorkError;
use crate::types::{FrameIndex, PlanePoint};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reply to `/hello`
pub const HELLO_REPLY: &str = "HELLO";

/// Reply to an accepted `/done`
pub const DONE_REPLY: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub index: FrameIndex,
    pub coordinate: PlanePoint,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobBatch {
    pub jobs: Vec<RenderJob>,
}

impl JobBatch {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Body for `/get`; nothing at all when there is no work left
    pub fn to_body(&self) -> Result<Vec<u8>, WorkError> {
        if self.is_empty() {
            Ok(Vec::new())
        } else {
            encode(self)
        }
    }

    pub fn from_body(body: &[u8]) -> Result<Self, WorkError> {
        if body.is_empty() {
            Ok(Self::default())
        } else {
            decode(body)
        }
    }
}

/// A compressed escape map for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedFrame {
    pub index: FrameIndex,
    pub data: Vec<u8>,
}

/// Body of `/done`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionReport {
    /// Name of the reporting worker, for the server's throughput log
    pub worker: String,
    pub frames: Vec<RenderedFrame>,
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WorkError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, WorkError> {
    Ok(bincode::deserialize(body)?)
}
