//! Escape-map rendering for trail frames.
//!
//! Each frame is the Julia set whose parameter is the frame's trail coordinate, sampled on a
//! `width x height` grid covering `extent` plane units centred on the origin. Pixels hold the
//! escape iteration, or `max_iter + 1` for members, one byte each in row-major order.

use crate::cancel::CancelToken;
use crate::config::RenderConfig;
use crate::error::StorageError;
use crate::oracle::MembershipOracle;
use crate::progress::ProgressThrottle;
use crate::store::codec;
use crate::store::{FrameFilter, FrameStore, SledFrameStore};
use crate::types::{FrameIndex, PlanePoint};
use rayon::prelude::*;
use tracing::{info, warn};

/// Render the escape map for one frame coordinate
pub fn render_escape_map(
    oracle: &dyn MembershipOracle,
    coordinate: PlanePoint,
    config: &RenderConfig,
) -> Vec<u8> {
    let width = config.width as usize;
    let height = config.height as usize;
    let half = config.extent / 2.0;
    let mut pixels = vec![0u8; width * height];

    pixels
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(row, line)| {
            let y = (row as f64 / height as f64) * config.extent - half;
            for (column, pixel) in line.iter_mut().enumerate() {
                let x = (column as f64 / width as f64) * config.extent - half;
                let level = oracle.level(PlanePoint::new(x, y), Some(coordinate), config.max_iter);
                *pixel = u8::try_from(level).unwrap_or(u8::MAX);
            }
        });

    pixels
}

/// Render and compress, ready for [`FrameStore::store_escape_map`]
pub fn render_compressed(
    oracle: &dyn MembershipOracle,
    coordinate: PlanePoint,
    config: &RenderConfig,
) -> Result<Vec<u8>, StorageError> {
    codec::compress(&render_escape_map(oracle, coordinate, config))
}

/// Outcome of [`populate_frames`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub pending: usize,
    pub rendered: usize,
    pub cancelled: bool,
}

/// Render every frame that has no escape map yet.
///
/// Frames are rendered in parallel; results are written by this thread, in batches of
/// `flush_rows`.
pub fn populate_frames(
    store: &SledFrameStore,
    oracle: &dyn MembershipOracle,
    config: &RenderConfig,
    flush_rows: usize,
    cancel: &dyn CancelToken,
) -> Result<PopulateReport, StorageError> {
    let todo = store.iterate(FrameFilter::UNRENDERED)?;
    let total = store.count();
    let mut report = PopulateReport {
        pending: todo.len(),
        ..PopulateReport::default()
    };
    if todo.is_empty() {
        info!("All frames already rendered");
        return Ok(report);
    }
    info!(frames = todo.len(), "Calculating all frames");

    let flush_rows = flush_rows.max(1);
    let wave_size = rayon::current_num_threads().max(1) * 2;
    let mut inserts: Vec<(FrameIndex, Vec<u8>)> = Vec::new();
    let mut throttle = ProgressThrottle::new();

    for wave in todo.chunks(wave_size) {
        if cancel.is_cancelled() {
            warn!(rendered = report.rendered, "Rendering cancelled");
            report.cancelled = true;
            break;
        }

        let rendered: Vec<(FrameIndex, Vec<u8>)> = wave
            .par_iter()
            .map(|frame| {
                render_compressed(oracle, frame.coordinate, config).map(|data| (frame.index, data))
            })
            .collect::<Result<_, StorageError>>()?;

        report.rendered += rendered.len();
        inserts.extend(rendered);
        if inserts.len() >= flush_rows {
            store.store_escape_maps(&inserts)?;
            inserts.clear();
        }

        if throttle.ready() {
            let last = wave.last().map_or(0, |frame| frame.index);
            info!(
                last,
                left = report.pending - report.rendered,
                percent = last as f64 / total.max(1) as f64 * 100.0,
                "Rendering frames"
            );
        }
    }

    if !inserts.is_empty() {
        store.store_escape_maps(&inserts)?;
    }
    store.flush()?;
    Ok(report)
}
