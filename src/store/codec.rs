//! Escape-map compression and the pixel diff metric.

use crate::error::StorageError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compress a flattened escape map for storage
pub fn compress(pixels: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(pixels.len() / 4), Compression::default());
    encoder.write_all(pixels)?;
    Ok(encoder.finish()?)
}

/// Inflate a stored escape map
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut pixels = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut pixels)?;
    Ok(pixels)
}

/// Sum of absolute per-pixel differences between two escape maps
pub fn diff_pixels(a: &[u8], b: &[u8]) -> Result<u64, StorageError> {
    if a.len() != b.len() {
        return Err(StorageError::EscapeMapMismatch(a.len(), b.len()));
    }
    Ok(a.iter()
        .zip(b)
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum())
}
