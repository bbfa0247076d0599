// SPDX-License-Identifier: MPL-2.0

//! One-shot scans of encoded images
//!
//! Bypasses the throttle gate, the single-flight slot and the dispatch
//! sink: one decode, one detection call, results returned directly.

use super::normalize::normalize;
use super::single_flight::{DetectionCapability, detect_once};
use super::types::DetectionResult;
use crate::errors::{ScanError, ScanResult};
use crate::media::DetectorImage;
use tracing::debug;

/// Decode `image_bytes` and run the capability on it once
pub async fn scan_still_image(
    capability: &dyn DetectionCapability,
    image_bytes: &[u8],
) -> ScanResult<Vec<DetectionResult>> {
    let image = decode_image(image_bytes.to_vec()).await?;
    debug!(
        width = image.width,
        height = image.height,
        "Decoded still image for scanning"
    );

    let raw = detect_once(capability, image).await?;
    let results = normalize(raw);

    debug!(count = results.len(), "Still image scan complete");
    Ok(results)
}

/// Decode on the blocking pool into the live pipeline's image representation
async fn decode_image(bytes: Vec<u8>) -> ScanResult<DetectorImage> {
    if bytes.is_empty() {
        return Err(ScanError::InvalidImage("empty image buffer".into()));
    }

    tokio::task::spawn_blocking(move || -> ScanResult<DetectorImage> {
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| ScanError::InvalidImage(e.to_string()))?;
        Ok(DetectorImage::from_gray(decoded.to_luma8()))
    })
    .await
    .map_err(|e| ScanError::InvalidImage(format!("image decode task failed: {}", e)))?
}
