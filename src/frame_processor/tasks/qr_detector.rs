// SPDX-License-Identifier: GPL-3.0-only

//! QR code detection task
//!
//! This module implements a detection capability on top of the rqrr crate.
//! The detector image's luma is sampled (and downscaled for large frames)
//! into a grayscale buffer, grids are located and decoded, and their corner
//! points are scaled back to source frame coordinates.

use crate::constants::detection;
use crate::errors::ScanError;
use crate::frame_processor::single_flight::{DetectionCapability, DetectionCompletion, RawBarcode};
use crate::frame_processor::symbology;
use crate::frame_processor::types::{BarcodeFormats, BarcodeType};
use crate::media::DetectorImage;
use tracing::{debug, trace, warn};

/// QR code detector
///
/// Analyzes detector images to find and decode QR codes. Optimized for
/// real-time processing with frame downscaling.
pub struct QrDetector {
    /// Maximum dimension for processing (frames are downscaled to this)
    max_dimension: u32,
    /// Capability format bitmask, `None` when no selected format has a code
    capability_mask: Option<u32>,
}

impl Default for QrDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl QrDetector {
    /// Create a detector using the process-wide format selection
    pub fn new() -> Self {
        Self::with_formats(symbology::supported_formats())
    }

    /// Create a detector for an explicit format selection
    pub fn with_formats(formats: BarcodeFormats) -> Self {
        let capability_mask = symbology::mask_to_capability(formats);
        if capability_mask.is_none() {
            warn!(formats = %formats, "No selected format has a detector code");
        }

        Self {
            // QR codes are typically large enough to be detected at 640px
            max_dimension: detection::DEFAULT_MAX_DIMENSION,
            capability_mask,
        }
    }

    /// Create a QR detector with custom max dimension
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension.max(1);
        self
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn capability_mask(&self) -> Option<u32> {
        self.capability_mask
    }
}

impl DetectionCapability for QrDetector {
    fn formats(&self) -> BarcodeFormats {
        self.capability_mask
            .map(symbology::mask_from_capability)
            .unwrap_or_else(BarcodeFormats::empty)
    }

    fn detect(&self, image: DetectorImage, completion: DetectionCompletion) {
        if !self.formats().contains(BarcodeFormats::QR_CODE) {
            trace!(mask = ?self.capability_mask, "QR codes not selected, nothing to detect");
            completion(Ok(Vec::new()));
            return;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                completion(Err(ScanError::DetectionFailure(format!(
                    "no runtime for QR detection: {}",
                    e
                ))));
                return;
            }
        };

        let max_dim = self.max_dimension;

        // Run detection in a blocking task to avoid blocking the async runtime.
        // A panic drops the completion, which the caller sees as a failure.
        handle.spawn_blocking(move || {
            let matches = detect_sync(&image, max_dim);
            completion(Ok(matches));
        });
    }
}

/// Synchronous QR detection (runs in blocking task)
pub fn detect_sync(image: &DetectorImage, max_dimension: u32) -> Vec<RawBarcode> {
    let start = std::time::Instant::now();

    let width = image.width;
    let height = image.height;
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let (gray, proc_width, proc_height, scale) = if width > max_dimension || height > max_dimension
    {
        let scale = (width as f32 / max_dimension as f32).max(height as f32 / max_dimension as f32);
        let new_width = ((width as f32 / scale) as u32).max(1);
        let new_height = ((height as f32 / scale) as u32).max(1);
        (
            downscale_luma(image, new_width, new_height),
            new_width,
            new_height,
            scale,
        )
    } else {
        (image.to_luma8().into_raw(), width, height, 1.0)
    };

    let conversion_time = start.elapsed();
    trace!(
        proc_width,
        proc_height,
        scale,
        conversion_ms = conversion_time.as_millis(),
        "Prepared grayscale image for processing"
    );

    let w = proc_width as usize;
    let h = proc_height as usize;
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| gray[y * w + x]);
    let grids = prepared.detect_grids();

    trace!(
        count = grids.len(),
        detection_ms = (start.elapsed() - conversion_time).as_millis(),
        "QR grid search complete"
    );

    let mut matches = Vec::with_capacity(grids.len());
    for grid in grids {
        let content = match grid.decode() {
            Ok((_meta, content)) => content,
            Err(e) => {
                debug!(error = ?e, "Failed to decode QR code");
                continue;
            }
        };

        // Scale back to original frame coordinates
        let corner_points = grid
            .bounds
            .iter()
            .map(|p| {
                (
                    (p.x as f32 * scale).round() as i32,
                    (p.y as f32 * scale).round() as i32,
                )
            })
            .collect();

        debug!(content = %content, "Detected QR code");

        matches.push(RawBarcode {
            format_code: symbology::format_to_capability(BarcodeFormats::QR_CODE).unwrap_or(0),
            value_type_code: symbology::value_type_to_capability(BarcodeType::infer(&content)),
            raw_bytes: Some(content.as_bytes().to_vec()),
            display_value: Some(content.clone()),
            raw_value: Some(content),
            corner_points,
        });
    }

    if !matches.is_empty() {
        debug!(
            count = matches.len(),
            total_ms = start.elapsed().as_millis(),
            "QR detection found codes"
        );
    }

    matches
}

/// Downscale the luma channel using bilinear interpolation
fn downscale_luma(image: &DetectorImage, dst_width: u32, dst_height: u32) -> Vec<u8> {
    let src_width = image.width;
    let src_height = image.height;

    let mut result = Vec::with_capacity((dst_width * dst_height) as usize);

    let x_ratio = src_width as f32 / dst_width as f32;
    let y_ratio = src_height as f32 / dst_height as f32;

    for y in 0..dst_height {
        for x in 0..dst_width {
            let src_x = x as f32 * x_ratio;
            let src_y = y as f32 * y_ratio;

            let x0 = src_x as u32;
            let y0 = src_y as u32;
            let x1 = (x0 + 1).min(src_width - 1);
            let y1 = (y0 + 1).min(src_height - 1);

            let x_frac = src_x - x0 as f32;
            let y_frac = src_y - y0 as f32;

            let p00 = image.luma(x0, y0) as f32;
            let p01 = image.luma(x1, y0) as f32;
            let p10 = image.luma(x0, y1) as f32;
            let p11 = image.luma(x1, y1) as f32;

            let value = p00 * (1.0 - x_frac) * (1.0 - y_frac)
                + p01 * x_frac * (1.0 - y_frac)
                + p10 * (1.0 - x_frac) * y_frac
                + p11 * x_frac * y_frac;

            result.push(value as u8);
        }
    }

    result
}
