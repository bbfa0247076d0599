// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera backed by image files
//!
//! Stands in for a hardware camera when running the scanner from the
//! command line or in tests. Images from a directory are replayed as a
//! paced frame stream in a chosen sensor pixel format.
//!
//! ```text
//! image files ─► decode once ─► sensor layout (NV21, RGBA, ...)
//!                                     │
//!                                     ▼
//!                             FileFrameSource ─► CaptureLoopController
//! ```

mod file_source;

pub use file_source::{
    EncodedImage, FileFrameSource, FramePool, encode_image, list_image_files, load_image,
};

use crate::backends::camera::types::PixelFormat;
use crate::constants::virtual_camera;
use crate::errors::{ScanError, ScanResult};
use std::path::Path;
use tracing::info;

/// Open every image in `dir` as a looping frame source
pub fn open_directory(
    dir: &Path,
    format: PixelFormat,
    fps: Option<u32>,
) -> ScanResult<FileFrameSource> {
    let files = list_image_files(dir)?;
    if files.is_empty() {
        return Err(ScanError::UnsupportedCameraConfiguration(format!(
            "no images found in '{}'",
            dir.display()
        )));
    }

    let fps = fps.unwrap_or(virtual_camera::DEFAULT_FPS);
    info!(
        dir = %dir.display(),
        count = files.len(),
        fps,
        format = ?format,
        "Opening virtual camera"
    );
    FileFrameSource::open(&files, format, fps)
}
