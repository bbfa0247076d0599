// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Scan interval constants
pub mod interval {
    use super::Duration;

    /// Intervals below this are considered a misconfiguration
    pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(100);

    /// Default interval, also used when the configured one is below the floor
    pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

    /// Apply the interval floor: values under 100ms become 500ms
    pub fn clamp_scan_interval(requested: Duration) -> Duration {
        if requested < MIN_SCAN_INTERVAL {
            DEFAULT_SCAN_INTERVAL
        } else {
            requested
        }
    }
}

/// Haptic feedback constants
pub mod haptics {
    use super::Duration;

    /// Length of the pulse fired when a detection event is emitted
    pub const PULSE_DURATION: Duration = Duration::from_millis(200);
}

/// Evidence image constants
pub mod evidence {
    /// JPEG quality used for both the initial and the rotated encode
    pub const JPEG_QUALITY: u8 = 90;
}

/// Detection constants
pub mod detection {
    /// Frames larger than this are downscaled before QR detection
    pub const DEFAULT_MAX_DIMENSION: u32 = 640;
}

/// Rotation correction applied to evidence images
pub mod rotation {
    /// Correction (degrees clockwise) indexed by display rotation bucket
    /// (0, 90, 180, 270) when the device follows auto-rotate.
    ///
    /// Camera sensors on handheld devices are mounted landscape, so the
    /// natural portrait display needs a quarter turn.
    pub const AUTO_ROTATE_CORRECTION: [u32; 4] = [90, 0, 270, 180];

    /// Correction when auto-rotate is locked: the UI stays portrait
    pub const LOCKED_CORRECTION: u32 = 90;
}

/// Virtual camera timing constants
pub mod virtual_camera {
    use super::Duration;

    /// Default frame rate for the file-backed camera
    pub const DEFAULT_FPS: u32 = 15;

    /// How often `watch` checks for Ctrl+C while frames stream
    pub const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(50);
}

/// Supported file formats for still image scans and the virtual camera
pub mod file_formats {
    /// Supported image file extensions
    pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

    /// Check if a file extension is a supported image format
    pub fn is_image_extension(ext: &str) -> bool {
        IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }
}
