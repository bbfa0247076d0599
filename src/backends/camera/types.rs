// SPDX-License-Identifier: GPL-3.0-only
// Shared types for camera frame delivery

//! Shared types for camera frames
//!
//! A [`CameraFrame`] is a handle to pixel data owned by the camera layer.
//! The analyzer only borrows it for one analysis attempt; the handle carries
//! a release hook that must fire exactly once on every exit path.

use crate::errors::ScanError;
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

/// Frame pixel storage
///
/// Reference counted so the detector image can share the planes with the
/// frame instead of copying them.
#[derive(Clone)]
pub struct FrameData(Arc<[u8]>);

impl FrameData {
    /// Get the length of the frame data in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the frame data is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two handles point at the same allocation
    pub fn ptr_eq(&self, other: &FrameData) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Vec<u8>> for FrameData {
    fn from(data: Vec<u8>) -> Self {
        FrameData(Arc::from(data))
    }
}

impl From<Arc<[u8]>> for FrameData {
    fn from(data: Arc<[u8]>) -> Self {
        FrameData(data)
    }
}

impl std::fmt::Debug for FrameData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FrameData({} bytes)", self.0.len())
    }
}

impl std::ops::Deref for FrameData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Sensor rotation in degrees (clockwise) at capture time
///
/// Camera sensors may be physically mounted at various angles relative to
/// the device, so the camera layer reports how the buffer must be rotated
/// to appear upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensorRotation {
    /// No rotation (sensor is oriented correctly)
    #[default]
    None,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl SensorRotation {
    /// Get the rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            SensorRotation::None => 0,
            SensorRotation::Rotate90 => 90,
            SensorRotation::Rotate180 => 180,
            SensorRotation::Rotate270 => 270,
        }
    }
}

impl std::fmt::Display for SensorRotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Pixel format of a camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// RGBA - 32-bit with alpha (4 bytes per pixel)
    RGBA,
    /// BGRA - 32-bit with alpha (B G R A byte order)
    BGRA,
    /// RGB24 - 24-bit RGB (3 bytes per pixel, no alpha)
    RGB24,
    /// Gray8 - 8-bit grayscale (single channel)
    Gray8,
    /// NV12 - Semi-planar 4:2:0 (Y plane + interleaved UV plane)
    NV12,
    /// NV21 - Semi-planar 4:2:0 (Y plane + interleaved VU plane)
    NV21,
    /// I420 - Planar 4:2:0 (separate Y, U, V planes)
    I420,
    /// YUYV - Packed 4:2:2 (Y0 U Y1 V interleaved)
    YUYV,
    /// UYVY - Packed 4:2:2 (U Y0 V Y1 interleaved)
    UYVY,
    /// RGGB Bayer pattern - raw sensor data the detector cannot use
    BayerRGGB,
}

impl PixelFormat {
    /// Number of planes the buffer is expected to describe
    pub fn plane_count(&self) -> usize {
        match self {
            Self::NV12 | Self::NV21 => 2,
            Self::I420 => 3,
            _ => 1,
        }
    }

    /// Bytes per pixel for single-plane formats
    pub fn packed_bytes_per_pixel(&self) -> Option<usize> {
        match self {
            Self::RGBA | Self::BGRA => Some(4),
            Self::RGB24 => Some(3),
            Self::YUYV | Self::UYVY => Some(2),
            Self::Gray8 | Self::BayerRGGB => Some(1),
            Self::NV12 | Self::NV21 | Self::I420 => None,
        }
    }

    /// Parse format from a FourCC-style name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "RGBA" | "RGBX" => Some(Self::RGBA),
            "BGRA" | "BGRX" => Some(Self::BGRA),
            "RGB" | "RGB24" => Some(Self::RGB24),
            "GRAY8" | "GREY" | "Y8" => Some(Self::Gray8),
            "NV12" => Some(Self::NV12),
            "NV21" => Some(Self::NV21),
            "I420" | "YU12" => Some(Self::I420),
            "YUYV" | "YUY2" => Some(Self::YUYV),
            "UYVY" => Some(Self::UYVY),
            "RGGB" => Some(Self::BayerRGGB),
            _ => None,
        }
    }
}

/// Plane offsets for multi-plane formats (NV12, NV21, I420)
///
/// The planes are stored at different offsets within one contiguous buffer.
/// - NV12/NV21: Y plane + one interleaved chroma plane at half resolution
/// - I420: Y plane + U plane + V plane, chroma at half resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvPlanes {
    /// Y plane offset in bytes from start of buffer
    pub y_offset: usize,
    /// Y plane size in bytes
    pub y_size: usize,
    /// UV plane offset in bytes (NV12/NV21: interleaved chroma, I420: U plane)
    pub uv_offset: usize,
    /// UV plane size in bytes
    pub uv_size: usize,
    /// UV plane stride in bytes
    pub uv_stride: u32,
    /// V plane offset in bytes (I420 only, 0 otherwise)
    pub v_offset: usize,
    /// V plane size in bytes (I420 only, 0 otherwise)
    pub v_size: usize,
    /// V plane stride in bytes (I420 only)
    pub v_stride: u32,
    /// UV plane width in pixels (derived from subsampling)
    pub uv_width: u32,
    /// UV plane height in pixels (derived from subsampling)
    pub uv_height: u32,
}

impl YuvPlanes {
    /// Tightly packed semi-planar layout (NV12 or NV21)
    pub fn semi_planar(width: u32, height: u32, stride: u32) -> Self {
        let uv_width = width.div_ceil(2);
        let uv_height = height.div_ceil(2);
        let y_size = stride as usize * height as usize;
        let uv_stride = uv_width * 2;
        Self {
            y_offset: 0,
            y_size,
            uv_offset: y_size,
            uv_size: uv_stride as usize * uv_height as usize,
            uv_stride,
            v_offset: 0,
            v_size: 0,
            v_stride: 0,
            uv_width,
            uv_height,
        }
    }

    /// Tightly packed planar layout (I420)
    pub fn planar(width: u32, height: u32, stride: u32) -> Self {
        let uv_width = width.div_ceil(2);
        let uv_height = height.div_ceil(2);
        let y_size = stride as usize * height as usize;
        let chroma_size = uv_width as usize * uv_height as usize;
        Self {
            y_offset: 0,
            y_size,
            uv_offset: y_size,
            uv_size: chroma_size,
            uv_stride: uv_width,
            v_offset: y_size + chroma_size,
            v_size: chroma_size,
            v_stride: uv_width,
            uv_width,
            uv_height,
        }
    }

    /// Number of planes this layout describes
    pub fn plane_count(&self) -> usize {
        if self.v_size > 0 { 3 } else { 2 }
    }

    /// End offset of the last plane
    pub fn total_len(&self) -> usize {
        (self.y_offset + self.y_size)
            .max(self.uv_offset + self.uv_size)
            .max(self.v_offset + self.v_size)
    }
}

/// Hook that hands a frame back to the camera layer
pub type ReleaseHook = Box<dyn FnOnce() -> Result<(), String> + Send>;

/// Release guard for a frame
///
/// The hook is taken on first release, so every later attempt is a no-op.
#[derive(Default)]
pub struct FrameRelease {
    hook: Option<ReleaseHook>,
}

impl FrameRelease {
    /// Wrap a release hook
    pub fn new(hook: ReleaseHook) -> Self {
        Self { hook: Some(hook) }
    }

    /// Run the hook if it has not run yet
    ///
    /// Returns `Ok(true)` when the hook ran, `Ok(false)` for a repeated
    /// release, and the hook's error otherwise.
    pub fn release(&mut self) -> Result<bool, ScanError> {
        match self.hook.take() {
            Some(hook) => hook().map(|_| true).map_err(ScanError::ResourceRelease),
            None => Ok(false),
        }
    }

    /// Whether the hook has already been consumed
    pub fn is_released(&self) -> bool {
        self.hook.is_none()
    }
}

impl std::fmt::Debug for FrameRelease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRelease")
            .field("released", &self.is_released())
            .finish()
    }
}

/// A single frame from the camera
///
/// For planar YUV formats `data` holds all planes contiguously and
/// `yuv_planes` holds their offsets. Dropping the frame releases it.
#[derive(Debug)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Frame data: packed pixels, or all planes of a planar format
    pub data: FrameData,
    /// Pixel format of the data
    pub format: PixelFormat,
    /// Row stride for the main (or luma) plane in bytes
    pub stride: u32,
    /// Additional planes (for NV12/NV21/I420 formats)
    pub yuv_planes: Option<YuvPlanes>,
    /// Rotation reported by the camera for this buffer
    pub rotation: SensorRotation,
    /// Monotonic sequence number assigned by the camera layer
    pub sequence: u64,
    /// When the camera layer produced the frame, used for latency logs
    pub captured_at: Instant,
    release: FrameRelease,
}

impl CameraFrame {
    /// Create a frame without a release hook
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        stride: u32,
        data: impl Into<FrameData>,
    ) -> Self {
        Self {
            width,
            height,
            data: data.into(),
            format,
            stride,
            yuv_planes: None,
            rotation: SensorRotation::None,
            sequence: 0,
            captured_at: Instant::now(),
            release: FrameRelease::default(),
        }
    }

    pub fn with_planes(mut self, planes: YuvPlanes) -> Self {
        self.yuv_planes = Some(planes);
        self
    }

    pub fn with_rotation(mut self, rotation: SensorRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Attach the hook the camera layer uses to reclaim this buffer
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() -> Result<(), String> + Send + 'static,
    {
        self.release = FrameRelease::new(Box::new(hook));
        self
    }

    /// Hand the frame back to the camera layer
    ///
    /// Safe to call more than once; only the first call reaches the hook.
    /// Release failures are logged and never propagated.
    pub fn release(&mut self) {
        match self.release.release() {
            Ok(_) => {}
            Err(e) => warn!(sequence = self.sequence, error = %e, "Frame release failed"),
        }
    }

    /// Whether the release hook has already run
    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        self.release();
    }
}
