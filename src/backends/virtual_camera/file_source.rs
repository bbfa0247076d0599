// SPDX-License-Identifier: GPL-3.0-only

//! File source for the virtual camera
//!
//! Still images are decoded once and replayed as camera frames at a fixed
//! rate, encoded in whatever pixel format a real sensor would deliver. Each
//! frame shares the decoded buffer and carries a release hook that returns
//! it to a small accounting pool, so leaked or double-released frames show
//! up in the counters.

use crate::backends::camera::frame_loop::FrameSource;
use crate::backends::camera::types::{CameraFrame, FrameData, PixelFormat, YuvPlanes};
use crate::constants::file_formats;
use crate::errors::{ScanError, ScanResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// List supported image files in a directory, sorted by name
pub fn list_image_files(dir: &Path) -> ScanResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(file_formats::is_image_extension)
                    .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// A decoded image laid out as one camera buffer
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub stride: u32,
    pub planes: Option<YuvPlanes>,
    pub data: FrameData,
}

/// Load an image file and lay it out in `format`
pub fn load_image(path: &Path, format: PixelFormat) -> ScanResult<EncodedImage> {
    let img = image::open(path).map_err(|e| {
        ScanError::InvalidImage(format!("failed to load '{}': {}", path.display(), e))
    })?;
    let encoded = encode_image(&img.to_rgb8(), format)?;

    info!(
        path = %path.display(),
        width = encoded.width,
        height = encoded.height,
        format = ?format,
        "Image loaded for virtual camera"
    );
    Ok(encoded)
}

/// Lay out RGB pixels the way a sensor delivering `format` would
pub fn encode_image(rgb: &image::RgbImage, format: PixelFormat) -> ScanResult<EncodedImage> {
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(ScanError::InvalidImage("image has no pixels".into()));
    }

    let pixels = || rgb.pixels().map(|p| p.0);
    let (stride, planes, data) = match format {
        PixelFormat::RGBA => (
            width * 4,
            None,
            pixels().flat_map(|[r, g, b]| [r, g, b, 255]).collect(),
        ),
        PixelFormat::BGRA => (
            width * 4,
            None,
            pixels().flat_map(|[r, g, b]| [b, g, r, 255]).collect(),
        ),
        PixelFormat::RGB24 => (width * 3, None, rgb.as_raw().clone()),
        PixelFormat::Gray8 => (width, None, pixels().map(|p| rgb_to_yuv(p).0).collect()),
        PixelFormat::NV12 | PixelFormat::NV21 => {
            let planes = YuvPlanes::semi_planar(width, height, width);
            (width, Some(planes), yuv420(rgb, format, &planes))
        }
        PixelFormat::I420 => {
            let planes = YuvPlanes::planar(width, height, width);
            (width, Some(planes), yuv420(rgb, format, &planes))
        }
        PixelFormat::YUYV | PixelFormat::UYVY | PixelFormat::BayerRGGB => {
            return Err(ScanError::UnsupportedCameraConfiguration(format!(
                "virtual camera cannot produce {:?}",
                format
            )));
        }
    };

    Ok(EncodedImage {
        width,
        height,
        format,
        stride,
        planes,
        data: FrameData::from(data),
    })
}

/// BT.601 full-range RGB to YUV
fn rgb_to_yuv([r, g, b]: [u8; 3]) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = (b - y) * 0.564 + 128.0;
    let v = (r - y) * 0.713 + 128.0;
    (
        y.round().clamp(0.0, 255.0) as u8,
        u.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// Build a 4:2:0 buffer, chroma sampled from the top-left pixel of each block
fn yuv420(rgb: &image::RgbImage, format: PixelFormat, planes: &YuvPlanes) -> Vec<u8> {
    let (width, height) = rgb.dimensions();
    let mut data = vec![0u8; planes.total_len()];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (luma, u, v) = rgb_to_yuv(pixel.0);
        data[planes.y_offset + (y * width + x) as usize] = luma;

        if x % 2 != 0 || y % 2 != 0 {
            continue;
        }
        let (cx, cy) = ((x / 2) as usize, (y / 2) as usize);
        match format {
            PixelFormat::NV12 => {
                let idx = planes.uv_offset + cy * planes.uv_stride as usize + cx * 2;
                data[idx] = u;
                data[idx + 1] = v;
            }
            PixelFormat::NV21 => {
                let idx = planes.uv_offset + cy * planes.uv_stride as usize + cx * 2;
                data[idx] = v;
                data[idx + 1] = u;
            }
            _ => {
                data[planes.uv_offset + cy * planes.uv_stride as usize + cx] = u;
                data[planes.v_offset + cy * planes.v_stride as usize + cx] = v;
            }
        }
    }

    debug!(width, height, format = ?format, "Encoded 4:2:0 frame");
    data
}

/// Frame bookkeeping shared with release hooks
#[derive(Debug, Default)]
pub struct FramePool {
    delivered: AtomicU64,
    released: AtomicU64,
}

impl FramePool {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames handed out and not yet returned
    pub fn outstanding(&self) -> u64 {
        self.delivered().saturating_sub(self.released())
    }
}

/// Replays images as a paced camera feed
pub struct FileFrameSource {
    images: Vec<EncodedImage>,
    format: PixelFormat,
    frame_interval: Duration,
    looping: bool,
    index: usize,
    sequence: u64,
    next_due: Option<Instant>,
    pool: Arc<FramePool>,
}

impl FileFrameSource {
    /// Load every image in `paths` as `format` frames delivered at `fps`
    pub fn open(paths: &[PathBuf], format: PixelFormat, fps: u32) -> ScanResult<Self> {
        if paths.is_empty() {
            return Err(ScanError::UnsupportedCameraConfiguration(
                "no image files to stream".into(),
            ));
        }

        let images = paths
            .iter()
            .map(|path| load_image(path, format))
            .collect::<ScanResult<Vec<_>>>()?;

        Ok(Self::from_images(images, format, fps))
    }

    pub fn from_images(images: Vec<EncodedImage>, format: PixelFormat, fps: u32) -> Self {
        Self {
            images,
            format,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            looping: true,
            index: 0,
            sequence: 0,
            next_due: None,
            pool: Arc::new(FramePool::default()),
        }
    }

    /// Stop after one pass over the images instead of cycling
    pub fn play_once(mut self) -> Self {
        self.looping = false;
        self
    }

    /// Counters for frames delivered and returned
    pub fn pool(&self) -> Arc<FramePool> {
        Arc::clone(&self.pool)
    }
}

impl FrameSource for FileFrameSource {
    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn next_frame(&mut self) -> ScanResult<Option<CameraFrame>> {
        if self.index >= self.images.len() {
            if !self.looping || self.images.is_empty() {
                return Ok(None);
            }
            self.index = 0;
        }

        // Pace delivery like a sensor running at a fixed rate
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(Instant::now() + self.frame_interval);

        let image = &self.images[self.index];
        self.index += 1;
        self.sequence += 1;

        let pool = Arc::clone(&self.pool);
        pool.delivered.fetch_add(1, Ordering::SeqCst);

        let mut frame = CameraFrame::new(
            image.width,
            image.height,
            image.format,
            image.stride,
            image.data.clone(),
        )
        .with_sequence(self.sequence)
        .with_release(move || {
            pool.released.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        if let Some(planes) = image.planes {
            frame = frame.with_planes(planes);
        }

        Ok(Some(frame))
    }
}
