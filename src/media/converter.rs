// SPDX-License-Identifier: GPL-3.0-only

//! Frame buffer conversion
//!
//! Two independent conversions run on camera frames:
//!
//! - [`to_detector_image`] rewraps the frame planes (sharing the buffer, no
//!   copy) into a [`DetectorImage`] the detection capability reads luma from.
//! - [`to_evidence_image`] produces the JPEG bytes that optionally accompany
//!   a detection event: planes are reordered into one interleaved NV21
//!   buffer, encoded, then rotated by the display correction and re-encoded.

use crate::backends::camera::types::{CameraFrame, FrameData, PixelFormat, SensorRotation, YuvPlanes};
use crate::constants::{evidence, rotation};
use crate::errors::{ScanError, ScanResult};
use image::{GrayImage, RgbImage};
use tracing::{debug, trace};

/// Where the luma of each pixel lives inside a detector image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LumaLayout {
    /// A dedicated 8-bit luma plane (Gray8, NV12, NV21, I420)
    Plane { offset: usize, stride: usize },
    /// Packed 4:2:2, luma byte at `y_index` inside each 2-byte pixel
    PackedYuv { stride: usize, y_index: usize },
    /// Packed RGB(A) data that must be weighted into luma
    Rgb {
        stride: usize,
        bytes_per_pixel: usize,
        red: usize,
        green: usize,
        blue: usize,
    },
}

/// Detector-ready view of a frame
///
/// Shares the frame's pixel buffer; only layout metadata is computed.
#[derive(Debug, Clone)]
pub struct DetectorImage {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Rotation reported by the camera, passed through to the detector
    pub rotation: SensorRotation,
    data: FrameData,
    layout: LumaLayout,
}

impl DetectorImage {
    /// Wrap an already-decoded grayscale image (still image scans)
    pub fn from_gray(image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Gray8,
            rotation: SensorRotation::None,
            data: FrameData::from(image.into_raw()),
            layout: LumaLayout::Plane {
                offset: 0,
                stride: width as usize,
            },
        }
    }

    /// Layout used to read luma
    pub fn layout(&self) -> LumaLayout {
        self.layout
    }

    /// Shared pixel buffer
    pub fn data(&self) -> &FrameData {
        &self.data
    }

    /// Luma value at (x, y) in source pixel coordinates
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let (x, y) = (x as usize, y as usize);
        let sample = |idx: usize| self.data.get(idx).copied().unwrap_or(0);

        match self.layout {
            LumaLayout::Plane { offset, stride } => sample(offset + y * stride + x),
            LumaLayout::PackedYuv { stride, y_index } => sample(y * stride + x * 2 + y_index),
            LumaLayout::Rgb {
                stride,
                bytes_per_pixel,
                red,
                green,
                blue,
            } => {
                let base = y * stride + x * bytes_per_pixel;
                let r = sample(base + red) as u32;
                let g = sample(base + green) as u32;
                let b = sample(base + blue) as u32;
                // BT.601 luma, integer weights summing to 256
                ((77 * r + 150 * g + 29 * b) >> 8) as u8
            }
        }
    }

    /// Copy the luma channel into a tightly packed grayscale image
    pub fn to_luma8(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| image::Luma([self.luma(x, y)]))
    }
}

/// Rewrap a frame for the detection capability
///
/// Fails with `UnsupportedFormat` when the pixel format is not one the
/// detector understands or the plane description does not fit the buffer.
pub fn to_detector_image(frame: &CameraFrame) -> ScanResult<DetectorImage> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ScanError::UnsupportedFormat(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let stride = frame.stride as usize;

    let layout = match frame.format {
        PixelFormat::BayerRGGB => {
            return Err(ScanError::UnsupportedFormat(
                "raw Bayer data requires debayering".into(),
            ));
        }
        PixelFormat::NV12 | PixelFormat::NV21 | PixelFormat::I420 => {
            let planes = frame.yuv_planes.ok_or_else(|| {
                ScanError::UnsupportedFormat(format!("{:?} frame without plane layout", frame.format))
            })?;
            if planes.plane_count() != frame.format.plane_count() {
                return Err(ScanError::UnsupportedFormat(format!(
                    "{:?} expects {} planes, got {}",
                    frame.format,
                    frame.format.plane_count(),
                    planes.plane_count()
                )));
            }
            LumaLayout::Plane {
                offset: planes.y_offset,
                stride,
            }
        }
        PixelFormat::Gray8 => LumaLayout::Plane { offset: 0, stride },
        PixelFormat::YUYV => LumaLayout::PackedYuv { stride, y_index: 0 },
        PixelFormat::UYVY => LumaLayout::PackedYuv { stride, y_index: 1 },
        PixelFormat::RGBA => LumaLayout::Rgb {
            stride,
            bytes_per_pixel: 4,
            red: 0,
            green: 1,
            blue: 2,
        },
        PixelFormat::BGRA => LumaLayout::Rgb {
            stride,
            bytes_per_pixel: 4,
            red: 2,
            green: 1,
            blue: 0,
        },
        PixelFormat::RGB24 => LumaLayout::Rgb {
            stride,
            bytes_per_pixel: 3,
            red: 0,
            green: 1,
            blue: 2,
        },
    };

    // Last byte of the luma region must be inside the buffer
    let (offset, row_bytes) = match layout {
        LumaLayout::Plane { offset, .. } => (offset, width),
        LumaLayout::PackedYuv { .. } => (0, width * 2),
        LumaLayout::Rgb {
            bytes_per_pixel, ..
        } => (0, width * bytes_per_pixel),
    };
    if stride < row_bytes || offset + stride * (height - 1) + row_bytes > frame.data.len() {
        return Err(ScanError::UnsupportedFormat(format!(
            "{:?} {}x{} stride {} does not fit {} bytes",
            frame.format,
            frame.width,
            frame.height,
            frame.stride,
            frame.data.len()
        )));
    }

    trace!(
        width = frame.width,
        height = frame.height,
        format = ?frame.format,
        rotation = %frame.rotation,
        "Wrapped frame for detection"
    );

    Ok(DetectorImage {
        width: frame.width,
        height: frame.height,
        format: frame.format,
        rotation: frame.rotation,
        data: frame.data.clone(),
        layout,
    })
}

/// Display rotation reported by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    /// Bucket index into the rotation tables
    pub fn index(&self) -> usize {
        match self {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 1,
            DisplayRotation::Rotation180 => 2,
            DisplayRotation::Rotation270 => 3,
        }
    }

    /// Parse from degrees; anything off the quarter turns is rejected
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(DisplayRotation::Rotation0),
            90 => Some(DisplayRotation::Rotation90),
            180 => Some(DisplayRotation::Rotation180),
            270 => Some(DisplayRotation::Rotation270),
            _ => None,
        }
    }
}

/// Rotation (degrees clockwise) applied to evidence images
pub fn correction_degrees(auto_rotate_enabled: bool, display_rotation: DisplayRotation) -> u32 {
    if auto_rotate_enabled {
        rotation::AUTO_ROTATE_CORRECTION[display_rotation.index()]
    } else {
        rotation::LOCKED_CORRECTION
    }
}

/// Produce the JPEG evidence image for a frame
///
/// Fails with `Encoding` when the planes are inconsistent with the frame
/// dimensions or the encoder rejects the data.
pub fn to_evidence_image(frame: &CameraFrame, correction_degrees: u32) -> ScanResult<Vec<u8>> {
    let rgb = match frame.format {
        PixelFormat::NV12 | PixelFormat::NV21 | PixelFormat::I420 => {
            let nv21 = interleave_nv21(frame)?;
            nv21_to_rgb(&nv21, frame.width, frame.height)
        }
        _ => packed_to_rgb(frame)?,
    };

    let encoded = encode_jpeg(&rgb)?;
    let rotated = rotate_encoded(&encoded, correction_degrees)?;

    debug!(
        width = frame.width,
        height = frame.height,
        correction_degrees,
        size = rotated.len(),
        "Evidence image encoded"
    );

    Ok(rotated)
}

/// Reorder planar/semi-planar YUV into one NV21 buffer (Y plane, then VU pairs)
pub fn interleave_nv21(frame: &CameraFrame) -> ScanResult<Vec<u8>> {
    let planes = frame.yuv_planes.ok_or_else(|| {
        ScanError::Encoding(format!("{:?} frame without plane layout", frame.format))
    })?;
    check_planes(frame, &planes)?;

    let width = frame.width as usize;
    let height = frame.height as usize;
    let stride = frame.stride as usize;
    let uv_width = planes.uv_width as usize;
    let uv_height = planes.uv_height as usize;
    let data: &[u8] = &frame.data;

    let mut out = Vec::with_capacity(width * height + uv_width * uv_height * 2);

    for row in 0..height {
        let start = planes.y_offset + row * stride;
        out.extend_from_slice(&data[start..start + width]);
    }

    let uv_stride = planes.uv_stride as usize;
    for row in 0..uv_height {
        match frame.format {
            PixelFormat::NV21 => {
                let start = planes.uv_offset + row * uv_stride;
                out.extend_from_slice(&data[start..start + uv_width * 2]);
            }
            PixelFormat::NV12 => {
                let start = planes.uv_offset + row * uv_stride;
                for pair in data[start..start + uv_width * 2].chunks_exact(2) {
                    out.push(pair[1]);
                    out.push(pair[0]);
                }
            }
            _ => {
                let u_start = planes.uv_offset + row * uv_stride;
                let v_start = planes.v_offset + row * planes.v_stride as usize;
                for col in 0..uv_width {
                    out.push(data[v_start + col]);
                    out.push(data[u_start + col]);
                }
            }
        }
    }

    Ok(out)
}

/// Plane sizes must match what the frame dimensions imply
fn check_planes(frame: &CameraFrame, planes: &YuvPlanes) -> ScanResult<()> {
    let width = frame.width as usize;
    let height = frame.height as usize;
    let expected_uv_width = frame.width.div_ceil(2);
    let expected_uv_height = frame.height.div_ceil(2);

    let inconsistent = |what: &str| {
        Err(ScanError::Encoding(format!(
            "{} inconsistent with {}x{} {:?}",
            what, frame.width, frame.height, frame.format
        )))
    };

    if width == 0 || height == 0 {
        return inconsistent("empty frame");
    }
    if (frame.stride as usize) < width || planes.y_size < frame.stride as usize * (height - 1) + width {
        return inconsistent("luma plane");
    }
    if planes.uv_width != expected_uv_width || planes.uv_height != expected_uv_height {
        return inconsistent("chroma dimensions");
    }

    let chroma_row = match frame.format {
        PixelFormat::I420 => planes.uv_width as usize,
        _ => planes.uv_width as usize * 2,
    };
    let chroma_needed = planes.uv_stride as usize * (planes.uv_height as usize - 1) + chroma_row;
    if (planes.uv_stride as usize) < chroma_row || planes.uv_size < chroma_needed {
        return inconsistent("chroma plane");
    }
    if frame.format == PixelFormat::I420 {
        let v_needed = planes.v_stride as usize * (planes.uv_height as usize - 1) + chroma_row;
        if (planes.v_stride as usize) < chroma_row || planes.v_size < v_needed {
            return inconsistent("V plane");
        }
    }
    if planes.total_len() > frame.data.len() {
        return inconsistent("plane layout");
    }

    Ok(())
}

/// BT.601 YUV to RGB for one pixel
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    [
        (y + 1.402 * v).clamp(0.0, 255.0) as u8,
        (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
        (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
}

/// Convert a tightly packed NV21 buffer to RGB
fn nv21_to_rgb(nv21: &[u8], width: u32, height: u32) -> RgbImage {
    let w = width as usize;
    let uv_width = width.div_ceil(2) as usize;
    let chroma = &nv21[w * height as usize..];

    RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let luma = nv21[y * w + x];
        let idx = ((y / 2) * uv_width + x / 2) * 2;
        image::Rgb(yuv_to_rgb(luma, chroma[idx + 1], chroma[idx]))
    })
}

/// Convert single-plane frames (RGB, gray, packed 4:2:2) to RGB
fn packed_to_rgb(frame: &CameraFrame) -> ScanResult<RgbImage> {
    let bpp = frame.format.packed_bytes_per_pixel().ok_or_else(|| {
        ScanError::Encoding(format!("{:?} is not a packed format", frame.format))
    })?;
    if frame.format == PixelFormat::BayerRGGB {
        return Err(ScanError::Encoding("raw Bayer data requires debayering".into()));
    }

    let width = frame.width as usize;
    let height = frame.height as usize;
    let stride = frame.stride as usize;
    if width == 0 || height == 0 || stride < width * bpp || stride * (height - 1) + width * bpp > frame.data.len()
    {
        return Err(ScanError::Encoding(format!(
            "{:?} buffer of {} bytes inconsistent with {}x{}",
            frame.format,
            frame.data.len(),
            frame.width,
            frame.height
        )));
    }

    let data: &[u8] = &frame.data;
    let format = frame.format;
    Ok(RgbImage::from_fn(frame.width, frame.height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let px = y * stride + x * bpp;
        let rgb = match format {
            PixelFormat::RGBA | PixelFormat::RGB24 => [data[px], data[px + 1], data[px + 2]],
            PixelFormat::BGRA => [data[px + 2], data[px + 1], data[px]],
            PixelFormat::Gray8 => [data[px]; 3],
            PixelFormat::YUYV | PixelFormat::UYVY => {
                // Chroma is shared by the even/odd pixel pair
                let pair = y * stride + (x & !1) * 2;
                let (y0, u, y1, v) = if format == PixelFormat::YUYV {
                    (data[pair], data[pair + 1], data[pair + 2], data[pair + 3])
                } else {
                    (data[pair + 1], data[pair], data[pair + 3], data[pair + 2])
                };
                yuv_to_rgb(if x % 2 == 0 { y0 } else { y1 }, u, v)
            }
            _ => [0, 0, 0],
        };
        image::Rgb(rgb)
    }))
}

/// Encode RGB data as JPEG at the fixed evidence quality
fn encode_jpeg(image: &RgbImage) -> ScanResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder =
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, evidence::JPEG_QUALITY);

    encoder
        .encode(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| ScanError::Encoding(format!("JPEG encoding failed: {}", e)))?;

    Ok(buffer)
}

/// Rotate an encoded JPEG by a quarter-turn multiple and re-encode it
fn rotate_encoded(encoded: &[u8], degrees: u32) -> ScanResult<Vec<u8>> {
    if degrees % 360 == 0 {
        return Ok(encoded.to_vec());
    }

    let decoded = image::load_from_memory_with_format(encoded, image::ImageFormat::Jpeg)
        .map_err(|e| ScanError::Encoding(format!("JPEG decode for rotation failed: {}", e)))?
        .to_rgb8();

    let rotated = match degrees % 360 {
        90 => image::imageops::rotate90(&decoded),
        180 => image::imageops::rotate180(&decoded),
        270 => image::imageops::rotate270(&decoded),
        other => {
            return Err(ScanError::Encoding(format!(
                "rotation of {} degrees is not a quarter turn",
                other
            )));
        }
    };

    encode_jpeg(&rotated)
}
