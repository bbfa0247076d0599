// SPDX-License-Identifier: MPL-2.0

//! Media processing utilities
//!
//! Camera frames arrive in a handful of layouts (semi-planar and planar
//! YUV 4:2:0, packed 4:2:2, RGB). The [`converter`] module turns them into
//! the two shapes the scanner needs:
//!
//! - a detector image that reads luma straight out of the frame buffer
//! - an upright JPEG evidence image for detection events

pub mod converter;

pub use converter::{
    DetectorImage, DisplayRotation, LumaLayout, correction_degrees, to_detector_image,
    to_evidence_image,
};
