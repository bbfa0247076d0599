// SPDX-License-Identifier: GPL-3.0-only

//! Detection capability implementations
//!
//! Each task implements [`DetectionCapability`](super::single_flight::DetectionCapability)
//! for one family of symbologies.

pub mod qr_detector;

pub use qr_detector::QrDetector;
