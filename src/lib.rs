// SPDX-License-Identifier: MPL-2.0

//! Barcode Scanner - real-time barcode analysis for live camera frames
//!
//! Frames arrive from a camera at its own rate. The analyzer samples them
//! at a configured interval, runs at most one detection at a time, turns
//! whatever the detector reports into canonical [`DetectionResult`]s and
//! delivers each non-empty batch to a single consumer.
//!
//! # Architecture
//!
//! - [`backends`]: camera frame types, the capture loop and a file-backed camera
//! - [`media`]: frame to detector image conversion and evidence JPEGs
//! - [`frame_processor`]: session gating, single-flight detection, dispatch
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let detector = Arc::new(QrDetector::new());
//! let (analyzer, mut delivery) = BarcodeAnalyzer::new(detector, AnalyzerOptions::default())?;
//! delivery.set_handler(|event| println!("{:?}", event.results));
//! tokio::spawn(delivery.run());
//! analyzer.on_frame(frame);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod frame_processor;
pub mod media;

// Re-export commonly used types
pub use backends::camera::{CameraFrame, PixelFormat};
pub use config::Config;
pub use errors::{ScanError, ScanResult};
pub use frame_processor::qr_detector::QrDetector;
pub use frame_processor::{
    AnalyzerOptions, BarcodeAnalyzer, BarcodeFormats, BarcodeType, DetectionCapability,
    DetectionEvent, DetectionResult, scan_still_image,
};
