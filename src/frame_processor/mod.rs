// SPDX-License-Identifier: MPL-2.0

//! Frame processor module for barcode analysis
//!
//! This module samples camera frames at an interval and runs barcode
//! detection on them, one call at a time, delivering results to a single
//! consumer on its own context.
//!
//! Leaf-first:
//!
//! - [`throttle`]: session state and the throttle gate
//! - [`single_flight`]: detection capability trait and the single-flight invoker
//! - [`symbology`] and [`normalize`]: capability vocabulary to canonical results
//! - [`dispatch`]: event delivery, haptics
//! - [`analyzer`]: the per-frame pipeline
//! - [`still_image`]: one-shot scans of encoded images

pub mod analyzer;
pub mod dispatch;
pub mod normalize;
pub mod single_flight;
pub mod still_image;
pub mod symbology;
pub mod tasks;
pub mod throttle;
pub mod types;

pub use analyzer::{AnalyzerOptions, BarcodeAnalyzer, FixedOrientation, FrameOutcome, OrientationSource};
pub use dispatch::{DeliveryContext, DispatchSink, Haptics};
pub use single_flight::{DetectionCapability, DetectionCompletion, RawBarcode, SingleFlightInvoker};
pub use still_image::scan_still_image;
pub use symbology::{set_supported_formats, supported_formats};
pub use tasks::qr_detector;
pub use throttle::ScanningSession;
pub use types::{BarcodeFormats, BarcodeType, CornerPoint, DetectionEvent, DetectionResult};
