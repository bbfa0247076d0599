// SPDX-License-Identifier: MPL-2.0

//! Error types for the barcode analysis pipeline
//!
//! Per-frame errors (`UnsupportedFormat`, `Encoding`, `DetectionFailure`,
//! `DetectionTimeout`, `ResourceRelease`) are contained inside the analyzer
//! and only ever logged. Configuration-time errors surface to the caller
//! that sets up a session.

use std::fmt;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Main error type for the scanner
#[derive(Debug, Clone, PartialEq)]
pub enum ScanError {
    /// Frame pixel layout not recognized by the converter
    UnsupportedFormat(String),
    /// Evidence image could not be produced
    Encoding(String),
    /// The detection capability reported an error
    DetectionFailure(String),
    /// The detection capability did not answer within the configured timeout
    DetectionTimeout(u64),
    /// Releasing a frame handle failed
    ResourceRelease(String),
    /// Still image bytes could not be decoded
    InvalidImage(String),
    /// Session setup outside of an async runtime
    NoLifecycleOwner,
    /// Camera source cannot deliver frames the pipeline understands
    UnsupportedCameraConfiguration(String),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

impl ScanError {
    /// Whether this error belongs to a single frame and must never stop the stream
    pub fn is_per_frame(&self) -> bool {
        matches!(
            self,
            ScanError::UnsupportedFormat(_)
                | ScanError::Encoding(_)
                | ScanError::DetectionFailure(_)
                | ScanError::DetectionTimeout(_)
                | ScanError::ResourceRelease(_)
        )
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::UnsupportedFormat(msg) => write!(f, "Unsupported frame format: {}", msg),
            ScanError::Encoding(msg) => write!(f, "Encoding failed: {}", msg),
            ScanError::DetectionFailure(cause) => write!(f, "Detection failed: {}", cause),
            ScanError::DetectionTimeout(ms) => write!(f, "Detection timed out after {} ms", ms),
            ScanError::ResourceRelease(msg) => write!(f, "Failed to release frame: {}", msg),
            ScanError::InvalidImage(msg) => write!(f, "Invalid image: {}", msg),
            ScanError::NoLifecycleOwner => {
                write!(f, "No lifecycle owner: analyzer must be created inside a tokio runtime")
            }
            ScanError::UnsupportedCameraConfiguration(msg) => {
                write!(f, "Unsupported camera configuration: {}", msg)
            }
            ScanError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ScanError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ScanError {}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Decoding(e) => ScanError::InvalidImage(e.to_string()),
            image::ImageError::Unsupported(e) => ScanError::InvalidImage(e.to_string()),
            other => ScanError::Encoding(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_frame_classification() {
        assert!(ScanError::UnsupportedFormat("bayer".into()).is_per_frame());
        assert!(ScanError::DetectionTimeout(100).is_per_frame());
        assert!(!ScanError::NoLifecycleOwner.is_per_frame());
        assert!(!ScanError::Config("bad".into()).is_per_frame());
    }

    #[test]
    fn test_display_includes_cause() {
        let err = ScanError::DetectionFailure("model not loaded".into());
        assert_eq!(err.to_string(), "Detection failed: model not loaded");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ScanError::from(io), ScanError::Io(_)));
    }
}
