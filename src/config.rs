// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{detection, interval};
use crate::errors::{ScanError, ScanResult};
use crate::frame_processor::{AnalyzerOptions, BarcodeFormats};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory name under the user's config dir
pub const APP_DIR: &str = "barcode-scanner";

/// Config file name inside [`APP_DIR`]
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum time between analyzed frames
    pub scan_interval_ms: u64,
    /// Pulse the haptic device when a barcode is delivered
    pub vibration_on_detected: bool,
    /// Attach a JPEG of the frame to every detection event
    pub return_barcode_image: bool,
    /// Symbologies to look for (e.g. "QR_CODE", "EAN_13", or "ALL")
    pub formats: Vec<String>,
    /// Abandon a detection call after this long (waits forever when unset)
    pub detection_timeout_ms: Option<u64>,
    /// Follow the device auto-rotate setting for evidence images
    pub auto_rotate: bool,
    /// Frames larger than this are downscaled before detection
    pub max_detection_dimension: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_interval_ms: interval::DEFAULT_SCAN_INTERVAL.as_millis() as u64,
            vibration_on_detected: true,
            return_barcode_image: false,
            formats: vec!["ALL".to_string()],
            detection_timeout_ms: None,
            auto_rotate: true,
            max_detection_dimension: detection::DEFAULT_MAX_DIMENSION,
        }
    }
}

impl Config {
    /// Default location, `None` when the platform has no config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location
    pub fn load() -> ScanResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No config directory available, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> ScanResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            ScanError::Config(format!("malformed config '{}': {}", path.display(), e))
        })?;
        config.format_mask()?;

        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> ScanResult<PathBuf> {
        let path = Self::default_path()
            .ok_or_else(|| ScanError::Config("no config directory on this platform".into()))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> ScanResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Symbology mask selected by `formats`
    ///
    /// An empty list selects every format.
    pub fn format_mask(&self) -> ScanResult<BarcodeFormats> {
        let joined = self.formats.join(",");
        let mask = BarcodeFormats::parse_list(&joined)
            .ok_or_else(|| ScanError::Config(format!("unknown barcode format in '{}'", joined)))?;

        if mask.is_empty() {
            Ok(BarcodeFormats::all())
        } else {
            Ok(mask)
        }
    }

    pub fn to_analyzer_options(&self) -> AnalyzerOptions {
        AnalyzerOptions {
            scan_interval: Duration::from_millis(self.scan_interval_ms),
            vibration_on_detected: self.vibration_on_detected,
            return_barcode_image: self.return_barcode_image,
            detection_timeout: self.detection_timeout_ms.map(Duration::from_millis),
        }
    }
}
