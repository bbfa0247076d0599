// SPDX-License-Identifier: MPL-2.0

//! Integration tests for constants module

use barcode_scanner::constants::{evidence, file_formats, haptics, interval, rotation};
use std::time::Duration;

#[test]
fn test_interval_floor() {
    assert_eq!(interval::MIN_SCAN_INTERVAL, Duration::from_millis(100));
    assert_eq!(interval::DEFAULT_SCAN_INTERVAL, Duration::from_millis(500));
    assert_eq!(
        interval::clamp_scan_interval(Duration::ZERO),
        interval::DEFAULT_SCAN_INTERVAL
    );
}

#[test]
fn test_haptic_pulse_length() {
    assert_eq!(haptics::PULSE_DURATION, Duration::from_millis(200));
}

#[test]
fn test_rotation_tables() {
    // Portrait display on a landscape sensor needs a quarter turn
    assert_eq!(rotation::AUTO_ROTATE_CORRECTION[0], 90);
    assert_eq!(rotation::AUTO_ROTATE_CORRECTION, [90, 0, 270, 180]);
    assert_eq!(rotation::LOCKED_CORRECTION, 90);

    for degrees in rotation::AUTO_ROTATE_CORRECTION {
        assert_eq!(degrees % 90, 0, "Correction {} is not a quarter turn", degrees);
    }
}

#[test]
fn test_evidence_quality_in_range() {
    assert!(evidence::JPEG_QUALITY > 0 && evidence::JPEG_QUALITY <= 100);
}

#[test]
fn test_image_extensions() {
    assert!(file_formats::is_image_extension("png"));
    assert!(file_formats::is_image_extension("JPG"));
    assert!(!file_formats::is_image_extension("mp4"));
}
