// SPDX-License-Identifier: MPL-2.0

//! Symbology vocabularies
//!
//! Detection capabilities identify formats and content kinds with their own
//! integer codes. Two fixed tables translate between those codes and the
//! canonical [`BarcodeFormats`] / [`BarcodeType`] values. Anything missing
//! from a table is unmapped: formats become the empty set, value types
//! become [`BarcodeType::Unknown`].
//!
//! The process-wide supported-format mask also lives here. Detectors read it
//! once when they are constructed.

use super::types::{BarcodeFormats, BarcodeType};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

/// Capability code meaning "every format the capability knows"
pub const CAPABILITY_ALL_FORMATS: u32 = 0;

/// Canonical format and its capability code
pub const FORMAT_TABLE: &[(BarcodeFormats, u32)] = &[
    (BarcodeFormats::CODE_128, 1),
    (BarcodeFormats::CODE_39, 2),
    (BarcodeFormats::CODE_93, 4),
    (BarcodeFormats::CODABAR, 8),
    (BarcodeFormats::DATA_MATRIX, 16),
    (BarcodeFormats::EAN_13, 32),
    (BarcodeFormats::EAN_8, 64),
    (BarcodeFormats::ITF, 128),
    (BarcodeFormats::QR_CODE, 256),
    (BarcodeFormats::UPC_A, 512),
    (BarcodeFormats::UPC_E, 1024),
    (BarcodeFormats::PDF_417, 2048),
    (BarcodeFormats::AZTEC, 4096),
];

/// Canonical content kind and its capability code
pub const VALUE_TYPE_TABLE: &[(BarcodeType, u32)] = &[
    (BarcodeType::Unknown, 0),
    (BarcodeType::ContactInfo, 1),
    (BarcodeType::Email, 2),
    (BarcodeType::Isbn, 3),
    (BarcodeType::Phone, 4),
    (BarcodeType::Product, 5),
    (BarcodeType::Sms, 6),
    (BarcodeType::Text, 7),
    (BarcodeType::Url, 8),
    (BarcodeType::WiFi, 9),
    (BarcodeType::GeographicCoordinates, 10),
    (BarcodeType::CalendarEvent, 11),
    (BarcodeType::DriversLicense, 12),
];

/// Canonical format for a capability format code
pub fn format_from_capability(code: u32) -> BarcodeFormats {
    FORMAT_TABLE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(format, _)| *format)
        .unwrap_or_else(BarcodeFormats::empty)
}

/// Capability code for a single canonical format
pub fn format_to_capability(format: BarcodeFormats) -> Option<u32> {
    FORMAT_TABLE
        .iter()
        .find(|(f, _)| *f == format)
        .map(|(_, code)| *code)
}

/// Canonical content kind for a capability value type code
pub fn value_type_from_capability(code: u32) -> BarcodeType {
    VALUE_TYPE_TABLE
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(kind, _)| *kind)
        .unwrap_or(BarcodeType::Unknown)
}

/// Capability code for a canonical content kind
pub fn value_type_to_capability(kind: BarcodeType) -> u32 {
    VALUE_TYPE_TABLE
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, code)| *code)
        .unwrap_or(0)
}

/// Translate a canonical mask into the capability's format bitmask
///
/// An empty mask selects every format. Canonical formats with no
/// capability code are skipped; `None` means nothing in a non-empty mask
/// has a code, so the capability has nothing to look for.
pub fn mask_to_capability(mask: BarcodeFormats) -> Option<u32> {
    if mask.is_empty() {
        return Some(CAPABILITY_ALL_FORMATS);
    }

    let bits = FORMAT_TABLE
        .iter()
        .filter(|(format, _)| mask.contains(*format))
        .fold(0, |acc, (_, code)| acc | code);

    // 0 is the "all formats" code and must not stand in for "none"
    if bits == 0 { None } else { Some(bits) }
}

/// Translate a capability format bitmask back into canonical formats
pub fn mask_from_capability(bits: u32) -> BarcodeFormats {
    FORMAT_TABLE
        .iter()
        .filter(|(_, code)| bits == CAPABILITY_ALL_FORMATS || bits & code != 0)
        .fold(BarcodeFormats::empty(), |acc, (format, _)| acc | *format)
}

/// Process-wide format selection, empty meaning "all"
static SUPPORTED_FORMATS: AtomicU32 = AtomicU32::new(0);

/// Select the symbologies detectors constructed from now on look for
///
/// Detectors that already exist keep the mask they were built with.
pub fn set_supported_formats(mask: BarcodeFormats) {
    debug!(formats = %mask, "Supported barcode formats changed");
    SUPPORTED_FORMATS.store(mask.bits(), Ordering::SeqCst);
}

/// Current process-wide format selection
pub fn supported_formats() -> BarcodeFormats {
    let mask = BarcodeFormats::from_bits_truncate(SUPPORTED_FORMATS.load(Ordering::SeqCst));
    if mask.is_empty() {
        BarcodeFormats::all()
    } else {
        mask
    }
}
