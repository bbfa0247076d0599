// SPDX-License-Identifier: MPL-2.0

//! Core types for frame processing results
//!
//! These are the canonical result model: whatever vocabulary the detection
//! capability speaks is mapped into these types before anything leaves the
//! pipeline.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Symbology selection
    ///
    /// A single flag names the format of one result; a combination selects
    /// the symbologies a detector should look for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct BarcodeFormats: u32 {
        const CODE_128 = 1 << 1;
        const CODE_39 = 1 << 2;
        const CODE_93 = 1 << 3;
        const CODABAR = 1 << 4;
        const DATA_MATRIX = 1 << 5;
        const EAN_13 = 1 << 6;
        const EAN_8 = 1 << 7;
        const ITF = 1 << 8;
        const QR_CODE = 1 << 9;
        const UPC_A = 1 << 10;
        const UPC_E = 1 << 11;
        const PDF_417 = 1 << 12;
        const AZTEC = 1 << 13;
        const MICRO_QR = 1 << 14;
        const MICRO_PDF_417 = 1 << 15;
        const INTERLEAVED_2_OF_5 = 1 << 16;
        const GS1_DATABAR = 1 << 17;
    }
}

impl BarcodeFormats {
    /// Name of a single-format value, `None` for combinations
    pub fn name(&self) -> Option<&'static str> {
        let mut names = self.iter_names();
        match (names.next(), names.next()) {
            (Some((name, _)), None) => Some(name),
            _ => None,
        }
    }

    /// Parse a comma separated list of format names, case-insensitive
    ///
    /// `ALL` selects every format.
    pub fn parse_list(list: &str) -> Option<Self> {
        let mut formats = Self::empty();
        for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let upper = name.to_ascii_uppercase().replace('-', "_");
            if upper == "ALL" {
                formats |= Self::all();
                continue;
            }
            formats |= Self::from_name(&upper)?;
        }
        Some(formats)
    }
}

impl fmt::Display for BarcodeFormats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Kind of content encoded in a barcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarcodeType {
    CalendarEvent,
    ContactInfo,
    DriversLicense,
    Email,
    GeographicCoordinates,
    Isbn,
    Phone,
    Product,
    Sms,
    Text,
    Url,
    WiFi,
    Unknown,
}

impl BarcodeType {
    /// Infer the content kind from the decoded text
    ///
    /// Used by capabilities that only report decoded text. Falls back to
    /// `Text` for anything unrecognized and `Unknown` for empty content.
    pub fn infer(content: &str) -> Self {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Self::Unknown;
        }

        // WIFI:S:<ssid>;T:<security>;P:<password>;;
        if starts_with_ignore_case(trimmed, "WIFI:") {
            return Self::WiFi;
        }

        if starts_with_ignore_case(trimmed, "http://") || starts_with_ignore_case(trimmed, "https://")
        {
            return Self::Url;
        }

        if starts_with_ignore_case(trimmed, "tel:") {
            return Self::Phone;
        }

        if starts_with_ignore_case(trimmed, "mailto:") || starts_with_ignore_case(trimmed, "MATMSG:")
        {
            return Self::Email;
        }

        if starts_with_ignore_case(trimmed, "sms:") || starts_with_ignore_case(trimmed, "smsto:") {
            return Self::Sms;
        }

        if let Some(rest) = strip_prefix_ignore_case(trimmed, "geo:") {
            if is_geo_coordinates(rest) {
                return Self::GeographicCoordinates;
            }
        }

        if trimmed.starts_with("BEGIN:VCARD") || trimmed.starts_with("MECARD:") {
            return Self::ContactInfo;
        }

        if trimmed.starts_with("BEGIN:VCALENDAR") || trimmed.starts_with("BEGIN:VEVENT") {
            return Self::CalendarEvent;
        }

        // AAMVA driver license header: "@", line feed, record separator, carriage return, "ANSI "
        if trimmed.starts_with('@') && trimmed.contains("ANSI ") {
            return Self::DriversLicense;
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if trimmed.len() == 13 && (trimmed.starts_with("978") || trimmed.starts_with("979")) {
                return Self::Isbn;
            }
            if matches!(trimmed.len(), 8 | 12 | 13) {
                return Self::Product;
            }
        }

        // Bare domain names
        if trimmed.contains('.')
            && !trimmed.contains(' ')
            && trimmed.len() < 256
            && (trimmed.starts_with("www.")
                || trimmed.ends_with(".com")
                || trimmed.ends_with(".org")
                || trimmed.ends_with(".net")
                || trimmed.ends_with(".io"))
        {
            return Self::Url;
        }

        Self::Text
    }
}

impl fmt::Display for BarcodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    strip_prefix_ignore_case(s, prefix).is_some()
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// `lat,lon[,alt][?params]`
fn is_geo_coordinates(content: &str) -> bool {
    let coords = content.split_once('?').map_or(content, |(c, _)| c);
    let mut parts = coords.split(',');
    let lat = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
    let lon = parts.next().and_then(|p| p.trim().parse::<f64>().ok());
    matches!((lat, lon), (Some(lat), Some(lon)) if lat.abs() <= 90.0 && lon.abs() <= 180.0)
}

/// One corner of a detected symbol in source frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CornerPoint {
    pub x: f32,
    pub y: f32,
}

impl CornerPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One decoded symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Kind of content the symbol carries
    pub value_type: BarcodeType,
    /// Symbology, always a single flag
    pub format: BarcodeFormats,
    /// Human readable value
    pub display_value: String,
    /// Value exactly as encoded
    pub raw_value: String,
    /// Corners in the detector's native order
    pub corner_points: Vec<CornerPoint>,
    /// Undecoded payload, when the capability provides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_bytes: Option<Vec<u8>>,
}

impl DetectionResult {
    /// Key two results are considered duplicates by
    pub fn dedup_key(&self) -> (&str, BarcodeFormats) {
        (&self.raw_value, self.format)
    }
}

/// Unit delivered to the consumer
///
/// Only built from a non-empty result batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionEvent {
    /// Sequence number of the frame the results came from
    pub frame_sequence: u64,
    /// Decoded symbols, first-seen order, never empty
    pub results: Vec<DetectionResult>,
    /// JPEG bytes of the upright frame when evidence capture is enabled
    pub evidence_image: Option<Vec<u8>>,
}

impl DetectionEvent {
    /// Build an event, `None` when there is nothing to report
    pub fn new(
        frame_sequence: u64,
        results: Vec<DetectionResult>,
        evidence_image: Option<Vec<u8>>,
    ) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        Some(Self {
            frame_sequence,
            results,
            evidence_image,
        })
    }
}
