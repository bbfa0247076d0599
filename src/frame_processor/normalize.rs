// SPDX-License-Identifier: MPL-2.0

//! Raw detector output to canonical results

use super::single_flight::RawBarcode;
use super::symbology;
use super::types::{CornerPoint, DetectionResult};
use std::collections::HashSet;
use tracing::trace;

/// Map raw matches into canonical results
///
/// Codes are translated through the symbology tables, corner points keep
/// the capability's order, and results repeating an earlier
/// (raw value, format) pair are dropped. Matches without any value are
/// skipped. Never fails; an empty output means nothing to report.
pub fn normalize(raw: Vec<RawBarcode>) -> Vec<DetectionResult> {
    let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(raw.len());

    for barcode in raw {
        let raw_value = match (barcode.raw_value, barcode.display_value.as_ref()) {
            (Some(value), _) => value,
            (None, Some(display)) => display.clone(),
            (None, None) => {
                trace!(format_code = barcode.format_code, "Skipping match without value");
                continue;
            }
        };

        let format = symbology::format_from_capability(barcode.format_code);
        if !seen.insert((raw_value.clone(), format)) {
            trace!(raw_value = %raw_value, "Dropping duplicate match");
            continue;
        }

        results.push(DetectionResult {
            value_type: symbology::value_type_from_capability(barcode.value_type_code),
            format,
            display_value: barcode.display_value.unwrap_or_else(|| raw_value.clone()),
            raw_value,
            corner_points: barcode
                .corner_points
                .into_iter()
                .map(|(x, y)| CornerPoint::new(x as f32, y as f32))
                .collect(),
            raw_bytes: barcode.raw_bytes,
        });
    }

    results
}
