// SPDX-License-Identifier: MPL-2.0

//! Scanning session state and the throttle gate
//!
//! Camera delivery easily outpaces detection, so frames are only analyzed
//! when at least one scan interval has passed since the last accepted one.
//!
//! `scanning_enabled` is written from the delivery context (the consumer
//! re-arms after handling an event) and read from the camera worker. All
//! flags are atomics; the last accepted instant sits behind a mutex that
//! only the worker side touches.

use crate::constants::interval;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Per camera view scanning state
#[derive(Debug)]
pub struct ScanningSession {
    scanning_enabled: AtomicBool,
    scan_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
    detection_in_flight: AtomicBool,
    torn_down: AtomicBool,
}

impl Default for ScanningSession {
    fn default() -> Self {
        Self::new(interval::DEFAULT_SCAN_INTERVAL)
    }
}

impl ScanningSession {
    /// Create an enabled session
    ///
    /// Intervals below 100ms are replaced by the 500ms default.
    pub fn new(scan_interval: Duration) -> Self {
        let effective = interval::clamp_scan_interval(scan_interval);
        if effective != scan_interval {
            info!(
                requested_ms = scan_interval.as_millis() as u64,
                effective_ms = effective.as_millis() as u64,
                "Scan interval below floor, using default"
            );
        }

        Self {
            scanning_enabled: AtomicBool::new(true),
            scan_interval: effective,
            last_accepted: Mutex::new(None),
            detection_in_flight: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
        }
    }

    /// Effective interval after clamping
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn is_scanning_enabled(&self) -> bool {
        self.scanning_enabled.load(Ordering::Acquire)
    }

    /// Pause or re-arm scanning
    pub fn set_scanning_enabled(&self, enabled: bool) {
        self.scanning_enabled.store(enabled, Ordering::Release);
    }

    /// Clear `scanning_enabled` if it is set
    ///
    /// Returns false when scanning was already disabled, in which case the
    /// caller must not deliver anything.
    pub fn disable_for_dispatch(&self) -> bool {
        self.scanning_enabled
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Throttle gate
    ///
    /// Rejects without touching state when scanning is disabled or when
    /// `now` is not strictly more than one interval after the last accepted
    /// frame. Otherwise records `now` and accepts. The first frame of a
    /// session is always accepted.
    pub fn accept(&self, now: Instant) -> bool {
        if !self.is_scanning_enabled() {
            trace!("Frame rejected: scanning disabled");
            return false;
        }

        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed <= self.scan_interval {
                trace!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Frame rejected: within scan interval"
                );
                return false;
            }
        }

        *last = Some(now);
        true
    }

    /// Instant of the most recently accepted frame
    pub fn last_accepted(&self) -> Option<Instant> {
        *self
            .last_accepted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_detection_in_flight(&self) -> bool {
        self.detection_in_flight.load(Ordering::Acquire)
    }

    /// Claim the single detection slot, false if it is taken
    pub(crate) fn try_begin_detection(&self) -> bool {
        self.detection_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_detection(&self) {
        self.detection_in_flight.store(false, Ordering::Release);
    }

    /// Mark the session as disposed; late completions become no-ops
    pub fn tear_down(&self) {
        if !self.torn_down.swap(true, Ordering::AcqRel) {
            info!("Scanning session torn down");
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }
}
