// SPDX-License-Identifier: GPL-3.0-only
//! Camera worker thread
//!
//! Frames are pulled from a [`FrameSource`] on a dedicated thread and pushed
//! to the consumer one at a time. The consumer (normally
//! [`BarcodeAnalyzer::on_frame`](crate::frame_processor::BarcodeAnalyzer::on_frame))
//! returns before the next frame is pulled, so frames never queue up.

use super::types::{CameraFrame, PixelFormat};
use crate::errors::{ScanError, ScanResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Something that produces camera frames
pub trait FrameSource: Send {
    /// Pixel format every frame from this source uses
    fn pixel_format(&self) -> PixelFormat;

    /// Block until the next frame is due
    ///
    /// `Ok(None)` means the source is exhausted.
    fn next_frame(&mut self) -> ScanResult<Option<CameraFrame>>;
}

/// Reject sources whose frames the detector cannot read
pub fn validate_source_format(format: PixelFormat) -> ScanResult<()> {
    match format {
        PixelFormat::BayerRGGB => Err(ScanError::UnsupportedCameraConfiguration(
            "raw Bayer output cannot be analyzed".into(),
        )),
        _ => Ok(()),
    }
}

/// Returned by the frame callback to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Pull the next frame
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for the camera worker thread
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Pull frames from `source` and hand each one to `on_frame`
    ///
    /// The loop ends when the source is exhausted or fails, when `on_frame`
    /// returns [`LoopAction::Stop`], or when the controller is stopped.
    /// Fails up front with `UnsupportedCameraConfiguration` when the source's
    /// format cannot be analyzed.
    pub fn start<S, F>(name: &str, mut source: S, mut on_frame: F) -> ScanResult<Self>
    where
        S: FrameSource + 'static,
        F: FnMut(CameraFrame) -> LoopAction + Send + 'static,
    {
        let format = source.pixel_format();
        validate_source_format(format)?;

        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, format = ?format, "Starting camera worker");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let mut delivered = 0u64;
                while !thread_stop.load(Ordering::SeqCst) {
                    let frame = match source.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => {
                            debug!(name = %thread_name, "Frame source exhausted");
                            break;
                        }
                        Err(e) => {
                            warn!(name = %thread_name, error = %e, "Frame source failed");
                            break;
                        }
                    };

                    delivered += 1;
                    if on_frame(frame) == LoopAction::Stop {
                        debug!(name = %thread_name, "Consumer requested stop");
                        break;
                    }
                }

                info!(name = %thread_name, delivered, "Camera worker exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Shared stop flag, e.g. for a Ctrl+C handler
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_signal)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting camera worker stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Camera worker panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Camera worker finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Yields a fixed number of gray frames, optionally pacing them
    struct CountingSource {
        remaining: Option<u32>,
        format: PixelFormat,
        pace: Duration,
    }

    impl CountingSource {
        fn finite(count: u32, format: PixelFormat) -> Self {
            Self {
                remaining: Some(count),
                format,
                pace: Duration::ZERO,
            }
        }

        fn endless(pace: Duration) -> Self {
            Self {
                remaining: None,
                format: PixelFormat::Gray8,
                pace,
            }
        }
    }

    impl FrameSource for CountingSource {
        fn pixel_format(&self) -> PixelFormat {
            self.format
        }

        fn next_frame(&mut self) -> ScanResult<Option<CameraFrame>> {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
            }
            thread::sleep(self.pace);
            Ok(Some(CameraFrame::new(2, 2, self.format, 2, vec![0u8; 4])))
        }
    }

    #[test]
    fn test_runs_until_exhausted() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut controller = CaptureLoopController::start(
            "test-source",
            CountingSource::finite(5, PixelFormat::Gray8),
            move |_frame| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            },
        )
        .unwrap();

        controller.join();
        assert_eq!(seen.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_consumer_stop() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut controller = CaptureLoopController::start(
            "test-consumer-stop",
            CountingSource::finite(10, PixelFormat::Gray8),
            move |_frame| {
                let count = seen_clone.fetch_add(1, Ordering::SeqCst);
                if count >= 2 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        )
        .unwrap();

        controller.join();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stop_signal() {
        let seen = Arc::new(AtomicU32::new(0));
        let seen_clone = Arc::clone(&seen);

        let mut controller = CaptureLoopController::start(
            "test-stop",
            CountingSource::endless(Duration::from_millis(10)),
            move |_frame| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(50));
        assert!(controller.is_running());

        controller.stop();
        assert!(!controller.is_running());
        assert!(seen.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_shared_stop_flag_ends_loop() {
        let controller = CaptureLoopController::start(
            "test-stop-flag",
            CountingSource::endless(Duration::from_millis(5)),
            |_frame| LoopAction::Continue,
        )
        .unwrap();

        let flag = controller.stop_signal();
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::SeqCst);

        for _ in 0..200 {
            if !controller.is_running() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!controller.is_running());
    }

    #[test]
    fn test_frames_released_after_consumer() {
        let released = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&released);

        struct ReleasingSource {
            counter: Arc<AtomicU32>,
            remaining: u32,
        }

        impl FrameSource for ReleasingSource {
            fn pixel_format(&self) -> PixelFormat {
                PixelFormat::Gray8
            }

            fn next_frame(&mut self) -> ScanResult<Option<CameraFrame>> {
                if self.remaining == 0 {
                    return Ok(None);
                }
                self.remaining -= 1;
                let counter = Arc::clone(&self.counter);
                Ok(Some(
                    CameraFrame::new(1, 1, PixelFormat::Gray8, 1, vec![0u8]).with_release(
                        move || {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        },
                    ),
                ))
            }
        }

        let mut controller = CaptureLoopController::start(
            "test-release",
            ReleasingSource {
                counter,
                remaining: 3,
            },
            |_frame| LoopAction::Continue,
        )
        .unwrap();

        controller.join();
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_rejects_bayer_source() {
        let result = CaptureLoopController::start(
            "test-bayer",
            CountingSource::finite(1, PixelFormat::BayerRGGB),
            |_| LoopAction::Continue,
        );

        assert!(matches!(
            result,
            Err(ScanError::UnsupportedCameraConfiguration(_))
        ));
    }
}
