// SPDX-License-Identifier: MPL-2.0

//! Barcode analyzer
//!
//! Receives camera frames one at a time and runs the per-frame pipeline:
//!
//! 1. scanning and single-flight checks, then the throttle gate
//! 2. conversion into a detector image
//! 3. detection on the runtime (the camera worker returns immediately)
//! 4. normalization, optional evidence capture, emission
//! 5. frame release
//!
//! Every frame is released exactly once whichever step it stops at. Per
//! frame errors are logged and never reach the consumer.

use super::dispatch::{self, DeliveryContext, DispatchSink};
use super::normalize::normalize;
use super::single_flight::{DetectionCapability, PendingDetection, SingleFlightInvoker};
use super::throttle::ScanningSession;
use super::types::DetectionEvent;
use crate::backends::camera::types::CameraFrame;
use crate::constants::interval;
use crate::errors::{ScanError, ScanResult};
use crate::media::DetectorImage;
use crate::media::converter::{self, DisplayRotation};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Session options
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerOptions {
    /// Minimum time between analyzed frames, clamped at session start
    pub scan_interval: Duration,
    /// Fire a haptic pulse when an event is delivered
    pub vibration_on_detected: bool,
    /// Attach a JPEG of the frame to each event
    pub return_barcode_image: bool,
    /// Give up on a detection call after this long
    pub detection_timeout: Option<Duration>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            scan_interval: interval::DEFAULT_SCAN_INTERVAL,
            vibration_on_detected: true,
            return_barcode_image: false,
            detection_timeout: None,
        }
    }
}

/// Device orientation used to make evidence images upright
pub trait OrientationSource: Send + Sync {
    fn auto_rotate_enabled(&self) -> bool;
    fn display_rotation(&self) -> DisplayRotation;
}

/// Orientation that never changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedOrientation {
    pub auto_rotate: bool,
    pub rotation: DisplayRotation,
}

impl Default for FixedOrientation {
    fn default() -> Self {
        Self {
            auto_rotate: true,
            rotation: DisplayRotation::Rotation0,
        }
    }
}

impl OrientationSource for FixedOrientation {
    fn auto_rotate_enabled(&self) -> bool {
        self.auto_rotate
    }

    fn display_rotation(&self) -> DisplayRotation {
        self.rotation
    }
}

/// What happened to a frame handed to [`BarcodeAnalyzer::on_frame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Session already torn down; frame released
    TornDown,
    /// Scanning disabled; frame released
    Disabled,
    /// A detection is still outstanding; frame released
    Busy,
    /// Rejected by the throttle gate; frame released
    Throttled,
    /// Frame layout not understood; frame released
    Unsupported,
    /// Detection started; the frame is released when the pipeline finishes
    Detecting,
}

/// Everything the detached pipeline task needs
#[derive(Clone)]
struct PipelineContext {
    session: Arc<ScanningSession>,
    sink: Arc<DispatchSink>,
    orientation: Arc<dyn OrientationSource>,
    return_barcode_image: bool,
}

/// Per camera view frame analyzer
pub struct BarcodeAnalyzer {
    id: Uuid,
    session: Arc<ScanningSession>,
    invoker: SingleFlightInvoker,
    context: PipelineContext,
    runtime: Handle,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl BarcodeAnalyzer {
    /// Start a scanning session
    ///
    /// Must be called inside a tokio runtime, which then hosts detection.
    /// Returns the analyzer and the delivery context events arrive on.
    pub fn new(
        capability: Arc<dyn DetectionCapability>,
        options: AnalyzerOptions,
    ) -> ScanResult<(Self, DeliveryContext)> {
        Self::with_orientation(capability, options, Arc::new(FixedOrientation::default()))
    }

    pub fn with_orientation(
        capability: Arc<dyn DetectionCapability>,
        options: AnalyzerOptions,
        orientation: Arc<dyn OrientationSource>,
    ) -> ScanResult<(Self, DeliveryContext)> {
        let runtime = Handle::try_current().map_err(|_| ScanError::NoLifecycleOwner)?;

        let session = Arc::new(ScanningSession::new(options.scan_interval));
        let (sink, delivery) = dispatch::channel(Arc::clone(&session));
        let invoker = SingleFlightInvoker::new(capability.clone(), Arc::clone(&session))
            .with_timeout(options.detection_timeout);

        let id = Uuid::new_v4();
        info!(
            session = %id,
            interval_ms = session.scan_interval().as_millis() as u64,
            formats = %capability.formats(),
            return_image = options.return_barcode_image,
            "Barcode scanning session started"
        );

        let analyzer = Self {
            id,
            context: PipelineContext {
                session: Arc::clone(&session),
                sink: Arc::new(sink),
                orientation,
                return_barcode_image: options.return_barcode_image,
            },
            session,
            invoker,
            runtime,
            in_flight: Mutex::new(None),
        };

        Ok((
            analyzer,
            delivery.with_vibration(options.vibration_on_detected),
        ))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Shared session state, for re-arming scanning
    pub fn session(&self) -> Arc<ScanningSession> {
        Arc::clone(&self.session)
    }

    pub fn set_scanning_enabled(&self, enabled: bool) {
        self.session.set_scanning_enabled(enabled);
    }

    /// Analyze a frame delivered now
    pub fn on_frame(&self, frame: CameraFrame) -> FrameOutcome {
        self.on_frame_at(frame, Instant::now())
    }

    /// Analyze a frame as if delivered at `now`
    ///
    /// Returns without waiting for detection; frames not taken into the
    /// pipeline are released before this returns.
    pub fn on_frame_at(&self, mut frame: CameraFrame, now: Instant) -> FrameOutcome {
        let outcome = self.admit(&frame, now);
        let image = match outcome {
            Ok(image) => image,
            Err(outcome) => {
                frame.release();
                return outcome;
            }
        };

        let Some(pending) = self.invoker.invoke(image) else {
            frame.release();
            return FrameOutcome::Busy;
        };

        trace!(frame = frame.sequence, "Frame accepted for detection");

        let context = self.context.clone();
        let task = self.runtime.spawn(run_pipeline(frame, pending, context));

        let mut slot = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(task);

        FrameOutcome::Detecting
    }

    /// Checks that run on the camera worker before any detection work
    fn admit(
        &self,
        frame: &CameraFrame,
        now: Instant,
    ) -> Result<DetectorImage, FrameOutcome> {
        if self.session.is_torn_down() {
            return Err(FrameOutcome::TornDown);
        }
        if !self.session.is_scanning_enabled() {
            trace!(frame = frame.sequence, "Scanning disabled, releasing frame");
            return Err(FrameOutcome::Disabled);
        }
        if self.invoker.is_busy() {
            trace!(frame = frame.sequence, "Detection in flight, releasing frame");
            return Err(FrameOutcome::Busy);
        }
        if !self.session.accept(now) {
            return Err(FrameOutcome::Throttled);
        }

        converter::to_detector_image(frame).map_err(|e| {
            debug!(frame = frame.sequence, error = %e, "Dropping frame");
            FrameOutcome::Unsupported
        })
    }

    /// Wait for the outstanding pipeline run, if any
    pub async fn wait_idle(&self) {
        let task = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(task) = task {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "Analysis task failed");
                }
            }
        }
    }

    /// Tear the session down
    ///
    /// Outstanding work is aborted, its frame is released, and any late
    /// answer from the capability is discarded.
    pub fn shutdown(&self) {
        if self.session.is_torn_down() {
            return;
        }
        self.session.tear_down();

        let task = self
            .in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        info!(session = %self.id, "Barcode scanning session stopped");
    }
}

impl Drop for BarcodeAnalyzer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Detached part of the pipeline: detect, normalize, emit, release
async fn run_pipeline(
    mut frame: CameraFrame,
    mut pending: PendingDetection,
    context: PipelineContext,
) {
    let sequence = frame.sequence;
    let captured_at = frame.captured_at;

    let results = match pending.wait().await {
        Ok(raw) => normalize(raw),
        Err(e) if e.is_per_frame() => {
            debug!(frame = sequence, error = %e, "Detection failed, dropping frame");
            frame.release();
            return;
        }
        Err(e) => {
            warn!(frame = sequence, error = %e, "Detection capability error");
            frame.release();
            return;
        }
    };

    if results.is_empty() {
        trace!(frame = sequence, "No barcodes in frame");
        frame.release();
        return;
    }

    if context.session.is_torn_down() || !context.session.is_scanning_enabled() {
        debug!(frame = sequence, "Scanning stopped during detection, discarding results");
        frame.release();
        return;
    }

    let (mut frame, evidence) = if context.return_barcode_image {
        let correction = converter::correction_degrees(
            context.orientation.auto_rotate_enabled(),
            context.orientation.display_rotation(),
        );
        capture_evidence(frame, correction).await
    } else {
        (Some(frame), None)
    };

    if let Some(event) = DetectionEvent::new(sequence, results, evidence) {
        debug!(
            frame = sequence,
            count = event.results.len(),
            latency_ms = captured_at.elapsed().as_millis(),
            "Emitting detection event"
        );
        context.sink.emit(event);
    }

    if let Some(frame) = frame.as_mut() {
        frame.release();
    }

    // Keep the slot until the event is out so events stay in frame order
    drop(pending);
}

/// Encode the evidence image off the runtime's worker threads
///
/// Encoding failures only drop the image. The frame comes back unless the
/// encoder panicked, in which case dropping it inside the task released it.
async fn capture_evidence(
    frame: CameraFrame,
    correction: u32,
) -> (Option<CameraFrame>, Option<Vec<u8>>) {
    let sequence = frame.sequence;
    let encoded = tokio::task::spawn_blocking(move || {
        let evidence = converter::to_evidence_image(&frame, correction);
        (frame, evidence)
    })
    .await;

    match encoded {
        Ok((frame, Ok(bytes))) => (Some(frame), Some(bytes)),
        Ok((frame, Err(e))) => {
            warn!(frame = sequence, error = %e, "Evidence image dropped");
            (Some(frame), None)
        }
        Err(e) => {
            warn!(frame = sequence, error = %e, "Evidence encoding task failed");
            (None, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::types::{PixelFormat, YuvPlanes};
    use crate::frame_processor::single_flight::{DetectionCompletion, RawBarcode};
    use crate::frame_processor::types::BarcodeFormats;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedAnswer(Vec<RawBarcode>);

    impl DetectionCapability for FixedAnswer {
        fn formats(&self) -> BarcodeFormats {
            BarcodeFormats::QR_CODE
        }

        fn detect(&self, _image: DetectorImage, completion: DetectionCompletion) {
            completion(Ok(self.0.clone()));
        }
    }

    fn qr(value: &str) -> RawBarcode {
        RawBarcode {
            format_code: 256,
            value_type_code: 7,
            raw_value: Some(value.to_string()),
            display_value: Some(value.to_string()),
            corner_points: vec![(0, 0), (4, 0), (4, 4), (0, 4)],
            raw_bytes: None,
        }
    }

    fn frame(sequence: u64, releases: &Arc<AtomicUsize>) -> CameraFrame {
        let releases = Arc::clone(releases);
        let planes = YuvPlanes::semi_planar(8, 8, 8);
        CameraFrame::new(8, 8, PixelFormat::NV21, 8, vec![128u8; planes.total_len()])
            .with_planes(planes)
            .with_sequence(sequence)
            .with_release(move || {
                releases.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
    }

    #[test]
    fn test_requires_runtime() {
        let result = BarcodeAnalyzer::new(Arc::new(FixedAnswer(Vec::new())), AnalyzerOptions::default());
        assert!(matches!(result, Err(ScanError::NoLifecycleOwner)));
    }

    #[tokio::test]
    async fn test_evidence_attached_when_requested() {
        let options = AnalyzerOptions {
            return_barcode_image: true,
            ..Default::default()
        };
        let (analyzer, mut delivery) =
            BarcodeAnalyzer::new(Arc::new(FixedAnswer(vec![qr("ABC")])), options).unwrap();
        let releases = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        delivery.set_handler(move |e| sink.lock().unwrap().push(e));

        assert_eq!(analyzer.on_frame(frame(1, &releases)), FrameOutcome::Detecting);
        analyzer.wait_idle().await;
        delivery.pump();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        let jpeg = events[0].evidence_image.as_ref().unwrap();
        let decoded = image::load_from_memory(jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evidence_failure_still_emits() {
        let options = AnalyzerOptions {
            return_barcode_image: true,
            ..Default::default()
        };
        let (analyzer, mut delivery) =
            BarcodeAnalyzer::new(Arc::new(FixedAnswer(vec![qr("ABC")])), options).unwrap();
        let releases = Arc::new(AtomicUsize::new(0));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        delivery.set_handler(move |e| sink.lock().unwrap().push(e));

        // Luma plane fine for detection, chroma plane truncated
        let mut planes = YuvPlanes::semi_planar(8, 8, 8);
        planes.uv_size = 4;
        let counter = releases.clone();
        let broken = CameraFrame::new(8, 8, PixelFormat::NV21, 8, vec![128u8; 96])
            .with_planes(planes)
            .with_release(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });

        analyzer.on_frame(broken);
        analyzer.wait_idle().await;
        delivery.pump();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].evidence_image.is_none());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_frame_released() {
        let (analyzer, _delivery) =
            BarcodeAnalyzer::new(Arc::new(FixedAnswer(vec![qr("ABC")])), AnalyzerOptions::default())
                .unwrap();
        let releases = Arc::new(AtomicUsize::new(0));
        let counter = releases.clone();
        let bayer = CameraFrame::new(4, 4, PixelFormat::BayerRGGB, 4, vec![0u8; 16]).with_release(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        assert_eq!(analyzer.on_frame(bayer), FrameOutcome::Unsupported);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
        assert!(!analyzer.session().is_detection_in_flight());
    }

    #[tokio::test]
    async fn test_release_failure_does_not_stop_pipeline() {
        let (analyzer, mut delivery) =
            BarcodeAnalyzer::new(Arc::new(FixedAnswer(vec![qr("ABC")])), AnalyzerOptions::default())
                .unwrap();
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        delivery.set_handler(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        let planes = YuvPlanes::semi_planar(8, 8, 8);
        let failing = CameraFrame::new(8, 8, PixelFormat::NV12, 8, vec![0u8; planes.total_len()])
            .with_planes(planes)
            .with_release(|| Err("buffer already returned".into()));

        assert_eq!(analyzer.on_frame(failing), FrameOutcome::Detecting);
        analyzer.wait_idle().await;
        delivery.pump();

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_frames_after_shutdown_released() {
        let (analyzer, _delivery) =
            BarcodeAnalyzer::new(Arc::new(FixedAnswer(Vec::new())), AnalyzerOptions::default())
                .unwrap();
        let releases = Arc::new(AtomicUsize::new(0));

        analyzer.shutdown();
        assert_eq!(analyzer.on_frame(frame(1, &releases)), FrameOutcome::TornDown);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
