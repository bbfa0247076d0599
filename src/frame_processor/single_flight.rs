// SPDX-License-Identifier: MPL-2.0

//! Single-flight detector invocation
//!
//! Detection capabilities answer through a completion callback. The
//! invoker bridges that callback into a future with a oneshot channel and
//! makes sure only one call per session is ever outstanding: a request that
//! arrives while the slot is taken is dropped, never queued.
//!
//! Dropping a [`PendingDetection`] (for example because the analysis task
//! was aborted on teardown) frees the slot, and the capability's eventual
//! answer goes to a closed channel where it is discarded.

use super::throttle::ScanningSession;
use super::types::BarcodeFormats;
use crate::errors::{ScanError, ScanResult};
use crate::media::DetectorImage;
use futures::channel::oneshot;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// One match as reported by a detection capability, in its own vocabulary
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawBarcode {
    /// Capability format code
    pub format_code: u32,
    /// Capability value type code
    pub value_type_code: u32,
    pub raw_value: Option<String>,
    pub display_value: Option<String>,
    /// Corners in source pixel coordinates, capability order
    pub corner_points: Vec<(i32, i32)>,
    pub raw_bytes: Option<Vec<u8>>,
}

/// Callback a capability answers through, exactly once
pub type DetectionCompletion = Box<dyn FnOnce(ScanResult<Vec<RawBarcode>>) + Send>;

/// Opaque barcode detection capability
///
/// Configured with a format mask at construction; the mask never changes
/// for the lifetime of an instance.
pub trait DetectionCapability: Send + Sync {
    /// Formats this instance was constructed to look for
    fn formats(&self) -> BarcodeFormats;

    /// Start detection, answering through `completion`
    ///
    /// Zero matches is a successful answer. Dropping `completion` without
    /// calling it is reported as a failure.
    fn detect(&self, image: DetectorImage, completion: DetectionCompletion);
}

/// Run one detection call and await its completion
pub async fn detect_once(
    capability: &dyn DetectionCapability,
    image: DetectorImage,
) -> ScanResult<Vec<RawBarcode>> {
    let (tx, rx) = oneshot::channel();
    capability.detect(
        image,
        Box::new(move |outcome| {
            // Receiver gone means the caller stopped waiting
            let _ = tx.send(outcome);
        }),
    );

    match rx.await {
        Ok(outcome) => outcome,
        Err(oneshot::Canceled) => Err(ScanError::DetectionFailure(
            "capability dropped the completion without answering".into(),
        )),
    }
}

/// Guards the per-session detection slot
pub struct SingleFlightInvoker {
    capability: Arc<dyn DetectionCapability>,
    session: Arc<ScanningSession>,
    timeout: Option<Duration>,
}

impl SingleFlightInvoker {
    pub fn new(capability: Arc<dyn DetectionCapability>, session: Arc<ScanningSession>) -> Self {
        Self {
            capability,
            session,
            timeout: None,
        }
    }

    /// Bound the wait for the capability's answer
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_detection_in_flight()
    }

    /// Claim the slot for `image`
    ///
    /// Returns `None` without touching the capability when a call is
    /// already outstanding. The external call starts when the returned
    /// handle is awaited.
    pub fn invoke(&self, image: DetectorImage) -> Option<PendingDetection> {
        if !self.session.try_begin_detection() {
            debug!("Detection already in flight, dropping request");
            return None;
        }

        Some(PendingDetection {
            capability: Arc::clone(&self.capability),
            image: Some(image),
            timeout: self.timeout,
            _slot: InFlightSlot {
                session: Arc::clone(&self.session),
            },
        })
    }
}

/// Releases the detection slot when dropped
struct InFlightSlot {
    session: Arc<ScanningSession>,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.session.end_detection();
        trace!("Detection slot released");
    }
}

/// A claimed detection call
///
/// The slot stays taken until this handle is dropped, so the caller can
/// keep it for as long as it is still working on the outcome.
pub struct PendingDetection {
    capability: Arc<dyn DetectionCapability>,
    image: Option<DetectorImage>,
    timeout: Option<Duration>,
    _slot: InFlightSlot,
}

impl PendingDetection {
    /// Run the external call and wait for its answer
    pub async fn wait(&mut self) -> ScanResult<Vec<RawBarcode>> {
        let image = self.image.take().ok_or_else(|| {
            ScanError::DetectionFailure("detection call already awaited".into())
        })?;

        let call = detect_once(self.capability.as_ref(), image);
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ScanError::DetectionTimeout(limit.as_millis() as u64)),
            },
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn blank_image() -> DetectorImage {
        DetectorImage::from_gray(GrayImage::new(4, 4))
    }

    /// Answers immediately with a fixed outcome
    struct Immediate {
        calls: AtomicUsize,
        outcome: ScanResult<Vec<RawBarcode>>,
    }

    impl DetectionCapability for Immediate {
        fn formats(&self) -> BarcodeFormats {
            BarcodeFormats::all()
        }

        fn detect(&self, _image: DetectorImage, completion: DetectionCompletion) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            completion(self.outcome.clone());
        }
    }

    /// Keeps completions until the test answers them
    #[derive(Default)]
    struct Deferred {
        pending: Mutex<Vec<DetectionCompletion>>,
    }

    impl DetectionCapability for Deferred {
        fn formats(&self) -> BarcodeFormats {
            BarcodeFormats::QR_CODE
        }

        fn detect(&self, _image: DetectorImage, completion: DetectionCompletion) {
            self.pending.lock().unwrap().push(completion);
        }
    }

    /// Drops the completion without answering
    struct Forgetful;

    impl DetectionCapability for Forgetful {
        fn formats(&self) -> BarcodeFormats {
            BarcodeFormats::all()
        }

        fn detect(&self, _image: DetectorImage, _completion: DetectionCompletion) {}
    }

    #[tokio::test]
    async fn test_second_invoke_is_dropped() {
        let capability = Arc::new(Immediate {
            calls: AtomicUsize::new(0),
            outcome: Ok(Vec::new()),
        });
        let session = Arc::new(ScanningSession::default());
        let invoker = SingleFlightInvoker::new(capability.clone(), session.clone());

        let mut first = invoker.invoke(blank_image()).unwrap();
        assert!(invoker.is_busy());
        assert!(invoker.invoke(blank_image()).is_none());

        assert_eq!(first.wait().await, Ok(Vec::new()));
        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);

        // Slot is held until the handle goes away
        assert!(invoker.is_busy());
        drop(first);
        assert!(!invoker.is_busy());
        assert!(invoker.invoke(blank_image()).is_some());
    }

    #[tokio::test]
    async fn test_failure_is_reported() {
        let capability = Arc::new(Immediate {
            calls: AtomicUsize::new(0),
            outcome: Err(ScanError::DetectionFailure("model missing".into())),
        });
        let invoker = SingleFlightInvoker::new(capability, Arc::new(ScanningSession::default()));

        let outcome = invoker.invoke(blank_image()).unwrap().wait().await;
        assert_eq!(
            outcome,
            Err(ScanError::DetectionFailure("model missing".into()))
        );
        assert!(!invoker.is_busy());
    }

    #[tokio::test]
    async fn test_dropped_completion_is_failure() {
        let invoker =
            SingleFlightInvoker::new(Arc::new(Forgetful), Arc::new(ScanningSession::default()));

        let outcome = invoker.invoke(blank_image()).unwrap().wait().await;
        assert!(matches!(outcome, Err(ScanError::DetectionFailure(_))));
    }

    #[tokio::test]
    async fn test_deferred_answer() {
        let capability = Arc::new(Deferred::default());
        let invoker =
            SingleFlightInvoker::new(capability.clone(), Arc::new(ScanningSession::default()));

        let mut pending = invoker.invoke(blank_image()).unwrap();
        let task = tokio::spawn(async move { pending.wait().await });

        // Wait until the capability has been called
        loop {
            if let Some(completion) = capability.pending.lock().unwrap().pop() {
                completion(Ok(vec![RawBarcode {
                    format_code: 256,
                    raw_value: Some("ABC".into()),
                    ..Default::default()
                }]));
                break;
            }
            tokio::task::yield_now().await;
        }

        let matches = task.await.unwrap().unwrap();
        assert_eq!(matches.len(), 1);
        assert!(!invoker.is_busy());
    }

    #[tokio::test]
    async fn test_timeout_frees_slot() {
        let capability = Arc::new(Deferred::default());
        let invoker = SingleFlightInvoker::new(capability, Arc::new(ScanningSession::default()))
            .with_timeout(Some(Duration::from_millis(20)));

        let outcome = invoker.invoke(blank_image()).unwrap().wait().await;
        assert_eq!(outcome, Err(ScanError::DetectionTimeout(20)));
        assert!(!invoker.is_busy());
    }

    #[tokio::test]
    async fn test_second_wait_fails() {
        let capability = Arc::new(Immediate {
            calls: AtomicUsize::new(0),
            outcome: Ok(Vec::new()),
        });
        let invoker = SingleFlightInvoker::new(capability.clone(), Arc::new(ScanningSession::default()));

        let mut pending = invoker.invoke(blank_image()).unwrap();
        assert!(pending.wait().await.is_ok());
        assert!(matches!(
            pending.wait().await,
            Err(ScanError::DetectionFailure(_))
        ));
        assert_eq!(capability.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropping_pending_frees_slot() {
        let invoker = SingleFlightInvoker::new(
            Arc::new(Deferred::default()),
            Arc::new(ScanningSession::default()),
        );

        let pending = invoker.invoke(blank_image()).unwrap();
        drop(pending);
        assert!(!invoker.is_busy());
    }
}
