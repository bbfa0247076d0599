// SPDX-License-Identifier: MPL-2.0

//! Event dispatch
//!
//! The analysis side holds a [`DispatchSink`]; the presentation side owns
//! the matching [`DeliveryContext`]. Events cross between them over an
//! unbounded single-consumer channel, so the consumer callback and the
//! haptic pulse always run on whichever context drains the channel.

use super::throttle::ScanningSession;
use super::types::DetectionEvent;
use crate::constants::haptics;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Haptic feedback device
pub trait Haptics: Send + Sync {
    /// Fire one pulse of the given length
    fn pulse(&self, duration: Duration) -> Result<(), String>;
}

/// Consumer callback
pub type DetectionHandler = Box<dyn FnMut(DetectionEvent) + Send>;

/// Create a connected sink and delivery context for `session`
pub fn channel(session: Arc<ScanningSession>) -> (DispatchSink, DeliveryContext) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DispatchSink { session, tx },
        DeliveryContext {
            rx,
            handler: None,
            haptics: None,
            vibration_on_detected: true,
        },
    )
}

/// Analysis-side end of the delivery channel
pub struct DispatchSink {
    session: Arc<ScanningSession>,
    tx: mpsc::UnboundedSender<DetectionEvent>,
}

impl DispatchSink {
    /// Hand an event to the delivery context
    ///
    /// Disables scanning first; if scanning was already disabled (the
    /// consumer paused it, or another event got there first) the event is
    /// discarded. Returns whether the event was queued.
    pub fn emit(&self, event: DetectionEvent) -> bool {
        if event.results.is_empty() {
            trace!("Not emitting empty batch");
            return false;
        }
        if self.session.is_torn_down() {
            debug!("Session torn down, discarding event");
            return false;
        }
        if !self.session.disable_for_dispatch() {
            debug!(
                frame = event.frame_sequence,
                "Scanning disabled before emission, discarding event"
            );
            return false;
        }

        let frame = event.frame_sequence;
        let count = event.results.len();
        if self.tx.send(event).is_err() {
            warn!(frame, "Delivery context closed, event dropped");
            return false;
        }

        debug!(frame, count, "Detection event queued for delivery");
        true
    }
}

/// Presentation-side end of the delivery channel
///
/// Holds at most one handler; registering another replaces it.
pub struct DeliveryContext {
    rx: mpsc::UnboundedReceiver<DetectionEvent>,
    handler: Option<DetectionHandler>,
    haptics: Option<Arc<dyn Haptics>>,
    vibration_on_detected: bool,
}

impl DeliveryContext {
    /// Register the consumer callback, replacing any previous one
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(DetectionEvent) + Send + 'static,
    {
        if self.handler.is_some() {
            debug!("Replacing detection handler");
        }
        self.handler = Some(Box::new(handler));
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = Some(haptics);
        self
    }

    pub fn with_vibration(mut self, enabled: bool) -> Self {
        self.vibration_on_detected = enabled;
        self
    }

    /// Wait for and deliver the next event
    ///
    /// Returns false once the analysis side has gone away.
    pub async fn deliver_next(&mut self) -> bool {
        match self.rx.recv().await {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Deliver events until the analysis side goes away
    pub async fn run(mut self) {
        while self.deliver_next().await {}
        debug!("Delivery context finished");
    }

    /// Deliver everything already queued without waiting
    ///
    /// For presentation loops that poll once per tick.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    /// Pulse, then call the handler; neither can stop the other
    fn deliver(&mut self, event: DetectionEvent) {
        if self.vibration_on_detected {
            if let Some(device) = &self.haptics {
                match catch_unwind(AssertUnwindSafe(|| device.pulse(haptics::PULSE_DURATION))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Haptic pulse failed"),
                    Err(_) => warn!("Haptic device panicked"),
                }
            }
        }

        let frame = event.frame_sequence;
        match self.handler.as_mut() {
            Some(handler) => {
                if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                    warn!(frame, "Detection handler panicked");
                }
            }
            None => debug!(frame, "No detection handler registered, event dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_processor::types::{BarcodeFormats, BarcodeType, DetectionResult};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(sequence: u64, value: &str) -> DetectionEvent {
        DetectionEvent::new(
            sequence,
            vec![DetectionResult {
                value_type: BarcodeType::Text,
                format: BarcodeFormats::QR_CODE,
                display_value: value.to_string(),
                raw_value: value.to_string(),
                corner_points: Vec::new(),
                raw_bytes: None,
            }],
            None,
        )
        .unwrap()
    }

    #[derive(Default)]
    struct CountingHaptics {
        pulses: AtomicUsize,
        fail: bool,
    }

    impl Haptics for CountingHaptics {
        fn pulse(&self, duration: Duration) -> Result<(), String> {
            assert_eq!(duration, Duration::from_millis(200));
            self.pulses.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err("motor unavailable".into())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_emit_disables_scanning() {
        let session = Arc::new(ScanningSession::default());
        let (sink, mut delivery) = channel(session.clone());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink_received = received.clone();
        delivery.set_handler(move |e| sink_received.lock().unwrap().push(e.frame_sequence));

        assert!(sink.emit(event(1, "ABC")));
        assert!(!session.is_scanning_enabled());

        // Late event for a disabled session is discarded
        assert!(!sink.emit(event(2, "DEF")));

        assert_eq!(delivery.pump(), 1);
        assert_eq!(*received.lock().unwrap(), vec![1]);
    }

    #[test]
    fn test_emit_rejects_empty_batch() {
        let session = Arc::new(ScanningSession::default());
        let (sink, mut delivery) = channel(session.clone());

        let empty = DetectionEvent {
            frame_sequence: 1,
            results: Vec::new(),
            evidence_image: None,
        };
        assert!(!sink.emit(empty));
        assert!(session.is_scanning_enabled());
        assert_eq!(delivery.pump(), 0);
    }

    #[test]
    fn test_emit_after_teardown_discarded() {
        let session = Arc::new(ScanningSession::default());
        let (sink, _delivery) = channel(session.clone());
        session.tear_down();

        assert!(!sink.emit(event(1, "ABC")));
    }

    #[test]
    fn test_second_handler_replaces_first() {
        let session = Arc::new(ScanningSession::default());
        let (sink, mut delivery) = channel(session.clone());
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let f = first.clone();
        delivery.set_handler(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        let s = second.clone();
        delivery.set_handler(move |_| {
            s.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(event(1, "ABC"));
        delivery.pump();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_haptic_failure_does_not_block_handler() {
        let session = Arc::new(ScanningSession::default());
        let haptics = Arc::new(CountingHaptics {
            fail: true,
            ..Default::default()
        });
        let (sink, delivery) = channel(session.clone());
        let mut delivery = delivery.with_haptics(haptics.clone());
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        delivery.set_handler(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(event(1, "ABC"));
        delivery.pump();

        assert_eq!(haptics.pulses.load(Ordering::SeqCst), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_panic_does_not_poison_delivery() {
        let session = Arc::new(ScanningSession::default());
        let haptics = Arc::new(CountingHaptics::default());
        let (sink, delivery) = channel(session.clone());
        let mut delivery = delivery.with_haptics(haptics.clone());
        delivery.set_handler(|_| panic!("consumer bug"));

        sink.emit(event(1, "ABC"));
        delivery.pump();
        session.set_scanning_enabled(true);
        sink.emit(event(2, "ABC"));
        assert_eq!(delivery.pump(), 1);

        assert_eq!(haptics.pulses.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_vibration_disabled() {
        let session = Arc::new(ScanningSession::default());
        let haptics = Arc::new(CountingHaptics::default());
        let (sink, delivery) = channel(session);
        let mut delivery = delivery.with_haptics(haptics.clone()).with_vibration(false);

        sink.emit(event(1, "ABC"));
        delivery.pump();

        assert_eq!(haptics.pulses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_ends_when_sink_dropped() {
        let session = Arc::new(ScanningSession::default());
        let (sink, mut delivery) = channel(session);
        let delivered = Arc::new(AtomicUsize::new(0));
        let d = delivered.clone();
        delivery.set_handler(move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(event(1, "ABC"));
        drop(sink);
        delivery.run().await;

        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
