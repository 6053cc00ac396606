//! Integration tests for the full bridge flow.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use watch_bridge::dispatcher::SendState;
use watch_bridge::protocol::{MessageKey, Payload};
use watch_bridge::sensors::{ManualSensor, RawReading, SensorKind};
use watch_bridge::session::ActivationState;
use watch_bridge::transport::{LoopbackOptions, LoopbackTransport, TransportEvent};
use watch_bridge::{Bridge, BridgeError, EventProcessor};

struct Side {
    bridge: Arc<Bridge>,
    link: LoopbackTransport,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    heart: Arc<ManualSensor>,
    pedometer: Arc<ManualSensor>,
}

impl Side {
    fn new(link: LoopbackTransport, events: mpsc::UnboundedReceiver<TransportEvent>) -> Self {
        let heart = Arc::new(ManualSensor::new(SensorKind::HeartRate));
        let pedometer = Arc::new(ManualSensor::new(SensorKind::Pedometer));
        let bridge = Bridge::new(Arc::new(link.clone()), heart.clone(), pedometer.clone());
        Self {
            bridge,
            link,
            events,
            heart,
            pedometer,
        }
    }

    /// Process every queued transport event.
    fn pump(&mut self) {
        let processor = EventProcessor::new(self.bridge.clone());
        while let Ok(event) = self.events.try_recv() {
            processor.process_event(event);
        }
    }
}

fn connected_pair() -> (Side, Side) {
    let ((a, rx_a), (b, rx_b)) = LoopbackTransport::pair(LoopbackOptions::default());
    let mut watch = Side::new(a, rx_a);
    let mut phone = Side::new(b, rx_b);

    watch.bridge.activate().unwrap();
    phone.bridge.activate().unwrap();
    watch.pump();
    phone.pump();
    assert!(watch.bridge.is_ready());
    assert!(phone.bridge.is_ready());
    (watch, phone)
}

fn bpm(value: f64) -> RawReading {
    RawReading::HeartRate {
        bpm: value,
        at: Utc::now(),
    }
}

#[test]
fn test_heart_rate_reaches_peer() {
    let (watch, mut phone) = connected_pair();

    watch.bridge.start_heart_rate().unwrap();
    watch.heart.emit(bpm(72.5));
    phone.pump();

    assert_eq!(watch.bridge.last_heart_rate().unwrap().value, 72.5);
    assert_eq!(phone.bridge.last_heart_rate().unwrap().value, 72.5);
    assert_eq!(watch.bridge.send_state(&MessageKey::HeartRate), SendState::Sent);
}

#[test]
fn test_only_readings_inside_start_stop_window_delivered() {
    let (watch, mut phone) = connected_pair();

    assert!(!watch.heart.emit(bpm(50.0)));

    watch.bridge.start_heart_rate().unwrap();
    watch.heart.emit(bpm(60.0));
    watch.heart.emit(bpm(61.0));
    watch.bridge.stop_heart_rate();
    watch.heart.emit_stale(bpm(99.0));

    assert_eq!(phone.link.delivered_count(), 2);
    phone.pump();
    assert_eq!(phone.bridge.last_heart_rate().unwrap().value, 61.0);
    assert!(!watch.bridge.is_streaming(SensorKind::HeartRate));
}

#[test]
fn test_double_start_delivers_once() {
    let (watch, phone) = connected_pair();

    watch.bridge.start_pedometer().unwrap();
    watch.bridge.start_pedometer().unwrap();
    assert_eq!(watch.pedometer.start_count(), 1);

    watch.pedometer.emit(RawReading::StepDelta {
        steps: 4,
        at: Utc::now(),
    });
    assert_eq!(phone.link.delivered_count(), 1);
}

#[test]
fn test_unreachable_send_is_dropped() {
    let (mut watch, mut phone) = connected_pair();

    watch.link.set_reachable(false);
    watch.pump();
    phone.pump();
    assert!(!watch.bridge.is_ready());

    let result = watch.bridge.send_char_to_watch("hello", "message");
    assert_eq!(
        result,
        Err(BridgeError::Unreachable {
            key: "message".into()
        })
    );
    assert_eq!(watch.bridge.last_error(), result.err());
    assert_eq!(watch.bridge.send_state(&MessageKey::Message), SendState::Dropped);

    // Coming back does not resend.
    watch.link.set_reachable(true);
    watch.pump();
    phone.pump();
    assert!(watch.bridge.is_ready());
    assert_eq!(phone.link.delivered_count(), 0);
    assert!(phone.bridge.last_message().is_none());
    assert_eq!(watch.bridge.send_state(&MessageKey::Message), SendState::Idle);
}

#[test]
fn test_image_transfer_survives_outage() {
    let (mut watch, mut phone) = connected_pair();
    watch.link.set_reachable(false);
    watch.pump();

    let image = vec![0x89, b'P', b'N', b'G', 0, 1, 2];
    watch.bridge.send_image_to_watch_app(image.clone()).unwrap();
    assert_eq!(watch.bridge.send_state(&MessageKey::Image), SendState::Sending);
    assert_eq!(watch.link.pending_transfers(), 1);

    watch.link.set_reachable(true);
    watch.pump();
    phone.pump();
    assert_eq!(watch.bridge.send_state(&MessageKey::Image), SendState::Delivered);
    assert_eq!(*phone.bridge.last_image().unwrap().value, image);
}

#[test]
fn test_unknown_key_tolerated() {
    let (_watch, phone) = connected_pair();
    phone
        .bridge
        .on_message_received("heartRate", Payload::text("70"))
        .unwrap();

    let before = phone.bridge.snapshot();
    phone
        .bridge
        .on_message_received("futureKey", Payload::text("x"))
        .unwrap();
    let after = phone.bridge.snapshot();

    assert_eq!(before.last_heart_rate, after.last_heart_rate);
    assert_eq!(before.last_step_count, after.last_step_count);
    assert_eq!(before.last_button_press, after.last_button_press);
    assert!(after.last_error.is_none());
}

#[test]
fn test_malformed_heart_rate_retains_previous() {
    let (_watch, phone) = connected_pair();
    phone
        .bridge
        .on_message_received("heartRate", Payload::text("64"))
        .unwrap();

    assert!(phone
        .bridge
        .on_message_received("heartRate", Payload::text("abc"))
        .is_err());
    assert_eq!(phone.bridge.last_heart_rate().unwrap().value, 64.0);
    assert_eq!(
        phone.bridge.last_error(),
        Some(BridgeError::MalformedPayload {
            key: "heartRate".into()
        })
    );
}

#[test]
fn test_button_press_roundtrip() {
    let (watch, mut phone) = connected_pair();
    watch.bridge.report_button_press("crown").unwrap();
    phone.pump();
    assert_eq!(phone.bridge.last_button_press().unwrap().value, "crown");
}

#[test]
fn test_activation_failure_reported() {
    let ((a, rx_a), _b) = LoopbackTransport::pair(LoopbackOptions {
        activation_error: Some("companion app missing".into()),
        ..Default::default()
    });
    let mut side = Side::new(a, rx_a);

    side.bridge.activate().unwrap();
    side.pump();
    assert_eq!(side.bridge.session().activation, ActivationState::Failed);
    assert!(matches!(
        side.bridge.last_error(),
        Some(BridgeError::ActivationFailed { .. })
    ));
}

#[test]
fn test_concurrent_inbound_and_reads() {
    const PER_KEY: u64 = 334;
    let ((a, _rx), _peer) = LoopbackTransport::pair(LoopbackOptions::default());
    let bridge = Bridge::new(
        Arc::new(a),
        Arc::new(ManualSensor::new(SensorKind::HeartRate)),
        Arc::new(ManualSensor::new(SensorKind::Pedometer)),
    );

    std::thread::scope(|scope| {
        let b = &bridge;
        scope.spawn(move || {
            for i in 1..=PER_KEY {
                b.on_message_received("heartRate", Payload::text(i.to_string()))
                    .unwrap();
            }
        });
        scope.spawn(move || {
            for i in 1..=PER_KEY {
                b.on_message_received("stepCount", Payload::text(i.to_string()))
                    .unwrap();
            }
        });
        scope.spawn(move || {
            for i in 1..=PER_KEY {
                b.on_message_received("buttonPress", Payload::text(format!("b{}", i)))
                    .unwrap();
            }
        });
        scope.spawn(move || {
            let mut last_bpm = 0.0;
            let mut last_steps = 0;
            for _ in 0..1000 {
                let snapshot = b.snapshot();
                if let Some(sample) = snapshot.last_heart_rate {
                    assert!(sample.value >= last_bpm);
                    assert!(sample.value.fract() == 0.0);
                    last_bpm = sample.value;
                }
                if let Some(sample) = snapshot.last_step_count {
                    assert!(sample.value >= last_steps);
                    last_steps = sample.value;
                }
                if let Some(sample) = snapshot.last_button_press {
                    assert!(sample.value.starts_with('b'));
                }
            }
        });
    });

    assert_eq!(bridge.last_heart_rate().unwrap().value, PER_KEY as f64);
    assert_eq!(bridge.last_step_count().unwrap().value, PER_KEY);
    assert_eq!(
        bridge.last_button_press().unwrap().value,
        format!("b{}", PER_KEY)
    );
    assert!(bridge.last_error().is_none());
}

#[test]
fn test_no_reading_forwarded_after_stop_returns() {
    let (watch, mut phone) = connected_pair();
    watch.bridge.start_heart_rate().unwrap();

    let heart = &watch.heart;
    let delivered_at_stop = std::thread::scope(|scope| {
        for t in 0..4u32 {
            scope.spawn(move || {
                for i in 0..250u32 {
                    heart.emit_stale(bpm(60.0 + f64::from(t * 250 + i) / 100.0));
                }
            });
        }
        std::thread::sleep(Duration::from_millis(2));
        watch.bridge.stop_heart_rate();
        phone.link.delivered_count()
    });

    assert!(!watch.bridge.is_streaming(SensorKind::HeartRate));
    assert_eq!(phone.link.delivered_count(), delivered_at_stop);

    // Whatever the peer saw last is what the watch stored last.
    phone.pump();
    assert_eq!(
        phone.bridge.last_heart_rate().map(|s| s.value),
        watch.bridge.last_heart_rate().map(|s| s.value)
    );
}

#[tokio::test]
async fn test_event_loop_delivers_messages() {
    let ((a, rx_a), (b, rx_b)) = LoopbackTransport::pair(LoopbackOptions::default());
    let sensors = || {
        (
            Arc::new(ManualSensor::new(SensorKind::HeartRate)),
            Arc::new(ManualSensor::new(SensorKind::Pedometer)),
        )
    };
    let (hr_a, ped_a) = sensors();
    let (hr_b, ped_b) = sensors();
    let watch = Bridge::new(Arc::new(a), hr_a, ped_a);
    let phone = Bridge::new(Arc::new(b), hr_b, ped_b);

    tokio::spawn(EventProcessor::new(watch.clone()).run(rx_a));
    tokio::spawn(EventProcessor::new(phone.clone()).run(rx_b));

    watch.activate().unwrap();
    phone.activate().unwrap();

    let ready = async {
        while !(watch.is_ready() && phone.is_ready()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(2), ready)
        .await
        .unwrap();

    phone.send_char_to_watch("ping", "message").unwrap();

    let received = async {
        loop {
            if let Some(message) = watch.last_message() {
                return message.value;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let message = tokio::time::timeout(Duration::from_secs(2), received)
        .await
        .unwrap();
    assert_eq!(message, "ping");
}
