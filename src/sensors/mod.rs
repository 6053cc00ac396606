// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sensor capture abstraction and stream control.
//!
//! A [`SensorCapability`] is the platform's capture implementation. The
//! [`SensorStreamController`] starts and stops it, turns raw readings into
//! [`SensorReading`]s, stores them locally and forwards them to the peer.
//!
//! Each start gets a new stream generation. A reading is accepted only while
//! its stream is active with the same generation, checked under the state
//! lock, so a callback racing `stop` is discarded.
//!
//! A per-stream forwarding lock is held from acceptance until the reading is
//! handed to the dispatcher. Readings of one stream reach the peer in the
//! order they were stored, and `stop` returns only once nothing from the old
//! generation can still be sent.

mod manual;
mod simulated;

pub use manual::ManualSensor;
pub use simulated::{SimulatedHeartRate, SimulatedPedometer};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::OutboundDispatcher;
use crate::error::{BridgeError, ErrorCategory, SensorError};
use crate::protocol::{MessageKey, SensorReading};
use crate::session::SessionManager;
use crate::state::{BridgeState, Sample};

/// Sensor streams managed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    HeartRate,
    Pedometer,
}

impl SensorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::HeartRate => "heart rate",
            SensorKind::Pedometer => "pedometer",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an authorization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

/// A reading as delivered by the platform.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReading {
    HeartRate { bpm: f64, at: DateTime<Utc> },
    /// Steps taken since the previous delta.
    StepDelta { steps: u64, at: DateTime<Utc> },
}

/// Callback a capability invokes for every reading, from any thread.
pub type ReadingSink = Arc<dyn Fn(RawReading) + Send + Sync>;

/// Trait for sensor capture backends.
pub trait SensorCapability: Send + Sync {
    /// Which stream this capability feeds.
    fn kind(&self) -> SensorKind;

    /// Whether the hardware exists on this device.
    fn is_available(&self) -> bool;

    /// Ask the user for access. May prompt the first time.
    fn request_authorization(&self) -> Authorization;

    /// Begin delivering readings to `sink` until [`SensorCapability::stop`].
    fn start(&self, sink: ReadingSink) -> Result<(), SensorError>;

    /// Stop delivering readings.
    fn stop(&self);
}

/// Starts and stops sensor streams and forwards their readings.
pub struct SensorStreamController {
    state: Arc<BridgeState>,
    session: Arc<SessionManager>,
    dispatcher: Arc<OutboundDispatcher>,
    heart_rate: Arc<dyn SensorCapability>,
    pedometer: Arc<dyn SensorCapability>,
    /// Serializes start/stop so the capability sees them in order.
    control: Mutex<()>,
    heart_rate_forward: Arc<Mutex<()>>,
    pedometer_forward: Arc<Mutex<()>>,
}

impl SensorStreamController {
    pub fn new(
        state: Arc<BridgeState>,
        session: Arc<SessionManager>,
        dispatcher: Arc<OutboundDispatcher>,
        heart_rate: Arc<dyn SensorCapability>,
        pedometer: Arc<dyn SensorCapability>,
    ) -> Self {
        Self {
            state,
            session,
            dispatcher,
            heart_rate,
            pedometer,
            control: Mutex::new(()),
            heart_rate_forward: Arc::new(Mutex::new(())),
            pedometer_forward: Arc::new(Mutex::new(())),
        }
    }

    pub fn start_heart_rate(&self) -> Result<(), BridgeError> {
        self.start(SensorKind::HeartRate)
    }

    pub fn stop_heart_rate(&self) {
        self.stop(SensorKind::HeartRate)
    }

    /// Start the pedometer. Without pedometer hardware this still requests
    /// authorization and succeeds, but no data ever arrives.
    pub fn start_pedometer(&self) -> Result<(), BridgeError> {
        self.start(SensorKind::Pedometer)
    }

    pub fn stop_pedometer(&self) {
        self.stop(SensorKind::Pedometer)
    }

    /// Record a locally pressed button and forward it to the peer.
    pub fn report_button_press(&self, identifier: &str) -> Result<(), BridgeError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            let error = BridgeError::MalformedPayload {
                key: MessageKey::ButtonPress.as_str().to_string(),
            };
            self.state.record_error(error.clone());
            return Err(error);
        }

        let reading = SensorReading::ButtonPress {
            identifier: identifier.to_string(),
            at: Utc::now(),
        };
        let sample = Sample::new(identifier.to_string(), reading.at());
        self.state.write(|inner| inner.shared.last_button_press = Some(sample));
        info!("Button pressed: {}", identifier);
        self.dispatcher.send_reading(&reading)
    }

    fn capability(&self, kind: SensorKind) -> &Arc<dyn SensorCapability> {
        match kind {
            SensorKind::HeartRate => &self.heart_rate,
            SensorKind::Pedometer => &self.pedometer,
        }
    }

    fn forward_lock(&self, kind: SensorKind) -> &Arc<Mutex<()>> {
        match kind {
            SensorKind::HeartRate => &self.heart_rate_forward,
            SensorKind::Pedometer => &self.pedometer_forward,
        }
    }

    /// Deactivate the stream once no reading of it is being forwarded.
    /// Returns whether it was active.
    fn retire(&self, kind: SensorKind) -> bool {
        let _forward = self.forward_lock(kind).lock();
        self.state.write(|inner| {
            let flags = inner.stream_mut(kind);
            let was_active = flags.active;
            flags.active = false;
            flags.generation += 1;
            was_active
        })
    }

    fn start(&self, kind: SensorKind) -> Result<(), BridgeError> {
        let _control = self.control.lock();

        if self.state.is_streaming(kind) {
            debug!("{} stream already started", kind);
            return Ok(());
        }

        let capability = self.capability(kind).clone();
        if capability.kind() != kind {
            return Err(self.start_failed(kind, SensorError::WrongKind(capability.kind())));
        }

        let available = capability.is_available();
        if !available && kind == SensorKind::HeartRate {
            return Err(self.start_failed(kind, SensorError::Unavailable));
        }

        if capability.request_authorization() == Authorization::Denied {
            warn!("{} authorization denied", kind);
            let error = BridgeError::AuthorizationDenied {
                sensor: kind.as_str().to_string(),
            };
            self.state.record_error(error.clone());
            return Err(error);
        }

        let generation = self.state.write(|inner| {
            let flags = inner.stream_mut(kind);
            flags.active = true;
            flags.generation += 1;
            flags.total_steps = 0;
            let generation = flags.generation;
            inner.clear_error(ErrorCategory::Sensor);
            generation
        });

        if !available {
            info!("No {} hardware; running degraded with no data", kind);
            return Ok(());
        }

        let sink = self.sink(kind, generation);
        if let Err(e) = capability.start(sink) {
            self.retire(kind);
            return Err(self.start_failed(kind, e));
        }

        info!("{} stream started", kind);
        Ok(())
    }

    fn stop(&self, kind: SensorKind) {
        let _control = self.control.lock();

        if !self.retire(kind) {
            debug!("{} stream not running", kind);
            return;
        }

        if self.capability(kind).is_available() {
            self.capability(kind).stop();
        }
        info!("{} stream stopped", kind);
    }

    fn start_failed(&self, kind: SensorKind, e: SensorError) -> BridgeError {
        error!("{} failed to start: {}", kind, e);
        let error = BridgeError::SensorStartFailed {
            sensor: kind.as_str().to_string(),
            reason: e.to_string(),
        };
        self.state.record_error(error.clone());
        error
    }

    fn sink(&self, kind: SensorKind, generation: u64) -> ReadingSink {
        let state = self.state.clone();
        let session = self.session.clone();
        let dispatcher = self.dispatcher.clone();
        let forward = self.forward_lock(kind).clone();

        Arc::new(move |raw: RawReading| {
            let _forward = forward.lock();
            let Some(reading) = accept_reading(&state, kind, generation, raw) else {
                return;
            };

            if session.is_ready() {
                // Failures are recorded by the dispatcher.
                let _ = dispatcher.send_reading(&reading);
            } else {
                trace!("Peer not ready, {} reading kept locally", kind);
            }
        })
    }
}

/// Convert and store a raw reading if its stream is still current.
fn accept_reading(
    state: &BridgeState,
    kind: SensorKind,
    generation: u64,
    raw: RawReading,
) -> Option<SensorReading> {
    state.write(|inner| {
        if !inner.stream(kind).accepts(generation) {
            debug!("Discarding {} reading from stopped stream", kind);
            return None;
        }

        match (kind, raw) {
            (SensorKind::HeartRate, RawReading::HeartRate { bpm, at }) => {
                if !bpm.is_finite() || bpm <= 0.0 {
                    warn!("Discarding invalid heart rate {}", bpm);
                    return None;
                }
                inner.shared.last_heart_rate = Some(Sample::new(bpm, at));
                Some(SensorReading::HeartRate { bpm, at })
            }
            (SensorKind::Pedometer, RawReading::StepDelta { steps, at }) => {
                if steps == 0 {
                    return None;
                }
                let flags = inner.stream_mut(kind);
                flags.total_steps = flags.total_steps.saturating_add(steps);
                let count = flags.total_steps;
                inner.shared.last_step_count = Some(Sample::new(count, at));
                Some(SensorReading::StepCount { count, at })
            }
            (kind, raw) => {
                warn!("{} stream delivered unexpected reading {:?}", kind, raw);
                None
            }
        }
    })
}
