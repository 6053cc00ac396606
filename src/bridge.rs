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

//! Bridge facade.
//!
//! Wires the session, dispatcher, router and sensor controller around one
//! [`BridgeState`] and exposes the operations a host application calls.

use std::sync::Arc;
use uuid::Uuid;

use crate::dispatcher::{OutboundDispatcher, SendState};
use crate::error::BridgeError;
use crate::protocol::{MessageKey, Payload};
use crate::router::InboundMessageRouter;
use crate::sensors::{SensorCapability, SensorKind, SensorStreamController};
use crate::session::{Session, SessionManager};
use crate::state::{BridgeState, Sample, SharedState};
use crate::transport::Transport;

/// One end of the wearable/host link.
pub struct Bridge {
    state: Arc<BridgeState>,
    session: Arc<SessionManager>,
    dispatcher: Arc<OutboundDispatcher>,
    router: InboundMessageRouter,
    sensors: SensorStreamController,
}

impl Bridge {
    pub fn new(
        transport: Arc<dyn Transport>,
        heart_rate: Arc<dyn SensorCapability>,
        pedometer: Arc<dyn SensorCapability>,
    ) -> Arc<Self> {
        let state = BridgeState::new();
        let session = Arc::new(SessionManager::new(state.clone(), transport.clone()));
        let dispatcher = Arc::new(OutboundDispatcher::new(
            state.clone(),
            session.clone(),
            transport,
        ));
        let router = InboundMessageRouter::new(state.clone());
        let sensors = SensorStreamController::new(
            state.clone(),
            session.clone(),
            dispatcher.clone(),
            heart_rate,
            pedometer,
        );

        Arc::new(Self {
            state,
            session,
            dispatcher,
            router,
            sensors,
        })
    }

    /// Shared state handle.
    pub fn state(&self) -> &Arc<BridgeState> {
        &self.state
    }

    // Session

    pub fn activate(&self) -> Result<(), BridgeError> {
        self.session.activate()
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    pub fn session(&self) -> Session {
        self.session.session()
    }

    pub fn on_activation_complete(&self, ok: bool, error: Option<String>) {
        self.session.on_activation_complete(ok, error);
    }

    pub fn on_reachability_changed(&self, reachable: bool) {
        if self.session.on_reachability_changed(reachable) {
            self.dispatcher.on_peer_reachable();
        }
    }

    pub fn on_message_received(&self, key: &str, payload: Payload) -> Result<(), BridgeError> {
        self.router.on_message_received(key, payload)
    }

    // Sensors

    pub fn start_heart_rate(&self) -> Result<(), BridgeError> {
        self.sensors.start_heart_rate()
    }

    pub fn stop_heart_rate(&self) {
        self.sensors.stop_heart_rate()
    }

    pub fn start_pedometer(&self) -> Result<(), BridgeError> {
        self.sensors.start_pedometer()
    }

    pub fn stop_pedometer(&self) {
        self.sensors.stop_pedometer()
    }

    pub fn is_streaming(&self, kind: SensorKind) -> bool {
        self.state.is_streaming(kind)
    }

    pub fn report_button_press(&self, identifier: &str) -> Result<(), BridgeError> {
        self.sensors.report_button_press(identifier)
    }

    // Outbound

    /// Send `message` to the peer under `key`, best effort.
    pub fn send_char_to_watch(&self, message: &str, key: &str) -> Result<(), BridgeError> {
        self.dispatcher.send_text(MessageKey::parse(key), message)
    }

    /// Queue an image for guaranteed delivery.
    pub fn send_image_to_watch_app(&self, data: Vec<u8>) -> Result<Uuid, BridgeError> {
        self.dispatcher.send_image(data)
    }

    pub fn send_state(&self, key: &MessageKey) -> SendState {
        self.dispatcher.send_state(key)
    }

    // Polled values

    pub fn last_heart_rate(&self) -> Option<Sample<f64>> {
        self.state.last_heart_rate()
    }

    pub fn last_step_count(&self) -> Option<Sample<u64>> {
        self.state.last_step_count()
    }

    pub fn last_button_press(&self) -> Option<Sample<String>> {
        self.state.last_button_press()
    }

    pub fn last_message(&self) -> Option<Sample<String>> {
        self.state.last_message()
    }

    pub fn last_image(&self) -> Option<Sample<Arc<Vec<u8>>>> {
        self.state.last_image()
    }

    pub fn last_error(&self) -> Option<BridgeError> {
        self.state.last_error()
    }

    pub fn snapshot(&self) -> SharedState {
        self.state.snapshot()
    }
}
