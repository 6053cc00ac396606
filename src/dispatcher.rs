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

//! Outbound message dispatch.
//!
//! Best-effort sends go out only while the session is ready and are dropped
//! otherwise; they are never queued or resent. Guaranteed sends are handed to
//! the transport regardless of reachability and report their outcome through
//! a completion callback.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{BridgeError, ErrorCategory};
use crate::protocol::{Envelope, MessageKey, Payload, SensorReading};
use crate::session::SessionManager;
use crate::state::BridgeState;
use crate::transport::Transport;

/// Send state of one message key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendState {
    #[default]
    Idle,
    /// Last best-effort send was dropped because the peer was unreachable.
    Dropped,
    /// Last best-effort send was handed to the transport.
    Sent,
    /// A guaranteed send is in flight.
    Sending,
    Delivered,
    Failed,
}

#[derive(Debug, Default)]
struct KeyStatus {
    state: SendState,
    /// Latest guaranteed transfer for this key.
    transfer: Option<Uuid>,
}

type KeyTable = Arc<Mutex<HashMap<MessageKey, KeyStatus>>>;

/// Serializes keyed payloads into envelopes and sends them.
pub struct OutboundDispatcher {
    state: Arc<BridgeState>,
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    keys: KeyTable,
}

impl OutboundDispatcher {
    pub fn new(
        state: Arc<BridgeState>,
        session: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            state,
            session,
            transport,
            keys: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Send a short string under `key`, best effort.
    pub fn send_text(&self, key: MessageKey, text: impl Into<String>) -> Result<(), BridgeError> {
        self.send_best_effort(key, Payload::Text(text.into()))
    }

    /// Forward a sensor reading, best effort.
    pub fn send_reading(&self, reading: &SensorReading) -> Result<(), BridgeError> {
        let (key, payload) = reading.to_outbound();
        self.send_best_effort(key, payload)
    }

    /// Send now if the peer is reachable, otherwise drop.
    pub fn send_best_effort(&self, key: MessageKey, payload: Payload) -> Result<(), BridgeError> {
        let envelope = Envelope::new(&key, payload);
        self.check_size(&key, &envelope, self.transport.max_message_size())?;

        if !self.session.is_ready() {
            return self.drop_unreachable(key);
        }

        match self.transport.send_best_effort(&envelope) {
            Ok(()) => {
                debug!("Sent '{}'", key);
                self.set_key_state(&key, SendState::Sent);
                self.state.clear_error(ErrorCategory::Send);
                Ok(())
            }
            Err(e) => {
                debug!("Transport dropped '{}': {}", key, e);
                self.drop_unreachable(key)
            }
        }
    }

    /// Queue a payload on the transport's guaranteed-delivery path.
    ///
    /// Returns the transfer id. Delivery failure is recorded into the shared
    /// state when the transport reports it.
    pub fn send_guaranteed(&self, key: MessageKey, payload: Payload) -> Result<Uuid, BridgeError> {
        let envelope = Envelope::new(&key, payload);
        self.check_size(&key, &envelope, self.transport.max_transfer_size())?;

        let transfer = Uuid::new_v4();
        if key.is_known() {
            let mut keys = self.keys.lock();
            let status = keys.entry(key.clone()).or_default();
            status.state = SendState::Sending;
            status.transfer = Some(transfer);
        }
        info!("Transfer {} started for '{}'", transfer, key);

        let state = self.state.clone();
        let keys = self.keys.clone();
        self.transport.send_guaranteed(
            envelope,
            Box::new(move |result| {
                let outcome = match &result {
                    Ok(()) => SendState::Delivered,
                    Err(_) => SendState::Failed,
                };

                if let Some(status) = keys.lock().get_mut(&key) {
                    if status.transfer == Some(transfer) {
                        status.state = outcome;
                    }
                }

                match result {
                    Ok(()) => {
                        info!("Transfer {} delivered", transfer);
                        state.clear_error(ErrorCategory::Send);
                    }
                    Err(e) => {
                        error!("Transfer {} failed: {}", transfer, e);
                        state.record_error(BridgeError::DeliveryFailed {
                            key: key.as_str().to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }),
        );

        Ok(transfer)
    }

    /// Send image bytes on the guaranteed path.
    pub fn send_image(&self, data: Vec<u8>) -> Result<Uuid, BridgeError> {
        self.send_guaranteed(MessageKey::Image, Payload::Blob(data))
    }

    /// Called when the peer becomes reachable again.
    ///
    /// Dropped best-effort messages are not resent; their keys go back to
    /// idle. Returns how many keys were reset.
    pub fn on_peer_reachable(&self) -> usize {
        let mut keys = self.keys.lock();
        let mut reset = 0;
        for status in keys.values_mut() {
            if status.state == SendState::Dropped {
                status.state = SendState::Idle;
                reset += 1;
            }
        }
        if reset > 0 {
            info!("Peer reachable; {} dropped message keys discarded", reset);
        }
        reset
    }

    /// Current send state of `key`.
    pub fn send_state(&self, key: &MessageKey) -> SendState {
        self.keys
            .lock()
            .get(key)
            .map(|status| status.state)
            .unwrap_or_default()
    }

    fn check_size(
        &self,
        key: &MessageKey,
        envelope: &Envelope,
        limit: usize,
    ) -> Result<(), BridgeError> {
        let size = envelope.encoded_len().map_err(|e| {
            let error = BridgeError::Encoding {
                reason: e.to_string(),
            };
            self.state.record_error(error.clone());
            error
        })?;

        if size > limit {
            warn!("Payload for '{}' too large: {} > {}", key, size, limit);
            let error = BridgeError::PayloadTooLarge {
                key: key.as_str().to_string(),
                size,
                limit,
            };
            self.state.record_error(error.clone());
            return Err(error);
        }
        Ok(())
    }

    fn drop_unreachable(&self, key: MessageKey) -> Result<(), BridgeError> {
        warn!("Peer unreachable, dropping '{}'", key);
        let error = BridgeError::Unreachable {
            key: key.as_str().to_string(),
        };
        self.set_key_state(&key, SendState::Dropped);
        self.state.record_error(error.clone());
        Err(error)
    }

    /// Only known keys are tracked; others always read as idle.
    fn set_key_state(&self, key: &MessageKey, state: SendState) {
        if !key.is_known() {
            return;
        }
        self.keys.lock().entry(key.clone()).or_default().state = state;
    }
}
