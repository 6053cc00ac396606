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

//! Inbound message routing.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{BridgeError, ErrorCategory};
use crate::protocol::{MessageKey, Payload, PeerMessage};
use crate::state::{BridgeState, Sample};

/// Writes messages received from the peer into the shared state.
pub struct InboundMessageRouter {
    state: Arc<BridgeState>,
}

impl InboundMessageRouter {
    pub fn new(state: Arc<BridgeState>) -> Self {
        Self { state }
    }

    /// Route one keyed payload from the peer.
    ///
    /// A malformed payload for a known key records an error and leaves the
    /// previous value in place. Unknown keys are logged and ignored.
    pub fn on_message_received(&self, key: &str, payload: Payload) -> Result<(), BridgeError> {
        let key = MessageKey::parse(key);

        let message = match PeerMessage::parse(&key, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Rejected inbound '{}': {}", key, e);
                self.state.record_error(e.clone());
                return Err(e);
            }
        };

        if let PeerMessage::Unknown(other) = &message {
            warn!("Ignoring message with unknown key '{}'", other);
            return Ok(());
        }

        debug!("Inbound {:?}", message);
        self.state.write(|inner| {
            let shared = &mut inner.shared;
            match message {
                PeerMessage::HeartRate(bpm) => shared.last_heart_rate = Some(Sample::now(bpm)),
                PeerMessage::StepCount(count) => shared.last_step_count = Some(Sample::now(count)),
                PeerMessage::ButtonPress(id) => shared.last_button_press = Some(Sample::now(id)),
                PeerMessage::Message(text) => shared.last_message = Some(Sample::now(text)),
                PeerMessage::Image(bytes) => shared.last_image = Some(Sample::now(Arc::new(bytes))),
                PeerMessage::Unknown(_) => {}
            }
            inner.clear_error(ErrorCategory::Inbound);
        });
        Ok(())
    }
}
