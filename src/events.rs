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

//! Transport event processing.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::bridge::Bridge;
use crate::transport::TransportEvent;

/// Feeds transport events into a bridge.
pub struct EventProcessor {
    bridge: Arc<Bridge>,
}

impl EventProcessor {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge }
    }

    /// Process a single event.
    pub fn process_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::ActivationCompleted { ok, error } => {
                self.bridge.on_activation_complete(ok, error);
            }
            TransportEvent::ReachabilityChanged(reachable) => {
                self.bridge.on_reachability_changed(reachable);
            }
            TransportEvent::MessageReceived { key, payload } => {
                debug!("Received '{}'", key);
                // Rejections are recorded in the bridge state.
                let _ = self.bridge.on_message_received(&key, payload);
            }
        }
    }

    /// Drain events until every sender is gone.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = rx.recv().await {
            self.process_event(event);
        }
        info!("Transport event channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use crate::sensors::{ManualSensor, SensorKind};
    use crate::session::ActivationState;
    use crate::transport::{LoopbackOptions, LoopbackTransport};

    fn bridge() -> Arc<Bridge> {
        let ((transport, _rx), _peer) = LoopbackTransport::pair(LoopbackOptions::default());
        Bridge::new(
            Arc::new(transport),
            Arc::new(ManualSensor::new(SensorKind::HeartRate)),
            Arc::new(ManualSensor::new(SensorKind::Pedometer)),
        )
    }

    #[test]
    fn test_process_session_events() {
        let bridge = bridge();
        let processor = EventProcessor::new(bridge.clone());

        bridge.activate().unwrap();
        processor.process_event(TransportEvent::ActivationCompleted {
            ok: true,
            error: None,
        });
        assert_eq!(bridge.session().activation, ActivationState::Active);
        assert!(!bridge.is_ready());

        processor.process_event(TransportEvent::ReachabilityChanged(true));
        assert!(bridge.is_ready());
    }

    #[test]
    fn test_process_message() {
        let bridge = bridge();
        let processor = EventProcessor::new(bridge.clone());

        processor.process_event(TransportEvent::MessageReceived {
            key: "stepCount".into(),
            payload: Payload::text("42"),
        });
        assert_eq!(bridge.last_step_count().unwrap().value, 42);
    }
}
