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

//! In-process paired transport.
//!
//! Two endpoints share one link. Every envelope goes through the JSON wire
//! format on its way across, so the receiving side sees exactly what a real
//! peer would.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{CompletionCallback, Transport, TransportEvent};
use crate::error::TransportError;
use crate::protocol::Envelope;

/// Behaviour knobs for a loopback link.
#[derive(Debug, Clone)]
pub struct LoopbackOptions {
    /// Report the transport as available on this device.
    pub supported: bool,
    /// Best-effort message size limit in bytes.
    pub max_message_bytes: usize,
    /// Guaranteed transfer size limit in bytes.
    pub max_transfer_bytes: usize,
    /// When set, activation completes with this error.
    pub activation_error: Option<String>,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            supported: true,
            max_message_bytes: 64 * 1024,
            max_transfer_bytes: 1024 * 1024,
            activation_error: None,
        }
    }
}

struct Endpoint {
    activated: bool,
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Messages delivered to this endpoint.
    delivered: usize,
    /// Guaranteed sends from this endpoint waiting for the peer.
    outbox: Vec<(Vec<u8>, CompletionCallback)>,
}

struct Link {
    reachable: bool,
    ends: [Endpoint; 2],
}

type Completed = Vec<(CompletionCallback, Result<(), TransportError>)>;

impl Link {
    /// Both ends see the same reachability.
    fn peer_visible(&self) -> bool {
        self.reachable && self.ends.iter().all(|e| e.activated)
    }

    fn notify_reachability(&self, reachable: bool) {
        for end in self.ends.iter().filter(|e| e.activated) {
            let _ = end.events.send(TransportEvent::ReachabilityChanged(reachable));
        }
    }

    fn deliver(&mut self, to: usize, bytes: &[u8]) -> Result<(), TransportError> {
        let envelope = match Envelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return Err(TransportError::Other(e.to_string()));
            }
        };

        let end = &mut self.ends[to];
        end.events
            .send(TransportEvent::MessageReceived {
                key: envelope.key,
                payload: envelope.payload,
            })
            .map_err(|_| TransportError::Other("peer event channel closed".to_string()))?;
        end.delivered += 1;
        Ok(())
    }

    /// Deliver queued guaranteed sends in both directions.
    fn flush_outboxes(&mut self) -> Completed {
        let mut completed = Vec::new();
        if !self.peer_visible() {
            return completed;
        }

        for side in 0..2 {
            let outbox = std::mem::take(&mut self.ends[side].outbox);
            if !outbox.is_empty() {
                debug!("Flushing {} queued transfers from side {}", outbox.len(), side);
            }
            for (bytes, callback) in outbox {
                let result = self.deliver(1 - side, &bytes);
                completed.push((callback, result));
            }
        }
        completed
    }
}

fn run_completions(completed: Completed) {
    for (callback, result) in completed {
        callback(result);
    }
}

/// One endpoint of an in-process link.
#[derive(Clone)]
pub struct LoopbackTransport {
    link: Arc<Mutex<Link>>,
    side: usize,
    options: LoopbackOptions,
}

impl LoopbackTransport {
    /// Create two connected endpoints, each with its own event receiver.
    ///
    /// The link starts reachable; neither side is activated.
    #[allow(clippy::type_complexity)]
    pub fn pair(
        options: LoopbackOptions,
    ) -> (
        (Self, mpsc::UnboundedReceiver<TransportEvent>),
        (Self, mpsc::UnboundedReceiver<TransportEvent>),
    ) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let endpoint = |events: mpsc::UnboundedSender<TransportEvent>| Endpoint {
            activated: false,
            events,
            delivered: 0,
            outbox: Vec::new(),
        };

        let link = Arc::new(Mutex::new(Link {
            reachable: true,
            ends: [endpoint(tx_a), endpoint(tx_b)],
        }));

        let a = Self {
            link: link.clone(),
            side: 0,
            options: options.clone(),
        };
        let b = Self {
            link,
            side: 1,
            options,
        };
        ((a, rx_a), (b, rx_b))
    }

    /// Bring the radio link up or down.
    pub fn set_reachable(&self, reachable: bool) {
        let completed = {
            let mut link = self.link.lock();
            let before = link.peer_visible();
            link.reachable = reachable;
            let after = link.peer_visible();
            if before != after {
                info!("Loopback link now {}", if after { "reachable" } else { "unreachable" });
                link.notify_reachability(after);
            }
            link.flush_outboxes()
        };
        run_completions(completed);
    }

    /// Messages delivered to this endpoint so far.
    pub fn delivered_count(&self) -> usize {
        self.link.lock().ends[self.side].delivered
    }

    /// Guaranteed sends from this endpoint still waiting for the peer.
    pub fn pending_transfers(&self) -> usize {
        self.link.lock().ends[self.side].outbox.len()
    }

    /// Abandon every queued guaranteed send from this endpoint.
    pub fn cancel_pending(&self, reason: &str) {
        let outbox = std::mem::take(&mut self.link.lock().ends[self.side].outbox);
        for (_, callback) in outbox {
            callback(Err(TransportError::Cancelled(reason.to_string())));
        }
    }

    fn encode(envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
        envelope
            .to_bytes()
            .map_err(|e| TransportError::Other(e.to_string()))
    }
}

impl Transport for LoopbackTransport {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn is_supported(&self) -> bool {
        self.options.supported
    }

    fn activate(&self) -> Result<(), TransportError> {
        if !self.options.supported {
            return Err(TransportError::Unsupported);
        }

        let completed = {
            let mut link = self.link.lock();
            if link.ends[self.side].activated {
                return Ok(());
            }

            if let Some(reason) = &self.options.activation_error {
                let _ = link.ends[self.side]
                    .events
                    .send(TransportEvent::ActivationCompleted {
                        ok: false,
                        error: Some(reason.clone()),
                    });
                return Ok(());
            }

            let before = link.peer_visible();
            link.ends[self.side].activated = true;
            let _ = link.ends[self.side]
                .events
                .send(TransportEvent::ActivationCompleted { ok: true, error: None });

            let after = link.peer_visible();
            if before != after {
                link.notify_reachability(after);
            }
            link.flush_outboxes()
        };
        run_completions(completed);
        Ok(())
    }

    fn max_message_size(&self) -> usize {
        self.options.max_message_bytes
    }

    fn max_transfer_size(&self) -> usize {
        self.options.max_transfer_bytes
    }

    fn send_best_effort(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let bytes = Self::encode(envelope)?;
        let mut link = self.link.lock();

        if !link.ends[self.side].activated {
            return Err(TransportError::NotActivated);
        }
        if !link.peer_visible() {
            return Err(TransportError::NotReachable);
        }
        link.deliver(1 - self.side, &bytes)
    }

    fn send_guaranteed(&self, envelope: Envelope, on_complete: CompletionCallback) {
        let bytes = match Self::encode(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                on_complete(Err(e));
                return;
            }
        };

        let result = {
            let mut link = self.link.lock();
            if !link.ends[self.side].activated {
                Err(TransportError::NotActivated)
            } else if link.peer_visible() {
                link.deliver(1 - self.side, &bytes)
            } else {
                debug!("Peer unreachable, queueing transfer '{}'", envelope.key);
                link.ends[self.side].outbox.push((bytes, on_complete));
                return;
            }
        };
        on_complete(result);
    }
}
