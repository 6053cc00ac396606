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

//! Session transport abstraction.
//!
//! A transport delivers keyed payloads to exactly one paired peer. It reports
//! activation, reachability and incoming messages by pushing
//! [`TransportEvent`]s into a channel drained by the
//! [`EventProcessor`](crate::events::EventProcessor).

mod loopback;

pub use loopback::{LoopbackOptions, LoopbackTransport};

use crate::error::TransportError;
use crate::protocol::{Envelope, Payload};

/// Events emitted by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Asynchronous result of [`Transport::activate`].
    ActivationCompleted { ok: bool, error: Option<String> },
    /// The peer became reachable or unreachable.
    ReachabilityChanged(bool),
    /// A keyed payload arrived from the peer.
    MessageReceived { key: String, payload: Payload },
}

/// Called once when a guaranteed send is delivered or abandoned.
pub type CompletionCallback = Box<dyn FnOnce(Result<(), TransportError>) + Send + 'static>;

/// Trait for session transport backends.
pub trait Transport: Send + Sync {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Whether the device supports this transport at all.
    fn is_supported(&self) -> bool;

    /// Begin activation. Completion arrives as
    /// [`TransportEvent::ActivationCompleted`].
    fn activate(&self) -> Result<(), TransportError>;

    /// Largest envelope accepted by [`Transport::send_best_effort`].
    fn max_message_size(&self) -> usize;

    /// Largest envelope accepted by [`Transport::send_guaranteed`].
    fn max_transfer_size(&self) -> usize;

    /// Send now or drop. Never queues.
    fn send_best_effort(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Queue for delivery; `on_complete` reports the outcome.
    fn send_guaranteed(&self, envelope: Envelope, on_complete: CompletionCallback);
}
