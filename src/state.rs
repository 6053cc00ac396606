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

//! Shared bridge state.
//!
//! One lock guards the polled values, the session fields and the sensor
//! stream flags. Writers hold it only for field updates; host reads clone
//! out of it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::error::{BridgeError, ErrorCategory};
use crate::sensors::SensorKind;
use crate::session::Session;

/// A polled value with the time it was produced or received.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    pub value: T,
    pub at: DateTime<Utc>,
}

impl<T> Sample<T> {
    pub fn new(value: T, at: DateTime<Utc>) -> Self {
        Self { value, at }
    }

    pub fn now(value: T) -> Self {
        Self::new(value, Utc::now())
    }
}

/// Values the host application polls.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    /// Last heart rate, local or from the peer.
    pub last_heart_rate: Option<Sample<f64>>,

    /// Last cumulative step count.
    pub last_step_count: Option<Sample<u64>>,

    /// Last button identifier.
    pub last_button_press: Option<Sample<String>>,

    /// Last free-form text message from the peer.
    pub last_message: Option<Sample<String>>,

    /// Last image received from the peer.
    pub last_image: Option<Sample<Arc<Vec<u8>>>>,

    /// Last error, overwritten by the next one.
    pub last_error: Option<BridgeError>,
}

/// Per-sensor stream bookkeeping.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct StreamFlags {
    pub active: bool,
    /// Bumped on every start and stop; readings carry the value they were
    /// started with.
    pub generation: u64,
    pub total_steps: u64,
}

impl StreamFlags {
    pub fn accepts(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }
}

#[derive(Debug, Default)]
pub(crate) struct StateInner {
    pub session: Session,
    pub shared: SharedState,
    pub heart_rate: StreamFlags,
    pub pedometer: StreamFlags,
}

impl StateInner {
    pub fn stream(&self, kind: SensorKind) -> &StreamFlags {
        match kind {
            SensorKind::HeartRate => &self.heart_rate,
            SensorKind::Pedometer => &self.pedometer,
        }
    }

    pub fn stream_mut(&mut self, kind: SensorKind) -> &mut StreamFlags {
        match kind {
            SensorKind::HeartRate => &mut self.heart_rate,
            SensorKind::Pedometer => &mut self.pedometer,
        }
    }

    pub fn record_error(&mut self, error: BridgeError) {
        self.shared.last_error = Some(error);
    }

    pub fn clear_error(&mut self, category: ErrorCategory) {
        if self
            .shared
            .last_error
            .as_ref()
            .is_some_and(|e| e.category() == category)
        {
            self.shared.last_error = None;
        }
    }
}

/// Process-wide bridge state, shared by handle between components.
#[derive(Debug, Default)]
pub struct BridgeState {
    inner: RwLock<StateInner>,
}

impl BridgeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&StateInner) -> R) -> R {
        f(&self.inner.read())
    }

    pub(crate) fn write<R>(&self, f: impl FnOnce(&mut StateInner) -> R) -> R {
        f(&mut self.inner.write())
    }

    /// Consistent copy of every polled field.
    pub fn snapshot(&self) -> SharedState {
        self.inner.read().shared.clone()
    }

    pub fn session(&self) -> Session {
        self.inner.read().session
    }

    pub fn last_heart_rate(&self) -> Option<Sample<f64>> {
        self.inner.read().shared.last_heart_rate.clone()
    }

    pub fn last_step_count(&self) -> Option<Sample<u64>> {
        self.inner.read().shared.last_step_count.clone()
    }

    pub fn last_button_press(&self) -> Option<Sample<String>> {
        self.inner.read().shared.last_button_press.clone()
    }

    pub fn last_message(&self) -> Option<Sample<String>> {
        self.inner.read().shared.last_message.clone()
    }

    pub fn last_image(&self) -> Option<Sample<Arc<Vec<u8>>>> {
        self.inner.read().shared.last_image.clone()
    }

    pub fn last_error(&self) -> Option<BridgeError> {
        self.inner.read().shared.last_error.clone()
    }

    pub fn record_error(&self, error: BridgeError) {
        self.inner.write().record_error(error);
    }

    /// Clear the pending error if it belongs to `category`.
    pub fn clear_error(&self, category: ErrorCategory) {
        self.inner.write().clear_error(category);
    }

    /// Whether the given sensor stream is currently started.
    pub fn is_streaming(&self, kind: SensorKind) -> bool {
        self.inner.read().stream(kind).active
    }
}
