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

//! Hand-driven sensor for tests and scripted demos.

use parking_lot::Mutex;

use super::{Authorization, RawReading, ReadingSink, SensorCapability, SensorKind};
use crate::error::SensorError;

#[derive(Default)]
struct ManualInner {
    running: bool,
    /// Every sink ever handed to `start`, oldest first.
    sinks: Vec<ReadingSink>,
    starts: usize,
    stops: usize,
    authorization_requests: usize,
}

/// A sensor whose readings are pushed by the caller.
pub struct ManualSensor {
    kind: SensorKind,
    available: bool,
    authorization: Authorization,
    start_error: Option<String>,
    inner: Mutex<ManualInner>,
}

impl ManualSensor {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            available: true,
            authorization: Authorization::Granted,
            start_error: None,
            inner: Mutex::new(ManualInner::default()),
        }
    }

    /// Deny every authorization request.
    pub fn denied(mut self) -> Self {
        self.authorization = Authorization::Denied;
        self
    }

    /// Report the hardware as missing.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Fail every start with `reason`.
    pub fn failing(mut self, reason: &str) -> Self {
        self.start_error = Some(reason.to_string());
        self
    }

    /// Deliver a reading if the sensor is running. Returns whether it was
    /// delivered.
    pub fn emit(&self, reading: RawReading) -> bool {
        let sink = {
            let inner = self.inner.lock();
            if !inner.running {
                return false;
            }
            inner.sinks.last().cloned()
        };
        match sink {
            Some(sink) => {
                sink(reading);
                true
            }
            None => false,
        }
    }

    /// Deliver through the most recent sink even after `stop`, like a
    /// platform callback already in flight.
    pub fn emit_stale(&self, reading: RawReading) {
        let sink = self.inner.lock().sinks.last().cloned();
        if let Some(sink) = sink {
            sink(reading);
        }
    }

    /// Deliver through the sink from the first `start`.
    pub fn emit_first(&self, reading: RawReading) {
        let sink = self.inner.lock().sinks.first().cloned();
        if let Some(sink) = sink {
            sink(reading);
        }
    }

    pub fn start_count(&self) -> usize {
        self.inner.lock().starts
    }

    pub fn stop_count(&self) -> usize {
        self.inner.lock().stops
    }

    pub fn authorization_requests(&self) -> usize {
        self.inner.lock().authorization_requests
    }
}

impl SensorCapability for ManualSensor {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn request_authorization(&self) -> Authorization {
        self.inner.lock().authorization_requests += 1;
        self.authorization
    }

    fn start(&self, sink: ReadingSink) -> Result<(), SensorError> {
        if let Some(reason) = &self.start_error {
            return Err(SensorError::StartFailed(reason.clone()));
        }
        let mut inner = self.inner.lock();
        inner.running = true;
        inner.sinks.push(sink);
        inner.starts += 1;
        Ok(())
    }

    fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.running = false;
        inner.stops += 1;
    }
}
