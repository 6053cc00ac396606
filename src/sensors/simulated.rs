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

//! Simulated sensors driven by a tokio task.

use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Authorization, RawReading, ReadingSink, SensorCapability, SensorKind};
use crate::error::SensorError;

/// Spawn a ticking task on the current runtime, replacing any previous one.
fn spawn_ticker<F>(
    slot: &Mutex<Option<JoinHandle<()>>>,
    interval: Duration,
    mut tick: F,
) -> Result<(), SensorError>
where
    F: FnMut(&mut StdRng) + Send + 'static,
{
    let handle = Handle::try_current().map_err(|_| SensorError::NoRuntime)?;
    let task = handle.spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            tick(&mut rng);
        }
    });

    if let Some(previous) = slot.lock().replace(task) {
        previous.abort();
    }
    Ok(())
}

fn abort_ticker(slot: &Mutex<Option<JoinHandle<()>>>) {
    if let Some(task) = slot.lock().take() {
        task.abort();
    }
}

/// Heart rate that wanders around a resting value.
pub struct SimulatedHeartRate {
    interval: Duration,
    resting_bpm: f64,
    authorization: Authorization,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedHeartRate {
    pub fn new(interval: Duration, resting_bpm: f64, authorized: bool) -> Self {
        Self {
            interval,
            resting_bpm,
            authorization: if authorized {
                Authorization::Granted
            } else {
                Authorization::Denied
            },
            task: Mutex::new(None),
        }
    }
}

impl SensorCapability for SimulatedHeartRate {
    fn kind(&self) -> SensorKind {
        SensorKind::HeartRate
    }

    fn is_available(&self) -> bool {
        true
    }

    fn request_authorization(&self) -> Authorization {
        self.authorization
    }

    fn start(&self, sink: ReadingSink) -> Result<(), SensorError> {
        let resting = self.resting_bpm;
        let mut drift = 0.0_f64;
        spawn_ticker(&self.task, self.interval, move |rng| {
            drift = (drift + rng.gen_range(-2.0..=2.0)).clamp(-15.0, 40.0);
            let bpm = (resting + drift).max(30.0);
            sink(RawReading::HeartRate {
                bpm,
                at: Utc::now(),
            });
        })?;
        debug!("Simulated heart rate started");
        Ok(())
    }

    fn stop(&self) {
        abort_ticker(&self.task);
        debug!("Simulated heart rate stopped");
    }
}

/// Pedometer producing a few steps per tick.
pub struct SimulatedPedometer {
    interval: Duration,
    available: bool,
    authorization: Authorization,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SimulatedPedometer {
    pub fn new(interval: Duration, available: bool, authorized: bool) -> Self {
        Self {
            interval,
            available,
            authorization: if authorized {
                Authorization::Granted
            } else {
                Authorization::Denied
            },
            task: Mutex::new(None),
        }
    }
}

impl SensorCapability for SimulatedPedometer {
    fn kind(&self) -> SensorKind {
        SensorKind::Pedometer
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn request_authorization(&self) -> Authorization {
        self.authorization
    }

    fn start(&self, sink: ReadingSink) -> Result<(), SensorError> {
        if !self.available {
            return Err(SensorError::Unavailable);
        }
        spawn_ticker(&self.task, self.interval, move |rng| {
            let steps = rng.gen_range(0..=4u64);
            sink(RawReading::StepDelta {
                steps,
                at: Utc::now(),
            });
        })?;
        debug!("Simulated pedometer started");
        Ok(())
    }

    fn stop(&self) {
        abort_ticker(&self.task);
        debug!("Simulated pedometer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[test]
    fn test_start_without_runtime() {
        let sensor = SimulatedHeartRate::new(Duration::from_millis(10), 60.0, true);
        let sink: ReadingSink = Arc::new(|_: RawReading| {});
        assert_eq!(sensor.start(sink), Err(SensorError::NoRuntime));
    }

    #[tokio::test]
    async fn test_heart_rate_emits_readings() {
        let sensor = SimulatedHeartRate::new(Duration::from_millis(5), 60.0, true);
        let (tx, mut rx) = mpsc::unbounded_channel();
        sensor
            .start(Arc::new(move |reading: RawReading| {
                let _ = tx.send(reading);
            }))
            .unwrap();

        let reading = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match reading {
            RawReading::HeartRate { bpm, .. } => assert!((45.0..=100.0).contains(&bpm)),
            other => panic!("unexpected reading {:?}", other),
        }
        sensor.stop();
    }

    #[tokio::test]
    async fn test_pedometer_unavailable() {
        let sensor = SimulatedPedometer::new(Duration::from_millis(5), false, true);
        assert!(!sensor.is_available());
        let sink: ReadingSink = Arc::new(|_: RawReading| {});
        assert_eq!(sensor.start(sink), Err(SensorError::Unavailable));
    }
}
