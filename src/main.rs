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

//! Watch Bridge demo
//!
//! Runs a phone bridge and a watch bridge over an in-process link. The watch
//! streams simulated sensors and the phone polls what arrives.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use watch_bridge::config::Config;
use watch_bridge::sensors::{ManualSensor, SensorKind, SimulatedHeartRate, SimulatedPedometer};
use watch_bridge::transport::LoopbackTransport;
use watch_bridge::{Bridge, EventProcessor};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .init();

    info!("Starting Watch Bridge v{}...", env!("CARGO_PKG_VERSION"));

    let ((phone_link, phone_events), (watch_link, watch_events)) =
        LoopbackTransport::pair(config.transport.loopback_options());

    // The phone has no sensors of its own.
    let phone = Bridge::new(
        Arc::new(phone_link),
        Arc::new(ManualSensor::new(SensorKind::HeartRate).unavailable()),
        Arc::new(ManualSensor::new(SensorKind::Pedometer).unavailable()),
    );
    let watch = Bridge::new(
        Arc::new(watch_link),
        Arc::new(SimulatedHeartRate::new(
            config.sensors.heart_rate_interval(),
            config.sensors.resting_bpm,
            config.sensors.authorized,
        )),
        Arc::new(SimulatedPedometer::new(
            config.sensors.pedometer_interval(),
            config.sensors.pedometer_available,
            config.sensors.authorized,
        )),
    );

    tokio::spawn(EventProcessor::new(phone.clone()).run(phone_events));
    tokio::spawn(EventProcessor::new(watch.clone()).run(watch_events));

    phone.activate()?;
    watch.activate()?;

    if let Err(e) = watch.start_heart_rate() {
        warn!("Heart rate unavailable: {}", e);
    }
    if let Err(e) = watch.start_pedometer() {
        warn!("Pedometer unavailable: {}", e);
    }

    let poll_interval = Duration::from_millis(config.demo.poll_interval_ms.max(1));
    let mut poll = tokio::time::interval(poll_interval);
    let mut greeted = false;

    info!("Ready. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            _ = poll.tick() => {
                if !greeted && phone.is_ready() && watch.is_ready() {
                    greeted = true;
                    if let Err(e) = phone.send_char_to_watch("Hello from the phone", "message") {
                        warn!("Greeting failed: {}", e);
                    }
                    if let Err(e) = phone.send_image_to_watch_app(vec![0x89, b'P', b'N', b'G']) {
                        warn!("Image transfer failed: {}", e);
                    }
                    if let Err(e) = watch.report_button_press("crown") {
                        warn!("Button press not sent: {}", e);
                    }
                }

                let snapshot = phone.snapshot();
                info!(
                    "Phone sees heart rate {:?}, steps {:?}, button {:?}",
                    snapshot.last_heart_rate.map(|s| s.value),
                    snapshot.last_step_count.map(|s| s.value),
                    snapshot.last_button_press.map(|s| s.value),
                );
                if let Some(message) = watch.last_message() {
                    info!("Watch received message '{}'", message.value);
                }
                if let Some(error) = phone.last_error() {
                    warn!("Phone error: {}", error);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    watch.stop_heart_rate();
    watch.stop_pedometer();
    info!("Watch Bridge stopped");
    Ok(())
}
