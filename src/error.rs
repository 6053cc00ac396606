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

//! Error types.
//!
//! Every [`BridgeError`] is also recorded into the shared state so a polling
//! host can pick it up without subscribing to anything.

use thiserror::Error;

use crate::sensors::SensorKind;

/// Errors surfaced by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("session transport is not supported on this device")]
    UnsupportedPlatform,

    #[error("session activation failed: {reason}")]
    ActivationFailed { reason: String },

    #[error("authorization denied for {sensor} sensor")]
    AuthorizationDenied { sensor: String },

    #[error("peer unreachable, dropped message '{key}'")]
    Unreachable { key: String },

    #[error("payload for '{key}' is {size} bytes, limit is {limit}")]
    PayloadTooLarge { key: String, size: usize, limit: usize },

    #[error("malformed payload for '{key}'")]
    MalformedPayload { key: String },

    #[error("delivery of '{key}' failed: {reason}")]
    DeliveryFailed { key: String, reason: String },

    #[error("{sensor} sensor failed to start: {reason}")]
    SensorStartFailed { sensor: String, reason: String },

    #[error("envelope encoding failed: {reason}")]
    Encoding { reason: String },
}

/// Grouping used to decide which pending error a successful operation clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Session,
    Sensor,
    Send,
    Inbound,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedPlatform | Self::ActivationFailed { .. } => ErrorCategory::Session,
            Self::AuthorizationDenied { .. } | Self::SensorStartFailed { .. } => {
                ErrorCategory::Sensor
            }
            Self::Unreachable { .. }
            | Self::PayloadTooLarge { .. }
            | Self::DeliveryFailed { .. }
            | Self::Encoding { .. } => ErrorCategory::Send,
            Self::MalformedPayload { .. } => ErrorCategory::Inbound,
        }
    }
}

/// Errors reported by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport not supported")]
    Unsupported,
    #[error("session not activated")]
    NotActivated,
    #[error("peer not reachable")]
    NotReachable,
    #[error("transfer cancelled: {0}")]
    Cancelled(String),
    #[error("transport failure: {0}")]
    Other(String),
}

/// Errors reported by a [`SensorCapability`](crate::sensors::SensorCapability).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    #[error("sensor hardware unavailable")]
    Unavailable,
    #[error("no async runtime to drive the sensor")]
    NoRuntime,
    #[error("sensor start failed: {0}")]
    StartFailed(String),
    #[error("capability provides {0} readings")]
    WrongKind(SensorKind),
}

/// Errors decoding a wire envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported protocol version {0}")]
    Version(u8),
    #[error("checksum mismatch")]
    Checksum,
}
