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

//! Message protocol definitions and serialization.
//!
//! Both peers agree on the key namespace out of band. Keys this side does not
//! know are carried as [`MessageKey::Other`] so that a newer peer never breaks
//! an older one.

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{BridgeError, EnvelopeError};

/// Protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message keys shared by both peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    HeartRate,
    StepCount,
    ButtonPress,
    Message,
    Image,
    /// A key this build does not recognise.
    Other(String),
}

impl MessageKey {
    /// Parse from the wire string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "heartRate" => Self::HeartRate,
            "stepCount" => Self::StepCount,
            "buttonPress" => Self::ButtonPress,
            "message" => Self::Message,
            "image" => Self::Image,
            other => Self::Other(other.to_string()),
        }
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::HeartRate => "heartRate",
            Self::StepCount => "stepCount",
            Self::ButtonPress => "buttonPress",
            Self::Message => "message",
            Self::Image => "image",
            Self::Other(key) => key,
        }
    }

    /// False for keys this build does not recognise.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body: a short string or an opaque blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
    Text(String),
    Blob(#[serde(with = "blob_base64")] Vec<u8>),
}

impl Payload {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Blob(_) => None,
        }
    }

    /// Canonical string form used for the checksum.
    fn digest_input(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blob(bytes) => STANDARD.encode(bytes),
        }
    }
}

mod blob_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Wire envelope for one keyed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version
    #[serde(rename = "v")]
    pub version: u8,

    /// Message key
    #[serde(rename = "k")]
    pub key: String,

    /// Payload content
    #[serde(rename = "p")]
    pub payload: Payload,

    /// Timestamp in milliseconds
    #[serde(rename = "ts")]
    pub timestamp: u64,

    /// Checksum (first 8 chars of SHA-256)
    #[serde(rename = "cs")]
    pub checksum: String,
}

impl Envelope {
    /// Create a new envelope with automatic timestamp.
    pub fn new(key: &MessageKey, payload: Payload) -> Self {
        let timestamp = Utc::now().timestamp_millis().max(0) as u64;
        let mut envelope = Self {
            version: PROTOCOL_VERSION,
            key: key.as_str().to_string(),
            payload,
            timestamp,
            checksum: String::new(),
        };
        envelope.checksum = envelope.compute_checksum();
        envelope
    }

    fn compute_checksum(&self) -> String {
        let input = format!(
            "{}|{}|{}|{}",
            self.version,
            self.key,
            self.payload.digest_input(),
            self.timestamp
        );
        let digest = Sha256::digest(input.as_bytes());
        hex::encode(&digest[..4])
    }

    /// Verify the envelope checksum.
    pub fn verify(&self) -> bool {
        self.checksum == self.compute_checksum()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Size of the serialized envelope in bytes.
    pub fn encoded_len(&self) -> Result<usize, EnvelopeError> {
        Ok(self.to_bytes()?.len())
    }

    /// Parse and verify an envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(EnvelopeError::Version(envelope.version));
        }
        if !envelope.verify() {
            return Err(EnvelopeError::Checksum);
        }
        Ok(envelope)
    }
}

/// A canonical reading produced by a sensor stream or a local button.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    HeartRate { bpm: f64, at: DateTime<Utc> },
    StepCount { count: u64, at: DateTime<Utc> },
    ButtonPress { identifier: String, at: DateTime<Utc> },
}

impl SensorReading {
    /// Key and payload used to forward this reading to the peer.
    pub fn to_outbound(&self) -> (MessageKey, Payload) {
        match self {
            Self::HeartRate { bpm, .. } => (MessageKey::HeartRate, Payload::Text(bpm.to_string())),
            Self::StepCount { count, .. } => {
                (MessageKey::StepCount, Payload::Text(count.to_string()))
            }
            Self::ButtonPress { identifier, .. } => {
                (MessageKey::ButtonPress, Payload::Text(identifier.clone()))
            }
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Self::HeartRate { at, .. }
            | Self::StepCount { at, .. }
            | Self::ButtonPress { at, .. } => *at,
        }
    }
}

/// Typed form of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerMessage {
    HeartRate(f64),
    StepCount(u64),
    ButtonPress(String),
    Message(String),
    Image(Vec<u8>),
    Unknown(String),
}

impl PeerMessage {
    /// Parse a keyed payload into its typed form.
    ///
    /// Fails with [`BridgeError::MalformedPayload`] when a recognised key
    /// carries a payload that does not parse. Unknown keys always succeed.
    pub fn parse(key: &MessageKey, payload: Payload) -> Result<Self, BridgeError> {
        let malformed = || BridgeError::MalformedPayload {
            key: key.as_str().to_string(),
        };

        match key {
            MessageKey::HeartRate => {
                let bpm: f64 = payload
                    .as_text()
                    .and_then(|s| s.trim().parse().ok())
                    .ok_or_else(malformed)?;
                if !bpm.is_finite() || bpm < 0.0 {
                    return Err(malformed());
                }
                Ok(Self::HeartRate(bpm))
            }
            MessageKey::StepCount => payload
                .as_text()
                .and_then(|s| s.trim().parse().ok())
                .map(Self::StepCount)
                .ok_or_else(malformed),
            MessageKey::ButtonPress => match payload.as_text().map(str::trim) {
                Some(id) if !id.is_empty() => Ok(Self::ButtonPress(id.to_string())),
                _ => Err(malformed()),
            },
            MessageKey::Message => match payload {
                Payload::Text(text) => Ok(Self::Message(text)),
                Payload::Blob(_) => Err(malformed()),
            },
            MessageKey::Image => match payload {
                Payload::Blob(bytes) => Ok(Self::Image(bytes)),
                Payload::Text(_) => Err(malformed()),
            },
            MessageKey::Other(other) => Ok(Self::Unknown(other.clone())),
        }
    }
}
