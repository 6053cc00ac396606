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

//! Session lifecycle.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, ErrorCategory};
use crate::state::BridgeState;
use crate::transport::Transport;

/// Activation state of the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivationState {
    #[default]
    Inactive,
    Activating,
    Active,
    Failed,
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationState::Inactive => "Inactive",
            ActivationState::Activating => "Activating",
            ActivationState::Active => "Active",
            ActivationState::Failed => "Failed",
        }
    }
}

/// Whether the paired peer can currently receive messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Reachability {
    #[default]
    Unreachable,
    Reachable,
}

impl Reachability {
    pub fn from_bool(reachable: bool) -> Self {
        if reachable {
            Self::Reachable
        } else {
            Self::Unreachable
        }
    }
}

/// The single peer session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Session {
    pub activation: ActivationState,
    pub reachability: Reachability,
}

impl Session {
    pub fn is_ready(&self) -> bool {
        self.activation == ActivationState::Active
            && self.reachability == Reachability::Reachable
    }
}

/// Owns the session fields and activates the transport.
pub struct SessionManager {
    state: Arc<BridgeState>,
    transport: Arc<dyn Transport>,
}

impl SessionManager {
    pub fn new(state: Arc<BridgeState>, transport: Arc<dyn Transport>) -> Self {
        Self { state, transport }
    }

    /// Start activating the session.
    ///
    /// Calling this while activating or active does nothing.
    pub fn activate(&self) -> Result<(), BridgeError> {
        if !self.transport.is_supported() {
            warn!("Transport '{}' is not supported on this device", self.transport.name());
            self.state.record_error(BridgeError::UnsupportedPlatform);
            return Err(BridgeError::UnsupportedPlatform);
        }

        let should_activate = self.state.write(|inner| match inner.session.activation {
            ActivationState::Activating | ActivationState::Active => false,
            ActivationState::Inactive | ActivationState::Failed => {
                inner.session.activation = ActivationState::Activating;
                true
            }
        });

        if !should_activate {
            debug!("Session already activating or active");
            return Ok(());
        }

        info!("Activating session over '{}'", self.transport.name());
        if let Err(e) = self.transport.activate() {
            let error = BridgeError::ActivationFailed {
                reason: e.to_string(),
            };
            error!("Session activation failed: {}", e);
            self.state.write(|inner| {
                inner.session.activation = ActivationState::Failed;
                inner.session.reachability = Reachability::Unreachable;
                inner.record_error(error.clone());
            });
            return Err(error);
        }

        Ok(())
    }

    /// True only when the session is active and the peer is reachable.
    pub fn is_ready(&self) -> bool {
        self.state.session().is_ready()
    }

    pub fn session(&self) -> Session {
        self.state.session()
    }

    /// Transport callback for activation completion.
    ///
    /// Ignored unless an activation is in progress.
    pub fn on_activation_complete(&self, ok: bool, error: Option<String>) {
        let applied = self.state.write(|inner| {
            if inner.session.activation != ActivationState::Activating {
                return false;
            }

            if ok {
                inner.session.activation = ActivationState::Active;
                inner.clear_error(ErrorCategory::Session);
            } else {
                let reason = error.unwrap_or_else(|| "unknown error".to_string());
                error!("Session activation failed: {}", reason);
                inner.session.activation = ActivationState::Failed;
                inner.session.reachability = Reachability::Unreachable;
                inner.record_error(BridgeError::ActivationFailed { reason });
            }
            true
        });

        if !applied {
            warn!("Ignoring activation completion while not activating");
        } else if ok {
            info!("Session active");
        }
    }

    /// Transport callback for reachability changes.
    ///
    /// Returns true when the peer just became reachable.
    pub fn on_reachability_changed(&self, reachable: bool) -> bool {
        let next = Reachability::from_bool(reachable);
        let previous = self.state.write(|inner| {
            let previous = inner.session.reachability;
            inner.session.reachability = next;
            previous
        });

        if previous != next {
            info!("Peer {}", if reachable { "reachable" } else { "unreachable" });
        }
        previous == Reachability::Unreachable && next == Reachability::Reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LoopbackOptions, LoopbackTransport};

    fn manager(options: LoopbackOptions) -> (SessionManager, Arc<BridgeState>) {
        let ((transport, _rx), _peer) = LoopbackTransport::pair(options);
        let state = BridgeState::new();
        (SessionManager::new(state.clone(), Arc::new(transport)), state)
    }

    #[test]
    fn test_activate_unsupported() {
        let (session, state) = manager(LoopbackOptions {
            supported: false,
            ..Default::default()
        });

        assert_eq!(session.activate(), Err(BridgeError::UnsupportedPlatform));
        assert_eq!(session.session().activation, ActivationState::Inactive);
        assert_eq!(state.last_error(), Some(BridgeError::UnsupportedPlatform));
    }

    #[test]
    fn test_activate_is_idempotent() {
        let (session, _state) = manager(LoopbackOptions::default());

        session.activate().unwrap();
        assert_eq!(session.session().activation, ActivationState::Activating);
        session.activate().unwrap();
        assert_eq!(session.session().activation, ActivationState::Activating);

        session.on_activation_complete(true, None);
        session.activate().unwrap();
        assert_eq!(session.session().activation, ActivationState::Active);
    }

    #[test]
    fn test_activation_failure_recorded() {
        let (session, state) = manager(LoopbackOptions::default());
        session.activate().unwrap();
        session.on_activation_complete(false, Some("watch app not installed".into()));

        assert_eq!(session.session().activation, ActivationState::Failed);
        assert_eq!(
            state.last_error(),
            Some(BridgeError::ActivationFailed {
                reason: "watch app not installed".into()
            })
        );

        // A failed session may be activated again.
        session.activate().unwrap();
        assert_eq!(session.session().activation, ActivationState::Activating);
        session.on_activation_complete(true, None);
        assert!(state.last_error().is_none());
    }

    #[test]
    fn test_stray_completion_ignored() {
        let (session, state) = manager(LoopbackOptions {
            supported: false,
            ..Default::default()
        });
        assert!(session.activate().is_err());

        session.on_activation_complete(true, None);
        assert_eq!(session.session().activation, ActivationState::Inactive);
        assert_eq!(state.last_error(), Some(BridgeError::UnsupportedPlatform));

        let (session, _state) = manager(LoopbackOptions::default());
        session.activate().unwrap();
        session.on_activation_complete(true, None);
        session.on_activation_complete(false, Some("late failure".into()));
        assert_eq!(session.session().activation, ActivationState::Active);
    }

    #[test]
    fn test_ready_requires_active_and_reachable() {
        let (session, _state) = manager(LoopbackOptions::default());
        assert!(!session.is_ready());

        assert!(session.on_reachability_changed(true));
        assert!(!session.is_ready());

        session.activate().unwrap();
        session.on_activation_complete(true, None);
        assert!(session.is_ready());

        assert!(!session.on_reachability_changed(false));
        assert!(!session.is_ready());
        assert!(session.on_reachability_changed(true));
        assert!(!session.on_reachability_changed(true));
    }
}
