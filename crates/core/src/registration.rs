//! Worker registration state machine.
//!
//! ```text
//! Unregistered --begin--> Registering --complete--> Registered
//!                         Registering --fail------> Unregistered
//! Registered --begin_unregister--> Unregistering --finish_unregister--> Unregistered
//! ```
//!
//! [`Registration`] pairs the state with the host-issued
//! [`WorkerIdentity`] so that an identity exists exactly while the state
//! is [`RegistrationState::Registered`].

use std::fmt;

use serde::Serialize;

use crate::error::CoreError;
use crate::types::WorkerIdentity;

/// Lifecycle state of the worker's registration with the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    #[default]
    Unregistered,
    Registering,
    Registered,
    Unregistering,
}

impl RegistrationState {
    /// Whether `self -> next` is one of the legal transitions.
    pub fn can_transition_to(self, next: RegistrationState) -> bool {
        use RegistrationState::*;
        matches!(
            (self, next),
            (Unregistered, Registering)
                | (Registering, Registered)
                | (Registering, Unregistered)
                | (Registered, Unregistering)
                | (Unregistering, Unregistered)
        )
    }

    fn transition(self, next: RegistrationState) -> Result<RegistrationState, CoreError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Registering => "registering",
            RegistrationState::Registered => "registered",
            RegistrationState::Unregistering => "unregistering",
        };
        f.write_str(name)
    }
}

/// Registration state together with the identity it guards.
#[derive(Debug, Default)]
pub struct Registration {
    state: RegistrationState,
    identity: Option<WorkerIdentity>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// The host-issued identity, present only while registered.
    pub fn identity(&self) -> Option<&WorkerIdentity> {
        self.identity.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.state == RegistrationState::Registered
    }

    /// `Unregistered -> Registering`.
    pub fn begin(&mut self) -> Result<(), CoreError> {
        self.state = self.state.transition(RegistrationState::Registering)?;
        Ok(())
    }

    /// `Registering -> Registered`, storing the issued identity.
    pub fn complete(&mut self, identity: WorkerIdentity) -> Result<(), CoreError> {
        self.state = self.state.transition(RegistrationState::Registered)?;
        self.identity = Some(identity);
        Ok(())
    }

    /// `Registering -> Unregistered` after a failed handshake.
    pub fn fail(&mut self) -> Result<(), CoreError> {
        self.state = self.state.transition(RegistrationState::Unregistered)?;
        Ok(())
    }

    /// `Registered -> Unregistering`. Hands back the identity so the
    /// caller can notify the host; the registration no longer holds it.
    pub fn begin_unregister(&mut self) -> Result<WorkerIdentity, CoreError> {
        let next = self.state.transition(RegistrationState::Unregistering)?;
        let identity = self.identity.take().ok_or_else(|| {
            CoreError::Validation("registered state without an identity".to_string())
        })?;
        self.state = next;
        Ok(identity)
    }

    /// `Unregistering -> Unregistered`.
    pub fn finish_unregister(&mut self) -> Result<(), CoreError> {
        self.state = self.state.transition(RegistrationState::Unregistered)?;
        Ok(())
    }
}
