//! Session state machine.
//!
//! ```text
//! Unauthenticated -> AwaitingPassword -> Unlocked -> (Loading | Saving) -> Unlocked
//!        ^                                   |
//!        +------ logout / decrypt failure ---+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of the sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No server session and no password.
    Unauthenticated,
    /// Server session exists; the encryption password has not been given.
    AwaitingPassword,
    /// Password held; ready to load or save.
    Unlocked,
    /// A load is in flight.
    Loading,
    /// A save is in flight.
    Saving,
}

impl SessionState {
    /// Whether the session holds a password.
    pub fn is_unlocked(&self) -> bool {
        matches!(
            self,
            SessionState::Unlocked | SessionState::Loading | SessionState::Saving
        )
    }

    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (self, next) {
            // Reset is always allowed.
            (_, Unauthenticated) => true,
            (Unauthenticated, AwaitingPassword) => true,
            // Local stores have no server session to establish.
            (Unauthenticated | AwaitingPassword, Unlocked) => true,
            (Unlocked, Loading | Saving) => true,
            (Loading | Saving, Unlocked) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::AwaitingPassword => "awaiting password",
            SessionState::Unlocked => "unlocked",
            SessionState::Loading => "loading",
            SessionState::Saving => "saving",
        };
        f.write_str(name)
    }
}
