// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the relay controller.

/// Controller lifecycle state.
///
/// Use [`super::Controller::state()`] to check the current state or
/// [`super::Controller::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Just created, not yet running
    Initializing,
    /// Informer running, waiting for the initial listing
    Syncing,
    /// Workers relaying records
    Ready,
    /// Shutdown requested, finishing queued work
    Draining,
    /// All tasks joined
    Stopped,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Ready => write!(f, "Ready"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}
