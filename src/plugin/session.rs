//! Game session state
//!
//! The host pushes snapshots of the world here; the "only in session" gate
//! reads them on every tick.

use super::types::SessionStateProvider;
use crate::core::error::{CleanerError, Result};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Location id of the player's safe zone
pub const HIDEOUT_LOCATION: &str = "hideout";

/// What the host knows about the current game world
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Whether a game world is loaded at all
    pub world_loaded: bool,
    /// Location of the main player, if one is spawned
    pub main_player_location: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot of a loaded world with the player at `location`
    pub fn in_location(location: impl Into<String>) -> Self {
        Self {
            world_loaded: true,
            main_player_location: Some(location.into()),
        }
    }

    /// Whether the player is in a session outside the hideout
    pub fn is_active(&self) -> bool {
        match (&self.main_player_location, self.world_loaded) {
            (Some(location), true) => !location.eq_ignore_ascii_case(HIDEOUT_LOCATION),
            _ => false,
        }
    }
}

/// Session snapshot shared between the host and the gate
#[derive(Debug, Default)]
pub struct SharedSessionState {
    snapshot: RwLock<SessionSnapshot>,
}

impl SharedSessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot
    pub fn update(&self, snapshot: SessionSnapshot) -> Result<()> {
        let mut current = self.snapshot.write().map_err(|e| {
            CleanerError::GateEvaluationError(format!("Failed to acquire session lock: {}", e))
        })?;

        if *current != snapshot {
            tracing::debug!(
                world_loaded = snapshot.world_loaded,
                location = ?snapshot.main_player_location,
                active = snapshot.is_active(),
                "Session state updated"
            );
        }
        *current = snapshot;
        Ok(())
    }

    /// Forget the world, e.g. when returning to the main menu
    pub fn clear(&self) -> Result<()> {
        self.update(SessionSnapshot::default())
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        let current = self.snapshot.read().map_err(|e| {
            CleanerError::GateEvaluationError(format!("Failed to acquire session lock: {}", e))
        })?;
        Ok(current.clone())
    }
}

impl SessionStateProvider for SharedSessionState {
    fn is_in_active_session(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_active())
    }
}
