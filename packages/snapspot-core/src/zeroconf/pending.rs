//! In-flight credential submission slot.
//!
//! Holds the username of the `addUser` request currently being processed.
//! A second submission for the same username is refused while the first is
//! in flight. The slot is released by [`PendingGuard`] on every exit path.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Error returned when the username already occupies the slot.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PendingError {
    #[error("A credential submission for {0} is already in progress")]
    Occupied(String),
}

#[derive(Debug)]
struct Occupant {
    username: String,
    generation: u64,
}

#[derive(Debug, Default)]
struct Slot {
    occupant: Option<Occupant>,
    next_generation: u64,
}

/// Single-slot tracker for the in-flight `addUser` username.
#[derive(Debug, Default)]
pub struct PendingConnection {
    slot: Mutex<Slot>,
}

impl PendingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the slot for `username`.
    ///
    /// A different occupant is displaced; its guard will no longer clear the
    /// slot when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`PendingError::Occupied`] if `username` already holds the slot.
    pub fn try_acquire(self: &Arc<Self>, username: &str) -> Result<PendingGuard, PendingError> {
        let mut slot = self.slot.lock();

        if let Some(current) = &slot.occupant {
            if current.username == username {
                return Err(PendingError::Occupied(username.to_string()));
            }
            log::debug!(
                "[Zeroconf] Pending submission for {} displaced by {}",
                current.username,
                username
            );
        }

        let generation = slot.next_generation;
        slot.next_generation += 1;
        slot.occupant = Some(Occupant {
            username: username.to_string(),
            generation,
        });

        Ok(PendingGuard {
            owner: Arc::clone(self),
            generation,
        })
    }

    /// Returns the username currently in flight, if any.
    pub fn current(&self) -> Option<String> {
        self.slot
            .lock()
            .occupant
            .as_ref()
            .map(|o| o.username.clone())
    }

    fn release(&self, generation: u64) {
        let mut slot = self.slot.lock();
        if slot
            .occupant
            .as_ref()
            .is_some_and(|o| o.generation == generation)
        {
            slot.occupant = None;
        }
    }
}

/// RAII guard that clears the slot when dropped.
#[derive(Debug)]
pub struct PendingGuard {
    owner: Arc<PendingConnection>,
    generation: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.owner.release(self.generation);
    }
}
