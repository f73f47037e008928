//! Wait queue: FIFO holding area for players seeking an opponent.
//!
//! Owned by the hub task, so no interior locking. Linear scans are fine at
//! the population a single hub serves.

use std::collections::VecDeque;

use crate::frame::{ErrorCode, ErrorKind};
use crate::state::PlayerId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("already in the waiting list")]
    AlreadyQueued(PlayerId),
    #[error("empty list")]
    Empty,
    #[error("player not found")]
    NotFound(PlayerId),
}

impl ErrorCode for QueueError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::AlreadyQueued(_) => "E_ALREADY_QUEUED",
            Self::Empty => "E_QUEUE_EMPTY",
            Self::NotFound(_) => "E_NOT_QUEUED",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyQueued(_) => ErrorKind::StateConflict,
            Self::Empty | Self::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Duplicate-free, insertion-ordered queue of waiting players.
#[derive(Debug, Default)]
pub struct WaitQueue {
    entries: VecDeque<PlayerId>,
}

impl WaitQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `player` to the tail.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyQueued` if `player` is already waiting.
    pub fn add(&mut self, player: PlayerId) -> Result<(), QueueError> {
        if self.contains(&player) {
            return Err(QueueError::AlreadyQueued(player));
        }
        self.entries.push_back(player);
        Ok(())
    }

    /// Remove and return the longest-waiting player.
    ///
    /// # Errors
    ///
    /// Returns `Empty` if nobody is waiting.
    pub fn pop(&mut self) -> Result<PlayerId, QueueError> {
        self.entries.pop_front().ok_or(QueueError::Empty)
    }

    /// Remove `player` wherever it sits.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `player` is not waiting.
    pub fn remove(&mut self, player: &PlayerId) -> Result<(), QueueError> {
        let Some(pos) = self.entries.iter().position(|p| p == player) else {
            return Err(QueueError::NotFound(*player));
        };
        self.entries.remove(pos);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, player: &PlayerId) -> bool {
        self.entries.contains(player)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
#[path = "wait_queue_test.rs"]
mod tests;
