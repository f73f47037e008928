//! Game engines: the turn-validation / terminal-detection contract.
//!
//! DESIGN
//! ======
//! The orchestrator only ever talks to `dyn Game`. Engines report their
//! `GameKind` tag, so adding a game means adding a `GameKind` variant and
//! an engine module; orchestrator logic is untouched.
//!
//! A move that decides the game is not an error: `play` returns
//! `PlayOutcome::Won` / `PlayOutcome::Draw` and the caller broadcasts.
//! `GameError::GameEnded` is only returned for plays against a game that
//! was already decided.

pub mod tictactoe;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::{ErrorCode, ErrorKind};
use crate::state::PlayerId;

// =============================================================================
// MARK
// =============================================================================

/// Owner of a board cell. `Empty` is never a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Mark {
    #[default]
    #[serde(rename = "")]
    Empty,
    X,
    O,
}

impl Mark {
    /// The other participant's mark. `Empty` has no opposite.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::X => Self::O,
            Self::O => Self::X,
            Self::Empty => Self::Empty,
        }
    }

    /// True for marks a participant can hold.
    #[must_use]
    pub fn is_player(self) -> bool {
        !matches!(self, Self::Empty)
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str(" "),
            Self::X => f.write_str("X"),
            Self::O => f.write_str("O"),
        }
    }
}

// =============================================================================
// MOVE
// =============================================================================

/// Target cell index as sent by the client. Range is checked by the engine,
/// not at decode time, so out-of-range values surface as `InvalidMove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Move(pub i64);

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// ERRORS / OUTCOMES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("game ended")]
    GameEnded,
    #[error("invalid move: {0}")]
    InvalidMove(Move),
    #[error("invalid tile")]
    InvalidTile,
    #[error("this is not {0} turn")]
    WrongTurn(Mark),
    #[error("a tile already placed")]
    CellOccupied,
    #[error("player is not in this game")]
    NotParticipant,
}

impl ErrorCode for GameError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::GameEnded => "E_GAME_ENDED",
            Self::InvalidMove(_) => "E_INVALID_MOVE",
            Self::InvalidTile => "E_INVALID_TILE",
            Self::WrongTurn(_) => "E_WRONG_TURN",
            Self::CellOccupied => "E_CELL_OCCUPIED",
            Self::NotParticipant => "E_NOT_PARTICIPANT",
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMove(_) | Self::InvalidTile => ErrorKind::Validation,
            Self::GameEnded | Self::WrongTurn(_) | Self::CellOccupied => ErrorKind::StateConflict,
            Self::NotParticipant => ErrorKind::NotFound,
        }
    }
}

/// Result of an accepted move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Move applied, game continues with `next` to play.
    Continue { next: Mark },
    /// Move applied and decided the game.
    Won(Mark),
    /// Move applied and filled the board without a winner.
    Draw,
}

/// Lifecycle position of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    InProgress,
    Won(Mark),
    Draw,
}

// =============================================================================
// CONTRACT
// =============================================================================

/// A two-player perfect-information game.
pub trait Game: Send + Sync {
    /// Tag identifying the engine implementation.
    fn kind(&self) -> GameKind;

    /// Validate and apply a move by `player`.
    ///
    /// # Errors
    ///
    /// `GameEnded` when the game is already decided, `InvalidMove` /
    /// `InvalidTile` for malformed input, `WrongTurn` / `CellOccupied` for
    /// moves that conflict with the current position. The board is never
    /// modified when an error is returned.
    fn play(&mut self, player: &PlayerId, mv: Move) -> Result<PlayOutcome, GameError>;

    fn status(&self) -> GameStatus;

    /// Winning mark, `None` while undecided or drawn.
    fn winner(&self) -> Option<Mark> {
        match self.status() {
            GameStatus::Won(mark) => Some(mark),
            GameStatus::InProgress | GameStatus::Draw => None,
        }
    }

    /// Participants in mark order (first mover first).
    fn participants(&self) -> [PlayerId; 2];

    /// Mark held by `player`, `Mark::Empty` for strangers.
    fn participant_mark(&self, player: &PlayerId) -> Mark;

    fn contains(&self, player: &PlayerId) -> bool {
        self.participant_mark(player).is_player()
    }

    /// Mark awarded the win when `player` abandons. Does not touch the board.
    ///
    /// # Errors
    ///
    /// Returns `NotParticipant` if `player` is not in this game.
    fn exit(&self, player: &PlayerId) -> Result<Mark, GameError> {
        let mark = self.participant_mark(player);
        if !mark.is_player() {
            return Err(GameError::NotParticipant);
        }
        Ok(mark.opposite())
    }
}

/// Registered game engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameKind {
    #[default]
    TicTacToe,
}

impl GameKind {
    /// Build a fresh engine. `players[0]` receives the first-moving mark.
    #[must_use]
    pub fn create(self, players: [PlayerId; 2]) -> Box<dyn Game> {
        match self {
            Self::TicTacToe => Box::new(tictactoe::TicTacToe::new(players)),
        }
    }
}
