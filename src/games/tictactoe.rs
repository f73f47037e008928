//! 3×3 grid game.
//!
//! Cells are addressed row-major: `row = idx / 3`, `col = idx % 3`.
//! X moves first. Win detection checks rows, then columns, then the
//! main diagonal, then the anti-diagonal.

use super::{Game, GameError, GameKind, GameStatus, Mark, Move, PlayOutcome};
use crate::state::PlayerId;

pub const SIZE: usize = 3;
pub const CELLS: i64 = 9;

type Board = [[Mark; SIZE]; SIZE];

#[derive(Debug, Clone)]
pub struct TicTacToe {
    board: Board,
    turn: Mark,
    status: GameStatus,
    x: PlayerId,
    o: PlayerId,
}

impl TicTacToe {
    /// `players[0]` plays X, `players[1]` plays O.
    #[must_use]
    pub fn new(players: [PlayerId; 2]) -> Self {
        let [x, o] = players;
        Self { board: [[Mark::Empty; SIZE]; SIZE], turn: Mark::X, status: GameStatus::InProgress, x, o }
    }

    #[must_use]
    pub fn turn(&self) -> Mark {
        self.turn
    }

    /// Mark at a cell index, `None` when out of range.
    #[must_use]
    pub fn cell(&self, idx: usize) -> Option<Mark> {
        self.board.get(idx / SIZE).and_then(|row| row.get(idx % SIZE)).copied()
    }

    fn is_full(&self) -> bool {
        self.board.iter().flatten().all(|m| m.is_player())
    }
}

/// First uniform non-empty line, checked rows → columns → diagonals.
fn find_winner(b: &Board) -> Option<Mark> {
    let line = |cells: [(usize, usize); 3]| {
        let first = b[cells[0].0][cells[0].1];
        (first.is_player() && cells.iter().all(|&(r, c)| b[r][c] == first)).then_some(first)
    };

    (0..SIZE)
        .find_map(|r| line([(r, 0), (r, 1), (r, 2)]))
        .or_else(|| (0..SIZE).find_map(|c| line([(0, c), (1, c), (2, c)])))
        .or_else(|| line([(0, 0), (1, 1), (2, 2)]))
        .or_else(|| line([(0, 2), (1, 1), (2, 0)]))
}

impl Game for TicTacToe {
    fn kind(&self) -> GameKind {
        GameKind::TicTacToe
    }

    fn play(&mut self, player: &PlayerId, mv: Move) -> Result<PlayOutcome, GameError> {
        if self.status != GameStatus::InProgress {
            return Err(GameError::GameEnded);
        }

        let mark = self.participant_mark(player);

        if !(0..CELLS).contains(&mv.0) {
            return Err(GameError::InvalidMove(mv));
        }
        if !mark.is_player() {
            return Err(GameError::InvalidTile);
        }
        if mark != self.turn {
            return Err(GameError::WrongTurn(mark));
        }

        // In range, checked above.
        let idx = usize::try_from(mv.0).map_err(|_| GameError::InvalidMove(mv))?;
        let (row, col) = (idx / SIZE, idx % SIZE);
        if self.board[row][col].is_player() {
            return Err(GameError::CellOccupied);
        }

        self.board[row][col] = mark;

        if let Some(winner) = find_winner(&self.board) {
            self.status = GameStatus::Won(winner);
            return Ok(PlayOutcome::Won(winner));
        }
        if self.is_full() {
            self.status = GameStatus::Draw;
            return Ok(PlayOutcome::Draw);
        }

        self.turn = mark.opposite();
        Ok(PlayOutcome::Continue { next: self.turn })
    }

    fn status(&self) -> GameStatus {
        self.status
    }

    fn participants(&self) -> [PlayerId; 2] {
        [self.x, self.o]
    }

    fn participant_mark(&self, player: &PlayerId) -> Mark {
        if *player == self.x {
            Mark::X
        } else if *player == self.o {
            Mark::O
        } else {
            Mark::Empty
        }
    }
}

#[cfg(test)]
#[path = "tictactoe_test.rs"]
mod tests;
