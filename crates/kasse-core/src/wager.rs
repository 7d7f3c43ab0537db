//! # Wager Game
//!
//! The optional post-purchase game: three-in-a-line on a 3×3 board, patron
//! against a fixed house strategy. Patron moves first.
//!
//! ## Board Layout
//! ```text
//!      0 │ 1 │ 2
//!     ───┼───┼───
//!      3 │ 4 │ 5
//!     ───┼───┼───
//!      6 │ 7 │ 8
//! ```
//!
//! ## House Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Complete a line of its own          (first such cell by index)      │
//! │  2. Block the patron's completing cell  (first such cell by index)      │
//! │  3. Take the center                                                     │
//! │  4. Take a free corner                  (uniformly at random)           │
//! │  5. Take any free cell                  (uniformly at random)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Outcomes are reported from the patron's side: `Win` refunds the purchase,
//! `Lose` charges it once more, `Draw` changes nothing.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

const CENTER: usize = 4;
const CORNERS: [usize; 4] = [0, 2, 6, 8];

/// Number of cells on the board.
pub const CELLS: usize = 9;

// =============================================================================
// Board
// =============================================================================

/// Which side occupies a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mark {
    Patron,
    House,
}

impl Mark {
    pub const fn opponent(&self) -> Mark {
        match self {
            Mark::Patron => Mark::House,
            Mark::House => Mark::Patron,
        }
    }
}

/// Result of a finished game, from the patron's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Lose,
    Draw,
}

/// A 3×3 board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Board {
    cells: [Option<Mark>; CELLS],
}

impl Board {
    pub fn new() -> Self {
        Board::default()
    }

    /// Builds a board from a 9-character picture: `X` patron, `O` house,
    /// anything else empty.
    pub fn from_picture(picture: &str) -> Self {
        let mut board = Board::new();
        for (i, c) in picture.chars().filter(|c| !c.is_whitespace()).take(CELLS).enumerate() {
            board.cells[i] = match c {
                'X' => Some(Mark::Patron),
                'O' => Some(Mark::House),
                _ => None,
            };
        }
        board
    }

    /// Mark at `cell`, `None` when empty or out of range.
    pub fn get(&self, cell: usize) -> Option<Mark> {
        self.cells.get(cell).copied().flatten()
    }

    /// Whether `cell` is on the board and empty.
    pub fn is_free(&self, cell: usize) -> bool {
        cell < CELLS && self.cells[cell].is_none()
    }

    /// Indices of all empty cells, ascending.
    pub fn free_cells(&self) -> Vec<usize> {
        (0..CELLS).filter(|&c| self.cells[c].is_none()).collect()
    }

    /// Places `mark` on `cell`.
    pub fn place(&mut self, cell: usize, mark: Mark) -> CoreResult<()> {
        if !self.is_free(cell) {
            return Err(CoreError::CellUnavailable { cell });
        }
        self.cells[cell] = Some(mark);
        Ok(())
    }

    /// The side holding a complete line, if any.
    pub fn winner(&self) -> Option<Mark> {
        LINES.iter().find_map(|line| {
            let first = self.cells[line[0]]?;
            line.iter()
                .all(|&c| self.cells[c] == Some(first))
                .then_some(first)
        })
    }

    pub fn is_full(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }

    /// Outcome once the game is over, `None` while moves remain.
    pub fn outcome(&self) -> Option<Outcome> {
        match self.winner() {
            Some(Mark::Patron) => Some(Outcome::Win),
            Some(Mark::House) => Some(Outcome::Lose),
            None if self.is_full() => Some(Outcome::Draw),
            None => None,
        }
    }

    /// First free cell that would complete a line for `mark`.
    fn completing_cell(&self, mark: Mark) -> Option<usize> {
        (0..CELLS).find(|&cell| {
            self.is_free(cell)
                && LINES.iter().any(|line| {
                    line.contains(&cell)
                        && line
                            .iter()
                            .filter(|&&c| c != cell)
                            .all(|&c| self.cells[c] == Some(mark))
                })
        })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..3 {
            let cells: Vec<String> = (0..3)
                .map(|col| {
                    let i = row * 3 + col;
                    match self.cells[i] {
                        Some(Mark::Patron) => "X".to_string(),
                        Some(Mark::House) => "O".to_string(),
                        None => i.to_string(),
                    }
                })
                .collect();
            writeln!(f, " {} ", cells.join(" | "))?;
        }
        Ok(())
    }
}

// =============================================================================
// House Strategy
// =============================================================================

/// Chooses the house's next cell, `None` on a full board.
pub fn house_move<R: Rng + ?Sized>(board: &Board, rng: &mut R) -> Option<usize> {
    if let Some(cell) = board.completing_cell(Mark::House) {
        return Some(cell);
    }
    if let Some(cell) = board.completing_cell(Mark::Patron) {
        return Some(cell);
    }
    if board.is_free(CENTER) {
        return Some(CENTER);
    }

    let corners: Vec<usize> = CORNERS.iter().copied().filter(|&c| board.is_free(c)).collect();
    if let Some(&corner) = corners.choose(rng) {
        return Some(corner);
    }

    board.free_cells().choose(rng).copied()
}

// =============================================================================
// Game
// =============================================================================

/// Where a game stands after a patron move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    /// Waiting for the patron's next move; carries the house reply, if any.
    InProgress { house_cell: Option<usize> },
    /// Finished; carries the house reply that ended it, if any.
    Finished { outcome: Outcome, house_cell: Option<usize> },
}

/// A running wager game.
#[derive(Debug, Clone, Default)]
pub struct WagerGame {
    board: Board,
}

impl WagerGame {
    pub fn new() -> Self {
        WagerGame::default()
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Plays the patron's move on `cell`, then the house reply.
    ///
    /// ## Returns
    /// * `Ok(GameState::InProgress { .. })` - patron moves again
    /// * `Ok(GameState::Finished { .. })` - settle with the outcome
    /// * `Err(CoreError::CellUnavailable)` - occupied or out-of-range cell
    /// * `Err(CoreError::GameOver)` - the game already ended
    pub fn play<R: Rng + ?Sized>(&mut self, cell: usize, rng: &mut R) -> CoreResult<GameState> {
        if self.board.outcome().is_some() {
            return Err(CoreError::GameOver);
        }

        self.board.place(cell, Mark::Patron)?;
        if let Some(outcome) = self.board.outcome() {
            return Ok(GameState::Finished {
                outcome,
                house_cell: None,
            });
        }

        let house_cell = house_move(&self.board, rng);
        if let Some(reply) = house_cell {
            self.board.place(reply, Mark::House)?;
        }

        Ok(match self.board.outcome() {
            Some(outcome) => GameState::Finished { outcome, house_cell },
            None => GameState::InProgress { house_cell },
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
