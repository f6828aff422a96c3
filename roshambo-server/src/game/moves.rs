//! Move Values
//!
//! The three legal moves and their canonical wire spelling.
//! Input is case-insensitive; everything stored or sent is lowercase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A move a participant can submit for a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

/// Raw input that is not one of the three moves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid move '{0}': expected rock, paper or scissors")]
pub struct InvalidMove(pub String);

impl Move {
    /// Every move, in declaration order.
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Parse raw client input. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Move, InvalidMove> {
        let canonical = raw.trim().to_ascii_lowercase();
        match canonical.as_str() {
            "rock" => Ok(Move::Rock),
            "paper" => Ok(Move::Paper),
            "scissors" => Ok(Move::Scissors),
            _ => Err(InvalidMove(raw.to_string())),
        }
    }

    /// Canonical lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Move::Rock => "rock",
            Move::Paper => "paper",
            Move::Scissors => "scissors",
        }
    }

    /// The move this one defeats.
    #[inline]
    pub const fn dominates(self) -> Move {
        match self {
            Move::Rock => Move::Scissors,
            Move::Scissors => Move::Paper,
            Move::Paper => Move::Rock,
        }
    }

    /// Check if this move beats `other`.
    #[inline]
    pub fn beats(self, other: Move) -> bool {
        self.dominates() == other
    }
}

impl FromStr for Move {
    type Err = InvalidMove;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Move::parse(s)
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
