//! Outcome Resolution
//!
//! Pure comparison of two moves. No session state involved.

use serde::{Deserialize, Serialize};

use crate::game::moves::Move;

/// Result of comparing move A against move B.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Identical moves.
    Draw,
    /// The first move wins.
    AWins,
    /// The second move wins.
    BWins,
}

/// Compare two moves using rock > scissors > paper > rock.
pub fn resolve_outcome(move_a: Move, move_b: Move) -> Outcome {
    if move_a == move_b {
        Outcome::Draw
    } else if move_a.beats(move_b) {
        Outcome::AWins
    } else {
        Outcome::BWins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_move() -> impl Strategy<Value = Move> {
        prop_oneof![Just(Move::Rock), Just(Move::Paper), Just(Move::Scissors)]
    }

    #[test]
    fn test_dominance_rules() {
        assert_eq!(resolve_outcome(Move::Rock, Move::Scissors), Outcome::AWins);
        assert_eq!(resolve_outcome(Move::Scissors, Move::Paper), Outcome::AWins);
        assert_eq!(resolve_outcome(Move::Paper, Move::Rock), Outcome::AWins);

        assert_eq!(resolve_outcome(Move::Scissors, Move::Rock), Outcome::BWins);
        assert_eq!(resolve_outcome(Move::Paper, Move::Scissors), Outcome::BWins);
        assert_eq!(resolve_outcome(Move::Rock, Move::Paper), Outcome::BWins);
    }

    #[test]
    fn test_full_table() {
        let mut a_wins = 0;
        let mut b_wins = 0;
        let mut draws = 0;
        for a in Move::ALL {
            for b in Move::ALL {
                match resolve_outcome(a, b) {
                    Outcome::AWins => a_wins += 1,
                    Outcome::BWins => b_wins += 1,
                    Outcome::Draw => draws += 1,
                }
            }
        }
        assert_eq!((a_wins, b_wins, draws), (3, 3, 3));
    }

    proptest! {
        #[test]
        fn prop_same_move_draws(mv in any_move()) {
            prop_assert_eq!(resolve_outcome(mv, mv), Outcome::Draw);
        }

        #[test]
        fn prop_swapping_sides_mirrors(a in any_move(), b in any_move()) {
            let mirrored = match resolve_outcome(a, b) {
                Outcome::Draw => Outcome::Draw,
                Outcome::AWins => Outcome::BWins,
                Outcome::BWins => Outcome::AWins,
            };
            prop_assert_eq!(resolve_outcome(b, a), mirrored);
        }

        #[test]
        fn prop_winner_only_via_dominance(a in any_move(), b in any_move()) {
            match resolve_outcome(a, b) {
                Outcome::Draw => prop_assert_eq!(a, b),
                Outcome::AWins => prop_assert_eq!(a.dominates(), b),
                Outcome::BWins => prop_assert_eq!(b.dominates(), a),
            }
        }
    }
}
