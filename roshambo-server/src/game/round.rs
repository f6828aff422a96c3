//! Room Round State
//!
//! Per-room record of submitted moves, the computed result and the
//! acknowledgment set. Pure and synchronous: callers provide the locking
//! (see `network::session`), this type only enforces the round rules.
//!
//! ```text
//!   EMPTY ──submit──▶ ONE_SUBMITTED ──submit(other)──▶ RESOLVED
//!     ▲                   │  ▲                            │
//!     │                   └──┘ submit(same): overwrite    │
//!     └──────────── both participants acknowledge ────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::moves::{InvalidMove, Move};
use crate::game::outcome::{resolve_outcome, Outcome};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Room code, allocated by the room directory.
pub type RoomId = String;

/// Opaque participant identifier issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for logs and placeholder names.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// =============================================================================
// ROUND TYPES
// =============================================================================

/// Where a room is in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// No moves recorded.
    Empty,
    /// One participant has moved.
    OneSubmitted,
    /// Both moves recorded and the result computed.
    Resolved,
}

/// A recorded move. `seq` orders submissions across the room's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedMove {
    /// Who submitted.
    pub participant: ParticipantId,
    /// Latest move from this participant.
    pub mv: Move,
    /// Sequence number of the participant's first submission this round.
    pub seq: u64,
}

/// A move revealed alongside the submitter's display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealedMove {
    /// Who submitted.
    pub participant: ParticipantId,
    /// Display name cached for this round.
    pub name: String,
    /// The move.
    pub mv: Move,
}

/// Computed result of a round. `first` is player one (earliest submission).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundResult {
    /// 1-based round number within the room.
    pub round: u64,
    /// Player one.
    pub first: RevealedMove,
    /// Player two.
    pub second: RevealedMove,
    /// `AWins` means `first` won.
    pub outcome: Outcome,
}

/// Client-facing form of a result: moves keyed by display name, and the
/// winner's name or `"draw"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundReport {
    /// Display name to move.
    pub moves: BTreeMap<String, Move>,
    /// Winner's display name, or `"draw"`.
    pub winner: String,
}

/// Label used for a drawn round.
pub const DRAW_LABEL: &str = "draw";

impl RoundResult {
    /// The winning side, if any.
    pub fn winner(&self) -> Option<&RevealedMove> {
        match self.outcome {
            Outcome::Draw => None,
            Outcome::AWins => Some(&self.first),
            Outcome::BWins => Some(&self.second),
        }
    }

    /// Check if a participant played this round.
    pub fn involves(&self, participant: &ParticipantId) -> bool {
        self.first.participant == *participant || self.second.participant == *participant
    }

    /// Display labels for both sides. Identical names get the id appended so
    /// the report map never collapses two players into one key.
    fn labels(&self) -> (String, String) {
        if self.first.name == self.second.name {
            (
                format!("{} ({})", self.first.name, self.first.participant.short()),
                format!("{} ({})", self.second.name, self.second.participant.short()),
            )
        } else {
            (self.first.name.clone(), self.second.name.clone())
        }
    }

    /// Build the client-facing report.
    pub fn report(&self) -> RoundReport {
        let (first_label, second_label) = self.labels();
        let winner = match self.outcome {
            Outcome::Draw => DRAW_LABEL.to_string(),
            Outcome::AWins => first_label.clone(),
            Outcome::BWins => second_label.clone(),
        };

        let mut moves = BTreeMap::new();
        moves.insert(first_label, self.first.mv);
        moves.insert(second_label, self.second.mv);

        RoundReport { moves, winner }
    }
}

/// What a successful submission did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Distinct participants with a move recorded (1 or 2).
    pub moves_count: usize,
    /// The submitter already had a move this round and it was overwritten.
    pub replaced: bool,
    /// Present exactly when this submission completed the round.
    pub result: Option<RoundResult>,
}

/// What an acknowledgment did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Nothing to acknowledge, unknown participant, or a repeat.
    Ignored,
    /// Recorded; the other participant has not acknowledged yet.
    Recorded {
        /// The participant still to acknowledge.
        waiting_on: ParticipantId,
    },
    /// Both acknowledged; the room is back to `Empty`.
    Reset {
        /// The round that just finished.
        completed_round: u64,
    },
}

/// Consistent snapshot of a room for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomStatus {
    /// Room code.
    pub room_id: RoomId,
    /// Current round number (1-based).
    pub round: u64,
    /// Current phase.
    pub phase: RoundPhase,
    /// Number of moves recorded.
    pub moves_count: usize,
    /// Display names of participants who have moved. Moves stay hidden
    /// until the round resolves.
    pub submitted: Vec<String>,
    /// Result, once resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RoundReport>,
    /// Display names of participants who have acknowledged the result.
    pub acknowledged: Vec<String>,
}

/// Round errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Move value is not rock, paper or scissors.
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),

    /// Round is resolved and still waiting for acknowledgments.
    #[error("room {room} has a resolved round awaiting acknowledgment")]
    SessionBusy {
        /// Room that rejected the submission.
        room: RoomId,
    },
}

// =============================================================================
// ROOM SESSION
// =============================================================================

/// Everything that belongs to one round. Replaced wholesale on reset.
#[derive(Debug, Default)]
struct Round {
    /// At most two entries, in first-submission order.
    moves: Vec<SubmittedMove>,
    /// Display names, written once per participant per round.
    names: BTreeMap<ParticipantId, String>,
    result: Option<RoundResult>,
    acknowledged: BTreeSet<ParticipantId>,
}

/// Round state for a single room.
#[derive(Debug)]
pub struct RoomSession {
    room_id: RoomId,
    round: Round,
    rounds_completed: u64,
    next_seq: u64,
}

impl RoomSession {
    /// Create an empty room session.
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        Self {
            room_id: room_id.into(),
            round: Round::default(),
            rounds_completed: 0,
            next_seq: 0,
        }
    }

    /// Room code.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Current phase.
    pub fn phase(&self) -> RoundPhase {
        if self.round.result.is_some() {
            RoundPhase::Resolved
        } else if self.round.moves.is_empty() {
            RoundPhase::Empty
        } else {
            RoundPhase::OneSubmitted
        }
    }

    /// Number of moves recorded this round.
    pub fn moves_count(&self) -> usize {
        self.round.moves.len()
    }

    /// 1-based number of the round in progress.
    pub fn round_number(&self) -> u64 {
        self.rounds_completed + 1
    }

    /// Number of rounds that have been fully acknowledged.
    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Recorded moves in submission order.
    pub fn moves(&self) -> &[SubmittedMove] {
        &self.round.moves
    }

    /// Current result, if resolved.
    pub fn result(&self) -> Option<&RoundResult> {
        self.round.result.as_ref()
    }

    /// Display name cached for this round.
    pub fn cached_name(&self, participant: &ParticipantId) -> Option<&str> {
        self.round.names.get(participant).map(String::as_str)
    }

    /// Record a move.
    ///
    /// Rejected with `InvalidMove` for unknown values and `SessionBusy` while a
    /// resolved round is unacknowledged; neither changes any state. A repeat
    /// submission before the round resolves overwrites the earlier move and
    /// keeps the participant's position. The submission that records the
    /// second distinct move resolves the round before returning.
    pub fn submit_move(
        &mut self,
        participant: &ParticipantId,
        display_name: &str,
        raw_move: &str,
    ) -> Result<SubmitReceipt, SessionError> {
        let mv = Move::parse(raw_move)?;

        if self.round.result.is_some() {
            return Err(SessionError::SessionBusy {
                room: self.room_id.clone(),
            });
        }

        let replaced = match self
            .round
            .moves
            .iter_mut()
            .find(|m| m.participant == *participant)
        {
            Some(existing) => {
                existing.mv = mv;
                true
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.round.moves.push(SubmittedMove {
                    participant: participant.clone(),
                    mv,
                    seq,
                });
                false
            }
        };

        self.round
            .names
            .entry(participant.clone())
            .or_insert_with(|| display_name.to_string());

        let result = if self.round.moves.len() == 2 {
            self.resolve()
        } else {
            None
        };

        Ok(SubmitReceipt {
            moves_count: self.round.moves.len(),
            replaced,
            result,
        })
    }

    /// Compute the result once both moves are in.
    ///
    /// Idempotent: returns the stored result if already computed. `None`
    /// while fewer than two moves are recorded.
    pub fn resolve(&mut self) -> Option<RoundResult> {
        if let Some(result) = &self.round.result {
            return Some(result.clone());
        }

        let [first, second] = self.round.moves.as_slice() else {
            return None;
        };

        let result = RoundResult {
            round: self.round_number(),
            first: self.reveal(first),
            second: self.reveal(second),
            outcome: resolve_outcome(first.mv, second.mv),
        };
        self.round.result = Some(result.clone());
        Some(result)
    }

    fn reveal(&self, submitted: &SubmittedMove) -> RevealedMove {
        RevealedMove {
            participant: submitted.participant.clone(),
            name: self
                .round
                .names
                .get(&submitted.participant)
                .cloned()
                .unwrap_or_else(|| submitted.participant.to_string()),
            mv: submitted.mv,
        }
    }

    /// Acknowledge the current result. Once both players of the round have
    /// acknowledged, the whole round record is replaced with an empty one.
    pub fn acknowledge(&mut self, participant: &ParticipantId) -> AckOutcome {
        let Some(result) = &self.round.result else {
            return AckOutcome::Ignored;
        };

        if !result.involves(participant) {
            return AckOutcome::Ignored;
        }

        let other = if result.first.participant == *participant {
            result.second.participant.clone()
        } else {
            result.first.participant.clone()
        };

        if !self.round.acknowledged.insert(participant.clone()) {
            return AckOutcome::Ignored;
        }

        if self.round.acknowledged.contains(&other) {
            let completed_round = self.round_number();
            self.round = Round::default();
            self.rounds_completed += 1;
            AckOutcome::Reset { completed_round }
        } else {
            AckOutcome::Recorded { waiting_on: other }
        }
    }

    /// Snapshot for status queries.
    pub fn status(&self) -> RoomStatus {
        let name_of = |p: &ParticipantId| {
            self.round
                .names
                .get(p)
                .cloned()
                .unwrap_or_else(|| p.to_string())
        };

        RoomStatus {
            room_id: self.room_id.clone(),
            round: self.round_number(),
            phase: self.phase(),
            moves_count: self.round.moves.len(),
            submitted: self.round.moves.iter().map(|m| name_of(&m.participant)).collect(),
            result: self.round.result.as_ref().map(RoundResult::report),
            acknowledged: self.round.acknowledged.iter().map(name_of).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn alice() -> ParticipantId {
        ParticipantId::new("user-alice")
    }

    fn bob() -> ParticipantId {
        ParticipantId::new("user-bob")
    }

    fn carol() -> ParticipantId {
        ParticipantId::new("user-carol")
    }

    fn create_test_session() -> RoomSession {
        RoomSession::new("ABC12")
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = create_test_session();
        assert_eq!(session.phase(), RoundPhase::Empty);
        assert_eq!(session.moves_count(), 0);
        assert_eq!(session.round_number(), 1);
        assert!(session.result().is_none());
    }

    #[test]
    fn test_rock_beats_scissors_scenario() {
        let mut session = create_test_session();

        let first = session.submit_move(&alice(), "Alice", "Rock").unwrap();
        assert_eq!(first.moves_count, 1);
        assert!(first.result.is_none());
        assert_eq!(session.phase(), RoundPhase::OneSubmitted);

        let second = session.submit_move(&bob(), "Bob", "scissors").unwrap();
        assert_eq!(second.moves_count, 2);
        let result = second.result.expect("second move resolves the round");
        assert_eq!(session.phase(), RoundPhase::Resolved);

        assert_eq!(result.outcome, Outcome::AWins);
        assert_eq!(result.winner().unwrap().participant, alice());

        let report = result.report();
        assert_eq!(report.winner, "Alice");
        assert_eq!(report.moves.get("Alice"), Some(&Move::Rock));
        assert_eq!(report.moves.get("Bob"), Some(&Move::Scissors));

        assert!(matches!(session.acknowledge(&alice()), AckOutcome::Recorded { .. }));
        assert_eq!(session.acknowledge(&bob()), AckOutcome::Reset { completed_round: 1 });
        assert_eq!(session.phase(), RoundPhase::Empty);
        assert_eq!(session.status().result, None);
    }

    #[test]
    fn test_repeat_submission_overwrites() {
        let mut session = create_test_session();

        session.submit_move(&alice(), "Alice", "paper").unwrap();
        let again = session.submit_move(&alice(), "Alice", "paper").unwrap();

        assert!(again.replaced);
        assert_eq!(again.moves_count, 1);
        assert!(again.result.is_none());
        assert_eq!(session.phase(), RoundPhase::OneSubmitted);

        session.submit_move(&alice(), "Alice", "rock").unwrap();
        assert_eq!(session.moves()[0].mv, Move::Rock);
    }

    #[test]
    fn test_overwrite_keeps_player_one() {
        let mut session = create_test_session();

        session.submit_move(&alice(), "Alice", "rock").unwrap();
        session.submit_move(&alice(), "Alice", "paper").unwrap();
        let result = session.submit_move(&bob(), "Bob", "rock").unwrap().result.unwrap();

        assert_eq!(result.first.participant, alice());
        assert_eq!(result.first.mv, Move::Paper);
        assert_eq!(result.outcome, Outcome::AWins);
    }

    #[test]
    fn test_invalid_move_changes_nothing() {
        let mut session = create_test_session();

        let err = session.submit_move(&alice(), "Alice", "lizard").unwrap_err();
        assert!(matches!(err, SessionError::InvalidMove(_)));
        assert_eq!(session.phase(), RoundPhase::Empty);
        assert!(session.cached_name(&alice()).is_none());

        session.submit_move(&bob(), "Bob", "paper").unwrap();
        assert_eq!(session.moves_count(), 1);
    }

    #[test]
    fn test_submission_while_resolved_is_busy() {
        let mut session = create_test_session();
        session.submit_move(&alice(), "Alice", "rock").unwrap();
        let result = session.submit_move(&bob(), "Bob", "paper").unwrap().result.unwrap();

        for (who, name) in [(alice(), "Alice"), (bob(), "Bob"), (carol(), "Carol")] {
            let err = session.submit_move(&who, name, "scissors").unwrap_err();
            assert!(matches!(err, SessionError::SessionBusy { .. }));
        }

        // Still busy after only one acknowledgment.
        session.acknowledge(&alice());
        assert!(session.submit_move(&alice(), "Alice", "rock").is_err());

        assert_eq!(session.result(), Some(&result));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut session = create_test_session();
        assert!(session.resolve().is_none());

        session.submit_move(&alice(), "Alice", "paper").unwrap();
        assert!(session.resolve().is_none());

        session.submit_move(&bob(), "Bob", "paper").unwrap();
        let once = session.resolve().unwrap();
        let twice = session.resolve().unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.report().winner, DRAW_LABEL);
    }

    #[test]
    fn test_acknowledge_edge_cases() {
        let mut session = create_test_session();

        // Nothing to acknowledge yet.
        assert_eq!(session.acknowledge(&alice()), AckOutcome::Ignored);

        session.submit_move(&alice(), "Alice", "rock").unwrap();
        assert_eq!(session.acknowledge(&alice()), AckOutcome::Ignored);

        session.submit_move(&bob(), "Bob", "paper").unwrap();

        // Outsiders are ignored.
        assert_eq!(session.acknowledge(&carol()), AckOutcome::Ignored);

        assert_eq!(
            session.acknowledge(&bob()),
            AckOutcome::Recorded { waiting_on: alice() }
        );
        // Repeat is a no-op.
        assert_eq!(session.acknowledge(&bob()), AckOutcome::Ignored);
        assert_eq!(session.phase(), RoundPhase::Resolved);

        assert_eq!(session.acknowledge(&alice()), AckOutcome::Reset { completed_round: 1 });

        // Late acknowledgment after reset is a no-op.
        assert_eq!(session.acknowledge(&alice()), AckOutcome::Ignored);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut session = create_test_session();
        session.submit_move(&alice(), "Alice", "rock").unwrap();
        session.submit_move(&bob(), "Bob", "scissors").unwrap();
        session.acknowledge(&alice());
        session.acknowledge(&bob());

        assert_eq!(session.moves_count(), 0);
        assert!(session.result().is_none());
        assert!(session.cached_name(&alice()).is_none());
        assert_eq!(session.rounds_completed(), 1);
        assert_eq!(session.round_number(), 2);

        let status = session.status();
        assert!(status.submitted.is_empty());
        assert!(status.acknowledged.is_empty());

        // Fresh round; a new pairing is allowed.
        let receipt = session.submit_move(&carol(), "Carol", "paper").unwrap();
        assert_eq!(receipt.moves_count, 1);
        assert!(!receipt.replaced);
        let result = session.submit_move(&bob(), "Bob", "rock").unwrap().result.unwrap();
        assert_eq!(result.round, 2);
        assert_eq!(result.first.participant, carol());
    }

    #[test]
    fn test_display_name_read_once_per_round() {
        let mut session = create_test_session();
        session.submit_move(&alice(), "Alice", "rock").unwrap();
        session.submit_move(&alice(), "Renamed", "paper").unwrap();
        assert_eq!(session.cached_name(&alice()), Some("Alice"));
    }

    #[test]
    fn test_status_hides_moves_until_resolved() {
        let mut session = create_test_session();
        session.submit_move(&alice(), "Alice", "rock").unwrap();

        let status = session.status();
        assert_eq!(status.phase, RoundPhase::OneSubmitted);
        assert_eq!(status.submitted, vec!["Alice".to_string()]);
        assert!(status.result.is_none());
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("rock"));
    }

    #[test]
    fn test_report_disambiguates_equal_names() {
        let mut session = create_test_session();
        session.submit_move(&alice(), "Sam", "rock").unwrap();
        let result = session.submit_move(&bob(), "Sam", "paper").unwrap().result.unwrap();

        let report = result.report();
        assert_eq!(report.moves.len(), 2);
        assert_eq!(report.winner, "Sam (user-bob)");
    }

    #[test]
    fn test_participant_short() {
        assert_eq!(ParticipantId::new("0123456789abcdef").short(), "01234567");
        assert_eq!(ParticipantId::new("abc").short(), "abc");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Submit(usize, &'static str),
        Ack(usize),
    }

    fn any_op() -> impl Strategy<Value = Op> {
        let raw = prop_oneof![
            Just("rock"),
            Just("Paper"),
            Just("SCISSORS"),
            Just("lizard"),
        ];
        prop_oneof![
            (0..3usize, raw).prop_map(|(who, mv)| Op::Submit(who, mv)),
            (0..3usize).prop_map(Op::Ack),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_invariants_hold(ops in proptest::collection::vec(any_op(), 1..60)) {
            let people = [alice(), bob(), carol()];
            let mut session = create_test_session();
            let mut last_result: Option<RoundResult> = None;

            for op in ops {
                let phase_before = session.phase();
                match op {
                    Op::Submit(who, raw) => {
                        let outcome = session.submit_move(&people[who], "name", raw);
                        if phase_before == RoundPhase::Resolved && Move::parse(raw).is_ok() {
                            prop_assert!(
                                matches!(outcome, Err(SessionError::SessionBusy { .. })),
                                "submission while resolved must be busy"
                            );
                            prop_assert_eq!(session.result().cloned(), last_result.clone());
                        }
                    }
                    Op::Ack(who) => {
                        if let AckOutcome::Reset { .. } = session.acknowledge(&people[who]) {
                            prop_assert_eq!(session.moves_count(), 0);
                            last_result = None;
                        }
                    }
                }

                prop_assert!(session.moves_count() <= 2);
                prop_assert_eq!(session.result().is_some(), session.moves_count() == 2);

                if let Some(result) = session.result() {
                    if let Some(previous) = &last_result {
                        prop_assert_eq!(previous, result);
                    }
                    last_result = Some(result.clone());
                }
            }
        }
    }
}
