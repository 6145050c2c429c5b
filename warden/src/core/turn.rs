//! Pure per-turn transitions of the orchestration state machine.
//!
//! The orchestrator performs I/O (ledger requests, dispatch) and feeds the
//! results through these functions, which own every rule about turn and
//! stall accounting.

use crate::core::speaker_policy::Resolution;
use crate::core::types::{Ledger, PendingGate, SessionState, TurnState};

/// Limits that end a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnLimits {
    pub max_turns: u32,
    pub max_stalls: u32,
}

/// Reduced view of one turn's judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Judgement {
    pub satisfied: bool,
    pub stalled: bool,
}

impl Judgement {
    /// `repeated` is the local loop detector's verdict for this turn.
    pub fn from_ledger(ledger: &Ledger, repeated: bool) -> Self {
        Self {
            satisfied: ledger.is_request_satisfied.answer,
            stalled: ledger.signals_stall() || repeated,
        }
    }

    /// Mark the turn as non-progress, e.g. when it repeats an approval gate.
    pub fn with_stall(self, stalled: bool) -> Self {
        Self {
            stalled: self.stalled || stalled,
            ..self
        }
    }

    /// A turn without a usable ledger.
    pub fn invalid() -> Self {
        Self {
            satisfied: false,
            stalled: true,
        }
    }
}

/// Check the turn budget before any work for the next turn starts.
pub fn check_turn_budget(state: &mut TurnState, limits: &TurnLimits) -> Option<SessionState> {
    if state.turn_count >= limits.max_turns {
        return Some(terminate(state, SessionState::TerminatedMaxTurns));
    }
    None
}

/// Apply a judgement: success wins over everything, otherwise update the
/// stall counter and enforce `max_stalls`.
pub fn apply_judgement(
    state: &mut TurnState,
    judgement: Judgement,
    limits: &TurnLimits,
) -> Option<SessionState> {
    if judgement.satisfied {
        return Some(terminate(state, SessionState::TerminatedSuccess));
    }
    record_stall(state, judgement.stalled);
    check_stalls(state, limits)
}

/// True if dispatching to `speaker` would re-run the approval turn that was
/// inserted on the previous turn for the same instruction.
pub fn is_repeated_gate(state: &TurnState, speaker: &str, instruction: &str) -> bool {
    let Some(gate) = &state.pending_gate else {
        return false;
    };
    gate.approver == speaker
        && gate.instruction == instruction
        && state.last_speaker.as_deref() == Some(speaker)
}

/// Track the pending approval after the speaker for this turn is resolved.
pub fn record_gate(state: &mut TurnState, resolution: &Resolution, instruction: &str) {
    if let Some(gated) = &resolution.gated {
        state.pending_gate = Some(PendingGate {
            approver: resolution.speaker.clone(),
            participant: gated.participant.clone(),
            instruction: instruction.to_string(),
        });
        return;
    }
    let keep = state
        .pending_gate
        .as_ref()
        .is_some_and(|gate| gate.approver == resolution.speaker);
    if !keep {
        state.pending_gate = None;
    }
}

/// Close a completed loop iteration.
pub fn complete_turn(state: &mut TurnState, speaker: &str) {
    state.last_speaker = Some(speaker.to_string());
    state.turn_count += 1;
}

/// Close an iteration whose speaker failed to act. The turn counts, but
/// nobody is recorded as the previous speaker and a pending approval lapses,
/// so a failed approver turn never unlocks the gated participant.
pub fn complete_failed_turn(state: &mut TurnState) {
    state.last_speaker = None;
    state.pending_gate = None;
    state.turn_count += 1;
}

pub fn terminate(state: &mut TurnState, terminal: SessionState) -> SessionState {
    state.state = terminal;
    terminal
}

fn record_stall(state: &mut TurnState, stalled: bool) {
    if stalled {
        state.stall_count += 1;
        state.state = SessionState::Stalled;
    } else {
        state.stall_count = 0;
        state.state = SessionState::Running;
    }
}

fn check_stalls(state: &mut TurnState, limits: &TurnLimits) -> Option<SessionState> {
    if state.stall_count >= limits.max_stalls {
        return Some(terminate(state, SessionState::TerminatedMaxStalls));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::speaker_policy::GatedAction;
    use crate::core::types::{Capability, LedgerAnswer};

    const LIMITS: TurnLimits = TurnLimits {
        max_turns: 5,
        max_stalls: 3,
    };

    fn ledger(satisfied: bool, in_loop: bool, progress: bool) -> Ledger {
        Ledger {
            is_request_satisfied: LedgerAnswer {
                reason: "r".to_string(),
                answer: satisfied,
            },
            is_in_loop: LedgerAnswer {
                reason: "r".to_string(),
                answer: in_loop,
            },
            is_progress_being_made: LedgerAnswer {
                reason: "r".to_string(),
                answer: progress,
            },
            next_speaker: LedgerAnswer {
                reason: "r".to_string(),
                answer: "Coder".to_string(),
            },
            instruction_or_question: LedgerAnswer {
                reason: "r".to_string(),
                answer: "go".to_string(),
            },
        }
    }

    #[test]
    fn satisfied_terminates_regardless_of_other_fields() {
        let mut state = TurnState {
            stall_count: 2,
            ..TurnState::default()
        };
        let judgement = Judgement::from_ledger(&ledger(true, true, false), true);
        assert_eq!(
            apply_judgement(&mut state, judgement, &LIMITS),
            Some(SessionState::TerminatedSuccess)
        );
        assert_eq!(state.state, SessionState::TerminatedSuccess);
    }

    #[test]
    fn third_consecutive_stall_hits_max_stalls() {
        let mut state = TurnState::default();
        let judgement = Judgement::from_ledger(&ledger(false, false, false), false);
        assert_eq!(apply_judgement(&mut state, judgement, &LIMITS), None);
        assert_eq!(state.state, SessionState::Stalled);
        assert_eq!(apply_judgement(&mut state, judgement, &LIMITS), None);
        assert_eq!(
            apply_judgement(&mut state, judgement, &LIMITS),
            Some(SessionState::TerminatedMaxStalls)
        );
        assert_eq!(state.stall_count, 3);
    }

    #[test]
    fn progress_resets_stall_count() {
        let mut state = TurnState::default();
        let stalled = Judgement::from_ledger(&ledger(false, true, true), false);
        let progressing = Judgement::from_ledger(&ledger(false, false, true), false);
        apply_judgement(&mut state, stalled, &LIMITS);
        apply_judgement(&mut state, stalled, &LIMITS);
        assert_eq!(state.stall_count, 2);
        assert_eq!(apply_judgement(&mut state, progressing, &LIMITS), None);
        assert_eq!(state.stall_count, 0);
        assert_eq!(state.state, SessionState::Running);
    }

    #[test]
    fn local_repeat_counts_as_stall() {
        let judgement = Judgement::from_ledger(&ledger(false, false, true), true);
        assert!(judgement.stalled);
    }

    #[test]
    fn turn_budget_is_checked_before_work() {
        let mut state = TurnState::default();
        for speaker in ["Coder", "Coder", "Coder", "Coder", "Coder"] {
            assert_eq!(check_turn_budget(&mut state, &LIMITS), None);
            complete_turn(&mut state, speaker);
        }
        assert_eq!(state.turn_count, 5);
        assert_eq!(
            check_turn_budget(&mut state, &LIMITS),
            Some(SessionState::TerminatedMaxTurns)
        );
    }

    #[test]
    fn repeated_gate_requires_same_approver_and_instruction() {
        let mut state = TurnState::default();
        let gated = Resolution {
            speaker: "UserCodeApprover".to_string(),
            gated: Some(GatedAction {
                participant: "Executor".to_string(),
                capability: Capability::CodeExecution,
            }),
        };
        record_gate(&mut state, &gated, "run the script");
        complete_turn(&mut state, "UserCodeApprover");

        assert!(is_repeated_gate(&state, "UserCodeApprover", "run the script"));
        assert!(!is_repeated_gate(&state, "UserCodeApprover", "run another script"));
        assert!(!is_repeated_gate(&state, "UserFileApprover", "run the script"));
    }

    #[test]
    fn gate_is_cleared_once_another_speaker_acts() {
        let mut state = TurnState::default();
        let gated = Resolution {
            speaker: "UserCodeApprover".to_string(),
            gated: Some(GatedAction {
                participant: "Executor".to_string(),
                capability: Capability::CodeExecution,
            }),
        };
        record_gate(&mut state, &gated, "run it");
        let approver_again = Resolution {
            speaker: "UserCodeApprover".to_string(),
            gated: None,
        };
        record_gate(&mut state, &approver_again, "run it");
        assert!(state.pending_gate.is_some());

        let executor = Resolution {
            speaker: "Executor".to_string(),
            gated: None,
        };
        record_gate(&mut state, &executor, "run it");
        assert!(state.pending_gate.is_none());
    }

    #[test]
    fn repeated_gate_stall_overrides_claimed_progress() {
        let mut state = TurnState {
            stall_count: 2,
            ..TurnState::default()
        };
        let judgement = Judgement::from_ledger(&ledger(false, false, true), false).with_stall(true);
        assert_eq!(
            apply_judgement(&mut state, judgement, &LIMITS),
            Some(SessionState::TerminatedMaxStalls)
        );
    }

    #[test]
    fn failed_approver_turn_clears_gate_and_previous_speaker() {
        let mut state = TurnState::default();
        let gated = Resolution {
            speaker: "UserCodeApprover".to_string(),
            gated: Some(GatedAction {
                participant: "Executor".to_string(),
                capability: Capability::CodeExecution,
            }),
        };
        record_gate(&mut state, &gated, "run it");
        complete_failed_turn(&mut state);

        assert_eq!(state.turn_count, 1);
        assert_eq!(state.last_speaker, None);
        assert_eq!(state.pending_gate, None);
    }
}
