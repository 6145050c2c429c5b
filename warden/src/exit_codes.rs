//! Stable exit codes for the `warden` CLI.

use crate::core::types::SessionState;

/// The request was satisfied.
pub const OK: i32 = 0;
/// Invalid configuration, arguments, backend failure or other errors.
pub const INVALID: i32 = 1;
/// The turn budget ran out.
pub const MAX_TURNS: i32 = 2;
/// Too many consecutive turns without progress.
pub const MAX_STALLS: i32 = 3;
/// A participant said the termination phrase.
pub const TERMINATED: i32 = 4;
/// A file access escaped the confinement root.
pub const SECURITY_VIOLATION: i32 = 5;
/// Interrupted before completion.
pub const CANCELLED: i32 = 6;

pub fn for_state(state: SessionState) -> i32 {
    match state {
        SessionState::TerminatedSuccess => OK,
        SessionState::TerminatedMaxTurns => MAX_TURNS,
        SessionState::TerminatedMaxStalls => MAX_STALLS,
        SessionState::TerminatedPhrase => TERMINATED,
        SessionState::TerminatedSecurityViolation => SECURITY_VIOLATION,
        SessionState::TerminatedCancelled => CANCELLED,
        SessionState::Running | SessionState::Stalled => INVALID,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_terminal_state_has_a_distinct_code() {
        let states = [
            SessionState::TerminatedSuccess,
            SessionState::TerminatedMaxTurns,
            SessionState::TerminatedMaxStalls,
            SessionState::TerminatedPhrase,
            SessionState::TerminatedSecurityViolation,
            SessionState::TerminatedCancelled,
        ];
        let mut codes: Vec<i32> = states.iter().map(|s| for_state(*s)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes, vec![0, 2, 3, 4, 5, 6]);
    }
}
