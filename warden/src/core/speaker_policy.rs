//! Human-approval gate applied to the ledger's next-speaker choice.
//!
//! When oversight is enabled, a participant tagged with a sensitive capability
//! is never dispatched without an immediately preceding turn from the human
//! approver for that capability, taken for that same participant. Participants
//! without sensitive capabilities (and the humans themselves) are never
//! redirected.

use crate::core::types::{Capability, PendingGate, Team};

/// The participant whose turn was replaced by an approval turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedAction {
    pub participant: String,
    pub capability: Capability,
}

/// Actual speaker for a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub speaker: String,
    /// Set when the proposed speaker was replaced by an approver.
    pub gated: Option<GatedAction>,
}

impl Resolution {
    fn unchanged(proposed: &str) -> Self {
        Self {
            speaker: proposed.to_string(),
            gated: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeakerPolicy {
    oversight: bool,
}

impl SpeakerPolicy {
    pub fn new(oversight: bool) -> Self {
        Self { oversight }
    }

    /// Resolve the speaker for this turn.
    ///
    /// The first capability of `proposed` that has an approver on the team
    /// decides the gate. The gate is skipped only when that approver spoke on
    /// the previous turn in answer to an approval request for `proposed`
    /// (`pending`); any other approver turn does not count.
    pub fn resolve(
        &self,
        team: &Team,
        proposed: &str,
        previous: Option<&str>,
        pending: Option<&PendingGate>,
    ) -> Resolution {
        if !self.oversight {
            return Resolution::unchanged(proposed);
        }
        let Some(spec) = team.get(proposed) else {
            return Resolution::unchanged(proposed);
        };
        if spec.human {
            return Resolution::unchanged(proposed);
        }

        let gate = spec
            .capabilities
            .iter()
            .find_map(|&cap| team.approver_for(cap).map(|approver| (cap, approver)));
        let Some((capability, approver)) = gate else {
            return Resolution::unchanged(proposed);
        };
        let approved = pending.is_some_and(|gate| {
            gate.approver == approver.name && gate.participant == proposed
        });
        if approved && previous == Some(approver.name.as_str()) {
            return Resolution::unchanged(proposed);
        }

        Resolution {
            speaker: approver.name.clone(),
            gated: Some(GatedAction {
                participant: proposed.to_string(),
                capability,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ParticipantSpec;

    fn pending(approver: &str, participant: &str) -> PendingGate {
        PendingGate {
            approver: approver.to_string(),
            participant: participant.to_string(),
            instruction: "Run the script.".to_string(),
        }
    }

    fn secured_team() -> Team {
        Team::new(vec![
            ParticipantSpec::new("FileSurfer", "reads files")
                .with_capability(Capability::FileAccess),
            ParticipantSpec::new("WebSurfer", "browses").with_capability(Capability::WebAccess),
            ParticipantSpec::new("Coder", "writes code"),
            ParticipantSpec::new("Executor", "runs code")
                .with_capability(Capability::CodeExecution),
            ParticipantSpec::approver(
                "UserCodeApprover",
                "approves code",
                Capability::CodeExecution,
            ),
            ParticipantSpec::approver("UserFileApprover", "approves files", Capability::FileAccess),
            ParticipantSpec::approver("UserWebApprover", "approves web", Capability::WebAccess),
            ParticipantSpec::human("UserGeneral", "general human"),
        ])
        .expect("team")
    }

    #[test]
    fn gated_participant_is_redirected_to_its_approver() {
        let policy = SpeakerPolicy::new(true);
        let resolution = policy.resolve(&secured_team(), "Executor", Some("Coder"), None);
        assert_eq!(resolution.speaker, "UserCodeApprover");
        assert_eq!(
            resolution.gated,
            Some(GatedAction {
                participant: "Executor".to_string(),
                capability: Capability::CodeExecution,
            })
        );
    }

    #[test]
    fn each_capability_maps_to_its_own_approver() {
        let policy = SpeakerPolicy::new(true);
        let team = secured_team();
        assert_eq!(
            policy.resolve(&team, "FileSurfer", None, None).speaker,
            "UserFileApprover"
        );
        assert_eq!(
            policy.resolve(&team, "WebSurfer", None, None).speaker,
            "UserWebApprover"
        );
    }

    #[test]
    fn approved_action_proceeds_after_approver_turn() {
        let policy = SpeakerPolicy::new(true);
        let resolution = policy.resolve(
            &secured_team(),
            "Executor",
            Some("UserCodeApprover"),
            Some(&pending("UserCodeApprover", "Executor")),
        );
        assert_eq!(resolution, Resolution::unchanged("Executor"));
    }

    #[test]
    fn another_approvers_turn_does_not_satisfy_the_gate() {
        let policy = SpeakerPolicy::new(true);
        let resolution = policy.resolve(
            &secured_team(),
            "Executor",
            Some("UserFileApprover"),
            Some(&pending("UserFileApprover", "FileSurfer")),
        );
        assert_eq!(resolution.speaker, "UserCodeApprover");
    }

    #[test]
    fn approver_turn_about_something_else_does_not_satisfy_the_gate() {
        let policy = SpeakerPolicy::new(true);
        let team = secured_team();
        // Asked a general question, no approval request pending.
        let unrelated = policy.resolve(&team, "Executor", Some("UserCodeApprover"), None);
        assert_eq!(unrelated.speaker, "UserCodeApprover");
        assert!(unrelated.gated.is_some());

        let other_participant = pending("UserCodeApprover", "Coder");
        let resolution = policy.resolve(
            &team,
            "Executor",
            Some("UserCodeApprover"),
            Some(&other_participant),
        );
        assert_eq!(resolution.speaker, "UserCodeApprover");
    }

    #[test]
    fn pending_gate_without_approver_turn_does_not_satisfy_the_gate() {
        let policy = SpeakerPolicy::new(true);
        let gate = pending("UserCodeApprover", "Executor");
        let resolution = policy.resolve(&secured_team(), "Executor", Some("Coder"), Some(&gate));
        assert_eq!(resolution.speaker, "UserCodeApprover");
    }

    #[test]
    fn general_participants_are_never_redirected() {
        let policy = SpeakerPolicy::new(true);
        let team = secured_team();
        assert_eq!(policy.resolve(&team, "Coder", None, None), Resolution::unchanged("Coder"));
        assert_eq!(
            policy.resolve(&team, "UserGeneral", None, None),
            Resolution::unchanged("UserGeneral")
        );
        assert_eq!(
            policy.resolve(&team, "UserCodeApprover", Some("UserCodeApprover"), None),
            Resolution::unchanged("UserCodeApprover")
        );
    }

    #[test]
    fn disabled_oversight_passes_proposal_through() {
        let policy = SpeakerPolicy::new(false);
        assert_eq!(
            policy.resolve(&secured_team(), "Executor", None, None),
            Resolution::unchanged("Executor")
        );
    }

    #[test]
    fn missing_approver_leaves_proposal_unchanged() {
        let team = Team::new(vec![
            ParticipantSpec::new("Executor", "runs code")
                .with_capability(Capability::CodeExecution),
            ParticipantSpec::human("UserGeneral", "general human"),
        ])
        .expect("team");
        let policy = SpeakerPolicy::new(true);
        assert_eq!(
            policy.resolve(&team, "Executor", None, None),
            Resolution::unchanged("Executor")
        );
    }
}
