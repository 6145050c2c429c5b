//! Shared deterministic types for orchestration core logic.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of sensitive action a participant may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    CodeExecution,
    WebAccess,
    FileAccess,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::CodeExecution => "code execution",
            Capability::WebAccess => "web access",
            Capability::FileAccess => "file access",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static metadata describing one team member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSpec {
    /// Unique name the ledger uses to address this participant.
    pub name: String,
    /// Rendered into the team roster.
    pub description: String,
    /// Sensitive action categories this participant performs. Each one
    /// requires a human gate when oversight is enabled.
    pub capabilities: Vec<Capability>,
    /// Set for human approvers: the category this participant signs off on.
    pub approves: Option<Capability>,
    /// True for human-controlled participants.
    pub human: bool,
}

impl ParticipantSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            approves: None,
            human: false,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// A human participant without approval duties.
    pub fn human(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            human: true,
            ..Self::new(name, description)
        }
    }

    /// A human participant that approves actions of one category.
    pub fn approver(
        name: impl Into<String>,
        description: impl Into<String>,
        capability: Capability,
    ) -> Self {
        Self {
            approves: Some(capability),
            ..Self::human(name, description)
        }
    }
}

/// Ordered, name-unique set of participants.
///
/// Order is the roster order shown to the decision backend; it does not
/// decide who speaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    members: Vec<ParticipantSpec>,
}

impl Team {
    /// Build a team, rejecting empty rosters, blank names and duplicates.
    pub fn new(members: Vec<ParticipantSpec>) -> Result<Self, String> {
        if members.is_empty() {
            return Err("team must have at least one participant".to_string());
        }
        let mut seen = HashSet::new();
        for member in &members {
            if member.name.trim().is_empty() {
                return Err("participant name must not be empty".to_string());
            }
            if !seen.insert(member.name.as_str()) {
                return Err(format!("duplicate participant name '{}'", member.name));
            }
        }
        Ok(Self { members })
    }

    pub fn members(&self) -> &[ParticipantSpec] {
        &self.members
    }

    pub fn names(&self) -> Vec<&str> {
        self.members.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ParticipantSpec> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// First approver registered for `capability`, in roster order.
    pub fn approver_for(&self, capability: Capability) -> Option<&ParticipantSpec> {
        self.members
            .iter()
            .find(|m| m.approves == Some(capability))
    }

    /// `name: description` per line, in roster order.
    pub fn roster(&self) -> String {
        self.members
            .iter()
            .map(|m| format!("{}: {}", m.name, m.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One judged field of the progress ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAnswer<T> {
    pub reason: String,
    pub answer: T,
}

/// Structured per-turn judgement produced by the decision backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    pub is_request_satisfied: LedgerAnswer<bool>,
    pub is_in_loop: LedgerAnswer<bool>,
    pub is_progress_being_made: LedgerAnswer<bool>,
    pub next_speaker: LedgerAnswer<String>,
    pub instruction_or_question: LedgerAnswer<String>,
}

impl Ledger {
    /// True when the ledger reports a loop or a lack of progress.
    pub fn signals_stall(&self) -> bool {
        self.is_in_loop.answer || !self.is_progress_being_made.answer
    }
}

/// Orchestration state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    Stalled,
    TerminatedSuccess,
    TerminatedMaxTurns,
    TerminatedMaxStalls,
    TerminatedPhrase,
    TerminatedCancelled,
    TerminatedSecurityViolation,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Running | SessionState::Stalled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Running => "running",
            SessionState::Stalled => "stalled",
            SessionState::TerminatedSuccess => "terminated_success",
            SessionState::TerminatedMaxTurns => "terminated_max_turns",
            SessionState::TerminatedMaxStalls => "terminated_max_stalls",
            SessionState::TerminatedPhrase => "terminated_phrase",
            SessionState::TerminatedCancelled => "terminated_cancelled",
            SessionState::TerminatedSecurityViolation => "terminated_security_violation",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The approval turn most recently inserted ahead of a gated participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGate {
    pub approver: String,
    pub participant: String,
    pub instruction: String,
}

/// Mutable turn bookkeeping owned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnState {
    /// Completed loop iterations (monotonic).
    pub turn_count: u32,
    /// Consecutive non-progress turns.
    pub stall_count: u32,
    pub state: SessionState,
    /// Who replied on the previous completed turn.
    pub last_speaker: Option<String>,
    pub pending_gate: Option<PendingGate>,
}

impl Default for TurnState {
    fn default() -> Self {
        Self {
            turn_count: 0,
            stall_count: 0,
            state: SessionState::Running,
            last_speaker: None,
            pending_gate: None,
        }
    }
}

/// One entry of the shared conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub source: String,
    pub content: String,
}

impl Message {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
        }
    }
}
