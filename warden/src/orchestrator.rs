//! Turn-by-turn orchestration of a team toward one task.
//!
//! Each turn: check cancellation and the turn budget, evaluate the progress
//! ledger, update stall accounting, resolve the speaker through the approval
//! gate, dispatch the instruction, then check the reply for the termination
//! phrase. All state transitions go through `core::turn`; this module only
//! adds I/O and error classification.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::core::loop_detector::LoopDetector;
use crate::core::speaker_policy::SpeakerPolicy;
use crate::core::termination::TerminationMatcher;
use crate::core::turn::{
    Judgement, TurnLimits, apply_judgement, check_turn_budget, complete_failed_turn, complete_turn,
    is_repeated_gate, record_gate, terminate,
};
use crate::core::types::{Message, SessionState, Team, TurnState};
use crate::error::SessionError;
use crate::io::prompt::PromptEngine;
use crate::ledger::{LedgerEvaluator, LedgerRequest};
use crate::participants::{Participant, TurnRequest};

/// Source name of the task message.
pub const USER_SOURCE: &str = "user";
/// Source name of orchestrator instructions in the transcript.
pub const ORCHESTRATOR_SOURCE: &str = "Orchestrator";

/// Turn-loop settings.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub limits: TurnLimits,
    pub human_oversight: bool,
    /// Set when replies containing the phrase end the session.
    pub termination: Option<TerminationMatcher>,
    /// Set to enable the local repetition detector.
    pub loop_detector: Option<LoopDetector>,
}

/// The path and instruction behind a security termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityViolation {
    pub participant: String,
    pub path: PathBuf,
    pub message: String,
    pub instruction: String,
}

/// Final report of one session.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub turns: u32,
    pub stalls: u32,
    pub final_answer: Option<String>,
    pub violation: Option<SecurityViolation>,
    pub transcript: Vec<Message>,
}

pub struct Orchestrator {
    team: Team,
    participants: Vec<Box<dyn Participant>>,
    ledger: LedgerEvaluator,
    prompts: Arc<PromptEngine>,
    policy: SpeakerPolicy,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
}

enum Dispatch {
    Reply(String),
    /// The participant errored; the text is its reply in the transcript.
    Failed(String),
    Cancelled,
    Violation(SecurityViolation, String),
}

impl Orchestrator {
    pub fn new(
        participants: Vec<Box<dyn Participant>>,
        ledger: LedgerEvaluator,
        prompts: Arc<PromptEngine>,
        settings: OrchestratorSettings,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let team = Team::new(participants.iter().map(|p| p.spec().clone()).collect())
            .map_err(|err| anyhow!(err))
            .context("build team")?;
        Ok(Self {
            team,
            participants,
            ledger,
            prompts,
            policy: SpeakerPolicy::new(settings.human_oversight),
            settings,
            cancel,
        })
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    /// Run the session to a terminal state.
    ///
    /// `on_message` sees every transcript entry as it is appended. Backend
    /// failures during ledger evaluation end the run with `Err`; every other
    /// ending is reported through [`SessionOutcome::state`].
    #[instrument(
        skip_all,
        fields(
            max_turns = self.settings.limits.max_turns,
            max_stalls = self.settings.limits.max_stalls
        )
    )]
    pub async fn run(
        &mut self,
        task: &str,
        mut on_message: impl FnMut(&Message),
    ) -> Result<SessionOutcome> {
        let limits = self.settings.limits;
        let cancel = self.cancel.clone();
        let mut state = TurnState::default();
        let mut transcript = vec![Message::new(USER_SOURCE, task)];
        on_message(&transcript[0]);
        let mut final_answer = None;
        let mut violation = None;

        loop {
            if cancel.is_cancelled() {
                terminate(&mut state, SessionState::TerminatedCancelled);
                break;
            }
            if check_turn_budget(&mut state, &limits).is_some() {
                break;
            }
            debug!(turn = state.turn_count, stalls = state.stall_count, "turn started");

            let request = LedgerRequest {
                task,
                team: &self.team,
                transcript: &transcript,
            };
            let evaluated = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.ledger.evaluate(&request) => Some(result),
            };
            let Some(evaluated) = evaluated else {
                terminate(&mut state, SessionState::TerminatedCancelled);
                break;
            };
            let ledger = match evaluated {
                Ok(ledger) => ledger,
                Err(err) => match err.downcast_ref::<SessionError>() {
                    Some(session_err) if session_err.is_recoverable() => {
                        warn!(err = %session_err, "no usable ledger, counting a stall");
                        if apply_judgement(&mut state, Judgement::invalid(), &limits).is_some() {
                            break;
                        }
                        state.turn_count += 1;
                        continue;
                    }
                    _ => return Err(err.context("evaluate progress ledger")),
                },
            };

            let proposed = ledger.next_speaker.answer.as_str();
            let instruction = ledger.instruction_or_question.answer.clone();
            let resolution = self.policy.resolve(
                &self.team,
                proposed,
                state.last_speaker.as_deref(),
                state.pending_gate.as_ref(),
            );
            let repeated_gate = is_repeated_gate(&state, &resolution.speaker, &instruction);
            let repeated = self
                .settings
                .loop_detector
                .as_mut()
                .is_some_and(|detector| detector.observe(proposed, &instruction));
            if repeated_gate || repeated {
                debug!(repeated_gate, repeated, "repetition detected");
            }

            let judgement = Judgement::from_ledger(&ledger, repeated).with_stall(repeated_gate);
            if let Some(terminal) = apply_judgement(&mut state, judgement, &limits) {
                if terminal == SessionState::TerminatedSuccess {
                    final_answer = self.final_answer(task, &transcript, &cancel).await;
                }
                break;
            }
            record_gate(&mut state, &resolution, &instruction);

            let speaker = resolution.speaker.clone();
            let dispatched = match &resolution.gated {
                Some(gated) => {
                    info!(
                        participant = %gated.participant,
                        approver = %speaker,
                        "approval required"
                    );
                    self.prompts.render_approval_request(
                        &gated.participant,
                        gated.capability,
                        &instruction,
                    )?
                }
                None => instruction.clone(),
            };
            let directive = Message::new(ORCHESTRATOR_SOURCE, format!("({speaker}) {dispatched}"));
            on_message(&directive);
            transcript.push(directive);

            match self
                .dispatch(task, &speaker, &dispatched, &instruction, &transcript, &cancel)
                .await?
            {
                Dispatch::Cancelled => {
                    terminate(&mut state, SessionState::TerminatedCancelled);
                    break;
                }
                Dispatch::Violation(details, reply) => {
                    let message = Message::new(speaker.as_str(), reply);
                    on_message(&message);
                    transcript.push(message);
                    violation = Some(details);
                    terminate(&mut state, SessionState::TerminatedSecurityViolation);
                    break;
                }
                Dispatch::Reply(reply) => {
                    let message = Message::new(speaker.as_str(), reply);
                    on_message(&message);
                    let said_phrase = self
                        .settings
                        .termination
                        .as_ref()
                        .is_some_and(|matcher| matcher.matches(&message.content));
                    transcript.push(message);
                    if said_phrase {
                        info!(speaker = %speaker, "termination phrase received");
                        terminate(&mut state, SessionState::TerminatedPhrase);
                        break;
                    }
                    complete_turn(&mut state, &speaker);
                }
                Dispatch::Failed(reply) => {
                    let message = Message::new(speaker.as_str(), reply);
                    on_message(&message);
                    transcript.push(message);
                    complete_failed_turn(&mut state);
                }
            }
        }

        info!(
            state = %state.state,
            turns = state.turn_count,
            stalls = state.stall_count,
            "session finished"
        );
        Ok(SessionOutcome {
            state: state.state,
            turns: state.turn_count,
            stalls: state.stall_count,
            final_answer,
            violation,
            transcript,
        })
    }

    async fn dispatch(
        &mut self,
        task: &str,
        speaker: &str,
        dispatched: &str,
        instruction: &str,
        transcript: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Dispatch> {
        let participant = self
            .participants
            .iter_mut()
            .find(|p| p.spec().name == speaker)
            .ok_or_else(|| anyhow!("no participant named '{speaker}'"))?;
        let request = TurnRequest {
            task,
            instruction: dispatched,
            transcript,
            cancel,
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(Dispatch::Cancelled),
            result = participant.respond(&request) => result,
        };

        let err = match result {
            Ok(reply) => return Ok(Dispatch::Reply(reply)),
            Err(err) => err,
        };
        match err.downcast_ref::<SessionError>() {
            Some(SessionError::SecurityViolation { path, message }) => {
                warn!(
                    participant = %speaker,
                    path = %path.display(),
                    "security violation, ending session"
                );
                let details = SecurityViolation {
                    participant: speaker.to_string(),
                    path: path.clone(),
                    message: message.clone(),
                    instruction: instruction.to_string(),
                };
                Ok(Dispatch::Violation(details, message.clone()))
            }
            Some(SessionError::InputCancelled) => Ok(Dispatch::Cancelled),
            _ => {
                warn!(participant = %speaker, err = %format!("{err:#}"), "participant failed");
                Ok(Dispatch::Failed(format!("error: {err:#}")))
            }
        }
    }

    async fn final_answer(
        &self,
        task: &str,
        transcript: &[Message],
        cancel: &CancellationToken,
    ) -> Option<String> {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            result = self.ledger.final_answer(task, transcript) => result,
        };
        match result {
            Ok(answer) => Some(answer),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "could not obtain final answer");
                None
            }
        }
    }
}
