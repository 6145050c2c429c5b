//! Test-only helpers: scripted collaborators, ledger builders and fixtures.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::core::capabilities::ModelInfo;
use crate::core::types::{Capability, ParticipantSpec, Team};
use crate::error::SessionError;
use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::human_input::InputSource;
use crate::participants::{Participant, TurnRequest};

/// Completion client that replays canned replies in order and records requests.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
    info: ModelInfo,
}

impl ScriptedCompletion {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            info: ModelInfo {
                model: "gpt-4o".to_string(),
                vision: true,
                function_calling: true,
                json_output: true,
            },
        }
    }

    pub fn with_model_info(mut self, info: ModelInfo) -> Self {
        self.info = info;
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completion exhausted"))
    }

    fn model_info(&self) -> ModelInfo {
        self.info.clone()
    }
}

/// One scripted participant turn.
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    /// Fail as if a path escaped the confinement root.
    Violation(PathBuf),
    /// Fail with an ordinary tool error.
    Fail(String),
    /// Block until the session is cancelled.
    Hang,
}

/// Participant that plays back [`Step`]s and logs every instruction it gets.
pub struct ScriptedParticipant {
    spec: ParticipantSpec,
    steps: VecDeque<Step>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedParticipant {
    pub fn new(spec: ParticipantSpec, steps: Vec<Step>) -> Self {
        Self {
            spec,
            steps: steps.into(),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the received instructions.
    pub fn log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        self.log
            .lock()
            .expect("log lock")
            .push(request.instruction.to_string());
        match self.steps.pop_front() {
            None => Ok(format!("{} acknowledges", self.spec.name)),
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Violation(path)) => Err(SessionError::security_violation(path).into()),
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            Some(Step::Hang) => {
                request.cancel.cancelled().await;
                Err(SessionError::InputCancelled.into())
            }
        }
    }
}

/// Input source with canned lines; waits for cancellation once they run out.
pub struct ScriptedInput {
    lines: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInput {
    pub fn new(lines: Vec<&str>) -> Self {
        Self {
            lines: Mutex::new(lines.into_iter().map(str::to_string).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn read_line(&self, prompt: &str, cancel: &CancellationToken) -> Result<String> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        let next = self.lines.lock().expect("lines lock").pop_front();
        match next {
            Some(line) => Ok(line),
            None => {
                cancel.cancelled().await;
                Err(SessionError::InputCancelled.into())
            }
        }
    }
}

/// Serialized ledger reply with fixed reasons.
pub fn ledger_json(
    satisfied: bool,
    in_loop: bool,
    progress: bool,
    next_speaker: &str,
    instruction: &str,
) -> String {
    serde_json::json!({
        "is_request_satisfied": {"reason": "checked", "answer": satisfied},
        "is_in_loop": {"reason": "checked", "answer": in_loop},
        "is_progress_being_made": {"reason": "checked", "answer": progress},
        "next_speaker": {"reason": "best fit", "answer": next_speaker},
        "instruction_or_question": {"reason": "next step", "answer": instruction},
    })
    .to_string()
}

/// Ledger reply for a progressing turn addressed to `next_speaker`.
pub fn progress(next_speaker: &str, instruction: &str) -> String {
    ledger_json(false, false, true, next_speaker, instruction)
}

/// Ledger reply for a turn without progress.
pub fn stalled(next_speaker: &str, instruction: &str) -> String {
    ledger_json(false, false, false, next_speaker, instruction)
}

/// Ledger reply declaring the request satisfied.
pub fn satisfied() -> String {
    ledger_json(true, false, true, "Coder", "wrap up")
}

pub fn agent_specs() -> Vec<ParticipantSpec> {
    vec![
        ParticipantSpec::new("FileSurfer", "reads local files")
            .with_capability(Capability::FileAccess),
        ParticipantSpec::new("WebSurfer", "browses the web").with_capability(Capability::WebAccess),
        ParticipantSpec::new("Coder", "writes code"),
        ParticipantSpec::new("Executor", "runs code").with_capability(Capability::CodeExecution),
    ]
}

pub fn approver_specs() -> Vec<ParticipantSpec> {
    vec![
        ParticipantSpec::approver("UserCodeApprover", "approves code", Capability::CodeExecution),
        ParticipantSpec::approver(
            "UserFileApprover",
            "approves file access",
            Capability::FileAccess,
        ),
        ParticipantSpec::approver("UserWebApprover", "approves web access", Capability::WebAccess),
        ParticipantSpec::human("UserGeneral", "general human"),
    ]
}

/// The four agents followed by the four human participants.
pub fn secured_team() -> Team {
    let mut members = agent_specs();
    members.extend(approver_specs());
    Team::new(members).expect("secured team")
}

/// Temp dir holding `work/report.md`, `work/notes.md` and `outside.md`.
pub fn work_fixture() -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    let work = temp.path().join("work");
    fs::create_dir_all(&work).expect("create work dir");
    fs::write(work.join("report.md"), "# Report\n\nRevenue grew 12%.\n").expect("write report");
    fs::write(work.join("notes.md"), "# Notes\n\nFollow up with finance.\n").expect("write notes");
    fs::write(temp.path().join("outside.md"), "secret").expect("write outside");
    temp
}
