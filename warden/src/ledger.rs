//! Progress ledger evaluation.
//!
//! Each turn the decision backend judges the conversation and answers five
//! questions as a JSON object. A reply is accepted only after JSON parsing,
//! schema validation, typed deserialization and a next-speaker membership
//! check. One corrective retry quotes the failure back to the backend.

use std::sync::Arc;

use anyhow::{Context, Result};
use jsonschema::{Draft, Validator};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::text::strip_json_fence;
use crate::core::types::{Ledger, Message, Team};
use crate::error::SessionError;
use crate::io::completion::{ChatMessage, CompletionClient, CompletionRequest, transcript_messages};
use crate::io::prompt::{LedgerPromptStyle, PromptEngine};

const LEDGER_SCHEMA: &str = include_str!("../schemas/progress_ledger.schema.json");

/// Inputs for one ledger evaluation.
#[derive(Debug, Clone, Copy)]
pub struct LedgerRequest<'a> {
    pub task: &'a str,
    pub team: &'a Team,
    pub transcript: &'a [Message],
}

pub struct LedgerEvaluator {
    client: Arc<dyn CompletionClient>,
    prompts: Arc<PromptEngine>,
    style: LedgerPromptStyle,
    validator: Validator,
}

impl LedgerEvaluator {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        prompts: Arc<PromptEngine>,
        style: LedgerPromptStyle,
    ) -> Result<Self> {
        let schema: Value =
            serde_json::from_str(LEDGER_SCHEMA).context("parse progress ledger schema")?;
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(&schema)
            .context("compile progress ledger schema")?;
        Ok(Self {
            client,
            prompts,
            style,
            validator,
        })
    }

    /// Ask the backend for this turn's ledger.
    ///
    /// Transport and HTTP failures propagate as ordinary errors. A reply that
    /// fails validation twice surfaces as `SessionError::LedgerParse` or
    /// `SessionError::UnknownSpeaker`.
    #[instrument(skip_all, fields(style = ?self.style, transcript = request.transcript.len()))]
    pub async fn evaluate(&self, request: &LedgerRequest<'_>) -> Result<Ledger> {
        let prompt = self
            .prompts
            .render_ledger(request.task, request.team, self.style)?;
        let mut messages = transcript_messages(request.transcript);
        messages.push(ChatMessage::user(prompt));

        let raw = self.request(&messages).await?;
        let first = match self.parse(&raw, request.team) {
            Ok(ledger) => return Ok(ledger),
            Err(err) => err,
        };

        warn!(err = %first, "progress ledger rejected, retrying once");
        messages.push(ChatMessage::assistant(raw));
        messages.push(ChatMessage::user(
            self.prompts
                .render_ledger_correction(&first.to_string(), request.team)?,
        ));
        let raw = self.request(&messages).await?;
        Ok(self.parse(&raw, request.team)?)
    }

    /// Validate a raw backend reply against the ledger contract.
    pub fn parse(&self, raw: &str, team: &Team) -> Result<Ledger, SessionError> {
        let body = strip_json_fence(raw);
        let value: Value = serde_json::from_str(body).map_err(|err| SessionError::LedgerParse {
            reason: format!("invalid JSON: {err}"),
            raw: raw.to_string(),
        })?;

        let errors: Vec<String> = self
            .validator
            .iter_errors(&value)
            .map(|err| err.to_string())
            .collect();
        if !errors.is_empty() {
            return Err(SessionError::LedgerParse {
                reason: format!("schema validation failed: {}", errors.join("; ")),
                raw: raw.to_string(),
            });
        }

        let mut ledger: Ledger =
            serde_json::from_value(value).map_err(|err| SessionError::LedgerParse {
                reason: err.to_string(),
                raw: raw.to_string(),
            })?;
        ledger.next_speaker.answer = ledger.next_speaker.answer.trim().to_string();
        if !team.contains(&ledger.next_speaker.answer) {
            return Err(SessionError::UnknownSpeaker {
                name: ledger.next_speaker.answer,
                allowed: team.names().into_iter().map(str::to_string).collect(),
            });
        }
        debug!(
            satisfied = ledger.is_request_satisfied.answer,
            in_loop = ledger.is_in_loop.answer,
            progress = ledger.is_progress_being_made.answer,
            next = %ledger.next_speaker.answer,
            "progress ledger accepted"
        );
        Ok(ledger)
    }

    /// Ask the backend to phrase the final answer once the task is done.
    #[instrument(skip_all)]
    pub async fn final_answer(&self, task: &str, transcript: &[Message]) -> Result<String> {
        let mut messages = transcript_messages(transcript);
        messages.push(ChatMessage::user(self.prompts.render_final_answer(task)?));
        self.client
            .complete(&CompletionRequest {
                messages,
                json_output: false,
            })
            .await
            .context("request final answer")
    }

    async fn request(&self, messages: &[ChatMessage]) -> Result<String> {
        self.client
            .complete(&CompletionRequest {
                messages: messages.to_vec(),
                json_output: true,
            })
            .await
            .context("request progress ledger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedCompletion, ledger_json, secured_team};

    fn evaluator(replies: Vec<String>) -> (LedgerEvaluator, Arc<ScriptedCompletion>) {
        let client = Arc::new(ScriptedCompletion::new(replies));
        let evaluator = LedgerEvaluator::new(
            client.clone(),
            Arc::new(PromptEngine::new()),
            LedgerPromptStyle::HumanGated,
        )
        .expect("evaluator");
        (evaluator, client)
    }

    fn request<'a>(team: &'a Team, transcript: &'a [Message]) -> LedgerRequest<'a> {
        LedgerRequest {
            task: "Summarize report.md",
            team,
            transcript,
        }
    }

    #[test]
    fn parse_accepts_fenced_valid_ledger() {
        let (evaluator, _) = evaluator(Vec::new());
        let raw = format!("```json\n{}\n```", ledger_json(false, false, true, "Coder", "write it"));
        let ledger = evaluator.parse(&raw, &secured_team()).expect("ledger");
        assert_eq!(ledger.next_speaker.answer, "Coder");
        assert_eq!(ledger.instruction_or_question.answer, "write it");
    }

    #[test]
    fn parse_rejects_missing_field() {
        let (evaluator, _) = evaluator(Vec::new());
        let mut value: Value =
            serde_json::from_str(&ledger_json(false, false, true, "Coder", "x")).expect("json");
        value
            .as_object_mut()
            .expect("object")
            .remove("is_in_loop");
        let err = evaluator
            .parse(&value.to_string(), &secured_team())
            .unwrap_err();
        match err {
            SessionError::LedgerParse { reason, .. } => {
                assert!(reason.starts_with("schema validation failed"), "{reason}");
                assert!(reason.contains("is_in_loop"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_wrong_answer_type() {
        let (evaluator, _) = evaluator(Vec::new());
        let raw = ledger_json(false, false, true, "Coder", "x")
            .replace("\"answer\":false", "\"answer\":\"no\"");
        assert!(matches!(
            evaluator.parse(&raw, &secured_team()),
            Err(SessionError::LedgerParse { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_speaker() {
        let (evaluator, _) = evaluator(Vec::new());
        let raw = ledger_json(false, false, true, "Ghost", "boo");
        match evaluator.parse(&raw, &secured_team()).unwrap_err() {
            SessionError::UnknownSpeaker { name, allowed } => {
                assert_eq!(name, "Ghost");
                assert!(allowed.contains(&"Coder".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn evaluate_retries_once_with_correction() {
        let (evaluator, client) = evaluator(vec![
            "not json at all".to_string(),
            ledger_json(false, false, true, "Coder", "write it"),
        ]);
        let team = secured_team();
        let transcript = [Message::new("user", "Summarize report.md")];
        let ledger = evaluator
            .evaluate(&request(&team, &transcript))
            .await
            .expect("ledger");
        assert_eq!(ledger.next_speaker.answer, "Coder");

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.json_output));
        let correction = requests[1].messages.last().expect("correction");
        assert!(correction.content.contains("could not be used"));
        assert!(correction.content.contains("invalid JSON"));
    }

    #[tokio::test]
    async fn evaluate_surfaces_second_failure() {
        let (evaluator, _) = evaluator(vec![
            ledger_json(false, false, true, "Ghost", "x"),
            ledger_json(false, false, true, "Ghost", "x"),
        ]);
        let team = secured_team();
        let err = evaluator
            .evaluate(&request(&team, &[]))
            .await
            .unwrap_err();
        let session_err = err.downcast_ref::<SessionError>().expect("session error");
        assert!(session_err.is_recoverable());
        assert!(matches!(session_err, SessionError::UnknownSpeaker { .. }));
    }

    #[tokio::test]
    async fn backend_failure_is_not_a_parse_error() {
        let (evaluator, _) = evaluator(Vec::new());
        let team = secured_team();
        let err = evaluator
            .evaluate(&request(&team, &[]))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<SessionError>().is_none());
    }

    #[tokio::test]
    async fn ledger_request_includes_transcript_before_prompt() {
        let (evaluator, client) = evaluator(vec![ledger_json(true, false, true, "Coder", "done")]);
        let team = secured_team();
        let transcript = [
            Message::new("user", "Summarize report.md"),
            Message::new("FileSurfer", "report text"),
        ];
        evaluator
            .evaluate(&request(&team, &transcript))
            .await
            .expect("ledger");
        let requests = client.requests();
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "FileSurfer:\nreport text");
        assert!(messages[2].content.contains("select from: FileSurfer, WebSurfer, Coder"));
    }
}
