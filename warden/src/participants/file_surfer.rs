//! FileSurfer: reads local documents through a [`DocumentSession`].
//!
//! The model picks one browsing action per turn. Path-opening actions go
//! through the session's resolver, so with file security enabled an escape
//! attempt surfaces as `SessionError::SecurityViolation` and ends the session.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::text::strip_json_fence;
use crate::core::types::ParticipantSpec;
use crate::io::completion::{ChatMessage, CompletionClient, CompletionRequest, transcript_messages};
use crate::io::document::DocumentSession;
use crate::io::prompt::PromptEngine;
use crate::participants::{Participant, TurnRequest};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum FileAction {
    OpenPath { path: String },
    PageDown,
    PageUp,
    FindOnPage { query: String },
    FindNext,
    Answer { text: String },
}

pub struct FileSurfer {
    spec: ParticipantSpec,
    client: Arc<dyn CompletionClient>,
    prompts: Arc<PromptEngine>,
    documents: DocumentSession,
}

impl FileSurfer {
    pub fn new(
        spec: ParticipantSpec,
        client: Arc<dyn CompletionClient>,
        prompts: Arc<PromptEngine>,
        documents: DocumentSession,
    ) -> Self {
        Self {
            spec,
            client,
            prompts,
            documents,
        }
    }

    pub fn documents(&self) -> &DocumentSession {
        &self.documents
    }

    fn apply(&mut self, action: FileAction) -> Result<String> {
        let note = match action {
            FileAction::Answer { text } => return Ok(text),
            FileAction::OpenPath { path } => {
                self.documents.open(&path)?;
                None
            }
            FileAction::PageDown => {
                self.documents.page_down();
                None
            }
            FileAction::PageUp => {
                self.documents.page_up();
                None
            }
            FileAction::FindOnPage { query } => {
                let found = self.documents.find_on_page(&query);
                (!found).then(|| format!("The search string '{query}' was not found on this page."))
            }
            FileAction::FindNext => {
                let found = self.documents.find_next();
                (!found).then(|| "No further matches for the last search.".to_string())
            }
        };

        let mut reply = self.documents.state_header();
        if let Some(note) = note {
            reply.push_str(&note);
            reply.push('\n');
        }
        reply.push_str("=======================\n");
        reply.push_str(self.documents.viewport());
        Ok(reply)
    }
}

#[async_trait]
impl Participant for FileSurfer {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    #[instrument(skip_all, fields(participant = %self.spec.name))]
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        let prompt = self.prompts.render_file_surfer(
            &self.documents.state_header(),
            self.documents.viewport(),
            request.instruction,
        )?;
        let mut messages = transcript_messages(request.transcript);
        messages.push(ChatMessage::user(prompt));

        let raw = self
            .client
            .complete(&CompletionRequest {
                messages,
                json_output: true,
            })
            .await
            .context("file surfer completion")?;
        let action: FileAction = serde_json::from_str(strip_json_fence(&raw))
            .with_context(|| format!("parse file surfer action: {}", raw.trim()))?;
        debug!(?action, "file surfer action");
        self.apply(action)
    }
}
