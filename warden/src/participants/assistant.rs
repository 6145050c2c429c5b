//! Model-backed assistant (the Coder).

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::instrument;

use crate::core::types::ParticipantSpec;
use crate::io::completion::{ChatMessage, CompletionClient, CompletionRequest, transcript_messages};
use crate::io::prompt::PromptEngine;
use crate::participants::{Participant, TurnRequest};

pub struct ModelAssistant {
    spec: ParticipantSpec,
    client: Arc<dyn CompletionClient>,
    prompts: Arc<PromptEngine>,
}

impl ModelAssistant {
    pub fn new(
        spec: ParticipantSpec,
        client: Arc<dyn CompletionClient>,
        prompts: Arc<PromptEngine>,
    ) -> Self {
        Self {
            spec,
            client,
            prompts,
        }
    }
}

#[async_trait]
impl Participant for ModelAssistant {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    #[instrument(skip_all, fields(participant = %self.spec.name))]
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        let mut messages = transcript_messages(request.transcript);
        messages.push(ChatMessage::user(self.prompts.render_coder(request.instruction)?));
        self.client
            .complete(&CompletionRequest {
                messages,
                json_output: false,
            })
            .await
            .with_context(|| format!("{} completion", self.spec.name))
    }
}
