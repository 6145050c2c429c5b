//! Executor: runs the code blocks most recently posted to the conversation.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::core::text::extract_code_blocks;
use crate::core::types::ParticipantSpec;
use crate::io::sandbox::CodeSandbox;
use crate::participants::{Participant, TurnRequest};

const NO_CODE_REPLY: &str = "No code blocks found in the conversation. Provide at least one \
markdown code block to execute, fenced as ```python or ```sh.";

pub struct CodeExecutor {
    spec: ParticipantSpec,
    sandbox: Arc<dyn CodeSandbox>,
}

impl CodeExecutor {
    pub fn new(spec: ParticipantSpec, sandbox: Arc<dyn CodeSandbox>) -> Self {
        Self { spec, sandbox }
    }
}

#[async_trait]
impl Participant for CodeExecutor {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    #[instrument(skip_all, fields(participant = %self.spec.name))]
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        let blocks = request
            .transcript
            .iter()
            .rev()
            .filter(|m| m.source != self.spec.name)
            .map(|m| extract_code_blocks(&m.content))
            .find(|blocks| !blocks.is_empty());
        let Some(blocks) = blocks else {
            return Ok(NO_CODE_REPLY.to_string());
        };

        info!(blocks = blocks.len(), "executing code blocks");
        let mut reports = Vec::with_capacity(blocks.len());
        for block in &blocks {
            reports.push(self.sandbox.run(block).await?);
        }
        Ok(reports.join("\n"))
    }
}
