//! Team members the orchestrator dispatches turns to.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::types::{Message, ParticipantSpec};

pub mod assistant;
pub mod code_executor;
pub mod file_surfer;
pub mod human;
pub mod web_surfer;

/// Everything a participant sees when it is asked to act.
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub task: &'a str,
    /// The orchestrator's instruction or question for this participant.
    pub instruction: &'a str,
    /// Shared conversation so far, task message first.
    pub transcript: &'a [Message],
    pub cancel: &'a CancellationToken,
}

#[async_trait]
pub trait Participant: Send {
    fn spec(&self) -> &ParticipantSpec;

    /// Produce this participant's reply for one turn.
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String>;
}
