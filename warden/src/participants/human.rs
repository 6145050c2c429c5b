//! Human-controlled participants: approvers and the general user.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::core::types::ParticipantSpec;
use crate::io::human_input::InputSource;
use crate::participants::{Participant, TurnRequest};

pub struct HumanProxy {
    spec: ParticipantSpec,
    input: Arc<dyn InputSource>,
}

impl HumanProxy {
    pub fn new(spec: ParticipantSpec, input: Arc<dyn InputSource>) -> Self {
        Self { spec, input }
    }
}

#[async_trait]
impl Participant for HumanProxy {
    fn spec(&self) -> &ParticipantSpec {
        &self.spec
    }

    #[instrument(skip_all, fields(participant = %self.spec.name))]
    async fn respond(&mut self, request: &TurnRequest<'_>) -> Result<String> {
        let prompt = format!("{}> ", self.spec.name);
        let line = self.input.read_line(&prompt, request.cancel).await?;
        debug!(bytes = line.len(), "human replied");
        Ok(line.trim().to_string())
    }
}
