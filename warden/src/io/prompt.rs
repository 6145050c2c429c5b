//! Prompt rendering for the ledger and the model-backed participants.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::{Capability, Team};

const LEDGER_TEMPLATE: &str = include_str!("prompts/ledger.md");
const LEDGER_CORRECTION_TEMPLATE: &str = include_str!("prompts/ledger_correction.md");
const FINAL_ANSWER_TEMPLATE: &str = include_str!("prompts/final_answer.md");
const APPROVAL_REQUEST_TEMPLATE: &str = include_str!("prompts/approval_request.md");
const FILE_SURFER_TEMPLATE: &str = include_str!("prompts/file_surfer.md");
const WEB_SURFER_TEMPLATE: &str = include_str!("prompts/web_surfer.md");
const CODER_TEMPLATE: &str = include_str!("prompts/coder.md");

/// How the progress-ledger request is phrased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerPromptStyle {
    #[default]
    Standard,
    /// Also tells the backend to pick the human approver ahead of agents
    /// whose actions need approval, and to leave humans out otherwise.
    HumanGated,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("ledger", LEDGER_TEMPLATE),
            ("ledger_correction", LEDGER_CORRECTION_TEMPLATE),
            ("final_answer", FINAL_ANSWER_TEMPLATE),
            ("approval_request", APPROVAL_REQUEST_TEMPLATE),
            ("file_surfer", FILE_SURFER_TEMPLATE),
            ("web_surfer", WEB_SURFER_TEMPLATE),
            ("coder", CODER_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    pub fn render_ledger(
        &self,
        task: &str,
        team: &Team,
        style: LedgerPromptStyle,
    ) -> Result<String> {
        let template = self.env.get_template("ledger")?;
        let rendered = template.render(context! {
            task => task.trim(),
            team => team.roster(),
            names => team.names().join(", "),
            human_gated => style == LedgerPromptStyle::HumanGated,
        })?;
        Ok(rendered)
    }

    pub fn render_ledger_correction(&self, error: &str, team: &Team) -> Result<String> {
        let template = self.env.get_template("ledger_correction")?;
        let rendered = template.render(context! {
            error => error,
            names => team.names().join(", "),
        })?;
        Ok(rendered)
    }

    pub fn render_final_answer(&self, task: &str) -> Result<String> {
        let template = self.env.get_template("final_answer")?;
        Ok(template.render(context! { task => task.trim() })?)
    }

    pub fn render_approval_request(
        &self,
        participant: &str,
        capability: Capability,
        instruction: &str,
    ) -> Result<String> {
        let template = self.env.get_template("approval_request")?;
        let rendered = template.render(context! {
            participant => participant,
            capability => capability.as_str(),
            instruction => instruction.trim(),
        })?;
        Ok(rendered)
    }

    pub fn render_file_surfer(
        &self,
        state: &str,
        viewport: &str,
        instruction: &str,
    ) -> Result<String> {
        let template = self.env.get_template("file_surfer")?;
        let rendered = template.render(context! {
            state => state,
            viewport => viewport,
            instruction => instruction.trim(),
        })?;
        Ok(rendered)
    }

    pub fn render_web_surfer(&self, instruction: &str) -> Result<String> {
        let template = self.env.get_template("web_surfer")?;
        Ok(template.render(context! { instruction => instruction.trim() })?)
    }

    pub fn render_coder(&self, instruction: &str) -> Result<String> {
        let template = self.env.get_template("coder")?;
        Ok(template.render(context! { instruction => instruction.trim() })?)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}
