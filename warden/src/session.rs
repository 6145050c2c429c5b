//! Assemble the team from configuration and run one session.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::capabilities::{CapabilityReport, ModelInfo};
use crate::core::loop_detector::LoopDetector;
use crate::core::termination::TerminationMatcher;
use crate::core::turn::TurnLimits;
use crate::core::types::{Capability, Message, ParticipantSpec};
use crate::io::completion::CompletionClient;
use crate::io::config::SessionConfig;
use crate::io::document::{DocumentSession, PlainTextLoader};
use crate::io::human_input::InputSource;
use crate::io::path_guard::{PathGuard, PathResolver};
use crate::io::prompt::{LedgerPromptStyle, PromptEngine};
use crate::io::sandbox::CodeSandbox;
use crate::ledger::LedgerEvaluator;
use crate::orchestrator::{Orchestrator, OrchestratorSettings, SessionOutcome};
use crate::participants::Participant;
use crate::participants::assistant::ModelAssistant;
use crate::participants::code_executor::CodeExecutor;
use crate::participants::file_surfer::FileSurfer;
use crate::participants::human::HumanProxy;
use crate::participants::web_surfer::WebSurfer;

pub const FILE_SURFER: &str = "FileSurfer";
pub const WEB_SURFER: &str = "WebSurfer";
pub const CODER: &str = "Coder";
pub const EXECUTOR: &str = "Executor";
pub const CODE_APPROVER: &str = "UserCodeApprover";
pub const FILE_APPROVER: &str = "UserFileApprover";
pub const WEB_APPROVER: &str = "UserWebApprover";
pub const GENERAL_USER: &str = "UserGeneral";

/// External collaborators a session runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn CompletionClient>,
    pub input: Arc<dyn InputSource>,
    pub sandbox: Arc<dyn CodeSandbox>,
}

/// Team roster in speaking-fallback order: four agents, then the human
/// participants when oversight is enabled.
pub fn team_specs(human_oversight: bool) -> Vec<ParticipantSpec> {
    let mut specs = vec![
        ParticipantSpec::new(
            FILE_SURFER,
            "An agent that can read local files: open a path, page through it \
             and search within it.",
        )
        .with_capability(Capability::FileAccess),
        ParticipantSpec::new(
            WEB_SURFER,
            "A helpful assistant that can fetch web pages and report their text.",
        )
        .with_capability(Capability::WebAccess),
        ParticipantSpec::new(
            CODER,
            "A helpful general-purpose assistant with strong language, Python \
             and Linux command line skills.",
        ),
        ParticipantSpec::new(
            EXECUTOR,
            "A computer terminal that only runs Python scripts quoted in ```python \
             blocks or shell scripts quoted in ```sh blocks.",
        )
        .with_capability(Capability::CodeExecution),
    ];
    if human_oversight {
        specs.extend([
            ParticipantSpec::approver(
                CODE_APPROVER,
                "A human code approver, who reviews and approves code before it is run.",
                Capability::CodeExecution,
            ),
            ParticipantSpec::approver(
                FILE_APPROVER,
                "A human file approver, who approves local file handling requests \
                 before FileSurfer acts.",
                Capability::FileAccess,
            ),
            ParticipantSpec::approver(
                WEB_APPROVER,
                "A human web request approver, who approves web browsing requests \
                 before WebSurfer acts.",
                Capability::WebAccess,
            ),
            ParticipantSpec::human(
                GENERAL_USER,
                "A human user, who helps with the task when there are doubts or \
                 when the task is completed.",
            ),
        ]);
    }
    specs
}

/// Log every finding; refuse backends that cannot produce JSON ledgers.
pub fn check_capabilities(info: &ModelInfo) -> Result<CapabilityReport> {
    let report = CapabilityReport::check(info);
    for missing in &report.missing {
        warn!(capability = %missing, model = %info.model, "completion backend lacks capability");
    }
    for note in &report.notes {
        warn!(model = %info.model, "{note}");
    }
    if !report.is_usable() {
        bail!(
            "model '{}' does not support json output, which the progress ledger requires",
            info.model
        );
    }
    Ok(report)
}

/// Refuse to hand model-written code to the host runner unless a human
/// approves each run or the config accepts unsupervised execution.
pub fn check_code_supervision(config: &SessionConfig) -> Result<()> {
    if config.enable_human_oversight || config.sandbox.allow_unsupervised {
        return Ok(());
    }
    bail!(
        "code execution runs unisolated on this host; enable human oversight \
         (--enable-human-oversight or --secure) or set sandbox.allow_unsupervised = true"
    )
}

/// The directory file access is confined to.
pub fn confinement_root(config: &SessionConfig) -> Result<PathBuf> {
    match &config.confinement_root {
        Some(root) => Ok(root.clone()),
        None => std::env::current_dir().context("read current directory"),
    }
}

/// Build the orchestrator with the full team.
pub fn build_orchestrator(
    config: &SessionConfig,
    collaborators: &Collaborators,
    cancel: CancellationToken,
) -> Result<Orchestrator> {
    check_capabilities(&collaborators.client.model_info())?;
    check_code_supervision(config)?;

    let prompts = Arc::new(PromptEngine::new());
    let root = confinement_root(config)?;
    let resolver = if config.enable_file_security {
        PathResolver::Guarded(PathGuard::new(&root)?)
    } else {
        PathResolver::Unguarded
    };
    info!(
        oversight = config.enable_human_oversight,
        file_security = config.enable_file_security,
        terminate = config.enable_terminate,
        root = %root.display(),
        "assembling team"
    );

    let mut participants: Vec<Box<dyn Participant>> = Vec::new();
    for spec in team_specs(config.enable_human_oversight) {
        let name = spec.name.clone();
        let participant: Box<dyn Participant> = match name.as_str() {
            FILE_SURFER => Box::new(FileSurfer::new(
                spec,
                Arc::clone(&collaborators.client),
                Arc::clone(&prompts),
                DocumentSession::new(
                    resolver.clone(),
                    Box::new(PlainTextLoader),
                    config.viewport_size,
                ),
            )),
            WEB_SURFER => Box::new(WebSurfer::new(
                spec,
                Arc::clone(&collaborators.client),
                Arc::clone(&prompts),
                Duration::from_secs(config.model.timeout_secs),
                config.viewport_size,
            )?),
            CODER => Box::new(ModelAssistant::new(
                spec,
                Arc::clone(&collaborators.client),
                Arc::clone(&prompts),
            )),
            EXECUTOR => Box::new(CodeExecutor::new(spec, Arc::clone(&collaborators.sandbox))),
            _ => Box::new(HumanProxy::new(spec, Arc::clone(&collaborators.input))),
        };
        participants.push(participant);
    }

    let style = if config.enable_human_oversight {
        LedgerPromptStyle::HumanGated
    } else {
        LedgerPromptStyle::Standard
    };
    let ledger =
        LedgerEvaluator::new(Arc::clone(&collaborators.client), Arc::clone(&prompts), style)?;

    let settings = OrchestratorSettings {
        limits: TurnLimits {
            max_turns: config.effective_max_turns(),
            max_stalls: config.max_stalls,
        },
        human_oversight: config.enable_human_oversight,
        termination: config
            .enable_terminate
            .then(|| TerminationMatcher::new(config.termination_phrase.clone())),
        loop_detector: config.loop_detection.enabled.then(|| {
            LoopDetector::new(config.loop_detection.window, config.loop_detection.threshold)
        }),
    };
    Orchestrator::new(participants, ledger, prompts, settings, cancel)
}

/// Run exactly one session for `task`.
pub async fn run_session(
    config: &SessionConfig,
    collaborators: &Collaborators,
    task: &str,
    cancel: CancellationToken,
    on_message: impl FnMut(&Message),
) -> Result<SessionOutcome> {
    let mut orchestrator = build_orchestrator(config, collaborators, cancel)?;
    orchestrator.run(task, on_message).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json_output: bool) -> ModelInfo {
        ModelInfo {
            model: "gpt-4o".to_string(),
            vision: false,
            function_calling: true,
            json_output,
        }
    }

    #[test]
    fn oversight_adds_four_humans() {
        let plain = team_specs(false);
        assert_eq!(plain.len(), 4);
        assert!(plain.iter().all(|spec| !spec.human));

        let secured = team_specs(true);
        let names: Vec<&str> = secured.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                FILE_SURFER,
                WEB_SURFER,
                CODER,
                EXECUTOR,
                CODE_APPROVER,
                FILE_APPROVER,
                WEB_APPROVER,
                GENERAL_USER
            ]
        );
    }

    #[test]
    fn missing_vision_only_warns() {
        let report = check_capabilities(&info(true)).expect("usable");
        assert_eq!(report.missing, vec!["vision"]);
    }

    #[test]
    fn unsupervised_code_execution_needs_opt_in() {
        let mut config = SessionConfig::default();
        let err = check_code_supervision(&config).unwrap_err();
        assert!(err.to_string().contains("sandbox.allow_unsupervised"));

        config.sandbox.allow_unsupervised = true;
        check_code_supervision(&config).expect("opted in");

        let secured = SessionConfig {
            enable_human_oversight: true,
            ..SessionConfig::default()
        };
        check_code_supervision(&secured).expect("approver gates execution");
    }

    #[test]
    fn missing_json_output_refuses_to_start() {
        let err = check_capabilities(&info(false)).unwrap_err();
        assert!(err.to_string().contains("json output"));
    }
}
