//! Session configuration loaded from `warden.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Session configuration (TOML).
///
/// Every field is optional; missing fields take the defaults below. CLI flags
/// are layered on top with [`SessionConfig::apply_flags`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on orchestrator turns. Unset means 20, or 30 with human
    /// oversight.
    pub max_turns: Option<u32>,

    /// Consecutive non-progress turns before the session gives up.
    pub max_stalls: u32,

    pub enable_human_oversight: bool,
    pub enable_file_security: bool,
    /// Stop when a participant says `termination_phrase`.
    pub enable_terminate: bool,
    pub termination_phrase: String,

    /// Directory the file surfer is confined to. Defaults to the working
    /// directory at startup.
    pub confinement_root: Option<PathBuf>,

    /// Viewport page size in bytes.
    pub viewport_size: usize,

    pub loop_detection: LoopDetectionConfig,
    pub model: ModelConfig,
    pub sandbox: SandboxConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopDetectionConfig {
    pub enabled: bool,
    /// Recent instructions compared against.
    pub window: usize,
    /// Token-set similarity at or above which an instruction is a repeat.
    pub threshold: f64,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window: 4,
            threshold: 0.9,
        }
    }
}

/// OpenAI-compatible completion backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Full chat-completions URL.
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub vision: bool,
    pub function_calling: bool,
    pub json_output: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.0,
            timeout_secs: 120,
            vision: true,
            function_calling: true,
            json_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    pub timeout_secs: u64,
    /// Truncate stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Let the Executor run host code without human code approval.
    pub allow_unsupervised: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            output_limit_bytes: 100_000,
            allow_unsupervised: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Targets silenced entirely, e.g. `["reqwest", "hyper_util"]`.
    pub suppress: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            suppress: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: None,
            max_stalls: 3,
            enable_human_oversight: false,
            enable_file_security: false,
            enable_terminate: false,
            termination_phrase: "TERMINATE".to_string(),
            confinement_root: None,
            viewport_size: 1024 * 5,
            loop_detection: LoopDetectionConfig::default(),
            model: ModelConfig::default(),
            sandbox: SandboxConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// CLI overrides applied on top of the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFlags {
    pub secure: bool,
    pub enable_human_oversight: bool,
    pub enable_file_security: bool,
    pub enable_terminate: bool,
    pub max_turns: Option<u32>,
    pub max_stalls: Option<u32>,
}

impl SessionConfig {
    pub fn effective_max_turns(&self) -> u32 {
        match self.max_turns {
            Some(turns) => turns,
            None if self.enable_human_oversight => 30,
            None => 20,
        }
    }

    /// Flags only ever switch features on.
    pub fn apply_flags(&mut self, flags: &ConfigFlags) {
        self.enable_human_oversight |= flags.secure || flags.enable_human_oversight;
        self.enable_file_security |= flags.secure || flags.enable_file_security;
        self.enable_terminate |= flags.secure || flags.enable_terminate;
        if let Some(turns) = flags.max_turns {
            self.max_turns = Some(turns);
        }
        if let Some(stalls) = flags.max_stalls {
            self.max_stalls = stalls;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_turns == Some(0) {
            return Err(anyhow!("max_turns must be > 0"));
        }
        if self.max_stalls == 0 {
            return Err(anyhow!("max_stalls must be > 0"));
        }
        if self.termination_phrase.trim().is_empty()
            || self.termination_phrase.split_whitespace().count() != 1
        {
            return Err(anyhow!("termination_phrase must be a single non-empty token"));
        }
        if self.viewport_size == 0 {
            return Err(anyhow!("viewport_size must be > 0"));
        }
        if let Some(root) = &self.confinement_root
            && !root.is_absolute()
        {
            return Err(anyhow!(
                "confinement_root must be absolute: {}",
                root.display()
            ));
        }
        if self.loop_detection.window == 0 {
            return Err(anyhow!("loop_detection.window must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.loop_detection.threshold) {
            return Err(anyhow!("loop_detection.threshold must be within 0.0..=1.0"));
        }
        if self.model.endpoint.trim().is_empty() {
            return Err(anyhow!("model.endpoint must be non-empty"));
        }
        if self.model.model.trim().is_empty() {
            return Err(anyhow!("model.model must be non-empty"));
        }
        if self.model.timeout_secs == 0 {
            return Err(anyhow!("model.timeout_secs must be > 0"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SessionConfig::default()`.
pub fn load_config(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        let cfg = SessionConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SessionConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}
