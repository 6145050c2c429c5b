//! Diagnostic tracing for the orchestrator.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, output to stderr.
//! - **Conversation (`io::console`)**: product output on stdout, unaffected
//!   by `RUST_LOG`.

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::config::LoggingConfig;

/// Filter directives for `config`: `RUST_LOG` (or `config.level` when unset)
/// followed by `target=off` for every suppressed target.
pub fn filter_directives(config: &LoggingConfig, rust_log: Option<&str>) -> String {
    let base = rust_log
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(&config.level);
    let mut directives = vec![base.to_string()];
    directives.extend(
        config
            .suppress
            .iter()
            .map(|target| target.trim())
            .filter(|target| !target.is_empty())
            .map(|target| format!("{target}=off")),
    );
    directives.join(",")
}

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `config.level` (`warn`) if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=warden=debug warden "summarize report.md"
/// ```
pub fn init(config: &LoggingConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directives = filter_directives(config, rust_log.as_deref());
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("parse log filter '{directives}'"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_configured_level() {
        assert_eq!(filter_directives(&LoggingConfig::default(), None), "warn");
    }

    #[test]
    fn rust_log_wins_and_suppressions_are_appended() {
        let config = LoggingConfig {
            level: "info".to_string(),
            suppress: vec!["reqwest".to_string(), " ".to_string(), "hyper_util".to_string()],
        };
        assert_eq!(
            filter_directives(&config, Some("warden=debug")),
            "warden=debug,reqwest=off,hyper_util=off"
        );
        assert_eq!(
            filter_directives(&config, Some("")),
            "info,reqwest=off,hyper_util=off"
        );
    }
}
