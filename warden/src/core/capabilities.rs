//! Completion backend capability checks.

/// What the configured completion backend declares it supports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub model: String,
    pub vision: bool,
    pub function_calling: bool,
    pub json_output: bool,
}

/// Findings of a capability check. Every finding is a warning; only a missing
/// `json_output` makes the backend unusable for ledger evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityReport {
    pub missing: Vec<&'static str>,
    pub notes: Vec<String>,
}

impl CapabilityReport {
    pub fn check(info: &ModelInfo) -> Self {
        let mut report = Self::default();
        for (name, present) in [
            ("vision", info.vision),
            ("function_calling", info.function_calling),
            ("json_output", info.json_output),
        ] {
            if !present {
                report.missing.push(name);
            }
        }
        if !info.model.starts_with("gpt-4o") {
            report.notes.push(format!(
                "model '{}' is not a gpt-4o family model; team behavior is tuned for gpt-4o",
                info.model
            ));
        }
        report
    }

    pub fn is_usable(&self) -> bool {
        !self.missing.contains(&"json_output")
    }
}
