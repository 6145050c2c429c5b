//! Sentinel termination phrase matching.

/// Matches a sentinel phrase as a whole token of a participant reply.
///
/// Tokens are whitespace-separated; surrounding ASCII punctuation is ignored,
/// so `TERMINATE.` and `"TERMINATE"` match while `TERMINATED` does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationMatcher {
    phrase: String,
}

impl TerminationMatcher {
    pub fn new(phrase: impl Into<String>) -> Self {
        Self {
            phrase: phrase.into(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        text.split_whitespace().any(|token| {
            token == self.phrase
                || token.trim_matches(|c: char| c.is_ascii_punctuation()) == self.phrase
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_token() {
        let matcher = TerminationMatcher::new("TERMINATE");
        assert!(matcher.matches("TERMINATE"));
        assert!(matcher.matches("All done.\nTERMINATE"));
        assert!(matcher.matches("please \"TERMINATE\"."));
    }

    #[test]
    fn ignores_substrings_and_case_variants() {
        let matcher = TerminationMatcher::new("TERMINATE");
        assert!(!matcher.matches("the job TERMINATED cleanly"));
        assert!(!matcher.matches("terminate"));
        assert!(!matcher.matches("PRETERMINATE"));
        assert!(!matcher.matches(""));
    }
}
