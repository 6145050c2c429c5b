//! Local repetition detector over recent orchestrator instructions.
//!
//! The ledger's own `is_in_loop` judgement is self-reported by the model.
//! This detector flags a turn whose instruction to a speaker is nearly the
//! same as one of the last few instructions to that same speaker.

use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone)]
pub struct LoopDetector {
    window: usize,
    threshold: f64,
    recent: VecDeque<(String, BTreeSet<String>)>,
}

impl LoopDetector {
    /// `window` instructions are remembered; similarity at or above
    /// `threshold` (token-set Jaccard, 0.0..=1.0) counts as a repeat.
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            window: window.max(1),
            threshold,
            recent: VecDeque::new(),
        }
    }

    /// Record an instruction and report whether it repeats a recent one.
    pub fn observe(&mut self, speaker: &str, instruction: &str) -> bool {
        let tokens = tokenize(instruction);
        let repeated = self
            .recent
            .iter()
            .filter(|(prev_speaker, _)| prev_speaker == speaker)
            .any(|(_, prev)| jaccard(prev, &tokens) >= self.threshold);

        self.recent.push_back((speaker.to_string(), tokens));
        while self.recent.len() > self.window {
            self.recent.pop_front();
        }
        repeated
    }
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count() as f64;
    let total = a.union(b).count() as f64;
    shared / total
}
