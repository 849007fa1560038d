use std::fmt;

use crate::types::HistoryEntry;

/// Window used for the warning shown to the oracle.
pub const ADVISORY_WINDOW: usize = 4;
/// Window used to decide whether to raise the Executor's temperature.
pub const ESCALATION_WINDOW: usize = 5;

/// The same (tool, label) signature dominating the recent window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stagnation {
    pub tool: String,
    pub label: String,
    pub repeats: usize,
}

impl fmt::Display for Stagnation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LOOP: {} on '{}' repeated {}x - CHANGE APPROACH",
            self.tool, self.label, self.repeats
        )
    }
}

/// Flags stagnation when the newest entry's signature occurs at least
/// `threshold` times within the last `window` entries. Never blocks actions.
#[derive(Debug, Clone, Copy)]
pub struct LoopDetector {
    window: usize,
    threshold: usize,
}

impl LoopDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self {
            window: window.max(1),
            threshold: threshold.max(1),
        }
    }

    pub fn advisory(threshold: usize) -> Self {
        Self::new(ADVISORY_WINDOW, threshold)
    }

    pub fn escalation(threshold: usize) -> Self {
        Self::new(ESCALATION_WINDOW, threshold)
    }

    pub fn check(&self, history: &[HistoryEntry]) -> Option<Stagnation> {
        let recent = &history[history.len().saturating_sub(self.window)..];
        let last = recent.last()?;
        let signature = last.signature();
        let repeats = recent
            .iter()
            .filter(|entry| entry.signature() == signature)
            .count();

        if repeats >= self.threshold {
            Some(Stagnation {
                tool: last.tool.clone(),
                label: last.label().to_string(),
                repeats,
            })
        } else {
            None
        }
    }
}
