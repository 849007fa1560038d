use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One recorded Executor action and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub turn: u32,
    pub tool: String,
    pub args: Value,
    pub justification: String,
    pub result: String,
    /// Path of the frame the action was chosen from.
    pub screenshot: String,
}

impl HistoryEntry {
    pub fn label(&self) -> &str {
        self.args.get("label").and_then(|v| v.as_str()).unwrap_or("")
    }

    /// What the action was aimed at: label, else typed text, else key chord.
    pub fn target(&self) -> &str {
        ["label", "text", "key"]
            .iter()
            .find_map(|key| self.args.get(*key).and_then(|v| v.as_str()))
            .unwrap_or("")
    }

    pub fn signature(&self) -> (&str, &str) {
        (self.tool.as_str(), self.label())
    }

    pub fn is_failure(&self) -> bool {
        self.result.starts_with("Error:")
    }
}
