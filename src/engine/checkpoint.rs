use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::state::AgentState;
use crate::types::HistoryEntry;

/// Post-mortem dump of a session that did not finish normally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: Uuid,
    pub mission: String,
    pub turn: u32,
    pub phase: String,
    pub doctrine: String,
    pub supervisor_prompt: String,
    pub executor_prompt: Option<String>,
    pub enabled_tools: Vec<String>,
    pub archive: Vec<HistoryEntry>,
    pub reason: String,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(state: &AgentState, reason: impl Into<String>) -> Self {
        Self {
            session_id: state.session_id(),
            mission: state.mission().to_string(),
            turn: state.turn(),
            phase: state.phase_name().to_string(),
            doctrine: state.doctrine().to_string(),
            supervisor_prompt: state.supervisor_prompt().to_string(),
            executor_prompt: state.executor_prompt().map(str::to_string),
            enabled_tools: state
                .phase()
                .tools
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
            archive: state.archive().to_vec(),
            reason: reason.into(),
            saved_at: Utc::now(),
        }
    }

    pub fn file_name(&self) -> String {
        format!("checkpoint_T{}.json", self.turn)
    }

    pub async fn save(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}
