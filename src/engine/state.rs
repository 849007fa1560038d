use serde::Serialize;
use uuid::Uuid;

use super::prompts;
use crate::tools::{ToolName, FALLBACK_TOOLS};
use crate::types::{Frame, HistoryEntry, ScreenDims};

pub const INITIAL_PHASE: &str = "INIT";
pub const FALLBACK_PHASE: &str = "FALLBACK";
pub const UNNAMED_PHASE: &str = "UNKNOWN";

/// A named mission stage with its Executor prompt and tool subset.
/// Only the Supervisor (or the turn-1 fallback) replaces it, and always whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub name: String,
    pub prompt: Option<String>,
    pub tools: Vec<ToolName>,
}

impl Phase {
    pub fn initial() -> Self {
        Self {
            name: INITIAL_PHASE.to_string(),
            prompt: None,
            tools: Vec::new(),
        }
    }

    pub fn fallback() -> Self {
        Self {
            name: FALLBACK_PHASE.to_string(),
            prompt: Some(prompts::EXECUTOR_FALLBACK_PROMPT.to_string()),
            tools: FALLBACK_TOOLS.to_vec(),
        }
    }
}

/// Everything one session knows. Owned by the caller and passed explicitly
/// through every turn of the control loop.
#[derive(Debug)]
pub struct AgentState {
    session_id: Uuid,
    mission: String,
    doctrine: String,
    supervisor_prompt: String,
    phase: Phase,
    frame: Frame,
    frame_ref: String,
    screen: ScreenDims,
    turn: u32,
    history: Vec<HistoryEntry>,
    archive: Option<Vec<HistoryEntry>>,
    max_history: usize,
}

impl AgentState {
    pub fn new(
        mission: impl Into<String>,
        doctrine: impl Into<String>,
        frame: Frame,
        frame_ref: impl Into<String>,
        screen: ScreenDims,
        max_history: usize,
        archive: bool,
    ) -> Self {
        let mission = mission.into();
        let doctrine = doctrine.into();
        let supervisor_prompt = prompts::supervisor_prompt(&mission, &doctrine);
        Self {
            session_id: Uuid::new_v4(),
            mission,
            doctrine,
            supervisor_prompt,
            phase: Phase::initial(),
            frame,
            frame_ref: frame_ref.into(),
            screen,
            turn: 0,
            history: Vec::new(),
            archive: archive.then(Vec::new),
            max_history: max_history.max(1),
        }
    }

    pub fn increment_turn(&mut self) -> u32 {
        self.turn += 1;
        self.turn
    }

    pub fn update_frame(&mut self, frame: Frame, frame_ref: impl Into<String>, screen: ScreenDims) {
        self.frame = frame;
        self.frame_ref = frame_ref.into();
        self.screen = screen;
    }

    /// Append to the visible window (dropping the oldest beyond the bound)
    /// and to the archive when one is kept.
    pub fn record(&mut self, entry: HistoryEntry) {
        if let Some(archive) = self.archive.as_mut() {
            archive.push(entry.clone());
        }
        self.history.push(entry);
        if self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
        }
    }

    pub fn apply_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// Tools offered to the Executor this turn. An empty phase set falls back
    /// to every Executor tool so the session cannot stall.
    pub fn executor_tools(&self) -> Vec<ToolName> {
        if self.phase.tools.is_empty() {
            ToolName::executor_tools()
        } else {
            self.phase.tools.clone()
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn mission(&self) -> &str {
        &self.mission
    }

    pub fn doctrine(&self) -> &str {
        &self.doctrine
    }

    pub fn supervisor_prompt(&self) -> &str {
        &self.supervisor_prompt
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn phase_name(&self) -> &str {
        &self.phase.name
    }

    pub fn executor_prompt(&self) -> Option<&str> {
        self.phase.prompt.as_deref()
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn frame_ref(&self) -> &str {
        &self.frame_ref
    }

    pub fn screen(&self) -> ScreenDims {
        self.screen
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn archive(&self) -> &[HistoryEntry] {
        self.archive.as_deref().unwrap_or(&[])
    }

    pub fn archive_enabled(&self) -> bool {
        self.archive.is_some()
    }
}
