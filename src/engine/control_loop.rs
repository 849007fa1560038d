use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::checkpoint::Checkpoint;
use super::loop_detector::{LoopDetector, Stagnation};
use super::prompts;
use super::state::{AgentState, Phase, UNNAMED_PHASE};
use crate::capture::{capture_frame, FrameStore, ScreenSource};
use crate::config::Config;
use crate::error::DispatchError;
use crate::input::{pause, InputBackend, InputInjector};
use crate::providers::{CompletionRequest, Message, Oracle, Reply, Tier, ToolCallRequest};
use crate::tools::{self, resolve_executor_tools, ToolDispatcher, ToolName};
use crate::types::{Action, HistoryEntry};

/// Shared stop request, polled once at the top of every turn.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Completed { turns: u32, evidence: String },
    MaxIterations { turns: u32 },
    Cancelled { turns: u32 },
}

impl SessionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionStatus::Completed { .. })
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Completed { turns, .. } => write!(f, "Completed in {} turns", turns),
            SessionStatus::MaxIterations { turns } => {
                write!(f, "Max iterations reached ({} turns)", turns)
            }
            SessionStatus::Cancelled { turns } => write!(f, "Cancelled after {} turns", turns),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub turns: u32,
    pub final_phase: String,
    pub archived_actions: usize,
}

/// A Supervisor reply that carried both halves of a phase change.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseTransition {
    pub phase: String,
    pub prompt: String,
    pub tool_names: Vec<String>,
}

impl PhaseTransition {
    /// Extract a transition from the Supervisor's calls. Returns `None` unless
    /// a non-empty prompt and a non-empty tool list arrived together.
    pub fn from_reply(reply: &Reply) -> Option<Self> {
        let mut prompt: Option<(String, String)> = None;
        let mut tool_names: Option<Vec<String>> = None;

        for call in &reply.tool_calls {
            let args = match call.parse_arguments() {
                Ok(args) => args,
                Err(e) => {
                    log::warn!("Skipping {} call with unreadable arguments: {}", call.name, e);
                    continue;
                }
            };

            match ToolName::from_str(&call.name) {
                Some(ToolName::SpawnExecutorPrompt) => {
                    let body = args.get("prompt").and_then(Value::as_str).unwrap_or("");
                    let phase = args
                        .get("phase")
                        .and_then(Value::as_str)
                        .unwrap_or(UNNAMED_PHASE);
                    let rationale = args.get("rationale").and_then(Value::as_str).unwrap_or("");
                    log::info!(
                        "Executor prompt spawned for phase {}: {}",
                        phase,
                        truncate(rationale, 100)
                    );
                    prompt = Some((phase.to_string(), body.to_string()));
                }
                Some(ToolName::UpdatePhaseTools) => {
                    let names: Vec<String> = args
                        .get("tool_names")
                        .and_then(Value::as_array)
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                        })
                        .unwrap_or_default();
                    log::info!("Phase tools proposed: {:?}", names);
                    tool_names = Some(names);
                }
                _ => log::warn!("Supervisor called unexpected tool '{}'", call.name),
            }
        }

        match (prompt, tool_names) {
            (Some((phase, prompt)), Some(tool_names))
                if !phase.is_empty() && !prompt.is_empty() && !tool_names.is_empty() =>
            {
                Some(Self {
                    phase,
                    prompt,
                    tool_names,
                })
            }
            _ => None,
        }
    }

    pub fn into_phase(self) -> Phase {
        Phase {
            name: self.phase,
            prompt: Some(self.prompt),
            tools: resolve_executor_tools(&self.tool_names),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Planner once, Supervisor periodically, Executor every turn.
pub struct ControlLoop<S: ScreenSource, B: InputBackend> {
    config: Config,
    screen: S,
    dispatcher: ToolDispatcher<B>,
    oracle: Arc<dyn Oracle>,
    store: FrameStore,
    cancel: CancelFlag,
    advisory: LoopDetector,
    escalation: LoopDetector,
}

impl<S: ScreenSource, B: InputBackend> ControlLoop<S, B> {
    pub fn new(config: Config, screen: S, backend: B, oracle: Arc<dyn Oracle>) -> Self {
        let injector = InputInjector::new(backend, config.timing);
        let store = FrameStore::new(config.dump_dir.clone(), config.frame_prefix.clone());
        Self {
            advisory: LoopDetector::advisory(config.loop_detection_threshold),
            escalation: LoopDetector::escalation(config.loop_detection_threshold),
            dispatcher: ToolDispatcher::new(injector),
            config,
            screen,
            oracle,
            store,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Capture the reconnaissance frame (turn 0), run the Planner and build
    /// the session state.
    pub async fn start(&mut self, mission: &str) -> Result<AgentState> {
        let (frame, screen) = capture_frame(
            &mut self.screen,
            self.config.image_width,
            self.config.image_height,
            0,
        )
        .context("initial capture failed")?;
        let frame_ref = self.store.save(&frame).await?;
        log::info!(
            "Initial recon: {} (screen {}x{})",
            frame_ref,
            screen.width,
            screen.height
        );

        let doctrine = self.plan(mission, &frame).await;
        log::info!("Doctrine received ({} chars)", doctrine.chars().count());

        let state = AgentState::new(
            mission,
            doctrine,
            frame,
            frame_ref,
            screen,
            self.config.max_history_items,
            self.config.enable_full_archive,
        );
        log::info!("Session {} started", state.session_id());
        Ok(state)
    }

    /// Drive turns until completion, budget exhaustion or cancellation.
    ///
    /// Fatal errors and cancellation write a checkpoint before returning. An
    /// invalid configuration is rejected before the first turn.
    pub async fn run(&mut self, state: &mut AgentState) -> Result<SessionOutcome> {
        self.config.validate()?;
        log::info!(
            "Running: max_steps={} supervisor_interval={} model={}",
            self.config.max_steps,
            self.config.supervisor_interval,
            self.config.model
        );

        for _ in 0..self.config.max_steps {
            if self.cancel.is_cancelled() {
                log::warn!(
                    "Mission aborted at turn {} in phase {}",
                    state.turn(),
                    state.phase_name()
                );
                self.checkpoint(state, "cancelled").await;
                let status = SessionStatus::Cancelled {
                    turns: state.turn(),
                };
                return Ok(Self::outcome(state, status));
            }

            match self.turn(state).await {
                Ok(Some(status)) => return Ok(Self::outcome(state, status)),
                Ok(None) => {}
                Err(e) => {
                    log::error!("Fatal error at turn {}: {:#}", state.turn(), e);
                    self.checkpoint(state, &format!("fatal: {:#}", e)).await;
                    return Err(e);
                }
            }

            pause(self.config.timing.turn_delay_ms).await;
        }

        let status = SessionStatus::MaxIterations {
            turns: state.turn(),
        };
        Ok(Self::outcome(state, status))
    }

    fn outcome(state: &AgentState, status: SessionStatus) -> SessionOutcome {
        SessionOutcome {
            status,
            turns: state.turn(),
            final_phase: state.phase_name().to_string(),
            archived_actions: state.archive().len(),
        }
    }

    async fn checkpoint(&self, state: &AgentState, reason: &str) {
        let checkpoint = Checkpoint::capture(state, reason);
        match checkpoint.save(self.store.dir()).await {
            Ok(path) => log::info!("Checkpoint saved: {}", path.display()),
            Err(e) => log::error!("Checkpoint failed: {:#}", e),
        }
    }

    /// One turn: capture, maybe supervise, ask the Executor, act.
    async fn turn(&mut self, state: &mut AgentState) -> Result<Option<SessionStatus>> {
        let turn = state.increment_turn();
        let (frame, screen) = capture_frame(
            &mut self.screen,
            self.config.image_width,
            self.config.image_height,
            turn,
        )
        .with_context(|| format!("capture failed at turn {}", turn))?;
        let frame_ref = self.store.save(&frame).await?;
        state.update_frame(frame, frame_ref, screen);

        log::info!("turn {} | phase {}", turn, state.phase_name());

        if turn == 1 || turn % self.config.supervisor_interval == 0 {
            self.supervise(state).await;
            pause(self.config.timing.turn_delay_ms).await;
        }

        if state.executor_prompt().is_none() {
            log::warn!("No executor prompt yet, waiting for the supervisor");
            return Ok(None);
        }

        let offered = state.executor_tools();
        let Some(call) = self.execute(state, &offered).await else {
            log::warn!("No action taken this turn");
            return Ok(None);
        };

        self.act(state, call, &offered).await
    }

    async fn plan(&self, mission: &str, frame: &crate::types::Frame) -> String {
        let request = CompletionRequest {
            tier: Tier::Planner,
            messages: vec![
                Message::system(prompts::PLANNER_PROMPT),
                Message::user_with_image(prompts::planner_instructions(mission), frame),
            ],
            tools: Vec::new(),
            temperature: self.config.planner_temperature,
            max_tokens: self.config.planner_max_tokens,
        };

        match self.oracle.complete(request).await {
            Ok(reply) => reply.content_text().to_string(),
            Err(e) => {
                log::warn!("Planner call failed: {}", e);
                format!("Planner invocation failed: {}", e)
            }
        }
    }

    fn advisory_warning(&self, state: &AgentState) -> Option<Stagnation> {
        if !self.config.enable_loop_prevention || state.history().len() < 2 {
            return None;
        }
        self.advisory.check(state.history())
    }

    async fn supervise(&self, state: &mut AgentState) {
        let warning = self.advisory_warning(state);
        let digest = prompts::history_digest(state, warning.as_ref());
        let request = CompletionRequest {
            tier: Tier::Supervisor,
            messages: vec![
                Message::system(state.supervisor_prompt()),
                Message::user_with_image(prompts::supervisor_instructions(&digest), state.frame()),
            ],
            tools: tools::definitions(&ToolName::supervisor_tools()),
            temperature: self.config.supervisor_temperature,
            max_tokens: self.config.supervisor_max_tokens,
        };

        let transition = match self.oracle.complete(request).await {
            Ok(reply) => {
                if reply.tool_calls.is_empty() {
                    log::info!("Supervisor status: {}", truncate(reply.content_text(), 150));
                }
                PhaseTransition::from_reply(&reply)
            }
            Err(e) => {
                log::warn!("Supervisor call failed: {}", e);
                None
            }
        };

        match transition {
            Some(transition) => {
                let phase = transition.into_phase();
                log::info!(
                    "Phase transition: {} -> {} ({} tools)",
                    state.phase_name(),
                    phase.name,
                    phase.tools.len()
                );
                state.apply_phase(phase);
            }
            None if state.turn() == 1 => {
                log::warn!("No phase configured by the supervisor, using fallback executor");
                state.apply_phase(Phase::fallback());
            }
            None => {}
        }
    }

    async fn execute(&self, state: &AgentState, offered: &[ToolName]) -> Option<ToolCallRequest> {
        let prompt = state.executor_prompt()?;
        let warning = self.advisory_warning(state);
        let digest = prompts::history_digest(state, warning.as_ref());

        let stagnating =
            self.config.enable_loop_prevention && self.escalation.check(state.history()).is_some();
        let temperature = if stagnating {
            let raised = self.config.executor_temperature * self.config.loop_temperature_factor;
            log::warn!("Loop detected, raising executor temperature to {:.2}", raised);
            raised
        } else {
            self.config.executor_temperature
        };

        let request = CompletionRequest {
            tier: Tier::Executor,
            messages: vec![
                Message::system(prompt),
                Message::user_with_image(prompts::executor_instructions(&digest), state.frame()),
            ],
            tools: tools::definitions(offered),
            temperature,
            max_tokens: self.config.executor_max_tokens,
        };

        match self.oracle.complete(request).await {
            Ok(reply) => {
                let count = reply.tool_calls.len();
                if count == 0 {
                    log::info!(
                        "Executor returned no tool calls: {}",
                        truncate(reply.content_text(), 100)
                    );
                } else if count > 1 {
                    log::warn!("Executor returned {} tool calls, honouring the first", count);
                }
                reply.tool_calls.into_iter().next()
            }
            Err(e) => {
                log::warn!("Executor call failed: {}", e);
                None
            }
        }
    }

    async fn act(
        &mut self,
        state: &mut AgentState,
        call: ToolCallRequest,
        offered: &[ToolName],
    ) -> Result<Option<SessionStatus>> {
        let args = match call.parse_arguments() {
            Ok(args) => args,
            Err(e) => {
                let error = DispatchError::Arguments(e.to_string());
                log::warn!("{}: {}", call.name, error);
                Self::record(state, &call.name, Value::Null, String::new(), format!("Error: {}", error));
                return Ok(None);
            }
        };

        let request = match ToolDispatcher::<B>::validate(&call.name, &args, offered, state.phase_name()) {
            Ok(request) => request,
            Err(error) => {
                log::warn!("Rejected {}: {}", call.name, error);
                let justification = args
                    .get("justification")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                Self::record(state, &call.name, args, justification, format!("Error: {}", error));
                return Ok(None);
            }
        };

        if let Action::ReportCompletion { evidence } = &request.action {
            return Ok(self.check_completion(state, evidence));
        }

        let target = truncate(
            args.get("label")
                .or_else(|| args.get("text"))
                .or_else(|| args.get("key"))
                .and_then(Value::as_str)
                .unwrap_or(""),
            30,
        );
        log::info!("Action: {} target: {}", call.name, target);

        let justification = request.justification.clone();
        match self.dispatcher.dispatch(&request, state.screen()).await {
            Ok(outcome) => {
                log::info!("{}", outcome);
                Self::record(state, &call.name, args, justification, outcome);
                Ok(None)
            }
            Err(error) => {
                let outcome = format!("Error: {}", error);
                log::warn!("{}", outcome);
                Self::record(state, &call.name, args, justification, outcome);
                if error.is_fatal() {
                    return Err(anyhow::Error::new(error).context("input device failed"));
                }
                Ok(None)
            }
        }
    }

    fn check_completion(&self, state: &AgentState, evidence: &str) -> Option<SessionStatus> {
        let evidence = evidence.trim();
        let length = evidence.chars().count();
        if length < self.config.completion_min_chars {
            log::warn!(
                "Insufficient completion evidence ({} of {} chars)",
                length,
                self.config.completion_min_chars
            );
            return None;
        }
        if self.config.require_verification_phase
            && !state.phase_name().to_uppercase().contains("VERIF")
        {
            log::warn!(
                "Completion reported outside a verification phase ({})",
                state.phase_name()
            );
            return None;
        }

        log::info!("Mission complete. Evidence: {}", evidence);
        Some(SessionStatus::Completed {
            turns: state.turn(),
            evidence: evidence.to_string(),
        })
    }

    fn record(state: &mut AgentState, tool: &str, args: Value, justification: String, result: String) {
        let entry = HistoryEntry {
            turn: state.turn(),
            tool: tool.to_string(),
            args,
            justification,
            result,
            screenshot: state.frame_ref().to_string(),
        };
        state.record(entry);
    }
}
