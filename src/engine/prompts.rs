//! Prompt bodies for the three tiers and the history digest they share.

use super::loop_detector::Stagnation;
use super::state::AgentState;

const DOCTRINE_EXCERPT_CHARS: usize = 400;
const DIGEST_ENTRIES: usize = 8;
const TARGET_CHARS: usize = 30;
const OUTCOME_CHARS: usize = 60;

pub const PLANNER_PROMPT: &str = r#"You are the planner for a Windows desktop automation agent.

INPUT: a mission from the user and a screenshot of the desktop as it is now.

Produce a doctrine with exactly these six numbered sections:

1. MISSION
   The goal restated in operational terms.

2. RECONNAISSANCE
   What has to be observed or confirmed before acting: open windows, focus, visible controls.

3. EXECUTION OPTIONS (4-7)
   Alternative paths depending on what reconnaissance finds, one or two sentences each.
   - If the target application is already visible, work in it directly
   - If the desktop is empty, launch the application from the Start menu
   - If the wrong application has focus, close or minimise it first

4. VERIFICATION
   The visual evidence that proves the mission succeeded.

5. RISKS
   Hazards specific to this interface, e.g. menus that close on their own, pages that
   load slowly, strokes too thin to see.

6. SUPERVISOR GUIDANCE (150 words max)
   When to move between phases, which tools suit each phase, how to mitigate the risks,
   and that report_completion belongs to the verification phase only.

Be terse. No conversation. Exactly six sections."#;

const SUPERVISOR_TEMPLATE: &str = r#"You supervise phase changes for this desktop mission:

{mission}

DOCTRINE:
{doctrine}

RESPONSIBILITIES:
- Judge the current phase from the screenshot
- Move to a new phase only on visual evidence
- Configure the Executor for each phase with your tools
- Track progress and adjust

TOOLS:
1. spawn_executor_prompt - write the Executor's system prompt and name the phase
2. update_phase_tools - choose the tools the Executor may use in that phase

PHASE GUIDELINES:
- RECONNAISSANCE: navigation tools only, never report_completion
- EXECUTION: the tools the task needs, never report_completion
- VERIFICATION: everything the task needs plus report_completion

A phase change needs both tools in the same reply. If nothing should change,
answer with a short status line and no tool calls."#;

pub const EXECUTOR_FALLBACK_PROMPT: &str = r#"You operate a Windows desktop one action at a time.

Each turn, make exactly ONE tool call that advances the current phase.

COORDINATES:
- Give the centre point as [x, y]
- Both axes run from 0 to 1000
- [0, 0] is the top-left corner, [1000, 1000] the bottom-right

JUSTIFY EVERY ACTION WITH:
- what you can see
- why this action
- what you expect to happen

RULES:
- One action, never a sequence
- Only target elements that are visible in the screenshot
- Justifications of at least 50 words"#;

pub fn supervisor_prompt(mission: &str, doctrine: &str) -> String {
    SUPERVISOR_TEMPLATE
        .replace("{mission}", mission)
        .replace("{doctrine}", doctrine)
}

pub fn planner_instructions(mission: &str) -> String {
    format!("Mission: {}", mission)
}

pub fn supervisor_instructions(digest: &str) -> String {
    format!(
        r#"{digest}

CURRENT SCREENSHOT: [attached]

ASSESS:
1. Is the current phase complete, in progress or blocked?
2. If the phase should change: call spawn_executor_prompt AND update_phase_tools
3. Otherwise: reply with a brief status only

update_phase_tools takes tool NAMES, not definitions.
Enable report_completion ONLY in a verification phase."#
    )
}

pub fn executor_instructions(digest: &str) -> String {
    format!(
        r#"{digest}

CURRENT SCREENSHOT: [attached]

ACT: make ONE precise tool call toward the current phase goal,
with a justification of 50 words or more."#
    )
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Compact context shared by the Supervisor and the Executor.
pub fn history_digest(state: &AgentState, warning: Option<&Stagnation>) -> String {
    let mut lines = vec![format!("MISSION: {}\n", state.mission())];

    if !state.doctrine().is_empty() {
        lines.push(format!(
            "DOCTRINE:\n{}...\n",
            truncate(state.doctrine(), DOCTRINE_EXCERPT_CHARS)
        ));
    }

    lines.push(format!("CURRENT PHASE: {}\n", state.phase_name()));

    let history = state.history();
    if !history.is_empty() {
        lines.push("RECENT ACTIONS:".to_string());
        let start = history.len().saturating_sub(DIGEST_ENTRIES);
        for entry in &history[start..] {
            lines.push(format!(
                "  T{}: {}({}) → {}",
                entry.turn,
                entry.tool,
                truncate(entry.target(), TARGET_CHARS),
                truncate(&entry.result, OUTCOME_CHARS)
            ));
        }
    }

    if let Some(stagnation) = warning {
        lines.push(format!("\n{}", stagnation));
    }

    lines.join("\n")
}
