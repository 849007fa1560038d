pub mod dispatcher;

pub use dispatcher::ToolDispatcher;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Every tool the oracle may call. Executor tools act on the desktop;
/// the last two only reconfigure the Executor and belong to the Supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ReportCompletion,
    ClickElement,
    DoubleClickElement,
    RightClickElement,
    DragElement,
    TypeText,
    PressKey,
    ScrollDown,
    ScrollUp,
    SpawnExecutorPrompt,
    UpdatePhaseTools,
}

/// Tools of the built-in phase used when the Supervisor never configures one.
pub const FALLBACK_TOOLS: [ToolName; 5] = [
    ToolName::ClickElement,
    ToolName::PressKey,
    ToolName::TypeText,
    ToolName::ScrollDown,
    ToolName::ScrollUp,
];

const JUSTIFICATION_DESC: &str =
    "Brief reasoning (30-50 words): what you see, why this action, expected outcome";

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ReportCompletion => "report_completion",
            ToolName::ClickElement => "click_element",
            ToolName::DoubleClickElement => "double_click_element",
            ToolName::RightClickElement => "right_click_element",
            ToolName::DragElement => "drag_element",
            ToolName::TypeText => "type_text",
            ToolName::PressKey => "press_key",
            ToolName::ScrollDown => "scroll_down",
            ToolName::ScrollUp => "scroll_up",
            ToolName::SpawnExecutorPrompt => "spawn_executor_prompt",
            ToolName::UpdatePhaseTools => "update_phase_tools",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "report_completion" => Some(ToolName::ReportCompletion),
            "click_element" => Some(ToolName::ClickElement),
            "double_click_element" => Some(ToolName::DoubleClickElement),
            "right_click_element" => Some(ToolName::RightClickElement),
            "drag_element" => Some(ToolName::DragElement),
            "type_text" => Some(ToolName::TypeText),
            "press_key" => Some(ToolName::PressKey),
            "scroll_down" => Some(ToolName::ScrollDown),
            "scroll_up" => Some(ToolName::ScrollUp),
            "spawn_executor_prompt" => Some(ToolName::SpawnExecutorPrompt),
            "update_phase_tools" => Some(ToolName::UpdatePhaseTools),
            _ => None,
        }
    }

    pub fn executor_tools() -> Vec<Self> {
        vec![
            ToolName::ReportCompletion,
            ToolName::ClickElement,
            ToolName::DoubleClickElement,
            ToolName::RightClickElement,
            ToolName::DragElement,
            ToolName::TypeText,
            ToolName::PressKey,
            ToolName::ScrollDown,
            ToolName::ScrollUp,
        ]
    }

    pub fn supervisor_tools() -> Vec<Self> {
        vec![ToolName::SpawnExecutorPrompt, ToolName::UpdatePhaseTools]
    }

    pub fn is_supervisor_only(&self) -> bool {
        matches!(
            self,
            ToolName::SpawnExecutorPrompt | ToolName::UpdatePhaseTools
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolName::ReportCompletion => "Report task completion (ONLY use in verification phase)",
            ToolName::ClickElement => "Click on UI element",
            ToolName::DoubleClickElement => "Double-click element",
            ToolName::RightClickElement => "Right-click element",
            ToolName::DragElement => "Drag from start to end",
            ToolName::TypeText => "Type text",
            ToolName::PressKey => "Press keyboard key or combo",
            ToolName::ScrollDown => "Scroll downward",
            ToolName::ScrollUp => "Scroll upward",
            ToolName::SpawnExecutorPrompt => {
                "Create or update Executor's system prompt for current phase"
            }
            ToolName::UpdatePhaseTools => "Define available tool subset for Executor in current phase",
        }
    }

    pub fn parameters_schema(&self) -> Value {
        let point = |desc: &str| {
            json!({
                "type": "array",
                "items": {"type": "number"},
                "minItems": 2,
                "maxItems": 2,
                "description": desc
            })
        };

        match self {
            ToolName::ReportCompletion => json!({
                "type": "object",
                "properties": {
                    "evidence": {"type": "string", "description": "Visual proof of completion (100 words)"}
                },
                "required": ["evidence"]
            }),
            ToolName::ClickElement | ToolName::DoubleClickElement | ToolName::RightClickElement => {
                json!({
                    "type": "object",
                    "properties": {
                        "justification": {"type": "string", "description": JUSTIFICATION_DESC},
                        "label": {"type": "string", "description": "Element name"},
                        "position": point("Center point [x,y] in 0-1000 scale")
                    },
                    "required": ["justification", "label", "position"]
                })
            }
            ToolName::DragElement => json!({
                "type": "object",
                "properties": {
                    "justification": {"type": "string", "description": JUSTIFICATION_DESC},
                    "label": {"type": "string", "description": "Element being dragged"},
                    "start": point("Start point [x,y] in 0-1000 scale"),
                    "end": point("End point [x,y] in 0-1000 scale")
                },
                "required": ["justification", "label", "start", "end"]
            }),
            ToolName::TypeText => json!({
                "type": "object",
                "properties": {
                    "justification": {"type": "string", "description": JUSTIFICATION_DESC},
                    "text": {"type": "string", "description": "Text to type"}
                },
                "required": ["justification", "text"]
            }),
            ToolName::PressKey => json!({
                "type": "object",
                "properties": {
                    "justification": {"type": "string", "description": JUSTIFICATION_DESC},
                    "key": {"type": "string", "description": "Key name or combo (e.g. 'enter', 'ctrl+c', 'windows')"}
                },
                "required": ["justification", "key"]
            }),
            ToolName::ScrollDown | ToolName::ScrollUp => json!({
                "type": "object",
                "properties": {
                    "justification": {"type": "string", "description": JUSTIFICATION_DESC}
                },
                "required": ["justification"]
            }),
            ToolName::SpawnExecutorPrompt => json!({
                "type": "object",
                "properties": {
                    "prompt": {
                        "type": "string",
                        "description": "Complete system prompt for Executor (200-400 words): phase goals, precision requirements, risk warnings, coordinate system reminder, justification requirements."
                    },
                    "phase": {
                        "type": "string",
                        "description": "Phase name (e.g., 'RECONNAISSANCE', 'EXECUTION_NOTEPAD', 'VERIFICATION')"
                    },
                    "rationale": {"type": "string", "description": "Why this prompt update is needed (50-100 words)"}
                },
                "required": ["prompt", "phase", "rationale"]
            }),
            ToolName::UpdatePhaseTools => json!({
                "type": "object",
                "properties": {
                    "tool_names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Tool names to enable (e.g., ['click_element', 'press_key', 'report_completion'])"
                    },
                    "rationale": {"type": "string", "description": "Why these specific tools for this phase (50 words)"}
                },
                "required": ["tool_names", "rationale"]
            }),
        }
    }

    /// Function-calling definition in the chat-completions wire shape.
    pub fn definition(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.as_str(),
                "description": self.description(),
                "parameters": self.parameters_schema(),
            }
        })
    }
}

pub fn definitions(tools: &[ToolName]) -> Vec<Value> {
    tools.iter().map(ToolName::definition).collect()
}

/// Resolve Supervisor-supplied names to Executor tools, dropping anything
/// unknown or reserved for the Supervisor.
pub fn resolve_executor_tools(names: &[String]) -> Vec<ToolName> {
    let mut tools = Vec::new();
    for name in names {
        match ToolName::from_str(name.trim()) {
            Some(tool) if !tool.is_supervisor_only() => {
                if !tools.contains(&tool) {
                    tools.push(tool);
                }
            }
            _ => log::warn!("Ignoring tool '{}' in phase tool set", name),
        }
    }
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for tool in ToolName::executor_tools()
            .into_iter()
            .chain(ToolName::supervisor_tools())
        {
            assert_eq!(ToolName::from_str(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::from_str("launch_missiles"), None);
    }

    #[test]
    fn test_definition_shape() {
        let def = ToolName::PressKey.definition();
        assert_eq!(def["type"], "function");
        assert_eq!(def["function"]["name"], "press_key");
        assert_eq!(def["function"]["parameters"]["type"], "object");
        assert!(def["function"]["parameters"]["required"]
            .as_array()
            .unwrap()
            .contains(&Value::from("key")));
    }

    #[test]
    fn test_resolve_executor_tools_filters() {
        let names = vec![
            "click_element".to_string(),
            "spawn_executor_prompt".to_string(),
            "bogus".to_string(),
            "click_element".to_string(),
            " report_completion ".to_string(),
        ];
        assert_eq!(
            resolve_executor_tools(&names),
            vec![ToolName::ClickElement, ToolName::ReportCompletion]
        );
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&ToolName::DoubleClickElement).unwrap();
        assert_eq!(json, "\"double_click_element\"");
    }
}
