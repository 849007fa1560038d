use serde_json::Value;

use crate::error::DispatchError;
use crate::input::keys::KeyChord;
use crate::tools::ToolName;

/// A point on the normalized 0..=1000 grid the oracle reasons in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Single,
    Double,
    Right,
}

impl ClickKind {
    pub fn past_tense(&self) -> &'static str {
        match self {
            ClickKind::Single => "Clicked",
            ClickKind::Double => "Double-clicked",
            ClickKind::Right => "Right-clicked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click {
        kind: ClickKind,
        label: String,
        position: NormPoint,
    },
    Drag {
        label: String,
        start: NormPoint,
        end: NormPoint,
    },
    TypeText {
        text: String,
    },
    PressKey {
        chord: KeyChord,
    },
    Scroll {
        direction: ScrollDirection,
    },
    ReportCompletion {
        evidence: String,
    },
}

/// A fully validated Executor action. Consumed exactly once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action: Action,
    pub justification: String,
}

impl ActionRequest {
    /// Parse boundary between the oracle's loosely typed tool call and the
    /// closed set of actions. Anything that does not fit is rejected here.
    pub fn parse(name: &str, args: &Value) -> Result<Self, DispatchError> {
        let tool =
            ToolName::from_str(name).ok_or_else(|| DispatchError::UnknownTool(name.to_string()))?;
        let justification = str_arg(args, "justification").unwrap_or_default();

        let action = match tool {
            ToolName::ClickElement | ToolName::DoubleClickElement | ToolName::RightClickElement => {
                let kind = match tool {
                    ToolName::DoubleClickElement => ClickKind::Double,
                    ToolName::RightClickElement => ClickKind::Right,
                    _ => ClickKind::Single,
                };
                let label = non_empty(args, "label");
                let position = point_arg(args, "position");
                match (label, position) {
                    (Some(label), Some(position)) => Action::Click {
                        kind,
                        label,
                        position,
                    },
                    _ => return Err(DispatchError::Missing("label and position [x,y]")),
                }
            }
            ToolName::DragElement => {
                let label = non_empty(args, "label");
                let start = point_arg(args, "start");
                let end = point_arg(args, "end");
                match (label, start, end) {
                    (Some(label), Some(start), Some(end)) => {
                        if start == end {
                            return Err(DispatchError::DegenerateDrag);
                        }
                        Action::Drag { label, start, end }
                    }
                    _ => return Err(DispatchError::Missing("label, start [x,y], end [x,y]")),
                }
            }
            ToolName::TypeText => {
                let text = str_arg(args, "text")
                    .filter(|t| !t.is_empty())
                    .ok_or(DispatchError::Missing("text"))?;
                Action::TypeText { text }
            }
            ToolName::PressKey => {
                let key = str_arg(args, "key")
                    .filter(|k| !k.trim().is_empty())
                    .ok_or(DispatchError::Missing("key"))?;
                let chord = KeyChord::parse(&key).map_err(DispatchError::Key)?;
                Action::PressKey { chord }
            }
            ToolName::ScrollUp => Action::Scroll {
                direction: ScrollDirection::Up,
            },
            ToolName::ScrollDown => Action::Scroll {
                direction: ScrollDirection::Down,
            },
            ToolName::ReportCompletion => Action::ReportCompletion {
                evidence: str_arg(args, "evidence").unwrap_or_default(),
            },
            ToolName::SpawnExecutorPrompt | ToolName::UpdatePhaseTools => {
                return Err(DispatchError::SupervisorOnly(name.to_string()));
            }
        };

        Ok(Self {
            action,
            justification,
        })
    }

    pub fn tool(&self) -> ToolName {
        match &self.action {
            Action::Click { kind, .. } => match kind {
                ClickKind::Single => ToolName::ClickElement,
                ClickKind::Double => ToolName::DoubleClickElement,
                ClickKind::Right => ToolName::RightClickElement,
            },
            Action::Drag { .. } => ToolName::DragElement,
            Action::TypeText { .. } => ToolName::TypeText,
            Action::PressKey { .. } => ToolName::PressKey,
            Action::Scroll { direction } => match direction {
                ScrollDirection::Up => ToolName::ScrollUp,
                ScrollDirection::Down => ToolName::ScrollDown,
            },
            Action::ReportCompletion { .. } => ToolName::ReportCompletion,
        }
    }
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn non_empty(args: &Value, key: &str) -> Option<String> {
    str_arg(args, key).filter(|s| !s.trim().is_empty())
}

// Models occasionally quote numbers, so "500" is accepted alongside 500.
fn coord(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn point_arg(args: &Value, key: &str) -> Option<NormPoint> {
    let items = args.get(key)?.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some(NormPoint {
        x: coord(&items[0])?,
        y: coord(&items[1])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_click() {
        let req = ActionRequest::parse(
            "double_click_element",
            &json!({"justification": "icon visible", "label": "Recycle Bin", "position": [40, "60"]}),
        )
        .unwrap();
        assert_eq!(req.tool(), ToolName::DoubleClickElement);
        assert_eq!(req.justification, "icon visible");
        assert_eq!(
            req.action,
            Action::Click {
                kind: ClickKind::Double,
                label: "Recycle Bin".to_string(),
                position: NormPoint { x: 40.0, y: 60.0 },
            }
        );
    }

    #[test]
    fn test_click_requires_label_and_pair() {
        let err = ActionRequest::parse("click_element", &json!({"label": "", "position": [1, 2]}))
            .unwrap_err();
        assert_eq!(err.to_string(), "label and position [x,y] required");

        let err = ActionRequest::parse("click_element", &json!({"label": "OK", "position": [1, 2, 3]}))
            .unwrap_err();
        assert!(matches!(err, DispatchError::Missing(_)));
    }

    #[test]
    fn test_drag_requires_distinct_endpoints() {
        let err = ActionRequest::parse(
            "drag_element",
            &json!({"label": "file", "start": [10, 10], "end": [10, 10]}),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::DegenerateDrag));

        let err = ActionRequest::parse("drag_element", &json!({"label": "file", "start": [10, 10]}))
            .unwrap_err();
        assert_eq!(err.to_string(), "label, start [x,y], end [x,y] required");
    }

    #[test]
    fn test_unknown_key_rejected_at_parse() {
        let err = ActionRequest::parse("press_key", &json!({"key": "ctrl+hyper"})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown key 'hyper'");
    }

    #[test]
    fn test_unknown_and_supervisor_tools_rejected() {
        let err = ActionRequest::parse("open_browser", &json!({})).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownTool(_)));

        let err = ActionRequest::parse("update_phase_tools", &json!({"tool_names": []})).unwrap_err();
        assert!(matches!(err, DispatchError::SupervisorOnly(_)));
    }

    #[test]
    fn test_scroll_and_completion_need_no_fields() {
        let req = ActionRequest::parse("scroll_up", &json!({})).unwrap();
        assert_eq!(
            req.action,
            Action::Scroll {
                direction: ScrollDirection::Up
            }
        );

        let req = ActionRequest::parse("report_completion", &json!({})).unwrap();
        assert_eq!(
            req.action,
            Action::ReportCompletion {
                evidence: String::new()
            }
        );
    }
}
