use serde_json::Value;

use crate::capture::coords::norm_to_px;
use crate::error::DispatchError;
use crate::input::{InputBackend, InputInjector};
use crate::tools::ToolName;
use crate::types::{Action, ActionRequest, ClickKind, ScreenDims, ScrollDirection};

const TYPED_ECHO_CHARS: usize = 50;

/// Turns one validated action into exactly one input sequence.
pub struct ToolDispatcher<B: InputBackend> {
    injector: InputInjector<B>,
}

impl<B: InputBackend> ToolDispatcher<B> {
    pub fn new(injector: InputInjector<B>) -> Self {
        Self { injector }
    }

    /// Parse an Executor tool call and check it against the tools offered
    /// for the active phase.
    pub fn validate(
        name: &str,
        args: &Value,
        offered: &[ToolName],
        phase: &str,
    ) -> Result<ActionRequest, DispatchError> {
        let request = ActionRequest::parse(name, args)?;
        if !offered.contains(&request.tool()) {
            return Err(DispatchError::NotEnabled {
                tool: name.to_string(),
                phase: phase.to_string(),
            });
        }
        Ok(request)
    }

    /// Perform the action and describe what happened.
    ///
    /// Completion reports carry no input and are refused; the control loop
    /// handles them before dispatch.
    pub async fn dispatch(
        &mut self,
        request: &ActionRequest,
        screen: ScreenDims,
    ) -> Result<String, DispatchError> {
        match &request.action {
            Action::Click {
                kind,
                label,
                position,
            } => {
                let (x, y) = norm_to_px(*position, screen);
                self.injector.move_to(x, y)?;
                self.injector.settle().await;
                match kind {
                    ClickKind::Single => self.injector.click()?,
                    ClickKind::Double => self.injector.double_click().await?,
                    ClickKind::Right => self.injector.right_click()?,
                }
                self.injector.await_render().await;
                Ok(format!("{}: {}", kind.past_tense(), label))
            }
            Action::Drag { label, start, end } => {
                let from = norm_to_px(*start, screen);
                let to = norm_to_px(*end, screen);
                self.injector.drag(from, to).await?;
                self.injector.await_render().await;
                Ok(format!("Dragged {}", label))
            }
            Action::TypeText { text } => {
                self.injector.type_text(text).await?;
                self.injector.await_render().await;
                let echo: String = text.chars().take(TYPED_ECHO_CHARS).collect();
                Ok(format!("Typed: {}", echo))
            }
            Action::PressKey { chord } => {
                self.injector.press_chord(chord)?;
                self.injector.await_render().await;
                Ok(format!("Pressed: {}", chord.text()))
            }
            Action::Scroll { direction } => {
                let (cx, cy) = screen.center();
                self.injector.move_to(cx, cy)?;
                self.injector.settle().await;
                self.injector.scroll(*direction)?;
                self.injector.await_render().await;
                Ok(match direction {
                    ScrollDirection::Down => "Scrolled down".to_string(),
                    ScrollDirection::Up => "Scrolled up".to_string(),
                })
            }
            Action::ReportCompletion { .. } => {
                Err(DispatchError::NoInputAction(ToolName::ReportCompletion))
            }
        }
    }
}
