use thiserror::Error;

use crate::tools::ToolName;

/// Failures of the capture pipeline. All are fatal to the current capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("{0} failed")]
    ContextAcquisition(&'static str),
    #[error("StretchBlt failed")]
    Blit,
    #[error("raster readback failed: {0}")]
    Readback(String),
    #[error("screen capture is not supported on this platform")]
    Unsupported,
    #[error("image encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("SendInput injected {sent} of {expected} events")]
    SendInput { sent: u32, expected: u32 },
    #[error("SetCursorPos failed")]
    CursorMove,
    #[error("Unknown key '{0}'")]
    UnknownKey(String),
    #[error("empty key chord")]
    EmptyChord,
}

/// Why a round trip to the decision service produced nothing usable.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("oracle returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response contained no choices")]
    Empty,
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout
        } else if err.is_decode() {
            OracleError::Malformed(err.to_string())
        } else {
            OracleError::Transport(err.to_string())
        }
    }
}

/// Rejections produced while validating or executing one requested action.
///
/// Everything except `Input` is a local rejection that ends up in history;
/// `Input` means the device itself failed and is fatal to the session.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0} required")]
    Missing(&'static str),
    #[error("start and end must differ")]
    DegenerateDrag,
    #[error("malformed arguments: {0}")]
    Arguments(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
    #[error("tool '{tool}' is not enabled for phase {phase}")]
    NotEnabled { tool: String, phase: String },
    #[error("tool '{0}' is reserved for the supervisor")]
    SupervisorOnly(String),
    #[error("tool '{}' has no input action", .0.as_str())]
    NoInputAction(ToolName),
    #[error("{0}")]
    Key(InputError),
    #[error("input failed: {0}")]
    Input(#[from] InputError),
}

impl DispatchError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::Input(_))
    }
}
