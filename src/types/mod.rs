pub mod action;
pub mod history;

pub use action::{Action, ActionRequest, ClickKind, NormPoint, ScrollDirection};
pub use history::HistoryEntry;

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Size of the live desktop in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenDims {
    pub width: u32,
    pub height: u32,
}

impl ScreenDims {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.width / 2) as i32, (self.height / 2) as i32)
    }
}

/// One encoded capture of the desktop, tagged with the turn that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    turn: u32,
    width: u32,
    height: u32,
    png: Vec<u8>,
}

impl Frame {
    pub fn new(turn: u32, width: u32, height: u32, png: Vec<u8>) -> Self {
        Self {
            turn,
            width,
            height,
            png,
        }
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn data_url(&self) -> String {
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.png)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_data_url() {
        let frame = Frame::new(3, 2, 1, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(frame.turn(), 3);
        assert_eq!(frame.data_url(), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_screen_center() {
        assert_eq!(ScreenDims::new(1920, 1080).center(), (960, 540));
        assert_eq!(ScreenDims::new(1, 1).center(), (0, 0));
    }
}
