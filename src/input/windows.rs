//! SendInput-backed injection for the interactive Windows desktop.

use std::mem;

use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL, MOUSEINPUT,
    MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

use super::{InputBackend, InputEvent, MouseButton};
use crate::error::InputError;

#[derive(Debug, Default)]
pub struct SendInputBackend;

impl SendInputBackend {
    pub fn new() -> Self {
        Self
    }
}

fn mouse(flags: MOUSE_EVENT_FLAGS, data: i32) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data as u32,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn keyboard(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn to_native(event: &InputEvent) -> INPUT {
    match *event {
        InputEvent::ButtonDown(MouseButton::Left) => mouse(MOUSEEVENTF_LEFTDOWN, 0),
        InputEvent::ButtonUp(MouseButton::Left) => mouse(MOUSEEVENTF_LEFTUP, 0),
        InputEvent::ButtonDown(MouseButton::Right) => mouse(MOUSEEVENTF_RIGHTDOWN, 0),
        InputEvent::ButtonUp(MouseButton::Right) => mouse(MOUSEEVENTF_RIGHTUP, 0),
        InputEvent::Wheel(delta) => mouse(MOUSEEVENTF_WHEEL, delta),
        InputEvent::Unicode { unit, up } => {
            let flags = if up {
                KEYEVENTF_UNICODE | KEYEVENTF_KEYUP
            } else {
                KEYEVENTF_UNICODE
            };
            keyboard(0, unit, flags)
        }
        InputEvent::Key { vk, up } => {
            let flags = if up {
                KEYEVENTF_KEYUP
            } else {
                KEYBD_EVENT_FLAGS(0)
            };
            keyboard(vk, 0, flags)
        }
    }
}

impl InputBackend for SendInputBackend {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        unsafe { SetCursorPos(x, y) }.map_err(|_| InputError::CursorMove)
    }

    fn send(&mut self, events: &[InputEvent]) -> Result<(), InputError> {
        if events.is_empty() {
            return Ok(());
        }
        let inputs: Vec<INPUT> = events.iter().map(to_native).collect();
        let sent = unsafe { SendInput(&inputs, mem::size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            return Err(InputError::SendInput {
                sent,
                expected: inputs.len() as u32,
            });
        }
        Ok(())
    }
}
