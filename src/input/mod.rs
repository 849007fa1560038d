pub mod keys;
#[cfg(windows)]
pub mod windows;

pub use keys::KeyChord;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Timing;
use crate::error::InputError;
use crate::types::ScrollDirection;

/// Intermediate segments of a drag; the path visits `DRAG_STEPS + 1` points.
pub const DRAG_STEPS: i32 = 20;
/// One wheel notch.
pub const WHEEL_DELTA: i32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// A primitive event submitted to the OS input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    Wheel(i32),
    /// One UTF-16 unit typed in Unicode mode.
    Unicode { unit: u16, up: bool },
    Key { vk: u16, up: bool },
}

/// The OS seam. A batch passed to `send` is submitted as a single injection
/// so no foreign input can interleave with it.
pub trait InputBackend: Send {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), InputError>;
    fn send(&mut self, events: &[InputEvent]) -> Result<(), InputError>;
}

pub(crate) async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

/// Composes primitive events into clicks, drags, typing and chords with the
/// configured settle delays.
pub struct InputInjector<B: InputBackend> {
    backend: B,
    timing: Timing,
}

impl<B: InputBackend> InputInjector<B> {
    pub fn new(backend: B, timing: Timing) -> Self {
        Self { backend, timing }
    }

    pub async fn settle(&self) {
        pause(self.timing.cursor_settle_ms).await;
    }

    pub async fn await_render(&self) {
        pause(self.timing.ui_render_ms).await;
    }

    pub fn move_to(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.backend.move_to(x, y)
    }

    pub fn click(&mut self) -> Result<(), InputError> {
        self.backend.send(&[
            InputEvent::ButtonDown(MouseButton::Left),
            InputEvent::ButtonUp(MouseButton::Left),
        ])
    }

    pub async fn double_click(&mut self) -> Result<(), InputError> {
        self.click()?;
        pause(self.timing.click_double_ms).await;
        self.click()
    }

    pub fn right_click(&mut self) -> Result<(), InputError> {
        self.backend.send(&[
            InputEvent::ButtonDown(MouseButton::Right),
            InputEvent::ButtonUp(MouseButton::Right),
        ])
    }

    pub async fn drag(&mut self, start: (i32, i32), end: (i32, i32)) -> Result<(), InputError> {
        let (x1, y1) = start;
        let (x2, y2) = end;

        self.backend.move_to(x1, y1)?;
        pause(self.timing.drag_prepare_ms).await;
        self.backend
            .send(&[InputEvent::ButtonDown(MouseButton::Left)])?;
        pause(self.timing.cursor_settle_ms).await;

        for i in 0..=DRAG_STEPS {
            let t = i as f64 / DRAG_STEPS as f64;
            let x = (x1 as f64 + (x2 - x1) as f64 * t) as i32;
            let y = (y1 as f64 + (y2 - y1) as f64 * t) as i32;
            if let Err(e) = self.backend.move_to(x, y) {
                let _ = self.backend.send(&[InputEvent::ButtonUp(MouseButton::Left)]);
                return Err(e);
            }
            pause(self.timing.drag_step_ms).await;
        }

        pause(self.timing.cursor_settle_ms).await;
        self.backend.send(&[InputEvent::ButtonUp(MouseButton::Left)])
    }

    pub fn scroll(&mut self, direction: ScrollDirection) -> Result<(), InputError> {
        let delta = match direction {
            ScrollDirection::Up => WHEEL_DELTA,
            ScrollDirection::Down => -WHEEL_DELTA,
        };
        self.backend.send(&[InputEvent::Wheel(delta)])
    }

    pub async fn type_text(&mut self, text: &str) -> Result<(), InputError> {
        let mut units = [0u16; 2];
        for ch in text.chars() {
            for &unit in ch.encode_utf16(&mut units).iter() {
                self.backend.send(&[
                    InputEvent::Unicode { unit, up: false },
                    InputEvent::Unicode { unit, up: true },
                ])?;
            }
            pause(self.timing.input_char_ms).await;
        }
        Ok(())
    }

    /// Press every key in order, then release in reverse, as one batch.
    /// If the OS accepts only part of the batch, every key is released again
    /// so no modifier stays logically held.
    pub fn press_chord(&mut self, chord: &KeyChord) -> Result<(), InputError> {
        let keys = chord.keys();
        let mut events: Vec<InputEvent> = keys
            .iter()
            .map(|&vk| InputEvent::Key { vk, up: false })
            .collect();
        events.extend(keys.iter().rev().map(|&vk| InputEvent::Key { vk, up: true }));

        if let Err(e) = self.backend.send(&events) {
            let release: Vec<InputEvent> = keys
                .iter()
                .rev()
                .map(|&vk| InputEvent::Key { vk, up: true })
                .collect();
            let _ = self.backend.send(&release);
            return Err(e);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Move(i32, i32),
    Event(InputEvent),
}

/// Backend that records instead of injecting. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<Vec<Recorded>>>,
    failing_batches: Arc<Mutex<usize>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Event(e) => Some(e),
                Recorded::Move(..) => None,
            })
            .collect()
    }

    pub fn moves(&self) -> Vec<(i32, i32)> {
        self.recorded()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Move(x, y) => Some((x, y)),
                Recorded::Event(_) => None,
            })
            .collect()
    }

    /// Make the next `count` multi-event batches fail after injecting only
    /// their first event, the way a blocked SendInput does.
    pub fn fail_next_batches(&self, count: usize) {
        if let Ok(mut remaining) = self.failing_batches.lock() {
            *remaining = count;
        }
    }
}

impl InputBackend for RecordingBackend {
    fn move_to(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(Recorded::Move(x, y));
        }
        Ok(())
    }

    fn send(&mut self, events: &[InputEvent]) -> Result<(), InputError> {
        let mut accepted = events.len();
        if events.len() > 1 {
            if let Ok(mut remaining) = self.failing_batches.lock() {
                if *remaining > 0 {
                    *remaining -= 1;
                    accepted = 1;
                }
            }
        }
        if let Ok(mut log) = self.log.lock() {
            log.extend(events[..accepted].iter().copied().map(Recorded::Event));
        }
        if accepted < events.len() {
            return Err(InputError::SendInput {
                sent: accepted as u32,
                expected: events.len() as u32,
            });
        }
        Ok(())
    }
}
