pub mod coords;
#[cfg(windows)]
pub mod compositor;
pub mod png;
pub mod store;

pub use store::FrameStore;

use crate::error::CaptureError;
use crate::types::{Frame, ScreenDims};

/// A composed, scaled capture of the desktop before encoding.
#[derive(Debug, Clone)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    /// Top-down rows of BGRA (or BGRX) pixels.
    pub bgra: Vec<u8>,
    /// Size of the desktop the raster was scaled from.
    pub screen: ScreenDims,
}

/// Something that can produce a picture of the whole desktop with the
/// pointer drawn in.
pub trait ScreenSource: Send {
    fn capture(&mut self, width: u32, height: u32) -> Result<Raster, CaptureError>;
}

/// Capture, compose and encode one frame for `turn`.
pub fn capture_frame<S: ScreenSource + ?Sized>(
    source: &mut S,
    width: u32,
    height: u32,
    turn: u32,
) -> Result<(Frame, ScreenDims), CaptureError> {
    let raster = source.capture(width, height)?;
    let png = png::encode_bgra(&raster.bgra, raster.width, raster.height)?;
    Ok((
        Frame::new(turn, raster.width, raster.height, png),
        raster.screen,
    ))
}

/// Deterministic stand-in desktop: a gradient whose blue channel shifts with
/// every capture, plus a white 2x2 block where the pointer is.
#[derive(Debug, Clone)]
pub struct SyntheticScreen {
    dims: ScreenDims,
    cursor: Option<(i32, i32)>,
    captures: u32,
}

impl SyntheticScreen {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            dims: ScreenDims::new(width, height),
            cursor: None,
            captures: 0,
        }
    }

    pub fn with_cursor(mut self, x: i32, y: i32) -> Self {
        self.cursor = Some((x, y));
        self
    }
}

impl ScreenSource for SyntheticScreen {
    fn capture(&mut self, width: u32, height: u32) -> Result<Raster, CaptureError> {
        self.captures += 1;
        let mut bgra = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                bgra.extend_from_slice(&[
                    (self.captures % 256) as u8,
                    (y % 256) as u8,
                    (x % 256) as u8,
                    0xFF,
                ]);
            }
        }

        if let Some((cx, cy)) = self.cursor {
            let tx = coords::screen_to_target(cx, self.dims.width, width);
            let ty = coords::screen_to_target(cy, self.dims.height, height);
            for y in ty..ty + 2 {
                for x in tx..tx + 2 {
                    if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                        let i = (y as usize * width as usize + x as usize) * 4;
                        bgra[i..i + 3].copy_from_slice(&[0xFF, 0xFF, 0xFF]);
                    }
                }
            }
        }

        Ok(Raster {
            width,
            height,
            bgra,
            screen: self.dims,
        })
    }
}
