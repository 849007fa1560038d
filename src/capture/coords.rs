use crate::types::{NormPoint, ScreenDims};

/// Upper bound of the normalized grid on both axes.
pub const NORM_MAX: f64 = 1000.0;

/// Map one normalized axis value to a pixel index in `[0, dim - 1]`.
///
/// Out-of-range and non-finite inputs are clamped, so the result is always a
/// valid on-screen pixel.
pub fn norm_axis_to_px(value: f64, dim: u32) -> i32 {
    let max_px = dim.saturating_sub(1) as i64;
    let v = if value.is_nan() { 0.0 } else { value.clamp(0.0, NORM_MAX) };
    let px = ((v / NORM_MAX) * dim as f64).round() as i64;
    px.clamp(0, max_px) as i32
}

pub fn norm_to_px(point: NormPoint, screen: ScreenDims) -> (i32, i32) {
    (
        norm_axis_to_px(point.x, screen.width),
        norm_axis_to_px(point.y, screen.height),
    )
}

/// Remap a screen-space coordinate into a raster of `target` pixels along the
/// same axis. Used to place the cursor glyph on the scaled capture.
pub fn screen_to_target(value: i32, screen: u32, target: u32) -> i32 {
    if screen == 0 {
        return 0;
    }
    (value as f64 * (target as f64 / screen as f64)).round() as i32
}
