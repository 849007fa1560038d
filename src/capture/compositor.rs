//! GDI compositor: area-averaged scale of the whole desktop into an
//! off-screen DIB, with the live cursor glyph drawn at its scaled position.
//!
//! Every GDI handle is owned by a guard whose `Drop` releases it, so each exit
//! path, including early failures, gives back what was acquired so far.

use std::ffi::c_void;
use std::mem;

use windows::Win32::Foundation::{HANDLE, HWND};
use windows::Win32::Graphics::Gdi::{
    CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GdiFlush, GetDC, ReleaseDC,
    SelectObject, SetBrushOrgEx, SetStretchBltMode, StretchBlt, BITMAPINFO, BITMAPINFOHEADER,
    BI_RGB, DIB_RGB_COLORS, HALFTONE, HBITMAP, HBRUSH, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::UI::HiDpi::{
    SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DrawIconEx, GetCursorInfo, GetIconInfo, GetSystemMetrics, CURSORINFO, CURSOR_SHOWING,
    DI_NORMAL, HICON, ICONINFO, SM_CXSCREEN, SM_CYSCREEN,
};

use super::coords::screen_to_target;
use super::{Raster, ScreenSource};
use crate::error::CaptureError;
use crate::types::ScreenDims;

const FALLBACK_DIMS: ScreenDims = ScreenDims {
    width: 1920,
    height: 1080,
};

/// Opt in to per-monitor DPI awareness so metrics and capture use physical
/// pixels. Failure (e.g. already set by a manifest) is ignored.
pub fn init_dpi() {
    let _ = unsafe { SetProcessDpiAwarenessContext(DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2) };
}

pub fn screen_size() -> ScreenDims {
    let w = unsafe { GetSystemMetrics(SM_CXSCREEN) };
    let h = unsafe { GetSystemMetrics(SM_CYSCREEN) };
    ScreenDims {
        width: if w > 0 { w as u32 } else { FALLBACK_DIMS.width },
        height: if h > 0 { h as u32 } else { FALLBACK_DIMS.height },
    }
}

struct ScreenDc(HDC);

impl ScreenDc {
    fn acquire() -> Result<Self, CaptureError> {
        let hdc = unsafe { GetDC(HWND::default()) };
        if hdc.is_invalid() {
            return Err(CaptureError::ContextAcquisition("GetDC"));
        }
        Ok(Self(hdc))
    }
}

impl Drop for ScreenDc {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(HWND::default(), self.0);
        }
    }
}

struct MemoryDc(HDC);

impl MemoryDc {
    fn compatible_with(screen: &ScreenDc) -> Result<Self, CaptureError> {
        let hdc = unsafe { CreateCompatibleDC(screen.0) };
        if hdc.is_invalid() {
            return Err(CaptureError::ContextAcquisition("CreateCompatibleDC"));
        }
        Ok(Self(hdc))
    }
}

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.0);
        }
    }
}

/// Top-down 32bpp DIB and the pointer to its pixel memory.
struct DibSection {
    bitmap: HBITMAP,
    bits: *mut c_void,
    width: u32,
    height: u32,
}

impl DibSection {
    fn create(screen: &ScreenDc, width: u32, height: u32) -> Result<Self, CaptureError> {
        let info = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width as i32,
                // negative height selects a top-down row order
                biHeight: -(height as i32),
                biPlanes: 1,
                biBitCount: 32,
                biCompression: BI_RGB.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut bits: *mut c_void = std::ptr::null_mut();
        let bitmap = unsafe {
            CreateDIBSection(
                screen.0,
                &info,
                DIB_RGB_COLORS,
                &mut bits,
                HANDLE::default(),
                0,
            )
        }
        .map_err(|_| CaptureError::ContextAcquisition("CreateDIBSection"))?;

        let dib = Self {
            bitmap,
            bits,
            width,
            height,
        };
        if dib.bitmap.is_invalid() || dib.bits.is_null() {
            return Err(CaptureError::ContextAcquisition("CreateDIBSection"));
        }
        Ok(dib)
    }

    fn read(&self) -> Result<Vec<u8>, CaptureError> {
        if self.bits.is_null() {
            return Err(CaptureError::Readback("DIB has no pixel memory".to_string()));
        }
        let len = self.width as usize * self.height as usize * 4;
        unsafe {
            let _ = GdiFlush();
            Ok(std::slice::from_raw_parts(self.bits as *const u8, len).to_vec())
        }
    }
}

impl Drop for DibSection {
    fn drop(&mut self) {
        if !self.bitmap.is_invalid() {
            unsafe {
                let _ = DeleteObject(HGDIOBJ(self.bitmap.0));
            }
        }
    }
}

/// Bitmap selected into a DC; the previous object is restored on drop.
struct Selection {
    dc: HDC,
    previous: HGDIOBJ,
}

impl Selection {
    fn select(dc: &MemoryDc, dib: &DibSection) -> Self {
        let previous = unsafe { SelectObject(dc.0, HGDIOBJ(dib.bitmap.0)) };
        Self { dc: dc.0, previous }
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
        }
    }
}

/// Mask and colour bitmaps handed out by `GetIconInfo`; the caller owns them.
struct IconBitmaps(ICONINFO);

impl Drop for IconBitmaps {
    fn drop(&mut self) {
        unsafe {
            if !self.0.hbmMask.is_invalid() {
                let _ = DeleteObject(HGDIOBJ(self.0.hbmMask.0));
            }
            if !self.0.hbmColor.is_invalid() {
                let _ = DeleteObject(HGDIOBJ(self.0.hbmColor.0));
            }
        }
    }
}

/// Draw the pointer glyph into `dc`. A hidden or unreadable cursor is skipped.
fn draw_cursor(dc: &MemoryDc, screen: ScreenDims, width: u32, height: u32) {
    let mut info = CURSORINFO {
        cbSize: mem::size_of::<CURSORINFO>() as u32,
        ..Default::default()
    };
    if unsafe { GetCursorInfo(&mut info) }.is_err() || (info.flags.0 & CURSOR_SHOWING.0) == 0 {
        return;
    }

    let icon = HICON(info.hCursor.0);
    let mut icon_info = ICONINFO::default();
    if unsafe { GetIconInfo(icon, &mut icon_info) }.is_err() {
        return;
    }
    let icon_info = IconBitmaps(icon_info);

    let cx = info.ptScreenPos.x - icon_info.0.xHotspot as i32;
    let cy = info.ptScreenPos.y - icon_info.0.yHotspot as i32;
    let dx = screen_to_target(cx, screen.width, width);
    let dy = screen_to_target(cy, screen.height, height);

    if let Err(e) =
        unsafe { DrawIconEx(dc.0, dx, dy, icon, 0, 0, 0, HBRUSH::default(), DI_NORMAL) }
    {
        log::debug!("DrawIconEx failed: {}", e);
    }
}

/// The interactive desktop of the current session.
#[derive(Debug, Default)]
pub struct GdiScreen;

impl GdiScreen {
    pub fn new() -> Self {
        init_dpi();
        Self
    }
}

impl ScreenSource for GdiScreen {
    fn capture(&mut self, width: u32, height: u32) -> Result<Raster, CaptureError> {
        let screen = screen_size();

        let screen_dc = ScreenDc::acquire()?;
        let memory_dc = MemoryDc::compatible_with(&screen_dc)?;
        let dib = DibSection::create(&screen_dc, width, height)?;
        let selection = Selection::select(&memory_dc, &dib);

        unsafe {
            SetStretchBltMode(memory_dc.0, HALFTONE);
            let _ = SetBrushOrgEx(memory_dc.0, 0, 0, None);
        }
        let blitted = unsafe {
            StretchBlt(
                memory_dc.0,
                0,
                0,
                width as i32,
                height as i32,
                screen_dc.0,
                0,
                0,
                screen.width as i32,
                screen.height as i32,
                SRCCOPY,
            )
        };
        if !blitted.as_bool() {
            return Err(CaptureError::Blit);
        }

        draw_cursor(&memory_dc, screen, width, height);
        let bgra = dib.read()?;

        // Release order: deselect, delete bitmap, delete memory DC, release screen DC.
        drop(selection);
        drop(dib);
        drop(memory_dc);
        drop(screen_dc);

        Ok(Raster {
            width,
            height,
            bgra,
            screen,
        })
    }
}
