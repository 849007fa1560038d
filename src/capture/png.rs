//! Minimal lossless PNG writer: IHDR, a single zlib IDAT, IEND.
//!
//! Scanlines are written with filter type 0 and the image is 8-bit RGB with no
//! interlacing, so any conforming decoder reconstructs the exact input.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::CaptureError;

const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const COMPRESSION_LEVEL: u32 = 6;

fn write_chunk(out: &mut Vec<u8>, tag: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(tag);
    out.extend_from_slice(payload);

    let mut crc = crc32fast::Hasher::new();
    crc.update(tag);
    crc.update(payload);
    out.extend_from_slice(&crc.finalize().to_be_bytes());
}

/// Encode a tightly packed RGB buffer (`width * height * 3` bytes).
pub fn encode_rgb(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let row = width as usize * 3;
    let expected = row * height as usize;
    if width == 0 || height == 0 {
        return Err(CaptureError::Encode("image has no pixels".to_string()));
    }
    if rgb.len() != expected {
        return Err(CaptureError::Encode(format!(
            "expected {} RGB bytes for {}x{}, got {}",
            expected,
            width,
            height,
            rgb.len()
        )));
    }

    let mut raw = Vec::with_capacity(expected + height as usize);
    for line in rgb.chunks_exact(row) {
        raw.push(0);
        raw.extend_from_slice(line);
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    encoder
        .write_all(&raw)
        .map_err(|e| CaptureError::Encode(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CaptureError::Encode(e.to_string()))?;

    let mut header = Vec::with_capacity(13);
    header.extend_from_slice(&width.to_be_bytes());
    header.extend_from_slice(&height.to_be_bytes());
    // bit depth 8, colour type 2 (truecolour), deflate, filter method 0, no interlace
    header.extend_from_slice(&[8, 2, 0, 0, 0]);

    let mut png = Vec::with_capacity(compressed.len() + 64);
    png.extend_from_slice(&SIGNATURE);
    write_chunk(&mut png, b"IHDR", &header);
    write_chunk(&mut png, b"IDAT", &compressed);
    write_chunk(&mut png, b"IEND", &[]);
    Ok(png)
}

/// Reorder a BGRA/BGRX raster to RGB, dropping the fourth channel.
pub fn bgra_to_rgb(bgra: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(bgra.len() / 4 * 3);
    for px in bgra.chunks_exact(4) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    rgb
}

pub fn encode_bgra(bgra: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CaptureError> {
    let expected = width as usize * height as usize * 4;
    if bgra.len() != expected {
        return Err(CaptureError::Encode(format!(
            "expected {} BGRA bytes for {}x{}, got {}",
            expected,
            width,
            height,
            bgra.len()
        )));
    }
    encode_rgb(&bgra_to_rgb(bgra), width, height)
}
