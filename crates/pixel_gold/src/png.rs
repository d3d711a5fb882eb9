//! Writing candidate screenshots to disk.

use anyhow::{Context as _, Result, bail};
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder as _, RgbaImage};
use std::io::Write as _;
use std::path::Path;
use tempfile::{Builder, NamedTempFile};

/// Encodes RGBA8 pixels as PNG.
///
/// # Errors
///
/// Returns an error if the pixel buffer does not match the dimensions.
pub fn encode_png_rgba(rgba: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        bail!(
            "RGBA buffer holds {} bytes, expected {expected} for {width}x{height}",
            rgba.len()
        );
    }
    let mut buf = Vec::new();
    let encoder = PngEncoder::new(&mut buf);
    encoder.write_image(rgba, width, height, ColorType::Rgba8.into())?;
    Ok(buf)
}

/// Writes already-encoded PNG bytes to a fresh file in `dir`.
///
/// The file is deleted when the returned handle is dropped.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_temp_png(dir: &Path, png: &[u8]) -> Result<NamedTempFile> {
    let mut file = Builder::new()
        .prefix("candidate_")
        .suffix(".png")
        .tempfile_in(dir)
        .with_context(|| format!("creating temporary PNG in {}", dir.display()))?;
    file.write_all(png)?;
    file.flush()?;
    Ok(file)
}

/// Encodes `screenshot` and writes it to a fresh file in `dir`.
///
/// # Errors
///
/// Returns an error if encoding or writing fails.
pub fn write_temp_screenshot(dir: &Path, screenshot: &RgbaImage) -> Result<NamedTempFile> {
    let png = encode_png_rgba(screenshot.as_raw(), screenshot.width(), screenshot.height())?;
    write_temp_png(dir, &png)
}
