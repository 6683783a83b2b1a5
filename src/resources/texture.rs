use anyhow::*;
use image::{ImageFormat, load_from_memory_with_format};

/// Decodes image file contents into RGBA8.
///
/// `mime_type` is a hint (e.g. `image/png`, as glTF declares it). Without
/// one, or with one the `image` crate doesn't know, the format is guessed
/// from the bytes.
pub fn decode(bytes: &[u8], mime_type: Option<&str>) -> Result<image::RgbaImage> {
    let img = match mime_type.and_then(ImageFormat::from_mime_type) {
        Some(format) => load_from_memory_with_format(bytes, format)?,
        None => image::load_from_memory(bytes)?,
    };
    Ok(img.to_rgba8())
}
