use anyhow::{Result, anyhow};
use image::{GenericImageView, ImageFormat};

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> Result<ImageFormat> {
    match mime_type {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        _ => Err(anyhow!("unsupported mime type: {mime_type}")),
    }
}

pub fn get_dimensions(bytes: &[u8], mime_type: &str) -> Result<(u32, u32)> {
    let format = mime_to_format(mime_type)?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| anyhow!("decode image failed: {err}"))?;
    Ok(image.dimensions())
}

/// Sniffs and fully decodes an uploaded image, returning its MIME type.
pub fn inspect_upload(bytes: &[u8]) -> Result<&'static str> {
    let mime_type = detect_mime_type(bytes).ok_or_else(|| anyhow!("unrecognised image format"))?;
    let (width, height) = get_dimensions(bytes, mime_type)?;
    if width == 0 || height == 0 {
        return Err(anyhow!("image has no pixels"));
    }
    Ok(mime_type)
}
