//! QR rendering for messaging deep links.
//!
//! Payloads become grayscale PNG images: dark modules on a light quiet
//! zone, scaled up to at least the configured edge length. The HTTP layer
//! base64-encodes the bytes; this module only produces the PNG.

use qrcode::QrCode;
use siniestro_common::{Error, Result};

/// Render `payload` as a grayscale PNG QR image.
///
/// `min_size` is the minimum edge length in pixels; the renderer rounds up
/// so modules stay square.
pub fn render_png(payload: &str, min_size: u32) -> Result<Vec<u8>> {
    use image::ImageEncoder as _;
    use image::codecs::png::{CompressionType, FilterType, PngEncoder};

    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| Error::Encoding(format!("QR encoding failed: {}", e)))?;

    let img = code
        .render::<image::Luma<u8>>()
        .min_dimensions(min_size, min_size)
        .build();

    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, CompressionType::Fast, FilterType::Adaptive);
    let (w, h) = img.dimensions();
    encoder
        .write_image(img.as_raw(), w, h, image::ExtendedColorType::L8)
        .map_err(|e| Error::Encoding(format!("PNG encoding failed: {}", e)))?;

    Ok(buf)
}
