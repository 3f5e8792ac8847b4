use crate::qrcode::QrCode;

use image::{ImageBuffer, ImageFormat, Luma};
use sha2::{Digest, Sha256};
use std::io::Cursor;

/// Width of the light margin drawn around a symbol, in modules.
pub const QUIET_ZONE: i32 = 4;

/*---- Utilities ----*/

/// Renders a QR Code as block characters, two module rows per text line.
///
/// With `invert` off, dark modules print as spaces and light modules as
/// blocks, which reads correctly on a dark terminal. Every line, including
/// the last, ends with `\n`.
///
/// # Example
///
/// ```rust
/// use qrcode_provider::helper::to_small_string;
/// use qrcode_provider::qrcode::{QrCode, QrCodeEcc};
///
/// let qr = QrCode::encode_text("qrcode", QrCodeEcc::Medium).unwrap();
/// let art = to_small_string(&qr, true, false);
/// assert_eq!(art.lines().count(), 15);
/// ```
pub fn to_small_string(qr: &QrCode, border: bool, invert: bool) -> String {
    let margin = if border { QUIET_ZONE } else { 0 };
    let span = -margin..qr.size() + margin;
    let rows: Vec<Vec<bool>> = span
        .clone()
        .map(|y| span.clone().map(|x| qr.get_module(x, y)).collect())
        .collect();

    let mut result = String::new();
    for pair in rows.chunks(2) {
        if let [top, bottom] = pair {
            for (&upper, &lower) in top.iter().zip(bottom) {
                result.push(match (upper == lower, upper != invert) {
                    (true, true) => ' ',
                    (true, false) => '█',
                    (false, true) => '▄',
                    (false, false) => '▀',
                });
            }
        } else {
            // Odd final row
            for &module in pair.iter().flatten() {
                result.push(if module != invert { ' ' } else { '▀' });
            }
        }
        result.push('\n');
    }
    result
}

/// Draws a QR Code into a grayscale image of exactly `size` by `size` pixels.
///
/// The symbol and its quiet zone are scaled by a whole number of pixels per
/// module and centered; leftover pixels stay white. A `size` smaller than
/// the symbol grows to one pixel per module.
pub fn to_image_buffer(qr: &QrCode, size: u32) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let modules = (qr.size() + 2 * QUIET_ZONE) as u32;
    let size = size.max(modules);
    let scale = size / modules;
    let offset = (size - modules * scale) / 2;
    let mut img = ImageBuffer::new(size, size);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let inside = (offset..offset + modules * scale).contains(&x)
            && (offset..offset + modules * scale).contains(&y);
        let dark = inside
            && qr.get_module(
                ((x - offset) / scale) as i32 - QUIET_ZONE,
                ((y - offset) / scale) as i32 - QUIET_ZONE,
            );
        *pixel = if dark {
            Luma([0u8]) // Black
        } else {
            Luma([255u8]) // White
        };
    }

    img
}

/// Encodes a QR Code as PNG bytes; see [`to_image_buffer`] for the layout.
pub fn to_png_bytes(qr: &QrCode, size: u32) -> Result<Vec<u8>, image::ImageError> {
    let img = to_image_buffer(qr, size);
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(data.as_ref()))
}
