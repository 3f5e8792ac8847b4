//! Resolution of user-supplied generation options.

use crate::error::ProviderError;
use crate::qrcode::QrCodeEcc;

/// Image size used when the resource does not set one, in pixels.
pub const DEFAULT_SIZE: i64 = 256;
pub const MIN_SIZE: i64 = 100;
pub const MAX_SIZE: i64 = 2000;

/// Maps an error correction letter to a level.
///
/// Letters are case-insensitive; an absent or empty value means medium.
///
/// ```rust
/// use qrcode_provider::options::resolve_error_correction;
/// use qrcode_provider::qrcode::QrCodeEcc;
///
/// assert_eq!(resolve_error_correction(Some("q")).unwrap(), QrCodeEcc::Quartile);
/// assert_eq!(resolve_error_correction(None).unwrap(), QrCodeEcc::Medium);
/// assert!(resolve_error_correction(Some("X")).is_err());
/// ```
pub fn resolve_error_correction(value: Option<&str>) -> Result<QrCodeEcc, ProviderError> {
    match value.unwrap_or_default().to_ascii_uppercase().as_str() {
        "L" => Ok(QrCodeEcc::Low),
        "M" | "" => Ok(QrCodeEcc::Medium),
        "Q" => Ok(QrCodeEcc::Quartile),
        "H" => Ok(QrCodeEcc::High),
        _ => Err(ProviderError::invalid_configuration(
            "Invalid Error Correction Level",
            "Supported values: L (low), M (medium), Q (high), H (highest).",
        )
        .with_attribute("error_correction")),
    }
}

/// Picks the text to encode from the plain and sensitive inputs.
///
/// The schema already guarantees exactly one is set; this re-checks so a
/// handler never encodes from an ambiguous request.
pub fn select_text<'a>(
    text: Option<&'a str>,
    sensitive_text: Option<&'a str>,
) -> Result<&'a str, ProviderError> {
    match (text, sensitive_text) {
        (Some(text), None) | (None, Some(text)) => Ok(text),
        (Some(_), Some(_)) => Err(ProviderError::invalid_configuration(
            "Invalid Attribute Combination",
            "2 attributes specified when one (and only one) of [text,sensitive_text] is required",
        )
        .with_attribute("text")),
        (None, None) => Err(ProviderError::invalid_configuration(
            "Missing Attribute Configuration",
            "Exactly one of these attributes must be configured: [text,sensitive_text]",
        )
        .with_attribute("text")),
    }
}

/// Returns the image size in pixels, applying the default and bounds.
pub fn resolve_size(size: Option<i64>) -> Result<u32, ProviderError> {
    let size = size.unwrap_or(DEFAULT_SIZE);
    if !(MIN_SIZE..=MAX_SIZE).contains(&size) {
        return Err(ProviderError::invalid_configuration(
            "Invalid Size",
            format!("Size must be between {MIN_SIZE} and {MAX_SIZE} pixels."),
        )
        .with_attribute("size"));
    }
    Ok(size as u32)
}
