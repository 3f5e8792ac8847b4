//! The `<provider>_generate` data source: text in, ASCII QR code out.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::framework::schema::{Attribute, Schema, Validator};
use crate::framework::{decode, encode, DataSource, Object};
use crate::helper::{sha256_hex, to_small_string};
use crate::options::{resolve_error_correction, select_text};
use crate::qrcode::{QrCode, QrCodeEcc};

/// Configuration and state of the data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateDataSourceModel {
    pub text: Option<String>,
    pub sensitive_text: Option<String>,
    pub error_correction: Option<String>,
    pub disable_border: Option<bool>,
    pub invert: Option<bool>,
    pub ascii: Option<String>,
    pub ascii_sha256: Option<String>,
}

/// Renders `text` as block-character art.
pub fn generate_ascii(
    text: &str,
    level: QrCodeEcc,
    disable_border: bool,
    invert: bool,
) -> Result<String, ProviderError> {
    let qr = QrCode::encode_text(text, level)?;
    Ok(to_small_string(&qr, !disable_border, invert))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateDataSource;

impl GenerateDataSource {
    pub fn new() -> Self {
        GenerateDataSource
    }
}

impl DataSource for GenerateDataSource {
    fn type_name(&self, provider_type_name: &str) -> String {
        format!("{provider_type_name}_generate")
    }

    fn schema(&self) -> Schema {
        Schema::new("Generates a QR code as ASCII art.")
            .with_attribute(
                "text",
                Attribute::string("The text to encode as a QR code.")
                    .optional()
                    .with_validator(Validator::exactly_one_of(&["text", "sensitive_text"])),
            )
            .with_attribute(
                "sensitive_text",
                Attribute::string("Sensitive text to encode as a QR code.")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "error_correction",
                Attribute::string(
                    "Error correction level: L (low), M (medium, default), Q (high), H (highest).",
                )
                .optional(),
            )
            .with_attribute(
                "disable_border",
                Attribute::bool("Set to true to disable the QR Code border.").optional(),
            )
            .with_attribute(
                "invert",
                Attribute::bool("Set to true to invert black and white colors.").optional(),
            )
            .with_attribute(
                "ascii",
                Attribute::string("ASCII text representation of the QR code.").computed(),
            )
            .with_attribute(
                "ascii_sha256",
                Attribute::string("SHA-256 checksum of the ASCII QR code.").computed(),
            )
    }

    fn validate(&self, config: &Object) -> Result<(), ProviderError> {
        resolve_error_correction(config.get("error_correction").and_then(Value::as_str))?;
        Ok(())
    }

    fn read(&self, config: &Object) -> Result<Object, ProviderError> {
        let mut data: GenerateDataSourceModel = decode("data source", config)?;

        let level = resolve_error_correction(data.error_correction.as_deref())?;
        let text = select_text(data.text.as_deref(), data.sensitive_text.as_deref())?;
        let ascii = generate_ascii(
            text,
            level,
            data.disable_border.unwrap_or(false),
            data.invert.unwrap_or(false),
        )?;
        let checksum = sha256_hex(&ascii);
        debug!(level = ?level, ascii_sha256 = %checksum, "generated ascii qr code");

        data.ascii = Some(ascii);
        data.ascii_sha256 = Some(checksum);
        encode("data source", &data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Object {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_type_name() {
        assert_eq!(GenerateDataSource.type_name("qrcode"), "qrcode_generate");
    }

    #[test]
    fn test_read_defaults() {
        let state = GenerateDataSource.read(&config(json!({"text": "qrcode"}))).unwrap();
        let ascii = state["ascii"].as_str().unwrap();
        assert_eq!(state["ascii_sha256"], json!(sha256_hex(ascii)));
        assert_eq!(ascii.lines().count(), 15);
        assert_eq!(state["text"], json!("qrcode"));
        assert_eq!(state["sensitive_text"], Value::Null);
    }

    #[test]
    fn test_read_known_digest() {
        let state = GenerateDataSource.read(&config(json!({"text": "qrcode"}))).unwrap();
        assert_eq!(
            state["ascii_sha256"],
            json!("1008c2f94d40f67e0f9f212284e9535aff2919fb256d512ad5edfa02929b55a5")
        );
    }

    #[test]
    fn test_read_is_deterministic() {
        let cfg = config(json!({"text": "qrcode"}));
        let first = GenerateDataSource.read(&cfg).unwrap();
        let second = GenerateDataSource.read(&cfg).unwrap();
        assert_eq!(first["ascii_sha256"], second["ascii_sha256"]);
    }

    #[test]
    fn test_sensitive_text_matches_plain_text() {
        let plain = GenerateDataSource.read(&config(json!({"text": "secret"}))).unwrap();
        let hidden = GenerateDataSource
            .read(&config(json!({"sensitive_text": "secret"})))
            .unwrap();
        assert_eq!(plain["ascii"], hidden["ascii"]);
        assert_eq!(plain["ascii_sha256"], hidden["ascii_sha256"]);
    }

    #[test]
    fn test_options_change_output() {
        let base = GenerateDataSource.read(&config(json!({"text": "qrcode"}))).unwrap();
        let borderless = GenerateDataSource
            .read(&config(json!({"text": "qrcode", "disable_border": true})))
            .unwrap();
        let inverted = GenerateDataSource
            .read(&config(json!({"text": "qrcode", "invert": true})))
            .unwrap();
        let high = GenerateDataSource
            .read(&config(json!({"text": "qrcode", "error_correction": "h"})))
            .unwrap();
        assert_eq!(borderless["ascii"].as_str().unwrap().lines().count(), 11);
        assert_ne!(base["ascii_sha256"], inverted["ascii_sha256"]);
        assert_ne!(base["ascii_sha256"], high["ascii_sha256"]);
    }

    #[test]
    fn test_invalid_error_correction() {
        let cfg = config(json!({"text": "qrcode", "error_correction": "Z"}));
        assert!(GenerateDataSource.validate(&cfg).is_err());
        let err = GenerateDataSource.read(&cfg).unwrap_err();
        assert_eq!(err.diagnostic().summary, "Invalid Error Correction Level");
    }

    #[test]
    fn test_both_texts_rejected() {
        let err = GenerateDataSource
            .read(&config(json!({"text": "a", "sensitive_text": "b"})))
            .unwrap_err();
        assert_eq!(err.diagnostic().summary, "Invalid Attribute Combination");
    }

    #[test]
    fn test_text_too_long() {
        let text = "a".repeat(2000);
        let err = GenerateDataSource
            .read(&config(json!({"text": text, "error_correction": "H"})))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Encoding(_)));
    }
}
