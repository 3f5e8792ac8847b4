//! The `<provider>_generate` resource: a QR code PNG file on disk.
//!
//! Create and update both regenerate the whole image; a QR code is never
//! patched in place. Read notices when the file has been removed behind
//! the host's back and drops the resource so the next plan recreates it.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::framework::schema::{Attribute, Schema, Validator};
use crate::framework::{decode, encode, Object, Resource};
use crate::helper::{sha256_hex, to_png_bytes};
use crate::options::{resolve_size, select_text};
use crate::qrcode::{QrCode, QrCodeEcc};

/// Configuration and state of the resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResourceModel {
    pub text: Option<String>,
    pub sensitive_text: Option<String>,
    pub size: Option<i64>,
    pub file: Option<String>,
    pub sha256: Option<String>,
}

impl GenerateResourceModel {
    fn file_path(&self) -> Option<&Path> {
        self.file.as_deref().filter(|f| !f.is_empty()).map(Path::new)
    }
}

/// Encodes `text` at medium error correction as a `size` pixel PNG.
pub fn generate_png(text: &str, size: u32) -> Result<Vec<u8>, ProviderError> {
    let qr = QrCode::encode_text(text, QrCodeEcc::Medium)?;
    Ok(to_png_bytes(&qr, size)?)
}

/// Writes `bytes` to `path`, creating missing parent directories.
pub fn write_artifact(path: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)
            .map_err(|source| ProviderError::filesystem("Failed to Create Directory", dir, source))?;
    }
    write_file(path, bytes)
        .map_err(|source| ProviderError::filesystem("Failed to Save QR Code", path, source))
}

#[cfg(unix)]
fn create_dir_all(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o777).create(dir)
}

#[cfg(not(unix))]
fn create_dir_all(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;
    file.write_all(bytes)?;
    // mode() only applies when the file is created
    file.set_permissions(fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    fs::write(path, bytes)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateResource;

impl GenerateResource {
    pub fn new() -> Self {
        GenerateResource
    }
}

impl Resource for GenerateResource {
    fn type_name(&self, provider_type_name: &str) -> String {
        format!("{provider_type_name}_generate")
    }

    fn schema(&self) -> Schema {
        Schema::new("Generates a QR code PNG image and saves it to a file.")
            .with_attribute(
                "text",
                Attribute::string("The text content to encode in the QR code.")
                    .optional()
                    .with_validator(Validator::exactly_one_of(&["text", "sensitive_text"])),
            )
            .with_attribute(
                "sensitive_text",
                Attribute::string("Sensitive text content to encode in the QR code.")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "size",
                Attribute::int64("Size of the QR code image in pixels.").optional(),
            )
            .with_attribute(
                "file",
                Attribute::string("Path to save the generated QR code image.").required(),
            )
            .with_attribute(
                "sha256",
                Attribute::string("SHA-256 checksum of the generated QR code image.").computed(),
            )
    }

    fn validate(&self, config: &Object) -> Result<(), ProviderError> {
        resolve_size(config.get("size").and_then(Value::as_i64))?;
        Ok(())
    }

    fn create(&self, planned: &Object) -> Result<Object, ProviderError> {
        let mut plan: GenerateResourceModel = decode("resource", planned)?;

        let text = select_text(plan.text.as_deref(), plan.sensitive_text.as_deref())?;
        let size = resolve_size(plan.size)?;
        let path = plan.file_path().ok_or_else(|| {
            ProviderError::invalid_configuration(
                "Missing Configuration for Required Attribute",
                "Must set a configuration value for the file attribute as the provider has marked it as required.",
            )
            .with_attribute("file")
        })?;

        let png = generate_png(text, size)?;
        let checksum = sha256_hex(&png);
        write_artifact(path, &png)?;
        info!(file = %path.display(), size, sha256 = %checksum, "wrote qr code image");

        plan.sha256 = Some(checksum);
        encode("resource", &plan)
    }

    fn read(&self, current: &Object) -> Result<Option<Object>, ProviderError> {
        let state: GenerateResourceModel = decode("resource", current)?;
        let Some(path) = state.file_path() else {
            return Ok(Some(current.clone()));
        };

        match fs::metadata(path) {
            Ok(_) => Ok(Some(current.clone())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(file = %path.display(), "qr code image is missing, removing from state");
                Ok(None)
            }
            Err(err) => {
                warn!(file = %path.display(), error = %err, "could not check qr code image");
                Ok(Some(current.clone()))
            }
        }
    }

    fn update(&self, _prior: &Object, planned: &Object) -> Result<Object, ProviderError> {
        self.create(planned)
    }

    fn delete(&self, current: &Object) -> Result<(), ProviderError> {
        let state: GenerateResourceModel = decode("resource", current)?;
        let Some(path) = state.file_path() else {
            return Ok(());
        };

        match fs::remove_file(path) {
            Ok(()) => {
                info!(file = %path.display(), "removed qr code image");
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "qr code image already absent");
                Ok(())
            }
            Err(source) => Err(ProviderError::filesystem("Failed to Delete QR Code", path, source)),
        }
    }
}
