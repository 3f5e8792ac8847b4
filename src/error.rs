//! Error types shared by the handlers and the plugin server.

use std::io;
use std::path::PathBuf;

use crate::framework::diag::Diagnostic;
use crate::qrcode::DataTooLong;

/// Everything that can abort a provider operation.
///
/// Each variant becomes exactly one error [`Diagnostic`] for the host; no
/// partial state is written when an operation returns one of these.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// User input that fails validation: a bad error-correction letter, an
    /// out-of-range size, or a schema violation.
    #[error("{summary}: {detail}")]
    InvalidConfiguration {
        summary: String,
        detail: String,
        attribute: Option<String>,
    },

    /// The encoder rejected the input or the image could not be encoded.
    #[error("QR Code Generation Failed: {0}")]
    Encoding(String),

    /// Directory creation, file write or file removal failed.
    #[error("{summary}: {}: {source}", .path.display())]
    Filesystem {
        summary: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// State or configuration from the host does not match the typed model.
    #[error("invalid value for {type_name}: {source}")]
    State {
        type_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request named a data source or resource that is not registered.
    #[error("unknown {kind} type {name:?}")]
    UnknownType { kind: &'static str, name: String },

    /// The request could not be understood by the plugin server.
    #[error("invalid {method} request: {detail}")]
    InvalidRequest { method: String, detail: String },
}

impl ProviderError {
    pub fn invalid_configuration(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        ProviderError::InvalidConfiguration {
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Attaches the attribute the error concerns; a no-op for other kinds.
    pub fn with_attribute(self, name: &str) -> Self {
        match self {
            ProviderError::InvalidConfiguration {
                summary, detail, ..
            } => ProviderError::InvalidConfiguration {
                summary,
                detail,
                attribute: Some(name.to_string()),
            },
            other => other,
        }
    }

    pub fn filesystem(summary: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ProviderError::Filesystem {
            summary,
            path: path.into(),
            source,
        }
    }

    /// The user-facing form of this error.
    pub fn diagnostic(&self) -> Diagnostic {
        match self {
            ProviderError::InvalidConfiguration {
                summary,
                detail,
                attribute,
            } => {
                let diag = Diagnostic::error(summary.clone(), detail.clone());
                match attribute {
                    Some(name) => diag.with_attribute(name),
                    None => diag,
                }
            }
            ProviderError::Encoding(message) => {
                Diagnostic::error("QR Code Generation Failed", message.clone())
            }
            ProviderError::Filesystem {
                summary,
                path,
                source,
            } => Diagnostic::error(*summary, format!("{}: {}", path.display(), source)),
            ProviderError::State { type_name, source } => Diagnostic::error(
                "Value Conversion Error",
                format!("The value for {type_name} could not be converted: {source}"),
            ),
            ProviderError::UnknownType { kind, name } => Diagnostic::error(
                format!("Unknown {kind} type"),
                format!("This provider does not support the {kind} {name:?}."),
            ),
            ProviderError::InvalidRequest { method, detail } => {
                Diagnostic::error(format!("Invalid {method} request"), detail.clone())
            }
        }
    }
}

impl From<DataTooLong> for ProviderError {
    fn from(err: DataTooLong) -> Self {
        ProviderError::Encoding(format!("Could not generate QR code: {err}"))
    }
}

impl From<image::ImageError> for ProviderError {
    fn from(err: image::ImageError) -> Self {
        ProviderError::Encoding(format!("Could not encode PNG image: {err}"))
    }
}
