//! # qrcode_provider
//!
//! A Terraform provider that renders text as QR codes.
//!
//! The provider exposes one block type, `qrcode_generate`, in two forms:
//!
//! - a data source producing the code as block-character art plus its
//!   SHA-256 checksum, with a choice of error correction level, border and
//!   color inversion;
//! - a resource writing the code as a PNG file of a given pixel size and
//!   tracking the file's SHA-256 checksum.
//!
//! The QR encoder itself lives in [`qrcode`] and renders through [`helper`];
//! both work on their own:
//!
//! ```rust
//! use qrcode_provider::helper::{sha256_hex, to_small_string};
//! use qrcode_provider::qrcode::{QrCode, QrCodeEcc};
//!
//! let qr = QrCode::encode_text("qrcode", QrCodeEcc::Medium).unwrap();
//! assert_eq!(qr.size(), 21);
//!
//! let art = to_small_string(&qr, true, false);
//! assert_eq!(art.lines().count(), 15);
//! assert_eq!(sha256_hex(&art).len(), 64);
//! ```
//!
//! ## Modules
//!
//! - [`qrcode`]: QR Code Model 2 encoding.
//! - [`helper`]: ASCII and PNG rendering, checksums.
//! - [`options`]: error correction, text and size resolution.
//! - [`framework`]: schemas, diagnostics and the handler traits.
//! - [`data_source`], [`resource`], [`provider`]: the provider itself.
//! - [`server`]: the plugin handshake and the `tfplugin6` gRPC service.
//! - [`proto`]: code generated from the protocol definitions.

#![forbid(unsafe_code)]

pub mod data_source;
pub mod error;
pub mod framework;
pub mod helper;
pub mod logging;
pub mod options;
pub mod proto;
pub mod provider;
pub mod qrcode;
pub mod resource;
pub mod server;

pub use error::ProviderError;
pub use provider::QrCodeProvider;
pub use server::ProviderService;

/// Version reported to the host. Release builds set
/// `QRCODE_PROVIDER_VERSION` at compile time.
pub const VERSION: &str = match option_env!("QRCODE_PROVIDER_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
