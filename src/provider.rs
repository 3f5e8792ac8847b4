//! The provider shell: type name, version and the handler registry.

use crate::data_source::GenerateDataSource;
use crate::framework::schema::Schema;
use crate::framework::{DataSource, Provider, ProviderMetadata, Resource};
use crate::resource::GenerateResource;

/// Type name every data source and resource name is prefixed with.
pub const TYPE_NAME: &str = "qrcode";

/// Registry address used in reattach instructions.
pub const PROVIDER_ADDRESS: &str = "registry.terraform.io/jackivanov/qrcode";

#[derive(Debug, Clone)]
pub struct QrCodeProvider {
    /// "dev" for local builds, "test" under test, the release tag otherwise.
    version: String,
}

impl QrCodeProvider {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Provider for QrCodeProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            type_name: TYPE_NAME.to_string(),
            version: self.version.clone(),
        }
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "The `qrcode` provider allows you to generate QR codes from input strings. \
             This can be useful for encoding configuration details, authentication keys, \
             or any other data in a scannable format. QR codes can be generated in PNG or \
             ASCII formats, making it easy to integrate into various workflows.",
        )
    }

    fn data_sources(&self) -> Vec<Box<dyn DataSource>> {
        vec![Box::new(GenerateDataSource::new())]
    }

    fn resources(&self) -> Vec<Box<dyn Resource>> {
        vec![Box::new(GenerateResource::new())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata() {
        let provider = QrCodeProvider::new("test");
        assert_eq!(
            provider.metadata(),
            ProviderMetadata {
                type_name: "qrcode".into(),
                version: "test".into(),
            }
        );
    }

    #[test]
    fn test_registers_generate_blocks() {
        let provider = QrCodeProvider::new("test");
        let data_sources: Vec<String> = provider
            .data_sources()
            .iter()
            .map(|d| d.type_name(TYPE_NAME))
            .collect();
        let resources: Vec<String> = provider
            .resources()
            .iter()
            .map(|r| r.type_name(TYPE_NAME))
            .collect();
        assert_eq!(data_sources, vec!["qrcode_generate"]);
        assert_eq!(resources, vec!["qrcode_generate"]);
    }

    #[test]
    fn test_schema_has_no_attributes() {
        assert!(QrCodeProvider::new("test").schema().attributes.is_empty());
    }
}
