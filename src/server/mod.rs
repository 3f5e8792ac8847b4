//! The plugin server.
//!
//! [`ProviderService`] owns the registered handlers and implements every
//! protocol operation on plain [`Object`]s. [`grpc`] exposes it as the
//! `tfplugin6.Provider` gRPC service, [`dynamic`] converts values to and
//! from the host's wire encoding, and [`plugin`] runs the process side of
//! the handshake.

pub mod dynamic;
pub mod grpc;
pub mod plugin;

pub use plugin::{
    check_magic_cookie, handshake_line, reattach_config, serve, serve_debug, ServeError,
    ServerCertificate, CLIENT_CERT_ENV, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
};

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, info_span};

use crate::error::ProviderError;
use crate::framework::diag::Diagnostics;
use crate::framework::schema::{is_set, Schema};
use crate::framework::{DataSource, Object, Provider, ProviderMetadata, Resource};

/// A planned resource state and the attributes that stay unknown until
/// apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannedState {
    pub state: Option<Object>,
    pub unknown: BTreeSet<String>,
}

/// Runs the schema check, then the handler's own check if the schema passed.
fn check(
    schema: &Schema,
    config: &Object,
    unknown: &BTreeSet<String>,
    handler_check: impl FnOnce() -> Result<(), ProviderError>,
    diags: &mut Diagnostics,
) -> bool {
    let found = schema.validate_partial(config, unknown);
    let valid = !found.has_error();
    diags.extend(found);
    if !valid {
        return false;
    }
    match handler_check() {
        Ok(()) => true,
        Err(err) => {
            diags.push(err.diagnostic());
            false
        }
    }
}

pub struct ProviderService {
    provider: Box<dyn Provider>,
    metadata: ProviderMetadata,
    data_sources: BTreeMap<String, Box<dyn DataSource>>,
    resources: BTreeMap<String, Box<dyn Resource>>,
}

impl ProviderService {
    pub fn new(provider: impl Provider + 'static) -> Self {
        let metadata = provider.metadata();
        let data_sources = provider
            .data_sources()
            .into_iter()
            .map(|d| (d.type_name(&metadata.type_name), d))
            .collect();
        let resources = provider
            .resources()
            .into_iter()
            .map(|r| (r.type_name(&metadata.type_name), r))
            .collect();
        Self {
            provider: Box::new(provider),
            metadata,
            data_sources,
            resources,
        }
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    pub fn provider_schema(&self) -> Schema {
        self.provider.schema()
    }

    pub fn data_source_schemas(&self) -> BTreeMap<&str, Schema> {
        self.data_sources
            .iter()
            .map(|(name, d)| (name.as_str(), d.schema()))
            .collect()
    }

    pub fn resource_schemas(&self) -> BTreeMap<&str, Schema> {
        self.resources
            .iter()
            .map(|(name, r)| (name.as_str(), r.schema()))
            .collect()
    }

    fn data_source(&self, type_name: &str) -> Result<&dyn DataSource, ProviderError> {
        self.data_sources
            .get(type_name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownType {
                kind: "data source",
                name: type_name.to_string(),
            })
    }

    fn resource(&self, type_name: &str) -> Result<&dyn Resource, ProviderError> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownType {
                kind: "resource",
                name: type_name.to_string(),
            })
    }

    pub fn check_provider_config(&self, config: &Object, diags: &mut Diagnostics) {
        check(&self.provider.schema(), config, &BTreeSet::new(), || Ok(()), diags);
    }

    pub fn configure(&self, config: &Object, diags: &mut Diagnostics) {
        let _span = info_span!("configure_provider").entered();
        let schema = self.provider.schema();
        if check(&schema, config, &BTreeSet::new(), || self.provider.configure(config), diags) {
            let redacted = serde_json::Value::Object(schema.redact(config));
            debug!(config = %redacted, "provider configured");
        }
    }

    pub fn check_data_source_config(
        &self,
        type_name: &str,
        config: &Object,
        unknown: &BTreeSet<String>,
        diags: &mut Diagnostics,
    ) -> Result<(), ProviderError> {
        let data_source = self.data_source(type_name)?;
        check(&data_source.schema(), config, unknown, || data_source.validate(config), diags);
        Ok(())
    }

    pub fn check_resource_config(
        &self,
        type_name: &str,
        config: &Object,
        unknown: &BTreeSet<String>,
        diags: &mut Diagnostics,
    ) -> Result<(), ProviderError> {
        let resource = self.resource(type_name)?;
        check(&resource.schema(), config, unknown, || resource.validate(config), diags);
        Ok(())
    }

    /// Reads a data source. Returns `None` when validation failed; the
    /// reasons are in `diags`.
    pub fn read_data(
        &self,
        type_name: &str,
        config: &Object,
        diags: &mut Diagnostics,
    ) -> Result<Option<Object>, ProviderError> {
        let _span = info_span!("read_data_source", type_name).entered();
        let data_source = self.data_source(type_name)?;
        let schema = data_source.schema();
        if !check(&schema, config, &BTreeSet::new(), || data_source.validate(config), diags) {
            return Ok(None);
        }
        let redacted = serde_json::Value::Object(schema.redact(config));
        debug!(config = %redacted, "reading data source");
        data_source.read(config).map(Some)
    }

    /// Plans a resource change. A missing proposed state plans a destroy.
    ///
    /// Computed attributes the plan leaves unset are reported as unknown,
    /// along with every unknown attribute of the proposed state.
    pub fn plan_change(
        &self,
        type_name: &str,
        prior: Option<&Object>,
        proposed: Option<&Object>,
        config: &Object,
        unknown: &BTreeSet<String>,
        diags: &mut Diagnostics,
    ) -> Result<PlannedState, ProviderError> {
        let _span = info_span!("plan_resource_change", type_name).entered();
        let resource = self.resource(type_name)?;
        let Some(proposed) = proposed else {
            return Ok(PlannedState::default());
        };
        let schema = resource.schema();
        if !check(&schema, config, unknown, || resource.validate(config), diags) {
            return Ok(PlannedState::default());
        }

        let planned = resource.plan(prior, proposed);
        let mut pending = unknown.clone();
        pending.extend(
            schema
                .attributes
                .iter()
                .filter(|(name, attribute)| attribute.computed && !is_set(&planned, name))
                .map(|(name, _)| name.clone()),
        );
        let redacted = serde_json::Value::Object(schema.redact(&planned));
        debug!(planned = %redacted, unknown = ?pending, "planned resource change");
        Ok(PlannedState {
            state: Some(planned),
            unknown: pending,
        })
    }

    /// Applies a planned change: no prior state creates, no planned state
    /// deletes, both update.
    pub fn apply_change(
        &self,
        type_name: &str,
        prior: Option<&Object>,
        planned: Option<&Object>,
    ) -> Result<Option<Object>, ProviderError> {
        let _span = info_span!("apply_resource_change", type_name).entered();
        let resource = self.resource(type_name)?;
        match (prior, planned) {
            (None, None) => Ok(None),
            (Some(prior), None) => {
                resource.delete(prior)?;
                info!("resource deleted");
                Ok(None)
            }
            (None, Some(planned)) => resource.create(planned).map(Some),
            (Some(prior), Some(planned)) => resource.update(prior, planned).map(Some),
        }
    }

    pub fn refresh(&self, type_name: &str, current: &Object) -> Result<Option<Object>, ProviderError> {
        let _span = info_span!("read_resource", type_name).entered();
        self.resource(type_name)?.read(current)
    }

    /// Brings stored state up to the current schema: attributes the schema
    /// no longer has are dropped and new ones start out null.
    pub fn upgrade_state(&self, type_name: &str, stored: &Object) -> Result<Object, ProviderError> {
        let schema = self.resource(type_name)?.schema();
        Ok(schema
            .attributes
            .keys()
            .map(|name| {
                let value = stored.get(name).cloned().unwrap_or(serde_json::Value::Null);
                (name.clone(), value)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::QrCodeProvider;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn service() -> ProviderService {
        ProviderService::new(QrCodeProvider::new("test"))
    }

    fn object(value: Value) -> Object {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn none() -> BTreeSet<String> {
        BTreeSet::new()
    }

    #[test]
    fn test_registry() {
        let service = service();
        assert_eq!(service.metadata().type_name, "qrcode");
        assert!(service.data_source_schemas().contains_key("qrcode_generate"));
        assert!(service.resource_schemas().contains_key("qrcode_generate"));
        assert!(service.provider_schema().attributes.is_empty());
    }

    #[test]
    fn test_read_data() {
        let mut diags = Diagnostics::default();
        let state = service()
            .read_data("qrcode_generate", &object(json!({"text": "qrcode"})), &mut diags)
            .unwrap()
            .unwrap();
        assert!(diags.is_empty());
        assert_eq!(
            state["ascii_sha256"],
            json!("1008c2f94d40f67e0f9f212284e9535aff2919fb256d512ad5edfa02929b55a5")
        );
    }

    #[test]
    fn test_read_data_validation_stops_encoding() {
        let mut diags = Diagnostics::default();
        let state = service()
            .read_data(
                "qrcode_generate",
                &object(json!({"text": "a", "sensitive_text": "b"})),
                &mut diags,
            )
            .unwrap();
        assert!(state.is_none());
        assert_eq!(diags.iter().next().unwrap().summary, "Invalid Attribute Combination");
    }

    #[test]
    fn test_unknown_type() {
        let mut diags = Diagnostics::default();
        let err = service()
            .read_data("qrcode_other", &Object::new(), &mut diags)
            .unwrap_err();
        assert_eq!(err.diagnostic().summary, "Unknown data source type");
        assert!(service().refresh("qrcode_other", &Object::new()).is_err());
    }

    #[test]
    fn test_check_resource_config_sizes() {
        let service = service();
        for (size, ok) in [(99, false), (100, true), (2000, true), (2001, false)] {
            let mut diags = Diagnostics::default();
            let config = object(json!({"text": "a", "file": "x.png", "size": size}));
            service
                .check_resource_config("qrcode_generate", &config, &none(), &mut diags)
                .unwrap();
            assert_eq!(!diags.has_error(), ok, "size {size}");
        }
    }

    #[test]
    fn test_plan_marks_digest_unknown() {
        let config = object(json!({"text": "qrcode", "sensitive_text": null, "size": null, "file": "qr.png"}));
        let mut proposed = config.clone();
        proposed.insert("sha256".into(), Value::Null);
        let mut diags = Diagnostics::default();
        let planned = service()
            .plan_change("qrcode_generate", None, Some(&proposed), &config, &none(), &mut diags)
            .unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(planned.unknown, ["sha256".to_string()].into());
        assert_eq!(planned.state.unwrap()["file"], json!("qr.png"));
    }

    #[test]
    fn test_plan_with_unknown_text() {
        let config = object(json!({"sensitive_text": null, "size": null, "file": "qr.png"}));
        let unknown: BTreeSet<String> = ["text".to_string()].into();
        let prior = object(json!({"text": "old", "sensitive_text": null, "size": null, "file": "qr.png", "sha256": "abc"}));
        let mut diags = Diagnostics::default();
        let planned = service()
            .plan_change("qrcode_generate", Some(&prior), Some(&config), &config, &unknown, &mut diags)
            .unwrap();
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(planned.unknown, ["sha256".to_string(), "text".to_string()].into());
    }

    #[test]
    fn test_plan_destroy() {
        let mut diags = Diagnostics::default();
        let planned = service()
            .plan_change("qrcode_generate", None, None, &Object::new(), &none(), &mut diags)
            .unwrap();
        assert_eq!(planned, PlannedState::default());
    }

    #[test]
    fn test_apply_lifecycle() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("qr.png");
        let service = service();
        let planned = object(json!({"text": "qrcode", "sensitive_text": null, "size": null, "file": file.to_str().unwrap(), "sha256": null}));

        let state = service
            .apply_change("qrcode_generate", None, Some(&planned))
            .unwrap()
            .unwrap();
        assert!(file.exists());
        assert_eq!(service.refresh("qrcode_generate", &state).unwrap(), Some(state.clone()));

        let gone = service
            .apply_change("qrcode_generate", Some(&state), None)
            .unwrap();
        assert!(gone.is_none());
        assert!(!file.exists());
        assert_eq!(service.refresh("qrcode_generate", &state).unwrap(), None);
    }

    #[test]
    fn test_upgrade_state_fits_schema() {
        let stored = object(json!({"text": "qrcode", "file": "qr.png", "sha256": "abc", "legacy": true}));
        let upgraded = service().upgrade_state("qrcode_generate", &stored).unwrap();
        assert_eq!(
            Value::Object(upgraded),
            json!({"text": "qrcode", "sensitive_text": null, "size": null, "file": "qr.png", "sha256": "abc"})
        );
    }
}
