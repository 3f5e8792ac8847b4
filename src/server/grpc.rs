//! The `tfplugin6.Provider` gRPC service on top of [`ProviderService`].
//!
//! Every call answers with diagnostics rather than a gRPC error; the host
//! shows those to the user. Only a value that cannot be decoded at all is
//! reported the same way, as an error diagnostic.

use std::collections::BTreeSet;

use tonic::{Request, Response, Status};
use tracing::warn;

use super::dynamic::{self, Decoded};
use super::ProviderService;
use crate::error::ProviderError;
use crate::framework::diag::{Diagnostic, Diagnostics, Severity};
use crate::framework::schema::Schema;
use crate::framework::Object;
use crate::proto::tfplugin6::provider_server::Provider as ProviderRpc;
use crate::proto::tfplugin6::{
    self, apply_resource_change, attribute_path, configure_provider, diagnostic, get_metadata,
    get_provider_schema, import_resource_state, plan_resource_change, read_data_source,
    read_resource, schema, stop_provider, upgrade_resource_state, validate_data_resource_config,
    validate_provider_config, validate_resource_config, AttributePath, DynamicValue,
    ServerCapabilities, StringKind,
};

fn capabilities() -> ServerCapabilities {
    ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

pub fn schema_to_proto(schema: &Schema) -> tfplugin6::Schema {
    let attributes = schema
        .attributes
        .iter()
        .map(|(name, attribute)| schema::Attribute {
            name: name.clone(),
            r#type: serde_json::Value::from(attribute.kind.name())
                .to_string()
                .into_bytes(),
            description: attribute.description.clone(),
            required: attribute.required,
            optional: attribute.optional,
            computed: attribute.computed,
            sensitive: attribute.sensitive,
            description_kind: StringKind::Plain as i32,
            deprecated: false,
        })
        .collect();
    tfplugin6::Schema {
        version: schema.version,
        block: Some(schema::Block {
            version: schema.version,
            attributes,
            description: schema.description.clone(),
            description_kind: StringKind::Markdown as i32,
            deprecated: false,
        }),
    }
}

fn diagnostic_to_proto(diag: &Diagnostic) -> tfplugin6::Diagnostic {
    let severity = match diag.severity {
        Severity::Error => diagnostic::Severity::Error,
        Severity::Warning => diagnostic::Severity::Warning,
    };
    tfplugin6::Diagnostic {
        severity: severity as i32,
        summary: diag.summary.clone(),
        detail: diag.detail.clone(),
        attribute: diag.attribute.as_ref().map(|name| AttributePath {
            steps: vec![attribute_path::Step {
                selector: Some(attribute_path::step::Selector::AttributeName(name.clone())),
            }],
        }),
    }
}

pub fn diagnostics_to_proto(diags: &Diagnostics) -> Vec<tfplugin6::Diagnostic> {
    diags.iter().map(diagnostic_to_proto).collect()
}

fn decode(method: &str, value: Option<&DynamicValue>) -> Result<Decoded, ProviderError> {
    dynamic::decode(value).map_err(|err| ProviderError::InvalidRequest {
        method: method.to_string(),
        detail: err.to_string(),
    })
}

fn encode(
    method: &str,
    object: Option<&Object>,
    unknown: &BTreeSet<String>,
) -> Result<DynamicValue, ProviderError> {
    dynamic::encode(object, unknown).map_err(|err| ProviderError::InvalidRequest {
        method: method.to_string(),
        detail: err.to_string(),
    })
}

/// Folds a failed call into `diags`.
fn settle<T>(method: &str, result: Result<T, ProviderError>, diags: &mut Diagnostics) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(method, error = %err, "request failed");
            diags.push(err.diagnostic());
            None
        }
    }
}

#[tonic::async_trait]
impl ProviderRpc for ProviderService {
    async fn get_metadata(
        &self,
        _request: Request<get_metadata::Request>,
    ) -> Result<Response<get_metadata::Response>, Status> {
        let data_sources = self
            .data_source_schemas()
            .into_keys()
            .map(|name| get_metadata::DataSourceMetadata {
                type_name: name.to_string(),
            })
            .collect();
        let resources = self
            .resource_schemas()
            .into_keys()
            .map(|name| get_metadata::ResourceMetadata {
                type_name: name.to_string(),
            })
            .collect();
        Ok(Response::new(get_metadata::Response {
            server_capabilities: Some(capabilities()),
            diagnostics: Vec::new(),
            data_sources,
            resources,
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<get_provider_schema::Request>,
    ) -> Result<Response<get_provider_schema::Response>, Status> {
        Ok(Response::new(get_provider_schema::Response {
            provider: Some(schema_to_proto(&self.provider_schema())),
            resource_schemas: self
                .resource_schemas()
                .iter()
                .map(|(name, schema)| (name.to_string(), schema_to_proto(schema)))
                .collect(),
            data_source_schemas: self
                .data_source_schemas()
                .iter()
                .map(|(name, schema)| (name.to_string(), schema_to_proto(schema)))
                .collect(),
            diagnostics: Vec::new(),
            provider_meta: None,
            server_capabilities: Some(capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<validate_provider_config::Request>,
    ) -> Result<Response<validate_provider_config::Response>, Status> {
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let decoded = decode("ValidateProviderConfig", request.config.as_ref());
        if let Some(config) = settle("ValidateProviderConfig", decoded, &mut diags) {
            self.check_provider_config(&config.into_object(), &mut diags);
        }
        Ok(Response::new(validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<validate_resource_config::Request>,
    ) -> Result<Response<validate_resource_config::Response>, Status> {
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = decode("ValidateResourceConfig", request.config.as_ref()).and_then(|config| {
            let unknown = config.unknown.clone();
            self.check_resource_config(&request.type_name, &config.into_object(), &unknown, &mut diags)
        });
        settle("ValidateResourceConfig", result, &mut diags);
        Ok(Response::new(validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<validate_data_resource_config::Request>,
    ) -> Result<Response<validate_data_resource_config::Response>, Status> {
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = decode("ValidateDataResourceConfig", request.config.as_ref()).and_then(|config| {
            let unknown = config.unknown.clone();
            self.check_data_source_config(&request.type_name, &config.into_object(), &unknown, &mut diags)
        });
        settle("ValidateDataResourceConfig", result, &mut diags);
        Ok(Response::new(validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<upgrade_resource_state::Request>,
    ) -> Result<Response<upgrade_resource_state::Response>, Status> {
        const METHOD: &str = "UpgradeResourceState";
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let raw = request.raw_state.map(|raw| raw.json).unwrap_or_default();
        let result = dynamic::decode_json(&raw)
            .map_err(|err| ProviderError::InvalidRequest {
                method: METHOD.to_string(),
                detail: err.to_string(),
            })
            .and_then(|stored| self.upgrade_state(&request.type_name, &stored.into_object()))
            .and_then(|upgraded| encode(METHOD, Some(&upgraded), &BTreeSet::new()));
        let upgraded_state = settle(METHOD, result, &mut diags);
        Ok(Response::new(upgrade_resource_state::Response {
            upgraded_state,
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<configure_provider::Request>,
    ) -> Result<Response<configure_provider::Response>, Status> {
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let decoded = decode("ConfigureProvider", request.config.as_ref());
        if let Some(config) = settle("ConfigureProvider", decoded, &mut diags) {
            self.configure(&config.into_object(), &mut diags);
        }
        Ok(Response::new(configure_provider::Response {
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<read_resource::Request>,
    ) -> Result<Response<read_resource::Response>, Status> {
        const METHOD: &str = "ReadResource";
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = decode(METHOD, request.current_state.as_ref())
            .and_then(|current| match current.object {
                Some(current) => self.refresh(&request.type_name, &current),
                None => Ok(None),
            })
            .and_then(|state| encode(METHOD, state.as_ref(), &BTreeSet::new()));
        let new_state = settle(METHOD, result, &mut diags);
        Ok(Response::new(read_resource::Response {
            new_state,
            diagnostics: diagnostics_to_proto(&diags),
            private: request.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<plan_resource_change::Request>,
    ) -> Result<Response<plan_resource_change::Response>, Status> {
        const METHOD: &str = "PlanResourceChange";
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = (|| {
            let prior = decode(METHOD, request.prior_state.as_ref())?.object;
            let proposed = decode(METHOD, request.proposed_new_state.as_ref())?;
            let config = decode(METHOD, request.config.as_ref())?;
            let mut unknown = proposed.unknown;
            unknown.extend(config.unknown);
            let planned = self.plan_change(
                &request.type_name,
                prior.as_ref(),
                proposed.object.as_ref(),
                &config.object.unwrap_or_default(),
                &unknown,
                &mut diags,
            )?;
            encode(METHOD, planned.state.as_ref(), &planned.unknown)
        })();
        let planned_state = settle(METHOD, result, &mut diags);
        Ok(Response::new(plan_resource_change::Response {
            planned_state,
            requires_replace: Vec::new(),
            planned_private: request.prior_private,
            diagnostics: diagnostics_to_proto(&diags),
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<apply_resource_change::Request>,
    ) -> Result<Response<apply_resource_change::Response>, Status> {
        const METHOD: &str = "ApplyResourceChange";
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = (|| {
            let prior = decode(METHOD, request.prior_state.as_ref())?.object;
            let planned = decode(METHOD, request.planned_state.as_ref())?.object;
            let state = self.apply_change(&request.type_name, prior.as_ref(), planned.as_ref())?;
            encode(METHOD, state.as_ref(), &BTreeSet::new())
        })();
        let new_state = settle(METHOD, result, &mut diags);
        Ok(Response::new(apply_resource_change::Response {
            new_state,
            private: request.planned_private,
            diagnostics: diagnostics_to_proto(&diags),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<import_resource_state::Request>,
    ) -> Result<Response<import_resource_state::Response>, Status> {
        let request = request.into_inner();
        let diags: Diagnostics = Diagnostic::error(
            "Resource Import Not Implemented",
            format!(
                "This resource does not support import. {} has no state to read back from {:?}.",
                request.type_name, request.id
            ),
        )
        .into();
        Ok(Response::new(import_resource_state::Response {
            imported_resources: Vec::new(),
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<read_data_source::Request>,
    ) -> Result<Response<read_data_source::Response>, Status> {
        const METHOD: &str = "ReadDataSource";
        let request = request.into_inner();
        let mut diags = Diagnostics::default();
        let result = (|| {
            let config = decode(METHOD, request.config.as_ref())?.into_object();
            match self.read_data(&request.type_name, &config, &mut diags)? {
                Some(state) => encode(METHOD, Some(&state), &BTreeSet::new()).map(Some),
                None => Ok(None),
            }
        })();
        let state = settle(METHOD, result, &mut diags).flatten();
        Ok(Response::new(read_data_source::Response {
            state,
            diagnostics: diagnostics_to_proto(&diags),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<stop_provider::Request>,
    ) -> Result<Response<stop_provider::Response>, Status> {
        // Operations run to completion synchronously; nothing is left to cancel
        Ok(Response::new(stop_provider::Response {
            error: String::new(),
        }))
    }
}
