//! The handler-facing side of the plugin protocol.
//!
//! The host speaks in terms of type names and JSON objects; handlers
//! implement [`DataSource`] or [`Resource`] and exchange typed models through
//! [`decode`] and [`encode`]. The [`Provider`] ties them together under one
//! type name and version.

pub mod diag;
pub mod schema;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use schema::{is_set, Schema};

/// A configuration, plan or state value: attribute name to JSON value.
pub type Object = serde_json::Map<String, Value>;

/// Name and version the provider reports to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderMetadata {
    pub type_name: String,
    pub version: String,
}

/// A read-only block, recomputed on every read.
pub trait DataSource: Send + Sync {
    /// Full type name, derived from the provider's type name.
    fn type_name(&self, provider_type_name: &str) -> String;

    fn schema(&self) -> Schema;

    /// Checks that go beyond the schema. Runs before any read.
    fn validate(&self, _config: &Object) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Produces the full state for `config`.
    fn read(&self, config: &Object) -> Result<Object, ProviderError>;
}

/// A managed piece of external state with a create/read/update/delete
/// lifecycle.
pub trait Resource: Send + Sync {
    fn type_name(&self, provider_type_name: &str) -> String;

    fn schema(&self) -> Schema;

    fn validate(&self, _config: &Object) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Computes the planned state; see [`plan_computed`].
    fn plan(&self, prior: Option<&Object>, proposed: &Object) -> Object {
        plan_computed(&self.schema(), prior, proposed)
    }

    fn create(&self, planned: &Object) -> Result<Object, ProviderError>;

    /// Refreshes `current`; `None` means the object is gone and must be
    /// dropped from state.
    fn read(&self, current: &Object) -> Result<Option<Object>, ProviderError>;

    fn update(&self, prior: &Object, planned: &Object) -> Result<Object, ProviderError>;

    fn delete(&self, current: &Object) -> Result<(), ProviderError>;
}

pub trait Provider: Send + Sync {
    fn metadata(&self) -> ProviderMetadata;

    fn schema(&self) -> Schema;

    fn configure(&self, _config: &Object) -> Result<(), ProviderError> {
        Ok(())
    }

    fn data_sources(&self) -> Vec<Box<dyn DataSource>>;

    fn resources(&self) -> Vec<Box<dyn Resource>>;
}

/// Deserializes a host object into a handler's typed model.
pub fn decode<T: DeserializeOwned>(type_name: &str, object: &Object) -> Result<T, ProviderError> {
    serde_json::from_value(Value::Object(object.clone())).map_err(|source| ProviderError::State {
        type_name: type_name.to_string(),
        source,
    })
}

/// Serializes a handler's typed model back into a host object.
pub fn encode<T: Serialize>(type_name: &str, model: &T) -> Result<Object, ProviderError> {
    let state_error = |source| ProviderError::State {
        type_name: type_name.to_string(),
        source,
    };
    match serde_json::to_value(model).map_err(state_error)? {
        Value::Object(object) => Ok(object),
        other => Err(state_error(serde::ser::Error::custom(format!(
            "expected an object, found {other}"
        )))),
    }
}

/// Plans a resource change from its schema alone.
///
/// Computed attributes the configuration does not set are unknown (`null`)
/// until apply, except when every configurable attribute matches the prior
/// state, in which case the prior computed values carry over unchanged.
pub fn plan_computed(schema: &Schema, prior: Option<&Object>, proposed: &Object) -> Object {
    let unchanged = prior.is_some_and(|prior| {
        schema
            .attributes
            .iter()
            .filter(|(_, attribute)| !attribute.is_computed_only())
            .all(|(name, _)| {
                prior.get(name).unwrap_or(&Value::Null) == proposed.get(name).unwrap_or(&Value::Null)
            })
    });

    let mut planned = proposed.clone();
    for (name, attribute) in &schema.attributes {
        if !attribute.computed || (attribute.optional && is_set(proposed, name)) {
            continue;
        }
        let value = match prior {
            Some(prior) if unchanged => prior.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        };
        planned.insert(name.clone(), value);
    }
    planned
}
