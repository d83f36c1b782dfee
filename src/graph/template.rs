//! # Stack Template
//!
//! Serializable form of a [`StackGraph`](super::StackGraph) handed to the
//! provisioning engine.
//!
//! References render as `{"ref": "<LogicalId>", "attribute": "<Name>"}`,
//! secret values as `{"secretRef": "<LogicalId>"}` and concatenations as
//! `{"join": [...]}`.

use crate::error::StackError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REF_KEY: &str = "ref";
pub const ATTRIBUTE_KEY: &str = "attribute";
pub const SECRET_REF_KEY: &str = "secretRef";
pub const JOIN_KEY: &str = "join";

/// Template of a complete stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTemplate {
    pub stack_name: String,
    pub resources: IndexMap<String, TemplateResource>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Value>,
}

/// One resource entry of a [`StackTemplate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub properties: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl StackTemplate {
    pub fn to_json(&self) -> Result<String, StackError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StackError::Provisioning(anyhow::anyhow!("failed to render template: {e}")))
    }

    pub fn to_yaml(&self) -> Result<String, StackError> {
        serde_yaml::to_string(self)
            .map_err(|e| StackError::Provisioning(anyhow::anyhow!("failed to render template: {e}")))
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a TemplateResource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }
}

impl TemplateResource {
    /// Logical IDs referenced anywhere in the properties
    pub fn references(&self) -> Vec<String> {
        let mut refs = Vec::new();
        for value in self.properties.values() {
            collect_references(value, &mut refs);
        }
        refs.sort();
        refs.dedup();
        refs
    }
}

/// Logical IDs referenced anywhere in a rendered value
pub fn collect_references(value: &Value, refs: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(target)) = map.get(REF_KEY) {
                refs.push(target.clone());
            } else if let Some(Value::String(target)) = map.get(SECRET_REF_KEY) {
                refs.push(target.clone());
            } else {
                for v in map.values() {
                    collect_references(v, refs);
                }
            }
        }
        Value::Array(items) => {
            for v in items {
                collect_references(v, refs);
            }
        }
        _ => {}
    }
}

/// Whether a rendered value carries a secret reference
pub fn contains_secret_ref(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.contains_key(SECRET_REF_KEY) || map.values().any(contains_secret_ref)
        }
        Value::Array(items) => items.iter().any(contains_secret_ref),
        _ => false,
    }
}
