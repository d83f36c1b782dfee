//! # Attribute Bindings
//!
//! Property values of declared resources. A binding is either a literal or a
//! reference to something only the provisioning engine knows (an attribute
//! of another resource, or the realized value of a generated secret).

use crate::graph::resource::ResourceId;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;

/// Value bound to a resource property
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Known at construction time
    Literal(Value),
    /// Attribute of another resource, resolved by the engine
    Attribute { resource: ResourceId, name: String },
    /// Realized value of a generated secret, resolved by the engine
    Secret { resource: ResourceId },
    /// String concatenation of the parts
    Join(Vec<Binding>),
    List(Vec<Binding>),
    Map(IndexMap<String, Binding>),
}

impl Binding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Binding::Literal(value.into())
    }

    pub fn attribute(resource: ResourceId, name: impl Into<String>) -> Self {
        Binding::Attribute {
            resource,
            name: name.into(),
        }
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Binding)>,
        K: Into<String>,
    {
        Binding::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Every resource this binding refers to
    pub fn references(&self) -> BTreeSet<ResourceId> {
        let mut refs = BTreeSet::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut BTreeSet<ResourceId>) {
        match self {
            Binding::Literal(_) => {}
            Binding::Attribute { resource, .. } | Binding::Secret { resource } => {
                refs.insert(*resource);
            }
            Binding::Join(parts) | Binding::List(parts) => {
                for part in parts {
                    part.collect_references(refs);
                }
            }
            Binding::Map(entries) => {
                for value in entries.values() {
                    value.collect_references(refs);
                }
            }
        }
    }

    /// Whether a secret value is bound anywhere inside this binding
    pub fn contains_secret(&self) -> bool {
        match self {
            Binding::Secret { .. } => true,
            Binding::Literal(_) | Binding::Attribute { .. } => false,
            Binding::Join(parts) | Binding::List(parts) => parts.iter().any(Binding::contains_secret),
            Binding::Map(entries) => entries.values().any(Binding::contains_secret),
        }
    }
}

/// Ordered property map of a resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(IndexMap<String, Binding>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, binding: Binding) -> Self {
        self.0.insert(key.into(), binding);
        self
    }

    #[must_use]
    pub fn with_literal(self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(key, Binding::literal(value))
    }

    pub fn get(&self, key: &str) -> Option<&Binding> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Binding)> {
        self.0.iter()
    }

    pub fn references(&self) -> BTreeSet<ResourceId> {
        self.0.values().flat_map(Binding::references).collect()
    }
}
