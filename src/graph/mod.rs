//! # Stack Graph
//!
//! Explicit builder context for one stack.
//!
//! Every provisioning step takes the graph by `&mut` and returns typed
//! handles; there is no ambient "current stack". A resource may only refer
//! to resources declared before it, so declaration order is always a valid
//! creation order and the graph cannot contain a cycle.
//!
//! ## Module Structure
//!
//! - `resource.rs` - resource kinds, handles and declarations
//! - `binding.rs` - property bindings (literals, attributes, secret values)
//! - `template.rs` - serializable template handed to the provisioning engine

mod binding;
mod resource;
pub mod template;

pub use binding::{Binding, Properties};
pub use resource::{GraphId, Resource, ResourceId, ResourceKind};
pub use template::{StackTemplate, TemplateResource};

use crate::error::StackError;
use crate::observability::metrics;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Resource graph of one stack
#[derive(Debug)]
pub struct StackGraph {
    id: GraphId,
    stack_name: String,
    resources: Vec<Resource>,
    by_logical_id: HashMap<String, ResourceId>,
    outputs: IndexMap<String, Binding>,
}

impl StackGraph {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            id: GraphId::new(),
            stack_name: stack_name.into(),
            resources: Vec::new(),
            by_logical_id: HashMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    /// Declare a resource
    ///
    /// Fails with `DuplicateResource` if the logical ID is taken, and with a
    /// precondition failure if a binding refers to a resource that this
    /// graph has not declared.
    pub fn declare(
        &mut self,
        logical_id: impl Into<String>,
        kind: ResourceKind,
        properties: Properties,
    ) -> Result<ResourceId, StackError> {
        let logical_id = logical_id.into();
        if logical_id.is_empty() || !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StackError::configuration(format!(
                "logical ID `{logical_id}` must be non-empty and ASCII alphanumeric"
            )));
        }
        if self.by_logical_id.contains_key(&logical_id) {
            return Err(StackError::DuplicateResource { logical_id });
        }
        for reference in properties.references() {
            if self.ensure_declared(reference).is_err() {
                return Err(StackError::precondition(format!(
                    "`{logical_id}` refers to a resource that is not declared in stack `{}`",
                    self.stack_name
                )));
            }
        }

        let id = ResourceId {
            graph: self.id,
            index: self.resources.len(),
        };
        debug!(
            stack = %self.stack_name,
            logical_id = %logical_id,
            kind = kind.as_str(),
            "Declared resource"
        );
        metrics::increment_resources_declared(kind.as_str());

        self.by_logical_id.insert(logical_id.clone(), id);
        self.resources.push(Resource {
            id,
            logical_id,
            kind,
            properties,
            explicit_dependencies: BTreeSet::new(),
        });
        Ok(id)
    }

    /// Record that `dependent` must be created after `dependency`
    pub fn add_dependency(
        &mut self,
        dependent: ResourceId,
        dependency: ResourceId,
    ) -> Result<(), StackError> {
        self.ensure_declared(dependent)?;
        self.ensure_declared(dependency)?;
        if dependency.index >= dependent.index {
            return Err(StackError::precondition(format!(
                "`{}` cannot depend on `{}`, which is not declared before it",
                self.resources[dependent.index].logical_id,
                self.resources[dependency.index].logical_id
            )));
        }
        self.resources[dependent.index]
            .explicit_dependencies
            .insert(dependency);
        Ok(())
    }

    /// Fails unless `id` was issued by this graph
    pub fn ensure_declared(&self, id: ResourceId) -> Result<(), StackError> {
        if id.graph != self.id || id.index >= self.resources.len() {
            return Err(StackError::precondition(format!(
                "resource handle #{} does not belong to stack `{}`",
                id.index, self.stack_name
            )));
        }
        Ok(())
    }

    pub fn resource(&self, id: ResourceId) -> Result<&Resource, StackError> {
        self.ensure_declared(id)?;
        Ok(&self.resources[id.index])
    }

    /// Look up a resource by logical ID
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.by_logical_id
            .get(logical_id)
            .map(|id| &self.resources[id.index])
    }

    /// Resources in declaration order
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    pub fn count_of(&self, kind: ResourceKind) -> usize {
        self.resources_of(kind).count()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Explicit dependencies plus every resource referenced by a binding
    pub fn dependencies_of(&self, id: ResourceId) -> Result<BTreeSet<ResourceId>, StackError> {
        let resource = self.resource(id)?;
        let mut deps = resource.properties.references();
        deps.extend(resource.explicit_dependencies.iter().copied());
        Ok(deps)
    }

    /// Creation order respecting every dependency edge
    ///
    /// Ties are broken by declaration order, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<ResourceId>, StackError> {
        let mut in_degree = vec![0usize; self.resources.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.resources.len()];
        for resource in &self.resources {
            for dep in self.dependencies_of(resource.id)? {
                in_degree[resource.id.index] += 1;
                dependents[dep.index].push(resource.id.index);
            }
        }

        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| i)
            .collect();
        let mut order = Vec::with_capacity(self.resources.len());

        while let Some(next) = ready.pop_first() {
            order.push(self.resources[next].id);
            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.resources.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .enumerate()
                .filter(|(_, d)| **d > 0)
                .map(|(i, _)| self.resources[i].logical_id.as_str())
                .collect();
            return Err(StackError::DependencyCycle(stuck.join(", ")));
        }
        Ok(order)
    }

    /// Declare a stack output
    pub fn add_output(&mut self, name: impl Into<String>, binding: Binding) -> Result<(), StackError> {
        let name = name.into();
        if self.outputs.contains_key(&name) {
            return Err(StackError::configuration(format!(
                "output `{name}` is declared more than once"
            )));
        }
        for reference in binding.references() {
            self.ensure_declared(reference)?;
        }
        self.outputs.insert(name, binding);
        Ok(())
    }

    pub fn outputs(&self) -> &IndexMap<String, Binding> {
        &self.outputs
    }

    /// Render the graph for the provisioning engine
    pub fn to_template(&self) -> StackTemplate {
        let resources = self
            .resources
            .iter()
            .map(|resource| {
                let properties = resource
                    .properties
                    .iter()
                    .map(|(key, binding)| (key.clone(), self.render(binding)))
                    .collect();
                // Handles are always valid here, so dependencies_of cannot fail.
                let depends_on = self
                    .dependencies_of(resource.id)
                    .map(|deps| {
                        deps.iter()
                            .map(|d| self.resources[d.index].logical_id.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                (
                    resource.logical_id.clone(),
                    TemplateResource {
                        resource_type: resource.kind.type_name().to_string(),
                        properties,
                        depends_on,
                    },
                )
            })
            .collect();

        let outputs = self
            .outputs
            .iter()
            .map(|(name, binding)| (name.clone(), self.render(binding)))
            .collect();

        StackTemplate {
            stack_name: self.stack_name.clone(),
            resources,
            outputs,
        }
    }

    fn render(&self, binding: &Binding) -> Value {
        let object = |entries: Vec<(&str, Value)>| {
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect::<Map<String, Value>>(),
            )
        };
        match binding {
            Binding::Literal(value) => value.clone(),
            Binding::Attribute { resource, name } => object(vec![
                (
                    template::REF_KEY,
                    Value::String(self.resources[resource.index].logical_id.clone()),
                ),
                (template::ATTRIBUTE_KEY, Value::String(name.clone())),
            ]),
            Binding::Secret { resource } => object(vec![(
                template::SECRET_REF_KEY,
                Value::String(self.resources[resource.index].logical_id.clone()),
            )]),
            Binding::Join(parts) => object(vec![(
                template::JOIN_KEY,
                Value::Array(parts.iter().map(|p| self.render(p)).collect()),
            )]),
            Binding::List(items) => Value::Array(items.iter().map(|i| self.render(i)).collect()),
            Binding::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect(),
            ),
        }
    }
}
