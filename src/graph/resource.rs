//! # Resources
//!
//! Typed resource declarations recorded in a [`StackGraph`](super::StackGraph).

use crate::graph::binding::Properties;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Identity of one graph-construction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(Uuid);

impl GraphId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a declared resource
///
/// Only [`StackGraph::declare`](super::StackGraph::declare) hands these out,
/// and each handle is stamped with the graph that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub(crate) graph: GraphId,
    pub(crate) index: usize,
}

impl ResourceId {
    /// Declaration position within the issuing graph
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Network,
    GeneratedSecret,
    SecurityGroup,
    DatabaseInstance,
    Cluster,
    RepositoryLookup,
    LoadBalancer,
    TaskDefinition,
    Service,
    IngressRule,
}

impl ResourceKind {
    /// Resource type name handed to the provisioning engine
    pub fn type_name(self) -> &'static str {
        match self {
            ResourceKind::Network => "AWS::EC2::VPC",
            ResourceKind::GeneratedSecret => "AWS::SecretsManager::Secret",
            ResourceKind::SecurityGroup => "AWS::EC2::SecurityGroup",
            ResourceKind::DatabaseInstance => "AWS::RDS::DBInstance",
            ResourceKind::Cluster => "AWS::ECS::Cluster",
            ResourceKind::RepositoryLookup => "Lookup::ECR::Repository",
            ResourceKind::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            ResourceKind::TaskDefinition => "AWS::ECS::TaskDefinition",
            ResourceKind::Service => "AWS::ECS::Service",
            ResourceKind::IngressRule => "AWS::EC2::SecurityGroupIngress",
        }
    }

    /// Short label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::GeneratedSecret => "generated_secret",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::DatabaseInstance => "database_instance",
            ResourceKind::Cluster => "cluster",
            ResourceKind::RepositoryLookup => "repository_lookup",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::TaskDefinition => "task_definition",
            ResourceKind::Service => "service",
            ResourceKind::IngressRule => "ingress_rule",
        }
    }

    /// Lookups reference existing infrastructure and are never created.
    pub fn is_lookup(self) -> bool {
        matches!(self, ResourceKind::RepositoryLookup)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A declared resource
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) id: ResourceId,
    pub(crate) logical_id: String,
    pub(crate) kind: ResourceKind,
    pub(crate) properties: Properties,
    pub(crate) explicit_dependencies: BTreeSet<ResourceId>,
}

impl Resource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Edges added with `add_dependency`, excluding those implied by bindings
    pub fn explicit_dependencies(&self) -> &BTreeSet<ResourceId> {
        &self.explicit_dependencies
    }
}
