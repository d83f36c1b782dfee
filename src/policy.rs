//! # Network Policy
//!
//! Security groups (network boundaries) and the ingress rules between them.
//!
//! [`allow_database_access_from`] is the terminal linking step: it takes the
//! finished database and service by reference, so it cannot be called before
//! both exist, and it opens the database port to the service's own group and
//! nothing else.

use crate::compute::ServiceResource;
use crate::database::DatabaseResource;
use crate::error::StackError;
use crate::graph::{Binding, Properties, ResourceId, ResourceKind, StackGraph};
use crate::network::NetworkIdentity;
use tracing::info;

/// A declared security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroup {
    id: ResourceId,
    name: String,
}

impl SecurityGroup {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_id(&self) -> Binding {
        Binding::attribute(self.id, "GroupId")
    }
}

/// Declare a security group without ingress rules of its own
pub fn declare_security_group(
    graph: &mut StackGraph,
    name: impl Into<String>,
    network: &NetworkIdentity,
    description: &str,
) -> Result<SecurityGroup, StackError> {
    let name = name.into();
    let properties = Properties::new()
        .with_literal("GroupName", name.as_str())
        .with_literal("GroupDescription", description)
        .with("VpcId", network.vpc_id());
    let id = graph.declare(name.as_str(), ResourceKind::SecurityGroup, properties)?;
    Ok(SecurityGroup { id, name })
}

/// Where an ingress rule admits traffic from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressSource {
    SecurityGroup(SecurityGroup),
    Cidr(String),
}

impl IngressSource {
    fn logical_suffix(&self) -> String {
        match self {
            IngressSource::SecurityGroup(group) => group.name.clone(),
            IngressSource::Cidr(cidr) if cidr == crate::constants::ANY_IPV4_CIDR => {
                "AnyIpv4".to_string()
            }
            IngressSource::Cidr(cidr) => {
                let digits: String = cidr.chars().filter(char::is_ascii_digit).collect();
                format!("Cidr{digits}")
            }
        }
    }
}

/// A declared ingress rule
#[derive(Debug, Clone)]
pub struct IngressRule {
    id: ResourceId,
    logical_id: String,
    target: ResourceId,
    source: IngressSource,
    port: u16,
}

impl IngressRule {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Security group the rule is attached to
    pub fn target(&self) -> ResourceId {
        self.target
    }

    pub fn source(&self) -> &IngressSource {
        &self.source
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Stable logical ID of a rule, derived from its target, source and port
pub fn ingress_logical_id(target: &SecurityGroup, source: &IngressSource, port: u16) -> String {
    format!("{}From{}Port{port}", target.name, source.logical_suffix())
}

/// Declare a TCP ingress rule on `target`
///
/// Describing the same rule twice in one graph fails with
/// `DuplicateResource`.
pub fn declare_ingress(
    graph: &mut StackGraph,
    target: &SecurityGroup,
    source: IngressSource,
    port: u16,
    description: &str,
) -> Result<IngressRule, StackError> {
    let logical_id = ingress_logical_id(target, &source, port);

    let mut properties = Properties::new()
        .with("GroupId", target.group_id())
        .with_literal("IpProtocol", "tcp")
        .with_literal("FromPort", port)
        .with_literal("ToPort", port)
        .with_literal("Description", description);
    properties = match &source {
        IngressSource::SecurityGroup(group) => {
            properties.with("SourceSecurityGroupId", group.group_id())
        }
        IngressSource::Cidr(cidr) => properties.with_literal("CidrIp", cidr.as_str()),
    };

    let id = graph.declare(logical_id.as_str(), ResourceKind::IngressRule, properties)?;
    Ok(IngressRule {
        id,
        logical_id,
        target: target.id,
        source,
        port,
    })
}

/// Permit the service, and only the service, to reach the database port
pub fn allow_database_access_from(
    graph: &mut StackGraph,
    database: &DatabaseResource,
    service: &ServiceResource,
) -> Result<IngressRule, StackError> {
    graph.ensure_declared(database.id())?;
    graph.ensure_declared(service.id())?;

    let rule = declare_ingress(
        graph,
        database.security_group(),
        IngressSource::SecurityGroup(service.security_group().clone()),
        database.port(),
        "Database access from the application service",
    )?;
    graph.add_dependency(rule.id, database.id())?;
    graph.add_dependency(rule.id, service.id())?;

    info!(
        rule = %rule.logical_id,
        database = %database.identifier(),
        service = %service.name(),
        port = rule.port,
        "Linked database access to service security group"
    );
    Ok(rule)
}
