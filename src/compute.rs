//! # Compute Cluster and Service Provisioner
//!
//! Declares the container cluster and the load-balanced service that runs
//! the application image.
//!
//! Environment variables come in two maps. [`PlaintextEnvironment`] only
//! accepts literals and resource attributes, and [`create_service`] rejects
//! attributes read from a generated secret, so a secret value cannot end up
//! in it. [`SecretEnvironment`] maps keys to secret handles, which the
//! container runtime resolves at start-up.
//!
//! Besides the service itself, [`create_service`] declares:
//! - the service security group (the service's network identity)
//! - the load balancer and its security group
//! - ingress from the load balancer group to the service on the container port
//! - the listener ingress (any IPv4 source when public, the VPC range otherwise)
//! - the task definition

use crate::constants::{ANY_IPV4_CIDR, CONTAINER_PORT};
use crate::error::StackError;
use crate::graph::{Binding, Properties, ResourceId, ResourceKind, StackGraph};
use crate::network::{NetworkIdentity, SubnetTier};
use crate::policy::{declare_ingress, declare_security_group, IngressSource, SecurityGroup};
use crate::secrets::SecretHandle;
use indexmap::IndexMap;
use tracing::{debug, info};

/// Handle to a declared container cluster
#[derive(Debug, Clone)]
pub struct ClusterHandle {
    id: ResourceId,
    name: String,
    network: NetworkIdentity,
}

impl ClusterHandle {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn network(&self) -> &NetworkIdentity {
        &self.network
    }
}

/// Declare the container cluster in `network`
pub fn create_cluster(
    graph: &mut StackGraph,
    network: &NetworkIdentity,
    name: impl Into<String>,
) -> Result<ClusterHandle, StackError> {
    let name = name.into();
    let properties = Properties::new()
        .with_literal("ClusterName", name.as_str())
        .with("VpcId", network.vpc_id());
    let id = graph.declare(name.as_str(), ResourceKind::Cluster, properties)?;

    info!(cluster = %name, network = %network.name(), "Declared container cluster");
    Ok(ClusterHandle {
        id,
        name,
        network: network.clone(),
    })
}

/// Lookup of an image repository that already exists outside the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    id: ResourceId,
    repository_name: String,
}

impl RepositoryHandle {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn repository_name(&self) -> &str {
        &self.repository_name
    }

    /// Reference to one tag of this repository
    pub fn image(&self, tag: impl Into<String>) -> ImageReference {
        ImageReference {
            repository: self.clone(),
            tag: tag.into(),
        }
    }
}

/// Look up an existing image repository by name
///
/// The repository is referenced, never created; the provisioning engine
/// fails with `UnresolvedRepository` if it does not exist.
pub fn lookup_repository(
    graph: &mut StackGraph,
    logical_id: &str,
    repository_name: impl Into<String>,
) -> Result<RepositoryHandle, StackError> {
    let repository_name = repository_name.into();
    let properties = Properties::new().with_literal("RepositoryName", repository_name.as_str());
    let id = graph.declare(logical_id, ResourceKind::RepositoryLookup, properties)?;
    debug!(repository = %repository_name, "Declared repository lookup");
    Ok(RepositoryHandle {
        id,
        repository_name,
    })
}

/// Container image: repository plus tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    repository: RepositoryHandle,
    tag: String,
}

impl ImageReference {
    pub fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// "{repositoryUri}:{tag}"
    pub fn uri(&self) -> Binding {
        Binding::Join(vec![
            Binding::attribute(self.repository.id, "RepositoryUri"),
            Binding::literal(format!(":{}", self.tag)),
        ])
    }
}

/// Non-secret environment value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlainValue {
    Literal(String),
    Attribute { resource: ResourceId, name: String },
}

impl PlainValue {
    pub fn attribute(resource: ResourceId, name: impl Into<String>) -> Self {
        PlainValue::Attribute {
            resource,
            name: name.into(),
        }
    }

    fn to_binding(&self) -> Binding {
        match self {
            PlainValue::Literal(value) => Binding::literal(value.as_str()),
            PlainValue::Attribute { resource, name } => Binding::attribute(*resource, name.as_str()),
        }
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        PlainValue::Literal(value.to_string())
    }
}

impl From<String> for PlainValue {
    fn from(value: String) -> Self {
        PlainValue::Literal(value)
    }
}

/// Plaintext environment variables of the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaintextEnvironment(IndexMap<String, PlainValue>);

impl PlaintextEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PlainValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&PlainValue> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keys whose value reads an attribute of another resource
    fn attribute_sources(&self) -> impl Iterator<Item = (&str, ResourceId)> {
        self.0.iter().filter_map(|(key, value)| match value {
            PlainValue::Attribute { resource, .. } => Some((key.as_str(), *resource)),
            PlainValue::Literal(_) => None,
        })
    }

    fn to_binding(&self) -> Binding {
        Binding::List(
            self.0
                .iter()
                .map(|(key, value)| {
                    Binding::map([
                        ("Name", Binding::literal(key.as_str())),
                        ("Value", value.to_binding()),
                    ])
                })
                .collect(),
        )
    }
}

/// Secret-backed environment variables of the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretEnvironment(IndexMap<String, SecretHandle>);

impl SecretEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, secret: &SecretHandle) -> Self {
        self.0.insert(key.into(), secret.clone());
        self
    }

    pub fn get(&self, key: &str) -> Option<&SecretHandle> {
        self.0.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_binding(&self) -> Binding {
        Binding::List(
            self.0
                .iter()
                .map(|(key, secret)| {
                    Binding::map([
                        ("Name", Binding::literal(key.as_str())),
                        ("ValueFrom", secret.value()),
                    ])
                })
                .collect(),
        )
    }
}

/// Everything needed to declare the load-balanced service
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub image: ImageReference,
    pub desired_count: u32,
    pub cpu: u32,
    pub memory_mib: u32,
    pub environment: PlaintextEnvironment,
    pub secrets: SecretEnvironment,
    pub public_load_balancer: bool,
}

/// Handle to the declared service
#[derive(Debug, Clone)]
pub struct ServiceResource {
    id: ResourceId,
    name: String,
    security_group: SecurityGroup,
    load_balancer: ResourceId,
    task_definition: ResourceId,
    public_load_balancer: bool,
    environment: PlaintextEnvironment,
    secrets: SecretEnvironment,
}

impl ServiceResource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network identity of the running tasks
    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    pub fn load_balancer(&self) -> ResourceId {
        self.load_balancer
    }

    pub fn task_definition(&self) -> ResourceId {
        self.task_definition
    }

    pub fn is_public(&self) -> bool {
        self.public_load_balancer
    }

    pub fn environment(&self) -> &PlaintextEnvironment {
        &self.environment
    }

    pub fn secrets(&self) -> &SecretEnvironment {
        &self.secrets
    }

    pub fn load_balancer_dns(&self) -> Binding {
        Binding::attribute(self.load_balancer, "DNSName")
    }
}

/// Declare the load-balanced service on `cluster`
pub fn create_service(
    graph: &mut StackGraph,
    cluster: &ClusterHandle,
    spec: ServiceSpec,
) -> Result<ServiceResource, StackError> {
    graph.ensure_declared(cluster.id())?;
    graph.ensure_declared(spec.image.repository.id)?;

    if let Some(key) = spec.environment.keys().find(|k| spec.secrets.get(k).is_some()) {
        return Err(StackError::configuration(format!(
            "environment variable `{key}` is declared both as plaintext and as a secret"
        )));
    }
    for (key, source) in spec.environment.attribute_sources() {
        let resource = graph.resource(source)?;
        if resource.kind() == ResourceKind::GeneratedSecret {
            return Err(StackError::configuration(format!(
                "environment variable `{key}` reads secret `{}` as plaintext; \
                 deliver it through the secret environment instead",
                resource.logical_id()
            )));
        }
    }

    let network = cluster.network();
    let name = spec.name;

    let service_group = declare_security_group(
        graph,
        format!("{name}SecurityGroup"),
        network,
        "Network identity of the application service",
    )?;
    let lb_group = declare_security_group(
        graph,
        format!("{name}LoadBalancerSecurityGroup"),
        network,
        "Load balancer of the application service",
    )?;

    // A private balancer sits in the private subnets and only accepts
    // traffic originating inside the VPC.
    let (scheme, lb_tier, listener_source) = if spec.public_load_balancer {
        ("internet-facing", SubnetTier::Public, ANY_IPV4_CIDR)
    } else {
        ("internal", SubnetTier::Private, network.cidr_block())
    };
    let load_balancer = graph.declare(
        format!("{name}LoadBalancer"),
        ResourceKind::LoadBalancer,
        Properties::new()
            .with_literal("Type", "application")
            .with_literal("Scheme", scheme)
            .with("Subnets", network.subnet_ids(lb_tier))
            .with("SecurityGroups", Binding::List(vec![lb_group.group_id()]))
            .with_literal("ListenerPort", CONTAINER_PORT)
            .with_literal("ListenerProtocol", "HTTP"),
    )?;

    declare_ingress(
        graph,
        &lb_group,
        IngressSource::Cidr(listener_source.to_string()),
        CONTAINER_PORT,
        "Load balancer listener",
    )?;
    declare_ingress(
        graph,
        &service_group,
        IngressSource::SecurityGroup(lb_group.clone()),
        CONTAINER_PORT,
        "Traffic from the load balancer",
    )?;

    // Secrets are referenced by handle in `Secrets`; the runtime injects the
    // values at task start so they never appear in the task definition.
    let container = Binding::map([
        ("Name", Binding::literal("web")),
        ("Image", spec.image.uri()),
        ("Essential", Binding::literal(true)),
        (
            "PortMappings",
            Binding::List(vec![Binding::map([(
                "ContainerPort",
                Binding::literal(CONTAINER_PORT),
            )])]),
        ),
        ("Environment", spec.environment.to_binding()),
        ("Secrets", spec.secrets.to_binding()),
    ]);
    let task_definition = graph.declare(
        format!("{name}TaskDefinition"),
        ResourceKind::TaskDefinition,
        Properties::new()
            .with_literal("Family", name.as_str())
            .with_literal("Cpu", spec.cpu.to_string())
            .with_literal("Memory", spec.memory_mib.to_string())
            .with_literal("NetworkMode", "awsvpc")
            .with_literal("RequiresCompatibilities", vec!["FARGATE"])
            .with("ContainerDefinitions", Binding::List(vec![container])),
    )?;

    let id = graph.declare(
        name.as_str(),
        ResourceKind::Service,
        Properties::new()
            .with_literal("ServiceName", name.as_str())
            .with("Cluster", Binding::attribute(cluster.id(), "Arn"))
            .with("TaskDefinition", Binding::attribute(task_definition, "Arn"))
            .with_literal("LaunchType", "FARGATE")
            .with_literal("DesiredCount", spec.desired_count)
            .with(
                "NetworkConfiguration",
                Binding::map([
                    ("Subnets", network.subnet_ids(SubnetTier::Private)),
                    (
                        "SecurityGroups",
                        Binding::List(vec![service_group.group_id()]),
                    ),
                    ("AssignPublicIp", Binding::literal("DISABLED")),
                ]),
            )
            .with(
                "LoadBalancers",
                Binding::List(vec![Binding::map([
                    ("LoadBalancer", Binding::attribute(load_balancer, "Arn")),
                    ("ContainerName", Binding::literal("web")),
                    ("ContainerPort", Binding::literal(CONTAINER_PORT)),
                ])]),
            ),
    )?;

    info!(
        service = %name,
        cluster = %cluster.name(),
        image_tag = %spec.image.tag,
        desired_count = spec.desired_count,
        public = spec.public_load_balancer,
        plaintext_vars = spec.environment.len(),
        secret_vars = spec.secrets.len(),
        "Declared load-balanced service"
    );
    Ok(ServiceResource {
        id,
        name,
        security_group: service_group,
        load_balancer,
        task_definition,
        public_load_balancer: spec.public_load_balancer,
        environment: spec.environment,
        secrets: spec.secrets,
    })
}
