//! # Database Provisioner
//!
//! Declares the managed relational database inside the private subnets of
//! the network, together with the security group that forms its network
//! boundary.
//!
//! The master password is bound to the credential secret's realized value
//! and never appears as a literal. Deletion protection follows the
//! environment: only Development instances may be deleted.

use crate::config::{deletion_protection, DatabaseEngine, StackSettings};
use crate::constants::{DATABASE_SECURITY_GROUP_SUFFIX, DATABASE_SUFFIX};
use crate::error::StackError;
use crate::graph::{Binding, Properties, ResourceId, ResourceKind, StackGraph};
use crate::network::{NetworkIdentity, SubnetTier};
use crate::policy::{declare_security_group, SecurityGroup};
use crate::secrets::SecretHandle;
use tracing::info;

/// Handle to the declared database instance
#[derive(Debug, Clone)]
pub struct DatabaseResource {
    id: ResourceId,
    identifier: String,
    engine: DatabaseEngine,
    security_group: SecurityGroup,
    credential: SecretHandle,
    deletion_protection: bool,
}

impl DatabaseResource {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    /// Default port of the engine
    pub fn port(&self) -> u16 {
        self.engine.default_port()
    }

    /// Network boundary of the instance
    pub fn security_group(&self) -> &SecurityGroup {
        &self.security_group
    }

    pub fn credential(&self) -> &SecretHandle {
        &self.credential
    }

    pub fn deletion_protection(&self) -> bool {
        self.deletion_protection
    }

    /// Connection endpoint address
    pub fn endpoint_address(&self) -> Binding {
        Binding::attribute(self.id, "Endpoint.Address")
    }
}

/// Declare the database instance and its security group
pub fn create_database(
    graph: &mut StackGraph,
    network: &NetworkIdentity,
    credential: SecretHandle,
    settings: &StackSettings,
) -> Result<DatabaseResource, StackError> {
    graph.ensure_declared(network.id())?;
    graph.ensure_declared(credential.id())?;

    let engine = settings.database_engine;
    if settings.database_name.is_some() && !engine.supports_database_name() {
        return Err(StackError::configuration(format!(
            "engine `{engine}` does not accept an explicit database name"
        )));
    }

    let identifier = settings.scoped_name(DATABASE_SUFFIX);
    let security_group = declare_security_group(
        graph,
        settings.scoped_name(DATABASE_SECURITY_GROUP_SUFFIX),
        network,
        "Network boundary of the application database",
    )?;
    let protected = deletion_protection(settings.dot_net_environment);

    let mut properties = Properties::new()
        .with_literal("Engine", engine.engine_id())
        .with_literal("DBInstanceClass", settings.database_instance_type())
        .with_literal("DBInstanceIdentifier", identifier.as_str())
        .with_literal("MasterUsername", settings.db_username.as_str())
        .with("MasterUserPassword", credential.value())
        .with_literal("Port", engine.default_port())
        .with_literal("DeletionProtection", protected)
        .with(
            "VPCSecurityGroups",
            Binding::List(vec![security_group.group_id()]),
        )
        .with("DBSubnets", network.subnet_ids(SubnetTier::Private));
    if let Some(name) = &settings.database_name {
        properties = properties.with_literal("DBName", name.as_str());
    }

    let id = graph.declare(identifier.as_str(), ResourceKind::DatabaseInstance, properties)?;
    graph.add_dependency(id, credential.id())?;

    info!(
        database = %identifier,
        engine = engine.engine_id(),
        instance_class = %settings.database_instance_type(),
        deletion_protection = protected,
        "Declared database instance"
    );
    Ok(DatabaseResource {
        id,
        identifier,
        engine,
        security_group,
        credential,
        deletion_protection: protected,
    })
}
