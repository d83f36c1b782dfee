//! # Stack Assembly
//!
//! Builds the complete resource graph for one environment from its settings.
//!
//! Steps run in a fixed order, and each later step takes the handles
//! returned by earlier ones, so the ordering is enforced by the types:
//!
//! 1. network
//! 2. database password secret
//! 3. database (with its security group)
//! 4. container cluster
//! 5. lookup of the existing image repository
//! 6. site admin password secret
//! 7. load-balanced service
//! 8. database access rule from the service security group
//! 9. stack outputs

use crate::compute::{
    create_cluster, create_service, lookup_repository, ClusterHandle, PlainValue,
    PlaintextEnvironment, RepositoryHandle, SecretEnvironment, ServiceResource, ServiceSpec,
};
use crate::config::{dotnet_environment_value, StackSettings};
use crate::constants::{
    ADMIN_PASSWORD_SUFFIX, DATABASE_PASSWORD_LENGTH, DATABASE_PASSWORD_SUFFIX,
    ENV_ASPNETCORE_ENVIRONMENT, ENV_DB_DATA_SOURCE, ENV_DB_PASSWORD, ENV_DB_USER_ID,
    ENV_DEFAULT_ADMIN_PASSWORD, ENV_DEFAULT_ADMIN_USERNAME, EXISTING_REPOSITORY_ID, NETWORK_SUFFIX,
    SERVICE_SUFFIX,
};
use crate::database::{create_database, DatabaseResource};
use crate::error::StackError;
use crate::graph::{Binding, StackGraph, StackTemplate};
use crate::network::{create_network, NetworkIdentity};
use crate::observability::metrics;
use crate::policy::{allow_database_access_from, IngressRule};
use crate::secrets::{SecretHandle, SecretSpec};
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Output with the load balancer DNS name
pub const OUTPUT_LOAD_BALANCER_DNS: &str = "LoadBalancerDNS";
/// Output with the service URL
pub const OUTPUT_SERVICE_URL: &str = "ServiceURL";
/// Output with the database endpoint address
pub const OUTPUT_DATABASE_ENDPOINT: &str = "DatabaseEndpoint";

/// The assembled stack and the handles of everything in it
#[derive(Debug)]
pub struct UnicornStoreStack {
    graph: StackGraph,
    network: NetworkIdentity,
    database_secret: SecretHandle,
    database: DatabaseResource,
    cluster: ClusterHandle,
    repository: RepositoryHandle,
    admin_secret: SecretHandle,
    service: ServiceResource,
    database_access: IngressRule,
}

impl UnicornStoreStack {
    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    pub fn network(&self) -> &NetworkIdentity {
        &self.network
    }

    pub fn database_secret(&self) -> &SecretHandle {
        &self.database_secret
    }

    pub fn database(&self) -> &DatabaseResource {
        &self.database
    }

    pub fn cluster(&self) -> &ClusterHandle {
        &self.cluster
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repository
    }

    pub fn admin_secret(&self) -> &SecretHandle {
        &self.admin_secret
    }

    pub fn service(&self) -> &ServiceResource {
        &self.service
    }

    pub fn database_access(&self) -> &IngressRule {
        &self.database_access
    }

    /// Template handed to the provisioning engine
    pub fn template(&self) -> StackTemplate {
        self.graph.to_template()
    }

    pub fn into_graph(self) -> StackGraph {
        self.graph
    }
}

/// Validate `settings` and build the stack
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn build_stack(settings: &StackSettings) -> Result<UnicornStoreStack, StackError> {
    let stack_name = settings.stack_name();
    let span = info_span!("build_stack", stack = %stack_name);
    let _guard = span.enter();

    let start = Instant::now();
    metrics::increment_synth();
    let result = settings.validate().and_then(|()| assemble(settings));
    metrics::observe_synth_duration(start.elapsed().as_secs_f64());

    match &result {
        Ok(stack) => info!(
            resources = stack.graph.len(),
            outputs = stack.graph.outputs().len(),
            "Stack built"
        ),
        Err(e) => {
            metrics::increment_synth_errors();
            warn!(error = %e, kind = e.kind().as_str(), "Stack build failed");
        }
    }
    result
}

fn assemble(settings: &StackSettings) -> Result<UnicornStoreStack, StackError> {
    let mut graph = StackGraph::new(settings.stack_name());

    let network = create_network(
        &mut graph,
        settings.scoped_name(NETWORK_SUFFIX),
        settings.max_azs,
    )?;

    let database_secret = SecretSpec::new(settings.scoped_name(DATABASE_PASSWORD_SUFFIX))
        .with_length(DATABASE_PASSWORD_LENGTH)
        .materialize(&mut graph)?;

    let database = create_database(&mut graph, &network, database_secret.clone(), settings)?;

    let cluster = create_cluster(&mut graph, &network, settings.cluster_name())?;

    let repository = lookup_repository(
        &mut graph,
        EXISTING_REPOSITORY_ID,
        settings.docker_image_repository.as_str(),
    )?;

    let admin_secret =
        SecretSpec::new(settings.scoped_name(ADMIN_PASSWORD_SUFFIX)).materialize(&mut graph)?;

    let environment = PlaintextEnvironment::new()
        .with(
            ENV_ASPNETCORE_ENVIRONMENT,
            dotnet_environment_value(settings.dot_net_environment),
        )
        .with(
            ENV_DEFAULT_ADMIN_USERNAME,
            settings.default_site_admin_username.as_str(),
        )
        .with(
            ENV_DB_DATA_SOURCE,
            PlainValue::attribute(database.id(), "Endpoint.Address"),
        )
        .with(ENV_DB_USER_ID, settings.db_username.as_str());
    let secrets = SecretEnvironment::new()
        .with(ENV_DEFAULT_ADMIN_PASSWORD, &admin_secret)
        .with(ENV_DB_PASSWORD, database.credential());

    let service = create_service(
        &mut graph,
        &cluster,
        ServiceSpec {
            name: settings.scoped_name(SERVICE_SUFFIX),
            image: repository.image(settings.image_tag.as_str()),
            desired_count: settings.desired_replica_count,
            cpu: settings.cpu_millicores,
            memory_mib: settings.memory_mib,
            environment,
            secrets,
            public_load_balancer: settings.public_load_balancer,
        },
    )?;

    let database_access = allow_database_access_from(&mut graph, &database, &service)?;

    graph.add_output(OUTPUT_LOAD_BALANCER_DNS, service.load_balancer_dns())?;
    graph.add_output(
        OUTPUT_SERVICE_URL,
        Binding::Join(vec![Binding::literal("http://"), service.load_balancer_dns()]),
    )?;
    graph.add_output(OUTPUT_DATABASE_ENDPOINT, database.endpoint_address())?;

    Ok(UnicornStoreStack {
        graph,
        network,
        database_secret,
        database,
        cluster,
        repository,
        admin_secret,
        service,
        database_access,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::graph::ResourceKind;
    use crate::policy::IngressSource;

    fn demo_settings() -> StackSettings {
        let mut settings = StackSettings::new("Demo", "admin", "unicorn-store", "siteadmin");
        settings.desired_replica_count = 2;
        settings
    }

    #[test]
    fn test_names_follow_scope_convention() {
        let stack = build_stack(&demo_settings()).unwrap();
        let graph = stack.graph();
        assert_eq!(graph.stack_name(), "DemoFargateStack");
        for logical_id in [
            "DemoVPC",
            "DemoDatabasePassword",
            "DemoDatabase",
            "DemoDatabaseSecurityGroup",
            "DemoFargateCluster",
            "ExistingEcrRepository",
            "DemoDefaultSiteAdminPassword",
            "DemoFargateService",
        ] {
            assert!(graph.get(logical_id).is_some(), "missing {logical_id}");
        }
    }

    #[test]
    fn test_database_access_is_terminal_and_scoped_to_service() {
        let stack = build_stack(&demo_settings()).unwrap();
        let rule = stack.database_access();
        assert_eq!(rule.target(), stack.database().security_group().id());
        assert_eq!(
            rule.source(),
            &IngressSource::SecurityGroup(stack.service().security_group().clone())
        );
        assert_eq!(rule.port(), 1433);

        let deps = stack.graph().dependencies_of(rule.id()).unwrap();
        assert!(deps.contains(&stack.database().id()));
        assert!(deps.contains(&stack.service().id()));
    }

    #[test]
    fn test_environment_contract() {
        let mut settings = demo_settings();
        let stack = build_stack(&settings).unwrap();
        let env = stack.service().environment();
        assert_eq!(
            env.keys().collect::<Vec<_>>(),
            vec![
                "ASPNETCORE_ENVIRONMENT",
                "DefaultAdminUsername",
                "UnicornDbConnectionStringBuilder__DataSource",
                "UnicornDbConnectionStringBuilder__UserId",
            ]
        );
        assert_eq!(
            env.get("ASPNETCORE_ENVIRONMENT"),
            Some(&PlainValue::from("Production"))
        );
        assert_eq!(
            stack.service().secrets().keys().collect::<Vec<_>>(),
            vec!["DefaultAdminPassword", "UnicornDbConnectionStringBuilder__Password"]
        );

        settings.dot_net_environment = Some(Environment::Staging);
        let stack = build_stack(&settings).unwrap();
        assert_eq!(
            stack.service().environment().get("ASPNETCORE_ENVIRONMENT"),
            Some(&PlainValue::from("Staging"))
        );
    }

    #[test]
    fn test_outputs() {
        let stack = build_stack(&demo_settings()).unwrap();
        let outputs: Vec<&str> = stack.graph().outputs().keys().map(String::as_str).collect();
        assert_eq!(outputs, vec!["LoadBalancerDNS", "ServiceURL", "DatabaseEndpoint"]);
    }

    #[test]
    fn test_invalid_settings_declare_nothing() {
        let mut settings = demo_settings();
        settings.max_azs = 0;
        let err = build_stack(&settings).unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));
    }

    #[test]
    fn test_exactly_two_secrets() {
        let stack = build_stack(&demo_settings()).unwrap();
        assert_eq!(stack.graph().count_of(ResourceKind::GeneratedSecret), 2);
        assert_ne!(stack.database_secret().name(), stack.admin_secret().name());
    }
}
