//! # Re-application Tests
//!
//! Building the stack twice from identical settings and applying both
//! results to the same engine must not create anything new. Evolving the
//! settings converges the deployed stack onto the new template, removing
//! what it no longer declares.

mod common;

use common::{demo_settings, init_test_logging};
use unicorn_stack::config::{DatabaseEngine, Environment};
use unicorn_stack::prelude::*;

const REPOSITORY: &str = "unicorn-store";

fn engine() -> InMemoryEngine {
    InMemoryEngine::new().with_repository(REPOSITORY).unwrap()
}

async fn ingress_targeting(engine: &InMemoryEngine, group: &str) -> Vec<String> {
    engine
        .deployed_ids("DemoFargateStack")
        .await
        .into_iter()
        .filter(|id| id.starts_with(&format!("{group}From")))
        .collect()
}

#[tokio::test]
async fn test_rebuilt_template_is_identical() {
    init_test_logging();
    let first = build_stack(&demo_settings()).unwrap().template();
    let second = build_stack(&demo_settings()).unwrap().template();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_reapply_creates_nothing() {
    init_test_logging();
    let engine = engine();

    let first = engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();
    assert_eq!(first.updated(), 0);
    assert_eq!(first.unchanged(), 0);
    assert_eq!(
        first.outcome_of("ExistingEcrRepository"),
        Some(ApplyOutcome::Resolved)
    );
    let deployed = engine.resource_count("DemoFargateStack").await;
    assert_eq!(first.created(), deployed);

    let second = engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged(), deployed);
    assert_eq!(engine.resource_count("DemoFargateStack").await, deployed);
    assert_eq!(
        engine
            .count_of_type("DemoFargateStack", ResourceKind::IngressRule.type_name())
            .await,
        3
    );
    assert_eq!(engine.secret_count().await, 2);
}

#[tokio::test]
async fn test_secret_values_survive_reapply() {
    let engine = engine();
    let template = build_stack(&demo_settings()).unwrap().template();
    engine.apply(&template).await.unwrap();
    let before = engine
        .fingerprint("DemoFargateStack", "DemoDatabasePassword")
        .await;
    engine.apply(&template).await.unwrap();

    assert_eq!(
        engine
            .fingerprint("DemoFargateStack", "DemoDatabasePassword")
            .await,
        before
    );
    assert_eq!(engine.secret_length("DemoDatabasePassword").await, Some(8));
    assert_eq!(
        engine.secret_length("DemoDefaultSiteAdminPassword").await,
        Some(16)
    );
    assert_eq!(
        engine
            .secrets_differ("DemoDatabasePassword", "DemoDefaultSiteAdminPassword")
            .await,
        Some(true)
    );
}

#[tokio::test]
async fn test_settings_change_updates_in_place() {
    let engine = engine();
    engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();

    let mut settings = demo_settings();
    settings.dot_net_environment = Some(Environment::Development);
    let report = engine
        .apply(&build_stack(&settings).unwrap().template())
        .await
        .unwrap();

    assert_eq!(report.created(), 0);
    assert_eq!(report.outcome_of("DemoDatabase"), Some(ApplyOutcome::Updated));
    assert_eq!(
        report.outcome_of("DemoFargateServiceTaskDefinition"),
        Some(ApplyOutcome::Updated)
    );
    assert_eq!(report.outcome_of("DemoVPC"), Some(ApplyOutcome::Unchanged));
}

#[tokio::test]
async fn test_missing_repository_is_a_configuration_error() {
    let template = build_stack(&demo_settings()).unwrap().template();
    let err = InMemoryEngine::new().apply(&template).await.unwrap_err();
    assert!(matches!(err, StackError::UnresolvedRepository { ref name } if name == REPOSITORY));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_engine_failure_propagates_unchanged() {
    let engine = engine();
    engine.fail_on("DemoDatabase").await;
    let template = build_stack(&demo_settings()).unwrap().template();

    let err = engine.apply(&template).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Provisioning);
    assert!(err.to_string().contains("DemoDatabase"));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_two_scopes_share_one_engine() {
    let engine = engine();
    let mut other = demo_settings();
    other.scope_name = "Beta".to_string();

    engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();
    engine
        .apply(&build_stack(&other).unwrap().template())
        .await
        .unwrap();
    assert_eq!(engine.secret_count().await, 4);

    let mut clash = demo_settings();
    clash.infrastructure = "Ec2".to_string();
    let err = engine
        .apply(&build_stack(&clash).unwrap().template())
        .await
        .unwrap_err();
    assert!(matches!(err, StackError::DuplicateSecret { .. }));
}

#[tokio::test]
async fn test_engine_switch_leaves_one_database_rule() {
    init_test_logging();
    let engine = engine();
    engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();

    let mut settings = demo_settings();
    settings.database_engine = DatabaseEngine::Postgres;
    let template = build_stack(&settings).unwrap().template();
    let report = engine.apply(&template).await.unwrap();

    assert_eq!(
        report.outcome_of("DemoDatabaseSecurityGroupFromDemoFargateServiceSecurityGroupPort5432"),
        Some(ApplyOutcome::Created)
    );
    assert_eq!(
        report.outcome_of("DemoDatabaseSecurityGroupFromDemoFargateServiceSecurityGroupPort1433"),
        Some(ApplyOutcome::Deleted)
    );
    assert_eq!(
        ingress_targeting(&engine, "DemoDatabaseSecurityGroup").await,
        vec!["DemoDatabaseSecurityGroupFromDemoFargateServiceSecurityGroupPort5432"]
    );
    assert_eq!(
        engine.resource_count("DemoFargateStack").await,
        template.resources.len() - 1
    );
}

#[tokio::test]
async fn test_private_load_balancer_drops_public_listener() {
    let engine = engine();
    engine
        .apply(&build_stack(&demo_settings()).unwrap().template())
        .await
        .unwrap();
    assert_eq!(
        ingress_targeting(&engine, "DemoFargateServiceLoadBalancerSecurityGroup").await,
        vec!["DemoFargateServiceLoadBalancerSecurityGroupFromAnyIpv4Port80"]
    );

    let mut settings = demo_settings();
    settings.public_load_balancer = false;
    let report = engine
        .apply(&build_stack(&settings).unwrap().template())
        .await
        .unwrap();

    assert_eq!(report.deleted(), 1);
    assert_eq!(
        ingress_targeting(&engine, "DemoFargateServiceLoadBalancerSecurityGroup").await,
        vec!["DemoFargateServiceLoadBalancerSecurityGroupFromCidr1000016Port80"]
    );
    assert_eq!(
        engine
            .count_of_type("DemoFargateStack", ResourceKind::IngressRule.type_name())
            .await,
        3
    );
    assert_eq!(engine.secret_count().await, 2);

    let again = engine
        .apply(&build_stack(&settings).unwrap().template())
        .await
        .unwrap();
    assert!(again.is_noop());
}
