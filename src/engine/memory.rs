//! # In-Memory Engine
//!
//! A provisioning engine that keeps deployed state in memory.
//!
//! Resources are keyed by stack name and logical ID and carry a SHA-256
//! fingerprint of their type and properties, so re-applying an identical
//! template changes nothing. Resources that disappear from a stack's
//! template are deleted once the rest of the template has been applied,
//! newest first. Generated secrets are stored by secret name
//! across all stacks; their values are zeroized on drop and never leave the
//! engine.
//!
//! This is ephemeral - state does not persist across restarts.

use crate::engine::{AppliedResource, ApplyOutcome, ApplyReport, ProvisioningEngine};
use crate::error::StackError;
use crate::graph::{ResourceKind, StackTemplate, TemplateResource};
use crate::observability::metrics;
use anyhow::anyhow;
use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Debug, Clone)]
struct DeployedResource {
    resource_type: String,
    fingerprint: String,
    /// Creation order within the engine, kept across updates
    sequence: u64,
}

struct StoredSecret {
    /// "{stack}/{logicalId}" of the resource that created the secret
    owner: String,
    fingerprint: String,
    value: Zeroizing<String>,
}

impl fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSecret")
            .field("owner", &self.owner)
            .field("length", &self.value.chars().count())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct EngineState {
    repositories: BTreeSet<String>,
    /// stack name -> logical ID -> deployed resource
    stacks: HashMap<String, HashMap<String, DeployedResource>>,
    secrets: HashMap<String, StoredSecret>,
    fail_on: HashSet<String>,
    next_sequence: u64,
}

/// In-memory provisioning engine
#[derive(Clone, Debug, Default)]
pub struct InMemoryEngine {
    state: Arc<RwLock<EngineState>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing image repository that lookups can resolve
    ///
    /// Builder form of [`register_repository`](Self::register_repository).
    /// Fails once the engine has been cloned, since clones share state.
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn with_repository(mut self, name: impl Into<String>) -> Result<Self, StackError> {
        let name = name.into();
        let Some(state) = Arc::get_mut(&mut self.state) else {
            return Err(StackError::precondition(format!(
                "cannot register repository `{name}` on an engine that is already shared; \
                 use register_repository instead"
            )));
        };
        state.get_mut().repositories.insert(name);
        Ok(self)
    }

    pub async fn register_repository(&self, name: impl Into<String>) {
        self.state.write().await.repositories.insert(name.into());
    }

    /// Fail with a provisioning error when `logical_id` is applied
    pub async fn fail_on(&self, logical_id: impl Into<String>) {
        self.state.write().await.fail_on.insert(logical_id.into());
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.fail_on.clear();
    }

    /// Number of resources deployed in `stack_name`, lookups excluded
    pub async fn resource_count(&self, stack_name: &str) -> usize {
        self.state
            .read()
            .await
            .stacks
            .get(stack_name)
            .map_or(0, HashMap::len)
    }

    /// Number of deployed resources of `resource_type` in `stack_name`
    pub async fn count_of_type(&self, stack_name: &str, resource_type: &str) -> usize {
        self.state
            .read()
            .await
            .stacks
            .get(stack_name)
            .map_or(0, |resources| {
                resources
                    .values()
                    .filter(|r| r.resource_type == resource_type)
                    .count()
            })
    }

    /// Logical IDs deployed in `stack_name`, sorted
    pub async fn deployed_ids(&self, stack_name: &str) -> Vec<String> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state
            .stacks
            .get(stack_name)
            .map(|resources| resources.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub async fn fingerprint(&self, stack_name: &str, logical_id: &str) -> Option<String> {
        self.state
            .read()
            .await
            .stacks
            .get(stack_name)?
            .get(logical_id)
            .map(|r| r.fingerprint.clone())
    }

    pub async fn secret_count(&self) -> usize {
        self.state.read().await.secrets.len()
    }

    /// Length of a stored secret value
    pub async fn secret_length(&self, name: &str) -> Option<usize> {
        self.state
            .read()
            .await
            .secrets
            .get(name)
            .map(|s| s.value.chars().count())
    }

    /// Whether a stored secret contains none of `characters`
    pub async fn secret_avoids(&self, name: &str, characters: &str) -> Option<bool> {
        self.state
            .read()
            .await
            .secrets
            .get(name)
            .map(|s| !s.value.chars().any(|c| characters.contains(c)))
    }

    /// Whether two stored secrets hold different values
    pub async fn secrets_differ(&self, first: &str, second: &str) -> Option<bool> {
        let state = self.state.read().await;
        let a = state.secrets.get(first)?;
        let b = state.secrets.get(second)?;
        Some(*a.value != *b.value)
    }
}

#[async_trait]
impl ProvisioningEngine for InMemoryEngine {
    async fn apply(&self, template: &StackTemplate) -> Result<ApplyReport, StackError> {
        let order = apply_order(template)?;
        let mut state = self.state.write().await;
        let mut report = ApplyReport::new(template.stack_name.as_str());
        let mut applied: HashSet<&str> = HashSet::new();

        info!(
            stack = %template.stack_name,
            resources = order.len(),
            "Applying stack template"
        );

        for logical_id in order {
            let resource = &template.resources[logical_id];

            for reference in resource.references() {
                if !applied.contains(reference.as_str()) {
                    return Err(StackError::precondition(format!(
                        "`{logical_id}` refers to `{reference}`, which has not been applied"
                    )));
                }
            }
            if state.fail_on.contains(logical_id) {
                return Err(StackError::Provisioning(anyhow!(
                    "engine rejected `{logical_id}` ({})",
                    resource.resource_type
                )));
            }

            let outcome = if resource.resource_type == ResourceKind::RepositoryLookup.type_name() {
                resolve_repository(&state, resource)?;
                ApplyOutcome::Resolved
            } else {
                let fingerprint = fingerprint(resource)?;
                if resource.resource_type == ResourceKind::GeneratedSecret.type_name() {
                    store_secret(
                        &mut state,
                        &format!("{}/{logical_id}", template.stack_name),
                        resource,
                        &fingerprint,
                    )?;
                }
                let existing = state
                    .stacks
                    .get(&template.stack_name)
                    .and_then(|deployed| deployed.get(logical_id));
                let (outcome, sequence) = match existing {
                    None => (ApplyOutcome::Created, None),
                    Some(existing) if existing.fingerprint == fingerprint => {
                        (ApplyOutcome::Unchanged, Some(existing.sequence))
                    }
                    Some(existing) => (ApplyOutcome::Updated, Some(existing.sequence)),
                };
                let sequence = match sequence {
                    Some(sequence) => sequence,
                    None => {
                        state.next_sequence += 1;
                        state.next_sequence
                    }
                };
                state
                    .stacks
                    .entry(template.stack_name.clone())
                    .or_default()
                    .insert(
                        logical_id.to_string(),
                        DeployedResource {
                            resource_type: resource.resource_type.clone(),
                            fingerprint,
                            sequence,
                        },
                    );
                outcome
            };

            debug!(
                logical_id = %logical_id,
                resource_type = %resource.resource_type,
                outcome = outcome.as_str(),
                "Applied resource"
            );
            metrics::record_applied_resource(outcome.as_str());
            applied.insert(logical_id);
            report.resources.push(AppliedResource {
                logical_id: logical_id.to_string(),
                resource_type: resource.resource_type.clone(),
                outcome,
            });
        }

        delete_stale(&mut state, template, &mut report)?;

        info!(
            stack = %template.stack_name,
            created = report.created(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            deleted = report.deleted(),
            "Stack template applied"
        );
        Ok(report)
    }
}

/// Delete what `template.stack_name` still has deployed but no longer declares
///
/// Newest resources go first, so dependents are removed before what they
/// depend on. Secrets owned by a deleted resource are released.
fn delete_stale(
    state: &mut EngineState,
    template: &StackTemplate,
    report: &mut ApplyReport,
) -> Result<(), StackError> {
    let mut stale: Vec<(u64, String, String)> = state
        .stacks
        .get(&template.stack_name)
        .map(|deployed| {
            deployed
                .iter()
                .filter(|(id, _)| !template.resources.contains_key(id.as_str()))
                .map(|(id, r)| (r.sequence, id.clone(), r.resource_type.clone()))
                .collect()
        })
        .unwrap_or_default();
    stale.sort_unstable_by(|a, b| b.0.cmp(&a.0));

    for (_, logical_id, resource_type) in stale {
        if state.fail_on.contains(&logical_id) {
            return Err(StackError::Provisioning(anyhow!(
                "engine failed to delete `{logical_id}` ({resource_type})"
            )));
        }
        let owner = format!("{}/{logical_id}", template.stack_name);
        state.secrets.retain(|_, secret| secret.owner != owner);
        if let Some(deployed) = state.stacks.get_mut(&template.stack_name) {
            deployed.remove(&logical_id);
        }

        debug!(
            logical_id = %logical_id,
            resource_type = %resource_type,
            "Deleted resource"
        );
        metrics::record_applied_resource(ApplyOutcome::Deleted.as_str());
        report.resources.push(AppliedResource {
            logical_id,
            resource_type,
            outcome: ApplyOutcome::Deleted,
        });
    }
    Ok(())
}

/// Topological order of the template over its `dependsOn` edges
///
/// Ties are broken by template order.
fn apply_order(template: &StackTemplate) -> Result<Vec<&str>, StackError> {
    let ids: Vec<&str> = template.resources.keys().map(String::as_str).collect();
    let position: HashMap<&str, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut in_degree = vec![0usize; ids.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ids.len()];
    for (index, resource) in template.resources.values().enumerate() {
        for dependency in &resource.depends_on {
            let Some(&dep) = position.get(dependency.as_str()) else {
                return Err(StackError::precondition(format!(
                    "`{}` depends on `{dependency}`, which is not in the template",
                    ids[index]
                )));
            };
            in_degree[index] += 1;
            dependents[dep].push(index);
        }
    }

    let mut ready: BTreeSet<usize> = (0..ids.len()).filter(|i| in_degree[*i] == 0).collect();
    let mut order = Vec::with_capacity(ids.len());
    while let Some(next) = ready.pop_first() {
        order.push(ids[next]);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != ids.len() {
        let stuck: Vec<&str> = (0..ids.len())
            .filter(|i| in_degree[*i] > 0)
            .map(|i| ids[i])
            .collect();
        return Err(StackError::DependencyCycle(stuck.join(", ")));
    }
    Ok(order)
}

fn fingerprint(resource: &TemplateResource) -> Result<String, StackError> {
    let properties = serde_json::to_string(&resource.properties)
        .map_err(|e| StackError::Provisioning(anyhow!("failed to encode properties: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(resource.resource_type.as_bytes());
    hasher.update([0u8]);
    hasher.update(properties.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn string_property<'a>(resource: &'a TemplateResource, key: &str) -> Result<&'a str, StackError> {
    resource
        .properties
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            StackError::precondition(format!(
                "{} is missing string property `{key}`",
                resource.resource_type
            ))
        })
}

fn resolve_repository(state: &EngineState, resource: &TemplateResource) -> Result<(), StackError> {
    let name = string_property(resource, "RepositoryName")?;
    if !state.repositories.contains(name) {
        return Err(StackError::UnresolvedRepository {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn store_secret(
    state: &mut EngineState,
    owner: &str,
    resource: &TemplateResource,
    fingerprint: &str,
) -> Result<(), StackError> {
    let name = string_property(resource, "Name")?;

    if let Some(existing) = state.secrets.get(name) {
        if existing.owner != owner {
            return Err(StackError::DuplicateSecret {
                name: name.to_string(),
            });
        }
        if existing.fingerprint == fingerprint {
            return Ok(());
        }
    }

    let policy = resource.properties.get("GenerateSecretString");
    let length = policy
        .and_then(|p| p.get("PasswordLength"))
        .and_then(serde_json::Value::as_u64)
        .and_then(|l| usize::try_from(l).ok())
        .ok_or_else(|| {
            StackError::precondition(format!("secret `{name}` has no valid PasswordLength"))
        })?;
    let excluded = policy
        .and_then(|p| p.get("ExcludeCharacters"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();

    // A renamed secret replaces the one its resource owned before.
    state
        .secrets
        .retain(|existing, secret| secret.owner != owner || existing == name);

    let value = generate_password(length, excluded).ok_or_else(|| {
        StackError::precondition(format!("secret `{name}` excludes every printable character"))
    })?;
    state.secrets.insert(
        name.to_string(),
        StoredSecret {
            owner: owner.to_string(),
            fingerprint: fingerprint.to_string(),
            value,
        },
    );
    debug!(secret.name = %name, secret.length = length, "Generated secret value");
    Ok(())
}

fn generate_password(length: usize, excluded: &str) -> Option<Zeroizing<String>> {
    let alphabet: Vec<char> = (b'!'..=b'~')
        .map(char::from)
        .filter(|c| !excluded.contains(*c))
        .collect();
    if alphabet.is_empty() {
        return None;
    }
    let mut rng = rand::thread_rng();
    let value: String = (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect();
    Some(Zeroizing::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_EXCLUDED_CHARACTERS;
    use indexmap::IndexMap;
    use serde_json::json;

    fn resource(resource_type: &str, properties: serde_json::Value, depends_on: &[&str]) -> TemplateResource {
        let properties: IndexMap<String, serde_json::Value> =
            serde_json::from_value(properties).unwrap();
        TemplateResource {
            resource_type: resource_type.to_string(),
            properties,
            depends_on: depends_on.iter().map(ToString::to_string).collect(),
        }
    }

    fn secret(name: &str, length: u32) -> TemplateResource {
        resource(
            "AWS::SecretsManager::Secret",
            json!({
                "Name": name,
                "GenerateSecretString": {
                    "PasswordLength": length,
                    "ExcludeCharacters": DEFAULT_EXCLUDED_CHARACTERS,
                }
            }),
            &[],
        )
    }

    fn template(stack_name: &str, resources: Vec<(&str, TemplateResource)>) -> StackTemplate {
        StackTemplate {
            stack_name: stack_name.to_string(),
            resources: resources
                .into_iter()
                .map(|(id, r)| (id.to_string(), r))
                .collect(),
            outputs: IndexMap::new(),
        }
    }

    #[tokio::test]
    async fn test_reapply_is_unchanged() {
        let engine = InMemoryEngine::new();
        let t = template(
            "DemoStack",
            vec![
                ("DemoVPC", resource("AWS::EC2::VPC", json!({"CidrBlock": "10.0.0.0/16"}), &[])),
                ("DemoDatabasePassword", secret("DemoDatabasePassword", 8)),
            ],
        );

        let first = engine.apply(&t).await.unwrap();
        assert_eq!(first.created(), 2);
        let second = engine.apply(&t).await.unwrap();
        assert!(second.is_noop());
        assert_eq!(second.unchanged(), 2);
        assert_eq!(engine.resource_count("DemoStack").await, 2);
        assert_eq!(engine.secret_length("DemoDatabasePassword").await, Some(8));
    }

    #[tokio::test]
    async fn test_changed_properties_update_in_place() {
        let engine = InMemoryEngine::new();
        engine
            .apply(&template(
                "DemoStack",
                vec![("DemoVPC", resource("AWS::EC2::VPC", json!({"MaxAzs": 2}), &[]))],
            ))
            .await
            .unwrap();
        let before = engine.fingerprint("DemoStack", "DemoVPC").await.unwrap();

        let report = engine
            .apply(&template(
                "DemoStack",
                vec![("DemoVPC", resource("AWS::EC2::VPC", json!({"MaxAzs": 3}), &[]))],
            ))
            .await
            .unwrap();
        assert_eq!(report.outcome_of("DemoVPC"), Some(ApplyOutcome::Updated));
        assert_ne!(engine.fingerprint("DemoStack", "DemoVPC").await.unwrap(), before);
        assert_eq!(engine.resource_count("DemoStack").await, 1);
    }

    #[tokio::test]
    async fn test_secret_name_claimed_twice_is_rejected() {
        let engine = InMemoryEngine::new();
        let t = template(
            "DemoStack",
            vec![
                ("FirstPassword", secret("SharedName", 16)),
                ("SecondPassword", secret("SharedName", 16)),
            ],
        );
        let err = engine.apply(&t).await.unwrap_err();
        assert!(matches!(err, StackError::DuplicateSecret { name } if name == "SharedName"));
    }

    #[tokio::test]
    async fn test_secret_name_is_global_across_stacks() {
        let engine = InMemoryEngine::new();
        let secret_only = |stack: &str| {
            template(stack, vec![("DemoDatabasePassword", secret("DemoDatabasePassword", 8))])
        };
        engine.apply(&secret_only("DemoFargateStack")).await.unwrap();
        let err = engine
            .apply(&secret_only("DemoOtherStack"))
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateSecret { .. }));
    }

    #[tokio::test]
    async fn test_generated_values_honour_policy() {
        let engine = InMemoryEngine::new();
        engine
            .apply(&template(
                "DemoStack",
                vec![
                    ("A", secret("A", 64)),
                    ("B", secret("B", 64)),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(engine.secret_count().await, 2);
        assert_eq!(engine.secret_length("A").await, Some(64));
        assert_eq!(
            engine.secret_avoids("A", DEFAULT_EXCLUDED_CHARACTERS).await,
            Some(true)
        );
        assert_eq!(engine.secrets_differ("A", "B").await, Some(true));
        assert_eq!(engine.secret_length("Missing").await, None);
    }

    #[tokio::test]
    async fn test_unknown_repository_is_unresolved() {
        let lookup = resource(
            "Lookup::ECR::Repository",
            json!({"RepositoryName": "unicorn-store"}),
            &[],
        );
        let t = template("DemoStack", vec![("ExistingEcrRepository", lookup)]);

        let err = InMemoryEngine::new().apply(&t).await.unwrap_err();
        assert!(matches!(err, StackError::UnresolvedRepository { name } if name == "unicorn-store"));

        let engine = InMemoryEngine::new().with_repository("unicorn-store").unwrap();
        let report = engine.apply(&t).await.unwrap();
        assert_eq!(
            report.outcome_of("ExistingEcrRepository"),
            Some(ApplyOutcome::Resolved)
        );
        assert_eq!(engine.resource_count("DemoStack").await, 0);
    }

    #[tokio::test]
    async fn test_dependencies_are_applied_first() {
        let engine = InMemoryEngine::new();
        let t = template(
            "DemoStack",
            vec![
                (
                    "DemoCluster",
                    resource(
                        "AWS::ECS::Cluster",
                        json!({"VpcId": {"ref": "DemoVPC", "attribute": "VpcId"}}),
                        &["DemoVPC"],
                    ),
                ),
                ("DemoVPC", resource("AWS::EC2::VPC", json!({}), &[])),
            ],
        );
        let report = engine.apply(&t).await.unwrap();
        let order: Vec<&str> = report.resources.iter().map(|r| r.logical_id.as_str()).collect();
        assert_eq!(order, vec!["DemoVPC", "DemoCluster"]);
    }

    #[tokio::test]
    async fn test_reference_without_dependency_is_a_precondition_failure() {
        let t = template(
            "DemoStack",
            vec![
                (
                    "DemoCluster",
                    resource(
                        "AWS::ECS::Cluster",
                        json!({"VpcId": {"ref": "DemoVPC", "attribute": "VpcId"}}),
                        &[],
                    ),
                ),
                ("DemoVPC", resource("AWS::EC2::VPC", json!({}), &[])),
            ],
        );
        let err = InMemoryEngine::new().apply(&t).await.unwrap_err();
        assert!(matches!(err, StackError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        let t = template(
            "DemoStack",
            vec![
                ("A", resource("AWS::EC2::VPC", json!({}), &["B"])),
                ("B", resource("AWS::EC2::VPC", json!({}), &["A"])),
            ],
        );
        let err = InMemoryEngine::new().apply(&t).await.unwrap_err();
        assert!(matches!(err, StackError::DependencyCycle(_)));
    }

    #[tokio::test]
    async fn test_injected_failure_propagates() {
        let engine = InMemoryEngine::new();
        engine.fail_on("DemoVPC").await;
        let t = template(
            "DemoStack",
            vec![("DemoVPC", resource("AWS::EC2::VPC", json!({}), &[]))],
        );
        let err = engine.apply(&t).await.unwrap_err();
        assert!(matches!(err, StackError::Provisioning(_)));

        engine.clear_failures().await;
        assert_eq!(engine.apply(&t).await.unwrap().created(), 1);
    }

    #[tokio::test]
    async fn test_removed_resources_are_deleted_newest_first() {
        let engine = InMemoryEngine::new();
        let vpc = || resource("AWS::EC2::VPC", json!({}), &[]);
        engine
            .apply(&template(
                "DemoStack",
                vec![
                    ("DemoVPC", vpc()),
                    ("DemoGroup", resource("AWS::EC2::SecurityGroup", json!({}), &["DemoVPC"])),
                    ("DemoRule", resource("AWS::EC2::SecurityGroupIngress", json!({}), &["DemoGroup"])),
                    ("DemoDatabasePassword", secret("DemoDatabasePassword", 8)),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(engine.secret_count().await, 1);

        let report = engine
            .apply(&template("DemoStack", vec![("DemoVPC", vpc())]))
            .await
            .unwrap();
        let deleted: Vec<&str> = report
            .resources
            .iter()
            .filter(|r| r.outcome == ApplyOutcome::Deleted)
            .map(|r| r.logical_id.as_str())
            .collect();
        assert_eq!(deleted, vec!["DemoDatabasePassword", "DemoRule", "DemoGroup"]);
        assert_eq!(report.unchanged(), 1);
        assert!(!report.is_noop());
        assert_eq!(engine.resource_count("DemoStack").await, 1);
        assert_eq!(engine.secret_count().await, 0);
    }

    #[tokio::test]
    async fn test_deletion_leaves_other_stacks_alone() {
        let engine = InMemoryEngine::new();
        let vpc = || resource("AWS::EC2::VPC", json!({}), &[]);
        engine
            .apply(&template("DemoStack", vec![("DemoVPC", vpc())]))
            .await
            .unwrap();
        engine
            .apply(&template("ProdStack", vec![("ProdVPC", vpc())]))
            .await
            .unwrap();
        assert_eq!(engine.resource_count("DemoStack").await, 1);
        assert_eq!(engine.resource_count("ProdStack").await, 1);
    }

    #[tokio::test]
    async fn test_failed_deletion_propagates() {
        let engine = InMemoryEngine::new();
        let vpc = || resource("AWS::EC2::VPC", json!({}), &[]);
        engine
            .apply(&template("DemoStack", vec![("DemoVPC", vpc()), ("OldVPC", vpc())]))
            .await
            .unwrap();
        engine.fail_on("OldVPC").await;
        let err = engine
            .apply(&template("DemoStack", vec![("DemoVPC", vpc())]))
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Provisioning(_)));
        assert_eq!(engine.resource_count("DemoStack").await, 2);
    }

    #[tokio::test]
    async fn test_renamed_secret_releases_previous_name() {
        let engine = InMemoryEngine::new();
        engine
            .apply(&template("DemoStack", vec![("DbPassword", secret("OldName", 8))]))
            .await
            .unwrap();
        engine
            .apply(&template("DemoStack", vec![("DbPassword", secret("NewName", 8))]))
            .await
            .unwrap();
        assert_eq!(engine.secret_count().await, 1);
        assert_eq!(engine.secret_length("OldName").await, None);
        assert_eq!(engine.secret_length("NewName").await, Some(8));
    }

    #[tokio::test]
    async fn test_with_repository_rejects_shared_engine() {
        let engine = InMemoryEngine::new();
        let shared = engine.clone();
        let err = engine.with_repository("unicorn-store").unwrap_err();
        assert!(matches!(err, StackError::Precondition(_)));

        shared.register_repository("unicorn-store").await;
        let lookup = resource(
            "Lookup::ECR::Repository",
            json!({"RepositoryName": "unicorn-store"}),
            &[],
        );
        let report = shared
            .apply(&template("DemoStack", vec![("ExistingEcrRepository", lookup)]))
            .await
            .unwrap();
        assert_eq!(report.count(ApplyOutcome::Resolved), 1);
    }

    #[test]
    fn test_stored_secret_debug_hides_value() {
        let stored = StoredSecret {
            owner: "DemoStack/DemoDatabasePassword".to_string(),
            fingerprint: String::new(),
            value: Zeroizing::new("hunter2".to_string()),
        };
        let debug = format!("{stored:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("length: 7"));
    }
}
