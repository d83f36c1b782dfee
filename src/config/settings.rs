//! # Stack Settings
//!
//! Caller-supplied settings for one deployable environment.
//!
//! Settings are loaded from a YAML (or JSON) file, optionally overridden
//! from `UNICORN_STACK_*` environment variables, and validated here before
//! any resource is declared. The builders downstream treat them as opaque.

use crate::config::{DatabaseEngine, Environment};
use crate::constants::{
    CLUSTER_SUFFIX, DEFAULT_CPU_MILLICORES, DEFAULT_DATABASE_INSTANCE_CLASS,
    DEFAULT_DATABASE_INSTANCE_SIZE, DEFAULT_IMAGE_TAG, DEFAULT_INFRASTRUCTURE, DEFAULT_MAX_AZS,
    DEFAULT_MEMORY_MIB, ENV_OVERRIDE_PREFIX, MAX_AVAILABILITY_ZONES, STACK_SUFFIX,
};
use crate::error::StackError;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info};

// ECR repository names: lowercase path components separated by `/`
static REPOSITORY_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9]+(?:[._-][a-z0-9]+)*/)*[a-z0-9]+(?:[._-][a-z0-9]+)*$")
        .expect("Failed to compile REPOSITORY_NAME regex - this should never happen")
});

static IMAGE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$")
        .expect("Failed to compile IMAGE_TAG regex - this should never happen")
});

static DB_USERNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,127}$")
        .expect("Failed to compile DB_USERNAME regex - this should never happen")
});

static INSTANCE_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+$")
        .expect("Failed to compile INSTANCE_PART regex - this should never happen")
});

/// Settings for one stack
///
/// # Example
///
/// ```yaml
/// scopeName: Demo
/// maxAzs: 2
/// dbUsername: admin
/// desiredReplicaCount: 2
/// dockerImageRepository: unicorn-store
/// imageTag: "1.4.0"
/// defaultSiteAdminUsername: admin@unicorn.store
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackSettings {
    /// Prefix of every resource name (e.g. "Demo" yields "DemoDatabase")
    pub scope_name: String,
    /// Compute infrastructure name, part of the cluster name
    #[serde(default = "default_infrastructure")]
    pub infrastructure: String,
    /// Maximum availability zones spanned by the network
    #[serde(default = "default_max_azs")]
    pub max_azs: u32,
    /// Relational database engine
    #[serde(default)]
    pub database_engine: DatabaseEngine,
    /// Database instance class (e.g. "t3", "m5")
    #[serde(default = "default_database_instance_class")]
    pub database_instance_class: String,
    /// Database instance size (e.g. "small", "large")
    #[serde(default = "default_database_instance_size")]
    pub database_instance_size: String,
    /// Initial database name, only for engines that support one
    #[serde(default)]
    pub database_name: Option<String>,
    /// Database master username
    pub db_username: String,
    /// Hosting environment; production when unset
    #[serde(default)]
    pub dot_net_environment: Option<Environment>,
    /// Desired number of running service tasks
    #[serde(default = "default_desired_replica_count")]
    pub desired_replica_count: u32,
    /// Task CPU units (1024 = one vCPU)
    #[serde(default = "default_cpu_millicores")]
    pub cpu_millicores: u32,
    /// Task memory limit in MiB
    #[serde(default = "default_memory_mib", rename = "memoryMiB")]
    pub memory_mib: u32,
    /// Name of the existing image repository
    pub docker_image_repository: String,
    /// Image tag to deploy
    #[serde(default = "default_image_tag")]
    pub image_tag: String,
    /// Internet-facing (true) or internal (false) load balancer
    #[serde(default = "default_true")]
    pub public_load_balancer: bool,
    /// Username of the application's default admin account
    pub default_site_admin_username: String,
}

fn default_infrastructure() -> String {
    DEFAULT_INFRASTRUCTURE.to_string()
}

fn default_max_azs() -> u32 {
    DEFAULT_MAX_AZS
}

fn default_database_instance_class() -> String {
    DEFAULT_DATABASE_INSTANCE_CLASS.to_string()
}

fn default_database_instance_size() -> String {
    DEFAULT_DATABASE_INSTANCE_SIZE.to_string()
}

fn default_desired_replica_count() -> u32 {
    1
}

fn default_cpu_millicores() -> u32 {
    DEFAULT_CPU_MILLICORES
}

fn default_memory_mib() -> u32 {
    DEFAULT_MEMORY_MIB
}

fn default_image_tag() -> String {
    DEFAULT_IMAGE_TAG.to_string()
}

fn default_true() -> bool {
    true
}

/// JSON schema of [`StackSettings`]
pub fn settings_schema() -> schemars::Schema {
    schemars::schema_for!(StackSettings)
}

impl StackSettings {
    /// Minimal settings with every optional field at its default
    pub fn new(
        scope_name: impl Into<String>,
        db_username: impl Into<String>,
        docker_image_repository: impl Into<String>,
        default_site_admin_username: impl Into<String>,
    ) -> Self {
        Self {
            scope_name: scope_name.into(),
            infrastructure: default_infrastructure(),
            max_azs: default_max_azs(),
            database_engine: DatabaseEngine::default(),
            database_instance_class: default_database_instance_class(),
            database_instance_size: default_database_instance_size(),
            database_name: None,
            db_username: db_username.into(),
            dot_net_environment: None,
            desired_replica_count: default_desired_replica_count(),
            cpu_millicores: default_cpu_millicores(),
            memory_mib: default_memory_mib(),
            docker_image_repository: docker_image_repository.into(),
            image_tag: default_image_tag(),
            public_load_balancer: default_true(),
            default_site_admin_username: default_site_admin_username.into(),
        }
    }

    /// Parse settings from YAML (JSON is accepted as well)
    pub fn from_yaml_str(contents: &str) -> Result<Self, StackError> {
        serde_yaml::from_str(contents)
            .map_err(|e| StackError::configuration(format!("failed to parse settings: {e}")))
    }

    /// Load settings from a YAML or JSON file
    pub fn from_file(path: &Path) -> Result<Self, StackError> {
        debug!(path = %path.display(), "Loading stack settings");
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StackError::configuration(format!(
                "failed to read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), StackError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `UNICORN_STACK_*` overrides resolved through `lookup`
    ///
    /// Supported keys: `ENVIRONMENT`, `IMAGE_TAG`, `DESIRED_COUNT`,
    /// `PUBLIC_LOAD_BALANCER`. A malformed value is a configuration error.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), StackError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_OVERRIDE_PREFIX}{name}"));

        if let Some(value) = var("ENVIRONMENT") {
            let environment = value.parse::<Environment>()?;
            info!(environment = %environment, "Overriding environment from process environment");
            self.dot_net_environment = Some(environment);
        }
        if let Some(value) = var("IMAGE_TAG") {
            info!(image_tag = %value, "Overriding image tag from process environment");
            self.image_tag = value;
        }
        if let Some(value) = var("DESIRED_COUNT") {
            self.desired_replica_count = value.trim().parse().map_err(|e| {
                StackError::configuration(format!(
                    "{ENV_OVERRIDE_PREFIX}DESIRED_COUNT must be a non-negative integer, got `{value}`: {e}"
                ))
            })?;
        }
        if let Some(value) = var("PUBLIC_LOAD_BALANCER") {
            self.public_load_balancer = parse_bool(&value).ok_or_else(|| {
                StackError::configuration(format!(
                    "{ENV_OVERRIDE_PREFIX}PUBLIC_LOAD_BALANCER must be a boolean, got `{value}`"
                ))
            })?;
        }
        Ok(())
    }

    /// Validate settings before stack construction
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn validate(&self) -> Result<(), StackError> {
        validate_identifier("scopeName", &self.scope_name)?;
        validate_identifier("infrastructure", &self.infrastructure)?;

        if self.max_azs == 0 || self.max_azs > MAX_AVAILABILITY_ZONES {
            return Err(StackError::configuration(format!(
                "maxAzs must be between 1 and {MAX_AVAILABILITY_ZONES}, got {}",
                self.max_azs
            )));
        }

        for (field, value) in [
            ("databaseInstanceClass", &self.database_instance_class),
            ("databaseInstanceSize", &self.database_instance_size),
        ] {
            if !INSTANCE_PART.is_match(value) {
                return Err(StackError::configuration(format!(
                    "{field} must be lowercase alphanumeric, got `{value}`"
                )));
            }
        }

        if let Some(name) = &self.database_name {
            if !self.database_engine.supports_database_name() {
                return Err(StackError::configuration(format!(
                    "databaseName cannot be specified for engine {}",
                    self.database_engine
                )));
            }
            validate_identifier("databaseName", name)?;
        }

        if !DB_USERNAME.is_match(&self.db_username) {
            return Err(StackError::configuration(format!(
                "dbUsername must start with a letter and contain at most 128 letters, digits or underscores, got `{}`",
                self.db_username
            )));
        }

        if !is_valid_fargate_size(self.cpu_millicores, self.memory_mib) {
            return Err(StackError::configuration(format!(
                "cpuMillicores={} with memoryMiB={} is not a supported task size",
                self.cpu_millicores, self.memory_mib
            )));
        }

        let repository = &self.docker_image_repository;
        if repository.len() < 2 || repository.len() > 256 || !REPOSITORY_NAME.is_match(repository)
        {
            return Err(StackError::configuration(format!(
                "dockerImageRepository `{repository}` is not a valid repository name"
            )));
        }

        if !IMAGE_TAG.is_match(&self.image_tag) {
            return Err(StackError::configuration(format!(
                "imageTag `{}` is not a valid image tag",
                self.image_tag
            )));
        }

        if self.default_site_admin_username.trim().is_empty() {
            return Err(StackError::configuration(
                "defaultSiteAdminUsername must not be empty",
            ));
        }

        Ok(())
    }

    /// "{Scope}{suffix}"
    pub fn scoped_name(&self, suffix: &str) -> String {
        format!("{}{suffix}", self.scope_name)
    }

    /// "{Scope}{Infrastructure}Cluster"
    pub fn cluster_name(&self) -> String {
        format!(
            "{}{}{CLUSTER_SUFFIX}",
            self.scope_name, self.infrastructure
        )
    }

    /// "{Scope}{Infrastructure}Stack"
    pub fn stack_name(&self) -> String {
        format!("{}{}{STACK_SUFFIX}", self.scope_name, self.infrastructure)
    }

    /// Database instance type, e.g. "db.t3.small"
    pub fn database_instance_type(&self) -> String {
        format!(
            "db.{}.{}",
            self.database_instance_class, self.database_instance_size
        )
    }
}

fn validate_identifier(field: &str, value: &str) -> Result<(), StackError> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StackError::configuration(format!(
            "{field} must be non-empty and ASCII alphanumeric, got `{value}`"
        )));
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Supported task CPU/memory combinations
fn is_valid_fargate_size(cpu: u32, memory_mib: u32) -> bool {
    let (min, max) = match cpu {
        256 => return matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024, 4096),
        1024 => (2048, 8192),
        2048 => (4096, 16384),
        4096 => (8192, 30720),
        _ => return false,
    };
    (min..=max).contains(&memory_mib) && memory_mib % 1024 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn demo_settings() -> StackSettings {
        StackSettings::new("Demo", "admin", "unicorn-store", "admin@unicorn.store")
    }

    #[test]
    fn test_defaults_applied_when_parsing_yaml() {
        let yaml = r"
scopeName: Demo
dbUsername: admin
dockerImageRepository: unicorn-store
defaultSiteAdminUsername: admin@unicorn.store
";
        let settings = StackSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings, demo_settings());
        assert_eq!(settings.infrastructure, "Fargate");
        assert_eq!(settings.max_azs, 2);
        assert_eq!(settings.image_tag, "latest");
        assert!(settings.public_load_balancer);
        assert!(settings.dot_net_environment.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
scopeName: Unicorn
infrastructure: Fargate
maxAzs: 3
databaseEngine: sqlserver-ex
databaseInstanceClass: m5
databaseInstanceSize: large
dbUsername: dbadmin
dotNetEnvironment: Development
desiredReplicaCount: 4
cpuMillicores: 1024
memoryMiB: 2048
dockerImageRepository: team/unicorn-store
imageTag: "2.1.0"
publicLoadBalancer: false
defaultSiteAdminUsername: root
"#;
        let settings = StackSettings::from_yaml_str(yaml).unwrap();
        assert_eq!(settings.max_azs, 3);
        assert_eq!(settings.dot_net_environment, Some(Environment::Development));
        assert_eq!(settings.memory_mib, 2048);
        assert_eq!(settings.database_instance_type(), "db.m5.large");
        assert!(!settings.public_load_balancer);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_unknown_environment_is_rejected_at_parse_time() {
        let yaml = r"
scopeName: Demo
dbUsername: admin
dockerImageRepository: unicorn-store
defaultSiteAdminUsername: admin
dotNetEnvironment: Prod
";
        let err = StackSettings::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));
    }

    #[test]
    fn test_resource_names_follow_scope_convention() {
        let settings = demo_settings();
        assert_eq!(settings.scoped_name("Database"), "DemoDatabase");
        assert_eq!(settings.cluster_name(), "DemoFargateCluster");
        assert_eq!(settings.stack_name(), "DemoFargateStack");
    }

    #[test]
    fn test_validate_rejects_bad_scope_name() {
        for scope in ["", "Demo-1", "Demo Stack", "Démo"] {
            let mut settings = demo_settings();
            settings.scope_name = scope.to_string();
            assert!(
                settings.validate().is_err(),
                "scope `{scope}` should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_max_azs_bounds() {
        let mut settings = demo_settings();
        settings.max_azs = 0;
        assert!(settings.validate().is_err());
        settings.max_azs = 9;
        assert!(settings.validate().is_err());
        settings.max_azs = 8;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_fargate_sizes() {
        let valid = [(256, 512), (256, 2048), (512, 1024), (1024, 8192), (4096, 30720)];
        let invalid = [(256, 4096), (300, 512), (512, 1536), (2048, 2048), (4096, 32768)];

        for (cpu, memory) in valid {
            assert!(is_valid_fargate_size(cpu, memory), "{cpu}/{memory} should be valid");
        }
        for (cpu, memory) in invalid {
            assert!(!is_valid_fargate_size(cpu, memory), "{cpu}/{memory} should be invalid");
        }
    }

    #[test]
    fn test_validate_repository_name() {
        let mut settings = demo_settings();
        for name in ["unicorn-store", "team/unicorn_store", "a1/b.c"] {
            settings.docker_image_repository = name.to_string();
            assert!(settings.validate().is_ok(), "{name} should be valid");
        }
        for name in ["Unicorn", "unicorn//store", "-unicorn", "u"] {
            settings.docker_image_repository = name.to_string();
            assert!(settings.validate().is_err(), "{name} should be invalid");
        }
    }

    #[test]
    fn test_validate_db_username() {
        let mut settings = demo_settings();
        settings.db_username = "1admin".to_string();
        assert!(settings.validate().is_err());
        settings.db_username = "db_admin".to_string();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_database_name_rejected_for_sql_server() {
        let mut settings = demo_settings();
        settings.database_name = Some("unicorn".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("databaseName"));

        settings.database_engine = DatabaseEngine::Postgres;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("UNICORN_STACK_ENVIRONMENT", "development"),
            ("UNICORN_STACK_IMAGE_TAG", "1.2.3"),
            ("UNICORN_STACK_DESIRED_COUNT", "3"),
            ("UNICORN_STACK_PUBLIC_LOAD_BALANCER", "off"),
        ]);
        let mut settings = demo_settings();
        settings
            .apply_overrides(|key| vars.get(key).map(ToString::to_string))
            .unwrap();

        assert_eq!(settings.dot_net_environment, Some(Environment::Development));
        assert_eq!(settings.image_tag, "1.2.3");
        assert_eq!(settings.desired_replica_count, 3);
        assert!(!settings.public_load_balancer);
    }

    #[test]
    fn test_apply_overrides_rejects_malformed_values() {
        let mut settings = demo_settings();
        let err = settings
            .apply_overrides(|key| {
                (key == "UNICORN_STACK_DESIRED_COUNT").then(|| "two".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));

        let err = settings
            .apply_overrides(|key| (key == "UNICORN_STACK_ENVIRONMENT").then(|| "qa".to_string()))
            .unwrap_err();
        assert!(matches!(err, StackError::Configuration(_)));
    }

    #[test]
    fn test_apply_overrides_without_vars_is_noop() {
        let mut settings = demo_settings();
        settings.apply_overrides(|_| None).unwrap();
        assert_eq!(settings, demo_settings());
    }

    #[test]
    fn test_settings_schema_lists_required_fields() {
        let schema = serde_json::to_value(settings_schema()).unwrap();
        let required = schema["required"].as_array().unwrap();
        for field in ["scopeName", "dbUsername", "dockerImageRepository", "defaultSiteAdminUsername"] {
            assert!(
                required.iter().any(|v| v == field),
                "{field} should be required"
            );
        }
    }
}
