//! # Constants
//!
//! Shared constants used throughout the stack builder.
//!
//! Resource-name suffixes and environment-variable keys are part of the
//! contract with previously provisioned environments and the deployed
//! application. Changing any of them is a breaking change.

// Resource naming: every resource name is "{Scope}{Suffix}".

/// Suffix of the virtual network name
pub const NETWORK_SUFFIX: &str = "VPC";

/// Suffix of the generated database password secret
pub const DATABASE_PASSWORD_SUFFIX: &str = "DatabasePassword";

/// Suffix of the database instance (also used as the instance identifier)
pub const DATABASE_SUFFIX: &str = "Database";

/// Suffix of the database security group
pub const DATABASE_SECURITY_GROUP_SUFFIX: &str = "DatabaseSecurityGroup";

/// Suffix of the container cluster, appended after the infrastructure name
pub const CLUSTER_SUFFIX: &str = "Cluster";

/// Suffix of the load-balanced service
pub const SERVICE_SUFFIX: &str = "FargateService";

/// Suffix of the generated site admin password secret
pub const ADMIN_PASSWORD_SUFFIX: &str = "DefaultSiteAdminPassword";

/// Suffix of the synthesized stack name, appended after the infrastructure name
pub const STACK_SUFFIX: &str = "Stack";

/// Logical ID of the lookup for the pre-existing image repository
pub const EXISTING_REPOSITORY_ID: &str = "ExistingEcrRepository";

// Environment variables delivered to the running service.

/// Hosting environment of the ASP.NET application
pub const ENV_ASPNETCORE_ENVIRONMENT: &str = "ASPNETCORE_ENVIRONMENT";

/// Username of the default site administrator
pub const ENV_DEFAULT_ADMIN_USERNAME: &str = "DefaultAdminUsername";

/// Password of the default site administrator (secret-backed)
pub const ENV_DEFAULT_ADMIN_PASSWORD: &str = "DefaultAdminPassword";

/// Database endpoint address
pub const ENV_DB_DATA_SOURCE: &str = "UnicornDbConnectionStringBuilder__DataSource";

/// Database username
pub const ENV_DB_USER_ID: &str = "UnicornDbConnectionStringBuilder__UserId";

/// Database password (secret-backed)
pub const ENV_DB_PASSWORD: &str = "UnicornDbConnectionStringBuilder__Password";

/// Value of `ASPNETCORE_ENVIRONMENT` when no environment is configured
pub const DEFAULT_DOTNET_ENVIRONMENT: &str = "Production";

// Generated secrets.

/// Default generated password length
pub const DEFAULT_PASSWORD_LENGTH: u32 = 16;

/// Generated database password length
pub const DATABASE_PASSWORD_LENGTH: u32 = 8;

/// Maximum generated password length accepted by the secret store
pub const MAX_PASSWORD_LENGTH: u32 = 4096;

/// Characters never used in generated passwords
pub const DEFAULT_EXCLUDED_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

// Network layout.

/// Address space of the virtual network
pub const NETWORK_CIDR: &str = "10.0.0.0/16";

/// Prefix length of every subnet carved out of the network
pub const SUBNET_PREFIX_LENGTH: u8 = 20;

/// Maximum availability zones (two /20 subnets per zone fill the /16)
pub const MAX_AVAILABILITY_ZONES: u32 = 8;

/// Port the application container listens on behind the load balancer
pub const CONTAINER_PORT: u16 = 80;

/// Source range of the listener when the load balancer is internet-facing
pub const ANY_IPV4_CIDR: &str = "0.0.0.0/0";

// Settings defaults.

/// Default infrastructure name
pub const DEFAULT_INFRASTRUCTURE: &str = "Fargate";

/// Default number of availability zones
pub const DEFAULT_MAX_AZS: u32 = 2;

/// Default database instance class
pub const DEFAULT_DATABASE_INSTANCE_CLASS: &str = "t3";

/// Default database instance size
pub const DEFAULT_DATABASE_INSTANCE_SIZE: &str = "small";

/// Default task CPU units
pub const DEFAULT_CPU_MILLICORES: u32 = 256;

/// Default task memory (MiB)
pub const DEFAULT_MEMORY_MIB: u32 = 512;

/// Default image tag
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Prefix of environment-variable overrides for settings
pub const ENV_OVERRIDE_PREFIX: &str = "UNICORN_STACK_";
