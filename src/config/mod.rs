//! # Configuration
//!
//! Stack settings and the closed enumerations derived from them.
//!
//! - `settings.rs` - `StackSettings`, file loading, env overrides, validation
//! - `environment.rs` - hosting environment and deletion-protection policy
//! - `database_engine.rs` - supported database engines

mod database_engine;
mod environment;
mod settings;

pub use database_engine::DatabaseEngine;
pub use environment::{deletion_protection, dotnet_environment_value, Environment};
pub use settings::{settings_schema, StackSettings};
