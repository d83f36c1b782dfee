//! # Unicorn Stack
//!
//! Builds the runtime resource graph of the Unicorn Store web application:
//! a private network, a SQL Server database with a generated credential, a
//! container cluster, a load-balanced Fargate service, and the
//! security-group rule that lets only that service reach the database.
//!
//! ## Overview
//!
//! 1. **Settings** - [`config::StackSettings`] is loaded from YAML/JSON,
//!    overridden from `UNICORN_STACK_*` variables and validated
//! 2. **Graph** - [`stack::build_stack`] declares every resource into an
//!    explicit [`graph::StackGraph`] and returns typed handles
//! 3. **Template** - the graph renders to a serializable
//!    [`graph::StackTemplate`]
//! 4. **Apply** - a [`engine::ProvisioningEngine`] converges live state onto
//!    the template; [`engine::InMemoryEngine`] does so in memory
//!
//! ## Module Structure
//!
//! - `config` - settings, environments, database engines
//! - `graph` - builder context, bindings, template
//! - `secrets`, `network`, `database`, `compute`, `policy` - resource builders
//! - `stack` - ordered assembly of the full stack
//! - `engine` - provisioning engine seam
//! - `observability` - logging and Prometheus metrics

pub mod compute;
pub mod config;
pub mod constants;
pub mod database;
pub mod engine;
pub mod error;
pub mod graph;
pub mod network;
pub mod observability;
pub mod policy;
pub mod secrets;
pub mod stack;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{DatabaseEngine, Environment, StackSettings};
    pub use crate::engine::{ApplyOutcome, ApplyReport, InMemoryEngine, ProvisioningEngine};
    pub use crate::error::{ErrorKind, StackError};
    pub use crate::graph::{Binding, ResourceKind, StackGraph, StackTemplate};
    pub use crate::stack::{build_stack, UnicornStoreStack};
}
