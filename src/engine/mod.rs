//! # Provisioning Engine
//!
//! Boundary to the collaborator that turns a [`StackTemplate`] into live
//! infrastructure.
//!
//! The engine owns change planning, retries and parallelism. Errors it
//! reports are handed back to the caller unchanged.
//!
//! ## Module Structure
//!
//! - `memory.rs` - in-memory engine with declarative diffing

mod memory;

pub use memory::InMemoryEngine;

use crate::error::StackError;
use crate::graph::StackTemplate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Applies stack templates
#[async_trait]
pub trait ProvisioningEngine: Send + Sync {
    /// Converge the deployed state of `template.stack_name` onto `template`
    async fn apply(&self, template: &StackTemplate) -> Result<ApplyReport, StackError>;
}

/// What applying one resource did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
    /// Existing infrastructure was looked up
    Resolved,
    /// Deployed, but no longer in the template
    Deleted,
}

impl ApplyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyOutcome::Created => "created",
            ApplyOutcome::Updated => "updated",
            ApplyOutcome::Unchanged => "unchanged",
            ApplyOutcome::Resolved => "resolved",
            ApplyOutcome::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One applied resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResource {
    pub logical_id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub outcome: ApplyOutcome,
}

/// Result of applying a template, in application order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub stack_name: String,
    pub applied_at: DateTime<Utc>,
    pub resources: Vec<AppliedResource>,
}

impl ApplyReport {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            applied_at: Utc::now(),
            resources: Vec::new(),
        }
    }

    pub fn count(&self, outcome: ApplyOutcome) -> usize {
        self.resources.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn created(&self) -> usize {
        self.count(ApplyOutcome::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(ApplyOutcome::Updated)
    }

    pub fn unchanged(&self) -> usize {
        self.count(ApplyOutcome::Unchanged)
    }

    pub fn deleted(&self) -> usize {
        self.count(ApplyOutcome::Deleted)
    }

    /// True when nothing was created, updated or deleted
    pub fn is_noop(&self) -> bool {
        self.created() == 0 && self.updated() == 0 && self.deleted() == 0
    }

    pub fn outcome_of(&self, logical_id: &str) -> Option<ApplyOutcome> {
        self.resources
            .iter()
            .find(|r| r.logical_id == logical_id)
            .map(|r| r.outcome)
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Stack {} (applied {})",
            self.stack_name,
            self.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        for resource in &self.resources {
            writeln!(
                f,
                "  {:<10} {:<48} {}",
                resource.outcome, resource.logical_id, resource.resource_type
            )?;
        }
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} deleted",
            self.created(),
            self.updated(),
            self.unchanged(),
            self.deleted()
        )
    }
}
