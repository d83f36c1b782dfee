//! # Generated Secrets
//!
//! Policies for auto-generated credentials and their declaration as managed
//! secret resources.
//!
//! The stack builder never sees a secret value. It declares a generation
//! policy, and the provisioning engine produces and stores the value. Callers
//! only ever hold a [`SecretHandle`], whose `value()` is a reference the
//! engine resolves at deploy time.

use crate::constants::{DEFAULT_EXCLUDED_CHARACTERS, DEFAULT_PASSWORD_LENGTH, MAX_PASSWORD_LENGTH};
use crate::error::StackError;
use crate::graph::{Binding, Properties, ResourceId, ResourceKind, StackGraph};
use serde_json::json;
use tracing::info;

/// Generation policy of a managed secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretSpec {
    name: String,
    length: u32,
    excluded_characters: String,
}

impl SecretSpec {
    /// Policy with the default length and excluded characters
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            length: DEFAULT_PASSWORD_LENGTH,
            excluded_characters: DEFAULT_EXCLUDED_CHARACTERS.to_string(),
        }
    }

    #[must_use]
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }

    #[must_use]
    pub fn with_excluded_characters(mut self, excluded: impl Into<String>) -> Self {
        self.excluded_characters = excluded.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn excluded_characters(&self) -> &str {
        &self.excluded_characters
    }

    fn validate(&self) -> Result<(), StackError> {
        if self.length == 0 || self.length > MAX_PASSWORD_LENGTH {
            return Err(StackError::configuration(format!(
                "secret `{}` length must be between 1 and {MAX_PASSWORD_LENGTH}, got {}",
                self.name, self.length
            )));
        }
        let has_candidates = (b'!'..=b'~')
            .map(char::from)
            .any(|c| !self.excluded_characters.contains(c));
        if !has_candidates {
            return Err(StackError::configuration(format!(
                "secret `{}` excludes every printable character",
                self.name
            )));
        }
        Ok(())
    }

    /// Declare the managed secret in `graph`
    ///
    /// A second secret with the same name in the same graph is rejected as
    /// a `DuplicateResource` configuration error.
    pub fn materialize(&self, graph: &mut StackGraph) -> Result<SecretHandle, StackError> {
        self.validate()?;

        let properties = Properties::new()
            .with_literal("Name", self.name.as_str())
            .with_literal(
                "GenerateSecretString",
                json!({
                    "PasswordLength": self.length,
                    "ExcludeCharacters": self.excluded_characters,
                }),
            );
        let id = graph.declare(self.name.as_str(), ResourceKind::GeneratedSecret, properties)?;

        info!(
            secret.name = %self.name,
            secret.length = self.length,
            "Declared generated secret"
        );
        Ok(SecretHandle {
            id,
            name: self.name.clone(),
        })
    }
}

/// Opaque reference to a declared managed secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretHandle {
    id: ResourceId,
    name: String,
}

impl SecretHandle {
    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The realized secret value, resolved by the provisioning engine
    pub fn value(&self) -> Binding {
        Binding::Secret { resource: self.id }
    }
}
