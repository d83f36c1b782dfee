//! # Hosting Environment
//!
//! Closed set of hosting environments and the policies derived from them.

use crate::constants::DEFAULT_DOTNET_ENVIRONMENT;
use crate::error::StackError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hosting environment of the deployed application
///
/// Spelled the way ASP.NET Core expects in `ASPNETCORE_ENVIRONMENT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Environment {
    #[serde(alias = "development", alias = "DEVELOPMENT")]
    Development,
    #[serde(alias = "staging", alias = "STAGING")]
    Staging,
    #[serde(alias = "production", alias = "PRODUCTION")]
    Production,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "Development",
            Environment::Staging => "Staging",
            Environment::Production => "Production",
        }
    }

    /// Production-like environments are always protected from deletion.
    pub fn requires_deletion_protection(self) -> bool {
        !matches!(self, Environment::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ]
        .into_iter()
        .find(|env| env.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| {
            StackError::configuration(format!(
                "unknown environment `{s}` (expected Development, Staging or Production)"
            ))
        })
    }
}

/// Value delivered as `ASPNETCORE_ENVIRONMENT`
pub fn dotnet_environment_value(environment: Option<Environment>) -> &'static str {
    environment.map_or(DEFAULT_DOTNET_ENVIRONMENT, Environment::as_str)
}

/// Deletion protection for the database.
///
/// Only an explicit Development environment turns protection off; an
/// unset environment is treated as production.
pub fn deletion_protection(environment: Option<Environment>) -> bool {
    environment.map_or(true, Environment::requires_deletion_protection)
}
