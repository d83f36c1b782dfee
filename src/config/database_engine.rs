//! # Database Engines
//!
//! Relational engines the database provisioner can declare.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Managed relational database engine
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
pub enum DatabaseEngine {
    /// SQL Server Express Edition
    #[default]
    #[serde(rename = "sqlserver-ex")]
    SqlServerExpress,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
}

impl DatabaseEngine {
    /// Engine identifier understood by the managed database service
    pub fn engine_id(self) -> &'static str {
        match self {
            DatabaseEngine::SqlServerExpress => "sqlserver-ex",
            DatabaseEngine::Postgres => "postgres",
            DatabaseEngine::MySql => "mysql",
        }
    }

    /// Port the engine listens on unless configured otherwise
    pub fn default_port(self) -> u16 {
        match self {
            DatabaseEngine::SqlServerExpress => 1433,
            DatabaseEngine::Postgres => 5432,
            DatabaseEngine::MySql => 3306,
        }
    }

    /// SQL Server instances cannot be created with an initial database name.
    pub fn supports_database_name(self) -> bool {
        !matches!(self, DatabaseEngine::SqlServerExpress)
    }
}

impl fmt::Display for DatabaseEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.engine_id())
    }
}
