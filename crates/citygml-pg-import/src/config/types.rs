//! Configuration type definitions.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Import behavior configuration.
    #[serde(default)]
    pub import: ImportConfig,
}

/// Target database (PostgreSQL) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Target schema holding the city model tables (default: "citydb").
    #[serde(default = "default_citydb_schema")]
    pub schema: String,
}

/// Import behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ImportConfig {
    /// Rows accumulated per batch writer before an automatic flush.
    /// Shared across all batch writers of a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Maximum PostgreSQL connections (default: 4).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<usize>,

    /// Spatial reference identifier bound into geometry parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srid: Option<i32>,

    /// Policy for unsupported variants and unmappable entity types
    /// (default: skip).
    #[serde(default)]
    pub on_unsupported: OnUnsupported,
}

impl ImportConfig {
    // Accessor methods that return the effective value with fallback defaults

    pub fn get_batch_size(&self) -> usize {
        self.batch_size.unwrap_or(20)
    }

    pub fn get_max_connections(&self) -> usize {
        self.max_connections.unwrap_or(4)
    }

    pub fn get_srid(&self) -> i32 {
        self.srid.unwrap_or(4326)
    }
}

/// Run policy for recoverable per-entity conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnUnsupported {
    /// Log the entity and continue with the rest of the stream.
    #[default]
    Skip,

    /// Escalate to a fatal error and abort the run.
    Abort,
}

// Default value functions for serde

fn default_pg_port() -> u16 {
    5432
}

fn default_citydb_schema() -> String {
    "citydb".to_string()
}
