//! Configuration validation rules.

use super::Config;
use crate::error::{ImportError, Result};

/// Validate a parsed configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.target.host.is_empty() {
        return Err(ImportError::Config("target.host must not be empty".into()));
    }
    if config.target.database.is_empty() {
        return Err(ImportError::Config(
            "target.database must not be empty".into(),
        ));
    }
    if config.target.schema.is_empty() {
        return Err(ImportError::Config(
            "target.schema must not be empty".into(),
        ));
    }

    let batch_size = config.import.get_batch_size();
    if batch_size == 0 {
        return Err(ImportError::Config(
            "import.batch_size must be at least 1".into(),
        ));
    }
    // Bound by the PostgreSQL bind-parameter limit for wide tables.
    if batch_size > 5_000 {
        return Err(ImportError::Config(
            "import.batch_size must not exceed 5000".into(),
        ));
    }

    if config.import.get_max_connections() == 0 {
        return Err(ImportError::Config(
            "import.max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}
