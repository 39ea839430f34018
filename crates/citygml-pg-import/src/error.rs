//! Error types for the import library.

use thiserror::Error;

/// Main error type for import operations.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// An entity's declared feature type cannot be mapped to a table target.
    /// Fatal to that entity, not the run, unless the run policy is strict.
    #[error("Cannot classify entity {entity}: {message}")]
    Classification { entity: String, message: String },

    /// Column binding mismatch (arity or type). Indicates a bug in an
    /// importer, always fatal.
    #[error("Binding error for table {table}: {message}")]
    Binding { table: String, message: String },

    /// The destination table or columns are invalid for the active schema.
    /// Fatal at run start.
    #[error("Statement preparation failed for table {table}: {message}")]
    StatementPreparation { table: String, message: String },

    /// The underlying bulk operation failed. Fatal to the run, since a
    /// partial batch leaves ambiguous state.
    #[error("Batch execution failed for table {table} ({rows} rows): {message}")]
    BatchExecution {
        table: String,
        rows: usize,
        message: String,
    },

    /// A child or reference variant not representable in the target schema.
    /// Recoverable; the run policy decides whether it is skipped or escalated.
    #[error("Unsupported variant {variant} on entity {entity}")]
    UnsupportedVariant { entity: String, variant: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Geometry value could not be converted to a bound parameter
    #[error("Geometry conversion failed: {0}")]
    Geometry(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        ImportError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Binding error
    pub fn binding(table: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Binding {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a StatementPreparation error
    pub fn preparation(table: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::StatementPreparation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Classification error
    pub fn classification(entity: impl Into<String>, message: impl Into<String>) -> Self {
        ImportError::Classification {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create an UnsupportedVariant error
    pub fn unsupported(entity: impl Into<String>, variant: impl Into<String>) -> Self {
        ImportError::UnsupportedVariant {
            entity: entity.into(),
            variant: variant.into(),
        }
    }

    /// True for the per-entity conditions the run policy may downgrade
    /// to a logged skip instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ImportError::Classification { .. } | ImportError::UnsupportedVariant { .. }
        )
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, ImportError>;
